//! 装配求解
//!
//! 调整未锁定的广义坐标，使所有约束残差的 2-范数降到容差以内。
//! 采用 Levenberg-Marquardt：
//! ```text
//! (JᵀJ + λI) Δq = −Jᵀr
//! ```
//! 试探步残差下降则接受并 λ /= 10，否则 λ *= 10。
//! 每次试探步的残差求值计入评估预算；初始残差检查不计入。

use glam::DVec3;
use nalgebra::{DMatrix, DVector};

use crate::engine::DynamicsEngine;
use crate::error::{EngineError, Result};
use crate::kinematics::Kinematics;
use crate::topology::Topology;

/// 装配约束
#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    /// q_dependent = scale · q_independent + offset
    CoordinateCoupler {
        dependent: usize,
        independent: usize,
        scale: f64,
        offset: f64,
    },
    /// 两刚体上的点在地面坐标系中重合
    PointOnPoint {
        body_a: usize,
        point_a: DVec3,
        body_b: usize,
        point_b: DVec3,
    },
}

impl Constraint {
    /// 残差行数
    pub fn rows(&self) -> usize {
        match self {
            Constraint::CoordinateCoupler { .. } => 1,
            Constraint::PointOnPoint { .. } => 3,
        }
    }

    /// 写入残差与 Jacobian 行（从 `row` 开始）
    fn fill(
        &self,
        topology: &Topology,
        kinematics: &Kinematics,
        q: &[f64],
        row: usize,
        residual: &mut DVector<f64>,
        jacobian: &mut DMatrix<f64>,
    ) {
        match *self {
            Constraint::CoordinateCoupler {
                dependent,
                independent,
                scale,
                offset,
            } => {
                residual[row] = q[dependent] - (scale * q[independent] + offset);
                jacobian[(row, dependent)] = 1.0;
                jacobian[(row, independent)] = -scale;
            }
            Constraint::PointOnPoint {
                body_a,
                point_a,
                body_b,
                point_b,
            } => {
                let pa = kinematics.bodies[body_a].point_position(point_a);
                let pb = kinematics.bodies[body_b].point_position(point_b);
                let gap = pa - pb;
                let ja = kinematics.translation_jacobian(topology, body_a, point_a);
                let jb = kinematics.translation_jacobian(topology, body_b, point_b);
                for k in 0..3 {
                    residual[row + k] = gap[k];
                }
                jacobian.rows_mut(row, 3).copy_from(&(ja - jb));
            }
        }
    }
}

/// 约束系统：残差向量与对全部坐标的 Jacobian
fn constraint_system(topology: &Topology, q: &[f64]) -> (DVector<f64>, DMatrix<f64>) {
    let rows: usize = topology.constraints.iter().map(Constraint::rows).sum();
    let mut residual = DVector::zeros(rows);
    let mut jacobian = DMatrix::zeros(rows, topology.num_coordinates());
    let kinematics = Kinematics::positions(topology, q);
    let mut row = 0;
    for constraint in &topology.constraints {
        constraint.fill(topology, &kinematics, q, row, &mut residual, &mut jacobian);
        row += constraint.rows();
    }
    (residual, jacobian)
}

/// 装配结果
#[derive(Clone, Debug, PartialEq)]
pub struct AssemblyReport {
    /// 装配后的完整状态 Y
    pub state: Vec<f64>,
    /// 消耗的残差评估次数
    pub evaluations: usize,
    /// 最终残差 2-范数
    pub residual: f64,
}

impl DynamicsEngine {
    /// 当前构型下的约束残差
    pub fn constraint_residuals(&self) -> Vec<f64> {
        constraint_system(&self.topology, &self.q).0.as_slice().to_vec()
    }

    /// 装配
    ///
    /// `lock_mask` 为空表示不锁定任何坐标，否则长度必须等于坐标数。
    /// 成功或失败后引擎的实时状态都等于返回的状态。
    pub fn assemble(
        &mut self,
        time: f64,
        state: &[f64],
        lock_mask: &[bool],
        tolerance: f64,
        max_evaluations: usize,
    ) -> Result<AssemblyReport> {
        let n = self.topology.num_coordinates();
        if !lock_mask.is_empty() && lock_mask.len() != n {
            return Err(EngineError::dimension_mismatch("lock mask", n, lock_mask.len()));
        }
        self.set_state(state)?;
        self.time = time;

        let free: Vec<usize> = (0..n)
            .filter(|&c| !lock_mask.get(c).copied().unwrap_or(false) && !self.topology.coordinates[c].is_locked())
            .collect();

        let mut q = self.q.clone();
        let (mut residual, mut jacobian) = constraint_system(&self.topology, &q);
        let mut error = residual.norm();
        let mut evaluations = 0;

        if error <= tolerance {
            return Ok(AssemblyReport {
                state: self.state(),
                evaluations,
                residual: error,
            });
        }

        let mut lambda = self.config.assembly_initial_damping;
        while !free.is_empty() && evaluations < max_evaluations && lambda <= self.config.assembly_max_damping {
            let j_free = jacobian.select_columns(free.iter());
            let mut normal = j_free.transpose() * &j_free;
            for i in 0..free.len() {
                normal[(i, i)] += lambda;
            }
            let gradient = j_free.transpose() * &residual;
            let Some(step) = normal.lu().solve(&(-gradient)) else {
                lambda *= 10.0;
                continue;
            };

            let mut trial = q.clone();
            for (i, &c) in free.iter().enumerate() {
                trial[c] += step[i];
            }
            evaluations += 1;
            let (trial_residual, trial_jacobian) = constraint_system(&self.topology, &trial);
            let trial_error = trial_residual.norm();

            if self.config.debug_log {
                log::debug!(
                    "[Assembly] 评估 {}: 残差 {:.3e} → {:.3e}, λ={:.1e}",
                    evaluations,
                    error,
                    trial_error,
                    lambda
                );
            }

            if trial_error.is_finite() && trial_error < error {
                q = trial;
                residual = trial_residual;
                jacobian = trial_jacobian;
                error = trial_error;
                lambda = (lambda / 10.0).max(f64::MIN_POSITIVE);
                if error <= tolerance {
                    self.set_coordinates_unchecked(&q);
                    return Ok(AssemblyReport {
                        state: self.state(),
                        evaluations,
                        residual: error,
                    });
                }
            } else {
                lambda *= 10.0;
            }
        }

        self.set_coordinates_unchecked(&q);
        log::warn!(
            "[Assembly] 未收敛: {} 次评估后残差 {:.3e} (容差 {:.1e})",
            evaluations,
            error,
            tolerance
        );
        Err(EngineError::AssemblyNotConverged {
            best_state: self.state(),
            evaluations,
            residual: error,
        })
    }

    /// 使用配置中的默认容差与预算装配当前状态
    pub fn assemble_current(&mut self) -> Result<AssemblyReport> {
        let state = self.state();
        let (tolerance, budget) = (self.config.assembly_tolerance, self.config.assembly_max_evaluations);
        self.assemble(self.time, &state, &[], tolerance, budget)
    }
}
