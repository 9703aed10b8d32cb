//! 导数求值
//!
//! - 正向动力学：`LoadPhase::compute_accelerations()` 解 M·u̇ = F，只在未锁定坐标上求解
//! - 逆向动力学：`compute_generalized_forces(u̇)`
//! - 关节反力：`compute_reactions()`
//! - 伪状态导数：`compute_auxiliary_derivatives()`

mod eom;

use glam::DVec3;
use nalgebra::{DMatrix, DVector};

use crate::engine::DynamicsEngine;
use crate::error::{EngineError, Result};
use crate::kinematics::Kinematics;
use crate::loads::{LoadAccumulator, LoadPhase};

/// 状态导数
#[derive(Clone, Debug, PartialEq)]
pub struct Derivatives {
    pub dqdt: Vec<f64>,
    pub dudt: Vec<f64>,
}

impl Derivatives {
    /// 按 Y 的顺序拼接 (dQ/dt, dU/dt)
    pub fn to_state_derivative(&self) -> Vec<f64> {
        [self.dqdt.as_slice(), self.dudt.as_slice()].concat()
    }
}

/// 关节反力：父体经关节点作用于子体的力与力矩（地面坐标系）
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JointReaction {
    pub force: DVec3,
    /// 关于关节点的力矩
    pub torque: DVec3,
}

impl LoadPhase<'_> {
    /// 消耗载荷阶段，求广义加速度
    ///
    /// 成功后引擎记录 u̇ 与本次载荷，运动学加速度随之更新。
    pub fn compute_accelerations(self) -> Result<Derivatives> {
        let LoadPhase { engine, loads } = self;
        let derivatives = engine.solve_accelerations(&loads)?;
        engine.udot.copy_from_slice(&derivatives.dudt);
        engine.last_loads = loads;
        engine.realize();
        Ok(derivatives)
    }
}

impl DynamicsEngine {
    /// 无外载荷时的广义加速度（仅重力与速度项）
    pub fn compute_accelerations(&mut self) -> Result<Derivatives> {
        self.begin_loads().compute_accelerations()
    }

    /// 以 u̇ = 0 求值的速度相关运动学
    fn velocity_kinematics(&self) -> Kinematics {
        let zeros = vec![0.0; self.q.len()];
        Kinematics::evaluate(&self.topology, &self.q, &self.u, &zeros)
    }

    fn solve_accelerations(&self, loads: &LoadAccumulator) -> Result<Derivatives> {
        let n = self.topology.num_coordinates();
        let free: Vec<usize> = (0..n).filter(|&c| !self.topology.coordinates[c].is_locked()).collect();

        let mut dqdt = self.u.clone();
        let mut dudt = vec![0.0; n];
        for c in (0..n).filter(|&c| self.topology.coordinates[c].is_locked()) {
            dqdt[c] = 0.0;
        }
        if free.is_empty() {
            return Ok(Derivatives { dqdt, dudt });
        }

        let mut rhs = loads.generalized_forces(&self.topology, &self.kinematics);
        let velocity = self.velocity_kinematics();
        for (f, g) in rhs.iter_mut().zip(eom::gravity_minus_bias(&self.topology, &velocity, self.gravity)) {
            *f += g;
        }

        let mass = eom::mass_matrix(&self.topology, &self.kinematics);
        let reduced = mass.select_rows(free.iter()).select_columns(free.iter());
        let rhs_free = DVector::from_iterator(free.len(), free.iter().map(|&c| rhs[c]));

        let solution = self.solve_reduced(reduced, rhs_free)?;
        for (i, &c) in free.iter().enumerate() {
            dudt[c] = solution[i];
        }
        Ok(Derivatives { dqdt, dudt })
    }

    /// 奇异判定：σ_min ≤ tol · σ_max，或解非有限
    fn solve_reduced(&self, mass: DMatrix<f64>, rhs: DVector<f64>) -> Result<DVector<f64>> {
        let singular_values = mass.clone().singular_values();
        let max = singular_values.max();
        let min = singular_values.min();
        if !(max > 0.0) || min <= self.config.singular_tolerance * max {
            log::warn!("[Dynamics] 质量矩阵奇异: σ_min={:.3e}, σ_max={:.3e}", min, max);
            return Err(EngineError::SingularMassMatrix);
        }

        let solution = mass.lu().solve(&rhs).ok_or(EngineError::SingularMassMatrix)?;
        if solution.iter().any(|v| !v.is_finite()) {
            log::warn!("[Dynamics] 加速度求解结果非有限");
            return Err(EngineError::SingularMassMatrix);
        }
        Ok(solution)
    }

    /// 伪状态导数；不读写 Q / U
    pub fn compute_auxiliary_derivatives(&self) -> Vec<f64> {
        self.topology
            .pseudo_states
            .iter()
            .zip(&self.pseudo)
            .map(|(state, &value)| state.rate(value, &self.controls))
            .collect()
    }

    /// 逆向动力学：产生 `dudt` 所需的广义力 M·u̇ + b − F_gravity
    pub fn compute_generalized_forces(&self, dudt: &[f64]) -> Result<Vec<f64>> {
        let n = self.topology.num_speeds();
        if dudt.len() != n {
            return Err(EngineError::dimension_mismatch("dudt", n, dudt.len()));
        }
        let mass = eom::mass_matrix(&self.topology, &self.kinematics);
        let inertial = mass * DVector::from_column_slice(dudt);
        let velocity = self.velocity_kinematics();
        let gravity_bias = eom::gravity_minus_bias(&self.topology, &velocity, self.gravity);
        Ok(inertial.iter().zip(gravity_bias).map(|(m, g)| m - g).collect())
    }

    /// 关节反力（按关节索引）
    ///
    /// 使用最近一次求导的 u̇ 与载荷；自叶向根做 Newton-Euler 递推。
    pub fn compute_reactions(&self) -> Vec<JointReaction> {
        let topology = &self.topology;
        let bodies = &self.kinematics.bodies;
        let mut reactions = vec![JointReaction::default(); topology.num_joints()];
        // 每个刚体由子关节传来的力与关于质心的力矩
        let mut from_children = vec![(DVec3::ZERO, DVec3::ZERO); topology.num_bodies()];

        for &j in topology.order.iter().rev() {
            let joint = &topology.joints[j];
            let b = joint.child;
            let body = &topology.bodies[b];
            let kin = &bodies[b];
            let inertia_world = kin.rotation * body.inertia * kin.rotation.transpose();

            let external_force = body.mass * self.gravity + self.last_loads.body_force(b);
            let external_torque = self.last_loads.body_torque(b);
            let (child_force, child_torque) = from_children[b];

            // m a = F_joint + F_ext − Σ F_child
            let force = body.mass * kin.acceleration - external_force + child_force;
            let r_joint = self.kinematics.joint_points[b] - kin.position;
            let torque_com = inertia_world * kin.angular_acceleration
                + kin.angular_velocity.cross(inertia_world * kin.angular_velocity)
                - external_torque
                + child_torque;
            // 关于质心的关节力矩 = torque_com − r_joint × F
            let torque = torque_com - r_joint.cross(force);

            reactions[j] = JointReaction { force, torque };

            // 反作用于父体：−F 作用于关节点
            let parent = joint.parent;
            let r_parent = self.kinematics.joint_points[b] - bodies[parent].position;
            let entry = &mut from_children[parent];
            entry.0 += force;
            entry.1 += torque + r_parent.cross(force);
        }
        reactions
    }
}
