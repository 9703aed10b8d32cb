//! 运动方程组装
//!
//! ```text
//! M(q) · u̇ = F_applied + F_gravity − b(q, u)
//! M   = Σ_b  m Jvᵀ Jv + Jωᵀ (R I Rᵀ) Jω
//! b   = Σ_b  Jvᵀ m a₀ + Jωᵀ (I_w α₀ + ω × I_w ω)       a₀, α₀ 为 u̇ = 0 时的加速度
//! F_g = Σ_b  Jvᵀ m g
//! ```
//! Jacobian 列直接取自运动学中每个自由度的世界轴，只遍历影响该刚体的坐标。

use glam::{DMat3, DVec3};
use nalgebra::DMatrix;

use crate::convert::direction_cosines_to_euler;
use crate::engine::DynamicsEngine;
use crate::error::{EngineError, Result};
use crate::kinematics::Kinematics;
use crate::topology::Topology;

/// 质量矩阵
pub(crate) fn mass_matrix(topology: &Topology, kinematics: &Kinematics) -> DMatrix<f64> {
    let n = topology.num_coordinates();
    let mut mass = DMatrix::zeros(n, n);

    for (b, body) in topology.bodies.iter().enumerate().skip(1) {
        let kin = &kinematics.bodies[b];
        let inertia_world = kin.rotation * body.inertia * kin.rotation.transpose();
        let coords = &topology.body_coordinates[b];

        let columns: Vec<(DVec3, DVec3)> = coords
            .iter()
            .map(|&c| {
                let dof = &kinematics.dofs[c];
                (dof.linear_column(kin.position), dof.angular_column())
            })
            .collect();

        for (i, &ci) in coords.iter().enumerate() {
            let (vi, wi) = columns[i];
            let iw = inertia_world * wi;
            for (j, &cj) in coords.iter().enumerate().skip(i) {
                let (vj, wj) = columns[j];
                let value = body.mass * vi.dot(vj) + iw.dot(wj);
                mass[(ci, cj)] += value;
                if ci != cj {
                    mass[(cj, ci)] += value;
                }
            }
        }
    }
    mass
}

/// 重力与速度项：返回 F_gravity − b
///
/// `velocity_kinematics` 必须以 u̇ = 0 求值。
pub(crate) fn gravity_minus_bias(
    topology: &Topology,
    velocity_kinematics: &Kinematics,
    gravity: DVec3,
) -> Vec<f64> {
    let mut out = vec![0.0; topology.num_coordinates()];
    for (b, body) in topology.bodies.iter().enumerate().skip(1) {
        let kin = &velocity_kinematics.bodies[b];
        let inertia_world = kin.rotation * body.inertia * kin.rotation.transpose();
        let force = body.mass * (gravity - kin.acceleration);
        let torque = -(inertia_world * kin.angular_acceleration
            + kin.angular_velocity.cross(inertia_world * kin.angular_velocity));
        velocity_kinematics.project_load(topology, b, kin.position, force, torque, &mut out);
    }
    out
}

/// 3 × 3 → 3 × n：把 `rotation` 左乘到 Jacobian 的每一列
fn rotate_columns(rotation: DMat3, jac: &mut DMatrix<f64>) {
    for c in 0..jac.ncols() {
        let col = rotation * DVec3::new(jac[(0, c)], jac[(1, c)], jac[(2, c)]);
        jac[(0, c)] = col.x;
        jac[(1, c)] = col.y;
        jac[(2, c)] = col.z;
    }
}

/// Euler 角速率 → 角速度（参考系中表达），体固连 X-Y-Z
///
/// ```text
/// W = | 1   0     sin b        |
///     | 0   cos a  −sin a cos b |
///     | 0   sin a   cos a cos b |
/// ```
fn euler_rate_matrix(euler: DVec3) -> DMat3 {
    let (sa, ca) = euler.x.sin_cos();
    let (sb, cb) = euler.y.sin_cos();
    DMat3::from_cols(
        DVec3::X,
        DVec3::new(0.0, ca, sa),
        DVec3::new(sb, -sa * cb, ca * cb),
    )
}

impl DynamicsEngine {
    /// 相对 `ref_body` 的姿态（None 为地面）
    fn relative_rotation(&self, body: usize, ref_body: Option<usize>) -> Result<(DMat3, DMat3)> {
        self.topology.check_body(body)?;
        let reference = match ref_body {
            Some(r) => {
                self.topology.check_body(r)?;
                self.kinematics.bodies[r].rotation
            }
            None => DMat3::IDENTITY,
        };
        Ok((reference, reference.transpose() * self.kinematics.bodies[body].rotation))
    }

    /// 当前构型的质量矩阵（n × n，对称）
    pub fn form_mass_matrix(&self) -> DMatrix<f64> {
        mass_matrix(&self.topology, &self.kinematics)
    }

    /// 体上点的平动 Jacobian（3 × n）
    ///
    /// 给定 `ref_body` 时为相对参考体的速度，在参考体坐标系中表达。
    pub fn form_jacobian_translation(&self, body: usize, point: DVec3, ref_body: Option<usize>) -> Result<DMatrix<f64>> {
        let (reference, _) = self.relative_rotation(body, ref_body)?;
        let mut jac = self.kinematics.translation_jacobian(&self.topology, body, point);
        let Some(r) = ref_body else {
            return Ok(jac);
        };

        let p = self.kinematics.bodies[body].point_position(point);
        let ref_kin = &self.kinematics.bodies[r];
        for &c in &self.topology.body_coordinates[r] {
            let dof = &self.kinematics.dofs[c];
            let carried = dof.linear_column(ref_kin.position) + dof.angular_column().cross(p - ref_kin.position);
            jac[(0, c)] -= carried.x;
            jac[(1, c)] -= carried.y;
            jac[(2, c)] -= carried.z;
        }
        rotate_columns(reference.transpose(), &mut jac);
        Ok(jac)
    }

    /// 角速度 Jacobian（3 × n）
    pub fn form_jacobian_orientation(&self, body: usize, ref_body: Option<usize>) -> Result<DMatrix<f64>> {
        let (reference, _) = self.relative_rotation(body, ref_body)?;
        let mut jac = self.kinematics.orientation_jacobian(&self.topology, body);
        let Some(r) = ref_body else {
            return Ok(jac);
        };
        jac -= self.kinematics.orientation_jacobian(&self.topology, r);
        rotate_columns(reference.transpose(), &mut jac);
        Ok(jac)
    }

    /// Euler 角速率 Jacobian（3 × n）：E · J_ω
    pub fn form_jacobian_euler(&self, body: usize, ref_body: Option<usize>) -> Result<DMatrix<f64>> {
        let (_, relative) = self.relative_rotation(body, ref_body)?;
        let transform = self.euler_transform_of(body, relative)?;
        let mut jac = self.form_jacobian_orientation(body, ref_body)?;
        rotate_columns(transform, &mut jac);
        Ok(jac)
    }

    /// 角速度（地面坐标系）→ Euler 角速率 的 3 × 3 变换
    pub fn form_euler_transform(&self, body: usize) -> Result<DMat3> {
        self.topology.check_body(body)?;
        self.euler_transform_of(body, self.kinematics.bodies[body].rotation)
    }

    fn euler_transform_of(&self, body: usize, rotation: DMat3) -> Result<DMat3> {
        let euler = direction_cosines_to_euler(rotation);
        let w = euler_rate_matrix(euler);
        let det = euler.y.cos();
        if det.abs() < self.config.euler_singularity_tolerance {
            return Err(EngineError::degenerate_jacobian(
                body,
                format!("euler transform is singular at second angle {:.6} rad", euler.y),
            ));
        }
        Ok(w.inverse())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::pendulum;
    use crate::topology::{JointKind, JointSpec, ModelBuilder};
    use nalgebra::DVector;

    fn ball_link() -> DynamicsEngine {
        let mut b = ModelBuilder::new();
        b.add_body("arm", 1.5, DMat3::from_diagonal(DVec3::new(0.02, 0.03, 0.04)))
            .add_body("hand", 0.5, DMat3::from_diagonal(DVec3::splat(0.001)))
            .add_joint(
                JointSpec::new("shoulder", "ground", "arm", JointKind::Ball)
                    .body_to_joint(DVec3::new(0.0, 0.3, 0.0))
                    .coordinates(["sx", "sy", "sz"]),
            )
            .add_joint(
                JointSpec::new("wrist", "arm", "hand", JointKind::Pin { axis: DVec3::X })
                    .inboard_to_joint(DVec3::new(0.0, -0.3, 0.0))
                    .body_to_joint(DVec3::new(0.0, 0.05, 0.0))
                    .coordinates(["wx"]),
            );
        DynamicsEngine::new(b.build().unwrap())
    }

    #[test]
    fn test_mass_matrix_symmetric_positive() {
        let mut engine = ball_link();
        engine.set_state(&[0.3, -0.2, 0.5, 0.7, 0.0, 0.0, 0.0, 0.0]).unwrap();
        let m = engine.form_mass_matrix();
        assert!((&m - m.transpose()).norm() < 1e-12);
        assert!(m.clone().cholesky().is_some());
    }

    #[test]
    fn test_kinetic_energy_matches_body_sum() {
        let mut engine = ball_link();
        let u = [0.4, -0.9, 1.2, 2.0];
        engine.set_state(&[0.3, -0.2, 0.5, 0.7, u[0], u[1], u[2], u[3]]).unwrap();
        let m = engine.form_mass_matrix();
        let uv = DVector::from_column_slice(&u);
        let from_matrix = 0.5 * uv.dot(&(&m * &uv));

        let mut from_bodies = 0.0;
        for b in 1..3 {
            let kin = engine.body_kinematics(b).unwrap();
            let body = &engine.topology().bodies()[b];
            let iw = kin.rotation * body.inertia * kin.rotation.transpose();
            from_bodies += 0.5 * body.mass * kin.velocity.length_squared()
                + 0.5 * kin.angular_velocity.dot(iw * kin.angular_velocity);
        }
        assert!((from_matrix - from_bodies).abs() < 1e-12);
    }

    #[test]
    fn test_relative_jacobian_in_reference_frame() {
        let mut engine = ball_link();
        let u = [0.4, -0.9, 1.2, 2.0];
        engine.set_state(&[0.3, -0.2, 0.5, 0.7, u[0], u[1], u[2], u[3]]).unwrap();

        let uv = DVector::from_column_slice(&u);
        let point = DVec3::new(0.0, -0.05, 0.02);
        let jac = engine.form_jacobian_translation(2, point, Some(1)).unwrap();
        let v = &jac * &uv;

        // 相对速度只由腕关节产生，在 arm 坐标系中表达
        let arm = *engine.body_kinematics(1).unwrap();
        let p = engine.position(2, point).unwrap();
        let expected = engine.velocity(2, point).unwrap() - arm.velocity - arm.angular_velocity.cross(p - arm.position);
        let expected = arm.rotation.transpose() * expected;
        assert!((DVec3::new(v[0], v[1], v[2]) - expected).length() < 1e-12);

        let jw = engine.form_jacobian_orientation(2, Some(1)).unwrap();
        let w = &jw * &uv;
        // 腕关节绕 arm 的 x 轴
        assert!((DVec3::new(w[0], w[1], w[2]) - DVec3::new(2.0, 0.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_euler_jacobian_gives_euler_rates() {
        let mut engine = ball_link();
        let u = [0.4, -0.9, 1.2, 0.0];
        engine.set_state(&[0.3, -0.2, 0.5, 0.0, u[0], u[1], u[2], u[3]]).unwrap();
        let jac = engine.form_jacobian_euler(1, None).unwrap();
        let rates = &jac * DVector::from_column_slice(&u);
        // 球关节坐标正是体固连 X-Y-Z Euler 角
        for k in 0..3 {
            assert!((rates[k] - u[k]).abs() < 1e-10, "{k}: {}", rates[k]);
        }
    }

    #[test]
    fn test_euler_transform_gimbal_lock() {
        let mut engine = ball_link();
        engine
            .set_state(&[0.1, std::f64::consts::FRAC_PI_2, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
            .unwrap();
        let err = engine.form_euler_transform(1).unwrap_err();
        assert!(matches!(err, EngineError::DegenerateJacobian { body: 1, .. }));

        let engine = pendulum();
        assert!(engine.form_euler_transform(1).is_ok());
    }
}
