//! 正向运动学
//!
//! 从广义坐标 Q、广义速度 U 与广义加速度 U̇ 沿运动树自根向叶递推，
//! 得到每个刚体质心的位姿、速度、加速度以及每个自由度的世界轴。
//!
//! ## 递推（每个基本轴）
//! ```text
//! 旋转：α += (ω × a)·u + a·u̇ ;  ω += a·u ;  R = R · Rot(axis, q)
//! 平移：d = a·q
//!       acc += α × d + ω × (ω × d) + 2 ω × (a·u) + a·u̇
//!       vel += ω × d + a·u ;  o += d
//! ```
//! 关节点 o 的初值为父质心 + R_parent · inboard_to_joint，
//! 子质心 = o − R_child · body_to_joint。
//!
//! 求值是纯函数：同样的输入总得到同样的结果。

use glam::{DMat3, DVec3};
use nalgebra::DMatrix;

use crate::topology::{MotionType, Topology};

/// 单个刚体的运动学量（地面坐标系，参考点为质心）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyKinematics {
    pub position: DVec3,
    /// 体 → 地面的方向余弦矩阵
    pub rotation: DMat3,
    pub velocity: DVec3,
    pub angular_velocity: DVec3,
    pub acceleration: DVec3,
    pub angular_acceleration: DVec3,
}

impl BodyKinematics {
    pub const GROUND: Self = Self {
        position: DVec3::ZERO,
        rotation: DMat3::IDENTITY,
        velocity: DVec3::ZERO,
        angular_velocity: DVec3::ZERO,
        acceleration: DVec3::ZERO,
        angular_acceleration: DVec3::ZERO,
    };

    /// 体坐标系中的点 → 地面坐标
    #[inline]
    pub fn point_position(&self, point: DVec3) -> DVec3 {
        self.position + self.rotation * point
    }

    #[inline]
    pub fn point_velocity(&self, point: DVec3) -> DVec3 {
        let r = self.rotation * point;
        self.velocity + self.angular_velocity.cross(r)
    }

    #[inline]
    pub fn point_acceleration(&self, point: DVec3) -> DVec3 {
        let r = self.rotation * point;
        self.acceleration
            + self.angular_acceleration.cross(r)
            + self.angular_velocity.cross(self.angular_velocity.cross(r))
    }
}

/// 自由度在地面坐标系中的轴
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DofFrame {
    pub motion: MotionType,
    /// 单位轴（地面坐标系）
    pub axis: DVec3,
    /// 旋转中心（平移自由度不使用）
    pub origin: DVec3,
}

impl DofFrame {
    /// 该自由度单位速度引起的点 `p`（地面坐标）的线速度
    #[inline]
    pub fn linear_column(&self, p: DVec3) -> DVec3 {
        match self.motion {
            MotionType::Rotational => self.axis.cross(p - self.origin),
            MotionType::Translational => self.axis,
        }
    }

    /// 该自由度单位速度引起的角速度
    #[inline]
    pub fn angular_column(&self) -> DVec3 {
        match self.motion {
            MotionType::Rotational => self.axis,
            MotionType::Translational => DVec3::ZERO,
        }
    }
}

/// 整个系统的运动学快照
#[derive(Clone, Debug)]
pub struct Kinematics {
    /// 按刚体索引
    pub bodies: Vec<BodyKinematics>,
    /// 按广义坐标索引
    pub dofs: Vec<DofFrame>,
    /// 各刚体内侧关节点（地面坐标，地面为原点）
    pub joint_points: Vec<DVec3>,
}

impl Kinematics {
    /// 求值；`q`, `u`, `udot` 长度均为坐标数
    pub fn evaluate(topology: &Topology, q: &[f64], u: &[f64], udot: &[f64]) -> Self {
        let nb = topology.num_bodies();
        let nc = topology.num_coordinates();
        let mut bodies = vec![BodyKinematics::GROUND; nb];
        let mut joint_points = vec![DVec3::ZERO; nb];
        let mut dofs = vec![
            DofFrame {
                motion: MotionType::Rotational,
                axis: DVec3::ZERO,
                origin: DVec3::ZERO,
            };
            nc
        ];

        for &j in &topology.order {
            let joint = &topology.joints[j];
            let parent = bodies[joint.parent];

            // 关节点（父侧）
            let r_in = parent.rotation * joint.inboard_to_joint;
            let mut origin = parent.position + r_in;
            let mut vel = parent.point_velocity(joint.inboard_to_joint);
            let mut acc = parent.point_acceleration(joint.inboard_to_joint);
            let mut rot = parent.rotation;
            let mut omega = parent.angular_velocity;
            let mut alpha = parent.angular_acceleration;

            for dof in &joint.dofs {
                let c = dof.coordinate;
                let axis = rot * dof.axis;
                dofs[c] = DofFrame {
                    motion: dof.motion,
                    axis,
                    origin,
                };

                match dof.motion {
                    MotionType::Rotational => {
                        alpha += omega.cross(axis) * u[c] + axis * udot[c];
                        omega += axis * u[c];
                        rot *= DMat3::from_axis_angle(dof.axis, q[c]);
                    }
                    MotionType::Translational => {
                        let d = axis * q[c];
                        let slide = axis * u[c];
                        acc += alpha.cross(d)
                            + omega.cross(omega.cross(d))
                            + 2.0 * omega.cross(slide)
                            + axis * udot[c];
                        vel += omega.cross(d) + slide;
                        origin += d;
                    }
                }
            }

            // 子质心
            let body = &topology.bodies[joint.child];
            let d = -(rot * body.body_to_joint);
            joint_points[joint.child] = origin;
            bodies[joint.child] = BodyKinematics {
                position: origin + d,
                rotation: rot,
                velocity: vel + omega.cross(d),
                angular_velocity: omega,
                acceleration: acc + alpha.cross(d) + omega.cross(omega.cross(d)),
                angular_acceleration: alpha,
            };
        }

        Self {
            bodies,
            dofs,
            joint_points,
        }
    }

    /// 仅位置（速度、加速度为零）
    pub fn positions(topology: &Topology, q: &[f64]) -> Self {
        let zeros = vec![0.0; q.len()];
        Self::evaluate(topology, q, &zeros, &zeros)
    }

    /// 体上点的平动 Jacobian（3 × n，地面坐标系）
    pub fn translation_jacobian(&self, topology: &Topology, body: usize, point: DVec3) -> DMatrix<f64> {
        let n = topology.num_coordinates();
        let mut jac = DMatrix::zeros(3, n);
        let p = self.bodies[body].point_position(point);
        for &c in &topology.body_coordinates[body] {
            let col = self.dofs[c].linear_column(p);
            jac[(0, c)] = col.x;
            jac[(1, c)] = col.y;
            jac[(2, c)] = col.z;
        }
        jac
    }

    /// 刚体角速度 Jacobian（3 × n，地面坐标系）
    pub fn orientation_jacobian(&self, topology: &Topology, body: usize) -> DMatrix<f64> {
        let n = topology.num_coordinates();
        let mut jac = DMatrix::zeros(3, n);
        for &c in &topology.body_coordinates[body] {
            let col = self.dofs[c].angular_column();
            jac[(0, c)] = col.x;
            jac[(1, c)] = col.y;
            jac[(2, c)] = col.z;
        }
        jac
    }

    /// 将作用于体上点 `point_world` 的力 F 与力矩 T 投影到广义力（累加到 `out`）
    pub(crate) fn project_load(
        &self,
        topology: &Topology,
        body: usize,
        point_world: DVec3,
        force: DVec3,
        torque: DVec3,
        out: &mut [f64],
    ) {
        for &c in &topology.body_coordinates[body] {
            let dof = &self.dofs[c];
            out[c] += dof.linear_column(point_world).dot(force) + dof.angular_column().dot(torque);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{JointKind, JointSpec, ModelBuilder};

    fn pendulum(kind: JointKind, coords: &[&str]) -> Topology {
        let mut b = ModelBuilder::new();
        b.add_body("link", 1.0, DMat3::IDENTITY).add_joint(
            JointSpec::new("pivot", "ground", "link", kind)
                .inboard_to_joint(DVec3::new(0.0, 2.0, 0.0))
                .body_to_joint(DVec3::new(0.0, 0.5, 0.0))
                .coordinates(coords.iter().copied()),
        );
        b.build().unwrap()
    }

    #[test]
    fn test_pin_position() {
        let topo = pendulum(JointKind::Pin { axis: DVec3::Z }, &["theta"]);
        let q = std::f64::consts::FRAC_PI_2;
        let kin = Kinematics::positions(&topo, &[q]);
        // 质心在关节点正下方 0.5，绕 z 旋转 90° 后在 +x 侧
        let pos = kin.bodies[1].position;
        assert!(pos.abs_diff_eq(DVec3::new(0.5, 2.0, 0.0), 1e-12));
        assert!(kin.joint_points[1].abs_diff_eq(DVec3::new(0.0, 2.0, 0.0), 1e-12));
    }

    #[test]
    fn test_velocity_matches_jacobian() {
        let topo = pendulum(JointKind::Free, &["tx", "ty", "tz", "rx", "ry", "rz"]);
        let q = [0.1, -0.2, 0.3, 0.4, -0.5, 0.6];
        let u = [1.0, 0.5, -0.3, 0.2, 0.7, -1.1];
        let kin = Kinematics::evaluate(&topo, &q, &u, &[0.0; 6]);
        let point = DVec3::new(0.2, -0.1, 0.3);

        let jac = kin.translation_jacobian(&topo, 1, point);
        let v = &jac * nalgebra::DVector::from_column_slice(&u);
        let expected = kin.bodies[1].point_velocity(point);
        assert!((DVec3::new(v[0], v[1], v[2]) - expected).length() < 1e-12);

        let jw = kin.orientation_jacobian(&topo, 1);
        let w = &jw * nalgebra::DVector::from_column_slice(&u);
        assert!((DVec3::new(w[0], w[1], w[2]) - kin.bodies[1].angular_velocity).length() < 1e-12);
    }

    #[test]
    fn test_acceleration_matches_finite_difference() {
        let topo = pendulum(JointKind::Free, &["tx", "ty", "tz", "rx", "ry", "rz"]);
        let q = [0.1, -0.2, 0.3, 0.4, -0.5, 0.6];
        let u = [1.0, 0.5, -0.3, 0.2, 0.7, -1.1];
        let udot = [0.3, -0.4, 0.5, -0.6, 0.7, 0.8];
        let point = DVec3::new(0.2, -0.1, 0.3);
        let h = 1e-6;

        let step = |sign: f64| {
            let qh: Vec<f64> = q.iter().zip(&u).map(|(q, u)| q + sign * h * u).collect();
            let uh: Vec<f64> = u.iter().zip(&udot).map(|(u, a)| u + sign * h * a).collect();
            Kinematics::evaluate(&topo, &qh, &uh, &udot).bodies[1]
        };
        let plus = step(1.0);
        let minus = step(-1.0);
        let kin = Kinematics::evaluate(&topo, &q, &u, &udot);

        let fd_acc = (plus.point_velocity(point) - minus.point_velocity(point)) / (2.0 * h);
        assert!((fd_acc - kin.bodies[1].point_acceleration(point)).length() < 1e-6);

        let fd_alpha = (plus.angular_velocity - minus.angular_velocity) / (2.0 * h);
        assert!((fd_alpha - kin.bodies[1].angular_acceleration).length() < 1e-6);
    }

    #[test]
    fn test_slider_moves_along_axis() {
        let topo = pendulum(JointKind::Slider { axis: DVec3::X }, &["x"]);
        let kin = Kinematics::evaluate(&topo, &[0.25], &[2.0], &[3.0]);
        let body = kin.bodies[1];
        assert!(body.position.abs_diff_eq(DVec3::new(0.25, 1.5, 0.0), 1e-12));
        assert!(body.velocity.abs_diff_eq(DVec3::new(2.0, 0.0, 0.0), 1e-12));
        assert!(body.acceleration.abs_diff_eq(DVec3::new(3.0, 0.0, 0.0), 1e-12));
    }
}
