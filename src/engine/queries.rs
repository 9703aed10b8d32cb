//! 运动学与惯性查询
//!
//! 点坐标均在所属刚体的体坐标系中给出，返回值在地面坐标系中，
//! 后缀 `_body_local` 的接口除外。

use glam::{DMat3, DVec3};

use super::DynamicsEngine;
use crate::error::Result;
use crate::kinematics::BodyKinematics;

/// 系统整体惯性
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SystemInertia {
    pub mass: f64,
    /// 系统质心（地面坐标系）
    pub center_of_mass: DVec3,
    /// 关于系统质心的惯性张量（地面坐标系）
    pub inertia: DMat3,
}

impl DynamicsEngine {
    /// 刚体运动学快照
    pub fn body_kinematics(&self, body: usize) -> Result<&BodyKinematics> {
        self.topology.check_body(body)?;
        Ok(&self.kinematics.bodies[body])
    }

    // ========================================
    // 点
    // ========================================

    pub fn position(&self, body: usize, point: DVec3) -> Result<DVec3> {
        Ok(self.body_kinematics(body)?.point_position(point))
    }

    pub fn velocity(&self, body: usize, point: DVec3) -> Result<DVec3> {
        Ok(self.body_kinematics(body)?.point_velocity(point))
    }

    pub fn acceleration(&self, body: usize, point: DVec3) -> Result<DVec3> {
        Ok(self.body_kinematics(body)?.point_acceleration(point))
    }

    // ========================================
    // 姿态
    // ========================================

    /// 体 → 地面的方向余弦矩阵
    pub fn direction_cosines(&self, body: usize) -> Result<DMat3> {
        Ok(self.body_kinematics(body)?.rotation)
    }

    pub fn angular_velocity(&self, body: usize) -> Result<DVec3> {
        Ok(self.body_kinematics(body)?.angular_velocity)
    }

    pub fn angular_velocity_body_local(&self, body: usize) -> Result<DVec3> {
        let kin = self.body_kinematics(body)?;
        Ok(kin.rotation.transpose() * kin.angular_velocity)
    }

    pub fn angular_acceleration(&self, body: usize) -> Result<DVec3> {
        Ok(self.body_kinematics(body)?.angular_acceleration)
    }

    pub fn angular_acceleration_body_local(&self, body: usize) -> Result<DVec3> {
        let kin = self.body_kinematics(body)?;
        Ok(kin.rotation.transpose() * kin.angular_acceleration)
    }

    // ========================================
    // 坐标系变换
    // ========================================

    /// 将 `from` 坐标系中的向量改写到 `to` 坐标系
    pub fn transform(&self, from: usize, v: DVec3, to: usize) -> Result<DVec3> {
        let r_from = self.body_kinematics(from)?.rotation;
        let r_to = self.body_kinematics(to)?.rotation;
        Ok(r_to.transpose() * (r_from * v))
    }

    /// 体上点 → 地面位置
    pub fn transform_position(&self, body: usize, point: DVec3) -> Result<DVec3> {
        self.position(body, point)
    }

    // ========================================
    // 惯性
    // ========================================

    /// 系统总质量
    pub fn mass(&self) -> f64 {
        self.topology.bodies.iter().map(|b| b.mass).sum()
    }

    pub fn body_mass(&self, body: usize) -> Result<f64> {
        Ok(self.topology.body(body)?.mass)
    }

    /// 质心惯性张量（体坐标系）
    pub fn inertia_body_local(&self, body: usize) -> Result<DMat3> {
        Ok(self.topology.body(body)?.inertia)
    }

    /// 系统质量、质心与关于质心的惯性张量
    pub fn system_inertia(&self) -> SystemInertia {
        let mass = self.mass();
        let center_of_mass = if mass > 0.0 {
            self.topology
                .bodies
                .iter()
                .zip(&self.kinematics.bodies)
                .map(|(b, k)| k.position * b.mass)
                .sum::<DVec3>()
                / mass
        } else {
            DVec3::ZERO
        };

        let mut inertia = DMat3::ZERO;
        for (body, kin) in self.topology.bodies.iter().zip(&self.kinematics.bodies) {
            let rotated = kin.rotation * body.inertia * kin.rotation.transpose();
            // 平行轴定理
            let r = kin.position - center_of_mass;
            let outer = DMat3::from_cols(r * r.x, r * r.y, r * r.z);
            let shift = DMat3::from_diagonal(DVec3::splat(r.length_squared())) - outer;
            inertia += rotated + shift * body.mass;
        }

        SystemInertia {
            mass,
            center_of_mass,
            inertia,
        }
    }
}
