//! 接触模型
//!
//! 每个接触对由 body A 上的点 A、body B 上的点 B 与固定在 A 上的法向组成。
//!
//! ## 力学模型
//! ```text
//! s      = (pB − pA) · n            分离量，pen = max(0, −s)
//! v_rel  = vB − vA                  closing = −v_rel · n
//! Fn     = max(0, k·pen + c·closing) · n        仅 pen > 0 时
//! Ft*    = −k·d_t − c·v_t                      锚点弹簧 + 阻尼
//! Ft     = Ft* 限制在 |Ft| ≤ μ·|Fn|
//! 修正量 = Ft* − Ft
//! ```
//! 力 F = Fn + Ft 作用于 B，−F 作用于 A，作用点为 pB 的地面位置。

use glam::DVec3;

use crate::engine::DynamicsEngine;
use crate::error::{EngineError, Result};
use crate::kinematics::Kinematics;
use crate::loads::LoadPhase;

/// 接触材料参数
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactMaterial {
    /// 法向 / 切向刚度 (N/m)
    pub stiffness: f64,
    /// 法向 / 切向阻尼 (N·s/m)
    pub viscosity: f64,
    /// Coulomb 摩擦系数
    pub friction: f64,
}

impl Default for ContactMaterial {
    fn default() -> Self {
        Self {
            stiffness: 1.0e5,
            viscosity: 1.0e3,
            friction: 0.5,
        }
    }
}

/// 接触点对（体坐标系）
#[derive(Clone, Debug)]
pub struct ContactPoint {
    pub id: usize,
    pub body_a: usize,
    pub body_b: usize,
    pub point_a: DVec3,
    pub point_b: DVec3,
    /// 单位法向（body A 坐标系）
    pub normal: DVec3,
    pub material: ContactMaterial,
}

/// 单个接触对的求值结果（地面坐标系）
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContactResult {
    /// 作用点（pB 的地面位置）
    pub point: DVec3,
    pub normal: DVec3,
    pub penetration: f64,
    /// B 相对 A 的速度
    pub relative_velocity: DVec3,
    pub normal_force: DVec3,
    pub tangent_elastic: DVec3,
    pub tangent_viscous: DVec3,
    /// 限幅后的切向力
    pub tangent_force: DVec3,
    pub friction_correction: DVec3,
    /// 作用于 B 的总力
    pub force: DVec3,
    /// 切向力未被摩擦锥限制
    pub sticking: bool,
}

impl ContactResult {
    /// 接近速度（正值表示靠近）
    #[inline]
    pub fn closing_speed(&self) -> f64 {
        -self.relative_velocity.dot(self.normal)
    }

    #[inline]
    pub fn power(&self) -> f64 {
        self.force.dot(self.relative_velocity)
    }

    #[inline]
    pub fn in_contact(&self) -> bool {
        self.penetration > 0.0
    }
}

impl ContactPoint {
    /// 在给定运动学快照下求值
    pub fn evaluate(&self, kinematics: &Kinematics) -> ContactResult {
        let a = &kinematics.bodies[self.body_a];
        let b = &kinematics.bodies[self.body_b];

        let pa = a.point_position(self.point_a);
        let pb = b.point_position(self.point_b);
        let normal = a.rotation * self.normal;
        let relative_velocity = b.point_velocity(self.point_b) - a.point_velocity(self.point_a);

        let mut result = ContactResult {
            point: pb,
            normal,
            relative_velocity,
            ..Default::default()
        };

        let offset = pb - pa;
        let separation = offset.dot(normal);
        if separation >= 0.0 {
            return result;
        }
        result.penetration = -separation;

        let ContactMaterial {
            stiffness: k,
            viscosity: c,
            friction: mu,
        } = self.material;

        let closing = result.closing_speed();
        let fn_mag = (k * result.penetration + c * closing).max(0.0);
        result.normal_force = normal * fn_mag;

        let d_t = offset - normal * separation;
        let v_t = relative_velocity - normal * relative_velocity.dot(normal);
        result.tangent_elastic = -k * d_t;
        result.tangent_viscous = -c * v_t;

        let unlimited = result.tangent_elastic + result.tangent_viscous;
        let limit = mu * fn_mag;
        let magnitude = unlimited.length();
        if magnitude > limit {
            result.tangent_force = if magnitude > 0.0 {
                unlimited * (limit / magnitude)
            } else {
                DVec3::ZERO
            };
            result.sticking = false;
        } else {
            result.tangent_force = unlimited;
            result.sticking = true;
        }
        result.friction_correction = unlimited - result.tangent_force;
        result.force = result.normal_force + result.tangent_force;
        result
    }
}

// ============================================================================
// 引擎接口
// ============================================================================

impl DynamicsEngine {
    /// 求值全部接触对并缓存结果
    pub fn compute_contact(&mut self) {
        let results = self
            .topology
            .contacts
            .iter()
            .map(|contact| contact.evaluate(&self.kinematics))
            .collect();
        self.contact_results = results;
        self.contacts_fresh = true;
    }

    /// 缓存过期时重新求值
    pub(crate) fn ensure_contact(&mut self) {
        if !self.contacts_fresh {
            self.compute_contact();
        }
    }

    fn contact(&self, id: usize) -> Result<&ContactPoint> {
        self.topology
            .contacts
            .get(id)
            .ok_or_else(|| EngineError::index_out_of_range("contact", id, self.topology.contacts.len()))
    }

    /// 最近一次 `compute_contact` 的缓存结果，状态改变后可能过期
    pub fn contact_result(&self, id: usize) -> Result<&ContactResult> {
        self.contact(id)?;
        Ok(&self.contact_results[id])
    }

    /// 当前状态下的结果：缓存有效时直接返回，否则即时求值（不写回缓存）
    pub fn current_contact_result(&self, id: usize) -> Result<ContactResult> {
        let contact = self.contact(id)?;
        if self.contacts_fresh {
            Ok(self.contact_results[id])
        } else {
            Ok(contact.evaluate(&self.kinematics))
        }
    }

    #[inline]
    pub fn contact_results_are_current(&self) -> bool {
        self.contacts_fresh
    }

    // ========================================
    // 几何
    // ========================================

    pub fn contact_body_a(&self, id: usize) -> Result<usize> {
        Ok(self.contact(id)?.body_a)
    }

    pub fn contact_body_b(&self, id: usize) -> Result<usize> {
        Ok(self.contact(id)?.body_b)
    }

    pub fn contact_point_a(&self, id: usize) -> Result<DVec3> {
        Ok(self.contact(id)?.point_a)
    }

    pub fn contact_point_b(&self, id: usize) -> Result<DVec3> {
        Ok(self.contact(id)?.point_b)
    }

    pub fn set_contact_point_a(&mut self, id: usize, point: DVec3) -> Result<()> {
        self.contact(id)?;
        self.topology.contacts[id].point_a = point;
        self.contacts_fresh = false;
        Ok(())
    }

    pub fn set_contact_point_b(&mut self, id: usize, point: DVec3) -> Result<()> {
        self.contact(id)?;
        self.topology.contacts[id].point_b = point;
        self.contacts_fresh = false;
        Ok(())
    }

    /// 法向（地面坐标系）
    pub fn contact_normal(&self, id: usize) -> Result<DVec3> {
        Ok(self.current_contact_result(id)?.normal)
    }

    // ========================================
    // 力
    // ========================================

    pub fn contact_force_vector(&self, id: usize) -> Result<DVec3> {
        Ok(self.current_contact_result(id)?.force)
    }

    pub fn contact_normal_force(&self, id: usize) -> Result<DVec3> {
        Ok(self.current_contact_result(id)?.normal_force)
    }

    pub fn contact_tangent_force(&self, id: usize) -> Result<DVec3> {
        Ok(self.current_contact_result(id)?.tangent_force)
    }

    pub fn contact_elastic_tangent_force(&self, id: usize) -> Result<DVec3> {
        Ok(self.current_contact_result(id)?.tangent_elastic)
    }

    pub fn contact_viscous_tangent_force(&self, id: usize) -> Result<DVec3> {
        Ok(self.current_contact_result(id)?.tangent_viscous)
    }

    pub fn contact_friction_correction(&self, id: usize) -> Result<DVec3> {
        Ok(self.current_contact_result(id)?.friction_correction)
    }

    /// 位移 `dx`（B 相对 A，地面坐标系）引起的力变化；未接触时为零
    pub fn contact_stiffness(&self, id: usize, dx: DVec3) -> Result<DVec3> {
        let k = self.contact(id)?.material.stiffness;
        Ok(linearized(&self.current_contact_result(id)?, k, dx))
    }

    /// 相对速度变化 `dv` 引起的力变化；未接触时为零
    pub fn contact_viscosity(&self, id: usize, dv: DVec3) -> Result<DVec3> {
        let c = self.contact(id)?.material.viscosity;
        Ok(linearized(&self.current_contact_result(id)?, c, dv))
    }

    // ========================================
    // 标量诊断
    // ========================================

    /// 总接触力大小
    pub fn contact_force(&self, id: usize) -> Result<f64> {
        Ok(self.current_contact_result(id)?.force.length())
    }

    pub fn contact_speed(&self, id: usize) -> Result<f64> {
        Ok(self.current_contact_result(id)?.closing_speed())
    }

    pub fn contact_power(&self, id: usize) -> Result<f64> {
        Ok(self.current_contact_result(id)?.power())
    }
}

/// dF = −coef · (法向分量 [+ 粘滞时切向分量])
fn linearized(result: &ContactResult, coef: f64, delta: DVec3) -> DVec3 {
    if !result.in_contact() {
        return DVec3::ZERO;
    }
    let n = result.normal;
    let normal = n * delta.dot(n);
    let mut df = -coef * normal;
    if result.sticking {
        df -= coef * (delta - normal);
    }
    df
}

impl LoadPhase<'_> {
    /// 将接触对 `id` 的力施加到两个刚体上
    pub fn apply_contact_force(&mut self, id: usize) -> Result<()> {
        self.engine.contact(id)?;
        self.engine.ensure_contact();
        self.push_contact(id);
        Ok(())
    }

    pub fn apply_contact_forces(&mut self) {
        self.engine.ensure_contact();
        for id in 0..self.engine.contact_results.len() {
            self.push_contact(id);
        }
    }

    fn push_contact(&mut self, id: usize) {
        let contact = &self.engine.topology.contacts[id];
        let result = &self.engine.contact_results[id];
        if result.force == DVec3::ZERO {
            return;
        }
        let bodies = &self.engine.kinematics.bodies;
        let r_b = result.point - bodies[contact.body_b].position;
        let r_a = result.point - bodies[contact.body_a].position;
        self.loads.add_point_force(contact.body_b, r_b, result.force);
        self.loads.add_point_force(contact.body_a, r_a, -result.force);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{ContactSpec, JointKind, JointSpec, ModelBuilder, Topology};
    use glam::DMat3;

    fn ball(material: ContactMaterial) -> Topology {
        let mut b = ModelBuilder::new();
        b.add_body("ball", 1.0, DMat3::IDENTITY * 0.01)
            .add_joint(
                JointSpec::new("float", "ground", "ball", JointKind::Free)
                    .coordinates(["tx", "ty", "tz", "rx", "ry", "rz"]),
            )
            .add_contact(ContactSpec {
                body_a: "ground".into(),
                point_a: DVec3::ZERO,
                body_b: "ball".into(),
                point_b: DVec3::new(0.0, -0.1, 0.0),
                normal: DVec3::Y,
                material,
            });
        b.build().unwrap()
    }

    fn material(friction: f64) -> ContactMaterial {
        ContactMaterial {
            stiffness: 1000.0,
            viscosity: 10.0,
            friction,
        }
    }

    #[test]
    fn test_separated_contact_is_inert() {
        let topo = ball(material(0.5));
        let kin = Kinematics::evaluate(&topo, &[0.0, 0.5, 0.0, 0.0, 0.0, 0.0], &[0.0, -1.0, 0.0, 0.0, 0.0, 0.0], &[0.0; 6]);
        let result = topo.contacts()[0].evaluate(&kin);
        assert_eq!(result.force, DVec3::ZERO);
        assert_eq!(result.penetration, 0.0);
        assert!((result.closing_speed() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_normal_force_from_penetration() {
        let topo = ball(material(0.5));
        let kin = Kinematics::positions(&topo, &[0.0, 0.08, 0.0, 0.0, 0.0, 0.0]);
        let result = topo.contacts()[0].evaluate(&kin);
        assert!((result.penetration - 0.02).abs() < 1e-12);
        assert!(result.normal_force.abs_diff_eq(DVec3::new(0.0, 20.0, 0.0), 1e-9));
        assert!(result.sticking);
        assert_eq!(result.friction_correction, DVec3::ZERO);
    }

    #[test]
    fn test_friction_cone_limits_tangent_force() {
        let topo = ball(material(0.25));
        let kin = Kinematics::positions(&topo, &[0.01, 0.08, 0.0, 0.0, 0.0, 0.0]);
        let result = topo.contacts()[0].evaluate(&kin);
        assert!(!result.sticking);
        assert!(result.tangent_elastic.abs_diff_eq(DVec3::new(-10.0, 0.0, 0.0), 1e-9));
        assert!(result.tangent_force.abs_diff_eq(DVec3::new(-5.0, 0.0, 0.0), 1e-9));
        assert!(result.friction_correction.abs_diff_eq(DVec3::new(-5.0, 0.0, 0.0), 1e-9));
        assert!((result.force.length() - (20.0f64.powi(2) + 25.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_linearized_stiffness() {
        let topo = ball(material(0.5));
        let kin = Kinematics::positions(&topo, &[0.0, 0.08, 0.0, 0.0, 0.0, 0.0]);
        let result = topo.contacts()[0].evaluate(&kin);
        let df = linearized(&result, 1000.0, DVec3::new(0.001, 0.002, 0.0));
        assert!(df.abs_diff_eq(DVec3::new(-1.0, -2.0, 0.0), 1e-12));
    }
}
