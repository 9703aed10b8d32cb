//! 刚体缩放
//!
//! ScaleSet 由外部缩放工具提供，引擎只负责应用：
//! 1. 校验全部条目（未知刚体、非正系数、非正目标质量），任何失败都不修改模型
//! 2. 缩放几何：质心→关节向量、子关节的父侧连接向量、接触点、约束点
//! 3. 缩放惯性（保持质量或按体积缩放质量）
//! 4. 可选：整体缩放质量到目标总质量

use glam::DVec3;

use crate::assembly::Constraint;
use crate::engine::DynamicsEngine;
use crate::error::{EngineError, Result};
use crate::topology::Category;

/// 单个刚体的缩放系数
#[derive(Clone, Debug, PartialEq)]
pub struct BodyScale {
    pub body: String,
    pub factors: DVec3,
}

/// 缩放指令集
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScaleSet {
    pub scales: Vec<BodyScale>,
    /// 保持每个刚体的质量不变
    pub preserve_mass: bool,
    /// 缩放后的系统总质量
    pub final_mass: Option<f64>,
}

impl ScaleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, body: impl Into<String>, factors: DVec3) -> Self {
        self.scales.push(BodyScale {
            body: body.into(),
            factors,
        });
        self
    }

    pub fn preserve_mass(mut self, preserve: bool) -> Self {
        self.preserve_mass = preserve;
        self
    }

    pub fn final_mass(mut self, mass: f64) -> Self {
        self.final_mass = Some(mass);
        self
    }
}

impl DynamicsEngine {
    /// 按 ScaleSet 自身的质量选项缩放
    pub fn scale(&mut self, set: &ScaleSet) -> Result<()> {
        self.scale_with_mass(set, set.preserve_mass, set.final_mass)
    }

    pub fn scale_with_mass(&mut self, set: &ScaleSet, preserve_mass: bool, final_mass: Option<f64>) -> Result<()> {
        // ====== 校验 ======
        let mut resolved = Vec::with_capacity(set.scales.len());
        for entry in &set.scales {
            let body = self
                .topology
                .index_of(Category::Body, &entry.body)
                .ok_or_else(|| EngineError::invalid_scale(format!("unknown body '{}'", entry.body)))?;
            let f = entry.factors;
            if !(f.x > 0.0 && f.y > 0.0 && f.z > 0.0) || !f.is_finite() {
                return Err(EngineError::invalid_scale(format!(
                    "body '{}' has non-positive scale factors {:?}",
                    entry.body, f
                )));
            }
            resolved.push((body, f));
        }
        if let Some(mass) = final_mass {
            if !(mass > 0.0 && mass.is_finite()) {
                return Err(EngineError::invalid_scale(format!("target mass {mass} must be positive")));
            }
            // 缩放后总质量为零时无法按比例达到目标
            let mut masses: Vec<f64> = self.topology.bodies.iter().map(|b| b.mass).collect();
            if !preserve_mass {
                for &(body, f) in &resolved {
                    masses[body] *= f.x * f.y * f.z;
                }
            }
            let scaled_total: f64 = masses.iter().sum();
            if !(scaled_total > 0.0) {
                return Err(EngineError::invalid_scale(format!(
                    "cannot reach target mass {mass}: model has no mass to scale"
                )));
            }
        }

        // ====== 几何与惯性 ======
        let topology = &mut self.topology;
        for &(body, factors) in &resolved {
            topology.bodies[body].scale(factors, !preserve_mass);

            for joint in topology.joints.iter_mut().filter(|j| j.parent == body) {
                joint.inboard_to_joint *= factors;
            }
            for contact in topology.contacts.iter_mut() {
                if contact.body_a == body {
                    contact.point_a *= factors;
                }
                if contact.body_b == body {
                    contact.point_b *= factors;
                }
            }
            for constraint in topology.constraints.iter_mut() {
                if let Constraint::PointOnPoint {
                    body_a,
                    point_a,
                    body_b,
                    point_b,
                } = constraint
                {
                    if *body_a == body {
                        *point_a *= factors;
                    }
                    if *body_b == body {
                        *point_b *= factors;
                    }
                }
            }
        }

        // ====== 目标总质量 ======
        if let Some(target) = final_mass {
            let total: f64 = self.topology.bodies.iter().map(|b| b.mass).sum();
            let factor = target / total;
            for body in self.topology.bodies.iter_mut().skip(1) {
                body.scale_mass(factor);
            }
        }

        log::info!(
            "[Scale] 缩放 {} 个刚体，总质量 {:.4}",
            resolved.len(),
            self.mass()
        );
        self.realize();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{JointKind, JointSpec, ModelBuilder};
    use glam::DMat3;

    fn leg() -> DynamicsEngine {
        let mut b = ModelBuilder::new();
        b.add_body("thigh", 8.0, DMat3::from_diagonal(DVec3::new(0.1, 0.02, 0.1)))
            .add_body("shank", 3.0, DMat3::from_diagonal(DVec3::new(0.04, 0.005, 0.04)))
            .add_joint(
                JointSpec::new("hip", "ground", "thigh", JointKind::Pin { axis: DVec3::Z })
                    .body_to_joint(DVec3::new(0.0, 0.2, 0.0))
                    .coordinates(["hip"]),
            )
            .add_joint(
                JointSpec::new("knee", "thigh", "shank", JointKind::Pin { axis: DVec3::Z })
                    .inboard_to_joint(DVec3::new(0.0, -0.2, 0.0))
                    .body_to_joint(DVec3::new(0.0, 0.2, 0.0))
                    .coordinates(["knee"]),
            );
        DynamicsEngine::new(b.build().unwrap())
    }

    #[test]
    fn test_geometry_scales_with_parent() {
        let mut engine = leg();
        let set = ScaleSet::new().with("thigh", DVec3::new(1.0, 1.5, 1.0)).preserve_mass(true);
        engine.scale(&set).unwrap();
        assert!(engine.body_to_joint(1).unwrap().abs_diff_eq(DVec3::new(0.0, 0.3, 0.0), 1e-12));
        assert!(engine.inboard_to_joint(2).unwrap().abs_diff_eq(DVec3::new(0.0, -0.3, 0.0), 1e-12));
        assert_eq!(engine.body_to_joint(2).unwrap(), DVec3::new(0.0, 0.2, 0.0));
        assert_eq!(engine.body_mass(1).unwrap(), 8.0);
        // 运动学立即更新
        let knee = engine.position(2, DVec3::new(0.0, 0.2, 0.0)).unwrap();
        assert!(knee.abs_diff_eq(DVec3::new(0.0, -0.6, 0.0), 1e-12));
    }

    #[test]
    fn test_final_mass_is_reached() {
        let mut engine = leg();
        let set = ScaleSet::new().with("shank", DVec3::splat(1.1));
        engine.scale_with_mass(&set, true, Some(70.0)).unwrap();
        assert!((engine.mass() - 70.0).abs() < 1e-9);
        // 比例保持
        let ratio = engine.body_mass(1).unwrap() / engine.body_mass(2).unwrap();
        assert!((ratio - 8.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_volume_scaling_changes_mass() {
        let mut engine = leg();
        engine
            .scale(&ScaleSet::new().with("shank", DVec3::new(2.0, 1.0, 1.0)))
            .unwrap();
        assert!((engine.body_mass(2).unwrap() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_set_does_not_mutate() {
        let mut engine = leg();
        let before = (engine.mass(), engine.body_to_joint(1).unwrap());

        let set = ScaleSet::new().with("thigh", DVec3::splat(2.0)).with("pelvis", DVec3::ONE);
        assert!(matches!(engine.scale(&set), Err(EngineError::InvalidScale(_))));

        let set = ScaleSet::new().with("thigh", DVec3::new(1.0, 0.0, 1.0));
        assert!(matches!(engine.scale(&set), Err(EngineError::InvalidScale(_))));

        let set = ScaleSet::new().with("thigh", DVec3::splat(2.0));
        assert!(matches!(engine.scale_with_mass(&set, true, Some(-1.0)), Err(EngineError::InvalidScale(_))));

        assert_eq!((engine.mass(), engine.body_to_joint(1).unwrap()), before);
    }

    #[test]
    fn test_massless_model_rejects_target_mass() {
        let mut b = ModelBuilder::new();
        b.add_body("link", 0.0, DMat3::ZERO).add_joint(
            JointSpec::new("pin", "ground", "link", JointKind::Pin { axis: DVec3::Z })
                .body_to_joint(DVec3::new(0.0, 0.5, 0.0))
                .coordinates(["q"]),
        );
        let mut engine = DynamicsEngine::new(b.build().unwrap());

        let set = ScaleSet::new().with("link", DVec3::splat(2.0));
        let err = engine.scale_with_mass(&set, true, Some(70.0)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidScale(_)));
        assert_eq!(engine.mass(), 0.0);
        assert_eq!(engine.body_to_joint(1).unwrap(), DVec3::new(0.0, 0.5, 0.0));

        // 无目标质量时照常缩放几何
        engine.scale(&set).unwrap();
        assert_eq!(engine.body_to_joint(1).unwrap(), DVec3::new(0.0, 1.0, 0.0));
    }
}
