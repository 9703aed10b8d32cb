//! 外部协作者接口
//!
//! 模型加载、逆运动学、缩放算法都在引擎之外实现，
//! 这里只定义它们与引擎交换数据的形状。

use glam::DVec3;

use crate::engine::DynamicsEngine;
use crate::error::Result;
use crate::scale::ScaleSet;
use crate::topology::ModelBuilder;

/// 模型加载器：把外部定义（文件、文档节点）填入构建器
pub trait ModelLoader {
    fn populate(&self, builder: &mut ModelBuilder) -> Result<()>;
}

/// 逆运动学标记目标
#[derive(Clone, Debug, PartialEq)]
pub struct IkTarget {
    pub name: String,
    pub body: usize,
    /// 体上标记点（体坐标系）
    pub point: DVec3,
    /// 目标位置（地面坐标系）
    pub target: DVec3,
    pub weight: f64,
}

impl IkTarget {
    /// 当前标记点位置与目标之差
    pub fn error(&self, engine: &DynamicsEngine) -> Result<DVec3> {
        Ok(engine.position(self.body, self.point)? - self.target)
    }
}

/// 加权平方误差和
pub fn weighted_squared_error(engine: &DynamicsEngine, targets: &[IkTarget]) -> Result<f64> {
    targets.iter().try_fold(0.0, |acc, target| {
        Ok(acc + target.weight * target.error(engine)?.length_squared())
    })
}

/// 逆运动学求解器：调整引擎状态使标记点逼近目标，返回最终状态 Y
pub trait IkSolver {
    fn solve(&mut self, engine: &mut DynamicsEngine, targets: &[IkTarget]) -> Result<Vec<f64>>;
}

/// 缩放工具：根据测量计算 ScaleSet
pub trait Scaler {
    fn compute_scale_set(&mut self, engine: &DynamicsEngine) -> Result<ScaleSet>;

    fn apply(&mut self, engine: &mut DynamicsEngine) -> Result<ScaleSet> {
        let set = self.compute_scale_set(engine)?;
        engine.scale(&set)?;
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{JointKind, JointSpec};
    use glam::DMat3;

    struct ArmLoader;

    impl ModelLoader for ArmLoader {
        fn populate(&self, builder: &mut ModelBuilder) -> Result<()> {
            builder.add_body("arm", 1.0, DMat3::IDENTITY * 0.01).add_joint(
                JointSpec::new("shoulder", "ground", "arm", JointKind::Pin { axis: DVec3::Z })
                    .body_to_joint(DVec3::new(0.0, 0.5, 0.0))
                    .coordinates(["shoulder"]),
            );
            Ok(())
        }
    }

    /// 用 Jacobian 转置迭代的简单 IK
    struct GradientIk {
        iterations: usize,
        step: f64,
    }

    impl IkSolver for GradientIk {
        fn solve(&mut self, engine: &mut DynamicsEngine, targets: &[IkTarget]) -> Result<Vec<f64>> {
            for _ in 0..self.iterations {
                let mut q = engine.coordinate_values().to_vec();
                for target in targets {
                    let error = target.error(engine)?;
                    let jac = engine.form_jacobian_translation(target.body, target.point, None)?;
                    for (c, qc) in q.iter_mut().enumerate() {
                        let column = DVec3::new(jac[(0, c)], jac[(1, c)], jac[(2, c)]);
                        *qc -= self.step * target.weight * column.dot(error);
                    }
                }
                let u = engine.speeds().to_vec();
                engine.set_configuration_split(&q, &u)?;
            }
            Ok(engine.state())
        }
    }

    struct UniformScaler(f64);

    impl Scaler for UniformScaler {
        fn compute_scale_set(&mut self, _engine: &DynamicsEngine) -> Result<ScaleSet> {
            Ok(ScaleSet::new().with("arm", DVec3::splat(self.0)).preserve_mass(true))
        }
    }

    #[test]
    fn test_loader_builds_engine() {
        let engine = DynamicsEngine::from_loader(&ArmLoader).unwrap();
        assert_eq!(engine.topology().num_coordinates(), 1);
    }

    #[test]
    fn test_ik_solver_reduces_error() {
        let mut engine = DynamicsEngine::from_loader(&ArmLoader).unwrap();
        let targets = [IkTarget {
            name: "hand".into(),
            body: 1,
            point: DVec3::new(0.0, -0.5, 0.0),
            target: DVec3::new(1.0, 0.0, 0.0),
            weight: 1.0,
        }];
        let before = weighted_squared_error(&engine, &targets).unwrap();
        let mut solver = GradientIk { iterations: 200, step: 0.5 };
        let state = solver.solve(&mut engine, &targets).unwrap();
        let after = weighted_squared_error(&engine, &targets).unwrap();
        assert!(after < 1e-6 * before);
        assert_eq!(engine.state(), state);
        assert!((state[0] - std::f64::consts::FRAC_PI_2).abs() < 1e-3);
    }

    #[test]
    fn test_scaler_applies_set() {
        let mut engine = DynamicsEngine::from_loader(&ArmLoader).unwrap();
        let set = UniformScaler(2.0).apply(&mut engine).unwrap();
        assert_eq!(set.scales.len(), 1);
        assert_eq!(engine.body_to_joint(1).unwrap(), DVec3::new(0.0, 1.0, 0.0));
    }
}
