//! 载荷累加
//!
//! 载荷只存在于一个 `LoadPhase` 内：`DynamicsEngine::begin_loads()` 开启一个空的阶段，
//! 外部代码在其中施加力，`compute_accelerations()` 消耗该阶段。
//! 上一步的载荷因此不可能泄漏到下一步。
//!
//! 所有 apply_* 都是累加而非替换。

use glam::DVec3;

use crate::engine::DynamicsEngine;
use crate::error::{EngineError, Result};
use crate::kinematics::Kinematics;
use crate::topology::Topology;

/// 载荷累加器：每个刚体在质心处的合力与合力矩（地面坐标系），以及每个广义速度上的广义力
#[derive(Clone, Debug)]
pub struct LoadAccumulator {
    forces: Vec<DVec3>,
    torques: Vec<DVec3>,
    generalized: Vec<f64>,
}

impl LoadAccumulator {
    pub fn new(num_bodies: usize, num_speeds: usize) -> Self {
        Self {
            forces: vec![DVec3::ZERO; num_bodies],
            torques: vec![DVec3::ZERO; num_bodies],
            generalized: vec![0.0; num_speeds],
        }
    }

    /// 在相对质心 `r`（地面坐标）处施加力 F
    #[inline]
    pub(crate) fn add_point_force(&mut self, body: usize, r: DVec3, force: DVec3) {
        self.forces[body] += force;
        self.torques[body] += r.cross(force);
    }

    #[inline]
    pub(crate) fn add_torque(&mut self, body: usize, torque: DVec3) {
        self.torques[body] += torque;
    }

    #[inline]
    pub(crate) fn add_generalized(&mut self, speed: usize, force: f64) {
        self.generalized[speed] += force;
    }

    /// 刚体质心处合力（地面坐标系）
    pub fn body_force(&self, body: usize) -> DVec3 {
        self.forces.get(body).copied().unwrap_or(DVec3::ZERO)
    }

    /// 刚体合力矩（地面坐标系）
    pub fn body_torque(&self, body: usize) -> DVec3 {
        self.torques.get(body).copied().unwrap_or(DVec3::ZERO)
    }

    /// 直接施加的广义力
    pub fn direct_generalized_forces(&self) -> &[f64] {
        &self.generalized
    }

    /// 全部载荷投影到广义力（不含重力）
    pub fn generalized_forces(&self, topology: &Topology, kinematics: &Kinematics) -> Vec<f64> {
        let mut out = vec![0.0; topology.num_speeds()];
        for (slot, value) in out.iter_mut().zip(&self.generalized) {
            *slot = *value;
        }
        for body in 1..topology.num_bodies() {
            let (force, torque) = (self.body_force(body), self.body_torque(body));
            if force == DVec3::ZERO && torque == DVec3::ZERO {
                continue;
            }
            kinematics.project_load(
                topology,
                body,
                kinematics.bodies[body].position,
                force,
                torque,
                &mut out,
            );
        }
        out
    }
}

/// 一次导数求值的载荷阶段
///
/// 持有引擎的可变借用，阶段存续期间无法修改状态。
pub struct LoadPhase<'a> {
    pub(crate) engine: &'a mut DynamicsEngine,
    pub(crate) loads: LoadAccumulator,
}

impl<'a> LoadPhase<'a> {
    pub(crate) fn new(engine: &'a mut DynamicsEngine) -> Self {
        let loads = LoadAccumulator::new(engine.topology.num_bodies(), engine.topology.num_speeds());
        Self { engine, loads }
    }

    /// 只读访问引擎（运动学查询等）
    pub fn engine(&self) -> &DynamicsEngine {
        &*self.engine
    }

    pub fn loads(&self) -> &LoadAccumulator {
        &self.loads
    }

    // ========================================
    // 地面坐标系中的力
    // ========================================

    /// 在体上点 `point`（体坐标系）施加力 `force`（地面坐标系）
    pub fn apply_force(&mut self, body: usize, point: DVec3, force: DVec3) -> Result<()> {
        self.engine.topology.check_body(body)?;
        let r = self.engine.kinematics.bodies[body].rotation * point;
        self.loads.add_point_force(body, r, force);
        Ok(())
    }

    pub fn apply_forces(&mut self, bodies: &[usize], points: &[DVec3], forces: &[DVec3]) -> Result<()> {
        self.check_batch(bodies, &[points.len(), forces.len()])?;
        for ((&body, &point), &force) in bodies.iter().zip(points).zip(forces) {
            self.apply_force(body, point, force)?;
        }
        Ok(())
    }

    // ========================================
    // 体坐标系中的力
    // ========================================

    /// 点与力均在体坐标系中表达
    pub fn apply_force_body_local(&mut self, body: usize, point: DVec3, force: DVec3) -> Result<()> {
        self.engine.topology.check_body(body)?;
        let rotation = self.engine.kinematics.bodies[body].rotation;
        self.loads.add_point_force(body, rotation * point, rotation * force);
        Ok(())
    }

    pub fn apply_forces_body_local(&mut self, bodies: &[usize], points: &[DVec3], forces: &[DVec3]) -> Result<()> {
        self.check_batch(bodies, &[points.len(), forces.len()])?;
        for ((&body, &point), &force) in bodies.iter().zip(points).zip(forces) {
            self.apply_force_body_local(body, point, force)?;
        }
        Ok(())
    }

    // ========================================
    // 力矩
    // ========================================

    pub fn apply_torque(&mut self, body: usize, torque: DVec3) -> Result<()> {
        self.engine.topology.check_body(body)?;
        self.loads.add_torque(body, torque);
        Ok(())
    }

    pub fn apply_torques(&mut self, bodies: &[usize], torques: &[DVec3]) -> Result<()> {
        self.check_batch(bodies, &[torques.len()])?;
        for (&body, &torque) in bodies.iter().zip(torques) {
            self.apply_torque(body, torque)?;
        }
        Ok(())
    }

    pub fn apply_torque_body_local(&mut self, body: usize, torque: DVec3) -> Result<()> {
        self.engine.topology.check_body(body)?;
        let rotation = self.engine.kinematics.bodies[body].rotation;
        self.loads.add_torque(body, rotation * torque);
        Ok(())
    }

    pub fn apply_torques_body_local(&mut self, bodies: &[usize], torques: &[DVec3]) -> Result<()> {
        self.check_batch(bodies, &[torques.len()])?;
        for (&body, &torque) in bodies.iter().zip(torques) {
            self.apply_torque_body_local(body, torque)?;
        }
        Ok(())
    }

    // ========================================
    // 广义力
    // ========================================

    pub fn apply_generalized_force(&mut self, speed: usize, force: f64) -> Result<()> {
        self.engine.topology.check_coordinate(speed)?;
        self.loads.add_generalized(speed, force);
        Ok(())
    }

    /// 每个广义速度一个值
    pub fn apply_generalized_forces(&mut self, forces: &[f64]) -> Result<()> {
        let n = self.engine.topology.num_speeds();
        if forces.len() != n {
            return Err(EngineError::dimension_mismatch("generalized forces", n, forces.len()));
        }
        for (speed, &force) in forces.iter().enumerate() {
            self.loads.add_generalized(speed, force);
        }
        Ok(())
    }

    pub fn apply_generalized_forces_at(&mut self, speeds: &[usize], forces: &[f64]) -> Result<()> {
        if speeds.len() != forces.len() {
            return Err(EngineError::dimension_mismatch("generalized forces", speeds.len(), forces.len()));
        }
        for &speed in speeds {
            self.engine.topology.check_coordinate(speed)?;
        }
        for (&speed, &force) in speeds.iter().zip(forces) {
            self.loads.add_generalized(speed, force);
        }
        Ok(())
    }

    /// 所有执行器的作用力作为广义力施加
    pub fn apply_actuator_forces(&mut self) {
        let engine = &*self.engine;
        for actuator in &engine.topology.actuators {
            let actuation = actuator.actuation(&engine.controls);
            self.loads.add_generalized(actuator.coordinate, actuation);
        }
    }

    // ========================================
    // 查询
    // ========================================

    /// 当前累加载荷在广义速度 `speed` 上的投影（不含重力）
    pub fn net_applied_generalized_force(&self, speed: usize) -> Result<f64> {
        self.engine.topology.check_coordinate(speed)?;
        let all = self.loads.generalized_forces(&self.engine.topology, &self.engine.kinematics);
        Ok(all[speed])
    }

    /// 批量接口：先校验全部索引，再施加，避免部分写入
    fn check_batch(&self, bodies: &[usize], lengths: &[usize]) -> Result<()> {
        for &len in lengths {
            if len != bodies.len() {
                return Err(EngineError::dimension_mismatch("load batch", bodies.len(), len));
            }
        }
        for &body in bodies {
            self.engine.topology.check_body(body)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{JointKind, JointSpec, ModelBuilder};
    use glam::DMat3;

    fn slider() -> Topology {
        let mut b = ModelBuilder::new();
        b.add_body("cart", 2.0, DMat3::IDENTITY).add_joint(
            JointSpec::new("rail", "ground", "cart", JointKind::Slider { axis: DVec3::X }).coordinates(["x"]),
        );
        b.build().unwrap()
    }

    #[test]
    fn test_projection_onto_slider() {
        let topo = slider();
        let kin = Kinematics::positions(&topo, &[0.3]);
        let mut loads = LoadAccumulator::new(topo.num_bodies(), topo.num_speeds());
        loads.add_point_force(1, DVec3::new(0.0, 0.1, 0.0), DVec3::new(3.0, 4.0, 0.0));
        loads.add_generalized(0, 0.5);
        assert_eq!(loads.generalized_forces(&topo, &kin), vec![3.5]);
    }

    #[test]
    fn test_undersized_accumulator_projects_to_zero() {
        let topo = slider();
        let kin = Kinematics::positions(&topo, &[0.0]);
        let empty = LoadAccumulator::new(0, 0);
        assert_eq!(empty.generalized_forces(&topo, &kin), vec![0.0]);
        assert_eq!(empty.body_force(1), DVec3::ZERO);
    }
}
