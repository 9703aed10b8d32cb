//! 状态向量管理
//!
//! Y = (Q, U)，先全部坐标后全部速度。伪状态与控制量单独编号。

use super::DynamicsEngine;
use crate::error::{EngineError, Result};
use crate::topology::Category;

/// 长度与有限性检查
fn check_vector(what: &'static str, values: &[f64], expected: usize) -> Result<()> {
    if values.len() != expected {
        return Err(EngineError::dimension_mismatch(what, expected, values.len()));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(EngineError::NonFinite(what));
    }
    Ok(())
}

fn check_scalar(what: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(EngineError::NonFinite(what));
    }
    Ok(())
}

fn element(category: &'static str, values: &[f64], index: usize) -> Result<f64> {
    values
        .get(index)
        .copied()
        .ok_or_else(|| EngineError::index_out_of_range(category, index, values.len()))
}

impl DynamicsEngine {
    // ========================================
    // 时间
    // ========================================

    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    // ========================================
    // 状态 Y
    // ========================================

    pub fn set_state(&mut self, y: &[f64]) -> Result<()> {
        let n = self.topology.num_coordinates();
        check_vector("state", y, 2 * n)?;
        self.q.copy_from_slice(&y[..n]);
        self.u.copy_from_slice(&y[n..]);
        self.realize();
        Ok(())
    }

    pub fn state(&self) -> Vec<f64> {
        let mut y = Vec::with_capacity(2 * self.q.len());
        y.extend_from_slice(&self.q);
        y.extend_from_slice(&self.u);
        y
    }

    pub fn state_value(&self, index: usize) -> Result<f64> {
        let n = self.q.len();
        if index < n {
            Ok(self.q[index])
        } else {
            element("state", &self.u, index - n)
                .map_err(|_| EngineError::index_out_of_range("state", index, 2 * n))
        }
    }

    pub fn state_value_by_name(&self, name: &str) -> Option<f64> {
        let index = self.topology.index_of(Category::State, name)?;
        self.state_value(index).ok()
    }

    pub fn set_state_value(&mut self, index: usize, value: f64) -> Result<()> {
        let n = self.q.len();
        if index >= 2 * n {
            return Err(EngineError::index_out_of_range("state", index, 2 * n));
        }
        if !value.is_finite() {
            return Err(EngineError::NonFinite("state"));
        }
        if index < n {
            self.q[index] = value;
        } else {
            self.u[index - n] = value;
        }
        self.realize();
        Ok(())
    }

    /// 同 `set_state`
    pub fn set_configuration(&mut self, y: &[f64]) -> Result<()> {
        self.set_state(y)
    }

    pub fn set_configuration_split(&mut self, q: &[f64], u: &[f64]) -> Result<()> {
        let n = self.topology.num_coordinates();
        check_vector("coordinates", q, n)?;
        check_vector("speeds", u, n)?;
        self.q.copy_from_slice(q);
        self.u.copy_from_slice(u);
        self.realize();
        Ok(())
    }

    /// 将 Y 拆为 (Q, U)，不修改引擎
    pub fn extract_configuration(&self, y: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
        let n = self.topology.num_coordinates();
        if y.len() != 2 * n {
            return Err(EngineError::dimension_mismatch("state", 2 * n, y.len()));
        }
        Ok((y[..n].to_vec(), y[n..].to_vec()))
    }

    /// 只替换坐标（长度已知正确）
    pub(crate) fn set_coordinates_unchecked(&mut self, q: &[f64]) {
        self.q.copy_from_slice(q);
        self.realize();
    }

    /// 一次设置时间、控制量与状态
    pub fn set(&mut self, time: f64, controls: &[f64], y: &[f64]) -> Result<()> {
        check_vector("controls", controls, self.topology.num_controls())?;
        check_vector("state", y, self.topology.num_states())?;
        self.time = time;
        self.controls.copy_from_slice(controls);
        self.set_state(y)
    }

    // ========================================
    // 初始状态
    // ========================================

    pub fn initial_state(&self) -> &[f64] {
        &self.initial_state
    }

    pub fn set_initial_state(&mut self, y: &[f64]) -> Result<()> {
        check_vector("initial state", y, self.topology.num_states())?;
        self.initial_state.copy_from_slice(y);
        Ok(())
    }

    pub fn initial_state_value(&self, index: usize) -> Result<f64> {
        element("state", &self.initial_state, index)
    }

    pub fn initial_state_value_by_name(&self, name: &str) -> Option<f64> {
        let index = self.topology.index_of(Category::State, name)?;
        self.initial_state.get(index).copied()
    }

    /// 恢复初始状态与初始伪状态
    pub fn reset_to_initial_state(&mut self) {
        let n = self.q.len();
        self.q.copy_from_slice(&self.initial_state[..n]);
        self.u.copy_from_slice(&self.initial_state[n..]);
        self.pseudo.copy_from_slice(&self.initial_pseudo);
        self.realize();
    }

    /// 坐标取默认值，速度清零
    pub fn apply_default_pose(&mut self) {
        for (q, coordinate) in self.q.iter_mut().zip(&self.topology.coordinates) {
            *q = coordinate.default_value;
        }
        self.u.fill(0.0);
        self.realize();
    }

    // ========================================
    // 伪状态
    // ========================================

    pub fn pseudo_states(&self) -> &[f64] {
        &self.pseudo
    }

    pub fn set_pseudo_states(&mut self, values: &[f64]) -> Result<()> {
        check_vector("pseudo-states", values, self.topology.num_pseudo_states())?;
        self.pseudo.copy_from_slice(values);
        Ok(())
    }

    pub fn pseudo_state_value(&self, index: usize) -> Result<f64> {
        element("pseudo-state", &self.pseudo, index)
    }

    pub fn pseudo_state_value_by_name(&self, name: &str) -> Option<f64> {
        let index = self.topology.index_of(Category::PseudoState, name)?;
        self.pseudo.get(index).copied()
    }

    pub fn set_pseudo_state_value(&mut self, index: usize, value: f64) -> Result<()> {
        element("pseudo-state", &self.pseudo, index)?;
        check_scalar("pseudo-state", value)?;
        self.pseudo[index] = value;
        Ok(())
    }

    pub fn initial_pseudo_states(&self) -> &[f64] {
        &self.initial_pseudo
    }

    pub fn set_initial_pseudo_states(&mut self, values: &[f64]) -> Result<()> {
        check_vector("initial pseudo-states", values, self.topology.num_pseudo_states())?;
        self.initial_pseudo.copy_from_slice(values);
        Ok(())
    }

    pub fn initial_pseudo_state_value(&self, index: usize) -> Result<f64> {
        element("pseudo-state", &self.initial_pseudo, index)
    }

    pub fn initial_pseudo_state_value_by_name(&self, name: &str) -> Option<f64> {
        let index = self.topology.index_of(Category::PseudoState, name)?;
        self.initial_pseudo.get(index).copied()
    }

    // ========================================
    // 控制量
    // ========================================

    pub fn controls(&self) -> &[f64] {
        &self.controls
    }

    pub fn set_controls(&mut self, controls: &[f64]) -> Result<()> {
        check_vector("controls", controls, self.topology.num_controls())?;
        self.controls.copy_from_slice(controls);
        Ok(())
    }

    pub fn control(&self, index: usize) -> Result<f64> {
        element("control", &self.controls, index)
    }

    pub fn set_control(&mut self, index: usize, value: f64) -> Result<()> {
        element("control", &self.controls, index)?;
        check_scalar("control", value)?;
        self.controls[index] = value;
        Ok(())
    }

    // ========================================
    // Q / U / U̇
    // ========================================

    pub fn coordinate_values(&self) -> &[f64] {
        &self.q
    }

    pub fn coordinate_value(&self, index: usize) -> Result<f64> {
        element("coordinate", &self.q, index)
    }

    pub fn coordinate_value_by_name(&self, name: &str) -> Option<f64> {
        let index = self.topology.index_of(Category::Coordinate, name)?;
        self.q.get(index).copied()
    }

    pub fn speeds(&self) -> &[f64] {
        &self.u
    }

    pub fn speed(&self, index: usize) -> Result<f64> {
        element("speed", &self.u, index)
    }

    /// 按速度名（`<coordinate>_u`）查找
    pub fn speed_by_name(&self, name: &str) -> Option<f64> {
        let index = self.topology.index_of(Category::Speed, name)?;
        self.u.get(index).copied()
    }

    /// 最近一次求导的广义加速度（之前为零）
    pub fn accelerations(&self) -> &[f64] {
        &self.udot
    }

    pub fn coordinate_acceleration(&self, index: usize) -> Result<f64> {
        element("speed", &self.udot, index)
    }

    pub fn coordinate_acceleration_by_name(&self, name: &str) -> Option<f64> {
        let index = self
            .topology
            .index_of(Category::Speed, name)
            .or_else(|| self.topology.index_of(Category::Coordinate, name))?;
        self.udot.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::pendulum;
    use super::*;

    #[test]
    fn test_state_round_trip() {
        let mut engine = pendulum();
        let y = vec![0.7, -1.3];
        engine.set_state(&y).unwrap();
        assert_eq!(engine.state(), y);

        let (q, u) = engine.extract_configuration(&y).unwrap();
        assert_eq!([q, u].concat(), y);
        // extract 不修改引擎
        engine.extract_configuration(&[9.0, 9.0]).unwrap();
        assert_eq!(engine.state(), y);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let mut engine = pendulum();
        let err = engine.set_state(&[1.0]).unwrap_err();
        assert!(matches!(err, EngineError::DimensionMismatch { expected: 2, actual: 1, .. }));
        assert!(engine.set_configuration_split(&[1.0], &[]).is_err());
        assert!(matches!(engine.set_state(&[f64::NAN, 0.0]), Err(EngineError::NonFinite(_))));
        assert_eq!(engine.state(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_single_value_setters_reject_non_finite() {
        use crate::topology::{ActuatorSpec, JointKind, JointSpec, ModelBuilder, RateSpec};
        use glam::{DMat3, DVec3};

        let mut b = ModelBuilder::new();
        b.add_body("rod", 1.0, DMat3::IDENTITY)
            .add_joint(
                JointSpec::new("pivot", "ground", "rod", JointKind::Pin { axis: DVec3::Z }).coordinates(["theta"]),
            )
            .add_actuator(ActuatorSpec::new("motor", "theta", 1.0))
            .add_pseudo_state("integral", 0.5, RateSpec::ControlIntegrator { control: "motor".into() });
        let mut engine = DynamicsEngine::new(b.build().unwrap());

        assert!(matches!(engine.set_control(0, f64::NAN), Err(EngineError::NonFinite(_))));
        assert!(matches!(engine.set_control(0, f64::INFINITY), Err(EngineError::NonFinite(_))));
        assert!(matches!(engine.set_pseudo_state_value(0, f64::NAN), Err(EngineError::NonFinite(_))));
        assert_eq!(engine.control(0).unwrap(), 0.0);
        assert_eq!(engine.pseudo_state_value(0).unwrap(), 0.5);

        // 越界优先报告索引错误
        assert!(matches!(engine.set_control(3, f64::NAN), Err(EngineError::IndexOutOfRange { .. })));
        engine.set_control(0, 0.25).unwrap();
        assert_eq!(engine.compute_auxiliary_derivatives(), vec![0.25]);
    }

    #[test]
    fn test_values_by_name() {
        let mut engine = pendulum();
        engine.set_state(&[0.25, 2.0]).unwrap();
        assert_eq!(engine.state_value_by_name("theta"), Some(0.25));
        assert_eq!(engine.state_value_by_name("theta_u"), Some(2.0));
        assert_eq!(engine.speed_by_name("theta_u"), Some(2.0));
        assert_eq!(engine.coordinate_value_by_name("theta"), Some(0.25));
        assert_eq!(engine.coordinate_value_by_name("phi"), None);
        assert!(engine.state_value(2).is_err());
    }

    #[test]
    fn test_set_state_value_realizes() {
        let mut engine = pendulum();
        engine.set_state_value(0, std::f64::consts::PI).unwrap();
        let com = engine.position(1, glam::DVec3::ZERO).unwrap();
        assert!(com.abs_diff_eq(glam::DVec3::new(0.0, 0.5, 0.0), 1e-12));
        engine.set_state_value(1, 3.0).unwrap();
        assert_eq!(engine.speed(0).unwrap(), 3.0);
    }

    #[test]
    fn test_reset_and_default_pose() {
        let mut engine = pendulum();
        engine.set_initial_state(&[0.1, 0.2]).unwrap();
        engine.set_state(&[1.0, 1.0]).unwrap();
        engine.reset_to_initial_state();
        assert_eq!(engine.state(), vec![0.1, 0.2]);
        engine.apply_default_pose();
        assert_eq!(engine.state(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_set_all_at_once() {
        let mut engine = pendulum();
        engine.set(1.5, &[0.4], &[0.3, 0.0]).unwrap();
        assert_eq!(engine.time(), 1.5);
        assert_eq!(engine.control(0).unwrap(), 0.4);
        assert_eq!(engine.coordinate_value(0).unwrap(), 0.3);
        assert!(engine.set(2.0, &[], &[0.3, 0.0]).is_err());
        assert_eq!(engine.time(), 1.5);
    }
}
