//! 执行器与伪状态
//!
//! - CoordinateActuator：标量执行器，一个控制量，作用为广义力
//! - PseudoState：独立于 Q/U 的辅助状态（例如激活度），由变化率模型驱动

/// 坐标执行器
///
/// 作用力 = clamp(control) × optimal_force，直接加到所驱动坐标的广义力上。
/// 覆盖模式下忽略控制量，使用覆盖值。
#[derive(Clone, Debug)]
pub struct CoordinateActuator {
    pub name: String,
    /// 被驱动的广义坐标（同时也是广义速度索引）
    pub coordinate: usize,
    /// 控制量索引
    pub control: usize,
    pub optimal_force: f64,
    pub min_control: f64,
    pub max_control: f64,
    /// 覆盖作用力
    pub(crate) override_actuation: Option<f64>,
}

impl CoordinateActuator {
    pub(crate) fn new(
        name: String,
        coordinate: usize,
        control: usize,
        optimal_force: f64,
        min_control: f64,
        max_control: f64,
    ) -> Self {
        Self {
            name,
            coordinate,
            control,
            optimal_force,
            min_control,
            max_control,
            override_actuation: None,
        }
    }

    /// 由控制向量计算作用力
    pub fn actuation(&self, controls: &[f64]) -> f64 {
        if let Some(value) = self.override_actuation {
            return value;
        }
        let control = controls
            .get(self.control)
            .copied()
            .unwrap_or(0.0)
            .clamp(self.min_control, self.max_control);
        control * self.optimal_force
    }

    #[inline]
    pub fn is_actuation_overridden(&self) -> bool {
        self.override_actuation.is_some()
    }

    #[inline]
    pub fn override_actuation(&self) -> Option<f64> {
        self.override_actuation
    }
}

/// 伪状态变化率模型
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PseudoStateModel {
    /// 一阶激活动力学：ȧ = (x − a) / τ，x ∈ [0, 1]；x > a 用激活时间常数，否则用失活时间常数
    Activation {
        control: usize,
        activation_time: f64,
        deactivation_time: f64,
    },
    /// ẏ = x
    ControlIntegrator { control: usize },
    /// ẏ = 0
    Constant,
}

/// 伪状态
#[derive(Clone, Debug)]
pub struct PseudoState {
    pub name: String,
    pub index: usize,
    pub default_value: f64,
    pub model: PseudoStateModel,
}

impl PseudoState {
    /// 变化率；只读取控制量与自身值
    pub fn rate(&self, value: f64, controls: &[f64]) -> f64 {
        let control = |c: usize| controls.get(c).copied().unwrap_or(0.0);
        match self.model {
            PseudoStateModel::Activation {
                control: c,
                activation_time,
                deactivation_time,
            } => {
                let excitation = control(c).clamp(0.0, 1.0);
                let tau = if excitation > value {
                    activation_time
                } else {
                    deactivation_time
                };
                (excitation - value) / tau
            }
            PseudoStateModel::ControlIntegrator { control: c } => control(c),
            PseudoStateModel::Constant => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actuation_clamps_control() {
        let act = CoordinateActuator::new("hip".into(), 0, 0, 100.0, -1.0, 1.0);
        assert_eq!(act.actuation(&[0.5]), 50.0);
        assert_eq!(act.actuation(&[3.0]), 100.0);
        assert_eq!(act.actuation(&[]), 0.0);
    }

    #[test]
    fn test_override() {
        let mut act = CoordinateActuator::new("hip".into(), 0, 0, 100.0, -1.0, 1.0);
        act.override_actuation = Some(-7.0);
        assert!(act.is_actuation_overridden());
        assert_eq!(act.actuation(&[0.5]), -7.0);
    }

    #[test]
    fn test_activation_time_constants() {
        let state = PseudoState {
            name: "activation".into(),
            index: 0,
            default_value: 0.0,
            model: PseudoStateModel::Activation {
                control: 0,
                activation_time: 0.01,
                deactivation_time: 0.04,
            },
        };
        assert!((state.rate(0.0, &[1.0]) - 100.0).abs() < 1e-9);
        assert!((state.rate(1.0, &[0.0]) + 25.0).abs() < 1e-9);
        assert_eq!(state.rate(0.3, &[0.3]), 0.0);
    }
}
