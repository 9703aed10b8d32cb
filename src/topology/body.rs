//! 刚体节点
//!
//! 每个 Body 代表运动树中的一个刚体段。
//! 体坐标系原点位于质心，惯性张量相对质心、在体坐标系中表达。

use glam::{DMat3, DVec3};

/// 刚体
#[derive(Clone, Debug)]
pub struct Body {
    // ========================================
    // 静态数据（拓扑确定后不变）
    // ========================================

    /// 刚体名称
    pub name: String,

    /// 刚体索引（0 为地面）
    pub(crate) index: usize,

    /// 内侧关节索引（地面为 None）
    pub(crate) inboard_joint: Option<usize>,

    // ========================================
    // 数值参数（仅 scale / setter 修改）
    // ========================================

    /// 质量
    pub mass: f64,

    /// 质心惯性张量（体坐标系）
    pub inertia: DMat3,

    /// 质心指向内侧关节点的向量（体坐标系）
    pub body_to_joint: DVec3,
}

impl Body {
    /// 创建新刚体
    pub fn new(name: impl Into<String>, mass: f64, inertia: DMat3) -> Self {
        Self {
            name: name.into(),
            index: 0,
            inboard_joint: None,
            mass,
            inertia,
            body_to_joint: DVec3::ZERO,
        }
    }

    /// 地面刚体：无质量、固定
    pub(crate) fn ground(name: impl Into<String>) -> Self {
        Self::new(name, 0.0, DMat3::ZERO)
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn inboard_joint(&self) -> Option<usize> {
        self.inboard_joint
    }

    #[inline]
    pub fn is_ground(&self) -> bool {
        self.index == 0
    }

    /// 按轴向缩放几何与惯性
    ///
    /// 二阶矩 P = ∫ρ r rᵀ 满足 I = tr(P)·1 − P；坐标按 S 缩放后
    /// P' = k · S P S，其中 k 为质量缩放系数（保持质量时为 1，按体积缩放时为 det S）。
    pub(crate) fn scale(&mut self, factors: DVec3, scale_mass: bool) {
        let s = DMat3::from_diagonal(factors);
        let trace = self.inertia.x_axis.x + self.inertia.y_axis.y + self.inertia.z_axis.z;
        let second_moment = DMat3::from_diagonal(DVec3::splat(0.5 * trace)) - self.inertia;

        let mass_factor = if scale_mass {
            factors.x * factors.y * factors.z
        } else {
            1.0
        };
        let scaled = (s * second_moment * s) * mass_factor;
        let scaled_trace = scaled.x_axis.x + scaled.y_axis.y + scaled.z_axis.z;

        self.inertia = DMat3::from_diagonal(DVec3::splat(scaled_trace)) - scaled;
        self.mass *= mass_factor;
        self.body_to_joint *= factors;
    }

    /// 等比缩放质量与惯性
    pub(crate) fn scale_mass(&mut self, factor: f64) {
        self.mass *= factor;
        self.inertia *= factor;
    }
}
