//! 引擎错误类型
//!
//! 名称查找失败不属于错误（返回 `None`），其余失败均通过 `EngineError` 上报。

use thiserror::Error;

/// 引擎错误
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// 数值索引越界（调用方违反契约）
    #[error("{category} index {index} out of range (count {count})")]
    IndexOutOfRange {
        category: &'static str,
        index: usize,
        count: usize,
    },

    /// 向量长度不匹配
    #[error("{what}: expected length {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// 当前构型下质量矩阵不可逆
    #[error("mass matrix is singular at the current configuration")]
    SingularMassMatrix,

    /// Jacobian / Euler 变换退化（万向节锁）
    #[error("degenerate jacobian for body {body}: {reason}")]
    DegenerateJacobian { body: usize, reason: String },

    /// 装配未在评估预算内收敛，携带迄今最优状态
    #[error("assembly did not converge after {evaluations} evaluations (residual {residual:e})")]
    AssemblyNotConverged {
        best_state: Vec<f64>,
        evaluations: usize,
        residual: f64,
    },

    /// 缩放请求被拒绝
    #[error("invalid scale: {0}")]
    InvalidScale(String),

    /// 拓扑定义非法
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// 轨迹缓冲区中不存在的列
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    /// 输入含 NaN / Inf
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}

impl EngineError {
    pub fn index_out_of_range(category: &'static str, index: usize, count: usize) -> Self {
        Self::IndexOutOfRange { category, index, count }
    }

    pub fn dimension_mismatch(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { what, expected, actual }
    }

    pub fn degenerate_jacobian(body: usize, reason: impl Into<String>) -> Self {
        Self::DegenerateJacobian { body, reason: reason.into() }
    }

    pub fn invalid_scale(reason: impl Into<String>) -> Self {
        Self::InvalidScale(reason.into())
    }

    pub fn invalid_topology(reason: impl Into<String>) -> Self {
        Self::InvalidTopology(reason.into())
    }

    /// 稳定的非零错误码（0 保留给成功）
    pub fn code(&self) -> i32 {
        match self {
            Self::IndexOutOfRange { .. } => 1,
            Self::DimensionMismatch { .. } => 2,
            Self::SingularMassMatrix => 3,
            Self::DegenerateJacobian { .. } => 4,
            Self::AssemblyNotConverged { .. } => 5,
            Self::InvalidScale(_) => 6,
            Self::InvalidTopology(_) => 7,
            Self::UnknownColumn(_) => 8,
            Self::NonFinite(_) => 9,
        }
    }
}

/// 引擎结果类型
pub type Result<T> = std::result::Result<T, EngineError>;
