//! 引擎配置
//!
//! 所有参数扁平化，直接在代码中修改默认值即可。
//! 引擎在构造时读取一次配置快照，之后修改全局配置不影响已存在的引擎。

use glam::DVec3;
use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 引擎配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct EngineConfig {
    // ========== 重力 ==========
    /// 重力加速度（地面坐标系），默认 (0, -9.80665, 0)
    pub gravity: DVec3,

    // ========== 数值容差 ==========
    /// 质量矩阵奇异判定：最小奇异值 <= tol * 最大奇异值
    pub singular_tolerance: f64,
    /// Euler 角奇异判定：|cos(中间角)| < tol 视为万向节锁
    pub euler_singularity_tolerance: f64,

    // ========== 装配 ==========
    /// 默认装配容差（残差 2-范数）
    pub assembly_tolerance: f64,
    /// 默认残差评估预算
    pub assembly_max_evaluations: usize,
    /// Levenberg-Marquardt 初始阻尼
    pub assembly_initial_damping: f64,
    /// 阻尼上限，超过即放弃
    pub assembly_max_damping: f64,

    // ========== 调试 ==========
    /// 是否输出调试日志，默认 false
    pub debug_log: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // ====== 重力 ======
            // 标准重力，Y 轴向上
            gravity: DVec3::new(0.0, -9.80665, 0.0),

            // ====== 数值容差 ======
            singular_tolerance: 1.0e-12,
            euler_singularity_tolerance: 1.0e-9,

            // ====== 装配 ======
            assembly_tolerance: 1.0e-8,
            assembly_max_evaluations: 100,
            // 小阻尼：接近 Gauss-Newton，失败时放大 10 倍
            assembly_initial_damping: 1.0e-6,
            assembly_max_damping: 1.0e12,

            // ====== 调试 ======
            debug_log: false,
        }
    }
}

/// 全局配置实例
static ENGINE_CONFIG: Lazy<RwLock<EngineConfig>> = Lazy::new(|| {
    RwLock::new(EngineConfig::default())
});

/// 获取当前配置（只读）
pub fn get_config() -> EngineConfig {
    ENGINE_CONFIG.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// 手动设置配置（用于运行时调试）
pub fn set_config(config: EngineConfig) {
    *ENGINE_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
}

/// 重置为默认配置
pub fn reset_config() {
    *ENGINE_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = EngineConfig::default();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.gravity.y < 0.0);
        assert_eq!(config.gravity.x, 0.0);
        assert!(config.assembly_max_evaluations > 0);
        assert!(config.assembly_initial_damping < config.assembly_max_damping);
    }
}
