//! Crux 内核配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "Crux";

/// 内核版本
pub const KERNEL_VERSION: &str = "0.1.0";

// ============================================================
// SMP 配置
// ============================================================

/// 是否启用SMP多核支持
pub const ENABLE_SMP: bool = true;

/// 最大CPU数量
pub const MAX_CPUS: usize = 4;

// ============================================================
// 调度器配置
// ============================================================

/// 默认调度类名称
pub const SCHED_CLASS_NAME: &str = "mprr";

/// 默认调度类
pub type DefaultSchedClass = crate::sched::MpRoundRobin;

/// 默认时间片（tick 数）
pub const MAX_TIME_SLICE: u32 = 8;

/// MLFQ 优先级层数
pub const MLFQ_LEVELS: usize = 4;

// ============================================================
// 负载均衡配置
// ============================================================

/// 触发迁移的最小迁移数
pub const BALANCE_THRESHOLD: usize = 3;

/// 单次负载均衡的最大迁移数
pub const MAX_BALANCE_MOVE: usize = 100;
