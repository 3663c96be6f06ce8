//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 架构相关代码
//!
//! 调度器消费的硬件边界收窄为五件事：
//! - 当前核编号
//! - 本地中断的关闭/恢复与状态查询
//! - 中断上下文深度（由平台 trap 入口维护）
//! - 上下文切换
//! - 空闲等待
//!
//! 支持的后端：
//! - **sim** - 宿主机模拟后端（默认）：线程充当 CPU 核，供测试使用
//! - **riscv64** - RISC-V 64 裸机后端：底层切换汇编由平台链接提供

// RISC-V 64 裸机后端
#[cfg(all(feature = "riscv64", target_arch = "riscv64"))]
pub mod riscv64;

#[cfg(all(feature = "riscv64", target_arch = "riscv64"))]
pub use riscv64::{
    context_switch, cpu_id, enter_interrupt, in_interrupt, intr_enabled, intr_restore, intr_save,
    leave_interrupt, wait_for_interrupt,
};

// 模拟后端（线程充当核）
#[cfg(all(feature = "sim", not(all(feature = "riscv64", target_arch = "riscv64"))))]
pub mod sim;

#[cfg(all(feature = "sim", not(all(feature = "riscv64", target_arch = "riscv64"))))]
pub use sim::{
    context_switch, cpu_id, enter_interrupt, in_interrupt, intr_enabled, intr_restore, intr_save,
    leave_interrupt, wait_for_interrupt,
};

#[cfg(not(any(feature = "sim", feature = "riscv64")))]
compile_error!("no arch backend selected: enable feature `sim` or `riscv64`");

#[cfg(all(feature = "riscv64", not(feature = "sim"), not(target_arch = "riscv64")))]
compile_error!("feature `riscv64` requires a riscv64 target; enable feature `sim` for host builds");
