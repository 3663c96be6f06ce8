//! 同步原语 (Synchronization Primitives)
//!
//! 遵循 Linux 内核的锁机制设计：
//! - `include/linux/spinlock.h` - 自旋锁
//! - `include/linux/irqflags.h` - 本地中断屏蔽
//!
//! 核心概念：
//! - 调度器内部只用自旋锁，不睡眠
//! - 中断安全的临界区 = [`IntrGuard`] + [`SpinLock`] 的组合，
//!   先关中断再拿锁，防止中断在本核重入同一把锁
//! - 所有锁通过 RAII guard 释放，不存在裸的 unlock 调用

pub mod intr;
pub mod spinlock;

pub use intr::IntrGuard;
pub use spinlock::{RawSpinLock, SpinLock, SpinLockGuard};
