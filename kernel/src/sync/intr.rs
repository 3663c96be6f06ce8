//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 中断屏蔽作用域 guard
//!
//! 对应 Linux 的 `local_irq_save()` / `local_irq_restore()` 配对：
//! 构造时保存并关闭本地中断，析构时恢复保存的状态。
//! 用 RAII 表达配对，任何退出路径（含 panic 展开）都不会漏掉恢复。
//!
//! 嵌套使用是安全的：内层 guard 保存到的是"已关闭"，恢复后外层
//! 仍按自己保存的状态恢复。

use core::marker::PhantomData;

use crate::arch;

/// 本地中断屏蔽 guard
///
/// 持有期间本核中断保持关闭。必须在创建它的核上析构，
/// 因此刻意不实现 `Send`。
pub struct IntrGuard {
    flag: bool,
    // 禁止跨核移动
    _not_send: PhantomData<*const ()>,
}

impl IntrGuard {
    /// 保存当前中断使能状态并关中断
    pub fn new() -> Self {
        IntrGuard {
            flag: arch::intr_save(),
            _not_send: PhantomData,
        }
    }

    /// 进入时中断是否处于开启状态
    pub fn was_enabled(&self) -> bool {
        self.flag
    }
}

impl Default for IntrGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IntrGuard {
    fn drop(&mut self) {
        arch::intr_restore(self.flag);
    }
}
