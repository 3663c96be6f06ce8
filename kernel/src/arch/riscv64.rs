//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! RISC-V 64 裸机后端
//!
//! 约定：
//! - 启动代码把 hart id 存进 tp 寄存器（每核一份）
//! - 中断开关走 sstatus.SIE 位
//! - 中断深度由平台 trap 入口调用 [`enter_interrupt`] / [`leave_interrupt`] 维护
//! - `__switch_to` 由平台的 switch.S 提供并在链接期解析

use core::sync::atomic::{AtomicUsize, Ordering};

use riscv::register::sstatus;

use crate::config::MAX_CPUS;
use crate::process::task::Context;
use crate::process::Task;

const DEPTH_ZERO: AtomicUsize = AtomicUsize::new(0);

/// 每核的中断嵌套深度
static INTR_DEPTH: [AtomicUsize; MAX_CPUS] = [DEPTH_ZERO; MAX_CPUS];

extern "C" {
    /// 保存 prev 的被调用者保存寄存器，装载 next 的，切换栈。
    /// 由平台的 switch.S 实现。
    fn __switch_to(prev: *mut Context, next: *const Context);
}

/// 当前核编号（启动代码存放在 tp 中的 hart id）
pub fn cpu_id() -> usize {
    let id: usize;
    unsafe {
        core::arch::asm!("mv {}, tp", out(reg) id);
    }
    id
}

/// 关中断，返回之前的使能状态
pub fn intr_save() -> bool {
    let enabled = sstatus::read().sie();
    unsafe {
        sstatus::clear_sie();
    }
    enabled
}

/// 恢复保存的中断使能状态
pub fn intr_restore(flag: bool) {
    if flag {
        unsafe {
            sstatus::set_sie();
        }
    }
}

/// 本地中断是否开启
pub fn intr_enabled() -> bool {
    sstatus::read().sie()
}

/// 进入中断上下文，由平台 trap 入口调用
pub fn enter_interrupt() {
    INTR_DEPTH[cpu_id()].fetch_add(1, Ordering::Relaxed);
}

/// 离开中断上下文
pub fn leave_interrupt() {
    INTR_DEPTH[cpu_id()].fetch_sub(1, Ordering::Relaxed);
}

/// 是否处于中断上下文
pub fn in_interrupt() -> bool {
    INTR_DEPTH[cpu_id()].load(Ordering::Relaxed) > 0
}

/// 上下文切换
///
/// 被换出进程停在 `__switch_to` 内部，直到它再次被调度才返回。
/// 此时两个进程都不在运行，直接访问保存的上下文没有并发。
pub fn context_switch(prev: &Task, next: &Task) {
    unsafe {
        __switch_to(prev.context.data_ptr(), next.context.data_ptr());
    }
}

/// 空闲等待下一个中断
pub fn wait_for_interrupt() {
    unsafe {
        core::arch::asm!("wfi");
    }
}
