//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 宿主机模拟后端
//!
//! 每个线程充当一个 CPU 核：核编号、中断使能位、中断深度都放在
//! 线程局部存储里。测试用 [`set_cpu`] 给线程指派核编号，即可在
//! 宿主机上驱动多核调度路径。
//!
//! "上下文切换"在这里不切栈：调用方线程继续往下执行，语义上等价
//! 于切换完成后立即回到被切入一侧（调度器紧接着运行 post_switch）。

use std::cell::Cell;

use crate::config::MAX_CPUS;
use crate::process::Task;

thread_local! {
    static CPU_ID: Cell<usize> = Cell::new(0);
    static INTR_ENABLED: Cell<bool> = Cell::new(true);
    static INTR_DEPTH: Cell<usize> = Cell::new(0);
}

/// 给当前线程指派核编号
pub fn set_cpu(id: usize) {
    assert!(id < MAX_CPUS, "sim: cpu id {} out of range", id);
    CPU_ID.with(|c| c.set(id));
}

/// 测试夹具：把当前线程恢复为 0 号核、开中断、非中断上下文
pub fn reset_cpu() {
    CPU_ID.with(|c| c.set(0));
    INTR_ENABLED.with(|c| c.set(true));
    INTR_DEPTH.with(|c| c.set(0));
}

/// 当前核编号
pub fn cpu_id() -> usize {
    CPU_ID.with(|c| c.get())
}

/// 关中断，返回之前的使能状态
pub fn intr_save() -> bool {
    INTR_ENABLED.with(|c| c.replace(false))
}

/// 恢复保存的中断使能状态
pub fn intr_restore(flag: bool) {
    INTR_ENABLED.with(|c| c.set(flag));
}

/// 本地中断是否开启
pub fn intr_enabled() -> bool {
    INTR_ENABLED.with(|c| c.get())
}

/// 进入中断上下文（模拟 trap 入口）
pub fn enter_interrupt() {
    INTR_DEPTH.with(|c| c.set(c.get() + 1));
}

/// 离开中断上下文
pub fn leave_interrupt() {
    INTR_DEPTH.with(|c| {
        let d = c.get();
        assert!(d > 0, "sim: leave_interrupt without enter");
        c.set(d - 1);
    });
}

/// 是否处于中断上下文
pub fn in_interrupt() -> bool {
    INTR_DEPTH.with(|c| c.get()) > 0
}

/// 模拟上下文切换
///
/// 不做栈切换，只留下 trace。被换出一侧的栈帧在真实后端里
/// 会停在这里，直到它再次被调度。
pub fn context_switch(prev: &Task, next: &Task) {
    log::trace!(
        "sim: cpu {} switch pid {} -> pid {}",
        cpu_id(),
        prev.pid,
        next.pid
    );
}

/// 空闲等待：让出宿主机时间片
pub fn wait_for_interrupt() {
    std::thread::yield_now();
}
