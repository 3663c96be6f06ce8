//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程控制块 (Process Control Block)
//!
//! 参考 Linux 内核的 `struct task_struct` (include/linux/sched.h)，
//! 但只保留调度器观察和修改的字段。
//!
//! 关键设计要点：
//! 1. 生命周期字段用原子量，跨核读写不经过锁
//! 2. 复合状态迁移（改状态 + 出入队）由 `lock` 串行化
//! 3. 进程的分配/回收属于进程生命周期路径，调度器只改调度字段

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use alloc::sync::Arc;
use bitflags::bitflags;

use super::table::ThreadGroup;
use crate::sync::SpinLock;

/// 进程号
pub type Pid = u32;

/// 进程状态
///
/// 描述调度器眼中的生命周期，经由 [`Task::state`] 原子读写。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TaskState {
    /// 已分配但尚未投入调度
    Uninit = 0,

    /// 睡眠中，等待 `wait_state` 记录的事件
    Sleeping = 1,

    /// 可运行：正在运行，或在某个运行队列中等待
    Runnable = 2,

    /// 已退出，等待父进程回收（终态）
    Zombie = 3,
}

impl TaskState {
    fn from_u32(v: u32) -> TaskState {
        match v {
            0 => TaskState::Uninit,
            1 => TaskState::Sleeping,
            2 => TaskState::Runnable,
            3 => TaskState::Zombie,
            _ => panic!("task: invalid state value {}", v),
        }
    }
}

bitflags! {
    /// 进程标志
    ///
    /// 取值沿用 Linux 的 PF_* 槽位 (include/linux/sched.h)
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TaskFlags: u32 {
        const IDLE    = 0x00000002; /* 每核的 idle 进程 */
        const PIN_CPU = 0x04000000; /* 绑定在 cpu_affinity 上，负载均衡不得迁移 */
    }
}

bitflags! {
    /// 等待原因
    ///
    /// 进程睡眠时记录，唤醒源（定时器、信号）以此校验期望的唤醒事由。
    /// `INTERRUPTED` 位表示该等待可以被打断。
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct WaitReason: u32 {
        const INTERRUPTED = 0x80000000; /* 可被打断的等待 */
        const CHILD       = 0x80000001; /* 等待子进程退出 */
        const TIMER       = 0x80000002; /* 定时睡眠 */
        const KBD         = 0x80000004; /* 等待键盘输入 */
        const SIGNAL      = 0x80000400; /* 等待信号投递 */
        const KSEM        = 0x00000100; /* 内核信号量，不可打断 */
        const EVENT       = 0x00000200; /* 内核事件，不可打断 */
    }
}

/// CPU 上下文 - 进程切换时保存/恢复的被调用者保存寄存器
///
/// 对应 RISC-V 调用约定里的 callee-saved 集合，布局与平台
/// switch.S 约定一致。调度器不解释其内容。
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// 返回地址
    pub ra: u64,
    /// 栈指针
    pub sp: u64,
    /// s0-s11
    pub s: [u64; 12],
}

/// 进程控制块
///
/// 调度链路上的字段全部是原子量或锁保护的独立块，跨核访问
/// 不需要整块大锁。队列成员关系（`on_rq`）只在持有所属运行
/// 队列锁时变更。
pub struct Task {
    /// 进程号。核编号范围内的 pid 保留给各核的 idle 进程
    pub pid: Pid,

    /// 生命周期状态（[`TaskState`] 的数值表示）
    state: AtomicU32,

    /// 睡眠事由（[`WaitReason`] 位集，0 表示未记录）
    wait_state: AtomicU32,

    /// 进程标志（[`TaskFlags`]）
    flags: AtomicU32,

    /// 下次中断返回时是否需要重新调度
    need_resched: AtomicBool,

    /// 拥有本进程的核编号，入队时指向队列所在核
    cpu_affinity: AtomicUsize,

    /// 被选中运行的累计次数
    runs: AtomicU64,

    /// 剩余时间片（tick 数），调度类私有
    time_slice: AtomicU32,

    /// MLFQ 所在优先级层，调度类私有
    queue_level: AtomicU32,

    /// 是否在某个运行队列中，只在持有该队列锁时变更
    on_rq: AtomicBool,

    /// 上下文是否还占着某个核的栈。换出一侧在 post-switch 里
    /// 清零；唤醒方要等它清零才能把进程挂上队列，保证任何核
    /// 选中它时上下文都已保存完整
    on_cpu: AtomicBool,

    /// 地址空间句柄（页表令牌），调度器不解释其内容
    mm: AtomicUsize,

    /// 保存的 CPU 上下文，切换期间由体系结构层直接访问
    pub context: SpinLock<Context>,

    /// 状态迁移与出入队复合操作的互斥：
    /// `stop` 与 post-switch 补挂靠它串行化
    pub(crate) lock: SpinLock<()>,

    /// 所属线程组，组定向信号唤醒时遍历
    group: spin::Mutex<Option<Arc<ThreadGroup>>>,
}

impl Task {
    pub(crate) fn new(pid: Pid, flags: TaskFlags) -> Task {
        Task {
            pid,
            state: AtomicU32::new(TaskState::Uninit as u32),
            wait_state: AtomicU32::new(0),
            flags: AtomicU32::new(flags.bits()),
            need_resched: AtomicBool::new(false),
            cpu_affinity: AtomicUsize::new(0),
            runs: AtomicU64::new(0),
            time_slice: AtomicU32::new(0),
            queue_level: AtomicU32::new(0),
            on_rq: AtomicBool::new(false),
            on_cpu: AtomicBool::new(false),
            mm: AtomicUsize::new(0),
            context: SpinLock::new(Context::default()),
            lock: SpinLock::new(()),
            group: spin::Mutex::new(None),
        }
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u32(self.state.load(Ordering::SeqCst))
    }

    /// 写生命周期状态
    ///
    /// 供调度器和（外部的）进程生命周期路径使用；复合迁移需要
    /// 调用方持有相应的锁。
    pub fn set_state(&self, state: TaskState) {
        self.state.store(state as u32, Ordering::SeqCst);
    }

    pub fn wait_state(&self) -> WaitReason {
        WaitReason::from_bits_truncate(self.wait_state.load(Ordering::SeqCst))
    }

    pub fn set_wait_state(&self, reason: WaitReason) {
        self.wait_state.store(reason.bits(), Ordering::SeqCst);
    }

    pub fn clear_wait_state(&self) {
        self.wait_state.store(0, Ordering::SeqCst);
    }

    /// 是否记录了等待事由
    pub fn has_wait_state(&self) -> bool {
        self.wait_state.load(Ordering::SeqCst) != 0
    }

    pub fn flags(&self) -> TaskFlags {
        TaskFlags::from_bits_truncate(self.flags.load(Ordering::SeqCst))
    }

    pub fn is_idle(&self) -> bool {
        self.flags().contains(TaskFlags::IDLE)
    }

    pub fn is_pinned(&self) -> bool {
        self.flags().contains(TaskFlags::PIN_CPU)
    }

    pub fn need_resched(&self) -> bool {
        self.need_resched.load(Ordering::SeqCst)
    }

    pub fn set_need_resched(&self) {
        self.need_resched.store(true, Ordering::SeqCst);
    }

    pub fn clear_need_resched(&self) {
        self.need_resched.store(false, Ordering::SeqCst);
    }

    pub fn cpu_affinity(&self) -> usize {
        self.cpu_affinity.load(Ordering::SeqCst)
    }

    pub fn set_cpu_affinity(&self, cpu: usize) {
        self.cpu_affinity.store(cpu, Ordering::SeqCst);
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub(crate) fn add_run(&self) {
        self.runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn time_slice(&self) -> u32 {
        self.time_slice.load(Ordering::Relaxed)
    }

    pub(crate) fn set_time_slice(&self, ticks: u32) {
        self.time_slice.store(ticks, Ordering::Relaxed);
    }

    pub fn queue_level(&self) -> usize {
        self.queue_level.load(Ordering::Relaxed) as usize
    }

    pub(crate) fn set_queue_level(&self, level: usize) {
        self.queue_level.store(level as u32, Ordering::Relaxed);
    }

    pub fn on_rq(&self) -> bool {
        self.on_rq.load(Ordering::SeqCst)
    }

    pub(crate) fn set_on_rq(&self, on: bool) {
        self.on_rq.store(on, Ordering::SeqCst);
    }

    pub fn on_cpu(&self) -> bool {
        self.on_cpu.load(Ordering::Acquire)
    }

    pub(crate) fn set_on_cpu(&self, on: bool) {
        self.on_cpu.store(on, Ordering::Release);
    }

    /// 地址空间句柄，由内存管理路径设置
    pub fn mm_token(&self) -> usize {
        self.mm.load(Ordering::SeqCst)
    }

    pub fn set_mm_token(&self, token: usize) {
        self.mm.store(token, Ordering::SeqCst);
    }

    pub fn thread_group(&self) -> Option<Arc<ThreadGroup>> {
        self.group.lock().clone()
    }

    pub(crate) fn set_thread_group(&self, group: Arc<ThreadGroup>) {
        *self.group.lock() = Some(group);
    }
}

impl core::fmt::Debug for Task {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Task")
            .field("pid", &self.pid)
            .field("state", &self.state())
            .field("flags", &self.flags())
            .field("affinity", &self.cpu_affinity())
            .field("on_rq", &self.on_rq())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_defaults() {
        let t = Task::new(7, TaskFlags::empty());
        assert_eq!(t.pid, 7);
        assert_eq!(t.state(), TaskState::Uninit);
        assert!(!t.on_rq());
        assert!(!t.need_resched());
        assert_eq!(t.runs(), 0);
        assert!(!t.has_wait_state());
    }

    #[test]
    fn test_state_round_trip() {
        let t = Task::new(1, TaskFlags::empty());
        t.set_state(TaskState::Runnable);
        assert_eq!(t.state(), TaskState::Runnable);
        t.set_state(TaskState::Sleeping);
        assert_eq!(t.state(), TaskState::Sleeping);
        t.set_state(TaskState::Zombie);
        assert_eq!(t.state(), TaskState::Zombie);
    }

    #[test]
    fn test_wait_reason_interruptible() {
        assert!(WaitReason::TIMER.contains(WaitReason::INTERRUPTED));
        assert!(WaitReason::SIGNAL.contains(WaitReason::INTERRUPTED));
        assert!(!WaitReason::KSEM.contains(WaitReason::INTERRUPTED));

        let t = Task::new(2, TaskFlags::empty());
        t.set_wait_state(WaitReason::TIMER);
        assert!(t.has_wait_state());
        assert!(t.wait_state().contains(WaitReason::INTERRUPTED));
        t.clear_wait_state();
        assert!(!t.has_wait_state());
    }

    #[test]
    fn test_flags() {
        let idle = Task::new(0, TaskFlags::IDLE);
        assert!(idle.is_idle());
        assert!(!idle.is_pinned());

        let pinned = Task::new(5, TaskFlags::PIN_CPU);
        assert!(pinned.is_pinned());
        assert!(!pinned.is_idle());
    }

    #[test]
    fn test_mm_token_is_opaque_storage() {
        let t = Task::new(3, TaskFlags::empty());
        assert_eq!(t.mm_token(), 0);
        t.set_mm_token(0xdead_b000);
        assert_eq!(t.mm_token(), 0xdead_b000);
    }
}
