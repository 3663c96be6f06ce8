//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 调度类接口
//!
//! 参考 Linux 内核的 `struct sched_class` (kernel/sched/sched.h)：
//! 策略与机制分离，调度核心只通过这组操作接触具体策略。
//!
//! 与 Linux 的函数指针表不同，这里是编译期单态化：内核构建时
//! 经 `config::DefaultSchedClass` 固定一个类，热路径上没有间接
//! 调用。策略本身无状态，每核的队列状态放在 [`RunQueue`] 里。

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::process::Task;

/// 调度类
///
/// 三个实现：[`super::RoundRobin`]、[`super::Mlfq`]、
/// [`super::MpRoundRobin`]。全内核同一时刻只有一个类生效，
/// 在调度器构造时选定，所有核共享。
///
/// 约定（由调度核心保证，实现方可以信赖）：
/// - `enqueue` 不会对已在队列中的进程重复调用
/// - `dequeue` 只对确认在本队列中的进程调用
/// - `pick_next` 不摘下进程，摘下由调用方用 `dequeue` 完成，
///   这样调用方可以决定是否先补挂被换出的进程
/// - 所有操作都在持有本队列锁的前提下调用
pub trait SchedClass: Sized + Send + Sync + 'static {
    /// 类私有的每核队列状态
    type Queue: Send + Default;

    /// 类名，诊断输出用
    fn name() -> &'static str;

    /// 初始化类私有状态
    fn init(rq: &mut RunQueue<Self>);

    /// 插入一个 RUNNABLE 进程
    fn enqueue(rq: &mut RunQueue<Self>, task: &Arc<Task>);

    /// 摘除一个进程
    fn dequeue(rq: &mut RunQueue<Self>, task: &Arc<Task>);

    /// 选出下一个该运行的进程，队列为空时返回 None
    fn pick_next(rq: &RunQueue<Self>) -> Option<Arc<Task>>;

    /// 对正在运行的进程做时间片记账，可能置 need_resched
    fn proc_tick(rq: &mut RunQueue<Self>, task: &Arc<Task>);

    /// 负载估计，只用于负载均衡
    fn get_load(rq: &RunQueue<Self>) -> u64;

    /// 摘出至多 `count` 个可迁移进程（跳过 PIN_CPU）写入 `out`，
    /// 返回实际摘出的个数
    fn get_proc(rq: &mut RunQueue<Self>, out: &mut Vec<Arc<Task>>, count: usize) -> usize;
}

/// 每核运行队列
///
/// 持有调度类的私有状态和类无关的簿记。成员关系只在持有
/// 本队列锁时变更；远端核要动它（负载均衡）同样先拿锁。
pub struct RunQueue<C: SchedClass> {
    /// 本队列的最大时间片（tick 数）
    pub max_time_slice: u32,

    /// 在队进程数，由调度核心在出入队时维护
    pub(crate) nr_running: usize,

    /// 调度类私有状态
    pub(crate) queue: C::Queue,
}

impl<C: SchedClass> RunQueue<C> {
    pub fn new(max_time_slice: u32) -> RunQueue<C> {
        let mut rq = RunQueue {
            max_time_slice,
            nr_running: 0,
            queue: C::Queue::default(),
        };
        C::init(&mut rq);
        rq
    }

    /// 在队进程数
    pub fn len(&self) -> usize {
        self.nr_running
    }

    pub fn is_empty(&self) -> bool {
        self.nr_running == 0
    }
}
