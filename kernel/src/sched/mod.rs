//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 调度器核心
//!
//! 参考 Linux 内核的调度框架 (kernel/sched/core.c)：
//! - 调度类 ([`SchedClass`])：策略与机制分离，三个实现可选
//! - 每核一个运行队列 ([`RunQueue`])，带自己的锁
//! - 每核一条差分定时器链表，驱动睡眠超时
//! - SMP 构建在每次 `schedule` 前做负载均衡
//!
//! 与 Linux 的函数指针表不同，生效的调度类在构建期经
//! `config::DefaultSchedClass` 单态化，热路径零间接调用。
//!
//! 锁序（需要多把锁时必须按此顺序申请）：
//! 1. 全局调度锁 `sched_lock`，串行化状态迁移和选 idle 的决定
//! 2. 进程的状态迁移锁 `task.lock`
//! 3. 运行队列锁；负载均衡要拿多个队列锁时，一律经
//!    [`AllQueues`] 按核号升序拿齐、逆序释放
//!
//! 定时器链表锁是独立的叶子锁，持锁期间不再申请任何其他锁，
//! 到期动作收集完、放锁之后才执行。所有锁都在关中断下持有。
//!
//! 唤醒与换出之间用进程的 `on_cpu` 位握手（同 Linux 的
//! `p->on_cpu`）：目标还占着旧核的栈就不入队，放开全部锁
//! 之后重试，见 [`Scheduler::post_switch`]。

pub mod class;
pub mod mlfq;
pub mod mprr;
pub mod rr;
pub mod timer;

pub use class::{RunQueue, SchedClass};
pub use mlfq::Mlfq;
pub use mprr::MpRoundRobin;
pub use rr::RoundRobin;
pub use timer::{Timer, TimerHandle};

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch;
use crate::config;
use crate::process::{ProcTable, Task, TaskFlags, TaskState, WaitReason};
use crate::sync::{IntrGuard, SpinLock, SpinLockGuard};
use timer::{TimerKind, TimerList};

/// 按构建配置选定调度类的调度器
pub type KernelScheduler = Scheduler<config::DefaultSchedClass>;

/// 一个核的调度状态
struct Cpu<C: SchedClass> {
    /// 运行队列
    rq: SpinLock<RunQueue<C>>,

    /// 差分定时器链表
    timers: SpinLock<TimerList>,

    /// 正在本核运行的进程
    current: SpinLock<Arc<Task>>,

    /// 刚被换出、等 post-switch 处理的进程
    prev: SpinLock<Option<Arc<Task>>>,

    /// 本核的 idle 进程，从不入队
    idle: Arc<Task>,

    /// 上下文切换累计次数
    switches: AtomicU64,
}

/// 负载均衡期间持有的全部运行队列锁。
///
/// 构造即按核号升序逐个加锁，析构按相反顺序释放。
/// 一次拿多个队列锁只有这一条路径，锁序由类型保证。
struct AllQueues<'a, C: SchedClass> {
    guards: Vec<SpinLockGuard<'a, RunQueue<C>>>,
}

impl<'a, C: SchedClass> AllQueues<'a, C> {
    fn lock(cpus: &'a [Cpu<C>]) -> AllQueues<'a, C> {
        let mut guards = Vec::with_capacity(cpus.len());
        for cpu in cpus {
            guards.push(cpu.rq.lock());
        }
        AllQueues { guards }
    }

    fn load(&self, cpu: usize) -> u64 {
        C::get_load(&self.guards[cpu])
    }

    /// 同时可变借用两个不同核的队列
    fn pair_mut(&mut self, src: usize, dst: usize) -> (&mut RunQueue<C>, &mut RunQueue<C>) {
        assert!(src != dst);
        if src < dst {
            let (left, right) = self.guards.split_at_mut(dst);
            (&mut left[src], &mut right[0])
        } else {
            let (left, right) = self.guards.split_at_mut(src);
            (&mut right[0], &mut left[dst])
        }
    }
}

impl<C: SchedClass> Drop for AllQueues<'_, C> {
    fn drop(&mut self) {
        while self.guards.pop().is_some() {}
    }
}

/// 一次唤醒尝试的结果
enum WakeAttempt {
    /// 完成了状态迁移
    Woken,
    /// 本来就是 RUNNABLE
    AlreadyRunnable,
    /// 还占着别的核的栈，放开锁再试
    SwitchingOut,
}

/// 多核进程调度器
///
/// 启动期构造一次，所有核共享引用。进程控制块由外部的进程
/// 管理路径经 [`ProcTable`] 分配，调度器只观察和改写其中的
/// 调度字段，不负责分配与回收。
pub struct Scheduler<C: SchedClass = config::DefaultSchedClass> {
    /// 全局调度锁
    sched_lock: SpinLock<()>,

    /// 每核状态，下标即核编号
    cpus: Vec<Cpu<C>>,

    /// 进程表
    table: Arc<ProcTable>,
}

impl<C: SchedClass> Scheduler<C> {
    /// 构造调度器并为每个核建立 idle 进程。
    ///
    /// 进程表必须还是空的：idle 进程要占住 0..ncpu 的 pid 段。
    pub fn new(ncpu: usize, table: Arc<ProcTable>) -> Scheduler<C> {
        assert!(ncpu >= 1 && ncpu <= config::MAX_CPUS, "sched: bad cpu count {}", ncpu);
        assert!(table.is_empty(), "sched: proc table must be empty at init");

        let mut cpus = Vec::with_capacity(ncpu);
        for id in 0..ncpu {
            let idle = table.create(TaskFlags::IDLE);
            assert!(idle.pid as usize == id, "sched: idle pid {} != cpu {}", idle.pid, id);
            idle.set_state(TaskState::Runnable);
            idle.set_cpu_affinity(id);
            idle.set_on_cpu(true);
            cpus.push(Cpu {
                rq: SpinLock::new(RunQueue::new(config::MAX_TIME_SLICE)),
                timers: SpinLock::new(TimerList::new()),
                current: SpinLock::new(idle.clone()),
                prev: SpinLock::new(None),
                idle,
                switches: AtomicU64::new(0),
            });
        }

        log::info!(
            "{} v{}: scheduler online, {} cpu(s), class {}",
            config::KERNEL_NAME,
            config::KERNEL_VERSION,
            ncpu,
            C::name()
        );
        Scheduler {
            sched_lock: SpinLock::new(()),
            cpus,
            table,
        }
    }

    pub fn num_cpus(&self) -> usize {
        self.cpus.len()
    }

    pub fn proc_table(&self) -> &Arc<ProcTable> {
        &self.table
    }

    /// 进程入队，调用方持有对应队列锁
    fn enqueue_locked(rq: &mut RunQueue<C>, task: &Arc<Task>) {
        assert!(!task.is_idle(), "sched: cannot enqueue idle pid {}", task.pid);
        assert!(!task.on_rq(), "sched: pid {} already on a run queue", task.pid);
        C::enqueue(rq, task);
        task.set_on_rq(true);
        rq.nr_running += 1;
    }

    /// 进程出队，调用方持有对应队列锁
    fn dequeue_locked(rq: &mut RunQueue<C>, task: &Arc<Task>) {
        assert!(task.on_rq(), "sched: pid {} not on a run queue", task.pid);
        C::dequeue(rq, task);
        task.set_on_rq(false);
        rq.nr_running -= 1;
    }

    /// 让进程进入睡眠并记录事由。
    ///
    /// 调用方负责关中断（典型形态是进程在自己的 [`IntrGuard`]
    /// 作用域里阻塞自己，随后调用 [`Scheduler::schedule`]）。
    /// 进程还挂在运行队列上就顺带摘下来；正在某个核上运行的
    /// 就标记它需要重新调度，让那个核尽快换出。
    pub fn stop(&self, task: &Arc<Task>, reason: WaitReason) {
        assert!(!arch::intr_enabled(), "sched: stop() requires interrupts disabled");
        assert!(!task.is_idle(), "sched: cannot stop idle pid {}", task.pid);

        let _sched = self.sched_lock.lock();
        let _state = task.lock.lock();
        task.set_state(TaskState::Sleeping);
        task.set_wait_state(reason);
        if task.on_rq() {
            let mut rq = self.cpus[task.cpu_affinity()].rq.lock();
            Self::dequeue_locked(&mut rq, task);
        } else {
            task.set_need_resched();
        }
    }

    /// 唤醒进程。
    ///
    /// 新建进程第一次变为可运行也走这里。对已经 RUNNABLE 的
    /// 进程重复唤醒是无害竞争，记一条警告即返回。
    pub fn wakeup(&self, task: &Arc<Task>) {
        let _intr = IntrGuard::new();
        if !self.wakeup_wait(task) {
            log::warn!("sched: wakeup runnable pid {}", task.pid);
        }
    }

    /// 同 [`Scheduler::wakeup`]，但返回是否真的完成了状态迁移，
    /// 并且沿线程组扫一遍，把正睡在信号等待上的同组线程一起
    /// 唤醒（组定向信号投递用）。
    pub fn try_wakeup(&self, task: &Arc<Task>) -> bool {
        let _intr = IntrGuard::new();
        let woken = self.wakeup_wait(task);
        if let Some(group) = task.thread_group() {
            for sibling in group.members() {
                if Arc::ptr_eq(&sibling, task) {
                    continue;
                }
                if sibling.state() == TaskState::Sleeping
                    && sibling.wait_state().contains(WaitReason::SIGNAL)
                {
                    self.wakeup_wait(&sibling);
                }
            }
        }
        woken
    }

    /// 唤醒并在必要时等待目标完成换出。
    /// 返回 false 表示进程本来就是 RUNNABLE。
    ///
    /// 目标可能刚在别的核上睡下、上下文还没保存完（`on_cpu`
    /// 仍置位）。这时不能入队：会被第三个核选中并装载残缺的
    /// 上下文。等待期间不持任何锁，否则那个核的 `schedule`
    /// 拿不到调度锁，换出永远完不成。
    fn wakeup_wait(&self, task: &Arc<Task>) -> bool {
        loop {
            {
                let _sched = self.sched_lock.lock();
                match self.wakeup_attempt(task) {
                    WakeAttempt::Woken => return true,
                    WakeAttempt::AlreadyRunnable => return false,
                    WakeAttempt::SwitchingOut => {}
                }
            }
            core::hint::spin_loop();
        }
    }

    /// 单次唤醒尝试，调用方持有调度锁
    fn wakeup_attempt(&self, task: &Arc<Task>) -> WakeAttempt {
        assert!(task.state() != TaskState::Zombie, "sched: wakeup zombie pid {}", task.pid);
        let _state = task.lock.lock();
        if task.state() == TaskState::Runnable {
            return WakeAttempt::AlreadyRunnable;
        }

        let cpu = arch::cpu_id();
        let current = self.cpus[cpu].current.lock().clone();
        if Arc::ptr_eq(task, &current) {
            // 唤醒的是本核当前进程：只改状态，不入队。
            // 它要么根本没换出，要么由 post-switch 按新状态补挂
            task.set_state(TaskState::Runnable);
            task.clear_wait_state();
            return WakeAttempt::Woken;
        }
        if task.on_cpu() {
            return WakeAttempt::SwitchingOut;
        }

        task.set_state(TaskState::Runnable);
        task.clear_wait_state();
        task.set_cpu_affinity(cpu);
        let mut rq = self.cpus[cpu].rq.lock();
        Self::enqueue_locked(&mut rq, task);
        WakeAttempt::Woken
    }

    /// 重新调度。
    ///
    /// 时间片耗尽或进程阻塞后由陷入返回路径调用，绝不允许在
    /// 中断上下文里进入。SMP 构建先做负载均衡再选进程；本地
    /// 队列空就换到 idle。被换出的进程不在这里补挂，而是等
    /// 换入一侧的 [`Scheduler::post_switch`] 在新栈上处理，
    /// 避免持着队列锁做上下文切换。
    pub fn schedule(&self) {
        assert!(!arch::in_interrupt(), "sched: schedule() in interrupt context");
        let cpu = arch::cpu_id();
        let _intr = IntrGuard::new();
        let prev = self.cpus[cpu].current.lock().clone();

        let next = {
            let _sched = self.sched_lock.lock();
            prev.clear_need_resched();
            if config::ENABLE_SMP && self.cpus.len() > 1 {
                self.balance_locked(cpu);
            }

            let slot = &self.cpus[cpu];
            let next = {
                let mut rq = slot.rq.lock();
                match C::pick_next(&rq) {
                    Some(next) => {
                        Self::dequeue_locked(&mut rq, &next);
                        next
                    }
                    None => slot.idle.clone(),
                }
            };
            next.add_run();
            if !Arc::ptr_eq(&next, &prev) {
                *slot.current.lock() = next.clone();
                let stale = slot.prev.lock().replace(prev.clone());
                assert!(stale.is_none(), "sched: post-switch slot busy on cpu {}", cpu);
                slot.switches.fetch_add(1, Ordering::Relaxed);
            }
            next
        };

        if !Arc::ptr_eq(&next, &prev) {
            // 入队前唤醒方已等过换出完成，队里不会有占着栈的进程
            debug_assert!(!next.on_cpu());
            next.set_on_cpu(true);
            arch::context_switch(&prev, &next);
            // 从这里起执行的是换入进程的栈帧
            self.post_switch();
        }
    }

    /// 切换完成后的收尾，在换入一侧执行。
    ///
    /// [`Scheduler::schedule`] 里紧跟 `context_switch` 的那行
    /// 就是本函数；新进程第一次获得 CPU 时由平台入口胶水补调
    /// 一次。被换出的进程若仍是 RUNNABLE（被抢占而非阻塞）就
    /// 补挂回本核队列。状态在锁下重查：换出到补挂之间它可能
    /// 已被别的核改成睡眠。
    pub fn post_switch(&self) {
        let cpu = arch::cpu_id();
        let _intr = IntrGuard::new();
        let prev = self.cpus[cpu].prev.lock().take();
        if let Some(prev) = prev {
            // 运行到这里它的上下文已保存完整，先放行等待中的唤醒方
            prev.set_on_cpu(false);
            let _state = prev.lock.lock();
            if prev.state() == TaskState::Runnable && !prev.is_idle() && !prev.on_rq() {
                prev.set_cpu_affinity(cpu);
                let mut rq = self.cpus[cpu].rq.lock();
                Self::enqueue_locked(&mut rq, &prev);
            }
        }
    }

    /// 时钟中断入口。
    ///
    /// 表头定时器减一拍，到期的收集完、放开定时器锁再触发：
    /// 进程定时器核对等待事由后唤醒，回调定时器在不持锁、
    /// 中断恢复的环境下执行。最后对正在运行的进程做时间片
    /// 记账；idle 不记账，直接标记需要重新调度。
    pub fn timer_tick(&self) {
        let cpu = arch::cpu_id();
        let fired = {
            let _intr = IntrGuard::new();
            let mut timers = self.cpus[cpu].timers.lock();
            timers.tick()
        };

        for kind in fired {
            match kind {
                TimerKind::Wakeup(task) => {
                    let wait = task.wait_state();
                    if wait.is_empty() {
                        log::warn!("timer: pid {} fired with no wait state", task.pid);
                    } else {
                        if !wait.contains(WaitReason::INTERRUPTED) {
                            log::warn!(
                                "timer: pid {} woken from uninterruptible wait {:?}",
                                task.pid,
                                wait
                            );
                        }
                        self.wakeup(&task);
                    }
                }
                TimerKind::Callback(func, arg) => func(arg),
            }
        }

        let _intr = IntrGuard::new();
        let current = self.cpus[cpu].current.lock().clone();
        if current.is_idle() {
            current.set_need_resched();
        } else {
            let mut rq = self.cpus[cpu].rq.lock();
            C::proc_tick(&mut rq, &current);
        }
    }

    /// 在本核的定时器链表上挂一个定时器
    pub fn add_timer(&self, timer: Timer) -> TimerHandle {
        let cpu = arch::cpu_id();
        let _intr = IntrGuard::new();
        let mut timers = self.cpus[cpu].timers.lock();
        let id = timers.add(timer);
        TimerHandle { cpu, id }
    }

    /// 取消定时器，已触发或已取消返回 false
    pub fn del_timer(&self, handle: TimerHandle) -> bool {
        let _intr = IntrGuard::new();
        let mut timers = self.cpus[handle.cpu].timers.lock();
        timers.del(handle.id)
    }

    /// 当前进程睡 `ticks` 拍。
    ///
    /// 到期由本核的定时器唤醒；若提前被信号唤醒，剩下的定时器
    /// 在返回前取消。
    pub fn sleep_current(&self, ticks: u64) {
        if ticks == 0 {
            return;
        }
        let handle = {
            let _intr = IntrGuard::new();
            let current = self.cpus[arch::cpu_id()].current.lock().clone();
            self.stop(&current, WaitReason::TIMER);
            self.add_timer(Timer::wakeup(ticks, current))
        };
        self.schedule();
        self.del_timer(handle);
    }

    /// idle 进程的主体：有活就调度，没活就等中断
    pub fn cpu_idle(&self) -> ! {
        loop {
            if self.need_resched() {
                self.schedule();
            } else {
                arch::wait_for_interrupt();
            }
        }
    }

    /// 本核当前进程是否被标记了需要重新调度
    pub fn need_resched(&self) -> bool {
        self.cpus[arch::cpu_id()].current.lock().need_resched()
    }

    /// 主动做一轮负载均衡（schedule 内部每次都会做）
    pub fn load_balance(&self) {
        let _intr = IntrGuard::new();
        let _sched = self.sched_lock.lock();
        self.balance_locked(arch::cpu_id());
    }

    /// 负载均衡，调用方持有调度锁。
    ///
    /// 拿齐全部队列锁后统计各核负载；本核低于均值且不是最忙
    /// 的核时，从最忙的核最多拉 `min(最忙-均值, 均值-本核,
    /// MAX_BALANCE_MOVE)` 个可迁移进程过来，不超过阈值就不动。
    /// 贪心启发式，目标只是避免有核闲着，不追求最优摆放。
    fn balance_locked(&self, cpu: usize) {
        let mut queues = AllQueues::lock(&self.cpus);
        let loads: Vec<u64> = (0..self.cpus.len()).map(|id| queues.load(id)).collect();
        let mean = loads.iter().sum::<u64>() / loads.len() as u64;
        let (max_cpu, max_load) = match loads.iter().copied().enumerate().max_by_key(|&(_, l)| l) {
            Some(found) => found,
            None => return,
        };
        if max_cpu == cpu || max_load <= mean || loads[cpu] >= mean {
            return;
        }

        let needs = (max_load - mean)
            .min(mean - loads[cpu])
            .min(config::MAX_BALANCE_MOVE as u64) as usize;
        if needs <= config::BALANCE_THRESHOLD {
            return;
        }

        let mut moved = Vec::with_capacity(needs);
        let (src, dst) = queues.pair_mut(max_cpu, cpu);
        let taken = C::get_proc(src, &mut moved, needs);
        src.nr_running -= taken;
        for task in &moved {
            task.set_on_rq(false);
            task.set_cpu_affinity(cpu);
            Self::enqueue_locked(dst, task);
        }
        if taken > 0 {
            log::trace!("sched: cpu {} pulled {} task(s) from cpu {}", cpu, taken, max_cpu);
        }
    }

    /// 诊断查询：某核的（在队进程数, 负载估计）
    pub fn queue_stat(&self, cpu: usize) -> (usize, u64) {
        let rq = self.cpus[cpu].rq.lock();
        (rq.len(), C::get_load(&rq))
    }

    /// 某核的上下文切换累计次数
    pub fn switches(&self, cpu: usize) -> u64 {
        self.cpus[cpu].switches.load(Ordering::Relaxed)
    }

    /// 某核当前运行的进程
    pub fn current(&self, cpu: usize) -> Arc<Task> {
        self.cpus[cpu].current.lock().clone()
    }
}
