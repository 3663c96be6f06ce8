//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 睡眠与定时唤醒的端到端验证
//!
//! 完整链路：进程阻塞自己 -> 挂定时器 -> 换出到 idle ->
//! 时钟滴答推进 -> 到期唤醒 -> 重新被调度。

use std::sync::Arc;

use crux::arch::sim;
use crux::sched::{RoundRobin, Scheduler, Timer};
use crux::sync::IntrGuard;
use crux::{ProcTable, TaskFlags, TaskState, WaitReason};

fn fresh(ncpu: usize) -> Scheduler<RoundRobin> {
    sim::reset_cpu();
    Scheduler::new(ncpu, Arc::new(ProcTable::new()))
}

#[test]
fn test_ten_tick_sleep_round_trip() {
    let sched = fresh(2);
    let p = sched.proc_table().create(TaskFlags::empty());
    sched.wakeup(&p);
    sched.schedule();
    assert_eq!(sched.current(0).pid, p.pid);

    {
        let _intr = IntrGuard::new();
        sched.stop(&p, WaitReason::TIMER);
        sched.add_timer(Timer::wakeup(10, p.clone()));
    }
    sched.schedule();
    assert!(sched.current(0).is_idle());

    // 前 9 拍保持睡眠且不在任何队列
    for _ in 0..9 {
        sched.timer_tick();
        assert_eq!(p.state(), TaskState::Sleeping);
        assert!(!p.on_rq());
        assert_eq!(sched.queue_stat(0).0, 0);
    }

    // 第 10 拍到期：转为 RUNNABLE 并挂上定时器所在核的队列
    sched.timer_tick();
    assert_eq!(p.state(), TaskState::Runnable);
    assert!(p.on_rq());
    assert_eq!(p.cpu_affinity(), 0);
    assert_eq!(sched.queue_stat(0).0, 1);
    assert_eq!(sched.queue_stat(1).0, 0);

    sched.schedule();
    assert_eq!(sched.current(0).pid, p.pid);
}

#[test]
fn test_wakeup_lands_on_timer_owner_cpu() {
    let sched = fresh(2);
    let p = sched.proc_table().create(TaskFlags::empty());
    sched.wakeup(&p);
    {
        let _intr = IntrGuard::new();
        sched.stop(&p, WaitReason::TIMER);
    }

    // 定时器挂在 1 号核上，到期就该在 1 号核入队
    sim::set_cpu(1);
    sched.add_timer(Timer::wakeup(3, p.clone()));
    for _ in 0..3 {
        sched.timer_tick();
    }
    assert_eq!(p.state(), TaskState::Runnable);
    assert_eq!(p.cpu_affinity(), 1);
    assert_eq!(sched.queue_stat(0).0, 0);
    assert_eq!(sched.queue_stat(1).0, 1);
}

#[test]
fn test_early_signal_wakeup_cancels_timer() {
    let sched = fresh(1);
    let p = sched.proc_table().create(TaskFlags::empty());
    sched.wakeup(&p);
    sched.schedule();

    let handle = {
        let _intr = IntrGuard::new();
        sched.stop(&p, WaitReason::SIGNAL);
        sched.add_timer(Timer::wakeup(5, p.clone()))
    };

    // 信号先到：状态翻回 RUNNABLE，定时器取消后不再触发
    assert!(sched.try_wakeup(&p));
    assert!(sched.del_timer(handle));
    for _ in 0..6 {
        sched.timer_tick();
    }
    assert_eq!(p.state(), TaskState::Runnable);
    // p 仍是当前进程，唤醒不把它挂回队列
    assert!(!p.on_rq());
    assert_eq!(sched.current(0).pid, p.pid);
}

#[test]
fn test_expired_timer_for_cleared_wait_is_benign() {
    let sched = fresh(1);
    let p = sched.proc_table().create(TaskFlags::empty());
    sched.wakeup(&p);
    {
        let _intr = IntrGuard::new();
        sched.stop(&p, WaitReason::TIMER);
    }
    sched.add_timer(Timer::wakeup(2, p.clone()));

    // 另一个唤醒源抢先：等待事由已清除，定时器照常到期但只告警
    sched.wakeup(&p);
    assert_eq!(p.state(), TaskState::Runnable);
    for _ in 0..2 {
        sched.timer_tick();
    }
    assert_eq!(p.state(), TaskState::Runnable);
    assert_eq!(sched.queue_stat(0).0, 1);
}

#[test]
fn test_callback_timer_fires_outside_lock() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static FIRED_WITH: AtomicUsize = AtomicUsize::new(0);

    fn record(arg: usize) {
        FIRED_WITH.store(arg, Ordering::SeqCst);
    }

    let sched = fresh(1);
    sched.add_timer(Timer::callback(4, record, 7));
    for _ in 0..3 {
        sched.timer_tick();
        assert_eq!(FIRED_WITH.load(Ordering::SeqCst), 0);
    }
    sched.timer_tick();
    assert_eq!(FIRED_WITH.load(Ordering::SeqCst), 7);
}
