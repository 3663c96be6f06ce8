//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 多线程并发压测
//!
//! 四个宿主线程各扮演一个核，对同一个调度器乱序执行唤醒、
//! 调度、时钟滴答、阻塞和负载均衡，检验跨核状态迁移不会
//! 丢进程、不会重复入队、不会死锁。
//!
//! 看门狗：任一线程卡住（多为锁序回归引入的死锁）时主线程
//! 在超时后报错，而不是让测试永远挂着。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use crux::arch::sim;
use crux::config;
use crux::sched::{MpRoundRobin, Scheduler, Timer};
use crux::sync::IntrGuard;
use crux::{ProcTable, Task, TaskFlags, TaskState, WaitReason};

const NCPU: usize = config::MAX_CPUS;
const NTASK: usize = 32;
const ROUNDS: usize = 2000;
const WATCHDOG: Duration = Duration::from_secs(30);

struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, bound: usize) -> usize {
        (self.next() % bound as u64) as usize
    }
}

/// 一轮随机操作。阻塞类操作保持"停下自己就立刻让出"的真实
/// 形态：当前进程睡下后本核必须马上 schedule，不插入别的动作。
fn one_round(sched: &Scheduler<MpRoundRobin>, pool: &[Arc<Task>], rng: &mut XorShift) {
    match rng.below(100) {
        0..=29 => {
            let t = &pool[rng.below(pool.len())];
            sched.try_wakeup(t);
        }
        30..=49 => sched.schedule(),
        50..=64 => sched.timer_tick(),
        65..=79 => {
            let c = sched.current(sim::cpu_id());
            if !c.is_idle() {
                {
                    let _intr = IntrGuard::new();
                    sched.stop(&c, WaitReason::EVENT);
                }
                sched.schedule();
            }
        }
        80..=87 => {
            let t = pool[rng.below(pool.len())].clone();
            sched.add_timer(Timer::wakeup(1 + rng.next() % 8, t));
        }
        88..=95 => sched.load_balance(),
        _ => {
            if !sched.current(sim::cpu_id()).is_idle() {
                sched.sleep_current(1 + rng.next() % 4);
            }
        }
    }
}

/// 收尾：把本核队列清空、当前进程换回 idle。
/// 别的核的唤醒只会落在它们自己的队列上，清完不会再被弄脏。
fn drain(sched: &Scheduler<MpRoundRobin>) {
    loop {
        let c = sched.current(sim::cpu_id());
        if c.is_idle() {
            break;
        }
        {
            let _intr = IntrGuard::new();
            sched.stop(&c, WaitReason::EVENT);
        }
        sched.schedule();
    }
}

#[test]
fn test_concurrent_cores_reach_quiescence() {
    sim::reset_cpu();
    let sched = Arc::new(Scheduler::<MpRoundRobin>::new(
        NCPU,
        Arc::new(ProcTable::new()),
    ));
    let pool: Arc<Vec<Arc<Task>>> = Arc::new(
        (0..NTASK)
            .map(|_| sched.proc_table().create(TaskFlags::empty()))
            .collect(),
    );
    for t in pool.iter() {
        sched.wakeup(t);
    }

    static OPS: AtomicU64 = AtomicU64::new(0);
    let (tx, rx) = mpsc::channel();
    let mut workers = Vec::new();
    for cpu in 0..NCPU {
        let sched = sched.clone();
        let pool = pool.clone();
        let tx = tx.clone();
        workers.push(std::thread::spawn(move || {
            sim::set_cpu(cpu);
            let mut rng = XorShift(0x9E37_79B9_7F4A_7C15 ^ (cpu as u64 + 1));
            for _ in 0..ROUNDS {
                one_round(&sched, &pool, &mut rng);
                OPS.fetch_add(1, Ordering::Relaxed);
            }
            drain(&sched);
            tx.send(cpu).ok();
        }));
    }
    drop(tx);

    let mut finished = 0;
    while finished < NCPU {
        match rx.recv_timeout(WATCHDOG) {
            Ok(_) => finished += 1,
            Err(_) => panic!(
                "deadlock suspected: {}/{} workers finished after {} ops",
                finished,
                NCPU,
                OPS.load(Ordering::Relaxed)
            ),
        }
    }
    for w in workers {
        w.join().unwrap();
    }

    // 静止态：每个核都回到 idle，队列全空
    for cpu in 0..NCPU {
        assert!(sched.current(cpu).is_idle(), "cpu {} not idle", cpu);
        assert_eq!(sched.queue_stat(cpu).0, 0, "cpu {} queue not empty", cpu);
    }
    // 全表检查：每个进程都被完整送回睡眠，不在队上、不占任何核的栈
    let all = sched.proc_table().snapshot();
    assert_eq!(all.len(), NCPU + NTASK);
    for t in all.iter().filter(|t| !t.is_idle()) {
        assert_eq!(t.state(), TaskState::Sleeping, "pid {}", t.pid);
        assert!(!t.on_rq(), "pid {} still queued", t.pid);
        assert!(!t.on_cpu(), "pid {} still on a cpu", t.pid);
    }
    let total: u64 = (0..NCPU).map(|cpu| sched.switches(cpu)).sum();
    assert!(total > 0);
}
