//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 多核轮转调度类 (Multiprocessor Round-Robin)
//!
//! 队内语义与 [`super::RoundRobin`] 完全一致，差别在跨核迁移：
//! `get_proc` 从队尾（最新到达的一侧）摘进程，让等得最久的
//! 队头进程保住本核的 FIFO 席位，迁移走的是刚排进来的。
//! 这是多核构建的默认调度类。

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::class::{RunQueue, SchedClass};
use crate::process::Task;

/// 多核轮转
pub struct MpRoundRobin;

impl SchedClass for MpRoundRobin {
    type Queue = VecDeque<Arc<Task>>;

    fn name() -> &'static str {
        "mp_round_robin"
    }

    fn init(_rq: &mut RunQueue<Self>) {}

    fn enqueue(rq: &mut RunQueue<Self>, task: &Arc<Task>) {
        if task.time_slice() == 0 || task.time_slice() > rq.max_time_slice {
            task.set_time_slice(rq.max_time_slice);
        }
        rq.queue.push_back(task.clone());
    }

    fn dequeue(rq: &mut RunQueue<Self>, task: &Arc<Task>) {
        match rq.queue.iter().position(|t| t.pid == task.pid) {
            Some(idx) => {
                rq.queue.remove(idx);
            }
            None => panic!("mprr: dequeue pid {} not on queue", task.pid),
        }
    }

    fn pick_next(rq: &RunQueue<Self>) -> Option<Arc<Task>> {
        rq.queue.front().cloned()
    }

    fn proc_tick(_rq: &mut RunQueue<Self>, task: &Arc<Task>) {
        let slice = task.time_slice();
        if slice > 0 {
            task.set_time_slice(slice - 1);
        }
        if task.time_slice() == 0 {
            task.set_need_resched();
        }
    }

    fn get_load(rq: &RunQueue<Self>) -> u64 {
        rq.queue.len() as u64
    }

    fn get_proc(rq: &mut RunQueue<Self>, out: &mut Vec<Arc<Task>>, count: usize) -> usize {
        let mut taken = 0;
        let mut idx = rq.queue.len();
        while taken < count && idx > 0 {
            idx -= 1;
            if rq.queue[idx].is_pinned() {
                continue;
            }
            if let Some(task) = rq.queue.remove(idx) {
                out.push(task);
                taken += 1;
            }
        }
        taken
    }
}
