//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 固定时间片轮转调度类 (Round-Robin)
//!
//! 单条 FIFO 队列：新进程追加到队尾，`pick_next` 看队头。
//! 时间片固定为 `rq.max_time_slice`，耗尽即请求重新调度，
//! 重新入队时补满。队列内严格按到达顺序，不存在优先级。

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::class::{RunQueue, SchedClass};
use crate::process::Task;

/// 固定时间片轮转
pub struct RoundRobin;

impl SchedClass for RoundRobin {
    type Queue = VecDeque<Arc<Task>>;

    fn name() -> &'static str {
        "round_robin"
    }

    fn init(_rq: &mut RunQueue<Self>) {}

    fn enqueue(rq: &mut RunQueue<Self>, task: &Arc<Task>) {
        // 新进程时间片为 0，换出重入的进程可能残留上次的值
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
            None => panic!("rr: dequeue pid {} not on queue", task.pid),
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
        let mut idx = 0;
        while taken < count && idx < rq.queue.len() {
            if rq.queue[idx].is_pinned() {
                idx += 1;
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
