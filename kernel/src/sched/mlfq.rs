//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 多级反馈队列调度类 (MLFQ)
//!
//! `config::MLFQ_LEVELS` 条 FIFO 队列，0 号优先级最高。新进程从
//! 0 号队列开始，第 L 层的时间片为 `max_time_slice << L`；整片
//! 耗尽降一层，睡眠换出不降层。`pick_next` 自顶向下取第一个非空
//! 队列的队头。进程当前所在层记录在 `task.queue_level` 里，随
//! 迁移一起带到目标核。

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::class::{RunQueue, SchedClass};
use crate::config;
use crate::process::Task;

/// 多级反馈队列
pub struct Mlfq;

/// 按层划分的就绪队列组
#[derive(Default)]
pub struct MlfqQueue {
    bands: Vec<VecDeque<Arc<Task>>>,
}

/// 第 `level` 层的完整时间片
fn band_slice(rq: &RunQueue<Mlfq>, level: usize) -> u32 {
    rq.max_time_slice << level
}

impl SchedClass for Mlfq {
    type Queue = MlfqQueue;

    fn name() -> &'static str {
        "mlfq"
    }

    fn init(rq: &mut RunQueue<Self>) {
        rq.queue.bands.resize_with(config::MLFQ_LEVELS, VecDeque::new);
    }

    fn enqueue(rq: &mut RunQueue<Self>, task: &Arc<Task>) {
        let level = task.queue_level().min(rq.queue.bands.len() - 1);
        let full = band_slice(rq, level);
        if task.time_slice() == 0 || task.time_slice() > full {
            task.set_time_slice(full);
        }
        task.set_queue_level(level);
        rq.queue.bands[level].push_back(task.clone());
    }

    fn dequeue(rq: &mut RunQueue<Self>, task: &Arc<Task>) {
        let level = task.queue_level();
        match rq.queue.bands[level].iter().position(|t| t.pid == task.pid) {
            Some(idx) => {
                rq.queue.bands[level].remove(idx);
            }
            None => panic!("mlfq: dequeue pid {} not on band {}", task.pid, level),
        }
    }

    fn pick_next(rq: &RunQueue<Self>) -> Option<Arc<Task>> {
        rq.queue
            .bands
            .iter()
            .find(|band| !band.is_empty())
            .and_then(|band| band.front().cloned())
    }

    fn proc_tick(rq: &mut RunQueue<Self>, task: &Arc<Task>) {
        let slice = task.time_slice();
        if slice > 0 {
            task.set_time_slice(slice - 1);
            if slice == 1 {
                // 整片用完才降层，睡眠让出的不算
                task.set_need_resched();
                let level = task.queue_level();
                if level + 1 < rq.queue.bands.len() {
                    task.set_queue_level(level + 1);
                }
            }
        } else {
            task.set_need_resched();
        }
    }

    fn get_load(rq: &RunQueue<Self>) -> u64 {
        let levels = rq.queue.bands.len() as u64;
        rq.queue
            .bands
            .iter()
            .enumerate()
            .map(|(idx, band)| band.len() as u64 * (levels - idx as u64))
            .sum()
    }

    fn get_proc(rq: &mut RunQueue<Self>, out: &mut Vec<Arc<Task>>, count: usize) -> usize {
        // 从最底层摘起，交互性最差的进程迁移代价最小
        let mut taken = 0;
        for level in (0..rq.queue.bands.len()).rev() {
            let mut idx = 0;
            while taken < count && idx < rq.queue.bands[level].len() {
                if rq.queue.bands[level][idx].is_pinned() {
                    idx += 1;
                    continue;
                }
                if let Some(task) = rq.queue.bands[level].remove(idx) {
                    out.push(task);
                    taken += 1;
                }
            }
            if taken == count {
                break;
            }
        }
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ProcTable, TaskFlags};
    use alloc::vec::Vec;

    fn fresh_rq() -> RunQueue<Mlfq> {
        RunQueue::new(8)
    }

    /// 模拟一整段运行：摘下队列，烧完当前时间片
    fn run_out_slice(rq: &mut RunQueue<Mlfq>, task: &Arc<crate::process::Task>) {
        Mlfq::dequeue(rq, task);
        while task.time_slice() > 0 {
            Mlfq::proc_tick(rq, task);
        }
    }

    #[test]
    fn test_demotes_after_full_slice() {
        let table = ProcTable::new();
        let rq = &mut fresh_rq();
        let t = table.create(TaskFlags::empty());
        Mlfq::enqueue(rq, &t);
        assert_eq!(t.queue_level(), 0);
        assert_eq!(t.time_slice(), 8);

        run_out_slice(rq, &t);
        assert!(t.need_resched());
        assert_eq!(t.queue_level(), 1);

        // 重新入队补满下一层的双倍时间片
        Mlfq::enqueue(rq, &t);
        assert_eq!(t.time_slice(), 16);
    }

    #[test]
    fn test_partial_run_keeps_level() {
        let table = ProcTable::new();
        let rq = &mut fresh_rq();
        let t = table.create(TaskFlags::empty());
        Mlfq::enqueue(rq, &t);
        Mlfq::dequeue(rq, &t);

        for _ in 0..3 {
            Mlfq::proc_tick(rq, &t);
        }
        assert_eq!(t.queue_level(), 0);
        Mlfq::enqueue(rq, &t);
        assert_eq!(t.time_slice(), 5);
    }

    #[test]
    fn test_pick_prefers_top_band() {
        let table = ProcTable::new();
        let rq = &mut fresh_rq();
        let old = table.create(TaskFlags::empty());
        Mlfq::enqueue(rq, &old);
        run_out_slice(rq, &old);
        Mlfq::enqueue(rq, &old);

        let fresh = table.create(TaskFlags::empty());
        Mlfq::enqueue(rq, &fresh);
        assert_eq!(Mlfq::pick_next(rq).unwrap().pid, fresh.pid);

        Mlfq::dequeue(rq, &fresh);
        assert_eq!(Mlfq::pick_next(rq).unwrap().pid, old.pid);
    }

    #[test]
    fn test_fifo_within_band() {
        let table = ProcTable::new();
        let rq = &mut fresh_rq();
        let a = table.create(TaskFlags::empty());
        let b = table.create(TaskFlags::empty());
        Mlfq::enqueue(rq, &a);
        Mlfq::enqueue(rq, &b);

        assert_eq!(Mlfq::pick_next(rq).unwrap().pid, a.pid);
        Mlfq::dequeue(rq, &a);
        assert_eq!(Mlfq::pick_next(rq).unwrap().pid, b.pid);
    }

    #[test]
    fn test_bottom_band_never_demotes_further() {
        let table = ProcTable::new();
        let rq = &mut fresh_rq();
        let t = table.create(TaskFlags::empty());
        Mlfq::enqueue(rq, &t);

        for _ in 0..config::MLFQ_LEVELS + 2 {
            run_out_slice(rq, &t);
            Mlfq::enqueue(rq, &t);
        }
        assert_eq!(t.queue_level(), config::MLFQ_LEVELS - 1);
    }

    #[test]
    fn test_load_weights_top_bands_heavier() {
        let table = ProcTable::new();
        let rq = &mut fresh_rq();
        let top = table.create(TaskFlags::empty());
        let low = table.create(TaskFlags::empty());
        Mlfq::enqueue(rq, &top);
        Mlfq::enqueue(rq, &low);
        run_out_slice(rq, &low);
        Mlfq::enqueue(rq, &low);

        // 0 层权重 4，1 层权重 3
        assert_eq!(Mlfq::get_load(rq), 4 + 3);
    }

    #[test]
    fn test_get_proc_drains_bottom_first() {
        let table = ProcTable::new();
        let rq = &mut fresh_rq();
        let top = table.create(TaskFlags::empty());
        let low = table.create(TaskFlags::empty());
        Mlfq::enqueue(rq, &top);
        Mlfq::enqueue(rq, &low);
        run_out_slice(rq, &low);
        Mlfq::enqueue(rq, &low);

        let mut out = Vec::new();
        assert_eq!(Mlfq::get_proc(rq, &mut out, 1), 1);
        assert_eq!(out[0].pid, low.pid);
        assert_eq!(Mlfq::pick_next(rq).unwrap().pid, top.pid);
    }
}
