//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 差分定时器链表 (delta timer list)
//!
//! 每核一条按到期先后排序的链表，节点记录的不是绝对时刻，而是
//! 相对前一个节点的剩余滴答 (delta)。从表头累加到某节点的 delta
//! 之和就是它的绝对剩余滴答。时钟中断只递减表头一个计数，单次
//! tick 开销 O(1)，与表长无关。
//!
//! 同一滴答到期的定时器按插入顺序触发。取消定时器时把它的
//! 剩余 delta 并入后继，其余节点的绝对到期时刻不变。

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::process::Task;

/// 到期动作
pub(crate) enum TimerKind {
    /// 唤醒睡眠中的进程
    Wakeup(Arc<Task>),
    /// 回调函数与参数，在定时器锁之外执行
    Callback(fn(usize), usize),
}

/// 一次性定时器，入表时移动进链表，到期或取消即消亡
pub struct Timer {
    pub(crate) expires: u64,
    pub(crate) kind: TimerKind,
}

impl Timer {
    /// `expires` 个滴答后唤醒 `task`
    pub fn wakeup(expires: u64, task: Arc<Task>) -> Timer {
        Timer {
            expires,
            kind: TimerKind::Wakeup(task),
        }
    }

    /// `expires` 个滴答后调用 `func(arg)`
    pub fn callback(expires: u64, func: fn(usize), arg: usize) -> Timer {
        Timer {
            expires,
            kind: TimerKind::Callback(func, arg),
        }
    }
}

/// 取消定时器用的凭据，记录它挂在哪个核的哪个节点上
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    pub(crate) cpu: usize,
    pub(crate) id: u64,
}

struct TimerNode {
    id: u64,
    delta: u64,
    kind: TimerKind,
}

/// 单核的定时器链表，调用方负责加锁
#[derive(Default)]
pub(crate) struct TimerList {
    nodes: VecDeque<TimerNode>,
    next_id: u64,
}

impl TimerList {
    pub(crate) fn new() -> TimerList {
        TimerList::default()
    }

    /// 插入定时器，返回本表内唯一的节点号。
    ///
    /// 从表头起逐个扣减已有节点的 delta，扣到不够减为止，在那里
    /// 落位并改写后继的 delta。同滴答到期的新节点排在旧节点之后。
    pub(crate) fn add(&mut self, timer: Timer) -> u64 {
        assert!(timer.expires > 0, "timer: zero expiry");
        let id = self.next_id;
        self.next_id += 1;

        let mut remaining = timer.expires;
        let mut idx = 0;
        while idx < self.nodes.len() && remaining >= self.nodes[idx].delta {
            remaining -= self.nodes[idx].delta;
            idx += 1;
        }
        if idx < self.nodes.len() {
            self.nodes[idx].delta -= remaining;
        }
        self.nodes.insert(
            idx,
            TimerNode {
                id,
                delta: remaining,
                kind: timer.kind,
            },
        );
        id
    }

    /// 取消未到期的定时器。剩余 delta 并入后继，其余节点的绝对
    /// 到期时刻不受影响。节点不存在（已触发或已取消）返回 false。
    pub(crate) fn del(&mut self, id: u64) -> bool {
        let idx = match self.nodes.iter().position(|node| node.id == id) {
            Some(idx) => idx,
            None => return false,
        };
        let delta = self.nodes[idx].delta;
        self.nodes.remove(idx);
        if let Some(next) = self.nodes.get_mut(idx) {
            next.delta += delta;
        }
        true
    }

    /// 时钟中断入口：表头 delta 减一，弹出所有归零的节点。
    /// 返回触发的动作，调用方在释放定时器锁之后执行。
    pub(crate) fn tick(&mut self) -> Vec<TimerKind> {
        let mut fired = Vec::new();
        match self.nodes.front_mut() {
            Some(head) => head.delta -= 1,
            None => return fired,
        }
        while self.nodes.front().map_or(false, |head| head.delta == 0) {
            if let Some(node) = self.nodes.pop_front() {
                fired.push(node.kind);
            }
        }
        fired
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
