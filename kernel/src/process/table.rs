//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程表与线程组
//!
//! 进程控制块统一放在按 pid 索引的表里，调度链路（运行队列、
//! 定时器、线程组）之间只传 `Arc<Task>` 句柄，不再有嵌入式
//! 链表节点和裸指针。
//!
//! - PID 0..核数: 各核的 idle 进程
//! - 其余 PID: 单调分配，暂不复用

use core::sync::atomic::{AtomicU32, Ordering};

use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;

use super::task::{Pid, Task, TaskFlags};

/// PID 上限 (默认 32768，最大可到 4M)
pub const PID_MAX_LIMIT: u32 = 4194304;

/// 进程表
///
/// 槽位与 pid 一一对应。进程生命周期路径负责创建和回收，
/// 调度器只通过句柄观察和修改调度字段。
pub struct ProcTable {
    tasks: spin::Mutex<Vec<Option<Arc<Task>>>>,
    next_pid: AtomicU32,
}

impl ProcTable {
    pub fn new() -> ProcTable {
        ProcTable {
            tasks: spin::Mutex::new(Vec::new()),
            next_pid: AtomicU32::new(0),
        }
    }

    /// 分配一个新进程（状态 UNINIT）
    pub fn create(&self, flags: TaskFlags) -> Arc<Task> {
        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        assert!(pid < PID_MAX_LIMIT, "proc table: out of pids");

        let task = Arc::new(Task::new(pid, flags));
        let mut tasks = self.tasks.lock();
        let idx = pid as usize;
        if tasks.len() <= idx {
            tasks.resize(idx + 1, None);
        }
        tasks[idx] = Some(task.clone());
        task
    }

    /// 按 pid 查找
    pub fn get(&self, pid: Pid) -> Option<Arc<Task>> {
        self.tasks
            .lock()
            .get(pid as usize)
            .and_then(|slot| slot.clone())
    }

    /// 回收一个槽位，由进程生命周期路径在收尸后调用
    ///
    /// TODO: 实现 PID 复用
    pub fn remove(&self, pid: Pid) -> Option<Arc<Task>> {
        self.tasks
            .lock()
            .get_mut(pid as usize)
            .and_then(|slot| slot.take())
    }

    /// 存活进程数
    pub fn len(&self) -> usize {
        self.tasks.lock().iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 当前所有进程的快照，诊断和测试用
    pub fn snapshot(&self) -> Vec<Arc<Task>> {
        self.tasks.lock().iter().flatten().cloned().collect()
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}

/// 线程组
///
/// 同组线程共享一个成员表，组定向的信号唤醒沿表扫描。
/// 成员用弱引用，进程回收后自然失效。
pub struct ThreadGroup {
    members: spin::Mutex<Vec<Weak<Task>>>,
}

impl ThreadGroup {
    pub fn new() -> Arc<ThreadGroup> {
        Arc::new(ThreadGroup {
            members: spin::Mutex::new(Vec::new()),
        })
    }

    /// 把进程加入本组
    pub fn join(self: &Arc<Self>, task: &Arc<Task>) {
        self.members.lock().push(Arc::downgrade(task));
        task.set_thread_group(self.clone());
    }

    /// 存活成员
    pub fn members(&self) -> Vec<Arc<Task>> {
        self.members
            .lock()
            .iter()
            .filter_map(|w| w.upgrade())
            .collect()
    }
}
