//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Crux 内核的进程调度核心
//!
//! 多核内核里并发协调最重的子系统：每核运行队列、可插拔的
//! 调度类、驱动睡眠超时的差分定时器链表、跨核负载均衡。
//!
//! 内核的其余部分（内存管理、ELF 装载、陷入入口、控制台）是
//! 这里的协作方：它们交来初始化好的进程，并在约定的时机调用
//! [`sched::Scheduler`] 的入口（`timer_tick` / `schedule` /
//! `wakeup` / `try_wakeup` / `stop`）。调度器只改写进程的调度
//! 字段，不分配也不回收进程本身。
//!
//! 裸机目标（riscv64）上以 no_std 构建；宿主机上带标准库构建
//! 以运行测试，线程充当 CPU 核（见 `arch::sim`）。

#![cfg_attr(all(feature = "riscv64", target_arch = "riscv64"), no_std)]

extern crate alloc;
extern crate log;

pub mod arch;
pub mod config;
pub mod process;
pub mod sched;
pub mod sync;

pub use process::{ProcTable, Task, TaskFlags, TaskState, WaitReason};
pub use sched::{KernelScheduler, Scheduler, Timer, TimerHandle};
