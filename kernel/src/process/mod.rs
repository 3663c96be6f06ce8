//! 进程管理
//!
//! 这里只承载调度器需要的那部分进程模型：控制块、进程表、
//! 线程组。创建/退出/回收等完整生命周期属于外部路径，它们
//! 通过 [`ProcTable`] 分配控制块，再经调度器入口投入运行。

pub mod table;
pub mod task;

pub use table::{ProcTable, ThreadGroup, PID_MAX_LIMIT};
pub use task::{Context, Pid, Task, TaskFlags, TaskState, WaitReason};
