//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 自旋锁 (Spinlock) 机制
//!
//! 遵循 Linux 内核的自旋锁设计：
//! - `include/linux/spinlock.h` - 自旋锁接口
//! - `kernel/locking/spinlock.c` - 自旋锁实现
//!
//! 核心概念：
//! - 获取方自旋等待锁位被清除，不睡眠
//! - 不可重入：同核重复获取会死锁
//! - 无持有者记录，调用方必须保证严格的获取/释放配对
//! - 中断安全的用法是先关中断再拿锁（见 [`super::IntrGuard`]）

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// 自旋若干次后插入一次忙等提示，降低总线争用
const SPIN_RELAX_INTERVAL: u32 = 100;

/// 底层自旋锁：一个原子位
///
/// 只提供裸的 acquire/release，不携带数据。
/// 需要保护数据时用 [`SpinLock<T>`]。
pub struct RawSpinLock {
    locked: AtomicBool,
}

impl RawSpinLock {
    pub const fn new() -> Self {
        RawSpinLock {
            locked: AtomicBool::new(false),
        }
    }

    /// 自旋直到拿到锁
    pub fn acquire(&self) {
        let mut step: u32 = 0;
        while !self.try_acquire() {
            step += 1;
            if step == SPIN_RELAX_INTERVAL {
                step = 0;
                core::hint::spin_loop();
            }
        }
    }

    /// 尝试获取一次，成功返回 true
    pub fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// 释放锁
    ///
    /// 只能由当前持有方调用。
    pub fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

/// 带数据的自旋锁
///
/// 通过 RAII guard 访问内部数据，guard 析构时释放锁，
/// 保证任何退出路径（包括 panic 展开）都会配对释放。
pub struct SpinLock<T: ?Sized> {
    raw: RawSpinLock,
    data: UnsafeCell<T>,
}

// 数据随锁跨核共享
unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(data: T) -> Self {
        SpinLock {
            raw: RawSpinLock::new(),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// 获取锁并返回访问 guard
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        self.raw.acquire();
        SpinLockGuard { lock: self }
    }

    /// 非阻塞获取
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        if self.raw.try_acquire() {
            Some(SpinLockGuard { lock: self })
        } else {
            None
        }
    }

    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// 绕过锁直接取数据指针
    ///
    /// 仅供体系结构层在上下文切换期间使用：此时被切换进程
    /// 不再执行，不存在并发访问。
    pub fn data_ptr(&self) -> *mut T {
        self.data.get()
    }
}

/// 自旋锁的访问 guard
pub struct SpinLockGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lock_unlock() {
        let lock = SpinLock::new(0u32);
        {
            let mut g = lock.lock();
            *g += 1;
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn test_try_lock_contended() {
        let lock = SpinLock::new(());
        let g = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(g);
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn test_mutual_exclusion() {
        // 多线程并发自增，计数不丢失说明互斥成立
        let lock = Arc::new(SpinLock::new(0u64));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let lock = lock.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    *lock.lock() += 1;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), 40_000);
    }
}
