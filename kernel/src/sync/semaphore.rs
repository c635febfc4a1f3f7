//! Counting semaphore backed by the spin lock and the scheduler.
//!
//! `wait` takes a unit of the counter, parking the calling thread on the
//! waiter list when none is available; `signal` returns a unit and wakes the
//! longest-waiting thread. Waking is by retry: the counter is incremented
//! and the woken thread loops back to claim it, so spurious wake-ups are
//! harmless.

extern crate alloc;

use alloc::collections::VecDeque;
use core::ptr::NonNull;

use crate::{
    arch::x86::interrupts,
    sched::{self, thread::Thread},
    sync::SpinLock,
};

struct SemaphoreInner {
    count: u32,
    waiters: VecDeque<NonNull<Thread>>,
}

pub struct Semaphore {
    inner: SpinLock<SemaphoreInner>,
}

// SAFETY: the inner spin lock serializes every access to the waiter list;
// the thread pointers it holds are leaked allocations that outlive the
// semaphore.
unsafe impl Send for Semaphore {}
// SAFETY: see above; shared use never yields unsynchronized access.
unsafe impl Sync for Semaphore {}

impl Semaphore {
    pub const fn new(count: u32) -> Self {
        Self {
            inner: SpinLock::new(SemaphoreInner {
                count,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Takes one unit, blocking the current thread until one is available.
    ///
    /// Blocking suspends the caller off the ready queue, so another runnable
    /// thread must exist to eventually `signal`.
    pub fn wait(&self) {
        loop {
            let acquired = interrupts::without(|| {
                let mut inner = self.inner.lock();
                if inner.count > 0 {
                    inner.count -= 1;
                    true
                } else {
                    if let Some(current) = sched::current_thread() {
                        inner.waiters.push_back(current);
                        drop(inner);
                        sched::block_current();
                    } else {
                        drop(inner);
                    }
                    false
                }
            });
            if acquired {
                return;
            }
            core::hint::spin_loop();
        }
    }

    /// Takes one unit if available, without blocking.
    pub fn try_wait(&self) -> bool {
        interrupts::without(|| {
            let mut inner = self.inner.lock();
            if inner.count > 0 {
                inner.count -= 1;
                true
            } else {
                false
            }
        })
    }

    /// Returns one unit and wakes the oldest waiter, if any.
    pub fn signal(&self) {
        interrupts::without(|| {
            let mut inner = self.inner.lock();
            inner.count += 1;
            if let Some(waiter) = inner.waiters.pop_front() {
                sched::thread_is_ready(waiter);
            }
        });
    }

    pub fn available(&self) -> u32 {
        self.inner.lock().count
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn try_wait_consumes_units() {
        let sem = Semaphore::new(2);
        assert!(sem.try_wait());
        assert!(sem.try_wait());
        assert!(!sem.try_wait());
        assert_eq!(sem.available(), 0);
    }

    #[test]
    fn signal_restores_units() {
        let sem = Semaphore::new(0);
        assert!(!sem.try_wait());
        sem.signal();
        sem.signal();
        assert_eq!(sem.available(), 2);
        assert!(sem.try_wait());
        assert_eq!(sem.available(), 1);
    }
}
