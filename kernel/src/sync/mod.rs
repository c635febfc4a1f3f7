//! Synchronization primitives.
//!
//! The spin lock is the kernel's only low-level mutual exclusion primitive;
//! the semaphore builds on it together with the scheduler's ready-queue
//! operations.

pub mod semaphore;
pub mod spinlock;

pub use semaphore::Semaphore;
pub use spinlock::{RawSpinLock, SpinLock, SpinLockGuard};
