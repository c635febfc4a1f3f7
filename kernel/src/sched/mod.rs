//! Threading and the round-robin scheduler.
//!
//! Threads share the kernel address space and are preempted from the timer
//! interrupt. The only suspension point is the context switch performed
//! inside `schedule` (or `block_current` for threads parking themselves).

pub mod scheduler;
pub mod thread;

pub use scheduler::{
    block_current, current_thread, current_thread_id, init_scheduler, schedule, thread_is_ready,
    thread_not_ready, Scheduler,
};
pub use thread::{init_threading, Thread, ThreadId, ThreadState};
