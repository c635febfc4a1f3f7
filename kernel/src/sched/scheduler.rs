//! Round-robin scheduler.
//!
//! One FIFO ready queue plus the distinguished current thread. The timer
//! interrupt drives `schedule`, which rotates the queue and performs the
//! context switch; producers mutating the queue from thread context mask
//! interrupts for the duration.

extern crate alloc;

use alloc::collections::VecDeque;
use core::ptr::NonNull;

use spin::Mutex;

use crate::{
    arch::x86::interrupts,
    sched::thread::{Thread, ThreadId, ThreadState},
};

pub struct Scheduler {
    /// Runnable threads, excluding the one currently executing.
    ready: VecDeque<NonNull<Thread>>,
    current: Option<NonNull<Thread>>,
}

// SAFETY: thread records are leaked allocations that live forever; the
// scheduler is only ever driven under its global lock.
unsafe impl Send for Scheduler {}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            current: None,
        }
    }

    pub fn set_current(&mut self, thread: NonNull<Thread>) {
        self.current = Some(thread);
    }

    pub fn current(&self) -> Option<NonNull<Thread>> {
        self.current
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn enqueue(&mut self, thread: NonNull<Thread>) {
        // SAFETY: thread records are never freed while queued.
        unsafe { (*thread.as_ptr()).state = ThreadState::Ready };
        self.ready.push_back(thread);
    }

    /// Removes the first queued occurrence of `thread`, if any.
    pub fn dequeue(&mut self, thread: NonNull<Thread>) {
        if let Some(position) = self.ready.iter().position(|t| *t == thread) {
            self.ready.remove(position);
        }
    }

    /// One round-robin step: the current thread goes to the back of the
    /// queue (unless it finished) and the queue head becomes current.
    ///
    /// Returns the pair to switch between, or `None` when there is nobody
    /// to switch to.
    pub fn rotate(&mut self) -> Option<(NonNull<Thread>, NonNull<Thread>)> {
        let next = self.ready.pop_front()?;
        let prev = match self.current {
            Some(prev) => prev,
            None => {
                // not initialised yet; put the queue back as it was
                self.ready.push_front(next);
                return None;
            }
        };
        // SAFETY: both records are leaked allocations owned by the
        // scheduler protocol.
        unsafe {
            if (*prev.as_ptr()).state != ThreadState::Finished {
                (*prev.as_ptr()).state = ThreadState::Ready;
                self.ready.push_back(prev);
            }
            (*next.as_ptr()).state = ThreadState::Running;
        }
        self.current = Some(next);
        Some((prev, next))
    }

    /// Like [`rotate`](Self::rotate), but the outgoing thread is left off
    /// the ready queue entirely; someone else must wake it later.
    pub fn rotate_blocking(&mut self) -> Option<(NonNull<Thread>, NonNull<Thread>)> {
        let next = self.ready.pop_front()?;
        let prev = match self.current {
            Some(prev) => prev,
            None => {
                self.ready.push_front(next);
                return None;
            }
        };
        // SAFETY: as in `rotate`.
        unsafe { (*next.as_ptr()).state = ThreadState::Running };
        self.current = Some(next);
        Some((prev, next))
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

static SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::new());

/// Records the boot flow's thread record as the running thread.
pub fn init_scheduler(initial: NonNull<Thread>) {
    SCHEDULER.lock().set_current(initial);
}

/// Appends `thread` to the ready queue.
pub fn thread_is_ready(thread: NonNull<Thread>) {
    interrupts::without(|| SCHEDULER.lock().enqueue(thread));
}

/// Removes `thread` from the ready queue.
pub fn thread_not_ready(thread: NonNull<Thread>) {
    interrupts::without(|| SCHEDULER.lock().dequeue(thread));
}

pub fn current_thread() -> Option<NonNull<Thread>> {
    SCHEDULER.lock().current()
}

pub fn current_thread_id() -> Option<ThreadId> {
    // SAFETY: current points at a leaked, never-freed record.
    SCHEDULER.lock().current().map(|t| unsafe { t.as_ref().id })
}

/// Moves the current thread to its terminal state and reports its id.
pub fn mark_current_finished() -> Option<ThreadId> {
    interrupts::without(|| {
        let guard = SCHEDULER.lock();
        guard.current().map(|thread| {
            // SAFETY: the record is leaked and we hold the scheduler lock.
            unsafe {
                (*thread.as_ptr()).state = ThreadState::Finished;
                thread.as_ref().id
            }
        })
    })
}

/// Round-robin tick: rotates the queue and context-switches to the new
/// current thread. Called from the timer interrupt, after the controller
/// has been acknowledged. A no-op when nothing else is runnable.
pub fn schedule() {
    let switch = SCHEDULER.lock().rotate();
    perform_switch(switch);
}

/// Suspends the current thread without re-queueing it and runs the next
/// ready thread. The caller must have arranged for a later wake-up via
/// [`thread_is_ready`].
pub fn block_current() {
    let switch = SCHEDULER.lock().rotate_blocking();
    perform_switch(switch);
}

#[allow(unused_variables)]
fn perform_switch(switch: Option<(NonNull<Thread>, NonNull<Thread>)>) {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    if let Some((prev, next)) = switch {
        // SAFETY: both records outlive the switch (they are leaked), the
        // scheduler lock is already released, and the incoming context was
        // either saved by an earlier switch or built by thread creation.
        unsafe {
            let prev_context = core::ptr::addr_of_mut!((*prev.as_ptr()).context);
            let next_context = core::ptr::addr_of!((*next.as_ptr()).context);
            crate::arch::x86::context::switch_context(prev_context, next_context);
        }
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use alloc::boxed::Box;

    use super::*;
    use crate::arch::x86::context::ThreadContext;

    fn make_thread(id: u32) -> NonNull<Thread> {
        NonNull::from(Box::leak(Box::new(Thread {
            context: ThreadContext::default(),
            id: ThreadId(id),
            state: ThreadState::Ready,
        })))
    }

    fn id_of(thread: NonNull<Thread>) -> u32 {
        // SAFETY: test records are leaked.
        unsafe { thread.as_ref().id.0 }
    }

    #[test]
    fn rotate_is_fifo() {
        let mut scheduler = Scheduler::new();
        let (t0, t1, t2) = (make_thread(0), make_thread(1), make_thread(2));
        scheduler.set_current(t0);
        scheduler.enqueue(t1);
        scheduler.enqueue(t2);

        let (prev, next) = scheduler.rotate().unwrap();
        assert_eq!((id_of(prev), id_of(next)), (0, 1));
        let (prev, next) = scheduler.rotate().unwrap();
        assert_eq!((id_of(prev), id_of(next)), (1, 2));
        let (prev, next) = scheduler.rotate().unwrap();
        assert_eq!((id_of(prev), id_of(next)), (2, 0));
    }

    #[test]
    fn every_thread_runs_in_every_round() {
        // with N runnable threads, k*N rotations dispatch each at least k times
        const N: u32 = 4;
        const K: usize = 5;

        let mut scheduler = Scheduler::new();
        scheduler.set_current(make_thread(0));
        for id in 1..N {
            scheduler.enqueue(make_thread(id));
        }

        let mut dispatched = [0usize; N as usize];
        dispatched[0] += 1; // the initial thread is already running
        for _ in 0..K * N as usize {
            let (_, next) = scheduler.rotate().unwrap();
            dispatched[id_of(next) as usize] += 1;
        }
        for count in dispatched {
            assert!(count >= K, "a thread was starved: {:?}", dispatched);
        }
    }

    #[test]
    fn rotate_with_empty_queue_is_a_no_op() {
        let mut scheduler = Scheduler::new();
        scheduler.set_current(make_thread(0));
        assert!(scheduler.rotate().is_none());
    }

    #[test]
    fn rotate_without_current_leaves_the_queue_intact() {
        let mut scheduler = Scheduler::new();
        scheduler.enqueue(make_thread(1));
        assert!(scheduler.rotate().is_none());
        assert_eq!(scheduler.ready_len(), 1);
    }

    #[test]
    fn dequeue_removes_only_the_named_thread() {
        let mut scheduler = Scheduler::new();
        let (t1, t2, t3) = (make_thread(1), make_thread(2), make_thread(3));
        scheduler.enqueue(t1);
        scheduler.enqueue(t2);
        scheduler.enqueue(t3);
        scheduler.dequeue(t2);
        assert_eq!(scheduler.ready_len(), 2);
        scheduler.set_current(make_thread(0));
        let (_, next) = scheduler.rotate().unwrap();
        assert_eq!(id_of(next), 1);
        let (_, next) = scheduler.rotate().unwrap();
        assert_eq!(id_of(next), 3);
    }

    #[test]
    fn finished_threads_drop_out_of_rotation() {
        let mut scheduler = Scheduler::new();
        let (t0, t1) = (make_thread(0), make_thread(1));
        scheduler.set_current(t0);
        scheduler.enqueue(t1);

        // SAFETY: leaked test record.
        unsafe { (*t0.as_ptr()).state = ThreadState::Finished };
        let (prev, next) = scheduler.rotate().unwrap();
        assert_eq!((id_of(prev), id_of(next)), (0, 1));
        // t0 was not re-queued, so nothing is left to rotate to
        assert!(scheduler.rotate().is_none());
    }

    #[test]
    fn rotate_blocking_parks_the_outgoing_thread() {
        let mut scheduler = Scheduler::new();
        let (t0, t1) = (make_thread(0), make_thread(1));
        scheduler.set_current(t0);
        scheduler.enqueue(t1);

        let (prev, next) = scheduler.rotate_blocking().unwrap();
        assert_eq!((id_of(prev), id_of(next)), (0, 1));
        assert_eq!(scheduler.ready_len(), 0);

        // waking the parked thread puts it back into rotation
        scheduler.enqueue(t0);
        let (_, next) = scheduler.rotate().unwrap();
        assert_eq!(id_of(next), 0);
    }
}
