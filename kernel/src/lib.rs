//! ferrite-kernel library
//!
//! A 32-bit protected-mode kernel for a single-CPU PC: descriptor tables
//! and interrupt dispatch, paging over a 16 MiB physical map, a first-fit
//! coalescing heap in the higher half, and round-robin threading driven by
//! the interval timer.
//!
//! The hardware-independent parts build for the host as well, where the
//! standard `#[test]` harness exercises them; everything that needs the
//! real CPU is gated on the bare-metal target.

#![no_std]

#[macro_use]
extern crate alloc;

// Host target: link std and use the system allocator so unit tests can
// allocate normally.
#[cfg(not(target_os = "none"))]
extern crate std;
#[cfg(not(target_os = "none"))]
#[global_allocator]
static SYSTEM_ALLOCATOR: std::alloc::System = std::alloc::System;

// Bare metal: the kernel heap backs every allocation.
#[cfg(all(target_arch = "x86", target_os = "none"))]
#[global_allocator]
static ALLOCATOR: mm::kmalloc::KernelAllocator = mm::kmalloc::KernelAllocator;

#[macro_use]
pub mod print;
#[macro_use]
pub mod panic;

pub mod arch;
pub mod drivers;
pub mod logger;
pub mod mm;
pub mod sched;
pub mod sync;
pub mod utils;

pub use arch::halt;
