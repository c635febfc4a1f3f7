//! Memory management.
//!
//! Boot-time allocation flows through the placement (bump) allocator until
//! paging is live; afterwards every allocation comes from the first-fit
//! kernel heap mapped into the higher half. The frame allocator hands out
//! physical 4 KiB frames to back page-table entries.

pub mod bump;
pub mod frame;
pub mod heap;
pub mod kmalloc;
pub mod page_fault;
pub mod paging;

use bitflags::bitflags;

/// Size of a physical frame and of a virtual page (4 KiB).
pub const PAGE_SIZE: usize = 4096;

/// Physical memory assumed present (16 MiB).
pub const MEM_END: usize = 0x0100_0000;

/// Base virtual address of the kernel heap.
pub const HEAP_START: usize = 0xC000_0000;

/// Size the heap is given at boot.
pub const HEAP_INITIAL_SIZE: usize = 0x0010_0000;

/// Highest address the heap may grow to.
pub const HEAP_MAX: usize = 0xCFFF_F000;

/// The heap never shrinks below this many bytes.
pub const HEAP_MIN_SIZE: usize = 0x0007_0000;

/// Entry capacity of the heap's free-block index.
pub const HEAP_INDEX_CAPACITY: usize = 0x0002_0000;

bitflags! {
    /// Allocation behavior requested from `kmalloc` and friends.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AllocFlags: u32 {
        /// Place the allocation on a 4 KiB boundary.
        const ALIGNED = 1 << 0;
        /// Zero the returned range.
        const ZERO = 1 << 1;
    }
}

pub use kmalloc::{kfree, kmalloc, kmalloc_aligned, kmalloc_aligned_zeroed, kmalloc_zeroed};

/// Brings up the placement allocator and the paging subsystem.
///
/// Must run after the descriptor tables are installed and before anything
/// touches the heap.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn init() {
    extern "C" {
        static __kernel_end: u8;
    }
    // SAFETY: `__kernel_end` is provided by the linker script; only its
    // address is taken.
    let kernel_end = unsafe { &__kernel_end as *const u8 as usize };
    kmalloc::seed_placement(kernel_end);
    paging::init_paging();
}
