//! Kernel allocation front end.
//!
//! Before paging comes up, allocations fall through to the placement
//! allocator; afterwards they come from the kernel heap, with the frame
//! allocator and kernel directory backing growth. The whole memory state
//! lives behind one lock and moves through its phases exactly once, at
//! boot.

use core::{
    alloc::{GlobalAlloc, Layout},
    mem::size_of,
    ptr,
};

use spin::{Mutex, MutexGuard};

use crate::mm::{
    bump::BumpAllocator,
    frame::FrameAllocator,
    heap::{Heap, RegionMapper},
    paging::PageDirectory,
    AllocFlags, PAGE_SIZE,
};

/// Phases of the kernel's memory system.
pub enum MemoryState {
    /// Nothing set up yet; allocation is a bug.
    Uninit,
    /// Placement-only, from boot until paging init.
    Early(BumpAllocator),
    /// Heap-backed, for the rest of the kernel's lifetime.
    Ready(MemoryManager),
}

/// Owns every memory subsystem once paging is live.
pub struct MemoryManager {
    bump: BumpAllocator,
    frames: FrameAllocator,
    directory: *mut PageDirectory,
    heap: Heap,
}

// SAFETY: the directory pointer refers to a placement allocation that is
// never freed or aliased outside the MEMORY lock.
unsafe impl Send for MemoryManager {}

/// Connects heap growth to the frame allocator and kernel directory. Page
/// tables created along the way come from the placement allocator so their
/// frames stay identity-mapped.
struct KernelMapper<'a> {
    frames: &'a mut FrameAllocator,
    directory: &'a mut PageDirectory,
    bump: &'a mut BumpAllocator,
}

impl RegionMapper for KernelMapper<'_> {
    fn map(&mut self, virt: usize, is_kernel: bool, is_writable: bool) {
        let page = self
            .directory
            .get_page(virt as u32, true, self.bump)
            .expect("page entry exists after create");
        self.frames.alloc_frame(page, is_kernel, is_writable);
    }

    fn unmap(&mut self, virt: usize) {
        if let Some(page) = self.directory.get_page(virt as u32, false, self.bump) {
            self.frames.free_frame(page);
        }
    }
}

impl MemoryManager {
    pub fn new(
        bump: BumpAllocator,
        frames: FrameAllocator,
        directory: *mut PageDirectory,
        heap: Heap,
    ) -> Self {
        Self {
            bump,
            frames,
            directory,
            heap,
        }
    }

    fn allocate(&mut self, len: usize, flags: AllocFlags, phys: Option<&mut u32>) -> usize {
        let Self {
            bump,
            frames,
            directory,
            heap,
        } = self;

        let address = {
            // SAFETY: the directory is a never-freed placement allocation;
            // the MEMORY lock gives us exclusive access.
            let directory = unsafe { &mut **directory };
            let mut mapper = KernelMapper {
                frames: &mut *frames,
                directory,
                bump: &mut *bump,
            };
            heap.alloc(len, flags.contains(AllocFlags::ALIGNED), &mut mapper)
        };

        if let Some(phys) = phys {
            // SAFETY: as above; the mapper borrow has ended.
            let directory = unsafe { &mut **directory };
            if let Some(page) = directory.get_page(address as u32, false, bump) {
                *phys = page.frame() * PAGE_SIZE as u32 + (address as u32 & 0xFFF);
            }
        }

        if flags.contains(AllocFlags::ZERO) {
            // SAFETY: the heap just handed us `len` writable bytes.
            unsafe { ptr::write_bytes(address as *mut u8, 0, len) };
        }
        address
    }

    fn free(&mut self, address: usize) {
        // Placement allocations made before the heap existed are never
        // reclaimed.
        if !self.heap.contains(address) {
            return;
        }
        let Self {
            bump,
            frames,
            directory,
            heap,
        } = self;
        // SAFETY: as in `allocate`.
        let directory = unsafe { &mut **directory };
        let mut mapper = KernelMapper {
            frames,
            directory,
            bump,
        };
        heap.free(address, &mut mapper);
    }
}

static MEMORY: Mutex<MemoryState> = Mutex::new(MemoryState::Uninit);

pub(crate) fn memory_state_lock() -> MutexGuard<'static, MemoryState> {
    MEMORY.lock()
}

/// Starts the early phase with the placement address at `kernel_end`.
pub fn seed_placement(kernel_end: usize) {
    *MEMORY.lock() = MemoryState::Early(BumpAllocator::new(kernel_end));
}

fn allocate(len: usize, flags: AllocFlags, phys: Option<&mut u32>) -> usize {
    match &mut *MEMORY.lock() {
        MemoryState::Uninit => kpanic!("kernel allocator used before initialisation"),
        MemoryState::Early(bump) => bump.alloc(len, flags, phys),
        MemoryState::Ready(manager) => manager.allocate(len, flags, phys),
    }
}

/// Allocates `len` bytes of kernel memory.
pub fn kmalloc(len: usize) -> usize {
    allocate(len, AllocFlags::empty(), None)
}

/// Allocates `len` zeroed bytes.
pub fn kmalloc_zeroed(len: usize) -> usize {
    allocate(len, AllocFlags::ZERO, None)
}

/// Allocates `len` bytes on a 4 KiB boundary.
pub fn kmalloc_aligned(len: usize) -> usize {
    allocate(len, AllocFlags::ALIGNED, None)
}

/// Allocates `len` zeroed bytes on a 4 KiB boundary.
pub fn kmalloc_aligned_zeroed(len: usize) -> usize {
    allocate(len, AllocFlags::ALIGNED | AllocFlags::ZERO, None)
}

/// Allocates `len` bytes and reports the backing physical address.
pub fn kmalloc_phys(len: usize, phys: &mut u32) -> usize {
    allocate(len, AllocFlags::empty(), Some(phys))
}

/// Page-aligned, zeroed allocation with its physical address.
pub fn kmalloc_aligned_zeroed_phys(len: usize, phys: &mut u32) -> usize {
    allocate(len, AllocFlags::ALIGNED | AllocFlags::ZERO, Some(phys))
}

/// Returns memory to the kernel heap. Null and placement addresses are
/// ignored.
pub fn kfree(address: usize) {
    if address == 0 {
        return;
    }
    if let MemoryState::Ready(manager) = &mut *MEMORY.lock() {
        manager.free(address);
    }
}

/// `GlobalAlloc` adapter so kernel code can use `alloc` collections.
pub struct KernelAllocator;

// SAFETY: allocation is delegated to the kernel heap, which hands out
// word-aligned, non-overlapping blocks; requests needing stronger
// alignment are served page-aligned.
unsafe impl GlobalAlloc for KernelAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let flags = if layout.align() > size_of::<usize>() {
            AllocFlags::ALIGNED
        } else {
            AllocFlags::empty()
        };
        allocate(layout.size(), flags, None) as *mut u8
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        kfree(ptr as usize);
    }
}
