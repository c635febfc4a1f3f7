//! Two-level page tables and the paging bring-up sequence.
//!
//! The kernel directory identity-maps everything the placement allocator
//! has handed out and maps the heap region into the higher half. Page
//! tables themselves always come from the placement allocator so that
//! their frames stay identity-mapped.

use core::mem::size_of;

use bitflags::bitflags;

use crate::mm::{bump::BumpAllocator, AllocFlags, PAGE_SIZE};

pub const ENTRIES_PER_TABLE: usize = 1024;

/// Directory slot flags for a freshly created page table: present,
/// writable, user.
const TABLE_FLAGS: u32 = 0x7;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageEntryFlags: u32 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;
        const ACCESSED = 1 << 3;
        const DIRTY = 1 << 4;
    }
}

/// A 32-bit page-table entry: permission bits in the low word, the frame
/// index in the top 20 bits. A non-present entry traps on access.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageEntry(u32);

impl PageEntry {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn flags(&self) -> PageEntryFlags {
        PageEntryFlags::from_bits_truncate(self.0)
    }

    fn set_flag(&mut self, flag: PageEntryFlags, value: bool) {
        if value {
            self.0 |= flag.bits();
        } else {
            self.0 &= !flag.bits();
        }
    }

    pub fn is_present(&self) -> bool {
        self.flags().contains(PageEntryFlags::PRESENT)
    }

    pub fn set_present(&mut self, value: bool) {
        self.set_flag(PageEntryFlags::PRESENT, value);
    }

    pub fn is_writable(&self) -> bool {
        self.flags().contains(PageEntryFlags::WRITABLE)
    }

    pub fn set_writable(&mut self, value: bool) {
        self.set_flag(PageEntryFlags::WRITABLE, value);
    }

    pub fn is_user(&self) -> bool {
        self.flags().contains(PageEntryFlags::USER)
    }

    pub fn set_user(&mut self, value: bool) {
        self.set_flag(PageEntryFlags::USER, value);
    }

    /// Physical frame index (the frame's address divided by 4 KiB).
    pub fn frame(&self) -> u32 {
        self.0 >> 12
    }

    pub fn set_frame(&mut self, frame: u32) {
        self.0 = (self.0 & 0xFFF) | (frame << 12);
    }
}

#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [PageEntry; ENTRIES_PER_TABLE],
}

const _: () = assert!(size_of::<PageTable>() == 4096);

/// Page directory: owned table references plus the parallel physical-address
/// array in the form the translation base register consumes.
#[repr(C)]
pub struct PageDirectory {
    tables: [*mut PageTable; ENTRIES_PER_TABLE],
    tables_phys: [u32; ENTRIES_PER_TABLE],
    /// Physical address of `tables_phys`, loaded into CR3.
    phys_addr: u32,
}

impl PageDirectory {
    pub const fn new() -> Self {
        Self {
            tables: [core::ptr::null_mut(); ENTRIES_PER_TABLE],
            tables_phys: [0; ENTRIES_PER_TABLE],
            phys_addr: 0,
        }
    }

    /// Records where `tables_phys` sits physically. Valid only while the
    /// directory lives in identity-mapped memory.
    pub fn set_translation_base(&mut self) {
        self.phys_addr = &self.tables_phys as *const _ as usize as u32;
    }

    pub fn translation_base(&self) -> u32 {
        self.phys_addr
    }

    /// Raw directory slot contents, for diagnostics.
    pub fn table_phys_entry(&self, index: usize) -> u32 {
        self.tables_phys[index]
    }

    /// Looks up the page entry covering `address`.
    ///
    /// When the covering page table is missing and `create` is set, a
    /// zeroed page-aligned table is drawn from the placement allocator and
    /// wired into the directory; otherwise absence yields `None`.
    pub fn get_page(
        &mut self,
        address: u32,
        create: bool,
        bump: &mut BumpAllocator,
    ) -> Option<&mut PageEntry> {
        let page_index = (address as usize) / PAGE_SIZE;
        let table_index = page_index / ENTRIES_PER_TABLE;
        let entry_index = page_index % ENTRIES_PER_TABLE;

        if !self.tables[table_index].is_null() {
            // SAFETY: non-null table pointers were installed below and point
            // at placement-allocated tables that live forever.
            return Some(unsafe { &mut (*self.tables[table_index]).entries[entry_index] });
        }
        if !create {
            return None;
        }

        let mut phys = 0;
        let table_address = bump.alloc(
            size_of::<PageTable>(),
            AllocFlags::ALIGNED | AllocFlags::ZERO,
            Some(&mut phys),
        );
        let table = table_address as *mut PageTable;
        self.tables[table_index] = table;
        self.tables_phys[table_index] = phys | TABLE_FLAGS;
        // SAFETY: the table was just allocated, zeroed and aligned.
        Some(unsafe { &mut (*table).entries[entry_index] })
    }
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// Loads the directory into CR3 and turns on the paging bit in CR0.
///
/// # Safety
///
/// The directory must identity-map every address the kernel is currently
/// executing from and must stay alive for as long as it is installed.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub unsafe fn switch_page_directory(directory: *const PageDirectory) {
    use core::arch::asm;
    // SAFETY: per the function contract the directory is live and covers
    // the executing kernel image.
    unsafe {
        let base = (*directory).phys_addr;
        asm!("mov cr3, {}", in(reg) base, options(nostack, preserves_flags));
        let mut cr0: u32;
        asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
        cr0 |= 0x8000_0000;
        asm!("mov cr0, {}", in(reg) cr0, options(nostack, preserves_flags));
    }
}

/// Brings up paging and the kernel heap.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn init_paging() {
    use crate::{
        arch::x86::idt::{self, PAGE_FAULT_VECTOR},
        mm::{
            frame::FrameAllocator,
            heap::Heap,
            kmalloc::{self, MemoryManager, MemoryState},
            page_fault, HEAP_INDEX_CAPACITY, HEAP_INITIAL_SIZE, HEAP_MAX, HEAP_START, MEM_END,
        },
    };

    let mut state = kmalloc::memory_state_lock();
    let mut bump = match core::mem::replace(&mut *state, MemoryState::Uninit) {
        MemoryState::Early(bump) => bump,
        _ => kpanic!("paging initialised twice"),
    };

    // Frame bitmap sized from the end of physical memory.
    let mut frames = FrameAllocator::new(&mut bump, MEM_END);

    // The kernel page directory.
    let directory = bump.alloc(
        size_of::<PageDirectory>(),
        AllocFlags::ALIGNED | AllocFlags::ZERO,
        None,
    ) as *mut PageDirectory;
    // SAFETY: just allocated, zeroed, page-aligned, and never freed.
    unsafe { (*directory).set_translation_base() };

    // Force the page tables covering the heap to exist before identity
    // mapping consumes more placement memory.
    let mut address = HEAP_START;
    while address < HEAP_START + HEAP_INITIAL_SIZE {
        // SAFETY: the directory pointer is valid for the kernel's lifetime.
        let _ = unsafe { (*directory).get_page(address as u32, true, &mut bump) };
        address += PAGE_SIZE;
    }

    // Identity map everything the placement allocator has handed out. The
    // bound is re-read every page: creating page tables inside this loop
    // moves the placement address, and those tables need mappings too.
    let mut address = 0;
    while address < bump.placement_address() {
        // SAFETY: as above.
        let page = unsafe {
            (*directory)
                .get_page(address as u32, true, &mut bump)
                .expect("identity mapping requires a page entry")
        };
        frames.alloc_frame(page, false, false);
        address += PAGE_SIZE;
    }

    // Back the heap pages reserved above with frames.
    let mut address = HEAP_START;
    while address < HEAP_START + HEAP_INITIAL_SIZE {
        // SAFETY: as above.
        let page = unsafe {
            (*directory)
                .get_page(address as u32, false, &mut bump)
                .expect("heap page tables were created above")
        };
        frames.alloc_frame(page, false, false);
        address += PAGE_SIZE;
    }

    idt::register_interrupt_handler(PAGE_FAULT_VECTOR, page_fault::page_fault_handler);

    // SAFETY: the loops above identity-mapped the kernel image, the frame
    // bitmap, the directory and every page table it references.
    unsafe { switch_page_directory(directory) };

    // SAFETY: the heap region was mapped and frame-backed above.
    let heap = unsafe {
        Heap::place(
            HEAP_START,
            HEAP_START + HEAP_INITIAL_SIZE,
            HEAP_MAX,
            false,
            false,
            HEAP_INDEX_CAPACITY,
        )
    };

    *state = MemoryState::Ready(MemoryManager::new(bump, frames, directory, heap));
    drop(state);
    log::info!(target: "mm", "paging enabled, kernel heap at {HEAP_START:#X}");
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use alloc::boxed::Box;

    use super::*;

    #[test]
    fn entry_packs_flags_and_frame() {
        let mut entry = PageEntry::empty();
        entry.set_present(true);
        entry.set_writable(true);
        entry.set_user(false);
        entry.set_frame(0x1234);
        assert_eq!(entry.raw(), (0x1234 << 12) | 0b011);
        assert_eq!(entry.frame(), 0x1234);
        assert!(entry.is_present());
        assert!(entry.is_writable());
        assert!(!entry.is_user());

        entry.set_frame(0);
        assert_eq!(entry.raw(), 0b011);
    }

    #[test]
    fn get_page_creates_tables_on_demand() {
        let arena = Box::leak(vec![0u8; 8 * PAGE_SIZE].into_boxed_slice());
        // page tables must land page-aligned inside the arena
        let base = (arena.as_mut_ptr() as usize + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
        let mut bump = BumpAllocator::new(base);
        let directory = Box::leak(Box::new(PageDirectory::new()));

        assert!(directory.get_page(0x0000_1000, false, &mut bump).is_none());

        let entry = directory
            .get_page(0x0000_1000, true, &mut bump)
            .expect("create");
        assert!(!entry.is_present());

        // the directory slot carries present|rw|user over the table address
        let slot = directory.table_phys_entry(0);
        assert_eq!(slot & 0xFFF, TABLE_FLAGS);
        assert_eq!(slot & !0xFFF, base as u32 & !0xFFF);

        // a second page in the same 4 MiB region reuses the table
        let before = bump.placement_address();
        directory
            .get_page(0x0000_3000, true, &mut bump)
            .expect("lookup");
        assert_eq!(bump.placement_address(), before);

        // a distant address allocates a fresh table
        directory
            .get_page(0x0040_0000, true, &mut bump)
            .expect("create second table");
        assert_ne!(bump.placement_address(), before);
        assert_eq!(directory.table_phys_entry(1) & 0xFFF, TABLE_FLAGS);
    }
}
