//! Physical frame allocator.
//!
//! One bit per 4 KiB frame, set when the frame is handed out. Allocation
//! scans the bitmap word by word, skipping fully used words.

use core::{mem::size_of, slice};

use crate::mm::{bump::BumpAllocator, paging::PageEntry, AllocFlags, PAGE_SIZE};

const BITS_PER_WORD: usize = 32;

pub struct FrameAllocator {
    bitmap: &'static mut [u32],
    nframes: usize,
}

impl FrameAllocator {
    /// Sizes the bitmap from `mem_end` bytes of physical memory and draws
    /// its storage, zeroed, from the placement allocator.
    pub fn new(bump: &mut BumpAllocator, mem_end: usize) -> Self {
        let nframes = mem_end / PAGE_SIZE;
        let words = nframes.div_ceil(BITS_PER_WORD);
        let address = bump.alloc(words * size_of::<u32>(), AllocFlags::ZERO, None);
        // SAFETY: the placement allocator just reserved `words` zeroed u32s
        // for our exclusive use, and never reuses the range.
        let bitmap = unsafe { slice::from_raw_parts_mut(address as *mut u32, words) };
        Self { bitmap, nframes }
    }

    /// Builds an allocator over caller-provided zeroed storage.
    pub fn with_storage(bitmap: &'static mut [u32], nframes: usize) -> Self {
        assert!(bitmap.len() * BITS_PER_WORD >= nframes);
        Self { bitmap, nframes }
    }

    pub fn nframes(&self) -> usize {
        self.nframes
    }

    fn set_frame(&mut self, frame: usize) {
        self.bitmap[frame / BITS_PER_WORD] |= 1 << (frame % BITS_PER_WORD);
    }

    fn clear_frame(&mut self, frame: usize) {
        self.bitmap[frame / BITS_PER_WORD] &= !(1 << (frame % BITS_PER_WORD));
    }

    pub fn is_allocated(&self, frame: usize) -> bool {
        self.bitmap[frame / BITS_PER_WORD] & (1 << (frame % BITS_PER_WORD)) != 0
    }

    fn first_free(&self) -> Option<usize> {
        for (word_index, &word) in self.bitmap.iter().enumerate() {
            if word == u32::MAX {
                continue;
            }
            for bit in 0..BITS_PER_WORD {
                if word & (1 << bit) == 0 {
                    let frame = word_index * BITS_PER_WORD + bit;
                    if frame < self.nframes {
                        return Some(frame);
                    }
                    return None;
                }
            }
        }
        None
    }

    /// Backs `page` with the first free frame.
    ///
    /// A page that already names a frame is left alone. The entry is marked
    /// present, writable per `is_writable`, and user-accessible for
    /// non-kernel requests. Panics when physical memory is exhausted.
    pub fn alloc_frame(&mut self, page: &mut PageEntry, is_kernel: bool, is_writable: bool) {
        if page.frame() != 0 {
            return;
        }
        let frame = match self.first_free() {
            Some(frame) => frame,
            None => kpanic!("No free frame"),
        };
        self.set_frame(frame);
        page.set_present(true);
        page.set_frame(frame as u32);
        page.set_writable(is_writable);
        page.set_user(!is_kernel);
    }

    /// Releases the frame backing `page`, if any. Only the frame field of
    /// the entry is cleared.
    pub fn free_frame(&mut self, page: &mut PageEntry) {
        if page.frame() == 0 {
            return;
        }
        let frame = page.frame() as usize;
        self.clear_frame(frame);
        page.set_frame(0);
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use alloc::boxed::Box;

    use super::*;

    fn allocator(words: usize, nframes: usize) -> FrameAllocator {
        let storage = Box::leak(vec![0u32; words].into_boxed_slice());
        FrameAllocator::with_storage(storage, nframes)
    }

    #[test]
    fn alloc_then_free_restores_bitmap() {
        let mut frames = allocator(4, 128);
        // occupy frame 0 so later pages get a non-zero frame number
        let mut first = PageEntry::empty();
        frames.alloc_frame(&mut first, false, false);

        let mut page = PageEntry::empty();
        frames.alloc_frame(&mut page, false, true);
        let frame = page.frame() as usize;
        assert_ne!(frame, 0);
        assert!(frames.is_allocated(frame));
        assert!(page.is_present());

        frames.free_frame(&mut page);
        assert!(!frames.is_allocated(frame));
        assert_eq!(page.frame(), 0);
        // free touches nothing but the frame field
        assert!(page.is_present());
    }

    #[test]
    fn backed_page_is_left_alone() {
        let mut frames = allocator(4, 128);
        let mut page = PageEntry::empty();
        page.set_frame(7);
        frames.alloc_frame(&mut page, false, true);
        assert_eq!(page.frame(), 7);
        assert!(!frames.is_allocated(7));
    }

    #[test]
    fn permission_bits_follow_the_request() {
        // The stored sense is user = !is_kernel, rw = is_writable; identity
        // mapping at boot passes (false, false) and so produces user-mode,
        // read-only entries.
        let mut frames = allocator(4, 128);
        let mut page = PageEntry::empty();
        frames.alloc_frame(&mut page, false, false);
        assert!(page.is_user());
        assert!(!page.is_writable());

        let mut page = PageEntry::empty();
        frames.alloc_frame(&mut page, true, true);
        assert!(!page.is_user());
        assert!(page.is_writable());
    }

    #[test]
    #[should_panic(expected = "No free frame")]
    fn exhaustion_panics() {
        let mut frames = allocator(1, 8);
        for _ in 0..9 {
            let mut page = PageEntry::empty();
            frames.alloc_frame(&mut page, false, true);
        }
    }
}
