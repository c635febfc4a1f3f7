//! Page fault decoding and the fatal fault handler.

use bitflags::bitflags;

use crate::arch::x86::idt::RegisterFrame;

bitflags! {
    /// Error code pushed by the CPU for vector 14.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFaultErrorCode: u32 {
        /// Set when the fault was a protection violation on a present page;
        /// clear when the page was simply not present.
        const PROTECTION_VIOLATION = 1 << 0;
        /// Set when the access was a write.
        const CAUSED_BY_WRITE = 1 << 1;
        /// Set when the access came from user mode.
        const USER_MODE = 1 << 2;
        /// Set when a reserved bit was found set in a paging structure.
        const RESERVED_WRITE = 1 << 3;
        /// Set when the access was an instruction fetch.
        const INSTRUCTION_FETCH = 1 << 4;
    }
}

/// Reads the faulting virtual address out of CR2.
#[cfg(all(target_arch = "x86", target_os = "none"))]
fn faulting_address() -> u32 {
    let address: u32;
    // SAFETY: reading CR2 has no side effects.
    unsafe {
        core::arch::asm!("mov {}, cr2", out(reg) address, options(nomem, nostack, preserves_flags));
    }
    address
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
fn faulting_address() -> u32 {
    0
}

/// Fatal page fault handler, installed at vector 14 during paging init.
pub fn page_fault_handler(frame: &mut RegisterFrame) {
    let address = faulting_address();
    let code = PageFaultErrorCode::from_bits_truncate(frame.err_code);
    let rw = code.contains(PageFaultErrorCode::CAUSED_BY_WRITE) as u32;
    let us = code.contains(PageFaultErrorCode::USER_MODE) as u32;
    println!("Page fault (rw={}, us={}) at {:#X}", rw, us, address);
    kpanic!("page fault at {:#X} ({:?})", address, code);
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn error_code_bits_decode() {
        let code = PageFaultErrorCode::from_bits_truncate(0b00110);
        assert!(!code.contains(PageFaultErrorCode::PROTECTION_VIOLATION));
        assert!(code.contains(PageFaultErrorCode::CAUSED_BY_WRITE));
        assert!(code.contains(PageFaultErrorCode::USER_MODE));
        assert!(!code.contains(PageFaultErrorCode::RESERVED_WRITE));

        let code = PageFaultErrorCode::from_bits_truncate(0b10001);
        assert!(code.contains(PageFaultErrorCode::PROTECTION_VIOLATION));
        assert!(code.contains(PageFaultErrorCode::INSTRUCTION_FETCH));
    }

    #[test]
    #[should_panic(expected = "page fault")]
    fn handler_is_fatal() {
        let mut frame = RegisterFrame {
            int_no: 14,
            err_code: 0,
            ..Default::default()
        };
        page_fault_handler(&mut frame);
    }
}
