//! x86 (32-bit protected mode) support.
//!
//! Descriptor tables, interrupt plumbing, the interval timer, port I/O and
//! the context-switch primitive. Everything that touches hardware is
//! compiled for the bare-metal target only; the protocol and table-packing
//! logic builds everywhere so it can be tested on the host.

pub mod context;
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod entry;
pub mod gdt;
pub mod idt;
pub mod pic;
pub mod port;
pub mod timer;

/// Installs the segment table, then the interrupt vector table (which also
/// remaps the interrupt controllers).
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn init() {
    gdt::init();
    idt::init();
    log::info!(target: "arch", "descriptor tables installed");
}

/// Stops doing useful work forever.
pub fn halt() -> ! {
    loop {
        #[cfg(all(target_arch = "x86", target_os = "none"))]
        // SAFETY: hlt waits for the next interrupt; no state is touched.
        unsafe {
            core::arch::asm!("hlt", options(nomem, nostack, preserves_flags));
        }
        #[cfg(not(all(target_arch = "x86", target_os = "none")))]
        core::hint::spin_loop();
    }
}

/// Interrupt flag control.
pub mod interrupts {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    mod imp {
        use core::arch::asm;

        pub fn enable() {
            // SAFETY: setting IF only permits interrupt delivery.
            unsafe { asm!("sti", options(nomem, nostack)) };
        }

        pub fn disable() {
            // SAFETY: clearing IF only defers interrupt delivery.
            unsafe { asm!("cli", options(nomem, nostack)) };
        }

        pub fn are_enabled() -> bool {
            let eflags: u32;
            // SAFETY: reads EFLAGS through the stack without other effects.
            unsafe { asm!("pushfd", "pop {}", out(reg) eflags, options(nomem)) };
            eflags & 0x200 != 0
        }
    }

    #[cfg(not(all(target_arch = "x86", target_os = "none")))]
    mod imp {
        pub fn enable() {}
        pub fn disable() {}
        pub fn are_enabled() -> bool {
            false
        }
    }

    pub use imp::{are_enabled, disable, enable};

    /// Runs `f` with interrupts masked, restoring the previous state after.
    pub fn without<R>(f: impl FnOnce() -> R) -> R {
        let were_enabled = are_enabled();
        disable();
        let result = f();
        if were_enabled {
            enable();
        }
        result
    }
}
