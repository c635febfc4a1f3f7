//! Interrupt vector table, handler registry and common dispatch.
//!
//! Vectors 0-31 carry CPU exceptions, 32-47 the remapped hardware IRQs.
//! The assembly trampolines push a full register frame and funnel into the
//! two dispatchers here, which consult the per-vector handler registry.

use spin::Mutex;

use crate::arch::x86::pic;

/// First vector the remapped hardware interrupts land on.
pub const IRQ_BASE: u8 = 32;
pub const IRQ0: u8 = IRQ_BASE;
pub const IRQ1: u8 = IRQ_BASE + 1;

/// CPU exception vector for page faults.
pub const PAGE_FAULT_VECTOR: u8 = 14;

/// Gate attributes: present, ring 0, 32-bit interrupt gate.
pub const GATE_FLAGS: u8 = 0x8E;

/// Snapshot of the CPU state pushed by an interrupt trampoline, in memory
/// order from the lowest address up: the saved data segment, the
/// general-purpose registers, the vector and error code, then the frame
/// the CPU itself pushed.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterFrame {
    pub ds: u32,
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub int_no: u32,
    pub err_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub useresp: u32,
    pub ss: u32,
}

pub type InterruptHandler = fn(&mut RegisterFrame);

static HANDLERS: Mutex<[Option<InterruptHandler>; 256]> = Mutex::new([None; 256]);

/// Installs `handler` for `vector`, replacing any previous registration.
pub fn register_interrupt_handler(vector: u8, handler: InterruptHandler) {
    HANDLERS.lock()[vector as usize] = Some(handler);
}

fn handler_for(vector: usize) -> Option<InterruptHandler> {
    HANDLERS.lock()[vector]
}

/// Common dispatcher for CPU exception vectors. An exception nobody
/// registered for is fatal.
///
/// `C-unwind` (rather than plain `C`) because the unhandled-vector path
/// panics via `kpanic!`; on the bare-metal target that panic aborts
/// regardless (the target spec fixes the panic strategy), and on the host
/// test target it lets `#[should_panic]` observe the unwind.
#[no_mangle]
pub extern "C-unwind" fn isr_dispatch(frame: &mut RegisterFrame) {
    match handler_for(frame.int_no as usize) {
        Some(handler) => handler(frame),
        None => {
            println!("Unhandled interrupt: {}", frame.int_no);
            kpanic!("unhandled exception vector {}", frame.int_no);
        }
    }
}

/// Common dispatcher for hardware interrupts.
///
/// The end-of-interrupt is sent before the handler runs, so a handler that
/// never returns to this frame (the scheduler's does not) still leaves the
/// interrupt controllers in a consistent state. A vector without a handler
/// is acknowledged and otherwise ignored.
#[no_mangle]
pub extern "C" fn irq_dispatch(frame: &mut RegisterFrame) {
    pic::end_of_interrupt(frame.int_no as u8);
    if let Some(handler) = handler_for(frame.int_no as usize) {
        handler(frame);
    }
}

/// One packed 8-byte interrupt gate.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct IdtEntry {
    base_low: u16,
    selector: u16,
    zero: u8,
    flags: u8,
    base_high: u16,
}

const _: () = assert!(core::mem::size_of::<IdtEntry>() == 8);

impl IdtEntry {
    pub const MISSING: Self = Self {
        base_low: 0,
        selector: 0,
        zero: 0,
        flags: 0,
        base_high: 0,
    };

    pub fn new(base: u32, selector: u16, flags: u8) -> Self {
        Self {
            base_low: (base & 0xFFFF) as u16,
            selector,
            zero: 0,
            flags,
            base_high: ((base >> 16) & 0xFFFF) as u16,
        }
    }

    pub fn base(&self) -> u32 {
        self.base_low as u32 | (self.base_high as u32) << 16
    }

    pub fn selector(&self) -> u16 {
        self.selector
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod table {
    use lazy_static::lazy_static;

    use super::{IdtEntry, GATE_FLAGS};
    use crate::arch::x86::{
        entry,
        gdt::{DescriptorTablePointer, KERNEL_CODE_SELECTOR},
        pic,
    };

    #[repr(C, align(8))]
    struct Idt {
        entries: [IdtEntry; 256],
    }

    lazy_static! {
        static ref IDT: Idt = {
            let mut entries = [IdtEntry::MISSING; 256];
            for (vector, stub) in entry::exception_stubs().iter().enumerate() {
                entries[vector] = IdtEntry::new(*stub as u32, KERNEL_CODE_SELECTOR, GATE_FLAGS);
            }
            for (irq, stub) in entry::irq_stubs().iter().enumerate() {
                entries[32 + irq] = IdtEntry::new(*stub as u32, KERNEL_CODE_SELECTOR, GATE_FLAGS);
            }
            Idt { entries }
        };
    }

    core::arch::global_asm!(
        r#"
.global idt_flush
idt_flush:
    movl 4(%esp), %eax
    lidt (%eax)
    ret
"#,
        options(att_syntax)
    );

    extern "C" {
        fn idt_flush(pointer: *const DescriptorTablePointer);
    }

    pub fn load() {
        pic::remap();
        let pointer = DescriptorTablePointer {
            limit: (core::mem::size_of::<[IdtEntry; 256]>() - 1) as u16,
            base: IDT.entries.as_ptr() as u32,
        };
        // SAFETY: the table is 'static and every non-missing gate points
        // at a trampoline with the kernel code selector.
        unsafe { idt_flush(&pointer) };
    }
}

/// Remaps the interrupt controllers and loads the vector table.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn init() {
    table::load();
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use super::*;
    use crate::arch::x86::port;

    #[test]
    fn gate_packing_splits_the_handler_address() {
        let gate = IdtEntry::new(0xDEAD_BEEF, 0x08, GATE_FLAGS);
        assert_eq!(gate.base(), 0xDEAD_BEEF);
        assert_eq!(gate.selector(), 0x08);
        assert_eq!(gate.flags(), 0x8E);
    }

    static SEEN_VECTOR: AtomicU32 = AtomicU32::new(0);

    fn remember_vector(frame: &mut RegisterFrame) {
        SEEN_VECTOR.store(frame.int_no, Ordering::SeqCst);
    }

    #[test]
    fn registered_exception_handler_is_invoked() {
        register_interrupt_handler(3, remember_vector);
        let mut frame = RegisterFrame {
            int_no: 3,
            ..Default::default()
        };
        isr_dispatch(&mut frame);
        assert_eq!(SEEN_VECTOR.load(Ordering::SeqCst), 3);
    }

    #[test]
    #[should_panic(expected = "unhandled exception vector")]
    fn unregistered_exception_is_fatal() {
        let mut frame = RegisterFrame {
            int_no: 30,
            ..Default::default()
        };
        isr_dispatch(&mut frame);
    }

    static WRITES_BEFORE_HANDLER: AtomicUsize = AtomicUsize::new(usize::MAX);

    fn count_prior_writes(_frame: &mut RegisterFrame) {
        WRITES_BEFORE_HANDLER.store(port::recorded_len(), Ordering::SeqCst);
    }

    #[test]
    fn irq_dispatch_acknowledges_before_the_handler_runs() {
        register_interrupt_handler(45, count_prior_writes);
        let ((), trace) = port::with_port_trace(|| {
            let mut frame = RegisterFrame {
                int_no: 45,
                ..Default::default()
            };
            irq_dispatch(&mut frame);
        });
        // vector 45 involves the slave controller: its acknowledgement
        // comes first, then the master's, then the handler
        assert_eq!(trace, vec![(0xA0, 0x20), (0x20, 0x20)]);
        assert_eq!(WRITES_BEFORE_HANDLER.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn irq_without_handler_is_still_acknowledged() {
        let ((), trace) = port::with_port_trace(|| {
            let mut frame = RegisterFrame {
                int_no: 35,
                ..Default::default()
            };
            irq_dispatch(&mut frame);
        });
        assert_eq!(trace, vec![(0x20, 0x20)]);
    }
}
