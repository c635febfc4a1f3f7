//! Programmable interval timer: the kernel's preemption source.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::arch::x86::{
    idt::{self, RegisterFrame, IRQ0},
    port,
};
use crate::sched;

/// The PIT's fixed input clock, in Hz.
pub const PIT_FREQUENCY: u32 = 1_193_180;

const PIT_CHANNEL0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;
/// Channel 0, access low/high byte, mode 3, binary counting.
const PIT_CONFIGURE: u8 = 0x36;

static TICKS: AtomicU32 = AtomicU32::new(0);

/// Ticks since the timer was configured.
pub fn ticks() -> u32 {
    TICKS.load(Ordering::Relaxed)
}

fn timer_interrupt(_frame: &mut RegisterFrame) {
    TICKS.fetch_add(1, Ordering::Relaxed);
    // The dispatcher acknowledged the controller before calling us, so the
    // scheduler is free to switch away from this frame.
    sched::schedule();
}

/// Programs channel 0 for periodic interrupts at `hz` and hooks the
/// scheduler tick onto IRQ 0.
pub fn init(hz: u32) {
    idt::register_interrupt_handler(IRQ0, timer_interrupt);

    let divisor = PIT_FREQUENCY / hz;
    port::outb(PIT_COMMAND, PIT_CONFIGURE);
    port::outb(PIT_CHANNEL0, (divisor & 0xFF) as u8);
    port::outb(PIT_CHANNEL0, ((divisor >> 8) & 0xFF) as u8);

    log::info!(target: "timer", "interval timer running at {} Hz", hz);
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::arch::x86::{idt::irq_dispatch, port::with_port_trace};

    #[test]
    fn init_programs_the_divisor_low_then_high() {
        // 1193180 / 20 Hz = 59659 = 0xE90B
        let ((), trace) = with_port_trace(|| init(20));
        assert_eq!(
            trace,
            vec![(PIT_COMMAND, 0x36), (PIT_CHANNEL0, 0x0B), (PIT_CHANNEL0, 0xE9)]
        );
    }

    #[test]
    fn dispatched_ticks_advance_the_counter() {
        let _ = with_port_trace(|| init(100));
        let before = ticks();
        let mut frame = RegisterFrame {
            int_no: IRQ0 as u32,
            ..Default::default()
        };
        let ((), trace) = with_port_trace(|| irq_dispatch(&mut frame));
        assert_eq!(ticks(), before + 1);
        // acknowledgement happened before the tick handler ran
        assert_eq!(trace[0], (0x20, 0x20));
    }
}
