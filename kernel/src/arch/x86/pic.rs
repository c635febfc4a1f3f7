//! Cascaded programmable interrupt controllers.
//!
//! The BIOS leaves the PICs delivering IRQs on vectors that collide with
//! CPU exceptions; `remap` moves them to 32-47 and unmasks every line.

use crate::arch::x86::port;

pub const MASTER_COMMAND: u16 = 0x20;
pub const MASTER_DATA: u16 = 0x21;
pub const SLAVE_COMMAND: u16 = 0xA0;
pub const SLAVE_DATA: u16 = 0xA1;

/// Initialization command word: edge-triggered, cascade, ICW4 follows.
const ICW1_INIT: u8 = 0x11;
/// Master PIC delivers IRQ 0-7 at vectors 0x20-0x27.
const MASTER_VECTOR_OFFSET: u8 = 0x20;
/// Slave PIC delivers IRQ 8-15 at vectors 0x28-0x2F.
const SLAVE_VECTOR_OFFSET: u8 = 0x28;
/// The slave hangs off master line 2.
const MASTER_CASCADE_MASK: u8 = 0x04;
const SLAVE_CASCADE_ID: u8 = 0x02;
const MODE_8086: u8 = 0x01;
const EOI: u8 = 0x20;

/// Moves hardware IRQs 0-15 onto vectors 32-47 and unmasks all of them.
pub fn remap() {
    port::outb(MASTER_COMMAND, ICW1_INIT);
    port::outb(SLAVE_COMMAND, ICW1_INIT);
    port::outb(MASTER_DATA, MASTER_VECTOR_OFFSET);
    port::outb(SLAVE_DATA, SLAVE_VECTOR_OFFSET);
    port::outb(MASTER_DATA, MASTER_CASCADE_MASK);
    port::outb(SLAVE_DATA, SLAVE_CASCADE_ID);
    port::outb(MASTER_DATA, MODE_8086);
    port::outb(SLAVE_DATA, MODE_8086);
    port::outb(MASTER_DATA, 0x00);
    port::outb(SLAVE_DATA, 0x00);
}

/// Acknowledges an in-service interrupt. Vectors 40 and up were routed
/// through the slave controller, which must be acknowledged as well.
pub fn end_of_interrupt(vector: u8) {
    if vector >= 40 {
        port::outb(SLAVE_COMMAND, EOI);
    }
    port::outb(MASTER_COMMAND, EOI);
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::arch::x86::port::with_port_trace;

    #[test]
    fn remap_follows_the_init_protocol() {
        let ((), trace) = with_port_trace(remap);
        assert_eq!(
            trace,
            vec![
                (MASTER_COMMAND, 0x11),
                (SLAVE_COMMAND, 0x11),
                (MASTER_DATA, 0x20),
                (SLAVE_DATA, 0x28),
                (MASTER_DATA, 0x04),
                (SLAVE_DATA, 0x02),
                (MASTER_DATA, 0x01),
                (SLAVE_DATA, 0x01),
                (MASTER_DATA, 0x00),
                (SLAVE_DATA, 0x00),
            ]
        );
    }

    #[test]
    fn master_only_vectors_skip_the_slave() {
        let ((), trace) = with_port_trace(|| end_of_interrupt(32));
        assert_eq!(trace, vec![(MASTER_COMMAND, EOI)]);
    }

    #[test]
    fn slave_vectors_acknowledge_both_controllers() {
        let ((), trace) = with_port_trace(|| end_of_interrupt(40));
        assert_eq!(trace, vec![(SLAVE_COMMAND, EOI), (MASTER_COMMAND, EOI)]);
    }
}
