//! PS/2 keyboard driver.
//!
//! Reads set-1 scancodes from the controller on IRQ 1, tracks the shift
//! state, and echoes translated characters to the console.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::x86::{
    idt::{self, RegisterFrame, IRQ1},
    port,
};

const DATA_PORT: u16 = 0x60;

const LEFT_SHIFT_DOWN: u8 = 0x2A;
const RIGHT_SHIFT_DOWN: u8 = 0x36;
/// Make codes with this bit set are key releases.
const RELEASE_BIT: u8 = 0x80;

static SHIFT_HELD: AtomicBool = AtomicBool::new(false);

/// US layout, unshifted, indexed by scancode.
const PLAIN_MAP: [u8; 58] = [
    0, 27, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0x08, b'\t',
    b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n', 0, b'a', b's',
    b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`', 0, b'\\', b'z', b'x', b'c', b'v',
    b'b', b'n', b'm', b',', b'.', b'/', 0, b'*', 0, b' ',
];

/// US layout with shift held.
const SHIFT_MAP: [u8; 58] = [
    0, 27, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 0x08, b'\t',
    b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n', 0, b'A', b'S',
    b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~', 0, b'|', b'Z', b'X', b'C', b'V',
    b'B', b'N', b'M', b'<', b'>', b'?', 0, b'*', 0, b' ',
];

/// Feeds one scancode through the shift-tracking state machine, yielding a
/// printable byte for make codes that have one.
pub fn translate(scancode: u8) -> Option<u8> {
    match scancode {
        LEFT_SHIFT_DOWN | RIGHT_SHIFT_DOWN => {
            SHIFT_HELD.store(true, Ordering::Relaxed);
            None
        }
        code if code == LEFT_SHIFT_DOWN | RELEASE_BIT || code == RIGHT_SHIFT_DOWN | RELEASE_BIT => {
            SHIFT_HELD.store(false, Ordering::Relaxed);
            None
        }
        code if code & RELEASE_BIT != 0 => None,
        code => {
            let map = if SHIFT_HELD.load(Ordering::Relaxed) {
                &SHIFT_MAP
            } else {
                &PLAIN_MAP
            };
            match map.get(code as usize) {
                Some(&byte) if byte != 0 => Some(byte),
                _ => None,
            }
        }
    }
}

fn keyboard_interrupt(_frame: &mut RegisterFrame) {
    let scancode = port::inb(DATA_PORT);
    if let Some(byte) = translate(scancode) {
        crate::drivers::console::console_put(byte);
    }
}

/// Hooks the driver onto IRQ 1.
pub fn init() {
    idt::register_interrupt_handler(IRQ1, keyboard_interrupt);
    log::info!(target: "keyboard", "PS/2 keyboard on IRQ 1");
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn letters_shift_and_release_round_trip() {
        assert_eq!(translate(0x1E), Some(b'a'));
        assert_eq!(translate(LEFT_SHIFT_DOWN), None);
        assert_eq!(translate(0x1E), Some(b'A'));
        assert_eq!(translate(0x02), Some(b'!'));
        assert_eq!(translate(LEFT_SHIFT_DOWN | RELEASE_BIT), None);
        assert_eq!(translate(0x1E), Some(b'a'));
        // key releases produce nothing
        assert_eq!(translate(0x1E | RELEASE_BIT), None);
    }
}
