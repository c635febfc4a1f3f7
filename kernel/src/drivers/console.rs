//! VGA text-mode console.
//!
//! An 80x25 character framebuffer at 0xB8000, light grey on black, with a
//! hardware cursor kept in sync through the VGA index registers. The
//! kernel core consumes only `console_put` and `console_clear`; the
//! `fmt::Write` implementation backs the print macros.

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod imp {
    use core::fmt;

    use lazy_static::lazy_static;

    use crate::{
        arch::x86::{interrupts, port},
        sync::SpinLock,
    };

    const BUFFER_WIDTH: usize = 80;
    const BUFFER_HEIGHT: usize = 25;
    const VGA_BUFFER: usize = 0xB8000;
    /// Light grey on black.
    const ATTRIBUTE: u8 = 0x07;

    const CURSOR_INDEX_PORT: u16 = 0x3D4;
    const CURSOR_DATA_PORT: u16 = 0x3D5;

    pub struct Writer {
        row: usize,
        column: usize,
    }

    impl Writer {
        const fn new() -> Self {
            Self { row: 0, column: 0 }
        }

        fn cell(row: usize, column: usize) -> *mut u16 {
            (VGA_BUFFER + (row * BUFFER_WIDTH + column) * 2) as *mut u16
        }

        fn store(row: usize, column: usize, byte: u8) {
            let value = ((ATTRIBUTE as u16) << 8) | byte as u16;
            // SAFETY: row and column are kept inside the 80x25 framebuffer,
            // which is identity-mapped MMIO.
            unsafe { Self::cell(row, column).write_volatile(value) };
        }

        fn load(row: usize, column: usize) -> u16 {
            // SAFETY: as in `store`.
            unsafe { Self::cell(row, column).read_volatile() }
        }

        pub fn put_byte(&mut self, byte: u8) {
            match byte {
                b'\n' => self.newline(),
                b'\r' => self.column = 0,
                0x08 => {
                    if self.column > 0 {
                        self.column -= 1;
                        Self::store(self.row, self.column, b' ');
                    }
                }
                b'\t' => {
                    self.column = (self.column + 8) & !7;
                    if self.column >= BUFFER_WIDTH {
                        self.newline();
                    }
                }
                byte => {
                    Self::store(self.row, self.column, byte);
                    self.column += 1;
                    if self.column >= BUFFER_WIDTH {
                        self.newline();
                    }
                }
            }
            self.update_cursor();
        }

        fn newline(&mut self) {
            self.column = 0;
            self.row += 1;
            if self.row >= BUFFER_HEIGHT {
                self.scroll();
                self.row = BUFFER_HEIGHT - 1;
            }
        }

        fn scroll(&mut self) {
            for row in 1..BUFFER_HEIGHT {
                for column in 0..BUFFER_WIDTH {
                    let value = Self::load(row, column);
                    // SAFETY: both cells are inside the framebuffer.
                    unsafe { Self::cell(row - 1, column).write_volatile(value) };
                }
            }
            for column in 0..BUFFER_WIDTH {
                Self::store(BUFFER_HEIGHT - 1, column, b' ');
            }
        }

        pub fn clear(&mut self) {
            for row in 0..BUFFER_HEIGHT {
                for column in 0..BUFFER_WIDTH {
                    Self::store(row, column, b' ');
                }
            }
            self.row = 0;
            self.column = 0;
            self.update_cursor();
        }

        fn update_cursor(&self) {
            let position = (self.row * BUFFER_WIDTH + self.column) as u16;
            port::outb(CURSOR_INDEX_PORT, 14);
            port::outb(CURSOR_DATA_PORT, (position >> 8) as u8);
            port::outb(CURSOR_INDEX_PORT, 15);
            port::outb(CURSOR_DATA_PORT, position as u8);
        }
    }

    impl fmt::Write for Writer {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for byte in s.bytes() {
                self.put_byte(byte);
            }
            Ok(())
        }
    }

    lazy_static! {
        static ref WRITER: SpinLock<Writer> = SpinLock::new(Writer::new());
    }

    /// Writes one character to the console.
    pub fn console_put(byte: u8) {
        interrupts::without(|| WRITER.lock().put_byte(byte));
    }

    /// Blanks the framebuffer and homes the cursor.
    pub fn console_clear() {
        interrupts::without(|| WRITER.lock().clear());
    }

    #[doc(hidden)]
    pub fn _print(args: fmt::Arguments) {
        use core::fmt::Write;
        // interrupts are masked so the timer cannot preempt a holder of
        // the writer lock and deadlock against it
        interrupts::without(|| {
            let _ = WRITER.lock().write_fmt(args);
        });
    }
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
mod imp {
    //! Host stub: console output goes nowhere.

    pub fn console_put(_byte: u8) {}

    pub fn console_clear() {}

    #[doc(hidden)]
    pub fn _print(_args: core::fmt::Arguments) {}
}

pub use imp::*;
