//! Global Descriptor Table.
//!
//! Five fixed segments: null, kernel code, kernel data, user code, user
//! data. The flat 4 GiB model does all the real work; the table exists so
//! the CPU has well-formed selectors to run with.

use core::mem::size_of;

/// One packed 8-byte segment descriptor.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_middle: u8,
    access: u8,
    granularity: u8,
    base_high: u8,
}

const _: () = assert!(size_of::<GdtEntry>() == 8);

impl GdtEntry {
    pub const NULL: Self = Self::new(0, 0, 0, 0);

    pub const fn new(base: u32, limit: u32, access: u8, granularity: u8) -> Self {
        Self {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_middle: ((base >> 16) & 0xFF) as u8,
            access,
            granularity: (((limit >> 16) & 0x0F) as u8) | (granularity & 0xF0),
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }

    pub fn access(&self) -> u8 {
        self.access
    }

    pub fn granularity(&self) -> u8 {
        self.granularity
    }

    pub fn base(&self) -> u32 {
        self.base_low as u32 | (self.base_middle as u32) << 16 | (self.base_high as u32) << 24
    }

    pub fn limit_low(&self) -> u16 {
        self.limit_low
    }
}

/// Pointer operand for `lgdt`/`lidt`.
#[repr(C, packed)]
pub struct DescriptorTablePointer {
    pub limit: u16,
    pub base: u32,
}

const _: () = assert!(size_of::<DescriptorTablePointer>() == 6);

pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;

/// Layout:
/// - 0x00: null descriptor
/// - 0x08: kernel code (ring 0)
/// - 0x10: kernel data (ring 0)
/// - 0x18: user code (ring 3)
/// - 0x20: user data (ring 3)
static GDT: [GdtEntry; 5] = [
    GdtEntry::NULL,
    GdtEntry::new(0, 0xFFFFF, 0x9A, 0xCF),
    GdtEntry::new(0, 0xFFFFF, 0x92, 0xCF),
    GdtEntry::new(0, 0xFFFF_FFFF, 0xFA, 0xCF),
    GdtEntry::new(0, 0xFFFF_FFFF, 0xF2, 0xCF),
];

/// The descriptor table, for inspection.
pub fn entries() -> &'static [GdtEntry; 5] {
    &GDT
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
core::arch::global_asm!(
    r#"
.global gdt_flush
gdt_flush:
    movl 4(%esp), %eax
    lgdt (%eax)
    movw $0x10, %ax
    movw %ax, %ds
    movw %ax, %es
    movw %ax, %fs
    movw %ax, %gs
    movw %ax, %ss
    ljmp $0x08, $.Lgdt_reload_cs
.Lgdt_reload_cs:
    ret
"#,
    options(att_syntax)
);

#[cfg(all(target_arch = "x86", target_os = "none"))]
extern "C" {
    fn gdt_flush(pointer: *const DescriptorTablePointer);
}

/// Loads the table and reloads every segment register from it.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn init() {
    let pointer = DescriptorTablePointer {
        limit: (size_of::<[GdtEntry; 5]>() - 1) as u16,
        base: GDT.as_ptr() as u32,
    };
    // SAFETY: the table is static and the flush routine reloads CS via a
    // far jump and the data selectors with 0x10, all of which reference
    // valid descriptors above.
    unsafe { gdt_flush(&pointer) };
}
