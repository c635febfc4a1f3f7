//! Interrupt entry trampolines.
//!
//! Each vector pushes an error code (zero when the CPU supplied none) and
//! its vector number, then falls into a common stub that saves the full
//! register frame, switches to the kernel data selector and calls the
//! matching dispatcher with a pointer to the frame. On return the frame is
//! restored and `iret` resumes the interrupted code.
//!
//! Exception vectors 8, 10-14 arrive with a CPU-pushed error code; the
//! rest push a zero placeholder so the frame layout is uniform.

use core::arch::global_asm;

global_asm!(
    r#"
.macro ISR_NOERR num
.global isr\num
isr\num:
    pushl $0
    pushl $\num
    jmp isr_common
.endm

.macro ISR_ERR num
.global isr\num
isr\num:
    pushl $\num
    jmp isr_common
.endm

.macro IRQ_STUB num, vector
.global irq\num
irq\num:
    pushl $0
    pushl $\vector
    jmp irq_common
.endm

ISR_NOERR 0
ISR_NOERR 1
ISR_NOERR 2
ISR_NOERR 3
ISR_NOERR 4
ISR_NOERR 5
ISR_NOERR 6
ISR_NOERR 7
ISR_ERR   8
ISR_NOERR 9
ISR_ERR   10
ISR_ERR   11
ISR_ERR   12
ISR_ERR   13
ISR_ERR   14
ISR_NOERR 15
ISR_NOERR 16
ISR_NOERR 17
ISR_NOERR 18
ISR_NOERR 19
ISR_NOERR 20
ISR_NOERR 21
ISR_NOERR 22
ISR_NOERR 23
ISR_NOERR 24
ISR_NOERR 25
ISR_NOERR 26
ISR_NOERR 27
ISR_NOERR 28
ISR_NOERR 29
ISR_NOERR 30
ISR_NOERR 31

IRQ_STUB 0, 32
IRQ_STUB 1, 33
IRQ_STUB 2, 34
IRQ_STUB 3, 35
IRQ_STUB 4, 36
IRQ_STUB 5, 37
IRQ_STUB 6, 38
IRQ_STUB 7, 39
IRQ_STUB 8, 40
IRQ_STUB 9, 41
IRQ_STUB 10, 42
IRQ_STUB 11, 43
IRQ_STUB 12, 44
IRQ_STUB 13, 45
IRQ_STUB 14, 46
IRQ_STUB 15, 47

isr_common:
    pusha
    movw %ds, %ax
    pushl %eax
    movw $0x10, %ax
    movw %ax, %ds
    movw %ax, %es
    movw %ax, %fs
    movw %ax, %gs
    pushl %esp
    call isr_dispatch
    addl $4, %esp
    popl %eax
    movw %ax, %ds
    movw %ax, %es
    movw %ax, %fs
    movw %ax, %gs
    popa
    addl $8, %esp
    iret

irq_common:
    pusha
    movw %ds, %ax
    pushl %eax
    movw $0x10, %ax
    movw %ax, %ds
    movw %ax, %es
    movw %ax, %fs
    movw %ax, %gs
    pushl %esp
    call irq_dispatch
    addl $4, %esp
    popl %eax
    movw %ax, %ds
    movw %ax, %es
    movw %ax, %fs
    movw %ax, %gs
    popa
    addl $8, %esp
    iret
"#,
    options(att_syntax)
);

extern "C" {
    fn isr0();
    fn isr1();
    fn isr2();
    fn isr3();
    fn isr4();
    fn isr5();
    fn isr6();
    fn isr7();
    fn isr8();
    fn isr9();
    fn isr10();
    fn isr11();
    fn isr12();
    fn isr13();
    fn isr14();
    fn isr15();
    fn isr16();
    fn isr17();
    fn isr18();
    fn isr19();
    fn isr20();
    fn isr21();
    fn isr22();
    fn isr23();
    fn isr24();
    fn isr25();
    fn isr26();
    fn isr27();
    fn isr28();
    fn isr29();
    fn isr30();
    fn isr31();
    fn irq0();
    fn irq1();
    fn irq2();
    fn irq3();
    fn irq4();
    fn irq5();
    fn irq6();
    fn irq7();
    fn irq8();
    fn irq9();
    fn irq10();
    fn irq11();
    fn irq12();
    fn irq13();
    fn irq14();
    fn irq15();
}

/// Entry addresses for the 32 CPU exception trampolines.
pub fn exception_stubs() -> [usize; 32] {
    [
        isr0 as usize,
        isr1 as usize,
        isr2 as usize,
        isr3 as usize,
        isr4 as usize,
        isr5 as usize,
        isr6 as usize,
        isr7 as usize,
        isr8 as usize,
        isr9 as usize,
        isr10 as usize,
        isr11 as usize,
        isr12 as usize,
        isr13 as usize,
        isr14 as usize,
        isr15 as usize,
        isr16 as usize,
        isr17 as usize,
        isr18 as usize,
        isr19 as usize,
        isr20 as usize,
        isr21 as usize,
        isr22 as usize,
        isr23 as usize,
        isr24 as usize,
        isr25 as usize,
        isr26 as usize,
        isr27 as usize,
        isr28 as usize,
        isr29 as usize,
        isr30 as usize,
        isr31 as usize,
    ]
}

/// Entry addresses for the 16 hardware interrupt trampolines.
pub fn irq_stubs() -> [usize; 16] {
    [
        irq0 as usize,
        irq1 as usize,
        irq2 as usize,
        irq3 as usize,
        irq4 as usize,
        irq5 as usize,
        irq6 as usize,
        irq7 as usize,
        irq8 as usize,
        irq9 as usize,
        irq10 as usize,
        irq11 as usize,
        irq12 as usize,
        irq13 as usize,
        irq14 as usize,
        irq15 as usize,
    ]
}
