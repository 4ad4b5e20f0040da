//! aarch64 stack switching (AAPCS64)
//!
//! Callee-saved: x19-x28, fp (x29), lr (x30), sp and the low halves of
//! v8-v15. FPCR is carried along so rounding mode follows the context.

use std::arch::naked_asm;

use tealet_core::constants::STACK_ALIGN;
use tealet_core::traits::EntryFn;

/// Saved context, offsets are fixed by the asm below
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SavedRegs {
    pub sp: u64,        // 0x00
    pub lr: u64,        // 0x08
    pub x19_x28: [u64; 10], // 0x10..0x60
    pub fp: u64,        // 0x60
    pub d8_d15: [u64; 8], // 0x68..0xa8
    pub fpcr: u64,      // 0xa8
}

/// Prepare a fresh context that runs `entry(arg)` on the given stack
pub fn init_context(regs: &mut SavedRegs, stack_top: *mut u8, entry: EntryFn, arg: usize) {
    let sp = stack_top as usize & !(STACK_ALIGN - 1);

    let mut callee = [0u64; 10];
    callee[0] = entry as usize as u64; // x19
    callee[1] = arg as u64; // x20

    *regs = SavedRegs {
        sp: sp as u64,
        lr: tealet_trampoline as usize as u64,
        x19_x28: callee,
        ..SavedRegs::default()
    };
}

/// First code a fresh context executes
#[unsafe(naked)]
unsafe extern "C" fn tealet_trampoline() {
    naked_asm!(
        "mov x29, xzr",
        "mov x0, x20",
        "blr x19",
        "brk #0",
    );
}

/// Save the running context into `old` (x0) and resume `new` (x1)
///
/// # Safety
///
/// See [`tealet_core::StackSwitch::switch`].
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(_old: *mut SavedRegs, _new: *const SavedRegs) {
    naked_asm!(
        // save
        "mov x9, sp",
        "str x9, [x0, #0x00]",
        "str x30, [x0, #0x08]",
        "stp x19, x20, [x0, #0x10]",
        "stp x21, x22, [x0, #0x20]",
        "stp x23, x24, [x0, #0x30]",
        "stp x25, x26, [x0, #0x40]",
        "stp x27, x28, [x0, #0x50]",
        "str x29, [x0, #0x60]",
        "stp d8, d9, [x0, #0x68]",
        "stp d10, d11, [x0, #0x78]",
        "stp d12, d13, [x0, #0x88]",
        "stp d14, d15, [x0, #0x98]",
        "mrs x10, fpcr",
        "str x10, [x0, #0xa8]",
        // load
        "ldr x9, [x1, #0x00]",
        "mov sp, x9",
        "ldr x30, [x1, #0x08]",
        "ldp x19, x20, [x1, #0x10]",
        "ldp x21, x22, [x1, #0x20]",
        "ldp x23, x24, [x1, #0x30]",
        "ldp x25, x26, [x1, #0x40]",
        "ldp x27, x28, [x1, #0x50]",
        "ldr x29, [x1, #0x60]",
        "ldp d8, d9, [x1, #0x68]",
        "ldp d10, d11, [x1, #0x78]",
        "ldp d12, d13, [x1, #0x88]",
        "ldp d14, d15, [x1, #0x98]",
        "ldr x10, [x1, #0xa8]",
        "msr fpcr, x10",
        "ret",
    );
}
