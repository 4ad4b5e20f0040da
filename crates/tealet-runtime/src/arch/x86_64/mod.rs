//! x86_64 stack switching (System V AMD64)
//!
//! Saves the callee-saved integer registers plus MXCSR and the x87 control
//! word. Everything else is caller-saved, so the compiler has already spilled
//! it around the call into `switch_context`.

use std::arch::naked_asm;

use tealet_core::constants::STACK_ALIGN;
use tealet_core::traits::EntryFn;

/// Default MXCSR: all exceptions masked, round to nearest
const MXCSR_DEFAULT: u32 = 0x1F80;
/// Default x87 control word: all exceptions masked, 64-bit precision
const FPUCW_DEFAULT: u16 = 0x037F;

/// Saved context, offsets are fixed by the asm below
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SavedRegs {
    pub rsp: u64, // 0x00
    pub rip: u64, // 0x08
    pub rbx: u64, // 0x10
    pub rbp: u64, // 0x18
    pub r12: u64, // 0x20
    pub r13: u64, // 0x28
    pub r14: u64, // 0x30
    pub r15: u64, // 0x38
    pub mxcsr: u32, // 0x40
    pub fpucw: u16, // 0x44
    _pad: u16,
}

/// Prepare a fresh context that runs `entry(arg)` on the given stack
///
/// The trampoline is entered by `jmp` with rsp 16-byte aligned; its `call`
/// then leaves rsp at 8 mod 16 on entry to `entry`, as the ABI expects.
pub fn init_context(regs: &mut SavedRegs, stack_top: *mut u8, entry: EntryFn, arg: usize) {
    let sp = stack_top as usize & !(STACK_ALIGN - 1);

    *regs = SavedRegs {
        rsp: sp as u64,
        rip: tealet_trampoline as usize as u64,
        r12: entry as usize as u64,
        r13: arg as u64,
        mxcsr: MXCSR_DEFAULT,
        fpucw: FPUCW_DEFAULT,
        ..SavedRegs::default()
    };
}

/// First code a fresh context executes
///
/// `entry` never returns; `ud2` traps if it somehow does.
#[unsafe(naked)]
unsafe extern "C" fn tealet_trampoline() {
    naked_asm!(
        "xor ebp, ebp",
        "mov rdi, r13",
        "call r12",
        "ud2",
    );
}

/// Save the running context into `old` (rdi) and resume `new` (rsi)
///
/// # Safety
///
/// See [`tealet_core::StackSwitch::switch`].
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(_old: *mut SavedRegs, _new: *const SavedRegs) {
    naked_asm!(
        // save
        "mov [rdi + 0x00], rsp",
        "lea rax, [rip + 1f]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        "stmxcsr dword ptr [rdi + 0x40]",
        "fnstcw word ptr [rdi + 0x44]",
        // load
        "mov rsp, [rsi + 0x00]",
        "mov rax, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov rbp, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov r13, [rsi + 0x28]",
        "mov r14, [rsi + 0x30]",
        "mov r15, [rsi + 0x38]",
        "ldmxcsr dword ptr [rsi + 0x40]",
        "fldcw word ptr [rsi + 0x44]",
        "jmp rax",
        // resumed contexts land here and return into their own switch caller
        "1:",
        "ret",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn never(_: usize) -> ! {
        std::process::abort()
    }

    #[test]
    fn test_layout_matches_asm_offsets() {
        assert_eq!(std::mem::offset_of!(SavedRegs, rsp), 0x00);
        assert_eq!(std::mem::offset_of!(SavedRegs, r15), 0x38);
        assert_eq!(std::mem::offset_of!(SavedRegs, mxcsr), 0x40);
        assert_eq!(std::mem::offset_of!(SavedRegs, fpucw), 0x44);
    }

    #[test]
    fn test_init_aligns_stack() {
        let mut regs = SavedRegs::default();
        let top = 0x7000_0000_1237usize as *mut u8;
        init_context(&mut regs, top, never, 99);

        assert_eq!(regs.rsp % 16, 0);
        assert!(regs.rsp as usize <= top as usize);
        assert_eq!(regs.r13, 99);
        assert_eq!(regs.r12, never as usize as u64);
        assert_eq!(regs.mxcsr, MXCSR_DEFAULT);
    }
}
