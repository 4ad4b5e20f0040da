//! Architecture-specific stack switching
//!
//! Each backend provides `SavedRegs`, `init_context` and a naked
//! `switch_context`. [`Native`] wraps the backend for the build target
//! behind [`tealet_core::StackSwitch`].

use tealet_core::traits::{EntryFn, StackSwitch};

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub mod x86_64;
        use self::x86_64 as current;
    } else if #[cfg(target_arch = "aarch64")] {
        pub mod aarch64;
        use self::aarch64 as current;
    } else {
        compile_error!("Unsupported architecture: tealets need x86_64 or aarch64");
    }
}

pub use current::SavedRegs;

/// Stack switch for the build target
#[derive(Debug, Clone, Copy, Default)]
pub struct Native;

impl StackSwitch for Native {
    type Regs = SavedRegs;

    #[inline]
    fn init(regs: &mut SavedRegs, stack_top: *mut u8, entry: EntryFn, arg: usize) {
        current::init_context(regs, stack_top, entry, arg);
    }

    #[inline]
    unsafe fn switch(old: *mut SavedRegs, new: *const SavedRegs) {
        current::switch_context(old, new);
    }
}
