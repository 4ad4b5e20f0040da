//! Architecture and platform traits
//!
//! These traits define the interface between the platform-agnostic engine
//! and the per-architecture/per-OS pieces in `tealet-runtime`. The engine
//! only ever talks to the stack-switch primitive through `StackSwitch`.

use crate::error::TealetResult;

/// Entry point a fresh context starts executing
///
/// Receives the argument given to [`StackSwitch::init`]. Must never return:
/// the trampoline has no frame to return into.
pub type EntryFn = extern "C" fn(usize) -> !;

/// Architecture-specific stack switching
///
/// The primitive is a black box: save the callee-saved registers of the
/// running context into `old`, load `new`, and resume there. A context
/// resumed later returns from its own `switch` call as if nothing happened.
pub trait StackSwitch {
    /// Saved register area for one context
    type Regs: Default;

    /// Prepare `regs` so that switching to it runs `entry(arg)` on the stack
    /// whose highest address is `stack_top`
    fn init(regs: &mut Self::Regs, stack_top: *mut u8, entry: EntryFn, arg: usize);

    /// Save the running context into `old` and resume `new`
    ///
    /// # Safety
    ///
    /// `new` must hold a context produced by `init` or by a previous
    /// `switch`, whose stack is still mapped. `old` must stay valid until
    /// something switches back to it.
    unsafe fn switch(old: *mut Self::Regs, new: *const Self::Regs);
}

/// Platform-specific stack memory
///
/// One value owns one mapping: a guard region at the low end followed by
/// the usable stack. Dropping the value releases the mapping.
pub trait StackMemory: Sized {
    /// Map a stack with at least `usable` writable bytes and
    /// `guard_pages` inaccessible pages below it
    fn allocate(usable: usize, guard_pages: usize) -> TealetResult<Self>;

    /// Highest address of the usable region (stacks grow down)
    fn top(&self) -> *mut u8;

    /// Lowest usable address
    fn bottom(&self) -> *mut u8;

    /// Number of usable bytes
    fn usable_size(&self) -> usize;

    /// Check if `addr` falls inside the usable region
    #[inline]
    fn contains(&self, addr: usize) -> bool {
        addr >= self.bottom() as usize && addr <= self.top() as usize
    }
}
