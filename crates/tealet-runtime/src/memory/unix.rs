//! Unix stack mapping using mmap

use std::ptr::NonNull;

use tealet_core::error::{MemoryError, TealetResult};
use tealet_core::{kdebug, kwarn, StackMemory};

use super::{page_size, round_to_pages};

/// An mmap'd tealet stack
///
/// Layout, low to high: `guard` bytes of PROT_NONE, then `usable` bytes
/// of read/write stack. Overflowing the stack faults on the guard.
#[derive(Debug)]
pub struct Stack {
    base: NonNull<u8>,
    guard: usize,
    usable: usize,
}

// Safety: the mapping is plain memory owned by this value
unsafe impl Send for Stack {}

pub(super) fn query_page_size() -> Option<usize> {
    let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(n).ok().filter(|n| n.is_power_of_two())
}

impl Stack {
    /// Guard region size in bytes
    #[inline]
    pub fn guard_size(&self) -> usize {
        self.guard
    }

    fn mapping_len(&self) -> usize {
        self.guard + self.usable
    }
}

impl StackMemory for Stack {
    fn allocate(usable: usize, guard_pages: usize) -> TealetResult<Self> {
        if usable == 0 {
            return Err(MemoryError::InvalidSize.into());
        }
        let usable = round_to_pages(usable).ok_or(MemoryError::InvalidSize)?;
        let guard = guard_pages
            .checked_mul(page_size())
            .ok_or(MemoryError::InvalidSize)?;
        let total = usable.checked_add(guard).ok_or(MemoryError::InvalidSize)?;

        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                total,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            kwarn!("stack mmap of {} bytes failed", total);
            return Err(MemoryError::AllocationFailed.into());
        }
        let Some(base) = NonNull::new(base as *mut u8) else {
            return Err(MemoryError::AllocationFailed.into());
        };
        let stack = Stack {
            base,
            guard,
            usable,
        };

        if guard > 0 {
            let ret = unsafe {
                libc::mprotect(base.as_ptr() as *mut libc::c_void, guard, libc::PROT_NONE)
            };
            if ret != 0 {
                // stack drops here and unmaps
                return Err(MemoryError::ProtectionFailed.into());
            }
        }

        kdebug!(
            "mapped stack {:p} usable={} guard={}",
            stack.base.as_ptr(),
            usable,
            guard
        );
        Ok(stack)
    }

    #[inline]
    fn top(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.mapping_len()) }
    }

    #[inline]
    fn bottom(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.guard) }
    }

    #[inline]
    fn usable_size(&self) -> usize {
        self.usable
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        let ret = unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.mapping_len())
        };
        if ret != 0 {
            kwarn!("munmap of stack {:p} failed", self.base.as_ptr());
        }
    }
}
