//! Stack memory for tealets
//!
//! One mapping per tealet: guard pages at the low end, usable stack above.
//! Platform-specific implementations do the actual mapping.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    } else {
        compile_error!("Unsupported platform: tealet stacks need mmap");
    }
}

use std::sync::OnceLock;

use tealet_core::constants::FALLBACK_PAGE_SIZE;

/// OS page size, queried once
#[inline]
pub fn page_size() -> usize {
    static PAGE: OnceLock<usize> = OnceLock::new();
    *PAGE.get_or_init(|| query_page_size().unwrap_or(FALLBACK_PAGE_SIZE))
}

/// Round `n` up to a whole number of pages
#[inline]
pub fn round_to_pages(n: usize) -> Option<usize> {
    let page = page_size();
    n.checked_add(page - 1).map(|v| v & !(page - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tealet_core::StackMemory;

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(page_size().is_power_of_two());
        assert!(page_size() >= 4096);
    }

    #[test]
    fn test_round_to_pages() {
        let page = page_size();
        assert_eq!(round_to_pages(0), Some(0));
        assert_eq!(round_to_pages(1), Some(page));
        assert_eq!(round_to_pages(page), Some(page));
        assert_eq!(round_to_pages(page + 1), Some(2 * page));
        assert_eq!(round_to_pages(usize::MAX), None);
    }

    #[test]
    fn test_stack_geometry() {
        let stack = Stack::allocate(20_000, 1).unwrap();
        let page = page_size();

        assert!(stack.usable_size() >= 20_000);
        assert_eq!(stack.usable_size() % page, 0);
        assert_eq!(stack.top() as usize - stack.bottom() as usize, stack.usable_size());
        assert_eq!(stack.guard_size(), page);
        assert!(stack.contains(stack.top() as usize - 8));
        assert!(!stack.contains(stack.bottom() as usize - 1));
    }

    #[test]
    fn test_stack_is_writable() {
        let stack = Stack::allocate(16 * 1024, 1).unwrap();
        unsafe {
            let top = stack.top().sub(8) as *mut u64;
            top.write(0xdead_beef);
            assert_eq!(top.read(), 0xdead_beef);
            let bottom = stack.bottom() as *mut u64;
            bottom.write(1);
            assert_eq!(bottom.read(), 1);
        }
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(Stack::allocate(0, 1).is_err());
    }
}
