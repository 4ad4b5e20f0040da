//! Environment variable utilities
//!
//! Typed lookups with defaults, used for the `TEALET_*` runtime knobs.
//!
//! ```ignore
//! use tealet_core::env::{env_get, env_get_size};
//!
//! let guards: usize = env_get("TEALET_GUARD_PAGES", 1);
//! let stack = env_get_size("TEALET_STACK_SIZE", 256 * 1024); // accepts "512k", "2m"
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean
///
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Any other value is false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(
            val.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

/// Get environment variable as optional value
///
/// `None` when unset or when the value does not parse.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get a byte size, accepting an optional k/m/g suffix (powers of 1024)
pub fn env_get_size(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_size(&v))
        .unwrap_or(default)
}

/// Parse "4096", "64k", "2M", "1g"
pub fn parse_size(s: &str) -> Option<usize> {
    let s = s.trim();
    let (digits, shift) = match s.char_indices().last()? {
        (i, 'k' | 'K') => (&s[..i], 10),
        (i, 'm' | 'M') => (&s[..i], 20),
        (i, 'g' | 'G') => (&s[..i], 30),
        _ => (s, 0),
    };
    let n: usize = digits.trim().parse().ok()?;
    n.checked_mul(1usize << shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__TEALET_TEST_UNSET_12345__", 42);
        assert_eq!(val, 42);
        assert!(env_get_bool("__TEALET_TEST_UNSET_12345__", true));
        assert!(env_get_opt::<usize>("__TEALET_TEST_UNSET_12345__").is_none());
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__TEALET_TEST_NUM__", " 123 ");
        let val: usize = env_get("__TEALET_TEST_NUM__", 0);
        assert_eq!(val, 123);

        std::env::set_var("__TEALET_TEST_NUM__", "not_a_number");
        let val: usize = env_get("__TEALET_TEST_NUM__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__TEALET_TEST_NUM__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        for v in ["1", "true", "TRUE", "yes", "on"] {
            std::env::set_var("__TEALET_TEST_BOOL__", v);
            assert!(env_get_bool("__TEALET_TEST_BOOL__", false), "{}", v);
        }
        for v in ["0", "false", "garbage"] {
            std::env::set_var("__TEALET_TEST_BOOL__", v);
            assert!(!env_get_bool("__TEALET_TEST_BOOL__", true), "{}", v);
        }
        std::env::remove_var("__TEALET_TEST_BOOL__");
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size("64k"), Some(64 * 1024));
        assert_eq!(parse_size("2M"), Some(2 * 1024 * 1024));
        assert_eq!(parse_size(" 1g "), Some(1 << 30));
        assert_eq!(parse_size("k"), None);
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("lots"), None);
    }

    #[test]
    fn test_env_get_size() {
        std::env::set_var("__TEALET_TEST_SIZE__", "128k");
        assert_eq!(env_get_size("__TEALET_TEST_SIZE__", 1), 128 * 1024);
        std::env::remove_var("__TEALET_TEST_SIZE__");
        assert_eq!(env_get_size("__TEALET_TEST_SIZE__", 7), 7);
    }
}
