//! Leveled stderr logging for the tealet crates
//!
//! Each line is written under the stderr lock so lines from different
//! threads never interleave. Logging never creates or switches tealets,
//! which makes the macros usable from the entry trampoline and from
//! thread-local destructors.
//!
//! # Environment Variables
//!
//! - `TEALET_FLUSH_EPRINT=1` - Flush stderr after each line (useful when chasing crashes)
//! - `TEALET_LOG_LEVEL=<level>` - off|error|warn|info|debug|trace, or 0..5
//!
//! # Usage
//!
//! ```ignore
//! use tealet_core::{kdebug, kwarn};
//!
//! kdebug!("switch {} -> {}", from, to);
//! kwarn!("tealet {} dropped while suspended", id);
//! ```

use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

/// Log levels, most severe first
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Levels above `Trace` saturate
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.tag())
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return if n <= LogLevel::Trace as u8 { Ok(LogLevel::from_u8(n)) } else { Err(()) };
        }
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(()),
        }
    }
}

// Packed logging state: bits 0..3 level, bit 4 flush, bit 7 initialized.
const LEVEL_MASK: u8 = 0x0f;
const FLUSH_BIT: u8 = 0x10;
const INIT_BIT: u8 = 0x80;

static STATE: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

#[inline]
fn state() -> u8 {
    let s = STATE.load(Ordering::Relaxed);
    if s & INIT_BIT != 0 {
        s
    } else {
        init();
        STATE.load(Ordering::Relaxed)
    }
}

/// Read `TEALET_LOG_LEVEL` and `TEALET_FLUSH_EPRINT`
///
/// Runs on the first log line. A `set_*` call made earlier wins, since it
/// marks the state initialized.
pub fn init() {
    let mut s = LogLevel::Info as u8 | INIT_BIT;
    if let Some(level) = crate::env::env_get_opt::<LogLevel>("TEALET_LOG_LEVEL") {
        s = (s & !LEVEL_MASK) | level as u8;
    }
    if crate::env::env_get_bool("TEALET_FLUSH_EPRINT", false) {
        s |= FLUSH_BIT;
    }
    let _ = STATE.fetch_update(Ordering::SeqCst, Ordering::Relaxed, |old| {
        (old & INIT_BIT == 0).then_some(s)
    });
}

/// Current log level
#[inline]
pub fn log_level() -> LogLevel {
    LogLevel::from_u8(state() & LEVEL_MASK)
}

/// Whether every line is flushed
#[inline]
pub fn flush_enabled() -> bool {
    state() & FLUSH_BIT != 0
}

/// Set the log level, overriding the environment
pub fn set_log_level(level: LogLevel) {
    let _ = STATE.fetch_update(Ordering::SeqCst, Ordering::Relaxed, |old| {
        let old = if old & INIT_BIT == 0 { state_from_env() } else { old };
        Some((old & !LEVEL_MASK) | level as u8 | INIT_BIT)
    });
}

/// Turn per-line flushing on or off, overriding the environment
pub fn set_flush_enabled(enabled: bool) {
    let _ = STATE.fetch_update(Ordering::SeqCst, Ordering::Relaxed, |old| {
        let old = if old & INIT_BIT == 0 { state_from_env() } else { old };
        let flush = if enabled { old | FLUSH_BIT } else { old & !FLUSH_BIT };
        Some(flush | INIT_BIT)
    });
}

fn state_from_env() -> u8 {
    let level = crate::env::env_get_opt::<LogLevel>("TEALET_LOG_LEVEL").unwrap_or(LogLevel::Info);
    let flush = crate::env::env_get_bool("TEALET_FLUSH_EPRINT", false);
    let flush = if flush { FLUSH_BIT } else { 0 };
    level as u8 | flush | INIT_BIT
}

/// Whether lines at `level` are printed
#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level <= log_level()
}

#[doc(hidden)]
pub fn _emit(level: Option<LogLevel>, args: fmt::Arguments<'_>) {
    if let Some(level) = level {
        if !level_enabled(level) {
            return;
        }
    }
    let mut err = std::io::stderr().lock();
    let _ = match level {
        Some(level) => writeln!(err, "[tealet {:<5}] {}", level, args),
        None => writeln!(err, "{}", args),
    };
    if flush_enabled() {
        let _ = err.flush();
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __klog {
    ($level:ident, $($arg:tt)*) => {
        $crate::kprint::_emit(
            ::core::option::Option::Some($crate::kprint::LogLevel::$level),
            ::core::format_args!($($arg)*),
        )
    };
}

/// Print a line to stderr regardless of level
#[macro_export]
macro_rules! kprintln {
    () => { $crate::kprint::_emit(::core::option::Option::None, ::core::format_args!("")) };
    ($($arg:tt)*) => {
        $crate::kprint::_emit(::core::option::Option::None, ::core::format_args!($($arg)*))
    };
}

/// Something broke (a panic escaped a tealet, a context was resumed after exit)
#[macro_export]
macro_rules! kerror { ($($arg:tt)*) => { $crate::__klog!(Error, $($arg)*) }; }

/// Recoverable misuse (leaked frames, invalid exit target)
#[macro_export]
macro_rules! kwarn { ($($arg:tt)*) => { $crate::__klog!(Warn, $($arg)*) }; }

#[macro_export]
macro_rules! kinfo { ($($arg:tt)*) => { $crate::__klog!(Info, $($arg)*) }; }

/// Lifecycle events: create, anchor, exit, teardown
#[macro_export]
macro_rules! kdebug { ($($arg:tt)*) => { $crate::__klog!(Debug, $($arg)*) }; }

/// Every transfer
#[macro_export]
macro_rules! ktrace { ($($arg:tt)*) => { $crate::__klog!(Trace, $($arg)*) }; }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_order_and_display() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
        assert_eq!(LogLevel::from_u8(99), LogLevel::Trace);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("off".parse::<LogLevel>(), Ok(LogLevel::Off));
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!(" 4 ".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert!("9".parse::<LogLevel>().is_err());
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_setters_override() {
        set_log_level(LogLevel::Off);
        assert_eq!(log_level(), LogLevel::Off);
        assert!(!level_enabled(LogLevel::Error));

        kerror!("error {}", "msg");
        kwarn!("warn");
        kinfo!("info");
        kdebug!("debug");
        ktrace!("trace {}", 42);

        set_flush_enabled(true);
        assert!(flush_enabled());
        assert_eq!(log_level(), LogLevel::Off);
        set_flush_enabled(false);
        assert!(!flush_enabled());
    }
}
