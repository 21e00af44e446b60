//! Kernel-style leveled print macros.
//!
//! Thread-safe, context-aware debug/diagnostic output in the style of
//! Linux's `printk`. Tags every line with the current worker id (when
//! set) so interleaved output from multiple worker threads stays
//! readable.
//!
//! # Environment Variables
//!
//! - `BACKEND_FLUSH_LOG=1` - flush stderr after every line
//! - `BACKEND_LOG_LEVEL=<level>` - off/error/warn/info/debug/trace/critical,
//!   or the matching numeric code
//! - `BACKEND_LOG_TIME=1` - include a nanosecond timestamp in output
//!
//! # Usage
//!
//! ```ignore
//! use backend_core::{kinfo, kwarn, kerror, kcritical};
//!
//! kinfo!("worker {} ready", idx);
//! kwarn!("send truncated for session {}", id);
//! kerror!("script handler panicked: {}", msg);
//! kcritical!("disk thread {} exiting, no replacement", idx);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;

use crate::env::env_get_bool;

/// Log levels. Ordered so `level as u8` is a strict severity threshold:
/// lower value is enabled by a looser filter.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Critical = 1,
    Error = 2,
    Warn = 3,
    Info = 4,
    Debug = 5,
    Trace = 6,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Critical,
            2 => LogLevel::Error,
            3 => LogLevel::Warn,
            4 => LogLevel::Info,
            5 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Parse a config/env string, case-insensitively. Unknown input
    /// falls back to the caller-supplied default rather than erroring,
    /// matching this crate's "bad config value -> documented default"
    /// convention.
    pub fn parse_or(s: &str, default: LogLevel) -> Self {
        match s.to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "critical" | "1" => LogLevel::Critical,
            "error" | "2" => LogLevel::Error,
            "warn" | "3" => LogLevel::Warn,
            "info" | "4" => LogLevel::Info,
            "debug" | "5" => LogLevel::Debug,
            "trace" | "6" => LogLevel::Trace,
            _ => default,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Critical => "[CRIT] ",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static TIME_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize logging from environment variables. Called lazily on
/// first use; may also be called explicitly for deterministic setup.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    START_TIME.get_or_init(Instant::now);
    FLUSH_ENABLED.store(env_get_bool("BACKEND_FLUSH_LOG", false), Ordering::Relaxed);
    TIME_ENABLED.store(env_get_bool("BACKEND_LOG_TIME", false), Ordering::Relaxed);
    if let Ok(val) = std::env::var("BACKEND_LOG_LEVEL") {
        let level = LogLevel::parse_or(&val, LogLevel::Info);
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

#[inline]
pub fn flush_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn time_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    TIME_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set the active log level programmatically (e.g. from the parsed
/// config's `log_level` key, overriding the environment default).
pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn set_flush_enabled(enabled: bool) {
    FLUSH_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn set_time_enabled(enabled: bool) {
    TIME_ENABLED.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level as u8 <= log_level() as u8
}

#[inline]
pub fn elapsed_ns() -> u64 {
    let start = START_TIME.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64
}

thread_local! {
    static WORKER_ID: std::cell::Cell<Option<u32>> = const { std::cell::Cell::new(None) };
}

/// Tag the current OS thread with a worker index (called once at
/// thread start by the runtime).
pub fn set_worker_id(id: u32) {
    WORKER_ID.with(|w| w.set(Some(id)));
}

pub fn clear_worker_id() {
    WORKER_ID.with(|w| w.set(None));
}

pub fn get_worker_id() -> Option<u32> {
    WORKER_ID.with(|w| w.get())
}

fn format_context() -> String {
    match get_worker_id() {
        Some(id) => format!("[w{id}]"),
        None => "[w--]".to_string(),
    }
}

#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = write!(handle, "{} ", level.prefix());
    if time_enabled() {
        let _ = write!(handle, "[{}] ", elapsed_ns());
    }
    let _ = write!(handle, "{} ", format_context());
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

/// Critical level log with context.
#[macro_export]
macro_rules! kcritical {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Critical,
            format_args!($($arg)*)
        );
    }};
}

/// Error level log with context.
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Error,
            format_args!($($arg)*)
        );
    }};
}

/// Warning level log with context.
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Warn,
            format_args!($($arg)*)
        );
    }};
}

/// Info level log with context.
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Info,
            format_args!($($arg)*)
        );
    }};
}

/// Debug level log with context.
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Debug,
            format_args!($($arg)*)
        );
    }};
}

/// Trace level log with context.
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Trace,
            format_args!($($arg)*)
        );
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_order_by_severity() {
        assert!(LogLevel::Critical < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn parse_or_falls_back_on_garbage() {
        assert_eq!(LogLevel::parse_or("garbage", LogLevel::Warn), LogLevel::Warn);
        assert_eq!(LogLevel::parse_or("critical", LogLevel::Warn), LogLevel::Critical);
        assert_eq!(LogLevel::parse_or("TRACE", LogLevel::Warn), LogLevel::Trace);
    }

    #[test]
    fn worker_id_context() {
        assert_eq!(get_worker_id(), None);
        set_worker_id(3);
        assert_eq!(get_worker_id(), Some(3));
        clear_worker_id();
        assert_eq!(get_worker_id(), None);
    }

    #[test]
    fn macros_compile_and_respect_off() {
        set_log_level(LogLevel::Off);
        kcritical!("crit {}", 1);
        kerror!("err");
        kwarn!("warn");
        kinfo!("info");
        kdebug!("debug");
        ktrace!("trace");
    }
}
