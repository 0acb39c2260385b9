//! Kernel logging facade.
//!
//! [`kprint!`] / [`kprintln!`] write raw text to the registered print sink.
//! [`klog!`] and its leveled wrappers (`kfatal!` .. `ktrace!`) go through a
//! runtime level filter and then to the registered log sink. Until a sink
//! is registered, output is silently discarded, so the trap path can log
//! from the very first trap without caring whether a console exists yet.

use core::fmt;
use core::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

// ---------------------------------------------------------------------------
// Levels
// ---------------------------------------------------------------------------

/// Kernel log severity level. Lower is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// The system cannot continue.
    Fatal = 0,
    /// Something failed but the system may continue.
    Error = 1,
    /// Unexpected condition, not necessarily an error.
    Warn = 2,
    /// High-level progress messages.
    Info = 3,
    /// Detailed diagnostics.
    Debug = 4,
    /// Per-trap tracing.
    Trace = 5,
}

impl LogLevel {
    /// Returns the fixed-width level name used as a line prefix.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN ",
            Self::Info => "INFO ",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    /// Converts a raw level, saturating unknown values to `Trace`.
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Fatal,
            1 => Self::Error,
            2 => Self::Warn,
            3 => Self::Info,
            4 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

/// Most verbose level that reaches the log sink.
static MAX_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Sets the most verbose level passed to the log sink.
pub fn set_max_level(level: LogLevel) {
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Returns the current maximum level.
pub fn max_level() -> LogLevel {
    LogLevel::from_u8(MAX_LEVEL.load(Ordering::Relaxed))
}

/// Returns `true` if a message at `level` would reach the sink.
#[inline]
pub fn enabled(level: LogLevel) -> bool {
    level as u8 <= MAX_LEVEL.load(Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Raw print sink.
pub type PrintFn = fn(fmt::Arguments<'_>);

/// Leveled log sink.
pub type LogFn = fn(LogLevel, fmt::Arguments<'_>);

fn discard_print(_args: fmt::Arguments<'_>) {}

fn discard_log(_level: LogLevel, _args: fmt::Arguments<'_>) {}

static PRINT_FN: AtomicPtr<()> = AtomicPtr::new(discard_print as *mut ());
static LOG_FN: AtomicPtr<()> = AtomicPtr::new(discard_log as *mut ());

/// Registers the raw print sink.
///
/// # Safety
///
/// `f` must be callable from any context, including with interrupts masked
/// on the trap path, and must not take the kernel critical section.
pub unsafe fn set_print_fn(f: PrintFn) {
    PRINT_FN.store(f as *mut (), Ordering::Release);
}

/// Registers the leveled log sink.
///
/// # Safety
///
/// Same requirements as [`set_print_fn`].
pub unsafe fn set_log_fn(f: LogFn) {
    LOG_FN.store(f as *mut (), Ordering::Release);
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments<'_>) {
    let ptr = PRINT_FN.load(Ordering::Acquire);
    // SAFETY: only `PrintFn` pointers are ever stored into PRINT_FN.
    let f: PrintFn = unsafe { core::mem::transmute::<*mut (), PrintFn>(ptr) };
    f(args);
}

#[doc(hidden)]
pub fn _log(level: LogLevel, args: fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    let ptr = LOG_FN.load(Ordering::Acquire);
    // SAFETY: only `LogFn` pointers are ever stored into LOG_FN.
    let f: LogFn = unsafe { core::mem::transmute::<*mut (), LogFn>(ptr) };
    f(level, args);
}

// ---------------------------------------------------------------------------
// Macros
// ---------------------------------------------------------------------------

/// Prints to the raw print sink.
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => { $crate::log::_print(format_args!($($arg)*)) };
}

/// Prints to the raw print sink with a trailing newline.
#[macro_export]
macro_rules! kprintln {
    () => { $crate::kprint!("\n") };
    ($($arg:tt)*) => { $crate::kprint!("{}\n", format_args!($($arg)*)) };
}

/// Logs a message at the given level.
#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {
        $crate::log::_log($level, format_args!($($arg)*))
    };
}

/// Logs at `Fatal`.
#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Fatal, $($arg)*) };
}

/// Logs at `Error`.
#[macro_export]
macro_rules! kerr {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Error, $($arg)*) };
}

/// Logs at `Warn`.
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Warn, $($arg)*) };
}

/// Logs at `Info`.
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Info, $($arg)*) };
}

/// Logs at `Debug`.
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Debug, $($arg)*) };
}

/// Logs at `Trace`.
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Trace, $($arg)*) };
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::sync::{Mutex, Once};

    /// Serializes tests that change the global level.
    static LEVEL_LOCK: Mutex<()> = Mutex::new(());

    thread_local! {
        static PRINTED: RefCell<String> = const { RefCell::new(String::new()) };
        static LOGGED: RefCell<Vec<(LogLevel, String)>> = const { RefCell::new(Vec::new()) };
    }

    fn capture_print(args: fmt::Arguments<'_>) {
        PRINTED.with(|p| p.borrow_mut().push_str(&args.to_string()));
    }

    fn capture_log(level: LogLevel, args: fmt::Arguments<'_>) {
        LOGGED.with(|l| l.borrow_mut().push((level, args.to_string())));
    }

    /// Runs `f` with capturing sinks and returns this thread's output.
    fn captured(f: impl FnOnce()) -> (String, Vec<(LogLevel, String)>) {
        static INSTALL: Once = Once::new();
        INSTALL.call_once(|| {
            // SAFETY: the capture sinks only touch thread-local buffers.
            unsafe {
                set_print_fn(capture_print);
                set_log_fn(capture_log);
            }
        });
        PRINTED.with(RefCell::take);
        LOGGED.with(RefCell::take);
        f();
        (PRINTED.with(RefCell::take), LOGGED.with(RefCell::take))
    }

    #[test]
    fn level_ordering() {
        assert!(LogLevel::Fatal < LogLevel::Error);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn from_u8_saturates() {
        assert_eq!(LogLevel::from_u8(0), LogLevel::Fatal);
        assert_eq!(LogLevel::from_u8(3), LogLevel::Info);
        assert_eq!(LogLevel::from_u8(200), LogLevel::Trace);
    }

    #[test]
    fn names_are_fixed_width() {
        for raw in 0..=5 {
            assert_eq!(LogLevel::from_u8(raw).name().len(), 5);
        }
    }

    #[test]
    fn print_reaches_sink_unfiltered() {
        let (printed, logged) = captured(|| {
            crate::kprint!("a{}", 1);
            crate::kprintln!(" b");
            crate::kprintln!();
        });
        assert_eq!(printed, "a1 b\n\n");
        assert!(logged.is_empty());
    }

    #[test]
    fn default_level_drops_debug_and_trace() {
        let _guard = LEVEL_LOCK.lock().unwrap();
        assert_eq!(max_level(), LogLevel::Info);

        let (_, logged) = captured(|| {
            crate::kfatal!("fatal {}", 1);
            crate::kwarn!("warn");
            crate::kinfo!("info");
            crate::kdebug!("debug");
            crate::ktrace!("trace");
        });
        assert_eq!(
            logged,
            [
                (LogLevel::Fatal, "fatal 1".to_string()),
                (LogLevel::Warn, "warn".to_string()),
                (LogLevel::Info, "info".to_string()),
            ]
        );
    }

    #[test]
    fn raising_the_level_passes_trace() {
        let _guard = LEVEL_LOCK.lock().unwrap();
        set_max_level(LogLevel::Trace);
        let (_, logged) = captured(|| crate::ktrace!("cpu {}", 2));
        set_max_level(LogLevel::Info);

        assert_eq!(logged, [(LogLevel::Trace, "cpu 2".to_string())]);
        assert!(!enabled(LogLevel::Trace));
    }

    #[test]
    fn lowering_the_level_drops_warn() {
        let _guard = LEVEL_LOCK.lock().unwrap();
        set_max_level(LogLevel::Error);
        assert!(!enabled(LogLevel::Warn));
        let (_, logged) = captured(|| {
            crate::kwarn!("dropped");
            crate::kerr!("kept");
        });
        set_max_level(LogLevel::Info);

        assert_eq!(logged, [(LogLevel::Error, "kept".to_string())]);
    }
}
