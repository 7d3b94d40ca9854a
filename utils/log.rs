//! Logging backend for khyp
//!
//! Hooks the `log` facade up to a console sink supplied by the platform.
//! Until a sink is registered, records are dropped.

use core::fmt::{self, Write};

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::core::sync::SpinLock;

/// Console the logger writes formatted records to
pub type ConsoleSink = &'static mut (dyn Write + Send);

/// `log::Log` implementation writing `[LEVEL] target: message` lines
pub struct HypLogger {
    sink: SpinLock<Option<ConsoleSink>>,
}

static LOGGER: HypLogger = HypLogger::new();

impl HypLogger {
    const fn new() -> Self {
        Self {
            sink: SpinLock::new(None),
        }
    }

    /// Write one error line without waiting for the console
    ///
    /// Returns `false` when the sink is busy or missing. Used where the
    /// lock holder may never run again, such as the panic path.
    fn try_write(&self, args: fmt::Arguments<'_>) -> bool {
        let Some(mut sink) = self.sink.try_lock() else {
            return false;
        };
        match sink.as_mut() {
            Some(console) => writeln!(console, "[{:5}] {}", Level::Error.as_str(), args).is_ok(),
            None => false,
        }
    }
}

impl Log for HypLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut sink = self.sink.lock();
        if let Some(console) = sink.as_mut() {
            // A failing console has nowhere to report to.
            let _ = write_record(&mut **console, record);
        }
    }

    fn flush(&self) {}
}

fn write_record(out: &mut dyn Write, record: &Record<'_>) -> fmt::Result {
    writeln!(
        out,
        "[{:5}] {}: {}",
        record.level().as_str(),
        record.target(),
        record.args()
    )
}

/// Compile-time log level, selected by the `debug` and `verbose` features
pub fn level() -> Level {
    if cfg!(feature = "verbose") {
        Level::Trace
    } else if cfg!(feature = "debug") {
        Level::Debug
    } else {
        Level::Info
    }
}

/// Install the logger and route its output to `console`
///
/// Replaces the sink if the logger is already installed.
pub fn init(console: ConsoleSink) {
    *LOGGER.sink.lock() = Some(console);

    // Fails only when installed before, which leaves our logger in place.
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level_filter());
    }
}

/// Report a fatal condition on the console if it is free
///
/// Never spins: a panic raised while the console lock is held drops the
/// message instead of deadlocking.
pub fn panic_write(args: fmt::Arguments<'_>) -> bool {
    LOGGER.try_write(args)
}

fn level_filter() -> LevelFilter {
    level().to_level_filter()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Capture(heapless::String<256>);

    impl Write for Capture {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            self.0.push_str(s).map_err(|_| fmt::Error)
        }
    }

    #[test]
    fn test_record_format() {
        let mut out = Capture(heapless::String::new());
        write_record(
            &mut out,
            &Record::builder()
                .level(Level::Warn)
                .target("khyp::sched")
                .args(format_args!("guest {} held", 2))
                .build(),
        )
        .unwrap();
        assert_eq!(out.0.as_str(), "[WARN ] khyp::sched: guest 2 held\n");
    }

    #[test]
    fn test_busy_console_is_skipped() {
        static mut OUT: Capture = Capture(heapless::String::new());
        let logger = HypLogger::new();
        // SAFETY: only this test touches OUT.
        let console: ConsoleSink = unsafe { &mut *::core::ptr::addr_of_mut!(OUT) };
        *logger.sink.lock() = Some(console);

        let held = logger.sink.lock();
        assert!(!logger.try_write(format_args!("nested panic")));
        drop(held);

        assert!(logger.try_write(format_args!("panic at {}", 3)));
        // SAFETY: the logger no longer writes.
        let out = unsafe { &*::core::ptr::addr_of!(OUT) };
        assert_eq!(out.0.as_str(), "[ERROR] panic at 3\n");
    }

    #[test]
    fn test_missing_console_is_skipped() {
        let logger = HypLogger::new();
        assert!(!logger.try_write(format_args!("lost")));
    }

    #[test]
    fn test_default_level() {
        assert!(level() >= Level::Info);
    }
}
