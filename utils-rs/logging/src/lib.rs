//! Process-global structured logging facade built on top of `slog`.
//!
//! Application code never touches a `slog::Logger` directly: it imports
//! `ii_logging::macros::*` and calls `info!("...")`/`warn!("...")`/etc. the
//! same way it would call into the `log` crate. Under the hood every call
//! routes through a single lazily-installed, async-drained logger.

use lazy_static::lazy_static;
use slog::Drain;

use std::sync::RwLock;

pub use slog::Level;

lazy_static! {
    static ref LOGGER: RwLock<slog::Logger> =
        RwLock::new(slog::Logger::root(slog::Discard, slog::o!()));
}

/// Marker kept alive for the lifetime of `main` so the logger installed by
/// `setup_for_app()` is not torn down early; typically bound as
/// `let _log_guard = ii_logging::setup_for_app();`.
pub struct LogGuard {
    _private: (),
}

/// Installs the process-wide logger: term-formatted output, asynchronous so
/// logging never blocks the caller, filtered by `RUST_LOG` via `slog-envlogger`.
pub fn setup_for_app() -> LogGuard {
    let decorator = slog_term::TermDecorator::new().build();
    let term_drain = slog_term::FullFormat::new(decorator).build().fuse();
    let envlogger_drain = slog_envlogger::new(term_drain).fuse();
    let async_drain = slog_async::Async::new(envlogger_drain).build().fuse();

    let logger = slog::Logger::root(async_drain, slog::o!());
    *LOGGER.write().expect("logger lock poisoned") = logger;

    LogGuard { _private: () }
}

/// Installs a quiet, synchronous logger suitable for `#[test]` functions.
pub fn setup_for_tests() {
    let logger = slog::Logger::root(slog::Discard, slog::o!());
    *LOGGER.write().expect("logger lock poisoned") = logger;
}

#[doc(hidden)]
pub fn log_at(level: slog::Level, message: String) {
    let logger = LOGGER.read().expect("logger lock poisoned");
    match level {
        slog::Level::Critical => slog::crit!(logger, "{}", message),
        slog::Level::Error => slog::error!(logger, "{}", message),
        slog::Level::Warning => slog::warn!(logger, "{}", message),
        slog::Level::Info => slog::info!(logger, "{}", message),
        slog::Level::Debug => slog::debug!(logger, "{}", message),
        slog::Level::Trace => slog::trace!(logger, "{}", message),
    }
}

pub mod macros {
    #[macro_export]
    macro_rules! trace {
        ($($arg:tt)*) => {
            $crate::log_at($crate::Level::Trace, format!($($arg)*))
        };
    }

    #[macro_export]
    macro_rules! debug {
        ($($arg:tt)*) => {
            $crate::log_at($crate::Level::Debug, format!($($arg)*))
        };
    }

    #[macro_export]
    macro_rules! info {
        ($($arg:tt)*) => {
            $crate::log_at($crate::Level::Info, format!($($arg)*))
        };
    }

    #[macro_export]
    macro_rules! warn {
        ($($arg:tt)*) => {
            $crate::log_at($crate::Level::Warning, format!($($arg)*))
        };
    }

    #[macro_export]
    macro_rules! error {
        ($($arg:tt)*) => {
            $crate::log_at($crate::Level::Error, format!($($arg)*))
        };
    }

    pub use crate::debug;
    pub use crate::error;
    pub use crate::info;
    pub use crate::trace;
    pub use crate::warn;
}
