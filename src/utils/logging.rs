//! Conditional logging macros gated on a module-level `ENABLE_LOGS` flag.
//!
//! Each module that uses them declares its own switch:
//! ```text
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_info, log_warn, log_error};
//! ```
//! so chatty modules can be silenced without touching call sites.

/// Initialize the process-wide logger. Intended for the embedding shell
/// (and tests); safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .try_init();
}

/// Info-level logging, active only when the calling module sets
/// `ENABLE_LOGS: bool = true`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Warn-level counterpart of [`log_info!`].
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Error-level counterpart of [`log_info!`].
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
