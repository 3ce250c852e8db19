//! Cross-platform logging.
//!
//! Web builds log through the browser console; native builds go through
//! `tracing`. The macros keep call sites identical on both targets.

#[cfg(target_arch = "wasm32")]
mod backend {
    pub fn info(msg: &str) {
        web_sys::console::log_1(&msg.into());
    }

    pub fn warn(msg: &str) {
        web_sys::console::warn_1(&msg.into());
    }

    pub fn error(msg: &str) {
        web_sys::console::error_1(&msg.into());
    }

    pub fn debug(msg: &str) {
        web_sys::console::debug_1(&msg.into());
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod backend {
    pub fn info(msg: &str) {
        tracing::info!("{}", msg);
    }

    pub fn warn(msg: &str) {
        tracing::warn!("{}", msg);
    }

    pub fn error(msg: &str) {
        tracing::error!("{}", msg);
    }

    pub fn debug(msg: &str) {
        tracing::debug!("{}", msg);
    }
}

pub use backend::{debug, error, info, warn};

/// Install a `tracing` subscriber honoring `RUST_LOG`. Safe to call more
/// than once; later calls are no-ops.
#[cfg(not(target_arch = "wasm32"))]
pub fn init() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::info(&format!($($arg)*))
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::warn(&format!($($arg)*))
    };
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::error(&format!($($arg)*))
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::debug(&format!($($arg)*))
    };
}
