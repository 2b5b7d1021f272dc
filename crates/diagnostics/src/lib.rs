//! Lightweight logging for the scenesync crates.
//!
//! Controlled by the SCENESYNC_LOG environment variable:
//! off (default), error, warn, info, debug.

use std::sync::Once;

// Re-export emit so the macros can expand in downstream crates
pub use emit;

static INIT: Once = Once::new();

/// Initialize logging from SCENESYNC_LOG.
///
/// Safe to call more than once; only the first call takes effect.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let level = std::env::var("SCENESYNC_LOG").unwrap_or_else(|_| "off".to_string());

        let min_level = match level.as_str() {
            "off" => return,
            "debug" => emit::Level::Debug,
            "info" => emit::Level::Info,
            "warn" => emit::Level::Warn,
            "error" => emit::Level::Error,
            other => {
                eprintln!("Warning: unknown SCENESYNC_LOG value '{other}', using 'info'");
                emit::Level::Info
            }
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(min_level))
            .init();

        // The runtime must live for the duration of the process.
        std::mem::forget(rt);
    });
}

// Re-export emit's logging macros directly. A plain name alias adds no extra
// macro layer, so emit's template auto-capture of locals keeps working (a
// `macro_rules!` wrapper would break that via macro hygiene).
//
// - `info`  logs routine operations (cycle progress, transfers, registrations).
// - `debug` logs detailed diagnostics (payload sizes, state transitions, URLs).
// - `warn`  logs recoverable trouble (retries, size mismatches, skipped records).
// - `error` logs failures that end an operation (exhausted retries, fatal errors).
pub use emit::{debug, error, info, warn};

pub use init_diagnostics as init;
