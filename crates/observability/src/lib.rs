//! Process-wide logging setup shared by every binary in the workspace.

pub mod tracing;

pub use crate::tracing::{LogFormat, LogSettings};

/// Initialize structured logging from the environment (`RUST_LOG`, `LOG_FORMAT`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(LogSettings::from_env());
}
