//! Process-wide logging setup shared by the server and the batch binaries.

/// Initialize tracing with JSON output, filtered by `RUST_LOG` (default [`DEFAULT_DIRECTIVES`]).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    tracing::init(DEFAULT_DIRECTIVES);
}

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_DIRECTIVES: &str = "info,sqlx=warn";

pub mod tracing;
