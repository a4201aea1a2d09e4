//! Small set of tunable knobs shared across the parser and debugger.
//!
//! There is no persisted configuration file for this crate (see spec §6,
//! "Persistent state: None") — this is just the handful of constants that
//! would otherwise be magic numbers scattered across modules.

use std::time::Duration;

/// Files at or above this size are memory-mapped rather than fully buffered.
pub const MMAP_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

/// Default timeout for [`crate::debugger::DebugSession::wait_for_stop`] when
/// the caller doesn't supply one.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// The `BRK #0` instruction encoding used as the software breakpoint trap.
pub const BREAKPOINT_TRAP_ENCODING: u32 = 0xd420_0000;

/// Runtime-overridable variant of the above, for callers that want different
/// thresholds (e.g. tests that want to force the mmap path on small files).
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub mmap_threshold_bytes: u64,
    pub default_wait_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mmap_threshold_bytes: MMAP_THRESHOLD_BYTES,
            default_wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}
