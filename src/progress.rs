//! Progress/log side channel and cooperative cancellation (§5, §9).
//!
//! The reference repo threads `addLog`/`setProgress` closures through every
//! stage. Per the redesign flag this collapses to a single observer passed
//! by reference; the orchestrator is the only caller, strategies never
//! reach for a global.

use std::sync::atomic::{AtomicBool, Ordering};

/// Fire-and-forget side channel for progress and diagnostic messages.
/// Must never influence the pipeline's output.
pub trait Observer {
    /// Called with a monotonically non-decreasing fraction in `[0, 1]`.
    fn progress(&self, _fraction: f32) {}

    /// Called for per-frame exclusions and other diagnostics that do not
    /// rise to a fatal [`crate::error::StackError`].
    fn log(&self, _message: &str) {}
}

/// An [`Observer`] that discards everything; the default when the caller
/// has no UI or logging to drive.
pub struct NullObserver;

impl Observer for NullObserver {}

/// Observer that forwards log messages to the `log` crate facade at `info`
/// level and ignores progress. Useful for CLI/batch callers that already
/// have a logger configured but no progress UI.
pub struct LogObserver;

impl Observer for LogObserver {
    fn log(&self, message: &str) {
        log::info!("{message}");
    }
}

/// Cooperative cancellation flag, checked between frames and between
/// reducer bands. Cloning shares the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: std::sync::Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self { flag: std::sync::Arc::new(AtomicBool::new(false)) }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
