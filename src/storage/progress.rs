use std::sync::atomic::{AtomicU64, Ordering};

/// Liveness sink notified once per vertex during long partition scans.
///
/// Serializing or loading a large partition can take long enough for an
/// outside supervisor to suspect a hang; the sink lets it observe progress.
pub trait Progress: Send + Sync {
    /// Records that one more vertex has been processed.
    fn progress(&self);
}

/// A [`Progress`] sink that ignores every signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl Progress for NoopProgress {
    fn progress(&self) {}
}

/// A [`Progress`] sink that counts signals.
#[derive(Debug, Default)]
pub struct CountingProgress {
    /// Signals received so far.
    pub ticks: AtomicU64,
}

impl CountingProgress {
    /// Number of signals received so far.
    pub fn count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Progress for CountingProgress {
    fn progress(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }
}
