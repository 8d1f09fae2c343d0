//! Session counters, read by the metrics exporter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters updated by the session as events are handled.
#[derive(Debug, Default)]
pub struct SessionStats {
    binds: AtomicU64,
    bind_failures: AtomicU64,
    pictures_taken: AtomicU64,
    capture_failures: AtomicU64,
    recordings_started: AtomicU64,
    recordings_completed: AtomicU64,
    recordings_failed: AtomicU64,
}

/// Point-in-time copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Successful bindings.
    pub binds: u64,
    /// Failed bindings.
    pub bind_failures: u64,
    /// Stills written.
    pub pictures_taken: u64,
    /// Stills that failed.
    pub capture_failures: u64,
    /// Recordings that reported Start.
    pub recordings_started: u64,
    /// Recordings finalized cleanly.
    pub recordings_completed: u64,
    /// Recordings that failed to start or finalize.
    pub recordings_failed: u64,
}

impl SessionStats {
    pub(crate) fn record_bind(&self) {
        self.binds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bind_failure(&self) {
        self.bind_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_picture(&self) {
        self.pictures_taken.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_capture_failure(&self) {
        self.capture_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recording_started(&self) {
        self.recordings_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recording_completed(&self) {
        self.recordings_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recording_failed(&self) {
        self.recordings_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            binds: self.binds.load(Ordering::Relaxed),
            bind_failures: self.bind_failures.load(Ordering::Relaxed),
            pictures_taken: self.pictures_taken.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            recordings_started: self.recordings_started.load(Ordering::Relaxed),
            recordings_completed: self.recordings_completed.load(Ordering::Relaxed),
            recordings_failed: self.recordings_failed.load(Ordering::Relaxed),
        }
    }
}
