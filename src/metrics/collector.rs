//! Metrics collection and registry.

use crate::session::{CameraSession, RecordingState, StatsSnapshot};
use parking_lot::Mutex;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Metric creation, registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of session state for a metrics update.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    /// Session counters at the time of the snapshot.
    pub stats: StatsSnapshot,
    /// Whether a recording is in progress.
    pub recording_active: bool,
}

impl MetricsSnapshot {
    /// Samples the session's counters and recording state.
    pub fn from_session(session: &CameraSession) -> Self {
        Self {
            stats: session.stats().snapshot(),
            recording_active: matches!(
                session.recording_state(),
                RecordingState::Recording { .. }
            ),
        }
    }
}

/// Adds what a session counter gained since the last sample. A value below
/// the last one means a fresh session, which counts from zero.
fn advance(counter: &IntCounter, last: u64, now: u64) {
    let gained = if now >= last { now - last } else { now };
    if gained > 0 {
        counter.inc_by(gained);
    }
}

/// Prometheus registry for camera session metrics.
pub struct MetricsRegistry {
    registry: Registry,

    pictures_taken: IntCounter,
    capture_failures: IntCounter,
    recordings_started: IntCounter,
    recordings_completed: IntCounter,
    recordings_failed: IntCounter,
    binds: IntCounter,
    bind_failures: IntCounter,
    recording_active: IntGauge,

    last: Mutex<StatsSnapshot>,
}

impl MetricsRegistry {
    /// Creates the counters and registers them in a fresh registry.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let pictures_taken = IntCounter::new(
            "camera_session_pictures_taken_total",
            "Stills written successfully",
        )?;
        let capture_failures = IntCounter::new(
            "camera_session_capture_failures_total",
            "Still captures that failed",
        )?;
        let recordings_started = IntCounter::new(
            "camera_session_recordings_started_total",
            "Recordings that reported a start event",
        )?;
        let recordings_completed = IntCounter::new(
            "camera_session_recordings_completed_total",
            "Recordings finalized without error",
        )?;
        let recordings_failed = IntCounter::new(
            "camera_session_recordings_failed_total",
            "Recordings that failed to start or finalized with an error",
        )?;
        let binds = IntCounter::new(
            "camera_session_binds_total",
            "Successful use-case bindings",
        )?;
        let bind_failures = IntCounter::new(
            "camera_session_bind_failures_total",
            "Use-case bindings that failed",
        )?;
        let recording_active = IntGauge::new(
            "camera_session_recording_active",
            "Whether a recording is in progress (1=recording, 0=idle)",
        )?;

        registry.register(Box::new(pictures_taken.clone()))?;
        registry.register(Box::new(capture_failures.clone()))?;
        registry.register(Box::new(recordings_started.clone()))?;
        registry.register(Box::new(recordings_completed.clone()))?;
        registry.register(Box::new(recordings_failed.clone()))?;
        registry.register(Box::new(binds.clone()))?;
        registry.register(Box::new(bind_failures.clone()))?;
        registry.register(Box::new(recording_active.clone()))?;

        Ok(Self {
            registry,
            pictures_taken,
            capture_failures,
            recordings_started,
            recordings_completed,
            recordings_failed,
            binds,
            bind_failures,
            recording_active,
            last: Mutex::new(StatsSnapshot::default()),
        })
    }

    /// Folds a new sample into the counters and sets the gauge.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        let now = snapshot.stats;
        let mut last = self.last.lock();
        advance(&self.pictures_taken, last.pictures_taken, now.pictures_taken);
        advance(&self.capture_failures, last.capture_failures, now.capture_failures);
        advance(&self.recordings_started, last.recordings_started, now.recordings_started);
        advance(
            &self.recordings_completed,
            last.recordings_completed,
            now.recordings_completed,
        );
        advance(&self.recordings_failed, last.recordings_failed, now.recordings_failed);
        advance(&self.binds, last.binds, now.binds);
        advance(&self.bind_failures, last.bind_failures, now.bind_failures);
        *last = now;
        self.recording_active
            .set(i64::from(snapshot.recording_active));
    }

    /// Treats the next sample as coming from a new session, counted from zero.
    pub fn reset_baseline(&self) {
        *self.last.lock() = StatsSnapshot::default();
    }

    /// The underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        assert!(MetricsRegistry::new().is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();
        let snapshot = MetricsSnapshot {
            stats: StatsSnapshot {
                binds: 2,
                bind_failures: 1,
                pictures_taken: 3,
                capture_failures: 0,
                recordings_started: 1,
                recordings_completed: 1,
                recordings_failed: 0,
            },
            recording_active: true,
        };

        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("camera_session_pictures_taken_total 3"));
        assert!(output.contains("camera_session_binds_total 2"));
        assert!(output.contains("camera_session_bind_failures_total 1"));
        assert!(output.contains("camera_session_recording_active 1"));
    }

    #[test]
    fn test_repeated_sample_adds_nothing() {
        let registry = MetricsRegistry::new().unwrap();
        let mut snapshot = MetricsSnapshot::default();
        snapshot.stats.binds = 3;
        registry.update(&snapshot);
        registry.update(&snapshot);

        snapshot.stats.binds = 5;
        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("camera_session_binds_total 5"));
    }

    #[test]
    fn test_counters_keep_rising_after_session_rebuild() {
        let registry = MetricsRegistry::new().unwrap();
        let mut snapshot = MetricsSnapshot::default();
        snapshot.stats.recordings_completed = 4;
        snapshot.stats.pictures_taken = 2;
        snapshot.recording_active = true;
        registry.update(&snapshot);

        // A rebuilt session starts its counters again from zero.
        snapshot.stats.recordings_completed = 1;
        snapshot.stats.pictures_taken = 0;
        snapshot.recording_active = false;
        registry.update(&snapshot);

        snapshot.stats.recordings_completed = 3;
        registry.update(&snapshot);

        // Same values again after an explicit session switch still count.
        registry.reset_baseline();
        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("camera_session_recordings_completed_total 10"));
        assert!(output.contains("camera_session_pictures_taken_total 2"));
        assert!(output.contains("camera_session_recording_active 0"));
    }

    #[test]
    fn test_metrics_encode() {
        let registry = MetricsRegistry::new().unwrap();
        let output = registry.encode().unwrap();

        assert!(output.contains("camera_session_recordings_started_total"));
        assert!(output.contains("camera_session_recordings_failed_total"));
        assert!(output.contains("camera_session_capture_failures_total"));
    }
}
