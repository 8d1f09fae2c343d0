//! Prometheus metrics exporter for camera session monitoring.
//!
//! # Metrics Exposed
//!
//! ## Still capture
//! - `camera_session_pictures_taken_total` - Stills written
//! - `camera_session_capture_failures_total` - Failed still captures
//!
//! ## Recording
//! - `camera_session_recordings_started_total` - Recordings that started
//! - `camera_session_recordings_completed_total` - Recordings finalized cleanly
//! - `camera_session_recordings_failed_total` - Recordings that failed
//! - `camera_session_recording_active` - 1 while recording
//!
//! ## Binding
//! - `camera_session_binds_total` - Successful bindings
//! - `camera_session_bind_failures_total` - Failed bindings
//!
//! # Example
//!
//! ```no_run
//! use camera_session::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let mut snapshot = MetricsSnapshot::default();
//! snapshot.stats.recordings_completed = 1;
//! registry.update(&snapshot);
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
