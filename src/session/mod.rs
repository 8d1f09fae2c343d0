//! Camera session: binding, still capture and the recording state machine.
//!
//! ```text
//!            start_recording                 Finalize (ok)  → recording-ended
//!   Idle ───────────────────► Recording ───────────────────► Idle
//!    ▲                           │  start_recording: ignored
//!    └───────────────────────────┘
//!          Finalize (error)  → nothing, or error callback under
//!                              FinalizeErrorPolicy::Report
//! ```

mod callbacks;
mod camera_session;
mod error;
mod stats;

pub use camera_session::{CameraSession, RecordingState, WORKER_THREAD_NAME};
pub use error::SessionError;
pub use stats::{SessionStats, StatsSnapshot};
