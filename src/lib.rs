//! Camera Session Library
//!
//! A lifecycle-scoped camera session: live preview, still capture and
//! video recording on top of an asynchronous camera framework, plus the
//! host that drives a fixed record sequence.
//!
//! # Architecture
//!
//! Commands are issued on the main loop; blocking I/O runs on a single
//! worker thread; every callback is delivered back on the main loop.
//!
//! ```text
//!  SessionHost ──► CameraSession ──► CameraPlatform / CameraProvider
//!       │               │  ▲                 │
//!       │  MainLoop ◄───┘  └── Worker ◄──────┘  (capture + record I/O)
//!       ▼
//!  Notifier ("Video saved: ...")
//! ```
//!
//! # Design Principles
//!
//! - **One binding at a time**: every rebind unbinds everything first
//! - **Callbacks on the main loop**: platform threads never reach user code
//! - **Asynchronous stop**: a recording ends when the framework finalizes it
//! - **Explicit ownership**: the host builds its session lazily and releases
//!   it when its lifecycle is destroyed
//!
//! # Example
//!
//! ```no_run
//! use camera_session::{
//!     capture::{PreviewConfig, SessionConfig},
//!     dispatch::MainLoop,
//!     lifecycle::Lifecycle,
//!     platform::{MockPlatform, NullPreview},
//!     session::CameraSession,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let mut main = MainLoop::new().unwrap();
//! let platform = Arc::new(MockPlatform::new(PreviewConfig::default()));
//! let session = CameraSession::new(
//!     platform,
//!     main.handle(),
//!     SessionConfig::default(),
//!     Arc::new(NullPreview),
//! )
//! .unwrap();
//!
//! session.on_recording_ended(|path| println!("saved {}", path.display()));
//!
//! let lifecycle = Lifecycle::new();
//! lifecycle.start();
//! session.start(lifecycle);
//! main.run_until(Duration::from_secs(1), || session.is_bound());
//!
//! session.start_recording("recordings");
//! main.run_for(Duration::from_secs(2));
//! session.stop_recording();
//! main.run_for(Duration::from_millis(500));
//! session.release();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

/// Configuration, frames and output naming.
pub mod capture;
/// Main loop and worker thread.
pub mod dispatch;
/// The host that owns a session and runs the record sequence.
pub mod host;
/// Owner-scoped lazy values.
pub mod lazy;
/// Host lifecycle that bindings are scoped to.
pub mod lifecycle;
/// Prometheus counters for a session.
pub mod metrics;
/// Camera framework abstraction and its backends.
pub mod platform;
/// The camera session itself.
pub mod session;

// Re-export commonly used types at crate root
pub use capture::{FileConfig, HostConfig, LensFacing, PreviewConfig, SessionConfig};
pub use dispatch::{MainHandle, MainLoop};
pub use host::{LogNotifier, Notifier, SessionHost};
pub use lazy::ScopedLazy;
pub use lifecycle::Lifecycle;
pub use session::{CameraSession, RecordingState, SessionError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
