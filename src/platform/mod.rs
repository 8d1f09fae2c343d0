//! Camera platform abstraction.
//!
//! The platform framework owns device negotiation, encoding and surface
//! composition. The session only sequences calls into it through these
//! traits:
//!
//! ```text
//! CameraPlatform::acquire_provider ──► CameraProvider
//!     CameraProvider::bind_to_lifecycle ──► BoundUseCases
//!         ├── PreviewSink   (frames pushed by the platform)
//!         ├── ImageCapture  (one-shot still writes)
//!         └── Recorder      ──► ActiveRecording + RecordEvent stream
//! ```
//!
//! Every asynchronous completion (provider ready, picture written, recording
//! events) is delivered on whatever thread the platform chooses; for capture
//! and recording that is the [`WorkerHandle`] the session passes in.

/// In-process backend for tests and the demo CLI.
pub mod mock;
/// Hardware backend on `nokhwa` and `ffmpeg`.
#[cfg(feature = "camera")]
pub mod native;

use crate::capture::{Frame, LensFacing};
use crate::dispatch::WorkerHandle;
use crate::lifecycle::Lifecycle;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use mock::{BindingEvent, MockPlatform, MockProvider};
#[cfg(feature = "camera")]
pub use native::NativePlatform;

/// Errors raised by a platform backend.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The provider could not be obtained.
    #[error("camera provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// No device for the requested lens.
    #[error("no {0} camera available")]
    NoCamera(LensFacing),
    /// A binding already exists.
    #[error("use cases are already bound; unbind first")]
    AlreadyBound,
    /// The device refused the binding.
    #[error("failed to bind use cases: {0}")]
    BindFailed(String),
    /// The lifecycle is already destroyed.
    #[error("lifecycle has been destroyed")]
    LifecycleDestroyed,
    /// A still could not be written.
    #[error("still capture failed: {0}")]
    CaptureFailed(String),
    /// A clip could not be written.
    #[error("recording failed: {0}")]
    RecordingFailed(String),
    /// The binding went away under the recording.
    #[error("recording source became inactive")]
    SourceInactive,
    /// The worker no longer accepts jobs.
    #[error("camera worker is not accepting jobs")]
    WorkerUnavailable,
    /// File or process I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Completion for [`CameraPlatform::acquire_provider`].
pub type ProviderCallback =
    Box<dyn FnOnce(Result<Arc<dyn CameraProvider>, PlatformError>) + Send + 'static>;

/// Completion for [`ImageCapture::take_picture`]; carries the written path.
pub type CaptureCallback = Box<dyn FnOnce(Result<PathBuf, PlatformError>) + Send + 'static>;

/// Receiver of [`RecordEvent`]s for one recording.
pub type RecordListener = Arc<dyn Fn(RecordEvent) + Send + Sync + 'static>;

/// Entry point into a camera framework.
pub trait CameraPlatform: Send + Sync {
    /// Asynchronously obtains the device-wide provider. `ready` is called
    /// exactly once, on an arbitrary thread.
    fn acquire_provider(&self, ready: ProviderCallback);
}

/// Device-wide camera provider.
pub trait CameraProvider: Send + Sync {
    /// Binds preview, still capture and recording for `lens` to `lifecycle`.
    ///
    /// Fails with [`PlatformError::AlreadyBound`] if a previous binding has
    /// not been torn down with [`CameraProvider::unbind_all`].
    fn bind_to_lifecycle(
        &self,
        lifecycle: &Lifecycle,
        lens: LensFacing,
        preview: Arc<dyn PreviewSink>,
    ) -> Result<BoundUseCases, PlatformError>;

    /// Tears down every binding. An active recording is finalized with
    /// [`PlatformError::SourceInactive`].
    fn unbind_all(&self);
}

/// Receives preview frames while a binding is active.
pub trait PreviewSink: Send + Sync {
    /// Called on the capture thread for every frame.
    fn on_frame(&self, frame: &Frame);
}

/// Preview sink that discards frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPreview;

impl PreviewSink for NullPreview {
    fn on_frame(&self, _frame: &Frame) {}
}

/// Still-capture use case.
pub trait ImageCapture: Send + Sync {
    /// Writes one still to `output` on `executor` and reports through `done`.
    fn take_picture(&self, output: PathBuf, executor: WorkerHandle, done: CaptureCallback);
}

/// Video-record use case.
pub trait Recorder: Send + Sync {
    /// Begins recording to `output`. Events for this recording are delivered
    /// to `listener` on `executor`: one [`RecordEvent::Start`], then exactly
    /// one [`RecordEvent::Finalize`].
    fn start(
        &self,
        output: PathBuf,
        executor: WorkerHandle,
        listener: RecordListener,
    ) -> Result<Box<dyn ActiveRecording>, PlatformError>;
}

/// Handle to an in-flight recording.
pub trait ActiveRecording: Send {
    /// Requests finalization. Completion is observed through the Finalize
    /// event, never synchronously. Repeated calls have no effect.
    fn stop(&self);
}

/// Events emitted by a [`Recorder`] for one recording.
#[derive(Debug)]
pub enum RecordEvent {
    /// The recording is writing.
    Start,
    /// The recording is closed. Sent exactly once per recording.
    Finalize {
        /// File the recording wrote to.
        output: PathBuf,
        /// Set when the file is not a usable clip.
        error: Option<PlatformError>,
    },
}

/// The use cases bound to one lifecycle.
#[derive(Clone)]
pub struct BoundUseCases {
    /// Lens the use cases are bound to.
    pub lens: LensFacing,
    /// Still capture use case.
    pub image_capture: Arc<dyn ImageCapture>,
    /// Video recording use case.
    pub recorder: Arc<dyn Recorder>,
}

impl std::fmt::Debug for BoundUseCases {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundUseCases")
            .field("lens", &self.lens)
            .finish_non_exhaustive()
    }
}
