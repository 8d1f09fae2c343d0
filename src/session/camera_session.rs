//! Lifecycle-scoped camera session.
//!
//! Commands are issued from the main loop and return immediately; results
//! come back through the callbacks, always on the main loop. Platform events
//! that arrive on the worker are re-posted to the main loop before any
//! callback runs.

use super::callbacks::Callbacks;
use super::stats::SessionStats;
use super::SessionError;
use crate::capture::{naming, FinalizeErrorPolicy, LensFacing, MediaKind, SessionConfig};
use crate::dispatch::{MainHandle, Worker, WorkerError, WorkerHandle};
use crate::lifecycle::Lifecycle;
use crate::platform::{
    ActiveRecording, BoundUseCases, CameraPlatform, CameraProvider, PlatformError, PreviewSink,
    ProviderCallback, RecordEvent, RecordListener,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the session's background thread.
pub const WORKER_THREAD_NAME: &str = "camera-worker";

/// Observable state of the recording state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingState {
    /// No recording handle is held.
    Idle,
    /// A recording was started and has not finalized yet.
    Recording {
        /// File the recording writes to.
        output: PathBuf,
        /// Whether `stop_recording` has already been called for it.
        stop_requested: bool,
    },
}

struct ActiveEntry {
    id: u64,
    output: PathBuf,
    handle: Box<dyn ActiveRecording>,
    stop_requested: bool,
}

struct State {
    config: SessionConfig,
    lifecycle: Option<Lifecycle>,
    provider: Option<Arc<dyn CameraProvider>>,
    binding: Option<BoundUseCases>,
    recording: Option<ActiveEntry>,
    next_recording_id: u64,
    acquiring: bool,
    released: bool,
}

/// Everything the event closures need. Holds no worker, so a closure running
/// on the worker can never be the one that joins it.
#[derive(Clone)]
struct Core {
    state: Arc<Mutex<State>>,
    callbacks: Arc<Callbacks>,
    stats: Arc<SessionStats>,
    main: MainHandle,
    preview: Arc<dyn PreviewSink>,
}

impl Core {
    /// Reports `error` from the main loop, never from the caller's stack.
    fn post_error(&self, error: SessionError) {
        let target = self.clone();
        if !self.main.post(move || target.callbacks.fire_error(&error)) {
            tracing::warn!("main loop gone; error callback dropped");
        }
    }

    fn on_provider_ready(&self, result: Result<Arc<dyn CameraProvider>, PlatformError>) {
        let provider = match result {
            Ok(provider) => provider,
            Err(e) => {
                let released = {
                    let mut state = self.state.lock();
                    state.acquiring = false;
                    state.released
                };
                if !released {
                    tracing::error!(error = %e, "camera provider unavailable");
                    self.callbacks
                        .fire_error(&SessionError::ProviderUnavailable(e));
                }
                return;
            }
        };

        {
            let mut state = self.state.lock();
            state.acquiring = false;
            if state.released {
                return;
            }
            state.provider = Some(provider);
        }
        tracing::debug!("camera provider acquired");
        self.rebind();
    }

    /// Tears down whatever is bound and binds again under the current
    /// configuration. No-op until both a provider and a lifecycle exist.
    fn rebind(&self) {
        let mut state = self.state.lock();
        if state.released {
            return;
        }
        let (Some(provider), Some(lifecycle)) = (state.provider.clone(), state.lifecycle.clone())
        else {
            return;
        };
        let lens = state.config.lens;

        if state.binding.take().is_some() {
            tracing::debug!("tearing down existing binding");
        }
        provider.unbind_all();

        match provider.bind_to_lifecycle(&lifecycle, lens, Arc::clone(&self.preview)) {
            Ok(bound) => {
                state.binding = Some(bound);
                self.stats.record_bind();
                tracing::info!(%lens, lifecycle = lifecycle.id(), "camera use cases bound");
            }
            Err(e) => {
                drop(state);
                self.stats.record_bind_failure();
                tracing::error!(%lens, error = %e, "failed to bind camera use cases");
                self.post_error(SessionError::Bind(e));
            }
        }
    }

    fn on_capture_done(&self, result: Result<PathBuf, PlatformError>) {
        match result {
            Ok(path) => {
                self.stats.record_picture();
                tracing::info!(path = %path.display(), "picture saved");
                self.callbacks.fire_capture_success(&path);
            }
            Err(e) => {
                self.stats.record_capture_failure();
                tracing::warn!(error = %e, "still capture failed");
                self.callbacks.fire_error(&SessionError::Capture(e));
            }
        }
    }

    fn on_record_event(&self, id: u64, event: RecordEvent) {
        match event {
            RecordEvent::Start => {
                self.stats.record_recording_started();
                tracing::info!(recording = id, "recording started");
                self.callbacks.fire_recording_started();
            }
            RecordEvent::Finalize { output, error } => {
                let policy = {
                    let mut state = self.state.lock();
                    if state.recording.as_ref().is_some_and(|r| r.id == id) {
                        state.recording = None;
                    }
                    state.config.finalize_errors
                };

                match error {
                    None => {
                        self.stats.record_recording_completed();
                        tracing::info!(recording = id, output = %output.display(), "recording saved");
                        self.callbacks.fire_recording_ended(&output);
                    }
                    Some(e) => {
                        self.stats.record_recording_failed();
                        match policy {
                            FinalizeErrorPolicy::Drop => tracing::warn!(
                                recording = id,
                                error = %e,
                                "recording finalized with error; no callback fired"
                            ),
                            FinalizeErrorPolicy::Report => {
                                tracing::warn!(recording = id, error = %e, "recording finalized with error");
                                self.callbacks.fire_error(&SessionError::Recording(e));
                            }
                        }
                    }
                }
            }
        }
    }

    /// Listener handed to the recorder: hops every event onto the main loop.
    fn record_listener(&self, id: u64) -> RecordListener {
        let core = self.clone();
        Arc::new(move |event: RecordEvent| {
            let target = core.clone();
            core.main.post(move || target.on_record_event(id, event));
        })
    }
}

struct Shared {
    platform: Arc<dyn CameraPlatform>,
    core: Core,
    worker: Mutex<Option<Worker>>,
}

impl Shared {
    fn release(&self) {
        let Some(mut worker) = self.worker.lock().take() else {
            return;
        };

        let provider = {
            let mut state = self.core.state.lock();
            state.released = true;
            state.binding = None;
            state.recording = None;
            state.lifecycle = None;
            state.provider.take()
        };
        self.core.callbacks.clear();

        if let Some(provider) = provider {
            provider.unbind_all();
        }
        worker.shutdown();
        tracing::info!("camera session released");
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.release();
    }
}

/// Handle to a camera session.
///
/// Clones share one session. The session is released by [`release`] or when
/// the last clone is dropped; after that every operation is a logged no-op.
///
/// [`release`]: CameraSession::release
#[derive(Clone)]
pub struct CameraSession {
    shared: Arc<Shared>,
}

impl CameraSession {
    /// Creates an unbound session and spawns its worker thread.
    pub fn new(
        platform: Arc<dyn CameraPlatform>,
        main: MainHandle,
        config: SessionConfig,
        preview: Arc<dyn PreviewSink>,
    ) -> Result<Self, WorkerError> {
        let worker = Worker::spawn(WORKER_THREAD_NAME)?;
        let core = Core {
            state: Arc::new(Mutex::new(State {
                config,
                lifecycle: None,
                provider: None,
                binding: None,
                recording: None,
                next_recording_id: 1,
                acquiring: false,
                released: false,
            })),
            callbacks: Arc::new(Callbacks::default()),
            stats: Arc::new(SessionStats::default()),
            main,
            preview,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                platform,
                core,
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    fn core(&self) -> &Core {
        &self.shared.core
    }

    fn worker_handle(&self) -> Option<WorkerHandle> {
        self.shared.worker.lock().as_ref().map(Worker::handle)
    }

    /// Called on the main loop with the path of each saved still.
    pub fn on_capture_success<F>(&self, f: F)
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        self.core().callbacks.set_capture_success(Arc::new(f));
    }

    /// Called on the main loop when a recording has actually started.
    pub fn on_recording_started<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.core().callbacks.set_recording_started(Arc::new(f));
    }

    /// Called on the main loop with the path of each successfully finalized
    /// recording.
    pub fn on_recording_ended<F>(&self, f: F)
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        self.core().callbacks.set_recording_ended(Arc::new(f));
    }

    /// Called on the main loop for binding, capture and (depending on
    /// [`FinalizeErrorPolicy`]) recording failures.
    pub fn on_error<F>(&self, f: F)
    where
        F: Fn(&SessionError) + Send + Sync + 'static,
    {
        self.core().callbacks.set_error(Arc::new(f));
    }

    /// Acquires the camera provider and binds the use cases to `lifecycle`.
    ///
    /// Returns immediately; binding happens on the main loop once the
    /// provider is available. Calling it again with a new lifecycle rebinds
    /// against that lifecycle.
    pub fn start(&self, lifecycle: Lifecycle) {
        let core = self.core();
        {
            let mut state = core.state.lock();
            if state.released {
                tracing::warn!("start on a released camera session ignored");
                return;
            }
            tracing::debug!(lifecycle = lifecycle.id(), "starting camera session");
            state.lifecycle = Some(lifecycle);

            if state.provider.is_some() {
                let target = core.clone();
                core.main.post(move || target.rebind());
                return;
            }
            if state.acquiring {
                return;
            }
            state.acquiring = true;
        }

        let target = core.clone();
        let ready: ProviderCallback = Box::new(move |result| {
            let main = target.main.clone();
            main.post(move || target.on_provider_ready(result));
        });
        self.shared.platform.acquire_provider(ready);
    }

    /// Writes one still named after the current time into `output_dir`.
    /// No-op when nothing is bound.
    pub fn take_picture(&self, output_dir: impl AsRef<Path>) {
        let Some(worker) = self.worker_handle() else {
            tracing::warn!("take_picture on a released camera session ignored");
            return;
        };
        let capture = {
            let state = self.core().state.lock();
            match state.binding.as_ref() {
                Some(bound) => Arc::clone(&bound.image_capture),
                None => {
                    tracing::debug!("no still-capture use case bound; take_picture ignored");
                    return;
                }
            }
        };

        let output = naming::output_path(output_dir.as_ref(), MediaKind::Image);
        tracing::debug!(output = %output.display(), "taking picture");

        let core = self.core().clone();
        capture.take_picture(
            output,
            worker,
            Box::new(move |result: Result<PathBuf, PlatformError>| {
                let main = core.main.clone();
                main.post(move || core.on_capture_done(result));
            }),
        );
    }

    /// Starts recording to a file named after the current time in
    /// `output_dir`. No-op when no recorder is bound or a recording is
    /// already active.
    pub fn start_recording(&self, output_dir: impl AsRef<Path>) {
        let Some(worker) = self.worker_handle() else {
            tracing::warn!("start_recording on a released camera session ignored");
            return;
        };
        let core = self.core();
        let mut state = core.state.lock();

        let recorder = match state.binding.as_ref() {
            Some(bound) => Arc::clone(&bound.recorder),
            None => {
                tracing::debug!("no recorder bound; start_recording ignored");
                return;
            }
        };
        if let Some(active) = state.recording.as_ref() {
            tracing::debug!(
                recording = active.id,
                "recording already active; start_recording ignored"
            );
            return;
        }

        let id = state.next_recording_id;
        state.next_recording_id += 1;
        let output = naming::output_path(output_dir.as_ref(), MediaKind::Video);

        match recorder.start(output.clone(), worker, core.record_listener(id)) {
            Ok(handle) => {
                tracing::info!(recording = id, output = %output.display(), "recording requested");
                state.recording = Some(ActiveEntry {
                    id,
                    output,
                    handle,
                    stop_requested: false,
                });
            }
            Err(e) => {
                drop(state);
                core.stats.record_recording_failed();
                tracing::error!(recording = id, error = %e, "failed to start recording");
                core.post_error(SessionError::Recording(e));
            }
        }
    }

    /// Requests finalization of the active recording. Completion arrives
    /// through the recording-ended callback. No-op when nothing is recording
    /// or a stop was already requested.
    pub fn stop_recording(&self) {
        let mut state = self.core().state.lock();
        match state.recording.as_mut() {
            None => tracing::debug!("no active recording; stop_recording ignored"),
            Some(active) if active.stop_requested => {
                tracing::debug!(recording = active.id, "stop already requested")
            }
            Some(active) => {
                active.stop_requested = true;
                tracing::info!(recording = active.id, "stopping recording");
                active.handle.stop();
            }
        }
    }

    /// Toggles between the back and front camera and rebinds.
    pub fn switch_camera(&self) {
        let config = self.config().with_toggled_lens();
        self.reconfigure(config);
    }

    /// Replaces the configuration, then unbinds everything and binds again.
    ///
    /// Runs synchronously on the calling thread. Before the session is bound
    /// this only stores the configuration for the first bind.
    pub fn reconfigure(&self, config: SessionConfig) {
        let core = self.core();
        {
            let mut state = core.state.lock();
            if state.released {
                tracing::warn!("reconfigure on a released camera session ignored");
                return;
            }
            tracing::info!(lens = %config.lens, "reconfiguring camera session");
            state.config = config;
        }
        core.rebind();
    }

    /// Unbinds all use cases and stops the worker. Idempotent.
    pub fn release(&self) {
        self.shared.release();
    }

    /// Current configuration, including the selected lens.
    pub fn config(&self) -> SessionConfig {
        self.core().state.lock().config
    }

    /// Snapshot of the recording state machine.
    pub fn recording_state(&self) -> RecordingState {
        match self.core().state.lock().recording.as_ref() {
            None => RecordingState::Idle,
            Some(active) => RecordingState::Recording {
                output: active.output.clone(),
                stop_requested: active.stop_requested,
            },
        }
    }

    /// Whether use cases are currently bound.
    pub fn is_bound(&self) -> bool {
        self.core().state.lock().binding.is_some()
    }

    /// Lens of the current binding.
    pub fn bound_lens(&self) -> Option<LensFacing> {
        self.core().state.lock().binding.as_ref().map(|b| b.lens)
    }

    /// Whether [`release`](CameraSession::release) has run.
    pub fn is_released(&self) -> bool {
        self.core().state.lock().released
    }

    /// Counters for the metrics exporter.
    pub fn stats(&self) -> Arc<SessionStats> {
        Arc::clone(&self.core().stats)
    }
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.core().state.lock();
        f.debug_struct("CameraSession")
            .field("config", &state.config)
            .field("bound", &state.binding.is_some())
            .field("recording", &state.recording.as_ref().map(|r| r.id))
            .field("released", &state.released)
            .finish()
    }
}
