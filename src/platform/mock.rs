//! In-process camera framework.
//!
//! Behaves like a real backend as far as the session can observe: the
//! provider arrives asynchronously, only one binding may exist at a time,
//! stills and clips are real files, and recording events arrive on the
//! executor the session supplied. Faults can be injected one call at a time.

use super::{
    ActiveRecording, BoundUseCases, CameraPlatform, CameraProvider, CaptureCallback, ImageCapture,
    PlatformError, PreviewSink, ProviderCallback, RecordEvent, RecordListener, Recorder,
};
use crate::capture::{Frame, LensFacing, PreviewConfig};
use crate::dispatch::WorkerHandle;
use crate::lifecycle::Lifecycle;
use parking_lot::Mutex;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// `ftyp` box of an ISO-BMFF file.
const MP4_HEADER: &[u8] = b"\x00\x00\x00\x18ftypmp42\x00\x00\x00\x00mp42isom";
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Binding history entry recorded by [`MockProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingEvent {
    /// Use cases were bound.
    Bound {
        /// Lens that was bound.
        lens: LensFacing,
        /// Id of the lifecycle the binding is scoped to.
        lifecycle: u64,
    },
    /// The binding was torn down.
    Unbound {
        /// Lens that was bound.
        lens: LensFacing,
    },
}

#[derive(Default)]
struct Faults {
    acquire: Mutex<Option<String>>,
    bind: Mutex<Option<String>>,
    capture: Mutex<Option<String>>,
    record_start: Mutex<Option<String>>,
    finalize: Mutex<Option<String>>,
}

/// Fake camera framework.
pub struct MockPlatform {
    provider: Arc<MockProvider>,
    faults: Arc<Faults>,
}

impl MockPlatform {
    /// Creates a backend whose frames have the preview's dimensions.
    pub fn new(preview: PreviewConfig) -> Self {
        let faults = Arc::new(Faults::default());
        Self {
            provider: Arc::new(MockProvider {
                preview,
                faults: Arc::clone(&faults),
                state: Mutex::new(ProviderState::default()),
            }),
            faults,
        }
    }

    /// The provider handed out by [`CameraPlatform::acquire_provider`].
    pub fn provider(&self) -> Arc<MockProvider> {
        Arc::clone(&self.provider)
    }

    /// Next provider acquisition fails.
    pub fn fail_next_acquire(&self, reason: impl Into<String>) {
        *self.faults.acquire.lock() = Some(reason.into());
    }

    /// Next `bind_to_lifecycle` fails.
    pub fn fail_next_bind(&self, reason: impl Into<String>) {
        *self.faults.bind.lock() = Some(reason.into());
    }

    /// Next still capture fails.
    pub fn fail_next_capture(&self, reason: impl Into<String>) {
        *self.faults.capture.lock() = Some(reason.into());
    }

    /// Next `Recorder::start` fails synchronously.
    pub fn fail_next_record_start(&self, reason: impl Into<String>) {
        *self.faults.record_start.lock() = Some(reason.into());
    }

    /// Next recording that would finalize cleanly finalizes with an error.
    pub fn fail_next_finalize(&self, reason: impl Into<String>) {
        *self.faults.finalize.lock() = Some(reason.into());
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new(PreviewConfig::default())
    }
}

impl CameraPlatform for MockPlatform {
    fn acquire_provider(&self, ready: ProviderCallback) {
        let fault = self.faults.acquire.lock().take();
        let provider: Arc<dyn CameraProvider> = self.provider();
        std::thread::spawn(move || match fault {
            Some(reason) => ready(Err(PlatformError::ProviderUnavailable(reason))),
            None => ready(Ok(provider)),
        });
    }
}

struct ActiveBinding {
    lens: LensFacing,
    lifecycle: Lifecycle,
    sink: Arc<dyn PreviewSink>,
    recorder: Arc<MockRecorder>,
}

#[derive(Default)]
struct ProviderState {
    binding: Option<ActiveBinding>,
    events: Vec<BindingEvent>,
    frame_sequence: u64,
}

/// Provider side of [`MockPlatform`].
pub struct MockProvider {
    preview: PreviewConfig,
    faults: Arc<Faults>,
    state: Mutex<ProviderState>,
}

impl MockProvider {
    /// Every bind and unbind, in order.
    pub fn events(&self) -> Vec<BindingEvent> {
        self.state.lock().events.clone()
    }

    /// Whether use cases are currently bound.
    pub fn is_bound(&self) -> bool {
        self.state.lock().binding.is_some()
    }

    /// Lens of the current binding.
    pub fn bound_lens(&self) -> Option<LensFacing> {
        self.state.lock().binding.as_ref().map(|b| b.lens)
    }

    /// Pushes one synthetic frame to the bound preview sink and counts it
    /// into the active recording, if any. Returns false when nothing is
    /// bound or the bound lifecycle is gone.
    pub fn emit_preview_frame(&self) -> bool {
        let (frame, sink) = {
            let mut state = self.state.lock();
            state.frame_sequence += 1;
            let sequence = state.frame_sequence;
            let Some(binding) = state.binding.as_ref() else {
                return false;
            };
            if binding.lifecycle.is_destroyed() {
                return false;
            }
            if let Some(recording) = binding.recorder.active.lock().as_ref() {
                recording.frames.fetch_add(1, Ordering::Relaxed);
            }
            (
                synthetic_frame(&self.preview, sequence, binding.lens),
                Arc::clone(&binding.sink),
            )
        };
        sink.on_frame(&frame);
        true
    }
}

/// Deterministic test pattern; not image content, only frame plumbing.
fn synthetic_frame(config: &PreviewConfig, sequence: u64, lens: LensFacing) -> Frame {
    let len = (config.width as usize) * (config.height as usize) * Frame::BYTES_PER_PIXEL;
    let pixels = (0..len)
        .map(|i| ((i as u64 ^ sequence) % 256) as u8)
        .collect();
    Frame::new(pixels, config.width, config.height, sequence, lens)
}

impl CameraProvider for MockProvider {
    fn bind_to_lifecycle(
        &self,
        lifecycle: &Lifecycle,
        lens: LensFacing,
        preview: Arc<dyn PreviewSink>,
    ) -> Result<BoundUseCases, PlatformError> {
        if lifecycle.is_destroyed() {
            return Err(PlatformError::LifecycleDestroyed);
        }
        if let Some(reason) = self.faults.bind.lock().take() {
            return Err(PlatformError::BindFailed(reason));
        }

        let mut state = self.state.lock();
        if state.binding.is_some() {
            return Err(PlatformError::AlreadyBound);
        }

        let recorder = Arc::new(MockRecorder {
            lens,
            faults: Arc::clone(&self.faults),
            active: Mutex::new(None),
        });
        let image_capture = Arc::new(MockImageCapture {
            lens,
            preview: self.preview.clone(),
            faults: Arc::clone(&self.faults),
        });

        state.binding = Some(ActiveBinding {
            lens,
            lifecycle: lifecycle.clone(),
            sink: preview,
            recorder: Arc::clone(&recorder),
        });
        state.events.push(BindingEvent::Bound {
            lens,
            lifecycle: lifecycle.id(),
        });
        tracing::info!(%lens, lifecycle = lifecycle.id(), "mock use cases bound");

        Ok(BoundUseCases {
            lens,
            image_capture,
            recorder,
        })
    }

    fn unbind_all(&self) {
        let binding = {
            let mut state = self.state.lock();
            let binding = state.binding.take();
            if let Some(ref binding) = binding {
                state.events.push(BindingEvent::Unbound { lens: binding.lens });
            }
            binding
        };

        if let Some(binding) = binding {
            if let Some(recording) = binding.recorder.active.lock().take() {
                recording.finish(Some(PlatformError::SourceInactive));
            }
            tracing::info!(lens = %binding.lens, "mock use cases unbound");
        }
    }
}

struct MockImageCapture {
    lens: LensFacing,
    preview: PreviewConfig,
    faults: Arc<Faults>,
}

impl ImageCapture for MockImageCapture {
    fn take_picture(&self, output: PathBuf, executor: WorkerHandle, done: CaptureCallback) {
        if executor.is_closed() {
            done(Err(PlatformError::WorkerUnavailable));
            return;
        }

        let fault = self.faults.capture.lock().take();
        let lens = self.lens;
        let (width, height) = (self.preview.width, self.preview.height);
        let job = move || {
            let result = match fault {
                Some(reason) => Err(PlatformError::CaptureFailed(reason)),
                None => write_still(&output, width, height, lens).map(|()| output),
            };
            done(result);
        };
        if executor.execute(job).is_err() {
            tracing::warn!("worker closed before still capture was queued");
        }
    }
}

fn write_still(path: &Path, width: u32, height: u32, lens: LensFacing) -> Result<(), PlatformError> {
    let mut file = File::create(path)?;
    file.write_all(&JPEG_SOI)?;
    file.write_all(format!("mock still {width}x{height} {lens}").as_bytes())?;
    file.write_all(&JPEG_EOI)?;
    file.sync_all()?;
    Ok(())
}

struct MockRecorder {
    lens: LensFacing,
    faults: Arc<Faults>,
    active: Mutex<Option<Arc<RecordingInner>>>,
}

impl Recorder for MockRecorder {
    fn start(
        &self,
        output: PathBuf,
        executor: WorkerHandle,
        listener: RecordListener,
    ) -> Result<Box<dyn ActiveRecording>, PlatformError> {
        if let Some(reason) = self.faults.record_start.lock().take() {
            return Err(PlatformError::RecordingFailed(reason));
        }

        let inner = Arc::new(RecordingInner {
            output,
            lens: self.lens,
            executor: executor.clone(),
            listener,
            faults: Arc::clone(&self.faults),
            file: Mutex::new(None),
            start_error: Mutex::new(None),
            frames: AtomicU64::new(0),
            finished: AtomicBool::new(false),
            started_at: Instant::now(),
        });

        let job = {
            let inner = Arc::clone(&inner);
            move || inner.open()
        };
        executor
            .execute(job)
            .map_err(|_| PlatformError::WorkerUnavailable)?;

        *self.active.lock() = Some(Arc::clone(&inner));
        Ok(Box::new(MockRecording { inner }))
    }
}

struct RecordingInner {
    output: PathBuf,
    lens: LensFacing,
    executor: WorkerHandle,
    listener: RecordListener,
    faults: Arc<Faults>,
    file: Mutex<Option<File>>,
    start_error: Mutex<Option<PlatformError>>,
    frames: AtomicU64,
    finished: AtomicBool,
    started_at: Instant,
}

impl RecordingInner {
    /// Worker job: create the file and announce the recording.
    fn open(&self) {
        let opened = File::create(&self.output).and_then(|mut file| {
            file.write_all(MP4_HEADER)?;
            Ok(file)
        });

        match opened {
            Ok(file) => {
                *self.file.lock() = Some(file);
                (self.listener)(RecordEvent::Start);
            }
            Err(e) => {
                *self.start_error.lock() = Some(PlatformError::Io(e));
                (self.listener)(RecordEvent::Start);
                // A stop that already queued its finalize job will report it.
                if !self.finished.swap(true, Ordering::AcqRel) {
                    self.finalize(None);
                }
            }
        }
    }

    /// Queues finalization once; later calls are ignored.
    fn finish(self: &Arc<Self>, cause: Option<PlatformError>) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = Arc::clone(self);
        if self.executor.execute(move || inner.finalize(cause)).is_err() {
            tracing::warn!(
                output = %self.output.display(),
                "worker closed; finalize event dropped"
            );
        }
    }

    /// Worker job: write the trailer and emit Finalize.
    fn finalize(&self, cause: Option<PlatformError>) {
        let mut error = self.start_error.lock().take().or(cause);

        if let Some(mut file) = self.file.lock().take() {
            let trailer = format!(
                "lens={} frames={} duration_ms={}\n",
                self.lens,
                self.frames.load(Ordering::Relaxed),
                self.started_at.elapsed().as_millis()
            );
            if let Err(e) = file.write_all(trailer.as_bytes()).and_then(|()| file.sync_all()) {
                error.get_or_insert(PlatformError::Io(e));
            }
        }

        if error.is_none() {
            if let Some(reason) = self.faults.finalize.lock().take() {
                error = Some(PlatformError::RecordingFailed(reason));
            }
        }

        (self.listener)(RecordEvent::Finalize {
            output: self.output.clone(),
            error,
        });
    }
}

struct MockRecording {
    inner: Arc<RecordingInner>,
}

impl ActiveRecording for MockRecording {
    fn stop(&self) {
        self.inner.finish(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Worker;
    use crate::platform::NullPreview;
    use std::sync::mpsc;
    use std::time::Duration;

    fn acquire(platform: &MockPlatform) -> Result<Arc<dyn CameraProvider>, PlatformError> {
        let (tx, rx) = mpsc::channel();
        let ready: ProviderCallback = Box::new(move |result| {
            let _ = tx.send(result);
        });
        platform.acquire_provider(ready);
        rx.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    fn small() -> PreviewConfig {
        PreviewConfig::with_dimensions(8, 4)
    }

    #[test]
    fn test_single_binding_enforced() {
        let platform = MockPlatform::new(small());
        let provider = acquire(&platform).unwrap();
        let lifecycle = Lifecycle::new();

        provider
            .bind_to_lifecycle(&lifecycle, LensFacing::Back, Arc::new(NullPreview))
            .unwrap();
        let second =
            provider.bind_to_lifecycle(&lifecycle, LensFacing::Front, Arc::new(NullPreview));
        assert!(matches!(second, Err(PlatformError::AlreadyBound)));

        provider.unbind_all();
        provider
            .bind_to_lifecycle(&lifecycle, LensFacing::Front, Arc::new(NullPreview))
            .unwrap();

        assert_eq!(
            platform.provider().events(),
            vec![
                BindingEvent::Bound { lens: LensFacing::Back, lifecycle: lifecycle.id() },
                BindingEvent::Unbound { lens: LensFacing::Back },
                BindingEvent::Bound { lens: LensFacing::Front, lifecycle: lifecycle.id() },
            ]
        );
    }

    #[test]
    fn test_acquire_fault() {
        let platform = MockPlatform::default();
        platform.fail_next_acquire("no cameras");
        assert!(matches!(
            acquire(&platform),
            Err(PlatformError::ProviderUnavailable(_))
        ));
        assert!(acquire(&platform).is_ok());
    }

    #[test]
    fn test_destroyed_lifecycle_rejected() {
        let platform = MockPlatform::new(small());
        let provider = acquire(&platform).unwrap();
        let lifecycle = Lifecycle::new();
        lifecycle.destroy();

        let result =
            provider.bind_to_lifecycle(&lifecycle, LensFacing::Back, Arc::new(NullPreview));
        assert!(matches!(result, Err(PlatformError::LifecycleDestroyed)));
        assert!(!platform.provider().is_bound());
    }

    #[test]
    fn test_recording_events_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let platform = MockPlatform::new(small());
        let provider = acquire(&platform).unwrap();
        let bound = provider
            .bind_to_lifecycle(&Lifecycle::new(), LensFacing::Back, Arc::new(NullPreview))
            .unwrap();

        let mut worker = Worker::spawn("mock-test").unwrap();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let listener: RecordListener = Arc::new(move |event: RecordEvent| {
            let _ = tx.lock().send(event);
        });

        let output = dir.path().join("clip.mp4");
        let recording = bound
            .recorder
            .start(output.clone(), worker.handle(), listener)
            .unwrap();
        assert!(platform.provider().emit_preview_frame());
        recording.stop();
        recording.stop();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(first, RecordEvent::Start));
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            RecordEvent::Finalize { output: path, error } => {
                assert_eq!(path, output);
                assert!(error.is_none());
            }
            other => panic!("unexpected event {other:?}"),
        }
        worker.shutdown();
        assert!(rx.try_recv().is_err());

        let bytes = std::fs::read(&output).unwrap();
        assert!(bytes.starts_with(MP4_HEADER));
        assert!(String::from_utf8_lossy(&bytes).contains("frames=1"));
    }

    #[test]
    fn test_unbind_aborts_recording() {
        let dir = tempfile::tempdir().unwrap();
        let platform = MockPlatform::new(small());
        let provider = acquire(&platform).unwrap();
        let bound = provider
            .bind_to_lifecycle(&Lifecycle::new(), LensFacing::Front, Arc::new(NullPreview))
            .unwrap();

        let mut worker = Worker::spawn("mock-test").unwrap();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let listener: RecordListener = Arc::new(move |event: RecordEvent| {
            let _ = tx.lock().send(event);
        });
        let _recording = bound
            .recorder
            .start(dir.path().join("clip.mp4"), worker.handle(), listener)
            .unwrap();

        provider.unbind_all();

        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            RecordEvent::Start
        ));
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            RecordEvent::Finalize { error: Some(PlatformError::SourceInactive), .. }
        ));
        worker.shutdown();
    }

    #[test]
    fn test_still_capture_and_fault() {
        let dir = tempfile::tempdir().unwrap();
        let platform = MockPlatform::new(small());
        let provider = acquire(&platform).unwrap();
        let bound = provider
            .bind_to_lifecycle(&Lifecycle::new(), LensFacing::Back, Arc::new(NullPreview))
            .unwrap();
        let mut worker = Worker::spawn("mock-test").unwrap();

        let (tx, rx) = mpsc::channel();
        let ok_tx = tx.clone();
        let output = dir.path().join("still.jpg");
        bound.image_capture.take_picture(
            output.clone(),
            worker.handle(),
            Box::new(move |r: Result<PathBuf, PlatformError>| {
                let _ = ok_tx.send(r);
            }),
        );
        let written = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(written, output);
        let bytes = std::fs::read(&output).unwrap();
        assert!(bytes.starts_with(&JPEG_SOI) && bytes.ends_with(&JPEG_EOI));

        platform.fail_next_capture("sensor busy");
        bound.image_capture.take_picture(
            dir.path().join("other.jpg"),
            worker.handle(),
            Box::new(move |r: Result<PathBuf, PlatformError>| {
                let _ = tx.send(r);
            }),
        );
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Err(PlatformError::CaptureFailed(_))
        ));
        assert!(!dir.path().join("other.jpg").exists());
        worker.shutdown();
    }
}
