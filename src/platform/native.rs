//! Hardware camera backend.
//!
//! Frames come from `nokhwa` on a dedicated capture thread per binding.
//! Stills and clips are encoded by an `ffmpeg` child process fed raw RGB
//! frames over stdin, so `ffmpeg` must be on `PATH`.
//!
//! The back lens maps to the first enumerated camera and the front lens to
//! the second.

use super::{
    ActiveRecording, BoundUseCases, CameraPlatform, CameraProvider, CaptureCallback, ImageCapture,
    PlatformError, PreviewSink, ProviderCallback, RecordEvent, RecordListener, Recorder,
};
use crate::capture::{Frame, LensFacing, PreviewConfig};
use crate::dispatch::WorkerHandle;
use crate::lifecycle::Lifecycle;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

/// How long `bind_to_lifecycle` waits for the device to open.
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Camera framework backed by the host's video devices.
#[derive(Debug, Clone)]
pub struct NativePlatform {
    preview: PreviewConfig,
}

impl NativePlatform {
    /// Creates the backend; devices are enumerated on acquisition.
    pub fn new(preview: PreviewConfig) -> Self {
        Self { preview }
    }
}

impl CameraPlatform for NativePlatform {
    fn acquire_provider(&self, ready: ProviderCallback) {
        let preview = self.preview.clone();
        std::thread::spawn(move || ready(NativeProvider::discover(preview)));
    }
}

fn ffmpeg_available() -> bool {
    Command::new("ffmpeg").arg("-version").output().is_ok()
}

struct NativeBinding {
    lens: LensFacing,
    pipeline: Arc<Pipeline>,
    thread: Option<JoinHandle<()>>,
}

/// Provider side of [`NativePlatform`].
struct NativeProvider {
    preview: PreviewConfig,
    cameras: Vec<CameraIndex>,
    binding: Mutex<Option<NativeBinding>>,
}

impl NativeProvider {
    fn discover(preview: PreviewConfig) -> Result<Arc<dyn CameraProvider>, PlatformError> {
        if !ffmpeg_available() {
            return Err(PlatformError::ProviderUnavailable(
                "ffmpeg not found on PATH".to_string(),
            ));
        }
        let cameras: Vec<CameraIndex> = nokhwa::query(ApiBackend::Auto)
            .map_err(|e| PlatformError::ProviderUnavailable(e.to_string()))?
            .into_iter()
            .map(|info| info.index().clone())
            .collect();
        if cameras.is_empty() {
            return Err(PlatformError::ProviderUnavailable(
                "no cameras found".to_string(),
            ));
        }
        tracing::info!(count = cameras.len(), "cameras enumerated");

        Ok(Arc::new(Self {
            preview,
            cameras,
            binding: Mutex::new(None),
        }))
    }

    fn camera_for(&self, lens: LensFacing) -> Result<CameraIndex, PlatformError> {
        let slot = match lens {
            LensFacing::Back => 0,
            LensFacing::Front => 1,
        };
        self.cameras
            .get(slot)
            .cloned()
            .ok_or(PlatformError::NoCamera(lens))
    }
}

impl CameraProvider for NativeProvider {
    fn bind_to_lifecycle(
        &self,
        lifecycle: &Lifecycle,
        lens: LensFacing,
        preview: Arc<dyn PreviewSink>,
    ) -> Result<BoundUseCases, PlatformError> {
        if lifecycle.is_destroyed() {
            return Err(PlatformError::LifecycleDestroyed);
        }
        let mut binding = self.binding.lock();
        if binding.is_some() {
            return Err(PlatformError::AlreadyBound);
        }

        let index = self.camera_for(lens)?;
        let pipeline = Arc::new(Pipeline::new(self.preview.clone(), lens));

        let (opened_tx, opened_rx) = mpsc::channel();
        let thread = {
            let pipeline = Arc::clone(&pipeline);
            let lifecycle = lifecycle.clone();
            std::thread::Builder::new()
                .name(format!("camera-capture-{lens}"))
                .spawn(move || pipeline.capture_loop(index, lifecycle, preview, opened_tx))?
        };

        let opened = opened_rx
            .recv_timeout(OPEN_TIMEOUT)
            .unwrap_or_else(|_| Err("timed out opening camera".to_string()));
        if let Err(reason) = opened {
            pipeline.running.store(false, Ordering::SeqCst);
            if thread.join().is_err() {
                tracing::warn!(%lens, "capture thread panicked");
            }
            return Err(PlatformError::BindFailed(reason));
        }

        *binding = Some(NativeBinding {
            lens,
            pipeline: Arc::clone(&pipeline),
            thread: Some(thread),
        });
        tracing::info!(%lens, lifecycle = lifecycle.id(), "camera use cases bound");

        Ok(BoundUseCases {
            lens,
            image_capture: Arc::new(NativeImageCapture {
                pipeline: Arc::clone(&pipeline),
            }),
            recorder: Arc::new(NativeRecorder { pipeline }),
        })
    }

    fn unbind_all(&self) {
        let Some(mut binding) = self.binding.lock().take() else {
            return;
        };
        binding.pipeline.running.store(false, Ordering::SeqCst);
        if let Some(thread) = binding.thread.take() {
            if thread.join().is_err() {
                tracing::warn!(lens = %binding.lens, "capture thread panicked");
            }
        }
        if let Some(recording) = binding.pipeline.recording.lock().take() {
            recording.finish(Some(PlatformError::SourceInactive));
        }
        tracing::info!(lens = %binding.lens, "camera use cases unbound");
    }
}

/// Resolution and frame rate of an open stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StreamFormat {
    width: u32,
    height: u32,
    fps: u32,
}

impl StreamFormat {
    fn requested(config: &PreviewConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            fps: config.fps,
        }
    }
}

impl From<CameraFormat> for StreamFormat {
    fn from(format: CameraFormat) -> Self {
        let resolution = format.resolution();
        Self {
            width: resolution.width(),
            height: resolution.height(),
            fps: format.frame_rate(),
        }
    }
}

/// Frame flow for one binding: camera → preview, latest still, encoder.
struct Pipeline {
    config: PreviewConfig,
    lens: LensFacing,
    running: AtomicBool,
    /// Format the device agreed to, set once the stream is open.
    negotiated: Mutex<Option<StreamFormat>>,
    latest: Mutex<Option<Frame>>,
    recording: Mutex<Option<Arc<RecordingInner>>>,
}

impl Pipeline {
    fn new(config: PreviewConfig, lens: LensFacing) -> Self {
        Self {
            config,
            lens,
            running: AtomicBool::new(true),
            negotiated: Mutex::new(None),
            latest: Mutex::new(None),
            recording: Mutex::new(None),
        }
    }

    fn capture_loop(
        &self,
        index: CameraIndex,
        lifecycle: Lifecycle,
        preview: Arc<dyn PreviewSink>,
        opened: mpsc::Sender<Result<(), String>>,
    ) {
        let wanted = StreamFormat::requested(&self.config);
        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(wanted.width, wanted.height),
                FrameFormat::MJPEG,
                wanted.fps,
            ),
        ));
        let mut camera = match Camera::new(index.clone(), format) {
            Ok(camera) => camera,
            Err(e) => {
                let _ = opened.send(Err(format!("failed to open camera {index:?}: {e}")));
                return;
            }
        };
        if let Err(e) = camera.open_stream() {
            let _ = opened.send(Err(format!("failed to open camera stream: {e}")));
            return;
        }
        let negotiated = StreamFormat::from(camera.camera_format());
        if negotiated != wanted {
            tracing::info!(
                width = negotiated.width,
                height = negotiated.height,
                fps = negotiated.fps,
                "camera chose a different format"
            );
        }
        *self.negotiated.lock() = Some(negotiated);
        let _ = opened.send(Ok(()));

        let mut sequence = 0u64;
        while self.running.load(Ordering::SeqCst) && !lifecycle.is_destroyed() {
            let image = match camera.frame().and_then(|buffer| buffer.decode_image::<RgbFormat>()) {
                Ok(image) => image,
                Err(e) => {
                    tracing::debug!(error = %e, "failed to capture frame");
                    continue;
                }
            };
            sequence += 1;
            let (width, height) = (image.width(), image.height());
            let frame = Frame::new(image.into_raw(), width, height, sequence, self.lens);

            preview.on_frame(&frame);
            let recording = self.recording.lock().clone();
            if let Some(recording) = recording {
                recording.write_frame(&frame);
            }
            *self.latest.lock() = Some(frame);
        }

        if let Err(e) = camera.stop_stream() {
            tracing::warn!(error = %e, "error stopping camera stream");
        }
        tracing::debug!(lens = %self.lens, frames = sequence, "capture loop exited");
    }

    /// Format the encoder should expect: what the device negotiated, or the
    /// configured one before the stream is open.
    fn stream_format(&self) -> StreamFormat {
        let negotiated = *self.negotiated.lock();
        let format = negotiated.unwrap_or_else(|| StreamFormat::requested(&self.config));
        StreamFormat {
            fps: format.fps.max(1),
            ..format
        }
    }
}

fn rawvideo_input(width: u32, height: u32, fps: u32) -> Vec<String> {
    [
        "-y",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pixel_format",
        "rgb24",
        "-video_size",
        &format!("{width}x{height}"),
        "-framerate",
        &fps.to_string(),
        "-i",
        "-",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Waits for an ffmpeg child whose stdin has been closed.
fn wait_ffmpeg(child: Child, fail: fn(String) -> PlatformError) -> Result<(), PlatformError> {
    let output = child.wait_with_output()?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(fail(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            stderr.trim()
        )))
    }
}

struct NativeImageCapture {
    pipeline: Arc<Pipeline>,
}

impl NativeImageCapture {
    fn encode_still(frame: &Frame, output: &Path) -> Result<(), PlatformError> {
        let mut args = rawvideo_input(frame.width(), frame.height(), 1);
        args.extend(["-frames:v".to_string(), "1".to_string()]);
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(frame.pixels())?;
        }
        wait_ffmpeg(child, PlatformError::CaptureFailed)
    }
}

impl ImageCapture for NativeImageCapture {
    fn take_picture(&self, output: PathBuf, executor: WorkerHandle, done: CaptureCallback) {
        let frame = self.pipeline.latest.lock().clone();
        let job = move || {
            let result = match frame {
                None => Err(PlatformError::CaptureFailed(
                    "no frame captured yet".to_string(),
                )),
                Some(frame) => Self::encode_still(&frame, &output).map(|()| output),
            };
            done(result);
        };
        if executor.execute(job).is_err() {
            tracing::warn!("worker closed before still capture was queued");
        }
    }
}

struct NativeRecorder {
    pipeline: Arc<Pipeline>,
}

impl Recorder for NativeRecorder {
    fn start(
        &self,
        output: PathBuf,
        executor: WorkerHandle,
        listener: RecordListener,
    ) -> Result<Box<dyn ActiveRecording>, PlatformError> {
        if !self.pipeline.running.load(Ordering::SeqCst) {
            return Err(PlatformError::SourceInactive);
        }
        let StreamFormat { width, height, fps } = self.pipeline.stream_format();
        let inner = Arc::new(RecordingInner {
            output,
            width,
            height,
            fps,
            pipeline: Arc::clone(&self.pipeline),
            executor: executor.clone(),
            listener,
            encoder: Mutex::new(None),
            start_error: Mutex::new(None),
            finished: AtomicBool::new(false),
        });

        let job = {
            let inner = Arc::clone(&inner);
            move || inner.open()
        };
        executor
            .execute(job)
            .map_err(|_| PlatformError::WorkerUnavailable)?;

        *self.pipeline.recording.lock() = Some(Arc::clone(&inner));
        Ok(Box::new(NativeRecording { inner }))
    }
}

struct RecordingInner {
    output: PathBuf,
    width: u32,
    height: u32,
    fps: u32,
    pipeline: Arc<Pipeline>,
    executor: WorkerHandle,
    listener: RecordListener,
    encoder: Mutex<Option<Child>>,
    start_error: Mutex<Option<PlatformError>>,
    finished: AtomicBool,
}

impl RecordingInner {
    /// Worker job: launch the encoder and announce the recording.
    fn open(self: &Arc<Self>) {
        let mut args = rawvideo_input(self.width, self.height, self.fps);
        args.extend(
            [
                "-c:v", "libx264", "-preset", "veryfast", "-pix_fmt", "yuv420p", "-movflags",
                "+faststart",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        let spawned = Command::new("ffmpeg")
            .args(&args)
            .arg(&self.output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();

        match spawned {
            Ok(child) => {
                tracing::debug!(output = %self.output.display(), "encoder started");
                *self.encoder.lock() = Some(child);
                (self.listener)(RecordEvent::Start);
            }
            Err(e) => {
                *self.start_error.lock() = Some(PlatformError::Io(e));
                (self.listener)(RecordEvent::Start);
                if !self.finished.swap(true, Ordering::AcqRel) {
                    self.finalize(None);
                }
            }
        }
    }

    /// Called on the capture thread. Frames of a different size are skipped.
    fn write_frame(&self, frame: &Frame) {
        if frame.width() != self.width || frame.height() != self.height {
            return;
        }
        let mut encoder = self.encoder.lock();
        let Some(stdin) = encoder.as_mut().and_then(|child| child.stdin.as_mut()) else {
            return;
        };
        if let Err(e) = stdin.write_all(frame.pixels()) {
            tracing::warn!(error = %e, "encoder rejected frame");
        }
    }

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

    /// Worker job: close the encoder and emit Finalize.
    fn finalize(self: &Arc<Self>, cause: Option<PlatformError>) {
        {
            let mut slot = self.pipeline.recording.lock();
            if slot.as_ref().is_some_and(|r| Arc::ptr_eq(r, self)) {
                *slot = None;
            }
        }

        let mut error = self.start_error.lock().take().or(cause);
        let encoder = self.encoder.lock().take();
        if let Some(mut child) = encoder {
            drop(child.stdin.take());
            if let Err(e) = wait_ffmpeg(child, PlatformError::RecordingFailed) {
                error.get_or_insert(e);
            }
        }

        (self.listener)(RecordEvent::Finalize {
            output: self.output.clone(),
            error,
        });
    }
}

struct NativeRecording {
    inner: Arc<RecordingInner>,
}

impl ActiveRecording for NativeRecording {
    fn stop(&self) {
        self.inner.finish(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rawvideo_input_describes_frame() {
        let args = rawvideo_input(640, 480, 30);
        assert!(args.windows(2).any(|w| w[0] == "-video_size" && w[1] == "640x480"));
        assert!(args.windows(2).any(|w| w[0] == "-pixel_format" && w[1] == "rgb24"));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn test_encoder_follows_negotiated_format() {
        let config = PreviewConfig::with_dimensions(1280, 720);
        let pipeline = Pipeline::new(config.clone(), LensFacing::Back);
        assert_eq!(pipeline.stream_format(), StreamFormat::requested(&config));

        // No frame has arrived yet; the negotiated format still wins.
        let negotiated = StreamFormat::from(CameraFormat::new(
            Resolution::new(640, 480),
            FrameFormat::MJPEG,
            15,
        ));
        *pipeline.negotiated.lock() = Some(negotiated);
        assert!(pipeline.latest.lock().is_none());
        assert_eq!(
            pipeline.stream_format(),
            StreamFormat {
                width: 640,
                height: 480,
                fps: 15
            }
        );
    }

    #[test]
    fn test_missing_front_camera() {
        let provider = NativeProvider {
            preview: PreviewConfig::default(),
            cameras: vec![CameraIndex::Index(0)],
            binding: Mutex::new(None),
        };
        assert!(provider.camera_for(LensFacing::Back).is_ok());
        assert!(matches!(
            provider.camera_for(LensFacing::Front),
            Err(PlatformError::NoCamera(LensFacing::Front))
        ));
    }
}
