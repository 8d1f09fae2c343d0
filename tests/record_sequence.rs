use camera_session::capture::naming::{self, MediaKind};
use camera_session::capture::{FinalizeErrorPolicy, PreviewConfig, SessionConfig};
use camera_session::dispatch::MainLoop;
use camera_session::platform::{MockPlatform, NullPreview};
use camera_session::{CameraSession, Lifecycle, RecordingState, SessionError};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn session_with(platform: &Arc<MockPlatform>, main: &MainLoop, config: SessionConfig) -> CameraSession {
    CameraSession::new(
        Arc::clone(platform) as _,
        main.handle(),
        config,
        Arc::new(NullPreview),
    )
    .unwrap()
}

#[test]
fn test_start_record_stop_delivers_timestamped_clip() {
    let tmp = tempfile::tempdir().unwrap();
    let mut main = MainLoop::new().unwrap();
    let platform = Arc::new(MockPlatform::new(PreviewConfig::with_dimensions(16, 8)));
    let session = session_with(&platform, &main, SessionConfig::default());

    let ended: Arc<Mutex<Vec<PathBuf>>> = Arc::default();
    let sink = Arc::clone(&ended);
    session.on_recording_ended(move |path| sink.lock().push(path.to_path_buf()));

    let lifecycle = Lifecycle::new();
    lifecycle.start();
    session.start(lifecycle.clone());
    let watch = session.clone();
    assert!(main.run_until(TIMEOUT, move || watch.is_bound()));

    session.start_recording(tmp.path());
    assert!(matches!(session.recording_state(), RecordingState::Recording { .. }));
    let provider = platform.provider();
    for _ in 0..5 {
        provider.emit_preview_frame();
    }
    session.stop_recording();

    let seen = Arc::clone(&ended);
    assert!(main.run_until(TIMEOUT, move || !seen.lock().is_empty()));
    assert_eq!(session.recording_state(), RecordingState::Idle);

    let path = ended.lock()[0].clone();
    assert_eq!(path.parent(), Some(tmp.path()));
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(naming::parse_file_name(MediaKind::Video, name).is_some());

    let contents = std::fs::read(&path).unwrap();
    let trailer = String::from_utf8_lossy(&contents);
    assert!(trailer.contains("frames=5"));

    // Nothing is active any more.
    session.stop_recording();
    main.run_for(Duration::from_millis(50));
    assert_eq!(ended.lock().len(), 1);

    lifecycle.destroy();
    session.release();
    assert!(!provider.is_bound());
}

#[test]
fn test_failed_finalize_reported_when_configured() {
    let tmp = tempfile::tempdir().unwrap();
    let mut main = MainLoop::new().unwrap();
    let platform = Arc::new(MockPlatform::new(PreviewConfig::with_dimensions(16, 8)));
    let config = SessionConfig {
        finalize_errors: FinalizeErrorPolicy::Report,
        ..SessionConfig::default()
    };
    let session = session_with(&platform, &main, config);

    let errors: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&errors);
    session.on_error(move |e| {
        if let SessionError::Recording(_) = e {
            sink.lock().push(e.to_string());
        }
    });
    let ended = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&ended);
    session.on_recording_ended(move |_| *counter.lock() += 1);

    let lifecycle = Lifecycle::new();
    lifecycle.start();
    session.start(lifecycle);
    let watch = session.clone();
    assert!(main.run_until(TIMEOUT, move || watch.is_bound()));

    platform.fail_next_finalize("muxer lost");
    session.start_recording(tmp.path());
    session.stop_recording();

    let seen = Arc::clone(&errors);
    assert!(main.run_until(TIMEOUT, move || !seen.lock().is_empty()));
    assert_eq!(*ended.lock(), 0);
    assert_eq!(session.recording_state(), RecordingState::Idle);
}
