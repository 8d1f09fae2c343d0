//! The screen that owns a camera session.
//!
//! `SessionHost` runs the fixed record sequence: start the camera, start
//! recording after `start_delay`, stop after `stop_delay` (both measured from
//! [`SessionHost::on_create`]), and tell the user when the clip is saved.
//! The same session is reachable for user-driven start/stop as well.

use crate::capture::{HostConfig, SessionConfig};
use crate::dispatch::{MainHandle, WorkerError};
use crate::lazy::ScopedLazy;
use crate::lifecycle::Lifecycle;
use crate::platform::{CameraPlatform, NullPreview, PreviewSink};
use crate::session::CameraSession;
use std::path::Path;
use std::sync::Arc;

/// Short user-visible confirmation, the host's equivalent of a toast.
pub trait Notifier: Send + Sync {
    /// Shows `message` to the user.
    fn notify(&self, message: &str);
}

/// Notifier that writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        tracing::info!(target: "notify", "{message}");
    }
}

/// Creates the output directory, logging instead of failing.
fn ensure_output_dir(dir: &Path) -> bool {
    match std::fs::create_dir_all(dir) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(dir = %dir.display(), error = %e, "cannot create output directory");
            false
        }
    }
}

/// Owner of a lifecycle and the camera session bound to it.
pub struct SessionHost {
    config: HostConfig,
    main: MainHandle,
    lifecycle: Lifecycle,
    notifier: Arc<dyn Notifier>,
    platform: Arc<dyn CameraPlatform>,
    session_config: SessionConfig,
    preview: Arc<dyn PreviewSink>,
    saved_hook: Option<SavedHook>,
    session: ScopedLazy<CameraSession, WorkerError>,
}

type SavedHook = Arc<dyn Fn(&Path) + Send + Sync + 'static>;

impl SessionHost {
    /// Creates a host whose session is built on the first [`on_create`].
    ///
    /// [`on_create`]: SessionHost::on_create
    pub fn new(
        platform: Arc<dyn CameraPlatform>,
        main: MainHandle,
        session_config: SessionConfig,
        config: HostConfig,
    ) -> Self {
        let preview: Arc<dyn PreviewSink> = Arc::new(NullPreview);
        let session = Self::session_binding(&platform, &main, session_config, &preview);
        Self {
            config,
            main,
            lifecycle: Lifecycle::new(),
            notifier: Arc::new(LogNotifier),
            platform,
            session_config,
            preview,
            saved_hook: None,
            session,
        }
    }

    /// Replaces the notifier. Takes effect at the next [`on_create`].
    ///
    /// [`on_create`]: SessionHost::on_create
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Called on the main loop with the path of every saved recording,
    /// after the notifier. Takes effect at the next [`on_create`].
    ///
    /// [`on_create`]: SessionHost::on_create
    pub fn on_recording_saved<F>(mut self, f: F) -> Self
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        self.saved_hook = Some(Arc::new(f));
        self
    }

    /// Replaces the preview sink used when the session is first built.
    pub fn with_preview(mut self, preview: Arc<dyn PreviewSink>) -> Self {
        self.preview = preview;
        self.session = Self::session_binding(
            &self.platform,
            &self.main,
            self.session_config,
            &self.preview,
        );
        self
    }

    fn session_binding(
        platform: &Arc<dyn CameraPlatform>,
        main: &MainHandle,
        config: SessionConfig,
        preview: &Arc<dyn PreviewSink>,
    ) -> ScopedLazy<CameraSession, WorkerError> {
        let platform = Arc::clone(platform);
        let main = main.clone();
        let preview = Arc::clone(preview);
        ScopedLazy::fallible(move || {
            CameraSession::new(
                Arc::clone(&platform),
                main.clone(),
                config,
                Arc::clone(&preview),
            )
        })
    }

    /// Output directory and record sequence delays.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// The lifecycle the session is bound to.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// The session, if it has been built.
    pub fn session(&self) -> Option<&CameraSession> {
        self.session.get_if_initialized()
    }

    /// Builds the session, wires its callbacks, starts it and schedules the
    /// record sequence.
    pub fn on_create(&mut self) -> Result<(), WorkerError> {
        let session = self.session.try_get()?.clone();

        let notifier = Arc::clone(&self.notifier);
        let hook = self.saved_hook.clone();
        session.on_recording_ended(move |path| {
            notifier.notify(&format!("Video saved: {}", path.display()));
            if let Some(hook) = hook.as_ref() {
                hook(path);
            }
        });
        let notifier = Arc::clone(&self.notifier);
        session.on_capture_success(move |path| {
            notifier.notify(&format!("Photo saved: {}", path.display()));
        });
        session.on_recording_started(|| tracing::info!("recording in progress"));
        session.on_error(|e| tracing::error!(error = %e, "camera session error"));

        self.lifecycle.start();
        session.start(self.lifecycle.clone());
        self.schedule_record_sequence(&session);
        Ok(())
    }

    fn schedule_record_sequence(&self, session: &CameraSession) {
        let dir = self.config.output_dir.clone();
        let target = session.clone();
        self.main.post_delayed(self.config.start_delay(), move || {
            if ensure_output_dir(&dir) {
                target.start_recording(&dir);
            } else {
                tracing::warn!("recording skipped");
            }
        });

        let target = session.clone();
        self.main
            .post_delayed(self.config.stop_delay(), move || target.stop_recording());

        tracing::info!(
            start_ms = self.config.start_delay_ms,
            stop_ms = self.config.stop_delay_ms,
            dir = %self.config.output_dir.display(),
            "record sequence scheduled"
        );
    }

    /// Starts recording into the configured directory now.
    pub fn start_recording(&self) {
        if let Some(session) = self.session() {
            if ensure_output_dir(&self.config.output_dir) {
                session.start_recording(&self.config.output_dir);
            }
        }
    }

    /// Stops the active recording, if any.
    pub fn stop_recording(&self) {
        if let Some(session) = self.session() {
            session.stop_recording();
        }
    }

    /// Saves a still into the configured directory.
    pub fn take_picture(&self) {
        if let Some(session) = self.session() {
            if ensure_output_dir(&self.config.output_dir) {
                session.take_picture(&self.config.output_dir);
            }
        }
    }

    /// Flips between the back and front camera.
    pub fn switch_camera(&self) {
        if let Some(session) = self.session() {
            session.switch_camera();
        }
    }

    /// Destroys the lifecycle and releases the session. Scheduled steps that
    /// fire afterwards find a released session and do nothing.
    pub fn on_destroy(&mut self) {
        self.lifecycle.destroy();
        if let Some(session) = self.session.take() {
            session.release();
        }
    }
}

impl Drop for SessionHost {
    fn drop(&mut self) {
        self.on_destroy();
    }
}
