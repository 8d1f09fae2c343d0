//! The four optional host callbacks.

use super::SessionError;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

type PathCallback = Arc<dyn Fn(&Path) + Send + Sync + 'static>;
type UnitCallback = Arc<dyn Fn() + Send + Sync + 'static>;
type ErrorCallback = Arc<dyn Fn(&SessionError) + Send + Sync + 'static>;

#[derive(Default, Clone)]
struct Slots {
    capture_success: Option<PathCallback>,
    recording_started: Option<UnitCallback>,
    recording_ended: Option<PathCallback>,
    error: Option<ErrorCallback>,
}

/// Callback registry shared between the session and its event closures.
///
/// Each `fire_*` clones the callback out of the lock before calling it, so a
/// callback may freely call back into the session.
#[derive(Default)]
pub(crate) struct Callbacks {
    slots: RwLock<Slots>,
}

impl Callbacks {
    pub(crate) fn set_capture_success(&self, f: PathCallback) {
        self.slots.write().capture_success = Some(f);
    }

    pub(crate) fn set_recording_started(&self, f: UnitCallback) {
        self.slots.write().recording_started = Some(f);
    }

    pub(crate) fn set_recording_ended(&self, f: PathCallback) {
        self.slots.write().recording_ended = Some(f);
    }

    pub(crate) fn set_error(&self, f: ErrorCallback) {
        self.slots.write().error = Some(f);
    }

    /// Drops every callback; nothing fires afterwards.
    pub(crate) fn clear(&self) {
        *self.slots.write() = Slots::default();
    }

    pub(crate) fn fire_capture_success(&self, path: &Path) {
        let f = self.slots.read().capture_success.clone();
        if let Some(f) = f {
            f(path);
        }
    }

    pub(crate) fn fire_recording_started(&self) {
        let f = self.slots.read().recording_started.clone();
        if let Some(f) = f {
            f();
        }
    }

    pub(crate) fn fire_recording_ended(&self, path: &Path) {
        let f = self.slots.read().recording_ended.clone();
        if let Some(f) = f {
            f(path);
        }
    }

    pub(crate) fn fire_error(&self, error: &SessionError) {
        let f = self.slots.read().error.clone();
        match f {
            Some(f) => f(error),
            None => tracing::warn!(error = %error, "camera session error with no error callback"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_unset_callbacks_are_skipped() {
        let callbacks = Callbacks::default();
        callbacks.fire_capture_success(Path::new("a.jpg"));
        callbacks.fire_recording_started();
        callbacks.fire_recording_ended(Path::new("a.mp4"));
        callbacks.fire_error(&SessionError::Capture(PlatformError::SourceInactive));
    }

    #[test]
    fn test_clear_stops_delivery() {
        let callbacks = Callbacks::default();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        callbacks.set_recording_started(Arc::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        callbacks.fire_recording_started();
        callbacks.clear();
        callbacks.fire_recording_started();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_may_replace_itself() {
        let callbacks = Arc::new(Callbacks::default());
        let registry = Arc::clone(&callbacks);
        callbacks.set_recording_started(Arc::new(move || {
            registry.set_recording_started(Arc::new(|| {}));
        }));

        // Would deadlock if the read lock were held during the call.
        callbacks.fire_recording_started();
    }
}
