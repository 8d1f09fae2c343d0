//! Host lifecycle that scopes a camera binding.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle states, in order. A destroyed lifecycle never comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    /// Host exists but is not started.
    Created,
    /// Host is running; bindings are live.
    Started,
    /// Host is gone; bindings are torn down.
    Destroyed,
}

/// Cloneable handle to a host lifecycle.
///
/// Clones share state, so the host can destroy the lifecycle that a session
/// or provider still holds.
#[derive(Clone)]
pub struct Lifecycle {
    id: u64,
    state: Arc<Mutex<LifecycleState>>,
}

impl Lifecycle {
    /// Creates a lifecycle in the Created state.
    pub fn new() -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            state: Arc::new(Mutex::new(LifecycleState::Created)),
        }
    }

    /// Process-unique identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Moves Created → Started. No effect on a destroyed lifecycle.
    pub fn start(&self) {
        let mut state = self.state.lock();
        if *state == LifecycleState::Created {
            *state = LifecycleState::Started;
            tracing::debug!(lifecycle = self.id, "lifecycle started");
        }
    }

    /// Moves to Destroyed. Idempotent.
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        if *state != LifecycleState::Destroyed {
            *state = LifecycleState::Destroyed;
            tracing::debug!(lifecycle = self.id, "lifecycle destroyed");
        }
    }

    /// Whether [`destroy`](Lifecycle::destroy) has run.
    pub fn is_destroyed(&self) -> bool {
        self.state() == LifecycleState::Destroyed
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Created);

        lifecycle.start();
        assert_eq!(lifecycle.state(), LifecycleState::Started);

        let shared = lifecycle.clone();
        shared.destroy();
        assert!(lifecycle.is_destroyed());

        lifecycle.start();
        assert_eq!(lifecycle.state(), LifecycleState::Destroyed);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(Lifecycle::new().id(), Lifecycle::new().id());
    }
}
