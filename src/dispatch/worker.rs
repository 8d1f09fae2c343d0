//! Single background worker thread.
//!
//! The session hands a [`WorkerHandle`] to the platform for all capture and
//! recording I/O. Jobs run strictly in submission order, which is what keeps
//! a recording's Start event ahead of its Finalize event.

use super::Task;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Errors that can occur when using the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker no longer accepts jobs.
    #[error("worker has shut down")]
    ShutDown,
    /// The OS refused to start the thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

enum Job {
    Run(Task),
    Shutdown,
}

/// Cloneable submission side of a [`Worker`].
#[derive(Clone)]
pub struct WorkerHandle {
    tx: Sender<Job>,
    closed: Arc<AtomicBool>,
}

impl WorkerHandle {
    /// Queues `task` to run on the worker thread.
    pub fn execute<F>(&self, task: F) -> Result<(), WorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(WorkerError::ShutDown);
        }
        self.tx
            .send(Job::Run(Box::new(task)))
            .map_err(|_| WorkerError::ShutDown)
    }

    /// Returns true once the owning worker has been shut down.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Owner of the worker thread.
pub struct Worker {
    handle: WorkerHandle,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns a named worker thread.
    pub fn spawn(name: &str) -> Result<Self, WorkerError> {
        let (tx, rx) = mpsc::channel::<Job>();
        let thread = thread::Builder::new().name(name.to_owned()).spawn(move || {
            while let Ok(job) = rx.recv() {
                match job {
                    Job::Run(task) => task(),
                    Job::Shutdown => break,
                }
            }
            tracing::debug!("worker loop exited");
        })?;

        tracing::debug!(name, "worker spawned");
        Ok(Self {
            handle: WorkerHandle {
                tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            thread: Some(thread),
        })
    }

    /// Returns a submission handle.
    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Stops accepting jobs, lets already queued jobs finish and joins the
    /// thread. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.handle.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.handle.tx.send(Job::Shutdown);

        if let Some(thread) = self.thread.take() {
            // A job that drops the last session handle ends up here on the
            // worker itself; joining would never return.
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
