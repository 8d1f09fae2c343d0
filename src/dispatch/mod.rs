//! Threads the session runs on: the main loop that receives every callback,
//! and the single background worker that performs camera I/O.

mod main_loop;
mod worker;

pub use main_loop::{MainHandle, MainLoop};
pub use worker::{Worker, WorkerError, WorkerHandle};

/// A unit of work posted to the main loop or the worker.
pub type Task = Box<dyn FnOnce() + Send + 'static>;
