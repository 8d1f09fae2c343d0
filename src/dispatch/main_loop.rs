//! Main-thread task loop.
//!
//! Plays the role of the UI thread: commands are issued from it and every
//! session callback is delivered on it. Other threads talk to it only through
//! a cloneable [`MainHandle`].
//!
//! The loop is a tokio current-thread runtime with a [`LocalSet`]. Delayed
//! tasks are local timers that re-post their task once they fire, so every
//! task, immediate or delayed, runs from the same queue on the thread that
//! drives the loop.

use super::Task;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::LocalSet;
use tokio::time::{sleep_until, Instant};

enum Message {
    Run(Task),
    RunAt(Instant, Task),
    Quit,
}

/// Cloneable, thread-safe handle for posting work to a [`MainLoop`].
#[derive(Clone)]
pub struct MainHandle {
    tx: UnboundedSender<Message>,
}

impl MainHandle {
    /// Posts `task` to run on the main loop as soon as possible.
    ///
    /// Returns false if the loop no longer exists.
    pub fn post<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(Message::Run(Box::new(task))).is_ok()
    }

    /// Posts `task` to run on the main loop once `delay` has elapsed,
    /// measured from this call.
    pub fn post_delayed<F>(&self, delay: Duration, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let due = Instant::now() + delay;
        self.tx.send(Message::RunAt(due, Box::new(task))).is_ok()
    }

    /// Asks the loop to stop after the task it is currently running.
    pub fn quit(&self) {
        let _ = self.tx.send(Message::Quit);
    }
}

impl std::fmt::Debug for MainHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainHandle").finish_non_exhaustive()
    }
}

/// Queue state touched from inside the runtime.
struct Queue {
    tx: UnboundedSender<Message>,
    rx: UnboundedReceiver<Message>,
    delayed: Rc<Cell<usize>>,
    quit: bool,
}

impl Queue {
    /// Runs an immediate task or arms a timer for a delayed one. Returns
    /// whether a task ran.
    fn accept(&mut self, message: Message) -> bool {
        match message {
            Message::Run(task) => {
                task();
                true
            }
            Message::RunAt(due, task) => {
                let tx = self.tx.clone();
                let delayed = Rc::clone(&self.delayed);
                delayed.set(delayed.get() + 1);
                tokio::task::spawn_local(async move {
                    sleep_until(due).await;
                    delayed.set(delayed.get() - 1);
                    let _ = tx.send(Message::Run(task));
                });
                false
            }
            Message::Quit => {
                self.quit = true;
                false
            }
        }
    }

    /// Runs everything already queued, including what those tasks post.
    fn drain(&mut self) -> usize {
        let mut count = 0;
        while !self.quit {
            match self.rx.try_recv() {
                Ok(message) => {
                    if self.accept(message) {
                        count += 1;
                    }
                }
                Err(_) => break,
            }
        }
        count
    }

    /// Drains, then waits for the next message until `done` holds, the loop
    /// is quit, or `deadline` passes.
    async fn pump<F>(&mut self, deadline: Option<Instant>, mut done: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let mut timed_out = false;
        loop {
            self.drain();
            if self.quit {
                return false;
            }
            if done() {
                return true;
            }
            if timed_out {
                return false;
            }

            let next = match deadline {
                Some(deadline) => tokio::select! {
                    message = self.rx.recv() => message,
                    _ = sleep_until(deadline) => {
                        timed_out = true;
                        continue;
                    }
                },
                None => self.rx.recv().await,
            };
            match next {
                Some(message) => {
                    self.accept(message);
                }
                // Unreachable while `self.tx` is alive.
                None => self.quit = true,
            }
        }
    }
}

/// Single-threaded task loop with immediate and delayed tasks.
pub struct MainLoop {
    runtime: Runtime,
    local: LocalSet,
    queue: Queue,
}

impl MainLoop {
    /// Creates the loop and its current-thread runtime.
    pub fn new() -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_time().build()?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            runtime,
            local: LocalSet::new(),
            queue: Queue {
                tx,
                rx,
                delayed: Rc::new(Cell::new(0)),
                quit: false,
            },
        })
    }

    /// Returns a handle for posting tasks from any thread.
    pub fn handle(&self) -> MainHandle {
        MainHandle {
            tx: self.queue.tx.clone(),
        }
    }

    /// Returns true once [`MainHandle::quit`] has been observed.
    pub fn is_quit(&self) -> bool {
        self.queue.quit
    }

    /// Number of delayed tasks whose timer has not fired yet.
    pub fn pending_delayed(&self) -> usize {
        self.queue.delayed.get()
    }

    /// Runs every task that is ready now, including tasks those tasks post.
    ///
    /// Returns the number of tasks run.
    pub fn run_pending(&mut self) -> usize {
        let Self {
            runtime,
            local,
            queue,
        } = self;
        runtime.block_on(local.run_until(async {
            // One turn of the scheduler lets timers that are already due fire.
            tokio::task::yield_now().await;
            queue.drain()
        }))
    }

    /// Runs tasks until `done` returns true, the loop is quit, or `timeout`
    /// elapses. Returns whether `done` was satisfied.
    pub fn run_until<F>(&mut self, timeout: Duration, done: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let Self {
            runtime,
            local,
            queue,
        } = self;
        runtime.block_on(local.run_until(async {
            let deadline = Instant::now() + timeout;
            queue.pump(Some(deadline), done).await
        }))
    }

    /// Runs tasks for `duration`, or until the loop is quit.
    pub fn run_for(&mut self, duration: Duration) {
        self.run_until(duration, || false);
    }

    /// Runs tasks until the loop is quit.
    pub fn run(&mut self) {
        let Self {
            runtime,
            local,
            queue,
        } = self;
        runtime.block_on(local.run_until(queue.pump(None, || false)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_immediate_tasks_run_in_order() {
        let mut main = MainLoop::new().unwrap();
        let handle = main.handle();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..4 {
            let seen = Arc::clone(&seen);
            handle.post(move || seen.lock().unwrap().push(i));
        }

        assert_eq!(main.run_pending(), 4);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_follow_up_tasks_run_in_same_pass() {
        let mut main = MainLoop::new().unwrap();
        let handle = main.handle();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner = handle.clone();
        let outer_seen = Arc::clone(&seen);
        handle.post(move || {
            outer_seen.lock().unwrap().push("outer");
            let seen = Arc::clone(&outer_seen);
            inner.post(move || seen.lock().unwrap().push("inner"));
        });

        assert_eq!(main.run_pending(), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_delayed_tasks_wait_for_deadline() {
        let mut main = MainLoop::new().unwrap();
        let handle = main.handle();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let late = Arc::clone(&seen);
        handle.post_delayed(Duration::from_millis(60), move || late.lock().unwrap().push(2));
        let early = Arc::clone(&seen);
        handle.post_delayed(Duration::from_millis(20), move || early.lock().unwrap().push(1));

        assert_eq!(main.run_pending(), 0);
        assert_eq!(main.pending_delayed(), 2);

        let watch = Arc::clone(&seen);
        assert!(main.run_until(Duration::from_secs(2), || watch.lock().unwrap().len() == 2));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(main.pending_delayed(), 0);
    }

    #[test]
    fn test_delay_measured_from_post() {
        let mut main = MainLoop::new().unwrap();
        let handle = main.handle();
        let fired = Arc::new(Mutex::new(None));

        let posted = std::time::Instant::now();
        let slot = Arc::clone(&fired);
        handle.post_delayed(Duration::from_millis(40), move || {
            *slot.lock().unwrap() = Some(posted.elapsed());
        });
        // The loop is not running while the delay elapses.
        std::thread::sleep(Duration::from_millis(60));

        let watch = Arc::clone(&fired);
        assert!(main.run_until(Duration::from_secs(2), || watch.lock().unwrap().is_some()));
        let elapsed = fired.lock().unwrap().unwrap();
        assert!(elapsed >= Duration::from_millis(40));
        assert!(elapsed < Duration::from_millis(1000));
    }

    #[test]
    fn test_tasks_run_on_loop_thread() {
        let mut main = MainLoop::new().unwrap();
        let handle = main.handle();
        let ran_on = Arc::new(Mutex::new(Vec::new()));

        let remote = handle.clone();
        let seen = Arc::clone(&ran_on);
        std::thread::spawn(move || {
            let now = Arc::clone(&seen);
            remote.post(move || now.lock().unwrap().push(std::thread::current().id()));
            let later = Arc::clone(&seen);
            remote.post_delayed(Duration::from_millis(10), move || {
                later.lock().unwrap().push(std::thread::current().id())
            });
        });

        let watch = Arc::clone(&ran_on);
        assert!(main.run_until(Duration::from_secs(2), || watch.lock().unwrap().len() == 2));
        let me = std::thread::current().id();
        assert!(ran_on.lock().unwrap().iter().all(|id| *id == me));
    }

    #[test]
    fn test_quit_from_other_thread() {
        let mut main = MainLoop::new().unwrap();
        let handle = main.handle();

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            handle.quit();
        });

        main.run();
        assert!(main.is_quit());
    }

    #[test]
    fn test_run_until_times_out() {
        let mut main = MainLoop::new().unwrap();
        let start = std::time::Instant::now();
        assert!(!main.run_until(Duration::from_millis(30), || false));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
