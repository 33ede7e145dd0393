/*!
 * Coroutine
 * Suspendable execution context with explicit switch-in/switch-out
 */

use log::trace;
use std::io;
use std::panic::{catch_unwind, panic_any, resume_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;

/// Signal sent by the scheduler into a parked coroutine.
enum Resume {
    Run,
    Cancel,
}

/// Signal sent by the coroutine back to the scheduler.
enum YieldBack {
    Suspended,
    Finished,
}

/// What the scheduler observes when control comes back from a switch-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The coroutine yielded at a suspension point
    Suspended,
    /// The coroutine's body returned
    Finished,
}

/// Private unwind payload used to tear down a cancelled coroutine.
struct Cancelled;

/// Handle given to a coroutine body for yielding control back.
///
/// Exactly one side of the channel pair is ever runnable: the scheduler
/// blocks in [`Coroutine::switch_in`] while the body runs, and the body
/// blocks in [`Yielder::suspend`] while the scheduler runs.
pub struct Yielder {
    yield_tx: flume::Sender<YieldBack>,
    resume_rx: flume::Receiver<Resume>,
}

impl Yielder {
    /// Yield control back to the scheduler. Returns when switched in
    /// again; unwinds without returning if the coroutine was cancelled.
    pub fn suspend(&self) {
        let _ = self.yield_tx.send(YieldBack::Suspended);
        match self.resume_rx.recv() {
            Ok(Resume::Run) => {}
            Ok(Resume::Cancel) | Err(_) => panic_any(Cancelled),
        }
    }
}

/// An OS thread gated so that it runs only between an explicit switch-in
/// and the next suspension point. Backs a process's `run` method.
pub struct Coroutine {
    resume_tx: flume::Sender<Resume>,
    yield_rx: flume::Receiver<YieldBack>,
    thread: Option<JoinHandle<()>>,
}

impl Coroutine {
    /// Create a coroutine for `body`. The thread starts parked; no user
    /// code runs until the first [`switch_in`](Self::switch_in).
    pub fn spawn<F>(name: String, body: F) -> io::Result<Self>
    where
        F: FnOnce(&Yielder) + Send + 'static,
    {
        let (resume_tx, resume_rx) = flume::bounded(1);
        let (yield_tx, yield_rx) = flume::bounded(1);

        let thread = std::thread::Builder::new().name(name).spawn(move || {
            // Park until the first switch-in; a cancel before that point
            // tears the coroutine down without running any user code.
            match resume_rx.recv() {
                Ok(Resume::Run) => {}
                Ok(Resume::Cancel) | Err(_) => return,
            }
            let yielder = Yielder {
                yield_tx,
                resume_rx,
            };
            match catch_unwind(AssertUnwindSafe(|| body(&yielder))) {
                Ok(()) => {
                    let _ = yielder.yield_tx.send(YieldBack::Finished);
                }
                Err(payload) => {
                    if payload.downcast_ref::<Cancelled>().is_some() {
                        trace!("coroutine cancelled at suspension point");
                    } else {
                        // User panic: re-raise so the scheduler's join
                        // observes it and aborts the run.
                        resume_unwind(payload);
                    }
                }
            }
        })?;

        Ok(Self {
            resume_tx,
            yield_rx,
            thread: Some(thread),
        })
    }

    /// Transfer control into the coroutine. Blocks until it suspends or
    /// its body returns. Propagates a panic raised inside the body.
    pub fn switch_in(&mut self) -> SwitchOutcome {
        if self.resume_tx.send(Resume::Run).is_err() {
            // Thread already gone: reap it to surface any panic.
            self.join();
            return SwitchOutcome::Finished;
        }
        match self.yield_rx.recv() {
            Ok(YieldBack::Suspended) => SwitchOutcome::Suspended,
            Ok(YieldBack::Finished) => {
                self.join();
                SwitchOutcome::Finished
            }
            Err(_) => {
                // Channel closed without a yield: the body panicked.
                self.join();
                SwitchOutcome::Finished
            }
        }
    }

    /// Tear down a suspended (or never-started) coroutine. No user code
    /// past the suspension point executes; destructors still run. Blocks
    /// until the thread has exited.
    pub fn cancel(mut self) {
        let _ = self.resume_tx.send(Resume::Cancel);
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            if let Err(payload) = handle.join() {
                resume_unwind(payload);
            }
        }
    }
}

impl Drop for Coroutine {
    fn drop(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = self.resume_tx.send(Resume::Cancel);
            // Swallow the result: drop must not double-panic.
            let _ = handle.join();
        }
    }
}
