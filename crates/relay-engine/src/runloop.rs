//! Runloop task adaptor (§4.2) and its two concrete flavors (§4.9).
//!
//! # Why
//! The close protocol is written against the [`Runloop`] trait, not a
//! specific executor, so the same `Engine` code works whether the engine
//! owns a dedicated OS thread or shares a runloop supplied by a host (e.g. a
//! process that multiplexes several engines onto one thread, or a
//! deterministic test double).
//!
//! # How
//! [`ThreadRunloop`] is the owned flavor: one OS thread draining an
//! unbounded FIFO channel of boxed closures until a `Stop` job runs, at which
//! point it invokes the caller's `on_stopped` hook from that same thread
//! (still satisfying the "runloop thread" requirement for the terminal
//! callback) and exits. [`BorrowedRunloop`] wraps a host-supplied
//! `Arc<dyn Runloop>` without taking ownership of its lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Why a post was rejected. The only case the core currently produces is
/// `Stopped`; the variant is `#[non_exhaustive]` so a future runloop
/// implementation (bounded queue, backpressure) can add a case without
/// breaking downstream matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PostError {
    /// The runloop has already been stopped (or is mid-stop) and will never
    /// run this task.
    Stopped,
}

/// A single-threaded FIFO task executor (§4.2).
///
/// Implementations must guarantee: tasks accepted by `post_tail` run in the
/// order accepted, strictly serially, on one thread; `current_thread_is_this`
/// answers correctly from any thread without blocking.
pub trait Runloop: Send + Sync {
    /// Append `task` to the tail of the queue. Returns
    /// [`PostError::Stopped`] once the runloop will never run another task.
    fn post_tail(&self, task: Box<dyn FnOnce() + Send>) -> Result<(), PostError>;

    /// True iff the calling thread is the thread this runloop drains tasks
    /// on. Used by [`crate::engine::Engine::check_integrity`].
    fn current_thread_is_this(&self) -> bool;

    /// Request that the runloop stop after its currently queued tasks drain,
    /// then invoke `on_stopped` from the runloop thread. A runloop that is
    /// never "owned" by anything (see [`BorrowedRunloop`]) may treat this as
    /// an immediate, synchronous callback instead.
    fn stop(&self, on_stopped: Box<dyn FnOnce() + Send>);
}

enum Job {
    Task(Box<dyn FnOnce() + Send>),
    Stop(Box<dyn FnOnce() + Send>),
}

/// The owned, dedicated-thread runloop (§4.9, first bullet).
pub struct ThreadRunloop {
    sender: mpsc::Sender<Job>,
    thread_id: ThreadId,
    stopped: AtomicBool,
    join_handle: parking_lot::Mutex<Option<thread::JoinHandle<()>>>,
}

impl ThreadRunloop {
    /// Spawn the dedicated thread and block until it reports its
    /// [`ThreadId`], so `current_thread_is_this` is correct the moment this
    /// call returns.
    pub fn spawn(name: impl Into<String>) -> Arc<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::channel::<ThreadId>();
        let name = name.into();

        let join_handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _ = ready_tx.send(thread::current().id());
                for job in job_rx {
                    match job {
                        Job::Task(f) => f(),
                        Job::Stop(on_stopped) => {
                            on_stopped();
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn runloop thread");

        let thread_id = ready_rx
            .recv()
            .expect("runloop thread died before reporting readiness");

        Arc::new(Self {
            sender: job_tx,
            thread_id,
            stopped: AtomicBool::new(false),
            join_handle: parking_lot::Mutex::new(Some(join_handle)),
        })
    }
}

impl Runloop for ThreadRunloop {
    fn post_tail(&self, task: Box<dyn FnOnce() + Send>) -> Result<(), PostError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(PostError::Stopped);
        }
        self.sender
            .send(Job::Task(task))
            .map_err(|_| PostError::Stopped)
    }

    fn current_thread_is_this(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    fn stop(&self, on_stopped: Box<dyn FnOnce() + Send>) {
        self.stopped.store(true, Ordering::Release);
        if self.sender.send(Job::Stop(on_stopped)).is_err() {
            // Thread already gone (e.g. panicked); nothing left to notify.
            tracing::warn!("runloop thread unreachable while stopping");
        }
    }
}

impl Drop for ThreadRunloop {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.lock().take() {
            if !self.stopped.swap(true, Ordering::AcqRel) {
                let _ = self.sender.send(Job::Stop(Box::new(|| {})));
            }
            let _ = handle.join();
        }
    }
}

/// Adapts a host-supplied `Arc<dyn Runloop>` for an engine that does not own
/// its event loop (`has_own_loop = false`, §4.9 second bullet). `stop` never
/// touches the inner runloop — the host is responsible for its lifecycle —
/// it just runs `on_stopped` inline, matching [`crate::engine`]'s
/// `do_close`, which only calls `Runloop::stop` when the engine owns the
/// loop.
pub struct BorrowedRunloop {
    inner: Arc<dyn Runloop>,
}

impl BorrowedRunloop {
    pub fn new(inner: Arc<dyn Runloop>) -> Self {
        Self { inner }
    }
}

impl Runloop for BorrowedRunloop {
    fn post_tail(&self, task: Box<dyn FnOnce() + Send>) -> Result<(), PostError> {
        self.inner.post_tail(task)
    }

    fn current_thread_is_this(&self) -> bool {
        self.inner.current_thread_is_this()
    }

    fn stop(&self, on_stopped: Box<dyn FnOnce() + Send>) {
        on_stopped();
    }
}
