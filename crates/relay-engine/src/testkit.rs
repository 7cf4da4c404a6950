//! In-tree test doubles (§4.14).
//!
//! # Why
//! Exercising the close protocol against real timers, remotes, and OS
//! threads would make the scenario tests in `tests/` slow and racy. These
//! doubles let a test drive every interesting sequencing — synchronous
//! `closed` callbacks, deferred ones, multiple children closing out of
//! order — deterministically from a single thread.
//!
//! # How
//! Each fake records whether `stop_async`/`close`/`close_async` ran and,
//! depending on `auto_notify`, either calls the matching `notify_*_closed`
//! immediately (simulating a child that closes synchronously) or stashes
//! the `EngineHandle` for the test to finish later via `finish_close`
//! (simulating a child that closes asynchronously). [`InlineRunloop`] runs
//! posted tasks immediately on the calling thread, so `current_thread_is_this`
//! is always true and every close_async/notify_* call in a test using it
//! takes effect synchronously.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::engine::{EngineHandle, RemoteLocator};
use crate::ids::TimerId;
use crate::resources::{ExtensionContext, Remote, Timer};
use crate::runloop::{PostError, Runloop};

/// A [`Runloop`] that has no dedicated thread: `post_tail` runs its task
/// immediately, inline, on whatever thread calls it. Suitable only for
/// single-threaded tests that never need real cross-thread hand-off.
#[derive(Default)]
pub struct InlineRunloop {
    stopped: AtomicBool,
}

impl InlineRunloop {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Runloop for InlineRunloop {
    fn post_tail(&self, task: Box<dyn FnOnce() + Send>) -> Result<(), PostError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(PostError::Stopped);
        }
        task();
        Ok(())
    }

    fn current_thread_is_this(&self) -> bool {
        true
    }

    fn stop(&self, on_stopped: Box<dyn FnOnce() + Send>) {
        self.stopped.store(true, Ordering::Release);
        on_stopped();
    }
}

/// A fake [`Timer`]. Construct with `auto_notify = true` to have
/// `close_async` report completion immediately, or `false` to report it
/// later via [`FakeTimer::finish_close`].
#[derive(Default)]
pub struct FakeTimer {
    id: OnceLock<TimerId>,
    stop_called: AtomicBool,
    close_called: AtomicBool,
    auto_notify: bool,
    pending: Mutex<Option<EngineHandle>>,
}

impl FakeTimer {
    pub fn new(auto_notify: bool) -> Arc<Self> {
        Arc::new(Self {
            auto_notify,
            ..Self::default()
        })
    }

    /// Must be called with the id `EngineHandle::insert_timer` returned,
    /// before the close protocol can reach this timer.
    pub fn set_id(&self, id: TimerId) {
        self.id.set(id).ok();
    }

    pub fn stop_called(&self) -> bool {
        self.stop_called.load(Ordering::Acquire)
    }

    pub fn close_called(&self) -> bool {
        self.close_called.load(Ordering::Acquire)
    }

    /// Complete a deferred (`auto_notify = false`) close.
    pub fn finish_close(&self) {
        let engine = self
            .pending
            .lock()
            .take()
            .expect("finish_close called before close_async");
        let id = *self.id.get().expect("set_id was never called");
        engine.notify_timer_closed(id);
    }
}

impl Timer for FakeTimer {
    fn stop_async(&self) {
        self.stop_called.store(true, Ordering::Release);
    }

    fn close_async(&self, engine: EngineHandle) {
        self.close_called.store(true, Ordering::Release);
        if self.auto_notify {
            let id = *self.id.get().expect("set_id was never called");
            engine.notify_timer_closed(id);
        } else {
            *self.pending.lock() = Some(engine);
        }
    }
}

/// A fake [`Remote`]. `locator` must be set to whichever [`RemoteLocator`]
/// matches how the test inserted it (promoted vs. weak) before the close
/// protocol reaches this remote.
#[derive(Default)]
pub struct FakeRemote {
    locator: OnceLock<RemoteLocator>,
    close_called: AtomicBool,
    auto_notify: bool,
    pending: Mutex<Option<EngineHandle>>,
}

impl FakeRemote {
    pub fn new(auto_notify: bool) -> Arc<Self> {
        Arc::new(Self {
            auto_notify,
            ..Self::default()
        })
    }

    pub fn set_locator(&self, locator: RemoteLocator) {
        self.locator.set(locator).ok();
    }

    pub fn close_called(&self) -> bool {
        self.close_called.load(Ordering::Acquire)
    }

    pub fn finish_close(&self) {
        let engine = self
            .pending
            .lock()
            .take()
            .expect("finish_close called before close");
        let locator = self.locator.get().expect("set_locator was never called");
        engine.notify_remote_closed(locator.clone());
    }
}

impl Remote for FakeRemote {
    fn close(&self, engine: EngineHandle) {
        self.close_called.store(true, Ordering::Release);
        if self.auto_notify {
            let locator = self.locator.get().expect("set_locator was never called");
            engine.notify_remote_closed(locator.clone());
        } else {
            *self.pending.lock() = Some(engine);
        }
    }
}

/// A fake [`ExtensionContext`]. Unlike timers and remotes there is at most
/// one per engine and no id to assign, so construction alone is enough.
#[derive(Default)]
pub struct FakeExtensionContext {
    close_called: AtomicBool,
    auto_notify: bool,
    pending: Mutex<Option<EngineHandle>>,
}

impl FakeExtensionContext {
    pub fn new(auto_notify: bool) -> Arc<Self> {
        Arc::new(Self {
            auto_notify,
            ..Self::default()
        })
    }

    pub fn close_called(&self) -> bool {
        self.close_called.load(Ordering::Acquire)
    }

    pub fn finish_close(&self) {
        let engine = self
            .pending
            .lock()
            .take()
            .expect("finish_close called before close");
        engine.notify_extension_context_closed();
    }
}

impl ExtensionContext for FakeExtensionContext {
    fn close(&self, engine: EngineHandle) {
        self.close_called.store(true, Ordering::Release);
        if self.auto_notify {
            engine.notify_extension_context_closed();
        } else {
            *self.pending.lock() = Some(engine);
        }
    }
}
