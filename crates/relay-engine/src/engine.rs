//! The engine handle and its close protocol (§4.1, §4.4, §4.5).
//!
//! # Why
//! Every operation here is a direct translation of the distilled close
//! protocol: `close_async` hands a close request to the runloop from
//! whatever thread the caller is on; `close_task` is what actually runs on
//! that runloop; `could_be_close` decides, on every child-closed
//! notification, whether quiescence has been reached; `do_close` is the
//! one-shot terminal step. The translation keeps the shape of each function
//! but drops the manual refcount dance — an `EngineHandle` clone (an `Arc`
//! bump) posted into a closure already keeps the engine alive exactly as
//! long as the closure hasn't run, and dropping that closure (whether it
//! runs or the post is rejected) already releases it. See `DESIGN.md` for
//! the line-by-line mapping back to the original `close.c`.
//!
//! # How
//! [`EngineHandle`] is a cheap `Clone` wrapper around `Arc<EngineInner>`.
//! `EngineInner` holds the immutable configuration and runloop handle plus
//! one `parking_lot::Mutex<EngineState>` guarding everything the close
//! protocol mutates. The mutex exists to satisfy `Sync` for cross-thread
//! notification delivery, not to arbitrate real contention: invariant 1
//! (§3) confines every *mutation* to the runloop thread, enforced by
//! `check_integrity`'s `debug_assert!`.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, SendError};
use crate::ids::{RemoteKey, TimerId, WeakRemoteId};
use crate::registries::EngineState;
use crate::resources::{ExtensionContext, Remote, Timer};
use crate::runloop::{BorrowedRunloop, PostError, Runloop, ThreadRunloop};

/// Identifies which registry a `closed` notification targets (§4.3): a
/// promoted remote addresses itself by [`RemoteKey`], a weak one by
/// [`WeakRemoteId`].
#[derive(Clone, Debug)]
pub enum RemoteLocator {
    Promoted(RemoteKey),
    Weak(WeakRemoteId),
}

struct EngineInner {
    config: EngineConfig,
    runloop: Arc<dyn Runloop>,
    /// True when the engine spawned and owns `runloop`'s lifecycle
    /// (`ThreadRunloop`); false when it borrows a host-supplied loop
    /// (`BorrowedRunloop`), in which case `do_close` never calls
    /// `Runloop::stop` (§4.9).
    has_own_loop: bool,
    state: parking_lot::Mutex<EngineState>,
}

/// A cheaply-cloneable, thread-safe handle to one engine (§3, §4.1).
///
/// Every public method here may be called from any thread. Methods that
/// must actually run on the engine's runloop thread (insertion, the
/// `notify_*_closed` family) hop onto it themselves via `post_tail` when
/// called from elsewhere, matching §9's thread-confinement note.
#[derive(Clone)]
pub struct EngineHandle(Arc<EngineInner>);

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("id", self.0.config.id())
            .finish_non_exhaustive()
    }
}

impl EngineHandle {
    /// Build an engine that owns a dedicated runloop thread (§4.9, first
    /// bullet). `do_close` will stop that thread once quiescence is
    /// reached.
    pub fn with_own_runloop(config: EngineConfig) -> Self {
        let thread_name = format!("{}-runloop", config.id());
        if let Some(hint) = config.queue_capacity_hint() {
            debug!(engine = %config.id(), hint, "owned runloop queue capacity hint recorded (advisory only)");
        }
        let runloop = ThreadRunloop::spawn(thread_name);
        Self::new(config, runloop, true)
    }

    /// Build an engine that shares a host-supplied runloop (§4.9, second
    /// bullet). `do_close` never touches `runloop`'s lifecycle; the host
    /// owns it.
    pub fn with_borrowed_runloop(config: EngineConfig, runloop: Arc<dyn Runloop>) -> Self {
        let runloop: Arc<dyn Runloop> = Arc::new(BorrowedRunloop::new(runloop));
        Self::new(config, runloop, false)
    }

    fn new(config: EngineConfig, runloop: Arc<dyn Runloop>, has_own_loop: bool) -> Self {
        Self(Arc::new(EngineInner {
            config,
            runloop,
            has_own_loop,
            state: parking_lot::Mutex::new(EngineState::default()),
        }))
    }

    pub fn id(&self) -> &crate::ids::EngineId {
        self.0.config.id()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.0.config
    }

    /// True once `close_async`/`close_sync` has moved the engine into the
    /// closing state. Cheap to call from any thread.
    pub fn is_closing(&self) -> bool {
        self.0.state.lock().is_closing
    }

    /// Runloop-confinement assertion (§3 invariant 1, §9). A no-op when
    /// `require_runloop_thread` is false — that case exists only to mark,
    /// at the call site, which operations the distilled protocol treats as
    /// callable from any thread versus confined to the runloop.
    fn check_integrity(&self, require_runloop_thread: bool) {
        if require_runloop_thread {
            let on_runloop_thread = self.0.runloop.current_thread_is_this();
            if !on_runloop_thread {
                tracing::error!(
                    engine = %self.0.config.id(),
                    "contract violation: operation invoked off its runloop thread",
                );
            }
            debug_assert!(
                on_runloop_thread,
                "engine {} operation invoked off its runloop thread",
                self.0.config.id(),
            );
        }
    }

    // ---- pre-close registration (§4.3, invariant 4) ----------------------

    /// Register a timer the close protocol will drive through
    /// `stop_async`/`close_async`. Rejected (via `debug_assert!`, a contract
    /// violation, not a recoverable error) once the engine is closing.
    pub fn insert_timer(&self, timer: Arc<dyn Timer>) -> TimerId {
        self.check_integrity(true);
        let mut state = self.0.state.lock();
        debug_assert!(
            !state.is_closing,
            "engine {} rejected a timer insertion while closing",
            self.0.config.id(),
        );
        let id = state.ids.next_timer_id();
        state.timers.insert(id, timer);
        id
    }

    /// Register a promoted remote under `key`.
    pub fn insert_remote(&self, key: RemoteKey, remote: Arc<dyn Remote>) {
        self.check_integrity(true);
        let mut state = self.0.state.lock();
        debug_assert!(
            !state.is_closing,
            "engine {} rejected a remote insertion while closing",
            self.0.config.id(),
        );
        state.remotes.insert(key, remote);
    }

    /// Register a not-yet-promoted remote, returning the id it must use to
    /// identify itself in [`EngineHandle::notify_remote_closed`].
    pub fn insert_weak_remote(&self, remote: Arc<dyn Remote>) -> WeakRemoteId {
        self.check_integrity(true);
        let mut state = self.0.state.lock();
        debug_assert!(
            !state.is_closing,
            "engine {} rejected a weak remote insertion while closing",
            self.0.config.id(),
        );
        let id = state.ids.next_weak_remote_id();
        state.weak_remotes.insert(id, remote);
        id
    }

    /// Attach the engine's (at most one) extension context.
    pub fn set_extension_context(&self, context: Arc<dyn ExtensionContext>) {
        self.check_integrity(true);
        let mut state = self.0.state.lock();
        debug_assert!(
            !state.is_closing,
            "engine {} rejected an extension context while closing",
            self.0.config.id(),
        );
        state.extension_context.set(context);
    }

    /// Record that a background operation the close protocol must wait on
    /// has started (§9, resolved open question: a saturating counter, so
    /// unrelated tasks never clear each other's completion).
    pub fn begin_async_task(&self) {
        self.check_integrity(true);
        self.0.state.lock().async_tasks.begin();
    }

    /// Record that a background operation has finished. If the engine is
    /// already closing this may be the event that unblocks termination, so
    /// it re-checks quiescence exactly like a child `closed` notification.
    pub fn end_async_task(&self) {
        self.check_integrity(true);
        let should_check_close = {
            let mut state = self.0.state.lock();
            state.async_tasks.end();
            state.is_closing
        };
        if should_check_close {
            self.on_close();
        }
    }

    // ---- completion callback (§4.4) --------------------------------------

    /// Register the callback to invoke once the engine has fully closed.
    /// Rejected with [`EngineError::AlreadyClosing`] once `close_async`/
    /// `close_sync` has already moved the engine into the closing state —
    /// at that point there is no longer a window in which a newly
    /// registered callback is guaranteed to run before termination (§9,
    /// resolved open question).
    pub fn set_on_closed(
        &self,
        on_closed: impl FnOnce() + Send + 'static,
    ) -> Result<(), EngineError> {
        let mut state = self.0.state.lock();
        if state.is_closing {
            return Err(EngineError::AlreadyClosing {
                engine: self.0.config.id().clone(),
            });
        }
        state.on_closed = Some(Box::new(on_closed));
        Ok(())
    }

    // ---- close protocol (§4.4, §4.5) -------------------------------------

    /// Request that the engine close, from any thread (§4.4). Posts a close
    /// task onto the runloop; the `EngineHandle` clone captured in that task
    /// is the translation of the distilled protocol's "inc ref before
    /// enqueue" step (invariant 6) — it keeps the engine alive until the
    /// task runs, and dropping the clone (task ran, or the post failed) is
    /// the matching "dec ref".
    pub fn close_async(&self) {
        self.check_integrity(false);
        let task_handle = self.clone();
        if let Err(PostError::Stopped) = self
            .0
            .runloop
            .post_tail(Box::new(move || task_handle.close_task()))
        {
            let err = EngineError::PostFailed {
                engine: self.0.config.id().clone(),
                reason: "runloop already stopped",
            };
            warn!(engine = %self.0.config.id(), error = %err, code = err.code(), "close_async: close request dropped");
        }
    }

    /// The task `close_async` posts (§4.4 "close_task"). Runs on the
    /// runloop thread; a no-op if some other path already started closing
    /// this engine.
    fn close_task(self) {
        if self.is_closing() {
            debug!(engine = %self.0.config.id(), "close_task: already closing, dropping duplicate request");
            return;
        }
        self.close_sync();
    }

    /// Synchronously drive the engine into the closing state and request
    /// every live child to close (§4.5). Must run on the runloop thread;
    /// the only external entry point is [`EngineHandle::close_async`].
    fn close_sync(&self) {
        self.check_integrity(true);

        let (timers, extension_context, remotes, weak_remotes, nothing_to_do) = {
            let mut state = self.0.state.lock();
            if state.is_closing {
                return;
            }
            state.is_closing = true;
            let nothing_to_do = state.could_be_close();
            (
                state.timers.snapshot(),
                state.extension_context.snapshot(),
                state.remotes.snapshot(),
                state.weak_remotes.snapshot(),
                nothing_to_do,
            )
        };

        info!(engine = %self.0.config.id(), "close requested, requesting children to close");

        // Lock released above: a synchronous child `closed` callback
        // re-entering notify_*_closed must never deadlock on this mutex
        // (§9, "iteration over a snapshot").
        for (_, timer) in &timers {
            timer.stop_async();
            timer.close_async(self.clone());
        }
        if let Some(ctx) = &extension_context {
            ctx.close(self.clone());
        }
        for remote in &remotes {
            remote.close(self.clone());
        }
        for remote in &weak_remotes {
            remote.close(self.clone());
        }

        if nothing_to_do {
            self.on_close();
        }
    }

    /// Re-evaluate quiescence and terminate if reached (§4.5 `on_close`).
    /// Called after every child-closed notification and after the close
    /// request itself when there was nothing to wait on.
    fn on_close(&self) {
        self.check_integrity(true);
        let should_terminate = {
            let state = self.0.state.lock();
            if state.terminated {
                return;
            }
            state.could_be_close()
        };
        if !should_terminate {
            debug!(engine = %self.0.config.id(), "on_close: children still outstanding");
            return;
        }
        self.do_close();
    }

    /// The terminal step (§4.5 `do_close`): fire `on_closed` exactly once
    /// and, if the engine owns its runloop, stop it. Idempotent — guarded
    /// by `terminated` so a racing re-entry can never fire `on_closed`
    /// twice (P3).
    fn do_close(&self) {
        let on_closed = {
            let mut state = self.0.state.lock();
            if state.terminated {
                return;
            }
            state.terminated = true;
            state.on_closed.take()
        };

        info!(engine = %self.0.config.id(), "engine closed");

        if self.0.has_own_loop {
            self.0.runloop.stop(Box::new(move || {
                if let Some(cb) = on_closed {
                    cb();
                }
            }));
        } else if let Some(cb) = on_closed {
            cb();
        }
    }

    // ---- child-closed notifications (§4.6) -------------------------------

    /// A timer has finished closing. Callable from any thread; hops onto
    /// the runloop thread itself if necessary.
    pub fn notify_timer_closed(&self, id: TimerId) {
        if !self.0.runloop.current_thread_is_this() {
            self.hop_and_retry(move |h| h.notify_timer_closed(id));
            return;
        }
        self.check_integrity(true);
        let should_check_close = {
            let mut state = self.0.state.lock();
            state.timers.remove(id);
            state.is_closing
        };
        debug!(engine = %self.0.config.id(), timer = ?id, "timer closed");
        if should_check_close {
            self.on_close();
        }
    }

    /// A remote has finished closing, identified by how it was registered.
    pub fn notify_remote_closed(&self, locator: RemoteLocator) {
        if !self.0.runloop.current_thread_is_this() {
            self.hop_and_retry(move |h| h.notify_remote_closed(locator.clone()));
            return;
        }
        self.check_integrity(true);
        let should_check_close = {
            let mut state = self.0.state.lock();
            match &locator {
                RemoteLocator::Promoted(key) => {
                    state.remotes.remove(key);
                }
                RemoteLocator::Weak(id) => {
                    state.weak_remotes.remove(*id);
                }
            }
            state.is_closing
        };
        debug!(engine = %self.0.config.id(), "remote closed");
        if should_check_close {
            self.on_close();
        }
    }

    /// The extension context has finished closing.
    pub fn notify_extension_context_closed(&self) {
        if !self.0.runloop.current_thread_is_this() {
            self.hop_and_retry(|h| h.notify_extension_context_closed());
            return;
        }
        self.check_integrity(true);
        let should_check_close = {
            let mut state = self.0.state.lock();
            state.extension_context.take();
            state.is_closing
        };
        debug!(engine = %self.0.config.id(), "extension context closed");
        if should_check_close {
            self.on_close();
        }
    }

    /// Post `f(self.clone())` onto the runloop so a notification delivered
    /// from a foreign thread re-runs on the thread every registry mutation
    /// is confined to (§9, thread-confinement note). The cloned handle
    /// moved into the closure is the same "ref while enqueued" pattern as
    /// `close_async`.
    fn hop_and_retry(&self, f: impl FnOnce(&EngineHandle) + Send + 'static) {
        let handle = self.clone();
        if self.0.runloop.post_tail(Box::new(move || f(&handle))).is_err() {
            let err = EngineError::PostFailed {
                engine: self.0.config.id().clone(),
                reason: "runloop already stopped",
            };
            warn!(engine = %self.0.config.id(), error = %err, code = err.code(), "dropped a child-closed notification");
        }
    }

    // ---- message-send boundary (§4.13) -----------------------------------

    /// Shared precondition for `send_cmd`/`send_data`/`send_video_frame`/
    /// `send_audio_frame`: reject once the engine is closing.
    pub fn reject_if_closing(&self) -> Result<(), SendError> {
        if self.0.state.lock().is_closing {
            Err(SendError::Rejected {
                engine: self.0.config.id().clone(),
            })
        } else {
            Ok(())
        }
    }
}
