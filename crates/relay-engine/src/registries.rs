//! Resource registries (§3, §4.3).
//!
//! # Why
//! These four containers are the entire state the close protocol reasons
//! about. They are plain, non-thread-safe collections — [`crate::engine`]
//! is the only module that touches them, always from behind a
//! runloop-confinement check, so there is nothing to gain from a
//! concurrent map here. Reaching for `dashmap` the way the surrounding
//! codebase does for genuinely shared tables would suggest a level of
//! concurrent access these registries never see (see `DESIGN.md`).
//!
//! # How
//! [`TimerRegistry`] and [`WeakRemoteList`] preserve insertion order, per
//! §4.3; [`RemoteTable`] does not promise an order. All three expose
//! insertion, size, iteration-for-closing, and removal-by-id; removal is the
//! only mutation a child's `closed` callback performs.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ids::{IdGenerator, RemoteKey, TimerId, WeakRemoteId};
use crate::resources::{ExtensionContext, Remote, Timer};

/// Ordered sequence of live timers, keyed by an engine-assigned [`TimerId`]
/// so a `closed` callback can remove exactly the timer that fired it.
///
/// Entries are `Arc`, not `Box`: the close driver snapshots the current
/// entries (cloning the `Arc`s) and releases the registry lock *before*
/// requesting any child to close, so a child whose `close`/`close_async`
/// implementation calls back synchronously never re-enters a held lock
/// (§9, "iteration over a snapshot").
#[derive(Default)]
pub(crate) struct TimerRegistry {
    entries: Vec<(TimerId, Arc<dyn Timer>)>,
}

impl TimerRegistry {
    pub(crate) fn insert(&mut self, id: TimerId, timer: Arc<dyn Timer>) {
        self.entries.push((id, timer));
    }

    pub(crate) fn remove(&mut self, id: TimerId) -> Option<Arc<dyn Timer>> {
        let pos = self.entries.iter().position(|(entry_id, _)| *entry_id == id)?;
        Some(self.entries.remove(pos).1)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn snapshot(&self) -> Vec<(TimerId, Arc<dyn Timer>)> {
        self.entries.clone()
    }
}

/// Keyed table of promoted remotes.
#[derive(Default)]
pub(crate) struct RemoteTable {
    entries: HashMap<RemoteKey, Arc<dyn Remote>>,
}

impl RemoteTable {
    pub(crate) fn insert(&mut self, key: RemoteKey, remote: Arc<dyn Remote>) {
        self.entries.insert(key, remote);
    }

    pub(crate) fn remove(&mut self, key: &RemoteKey) -> Option<Arc<dyn Remote>> {
        self.entries.remove(key)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn Remote>> {
        self.entries.values().cloned().collect()
    }
}

/// Ordered sequence of remotes not yet promoted into [`RemoteTable`].
#[derive(Default)]
pub(crate) struct WeakRemoteList {
    entries: Vec<(WeakRemoteId, Arc<dyn Remote>)>,
}

impl WeakRemoteList {
    pub(crate) fn insert(&mut self, id: WeakRemoteId, remote: Arc<dyn Remote>) {
        self.entries.push((id, remote));
    }

    pub(crate) fn remove(&mut self, id: WeakRemoteId) -> Option<Arc<dyn Remote>> {
        let pos = self.entries.iter().position(|(entry_id, _)| *entry_id == id)?;
        Some(self.entries.remove(pos).1)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn Remote>> {
        self.entries.iter().map(|(_, r)| Arc::clone(r)).collect()
    }
}

/// At-most-one owned extension-context.
#[derive(Default)]
pub(crate) struct ExtensionSlot {
    context: Option<Arc<dyn ExtensionContext>>,
}

impl ExtensionSlot {
    pub(crate) fn set(&mut self, context: Arc<dyn ExtensionContext>) {
        self.context = Some(context);
    }

    pub(crate) fn take(&mut self) -> Option<Arc<dyn ExtensionContext>> {
        self.context.take()
    }

    pub(crate) fn is_present(&self) -> bool {
        self.context.is_some()
    }

    pub(crate) fn snapshot(&self) -> Option<Arc<dyn ExtensionContext>> {
        self.context.clone()
    }
}

/// Saturating counter for in-flight background operations (§9, resolved
/// open question: a counter rather than a single flag, so unrelated async
/// tasks don't clear each other's bit).
#[derive(Default)]
pub(crate) struct AsyncTaskCounter {
    count: u64,
}

impl AsyncTaskCounter {
    pub(crate) fn begin(&mut self) {
        self.count += 1;
    }

    pub(crate) fn end(&mut self) {
        self.count = self.count.saturating_sub(1);
    }

    pub(crate) fn is_outstanding(&self) -> bool {
        self.count > 0
    }
}

/// Bundles the registries plus the id generator that assigns [`TimerId`]s
/// and [`WeakRemoteId`]s on insertion, and the `is_closing`/completion state
/// the close protocol drives. Everything here is runloop-confined (§3
/// invariant 1); see `DESIGN.md` for why a plain (non-atomic) struct behind
/// one `parking_lot::Mutex` is the right shape.
#[derive(Default)]
pub(crate) struct EngineState {
    pub(crate) is_closing: bool,
    pub(crate) timers: TimerRegistry,
    pub(crate) remotes: RemoteTable,
    pub(crate) weak_remotes: WeakRemoteList,
    pub(crate) extension_context: ExtensionSlot,
    pub(crate) async_tasks: AsyncTaskCounter,
    pub(crate) ids: IdGenerator,
    pub(crate) on_closed: Option<Box<dyn FnOnce() + Send>>,
    pub(crate) terminated: bool,
}

impl EngineState {
    /// Pure predicate (§4.5 `could_be_close`): true iff every registry is
    /// empty/absent and no async task is outstanding.
    pub(crate) fn could_be_close(&self) -> bool {
        self.timers.is_empty()
            && self.remotes.is_empty()
            && self.weak_remotes.is_empty()
            && !self.extension_context.is_present()
            && !self.async_tasks.is_outstanding()
    }
}
