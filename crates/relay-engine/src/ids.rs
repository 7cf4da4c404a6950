//! Stable identifiers used for diagnostics and registry addressing.
//!
//! None of these types carry behavior beyond equality, hashing, and display —
//! they exist so log lines and test assertions can name a specific engine,
//! timer, or weak remote without reaching for pointer identity.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable identifier for an [`crate::engine::Engine`], supplied by the host
/// or generated from an internal counter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EngineId(pub(crate) Cow<'static, str>);

impl EngineId {
    /// Wrap a caller-supplied identifier (e.g. from the app's engine
    /// registry) rather than generating one.
    pub fn new(id: impl Into<Cow<'static, str>>) -> Self {
        Self(id.into())
    }

    /// Generate a process-unique id of the form `engine-<n>`, for engines the
    /// host does not name explicitly.
    pub fn generate() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        Self(Cow::Owned(format!("engine-{n}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry key for a timer, assigned when it is inserted into
/// [`crate::registries::TimerRegistry`]. Opaque to callers; only used to
/// address removal from a `closed` notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Registry key for a weak (not-yet-promoted) remote, assigned when it is
/// inserted into [`crate::registries::WeakRemoteList`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WeakRemoteId(u64);

/// Key under which a promoted remote is stored in
/// [`crate::registries::RemoteTable`]. Remotes are keyed by the repository's
/// own notion of peer identity (e.g. a URI or connection id); the core is
/// agnostic to its shape beyond `Eq + Hash + Clone`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemoteKey(Cow<'static, str>);

impl RemoteKey {
    pub fn new(key: impl Into<Cow<'static, str>>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monotonic generator for [`TimerId`] and [`WeakRemoteId`] values, scoped to
/// a single engine (not process-global) so ids stay small and readable in
/// logs.
#[derive(Debug, Default)]
pub(crate) struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub(crate) fn next_timer_id(&mut self) -> TimerId {
        let id = self.next;
        self.next += 1;
        TimerId(id)
    }

    pub(crate) fn next_weak_remote_id(&mut self) -> WeakRemoteId {
        let id = self.next;
        self.next += 1;
        WeakRemoteId(id)
    }
}
