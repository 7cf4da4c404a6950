//! Trait surface for the three child-resource kinds the coordinator manages.
//!
//! # Why
//! The close protocol (§4.5) only ever *requests* a child to wind down; it
//! never waits synchronously and never inspects internal child state beyond
//! "has it told me it's closed yet". These traits capture exactly that much
//! and nothing about timer scheduling, remote wire protocols, or extension
//! loading — those live in implementation crates (see `relay-transport-tcp`
//! for a concrete [`Remote`]).
//!
//! # How
//! Every method here must return without blocking; the corresponding
//! `notify_*_closed` call on [`crate::engine::EngineHandle`] is how an
//! implementation reports completion, and it may be called from any thread —
//! the engine takes care of hopping back onto its own runloop thread before
//! touching any registry (§9, thread-confinement note).

use crate::engine::EngineHandle;

/// A timer the engine owns. The close protocol always calls
/// [`Timer::stop_async`] before [`Timer::close_async`], matching the
/// distilled spec's "stop-then-close" sequencing for timers specifically
/// (remotes and extension contexts only get a single `close` request).
pub trait Timer: Send + Sync {
    /// Request that the timer stop firing. Must not block; must not assume
    /// the timer has already stopped when this returns.
    fn stop_async(&self);

    /// Request that the timer release its resources. Once the timer has
    /// fully closed it must call
    /// [`EngineHandle::notify_timer_closed`] exactly once.
    fn close_async(&self, engine: EngineHandle);
}

/// A connection to a peer engine or app. Whether a given remote is
/// *promoted* (kept in the keyed table) or *weak* (kept in the
/// insertion-ordered list) is decided by the engine at insertion time
/// (`EngineHandle::insert_remote` vs. `insert_weak_remote`), not by the
/// remote itself — see [`crate::registries`].
pub trait Remote: Send + Sync {
    /// Request that the remote close. Must not block. Once fully closed, the
    /// remote must call [`EngineHandle::notify_remote_closed`] exactly once,
    /// identifying itself the same way it was registered (by
    /// [`crate::ids::RemoteKey`] for a promoted remote, by
    /// [`crate::ids::WeakRemoteId`] for a weak one).
    fn close(&self, engine: EngineHandle);
}

/// The container that holds user-defined extensions for an engine. At most
/// one is present at a time (§3).
pub trait ExtensionContext: Send + Sync {
    /// Request that the extension context close. Must not block. Once fully
    /// closed it must call
    /// [`EngineHandle::notify_extension_context_closed`] exactly once.
    fn close(&self, engine: EngineHandle);
}
