//! Asynchronous close protocol and runloop-confined lifecycle for
//! message-routing engines.
//!
//! # Why
//! An engine (§3) multiplexes timers, remote connections, and an
//! extension context, all of which may need to unwind asynchronously
//! before the engine itself can disappear. This crate is the coordinator
//! that drives that unwind: request every live child to close, track which
//! ones have, and fire a single completion callback once none remain.
//!
//! # How
//! [`engine::EngineHandle`] is the entry point. Build one with
//! [`engine::EngineHandle::with_own_runloop`] (dedicated thread) or
//! [`engine::EngineHandle::with_borrowed_runloop`] (host-supplied
//! [`runloop::Runloop`]), register timers/remotes/extension context and an
//! `on_closed` callback, then call [`engine::EngineHandle::close_async`]
//! from any thread to begin shutdown. See `DESIGN.md` for how each piece
//! maps back to the originating close protocol.
#![deny(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod ids;
pub mod resources;
pub mod runloop;
pub mod send;

mod registries;

#[cfg(any(test, feature = "test-util"))]
pub mod testkit;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::{EngineHandle, RemoteLocator};
pub use error::{EngineError, SendError};
pub use ids::{EngineId, RemoteKey, TimerId, WeakRemoteId};
pub use resources::{ExtensionContext, Remote, Timer};
pub use runloop::{BorrowedRunloop, PostError, Runloop, ThreadRunloop};
pub use send::{MessageSink, ResultHandler, SendCmdOptions, SendOutcome};
