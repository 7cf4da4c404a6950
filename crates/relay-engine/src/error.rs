//! Error taxonomy for the engine shutdown coordinator.
//!
//! # Why
//! The coordinator distinguishes three error kinds that a caller can actually
//! observe: a runloop that has already stopped accepting work, a completion
//! callback registered too late, and a message rejected because the engine is
//! closing. Everything else (contract violations such as calling a
//! runloop-confined method off the runloop thread) is a caller bug and is
//! reported via `debug_assert!` rather than this enum — see
//! [`crate::engine::Engine::check_integrity`].
use crate::ids::EngineId;

/// Errors surfaced at the engine's outer boundary.
///
/// None of these ever abort an in-flight close: `close_async` and the
/// `notify_*_closed` family construct [`EngineError::PostFailed`] only to
/// format it into a log line, never to return it, and `AlreadyClosing` is
/// the one variant returned directly to a caller who can decide how to
/// react.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The engine's runloop refused a posted task, almost always because it
    /// has already been stopped by a prior close.
    #[error("engine {engine} runloop rejected a posted task: {reason}")]
    PostFailed {
        engine: EngineId,
        reason: &'static str,
    },

    /// `set_on_closed` was called after `close_async` had already moved the
    /// engine into the closing state.
    #[error("engine {engine} is already closing, refusing new on_closed registration")]
    AlreadyClosing { engine: EngineId },
}

impl EngineError {
    /// Stable machine-readable tag, for log aggregation and metrics without
    /// parsing [`fmt::Display`] output.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::PostFailed { .. } => "engine.post_failed",
            EngineError::AlreadyClosing { .. } => "engine.already_closing",
        }
    }
}

/// The message-send surface's error type (§4.13). Kept distinct from
/// [`EngineError`] because a send rejection is a routine, expected outcome on
/// a closing engine rather than a coordinator-level fault, but it reuses the
/// same `Rejected` shape for consistency.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum SendError {
    #[error("engine {engine} is closing, message rejected")]
    Rejected { engine: EngineId },
}
