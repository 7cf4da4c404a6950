//! Message-send surface (§4.13, §6).
//!
//! # Why
//! The shutdown core doesn't route messages, but every caller of the close
//! protocol also calls `send_cmd`/`send_data`/`send_video_frame`/
//! `send_audio_frame`, and all four share exactly one precondition this core
//! owns: reject once `is_closing` holds. Modeling that boundary here keeps
//! the rejection check in one place instead of duplicated across whatever
//! transport/codec crate eventually implements routing.
//!
//! # How
//! [`MessageSink`] is deliberately thin — a payload, an optional result
//! handler, and (for commands only) the `enable_multiple_results` flag from
//! §6. A concrete router implements [`MessageSink`] and delegates the
//! `is_closing` check to [`crate::engine::EngineHandle::reject_if_closing`].

use crate::error::SendError;

/// Per-call options for `send_cmd`; defaults match the spec (`false`).
#[derive(Clone, Copy, Debug, Default)]
pub struct SendCmdOptions {
    pub enable_multiple_results: bool,
}

/// Outcome handed to a message's result-handler callback once the transport
/// layer (out of scope for this core) settles the send.
pub enum SendOutcome<T> {
    Ok(T),
    Err(SendError),
}

/// A result-handler callback: `(result, user_data)`. `user_data` is an
/// opaque payload the caller supplied to the `send_*` call and gets back
/// unchanged, mirroring the C ABI's `(env, result, user_data, err)` shape
/// from §6 without needing an `env` parameter — in Rust the handler closure
/// already closes over anything it needs.
pub type ResultHandler<T, U> = Box<dyn FnOnce(SendOutcome<T>, U) + Send>;

/// The four message-send operations an engine exposes, parameterized over
/// the message and result types a concrete router defines. Every
/// implementation must perform the `is_closing` check first and reject
/// without invoking `handler` at all if it is set — see
/// [`crate::engine::EngineHandle::reject_if_closing`].
pub trait MessageSink<Msg, Ack, U> {
    fn send_cmd(
        &self,
        msg: Msg,
        options: SendCmdOptions,
        handler: Option<ResultHandler<Ack, U>>,
        user_data: U,
    ) -> Result<(), SendError>;

    fn send_data(
        &self,
        msg: Msg,
        handler: Option<ResultHandler<Ack, U>>,
        user_data: U,
    ) -> Result<(), SendError>;

    fn send_video_frame(
        &self,
        msg: Msg,
        handler: Option<ResultHandler<Ack, U>>,
        user_data: U,
    ) -> Result<(), SendError>;

    fn send_audio_frame(
        &self,
        msg: Msg,
        handler: Option<ResultHandler<Ack, U>>,
        user_data: U,
    ) -> Result<(), SendError>;
}
