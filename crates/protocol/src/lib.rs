//! Wire types shared by the gateway, the chat bridge and the key store.
//!
//! Clients speak a tiny text protocol over the WebSocket:
//! - client → server: `"ping"` or `"<replyTargetID> <message>"`
//! - server → client: `{"version"}`, `{"pong":"pong"}`, `{"error"}`, or a raw
//!   chat event object.

pub mod channel;
pub mod frames;

pub use {
    channel::ChannelName,
    frames::{ClientFrame, ErrorBody, ErrorFrame, HelloFrame, PongFrame},
};

/// Literal text frame a client sends to check liveness.
pub const PING: &str = "ping";

/// How long an unauthorized WebSocket is held open after the error frame.
pub const UNAUTHORIZED_GRACE_MS: u64 = 2_000;

/// Length of generated client keys.
pub const CLIENT_KEY_LEN: usize = 10;
