use serde::{Deserialize, Serialize};

use crate::PING;

// ── Server → client ──────────────────────────────────────────────────────────

/// Handshake sent right after a session is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloFrame {
    pub version: String,
}

/// Answer to a client `"ping"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PongFrame {
    pub pong: String,
}

impl Default for PongFrame {
    fn default() -> Self {
        Self {
            pong: "pong".into(),
        }
    }
}

/// Sent once on an upgraded socket whose client key was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
}

// ── HTTP ─────────────────────────────────────────────────────────────────────

/// JSON body of every failed HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error_code: u16,
    pub description: String,
}

// ── Client → server ──────────────────────────────────────────────────────────

/// A decoded client text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Ping,
    /// Reply to the chat message (or user) identified by `target_id`.
    Reply { target_id: String, message: String },
}

impl ClientFrame {
    /// Decode a text frame. Never fails: anything that is not exactly
    /// `"ping"` is a reply, split on the first whitespace character.
    pub fn parse(text: &str) -> Self {
        if text == PING {
            return Self::Ping;
        }
        let (target_id, message) = match text.split_once(char::is_whitespace) {
            Some((target, rest)) => (target, rest),
            None => (text, ""),
        };
        Self::Reply {
            target_id: target_id.to_string(),
            message: message.to_string(),
        }
    }
}
