//! Twitch chat bridge.
//!
//! Owns the single IRC connection to Twitch chat. The gateway drives it
//! through the [`ChatBridge`] trait (join/part/reply) and consumes the
//! inbound [`ChatEvent`] stream returned by [`TwitchBridge::spawn`].
//!
//! The connection task never gives up: name-resolution failures back off for
//! five seconds, every other failure reconnects immediately, and the set of
//! joined channels is re-joined on each new connection.

pub mod bridge;
mod connection;
pub mod error;
pub mod event;
pub mod irc;

pub use {
    bridge::{ChatBridge, TwitchBridge, TwitchConfig},
    error::BridgeError,
    event::{ChatEvent, PrivateMessage, UserNoticeMessage},
};
