use {
    chatbridge_protocol::ChannelName,
    secrecy::SecretString,
    tokio::sync::mpsc,
    tracing::debug,
};

use crate::{connection, error::BridgeError, event::ChatEvent};

/// Capacity of the inbound event queue handed to the gateway.
pub const EVENT_BUFFER: usize = 256;

/// Outbound side of the chat network as seen by the gateway.
///
/// Calls never block on the network: they are queued for the connection
/// task and applied in order once a connection is up.
pub trait ChatBridge: Send + Sync {
    /// Subscribe to `channel`. Kept across reconnects until parted.
    fn join(&self, channel: &ChannelName) -> Result<(), BridgeError>;

    fn part(&self, channel: &ChannelName) -> Result<(), BridgeError>;

    /// Post `text` into `channel` as a threaded reply to `parent_id`.
    fn reply(&self, channel: &ChannelName, parent_id: &str, text: &str) -> Result<(), BridgeError>;
}

#[derive(Debug, Clone)]
pub struct TwitchConfig {
    /// `host:port` of the IRC endpoint.
    pub server: String,
    pub tls: bool,
    pub username: String,
    /// Full `PASS` argument, `oauth:` prefix included.
    pub pass: SecretString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Join(ChannelName),
    Part(ChannelName),
    Reply {
        channel: ChannelName,
        parent_id: String,
        text: String,
    },
}

/// Handle to the background Twitch connection.
///
/// Cloning is cheap; the connection task stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct TwitchBridge {
    commands: mpsc::UnboundedSender<Command>,
}

impl TwitchBridge {
    /// Start the connection task. Must be called inside a tokio runtime.
    pub fn spawn(config: TwitchConfig) -> (Self, mpsc::Receiver<ChatEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(connection::run(config, cmd_rx, event_tx));
        (Self { commands: cmd_tx }, event_rx)
    }

    fn send(&self, command: Command) -> Result<(), BridgeError> {
        debug!(?command, "queueing chat command");
        self.commands
            .send(command)
            .map_err(|_| BridgeError::Unavailable)
    }
}

impl ChatBridge for TwitchBridge {
    fn join(&self, channel: &ChannelName) -> Result<(), BridgeError> {
        self.send(Command::Join(channel.clone()))
    }

    fn part(&self, channel: &ChannelName) -> Result<(), BridgeError> {
        self.send(Command::Part(channel.clone()))
    }

    fn reply(&self, channel: &ChannelName, parent_id: &str, text: &str) -> Result<(), BridgeError> {
        self.send(Command::Reply {
            channel: channel.clone(),
            parent_id: parent_id.to_string(),
            text: text.to_string(),
        })
    }
}
