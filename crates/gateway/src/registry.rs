//! Channel → session table, owned by a single control task.
//!
//! Nothing else touches the table: handlers, sessions and the chat forwarder
//! send [`Control`] messages through a [`Registry`] handle and the loop
//! applies them strictly in arrival order.

use std::{collections::HashMap, sync::Arc};

use {
    chatbridge_protocol::{ChannelName, HelloFrame},
    chatbridge_twitch::ChatBridge,
    serde::Serialize,
    tokio::sync::{mpsc, oneshot},
    tracing::{debug, info, warn},
};

use crate::session::SessionHandle;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no session registered for channel {0}")]
    NoSuchChannel(ChannelName),

    #[error("session for channel {0} is no longer writable")]
    SessionGone(ChannelName),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("registry task is not running")]
    Stopped,
}

enum Control {
    Register {
        session: SessionHandle,
        ack: oneshot::Sender<()>,
    },
    Unregister(SessionHandle),
    Deliver {
        channel: ChannelName,
        payload: String,
        reply: oneshot::Sender<Result<(), RegistryError>>,
    },
    Snapshot(oneshot::Sender<Vec<ChannelName>>),
}

/// Cheap, cloneable handle to the registry task.
#[derive(Clone)]
pub struct Registry {
    tx: mpsc::UnboundedSender<Control>,
}

impl Registry {
    /// Start the control task. `version` goes into every handshake frame.
    pub fn spawn(bridge: Arc<dyn ChatBridge>, version: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let table = Table {
            sessions: HashMap::new(),
            bridge,
            hello: HelloFrame {
                version: version.into(),
            },
        };
        tokio::spawn(table.run(rx));
        Self { tx }
    }

    /// Make `session` the addressable session for its channel, closing any
    /// session it displaces, and join the channel. Resolves once the
    /// handshake frame is queued.
    pub async fn register(&self, session: SessionHandle) -> Result<(), RegistryError> {
        let (ack, done) = oneshot::channel();
        self.send(Control::Register { session, ack })?;
        done.await.map_err(|_| RegistryError::Stopped)
    }

    /// Drop `session` from the table if it is still the current one, and part
    /// the channel.
    pub fn unregister(&self, session: SessionHandle) {
        if self.send(Control::Unregister(session)).is_err() {
            warn!("registry stopped before session unregistered");
        }
    }

    /// Write `payload` as a JSON text frame to the channel's session.
    pub async fn deliver<T: Serialize>(
        &self,
        channel: ChannelName,
        payload: &T,
    ) -> Result<(), RegistryError> {
        let payload = serde_json::to_string(payload)?;
        let (reply, result) = oneshot::channel();
        self.send(Control::Deliver {
            channel,
            payload,
            reply,
        })?;
        result.await.map_err(|_| RegistryError::Stopped)?
    }

    /// Channels that currently have a session, sorted.
    pub async fn connected_channels(&self) -> Result<Vec<ChannelName>, RegistryError> {
        let (reply, result) = oneshot::channel();
        self.send(Control::Snapshot(reply))?;
        result.await.map_err(|_| RegistryError::Stopped)
    }

    fn send(&self, control: Control) -> Result<(), RegistryError> {
        self.tx.send(control).map_err(|_| RegistryError::Stopped)
    }
}

// ── Control loop ─────────────────────────────────────────────────────────────

struct Table {
    sessions: HashMap<ChannelName, SessionHandle>,
    bridge: Arc<dyn ChatBridge>,
    hello: HelloFrame,
}

impl Table {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Control>) {
        while let Some(control) = rx.recv().await {
            match control {
                Control::Register { session, ack } => {
                    self.register(session);
                    let _ = ack.send(());
                },
                Control::Unregister(session) => self.unregister(&session),
                Control::Deliver {
                    channel,
                    payload,
                    reply,
                } => {
                    let _ = reply.send(self.deliver(channel, payload));
                },
                Control::Snapshot(reply) => {
                    let mut channels: Vec<_> = self.sessions.keys().cloned().collect();
                    channels.sort();
                    let _ = reply.send(channels);
                },
            }
        }
        debug!("registry control loop stopped");
    }

    fn register(&mut self, session: SessionHandle) {
        let channel = session.channel.clone();
        if let Some(previous) = self.sessions.insert(channel.clone(), session.clone())
            && !previous.same_connection(&session)
        {
            info!(
                %channel,
                previous = %previous.conn_id,
                current = %session.conn_id,
                "session displaced by a newer connection"
            );
            previous.close();
        }
        if let Err(e) = self.bridge.join(&channel) {
            warn!(%channel, error = %e, "failed to join channel");
        }
        info!(%channel, conn_id = %session.conn_id, "session registered");

        match serde_json::to_string(&self.hello) {
            Ok(frame) => {
                if !session.send(frame) {
                    debug!(%channel, "session gone before handshake");
                }
            },
            Err(e) => warn!(error = %e, "failed to encode handshake"),
        }
    }

    fn unregister(&mut self, session: &SessionHandle) {
        let channel = &session.channel;
        match self.sessions.get(channel) {
            Some(current) if current.same_connection(session) => {
                self.sessions.remove(channel);
                info!(%channel, conn_id = %session.conn_id, "session unregistered");
                if let Err(e) = self.bridge.part(channel) {
                    warn!(%channel, error = %e, "failed to part channel");
                }
            },
            _ => debug!(%channel, conn_id = %session.conn_id, "stale unregister ignored"),
        }
    }

    fn deliver(&self, channel: ChannelName, payload: String) -> Result<(), RegistryError> {
        let Some(session) = self.sessions.get(&channel) else {
            return Err(RegistryError::NoSuchChannel(channel));
        };
        if session.send(payload) {
            Ok(())
        } else {
            Err(RegistryError::SessionGone(channel))
        }
    }
}
