//! One authorized WebSocket bound to a channel.
//!
//! The socket is split: a writer task owns the sink and drains the session's
//! outbound queue, while the read loop below turns client frames into bridge
//! calls. However the loop ends (read error, peer close, displacement by a
//! newer session) it unregisters once and closes once.

use std::sync::Arc;

use {
    axum::extract::ws::{Message, WebSocket},
    chatbridge_protocol::{ChannelName, ClientFrame, PongFrame},
    chatbridge_twitch::ChatBridge,
    futures::{
        SinkExt, StreamExt,
        stream::{SplitSink, SplitStream},
    },
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::registry::Registry;

// ── Handle ───────────────────────────────────────────────────────────────────

/// Frames queued for the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// The registry's view of a session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub conn_id: String,
    pub channel: ChannelName,
    sender: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Create a handle plus the receiving end of its outbound queue.
    pub fn new(channel: ChannelName) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = Self {
            conn_id: uuid::Uuid::new_v4().to_string(),
            channel,
            sender,
            cancel: CancellationToken::new(),
        };
        (handle, receiver)
    }

    /// Queue a serialized JSON frame. Returns `false` once the writer is gone.
    pub fn send(&self, frame: String) -> bool {
        self.sender.send(Outbound::Text(frame)).is_ok()
    }

    /// Ask the session to shut down. Its read loop performs the teardown.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn same_connection(&self, other: &Self) -> bool {
        self.conn_id == other.conn_id
    }
}

// ── Session task ─────────────────────────────────────────────────────────────

/// Drive a registered session until it ends.
pub async fn run_session(
    socket: WebSocket,
    handle: SessionHandle,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    registry: Registry,
    bridge: Arc<dyn ChatBridge>,
) {
    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(write_loop(sink, outbound));

    info!(conn_id = %handle.conn_id, channel = %handle.channel, "session started");
    read_loop(&mut stream, &handle, bridge.as_ref()).await;

    registry.unregister(handle.clone());
    let _ = handle.sender.send(Outbound::Close);
    if let Err(e) = writer.await {
        warn!(conn_id = %handle.conn_id, error = %e, "session writer task failed");
    }
    info!(conn_id = %handle.conn_id, channel = %handle.channel, "session ended");
}

async fn read_loop(
    stream: &mut SplitStream<WebSocket>,
    handle: &SessionHandle,
    bridge: &dyn ChatBridge,
) {
    loop {
        let frame = tokio::select! {
            () = handle.cancel.cancelled() => {
                debug!(conn_id = %handle.conn_id, "session displaced");
                return;
            },
            frame = stream.next() => frame,
        };

        let text = match frame {
            None | Some(Ok(Message::Close(_))) => return,
            Some(Err(e)) => {
                debug!(conn_id = %handle.conn_id, error = %e, "session read failed");
                return;
            },
            Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
            Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
        };

        handle_frame(&text, handle, bridge);
    }
}

fn handle_frame(text: &str, handle: &SessionHandle, bridge: &dyn ChatBridge) {
    match ClientFrame::parse(text) {
        ClientFrame::Ping => {
            if let Ok(pong) = serde_json::to_string(&PongFrame::default()) {
                handle.send(pong);
            }
        },
        ClientFrame::Reply { target_id, message } => {
            debug!(channel = %handle.channel, target_id, "client reply");
            if let Err(e) = bridge.reply(&handle.channel, &target_id, &message) {
                warn!(channel = %handle.channel, error = %e, "failed to queue reply");
            }
        },
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(frame) = outbound.recv().await {
        match frame {
            Outbound::Text(text) => {
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            },
            Outbound::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            },
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use {super::*, chatbridge_twitch::BridgeError, std::sync::Mutex};

    #[derive(Default)]
    struct Replies(Mutex<Vec<(String, String, String)>>);

    impl ChatBridge for Replies {
        fn join(&self, _: &ChannelName) -> Result<(), BridgeError> {
            Ok(())
        }

        fn part(&self, _: &ChannelName) -> Result<(), BridgeError> {
            Ok(())
        }

        fn reply(&self, channel: &ChannelName, parent: &str, text: &str) -> Result<(), BridgeError> {
            self.0
                .lock()
                .unwrap()
                .push((channel.to_string(), parent.into(), text.into()));
            Ok(())
        }
    }

    #[test]
    fn ping_queues_pong() {
        let (handle, mut rx) = SessionHandle::new(ChannelName::new("foo"));
        handle_frame("ping", &handle, &Replies::default());
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Text(r#"{"pong":"pong"}"#.into())
        );
    }

    #[test]
    fn other_frames_become_replies() {
        let bridge = Replies::default();
        let (handle, mut rx) = SessionHandle::new(ChannelName::new("foo"));
        handle_frame("xyz hello world", &handle, &bridge);
        handle_frame("xyz", &handle, &bridge);

        assert_eq!(*bridge.0.lock().unwrap(), vec![
            ("foo".to_string(), "xyz".to_string(), "hello world".to_string()),
            ("foo".to_string(), "xyz".to_string(), String::new()),
        ]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn close_cancels_every_clone() {
        let (handle, _rx) = SessionHandle::new(ChannelName::new("foo"));
        let copy = handle.clone();
        handle.close();
        assert!(copy.is_closed());
        assert!(copy.same_connection(&handle));
    }
}
