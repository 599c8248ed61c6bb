#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    chatbridge_gateway::{GatewaySettings, GatewayState, build_gateway_app},
    chatbridge_keys::KeyStore,
    chatbridge_protocol::ChannelName,
    chatbridge_twitch::{BridgeError, ChatBridge},
    futures::StreamExt,
    secrecy::SecretString,
    tempfile::TempDir,
    tokio::net::TcpStream,
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
};

pub const ADMIN_KEY: &str = "admin-secret";
pub const VERSION: &str = "9.9.9";
pub const WAIT: Duration = Duration::from_secs(5);

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── Recording bridge ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Join(String),
    Part(String),
    Reply {
        channel: String,
        parent_id: String,
        text: String,
    },
}

/// `ChatBridge` that records every call instead of talking to Twitch.
#[derive(Default)]
pub struct RecordingBridge {
    calls: Mutex<Vec<Call>>,
}

impl RecordingBridge {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Poll until `pred` holds for the recorded calls.
    pub async fn wait_for(&self, pred: impl Fn(&[Call]) -> bool) -> Vec<Call> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let calls = self.calls();
            if pred(&calls) {
                return calls;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not met, calls so far: {calls:?}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl ChatBridge for RecordingBridge {
    fn join(&self, channel: &ChannelName) -> Result<(), BridgeError> {
        self.calls.lock().unwrap().push(Call::Join(channel.to_string()));
        Ok(())
    }

    fn part(&self, channel: &ChannelName) -> Result<(), BridgeError> {
        self.calls.lock().unwrap().push(Call::Part(channel.to_string()));
        Ok(())
    }

    fn reply(&self, channel: &ChannelName, parent_id: &str, text: &str) -> Result<(), BridgeError> {
        self.calls.lock().unwrap().push(Call::Reply {
            channel: channel.to_string(),
            parent_id: parent_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

// ── Server harness ───────────────────────────────────────────────────────────

pub struct TestGateway {
    pub state: Arc<GatewayState>,
    pub bridge: Arc<RecordingBridge>,
    pub dir: TempDir,
}

pub fn settings() -> GatewaySettings {
    GatewaySettings {
        name: "Test Bridge".into(),
        contact: "<a href=\"mailto:ops@example.com\">ops</a>".into(),
        admin_key: SecretString::new(ADMIN_KEY.into()),
        version: VERSION.into(),
        unauthorized_grace: Duration::from_secs(2),
    }
}

/// Gateway state over a fresh key file with one key per `channels` entry.
/// Returns the issued keys in the same order.
pub fn gateway(channels: &[&str]) -> (TestGateway, Vec<String>) {
    let dir = tempfile::tempdir().unwrap();
    let mut keys = KeyStore::load(dir.path().join("keys.json")).unwrap();
    let issued = channels
        .iter()
        .map(|c| keys.issue(c).unwrap())
        .collect();
    keys.save().unwrap();

    let bridge = Arc::new(RecordingBridge::default());
    let state = GatewayState::new(settings(), keys, Arc::clone(&bridge) as Arc<dyn ChatBridge>);
    (TestGateway { state, bridge, dir }, issued)
}

/// Serve the gateway on an ephemeral port.
pub async fn serve(gw: &TestGateway) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_gateway_app(Arc::clone(&gw.state));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub async fn connect(addr: SocketAddr, key: &str) -> Client {
    let url = format!("ws://{addr}/websocket?client_key={key}");
    let (ws, _) = tokio::time::timeout(WAIT, connect_async(url))
        .await
        .unwrap()
        .unwrap();
    ws
}

/// Next text frame parsed as JSON. Panics on close or timeout.
pub async fn next_json(ws: &mut Client) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("read failed");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

/// Wait until the server closes `ws`.
pub async fn expect_closed(ws: &mut Client) {
    loop {
        match tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("connection was not closed")
        {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(other)) => panic!("expected close, got {other:?}"),
        }
    }
}
