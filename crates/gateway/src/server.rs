use std::{path::Path, sync::Arc, time::Duration};

use {
    axum::{
        Json, Router,
        extract::{
            State,
            ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
        },
        response::{IntoResponse, Response},
        routing::get,
    },
    axum_extra::extract::Query,
    chatbridge_config::{BridgeConfig, resolve_keys_path},
    chatbridge_keys::KeyStore,
    chatbridge_protocol::{ChannelName, ErrorFrame, HelloFrame},
    chatbridge_twitch::{ChatEvent, TwitchBridge, TwitchConfig},
    serde::Deserialize,
    tokio::{sync::mpsc, task::JoinHandle},
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{debug, error, info, warn},
};

use crate::{
    auth,
    error::ApiError,
    pages::{self, AdminPage, IndexPage},
    registry::{Registry, RegistryError},
    session::{SessionHandle, run_session},
    state::{GatewaySettings, GatewayState},
};

const WRONG_KEY_FRAME: &str = "The wrong authorization key submitted";

// ── Query parameters ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ClientQuery {
    client_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AdminQuery {
    admin_key: Option<String>,
    twitch_channel: Option<String>,
    /// Repeatable: `?clients=a&clients=b`.
    #[serde(default)]
    clients: Vec<String>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/admin", get(admin_handler))
        .route("/script.js", get(pages::script))
        .route("/style.css", get(pages::style))
        .route("/health", get(health_handler))
        .route("/setup", get(setup_handler))
        .route("/websocket", get(websocket_handler))
        .route("/addClient", get(add_client_handler))
        .route("/removeClients", get(remove_clients_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Forward every chat event to the session registered for its channel.
pub fn spawn_event_forwarder(
    registry: Registry,
    mut events: mpsc::Receiver<ChatEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let channel = event.channel();
            match registry.deliver(channel, &event).await {
                Ok(()) => {},
                Err(RegistryError::NoSuchChannel(channel)) => {
                    debug!(%channel, "chat event for channel without session");
                },
                Err(e) => warn!(error = %e, "failed to deliver chat event"),
            }
        }
        info!("chat event stream ended");
    })
}

/// Start the bridge: key store, Twitch connection, registry, HTTP server.
/// Runs until ctrl-c.
pub async fn start_gateway(config: BridgeConfig, config_path: &Path) -> anyhow::Result<()> {
    let keys_path = resolve_keys_path(&config, config_path);
    let keys = KeyStore::load(keys_path.clone())?;

    let (bridge, events) = TwitchBridge::spawn(TwitchConfig {
        server: config.twitch_server(),
        tls: config.twitch_tls,
        username: config.twitch_username.clone(),
        pass: config.twitch_pass(),
    });

    let state = GatewayState::new(GatewaySettings::from_config(&config), keys, Arc::new(bridge));
    spawn_event_forwarder(state.registry.clone(), events);

    let app = build_gateway_app(Arc::clone(&state));
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Startup banner.
    let lines = [
        format!("chatbridge v{}", state.version()),
        format!("listening on {}", listener.local_addr()?),
        format!("chat server {} as {}", config.twitch_server(), config.twitch_username),
        format!(
            "{} client keys in {}",
            state.keys.lock().await.len(),
            keys_path.display()
        ),
    ];
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

// ── Page handlers ────────────────────────────────────────────────────────────

async fn index_handler(State(state): State<Arc<GatewayState>>) -> Response {
    pages::render(&IndexPage {
        name: &state.settings.name,
        contact: &state.settings.contact,
    })
}

async fn admin_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<AdminQuery>,
) -> Response {
    if let Err(err) = auth::authorize_admin(&state.settings.admin_key, query.admin_key.as_deref()) {
        info!(reason = %err, "admin page refused");
        return pages::error_page(&err);
    }

    let connected = state.registry.connected_channels().await.unwrap_or_else(|e| {
        warn!(error = %e, "failed to list connected channels");
        Vec::new()
    });
    let rows = {
        let keys = state.keys.lock().await;
        pages::key_rows(keys.entries(), &connected)
    };
    pages::render(&AdminPage { rows })
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let connections = state
        .registry
        .connected_channels()
        .await
        .map(|c| c.len())
        .unwrap_or(0);
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version(),
        "connections": connections,
    }))
}

// ── Admin API ────────────────────────────────────────────────────────────────

async fn add_client_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<AdminQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    auth::authorize_admin(&state.settings.admin_key, query.admin_key.as_deref())?;

    let channel = query.twitch_channel.as_deref().unwrap_or_default();
    let mut keys = state.keys.lock().await;
    keys.issue(channel)?;
    info!(channel = %ChannelName::new(channel), "client key issued");
    persist(&keys);
    Ok(Json(serde_json::json!({})))
}

async fn remove_clients_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<AdminQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    auth::authorize_admin(&state.settings.admin_key, query.admin_key.as_deref())?;

    let mut keys = state.keys.lock().await;
    keys.revoke(query.clients.as_slice())?;
    info!(count = query.clients.len(), "client keys revoked");
    persist(&keys);
    Ok(Json(serde_json::json!({})))
}

fn persist(keys: &KeyStore) {
    if let Err(e) = keys.save() {
        error!(path = %keys.path().display(), error = %e, "failed to persist client keys");
    }
}

// ── Client API ───────────────────────────────────────────────────────────────

async fn setup_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ClientQuery>,
) -> Result<Json<HelloFrame>, ApiError> {
    let keys = state.keys.lock().await;
    auth::authorize_client(&keys, query.client_key.as_deref())?;
    Ok(Json(HelloFrame {
        version: state.version().to_string(),
    }))
}

async fn websocket_handler(
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ClientQuery>,
) -> Response {
    let authorized = {
        let keys = state.keys.lock().await;
        auth::authorize_client(&keys, query.client_key.as_deref())
    };
    let Ok(upgrade) = upgrade else {
        return ApiError::NotAWebSocket.into_response();
    };

    match authorized {
        Ok(channel) => upgrade.on_upgrade(move |socket| accept_session(socket, channel, state)),
        Err(err) => {
            info!(reason = %err, "websocket refused");
            let grace = state.settings.unauthorized_grace;
            upgrade.on_upgrade(move |socket| reject_session(socket, grace))
        },
    }
}

async fn accept_session(socket: WebSocket, channel: ChannelName, state: Arc<GatewayState>) {
    let (handle, outbound) = SessionHandle::new(channel);
    if let Err(e) = state.registry.register(handle.clone()).await {
        error!(error = %e, "failed to register session");
        return;
    }
    run_session(
        socket,
        handle,
        outbound,
        state.registry.clone(),
        Arc::clone(&state.bridge),
    )
    .await;
}

/// Tell the client its key was wrong, hold the socket briefly, then close.
async fn reject_session(mut socket: WebSocket, grace: Duration) {
    let frame = ErrorFrame {
        error: WRONG_KEY_FRAME.into(),
    };
    match serde_json::to_string(&frame) {
        Ok(text) => {
            if let Err(e) = socket.send(Message::Text(text.into())).await {
                debug!(error = %e, "failed to send auth error frame");
                return;
            }
        },
        Err(e) => warn!(error = %e, "failed to encode auth error frame"),
    }
    tokio::time::sleep(grace).await;
    if let Err(e) = socket.send(Message::Close(None)).await {
        debug!(error = %e, "failed to close refused websocket");
    }
}
