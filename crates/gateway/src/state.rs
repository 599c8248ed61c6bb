use std::{sync::Arc, time::Duration};

use {
    chatbridge_config::BridgeConfig,
    chatbridge_keys::KeyStore,
    chatbridge_protocol::UNAUTHORIZED_GRACE_MS,
    chatbridge_twitch::ChatBridge,
    secrecy::SecretString,
    tokio::sync::Mutex,
};

use crate::registry::Registry;

// ── Settings ─────────────────────────────────────────────────────────────────

/// The parts of the process config the HTTP layer needs.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Operator name shown on the index page.
    pub name: String,
    /// Contact HTML snippet shown on the index page.
    pub contact: String,
    pub admin_key: SecretString,
    /// Sent in `/setup` responses and session handshakes.
    pub version: String,
    /// How long a rejected WebSocket stays open after its error frame.
    pub unauthorized_grace: Duration,
}

impl GatewaySettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            name: config.name.clone(),
            contact: config.contact.clone(),
            admin_key: config.admin_key.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            unauthorized_grace: Duration::from_millis(UNAUTHORIZED_GRACE_MS),
        }
    }
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared gateway runtime state, wrapped in Arc for use across handlers.
pub struct GatewayState {
    pub settings: GatewaySettings,
    /// Client keys. Admin edits hold the lock across modify + persist.
    pub keys: Mutex<KeyStore>,
    pub registry: Registry,
    pub bridge: Arc<dyn ChatBridge>,
}

impl GatewayState {
    /// Build the state and start the registry task.
    pub fn new(settings: GatewaySettings, keys: KeyStore, bridge: Arc<dyn ChatBridge>) -> Arc<Self> {
        let registry = Registry::spawn(Arc::clone(&bridge), settings.version.clone());
        Arc::new(Self {
            settings,
            keys: Mutex::new(keys),
            registry,
            bridge,
        })
    }

    pub fn version(&self) -> &str {
        &self.settings.version
    }
}
