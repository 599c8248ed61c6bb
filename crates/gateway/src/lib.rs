//! Gateway: HTTP + WebSocket front of the chat bridge.
//!
//! Lifecycle:
//! 1. Load the client key store
//! 2. Spawn the Twitch connection and the session registry
//! 3. Forward inbound chat events to the registry
//! 4. Serve pages, the admin/client API and WebSocket upgrades
//!
//! The registry task is the only owner of the channel → session table; every
//! other component talks to it through [`registry::Registry`].

pub mod auth;
pub mod error;
pub mod pages;
pub mod registry;
pub mod server;
pub mod session;
pub mod state;

pub use {
    error::ApiError,
    registry::{Registry, RegistryError},
    server::{build_gateway_app, spawn_event_forwarder, start_gateway},
    state::{GatewaySettings, GatewayState},
};
