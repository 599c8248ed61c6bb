//! Client key store: a flat JSON file mapping client key → channel name.
//!
//! Keys are issued and revoked by an administrator and looked up by the
//! gateway whenever a client calls `/setup` or opens `/websocket`.

mod store;

pub use store::{KeyStore, KeyStoreError, generate_key};
