//! Process configuration: discovery, `${ENV}` substitution, parsing and
//! startup validation.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{discover_config_file, load_config, load_from, resolve_keys_path},
    schema::{BridgeConfig, DEFAULT_ADMIN_KEY},
};
