use std::path::Path;

use {
    anyhow::Result,
    chatbridge_keys::KeyStore,
    chatbridge_protocol::ChannelName,
    clap::Subcommand,
};

/// Offline key management. A running server keeps its own copy of the key
/// file in memory; restart it after editing keys here.
#[derive(Subcommand)]
pub enum KeysAction {
    /// List every client key and its channel.
    List,
    /// Issue a new client key for a Twitch channel.
    Issue {
        /// Twitch channel (login name).
        channel: String,
    },
    /// Revoke client keys. Nothing is removed if any key is unknown.
    Revoke {
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

pub fn handle_keys(action: KeysAction, keys_path: &Path) -> Result<()> {
    let mut store = KeyStore::load(keys_path.to_path_buf())?;
    match action {
        KeysAction::List => {
            if store.is_empty() {
                println!("No client keys in {}.", keys_path.display());
            }
            for (key, channel) in store.entries() {
                println!("{key}  {}", ChannelName::new(channel));
            }
        },
        KeysAction::Issue { channel } => {
            let key = store.issue(&channel)?;
            store.save()?;
            println!("{key}");
        },
        KeysAction::Revoke { keys } => {
            store.revoke(keys.as_slice())?;
            store.save()?;
            println!("Revoked {} key(s).", keys.len());
        },
    }
    Ok(())
}
