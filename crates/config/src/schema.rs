//! Config schema for the bridge process.
//!
//! Field names match the flat `config.json` layout older deployments use, so
//! an existing file keeps working when renamed or left as `config.json`.

use std::path::PathBuf;

use {
    anyhow::bail,
    secrecy::{ExposeSecret, SecretString},
    serde::{Deserialize, Deserializer},
};

/// Admin key shipped in the example config. Refused at startup.
pub const DEFAULT_ADMIN_KEY: &str = "AnExposedKey";

const DEFAULT_TWITCH_SERVER_TLS: &str = "irc.chat.twitch.tv:6697";
const DEFAULT_TWITCH_SERVER_PLAIN: &str = "irc.chat.twitch.tv:6667";

/// Root configuration.
#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    /// Operator name shown on the index page.
    #[serde(default)]
    pub name: String,

    /// Contact HTML snippet shown on the index page.
    #[serde(default)]
    pub contact: String,

    /// Secret guarding `/admin`, `/addClient` and `/removeClients`.
    pub admin_key: SecretString,

    /// Twitch login the bridge connects as.
    pub twitch_username: String,

    /// OAuth token for `twitch_username`, with or without the `oauth:` prefix.
    pub twitch_code: SecretString,

    #[serde(default = "default_host")]
    pub host: String,

    /// Accepts a number or a numeric string (`"8080"`).
    #[serde(default = "default_port", deserialize_with = "port_from_any")]
    pub port: u16,

    /// Public base URL of this instance, shown to operators.
    #[serde(default)]
    pub url: String,

    /// `host:port` of the chat server. Defaults to Twitch's TLS endpoint.
    #[serde(default)]
    pub twitch_server: Option<String>,

    #[serde(default = "default_true")]
    pub twitch_tls: bool,

    /// Key file location; relative paths resolve against the config file.
    #[serde(default)]
    pub keys_file: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn port_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(n) => Ok(n),
        Port::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {s:?}"))),
    }
}

impl BridgeConfig {
    /// Reject configs the process must not start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let admin_key = self.admin_key.expose_secret();
        if admin_key == DEFAULT_ADMIN_KEY {
            bail!("admin key is not changed, please change admin_key in the config file");
        }
        if admin_key.len() < 2 {
            bail!("admin_key must be at least 2 characters long");
        }
        if self.twitch_username.trim().is_empty() {
            bail!("twitch_username is required");
        }
        if self.twitch_code.expose_secret().trim().is_empty() {
            bail!("twitch_code is required");
        }
        Ok(())
    }

    /// Address the HTTP server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `host:port` of the chat server, honouring `twitch_tls` for the default.
    pub fn twitch_server(&self) -> String {
        match &self.twitch_server {
            Some(server) => server.clone(),
            None if self.twitch_tls => DEFAULT_TWITCH_SERVER_TLS.into(),
            None => DEFAULT_TWITCH_SERVER_PLAIN.into(),
        }
    }

    /// PASS argument for IRC login, always carrying the `oauth:` prefix.
    pub fn twitch_pass(&self) -> SecretString {
        let code = self.twitch_code.expose_secret().trim();
        if code.starts_with("oauth:") {
            SecretString::new(code.to_string())
        } else {
            SecretString::new(format!("oauth:{code}"))
        }
    }
}
