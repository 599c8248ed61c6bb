use std::path::{Path, PathBuf};

use {
    anyhow::{Context, bail},
    tracing::debug,
};

use crate::{env_subst::substitute_env, schema::BridgeConfig};

/// Standard config file names, checked in order. `config.json` is the
/// legacy flat layout.
const CONFIG_FILENAMES: &[&str] = &[
    "chatbridge.toml",
    "chatbridge.yaml",
    "chatbridge.yml",
    "chatbridge.json",
    "config.json",
];

const DEFAULT_KEYS_FILE: &str = "keys.json";

/// Load, substitute, parse and validate the config at `path`.
pub fn load_config(path: &Path) -> anyhow::Result<BridgeConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw = substitute_env(&raw);
    let config = parse_config(&raw, path)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Find the first config file in standard locations.
///
/// Search order:
/// 1. `./chatbridge.{toml,yaml,yml,json}`, then `./config.json`
/// 2. `~/.config/chatbridge/` with the same names
pub fn discover_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = user_config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

/// Resolve and load the config, failing when none can be found.
pub fn load_from(explicit: Option<&Path>) -> anyhow::Result<(BridgeConfig, PathBuf)> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match discover_config_file() {
            Some(path) => path,
            None => bail!(
                "no config file found; create chatbridge.toml from chatbridge.example.toml"
            ),
        },
    };
    let config = load_config(&path)?;
    Ok((config, path))
}

/// Where the key file lives for a config loaded from `config_path`.
///
/// Relative `keys_file` values (and the `keys.json` default) resolve against
/// the directory holding the config file.
pub fn resolve_keys_path(config: &BridgeConfig, config_path: &Path) -> PathBuf {
    let base = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    match &config.keys_file {
        Some(p) if p.is_absolute() => p.clone(),
        Some(p) => base.join(p),
        None => base.join(DEFAULT_KEYS_FILE),
    }
}

fn user_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".config").join("chatbridge"))
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<BridgeConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => bail!("unsupported config format: .{ext}"),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "chatbridge.toml",
            r#"
admin_key = "s3cret"
twitch_username = "bridgebot"
twitch_code = "abc"
port = 9001
keys_file = "data/keys.json"
"#,
        );
        let (cfg, found) = load_from(Some(&path)).unwrap();
        assert_eq!(found, path);
        assert_eq!(cfg.port, 9001);
        assert_eq!(
            resolve_keys_path(&cfg, &path),
            dir.path().join("data").join("keys.json")
        );
    }

    #[test]
    fn loads_yaml_with_env_substitution() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "chatbridge.yaml",
            "admin_key: ${CHATBRIDGE_TEST_UNSET_ADMIN_KEY:-from-env}\ntwitch_username: bot\ntwitch_code: abc\n",
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.admin_key.expose_secret(), "from-env");
    }

    #[test]
    fn default_keys_path_sits_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "config.json",
            r#"{"admin_key":"s3cret","twitch_username":"bot","twitch_code":"abc"}"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(resolve_keys_path(&cfg, &path), dir.path().join("keys.json"));
    }

    #[test]
    fn refuses_default_admin_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "config.json",
            r#"{"admin_key":"AnExposedKey","twitch_username":"bot","twitch_code":"abc"}"#,
        );
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("admin key is not changed"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn unknown_extension_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "chatbridge.ini", "admin_key=x");
        assert!(load_config(&path).is_err());
    }
}
