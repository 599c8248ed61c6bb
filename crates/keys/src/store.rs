use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use {
    anyhow::{Context, Result},
    chatbridge_protocol::{CLIENT_KEY_LEN, ChannelName},
    rand::{Rng, distr::Alphanumeric},
    tracing::{debug, info},
};

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("The client key {0} does not exist, deletion aborted.")]
    UnknownKey(String),

    #[error("No twitch channel was supplied.")]
    EmptyChannel,

    #[error("No client key was supplied.")]
    NothingToRevoke,
}

/// Generate a fresh random client key (URL-safe alphanumerics).
pub fn generate_key() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(CLIENT_KEY_LEN)
        .map(char::from)
        .collect()
}

/// JSON file-backed map of client key → channel name.
///
/// Mutations only touch memory; call [`KeyStore::save`] to persist. The file
/// is always rewritten in full.
#[derive(Debug)]
pub struct KeyStore {
    path: PathBuf,
    keys: BTreeMap<String, String>,
}

impl KeyStore {
    /// Load the store from `path`, creating an empty `{}` file if none exists.
    pub fn load(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no key file found, creating new one");
            let store = Self {
                path,
                keys: BTreeMap::new(),
            };
            store.save()?;
            return Ok(store);
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let keys: BTreeMap<String, String> = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        debug!(path = %path.display(), count = keys.len(), "loaded client keys");
        Ok(Self { path, keys })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a client key to the channel it is bound to.
    pub fn lookup(&self, key: &str) -> Option<ChannelName> {
        self.keys.get(key).map(|c| ChannelName::new(c))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// `(key, channel as entered by the admin)` pairs, ordered by key.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Bind a newly generated key to `channel` and return it.
    pub fn issue(&mut self, channel: &str) -> Result<String, KeyStoreError> {
        self.issue_with(channel, generate_key)
    }

    /// Like [`KeyStore::issue`] with a caller-supplied generator. Generation is
    /// repeated until the candidate is not already in the store.
    pub fn issue_with(
        &mut self,
        channel: &str,
        mut generate: impl FnMut() -> String,
    ) -> Result<String, KeyStoreError> {
        let channel = channel.trim();
        if channel.is_empty() {
            return Err(KeyStoreError::EmptyChannel);
        }
        let key = loop {
            let candidate = generate();
            if !self.keys.contains_key(&candidate) {
                break candidate;
            }
            debug!("generated client key collided, retrying");
        };
        self.keys.insert(key.clone(), channel.to_string());
        Ok(key)
    }

    /// Remove every key in `keys`, or none of them.
    ///
    /// All keys are checked before anything is removed; the first unknown key
    /// aborts the whole batch.
    pub fn revoke<S: AsRef<str>>(&mut self, keys: &[S]) -> Result<(), KeyStoreError> {
        if keys.is_empty() {
            return Err(KeyStoreError::NothingToRevoke);
        }
        if let Some(missing) = keys.iter().find(|k| !self.keys.contains_key(k.as_ref())) {
            return Err(KeyStoreError::UnknownKey(missing.as_ref().to_string()));
        }
        for key in keys {
            self.keys.remove(key.as_ref());
        }
        Ok(())
    }

    /// Rewrite the key file from memory.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&self.keys)?;
        fs::write(&self.path, data)
            .with_context(|| format!("failed to write {}", self.path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        debug!(path = %self.path.display(), count = self.keys.len(), "saved client keys");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::collections::HashSet};

    fn temp_store() -> (tempfile::TempDir, KeyStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::load(dir.path().join("keys.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn load_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        let store = KeyStore::load(path.clone()).unwrap();
        assert!(store.is_empty());
        assert_eq!(fs::read_to_string(path).unwrap().trim(), "{}");
    }

    #[test]
    fn load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        fs::write(&path, "not json").unwrap();
        assert!(KeyStore::load(path).is_err());
    }

    #[test]
    fn generated_keys_have_expected_shape() {
        let key = generate_key();
        assert_eq!(key.len(), CLIENT_KEY_LEN);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn issue_returns_distinct_keys() {
        let (_dir, mut store) = temp_store();
        let mut seen = HashSet::new();
        for _ in 0..50 {
            let key = store.issue("foo").unwrap();
            assert!(seen.insert(key));
        }
        assert_eq!(store.len(), 50);
    }

    #[test]
    fn issue_retries_on_collision() {
        let (_dir, mut store) = temp_store();
        let first = store.issue_with("foo", || "AAAAAAAAAA".into()).unwrap();
        assert_eq!(first, "AAAAAAAAAA");

        let mut candidates = vec!["BBBBBBBBBB", "AAAAAAAAAA", "AAAAAAAAAA"];
        let second = store
            .issue_with("bar", || candidates.pop().unwrap_or_default().to_string())
            .unwrap();
        assert_eq!(second, "BBBBBBBBBB");
        assert!(candidates.is_empty());
        assert_eq!(store.lookup("AAAAAAAAAA"), Some(ChannelName::new("foo")));
        assert_eq!(store.lookup("BBBBBBBBBB"), Some(ChannelName::new("bar")));
    }

    #[test]
    fn issue_rejects_blank_channel() {
        let (_dir, mut store) = temp_store();
        assert!(matches!(
            store.issue("   "),
            Err(KeyStoreError::EmptyChannel)
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn lookup_canonicalizes_channel() {
        let (_dir, mut store) = temp_store();
        let key = store.issue("SomeStreamer").unwrap();
        assert_eq!(store.lookup(&key).unwrap().as_str(), "somestreamer");
        assert_eq!(store.entries().next(), Some((key.as_str(), "SomeStreamer")));
        assert!(store.lookup("unknown-key").is_none());
    }

    #[test]
    fn revoke_is_all_or_nothing() {
        let (_dir, mut store) = temp_store();
        let k1 = store.issue("one").unwrap();
        let k2 = store.issue("two").unwrap();

        let err = store
            .revoke(&[k1.as_str(), k2.as_str(), "missing-key"])
            .unwrap_err();
        assert!(matches!(err, KeyStoreError::UnknownKey(ref k) if k == "missing-key"));
        assert!(store.contains(&k1));
        assert!(store.contains(&k2));

        store.revoke(&[k1.as_str(), k2.as_str()]).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn revoke_names_first_missing_key() {
        let (_dir, mut store) = temp_store();
        let k1 = store.issue("one").unwrap();
        let err = store.revoke(&["nope-1", k1.as_str(), "nope-2"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The client key nope-1 does not exist, deletion aborted."
        );
    }

    #[test]
    fn revoke_requires_keys() {
        let (_dir, mut store) = temp_store();
        let empty: [&str; 0] = [];
        assert!(matches!(
            store.revoke(&empty),
            Err(KeyStoreError::NothingToRevoke)
        ));
    }

    #[test]
    fn save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("keys.json");
        let mut store = KeyStore::load(path.clone()).unwrap();
        let key = store.issue("foo").unwrap();
        store.save().unwrap();

        let reloaded = KeyStore::load(path).unwrap();
        assert_eq!(reloaded.lookup(&key), Some(ChannelName::new("foo")));
    }
}
