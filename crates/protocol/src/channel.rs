use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical chat channel name: trimmed, without a leading `#`, lower-cased.
///
/// Every routing decision (registry lookups, join/part, delivery) uses this
/// form, so `#SomeStreamer` and `somestreamer` address the same channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        let bare = trimmed.strip_prefix('#').unwrap_or(trimmed);
        Self(bare.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// IRC form, e.g. `#somestreamer`.
    pub fn irc(&self) -> String {
        format!("#{}", self.0)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ChannelName {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for ChannelName {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<ChannelName> for String {
    fn from(name: ChannelName) -> Self {
        name.0
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
