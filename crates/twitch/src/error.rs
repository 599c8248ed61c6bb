use std::{io, time::Duration};

/// Failures of the chat connection or of a command sent to it.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to resolve {server}: {source}")]
    Resolve {
        server: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {server}: {source}")]
    Connect {
        server: String,
        #[source]
        source: io::Error,
    },

    #[error("TLS handshake with {server} failed: {source}")]
    Tls {
        server: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid TLS server name: {0}")]
    InvalidServerName(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("login rejected by chat server: {0}")]
    LoginRejected(String),

    #[error("chat server requested a reconnect")]
    ReconnectRequested,

    #[error("chat server closed the connection")]
    Closed,

    #[error("no traffic from chat server for {0:?}")]
    PingTimeout(Duration),

    #[error("chat connection task is not running")]
    Unavailable,
}

impl BridgeError {
    /// Whether retrying right away is pointless. Only a failed name lookup
    /// (typically no network yet) qualifies; the runner backs off on these.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Resolve { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_resolve_is_transient() {
        let resolve = BridgeError::Resolve {
            server: "irc.chat.twitch.tv:6697".into(),
            source: io::Error::other("no such host"),
        };
        assert!(resolve.is_transient());

        let connect = BridgeError::Connect {
            server: "irc.chat.twitch.tv:6697".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert!(!connect.is_transient());
        assert!(!BridgeError::Closed.is_transient());
        assert!(!BridgeError::ReconnectRequested.is_transient());
        assert!(!BridgeError::LoginRejected("bad".into()).is_transient());
    }

    #[test]
    fn messages_name_the_server() {
        let err = BridgeError::Resolve {
            server: "example.invalid:6667".into(),
            source: io::Error::other("no such host"),
        };
        assert_eq!(
            err.to_string(),
            "failed to resolve example.invalid:6667: no such host"
        );
    }
}
