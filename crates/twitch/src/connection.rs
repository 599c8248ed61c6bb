//! The connection task: connect, log in, pump lines, reconnect forever.

use std::{collections::BTreeSet, io, sync::Arc, time::Duration};

use {
    chatbridge_protocol::ChannelName,
    secrecy::ExposeSecret,
    tokio::{
        io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
        net::TcpStream,
        sync::mpsc,
        time::{Instant, sleep, sleep_until},
    },
    tokio_rustls::TlsConnector,
    tracing::{debug, error, info, trace, warn},
};

use crate::{
    bridge::{Command, TwitchConfig},
    error::BridgeError,
    event::ChatEvent,
    irc::{IrcMessage, privmsg},
};

/// Back-off after a transient failure.
const RETRY_DELAY: Duration = Duration::from_secs(5);
/// Send our own `PING` after this long without traffic.
const IDLE_PING: Duration = Duration::from_secs(60);
/// Give up on the connection after this long without traffic.
const READ_TIMEOUT: Duration = Duration::from_secs(120);

const CAPABILITIES: &str = "CAP REQ :twitch.tv/tags twitch.tv/commands";

trait ChatStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> ChatStream for T {}

/// Channels the gateway currently wants. Survives reconnects.
#[derive(Debug, Default)]
struct Subscriptions {
    joined: BTreeSet<ChannelName>,
}

enum Exit {
    /// Every bridge handle was dropped.
    Shutdown,
}

// ── Runner ──────────────────────────────────────────────────────────────────

pub(crate) async fn run(
    config: TwitchConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<ChatEvent>,
) {
    let mut subs = Subscriptions::default();
    loop {
        match run_once(&config, &mut commands, &events, &mut subs).await {
            Ok(Exit::Shutdown) => {
                info!("chat bridge handles dropped, stopping connection task");
                return;
            },
            Err(err) if err.is_transient() => {
                info!(error = %err, "chat server unreachable, retrying in 5 seconds");
                sleep(RETRY_DELAY).await;
            },
            Err(err) => {
                error!(error = %err, server = %config.server, "chat connection failed, reconnecting");
            },
        }
    }
}

async fn run_once(
    config: &TwitchConfig,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    events: &mpsc::Sender<ChatEvent>,
    subs: &mut Subscriptions,
) -> Result<Exit, BridgeError> {
    let stream = connect(config).await?;
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    send_line(&mut writer, CAPABILITIES).await?;
    writer
        .write_all(format!("PASS {}\r\n", config.pass.expose_secret()).as_bytes())
        .await?;
    send_line(&mut writer, &format!("NICK {}", config.username)).await?;
    writer.flush().await?;

    let mut registered = false;
    let mut last_traffic = Instant::now();
    let mut ping_sent = false;

    loop {
        let deadline = last_traffic + if ping_sent { READ_TIMEOUT } else { IDLE_PING };

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Err(BridgeError::Closed);
                };
                last_traffic = Instant::now();
                ping_sent = false;

                let Some(msg) = IrcMessage::parse(&line) else {
                    continue;
                };
                match msg.command.as_str() {
                    "PING" => {
                        let token = msg.param(0).unwrap_or("tmi.twitch.tv");
                        send_line(&mut writer, &format!("PONG :{token}")).await?;
                    },
                    "001" => {
                        registered = true;
                        info!(
                            server = %config.server,
                            channels = subs.joined.len(),
                            "connected to chat server"
                        );
                        for channel in &subs.joined {
                            send_line(&mut writer, &format!("JOIN {}", channel.irc())).await?;
                        }
                    },
                    "RECONNECT" => return Err(BridgeError::ReconnectRequested),
                    "NOTICE" if !registered => {
                        let text = msg.param(1).unwrap_or_default();
                        if is_login_failure(text) {
                            return Err(BridgeError::LoginRejected(text.to_string()));
                        }
                        warn!(notice = text, "chat server notice before login");
                    },
                    "PRIVMSG" | "USERNOTICE" => match ChatEvent::from_irc(&msg) {
                        Some(event) => {
                            trace!(channel = %event.channel(), "chat event");
                            if events.send(event).await.is_err() {
                                debug!("chat event receiver dropped");
                            }
                        },
                        None => debug!(line = %msg.raw, "unparsable chat event"),
                    },
                    _ => trace!(line = %msg.raw, "ignored chat line"),
                }
            },
            cmd = commands.recv(), if registered => {
                let Some(cmd) = cmd else {
                    return Ok(Exit::Shutdown);
                };
                apply(&mut writer, subs, cmd).await?;
            },
            () = sleep_until(deadline) => {
                if ping_sent {
                    return Err(BridgeError::PingTimeout(READ_TIMEOUT));
                }
                send_line(&mut writer, "PING :tmi.twitch.tv").await?;
                ping_sent = true;
            },
        }
    }
}

async fn apply<W: AsyncWrite + Unpin>(
    writer: &mut W,
    subs: &mut Subscriptions,
    cmd: Command,
) -> io::Result<()> {
    match cmd {
        Command::Join(channel) => {
            if subs.joined.insert(channel.clone()) {
                send_line(writer, &format!("JOIN {}", channel.irc())).await?;
            }
        },
        Command::Part(channel) => {
            if subs.joined.remove(&channel) {
                send_line(writer, &format!("PART {}", channel.irc())).await?;
            }
        },
        Command::Reply {
            channel,
            parent_id,
            text,
        } => {
            send_line(writer, &privmsg(&channel.irc(), Some(&parent_id), &text)).await?;
        },
    }
    Ok(())
}

fn is_login_failure(notice: &str) -> bool {
    notice.contains("Login authentication failed") || notice.contains("Improperly formatted auth")
}

async fn send_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> io::Result<()> {
    trace!(line, "chat >>");
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

// ── Transport ───────────────────────────────────────────────────────────────

async fn connect(config: &TwitchConfig) -> Result<Box<dyn ChatStream>, BridgeError> {
    let server = config.server.as_str();
    let addr = tokio::net::lookup_host(server)
        .await
        .map_err(|source| BridgeError::Resolve {
            server: server.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| BridgeError::Resolve {
            server: server.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
        })?;

    let tcp = TcpStream::connect(addr)
        .await
        .map_err(|source| BridgeError::Connect {
            server: server.to_string(),
            source,
        })?;
    debug!(server, %addr, tls = config.tls, "tcp connected");

    if !config.tls {
        return Ok(Box::new(tcp));
    }

    let host = server.rsplit_once(':').map_or(server, |(host, _)| host);
    let name = rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|_| BridgeError::InvalidServerName(host.to_string()))?;
    let connector = TlsConnector::from(tls_config(server)?);
    let tls = connector
        .connect(name, tcp)
        .await
        .map_err(|source| BridgeError::Tls {
            server: server.to_string(),
            source,
        })?;
    Ok(Box::new(tls))
}

fn tls_config(server: &str) -> Result<Arc<rustls::ClientConfig>, BridgeError> {
    let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config =
        rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| BridgeError::Tls {
                server: server.to_string(),
                source: io::Error::other(e),
            })?
            .with_root_certificates(roots)
            .with_no_client_auth();
    Ok(Arc::new(config))
}
