mod keys_commands;

use std::{fs::OpenOptions, path::PathBuf, sync::Mutex};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "chatbridge", about = "chatbridge: Twitch chat over WebSockets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file. Defaults to ./chatbridge.toml (or .yaml/.json, or a
    /// legacy config.json), then ~/.config/chatbridge/.
    #[arg(long, short, global = true, env = "CHATBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Also append JSON logs to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Twitch and serve the HTTP/WebSocket gateway.
    Serve,
    /// Client key management.
    Keys {
        #[command(subcommand)]
        action: keys_commands::KeysAction,
    },
}

fn init_telemetry(cli: &Cli) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let file_layer = match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        },
        None => None,
    };

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli)?;

    let (config, config_path) = chatbridge_config::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => {
            info!(
                version = env!("CARGO_PKG_VERSION"),
                config = %config_path.display(),
                "chatbridge starting"
            );
            chatbridge_gateway::start_gateway(config, &config_path).await
        },
        Commands::Keys { action } => {
            let keys_path = chatbridge_config::resolve_keys_path(&config, &config_path);
            keys_commands::handle_keys(action, &keys_path)
        },
    }
}
