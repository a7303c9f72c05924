//! parley - a mutually-authenticated broadcast chat hub.
//!
//! ## Modes
//!
//! **Server** (`parley server`): binds one TCP port, requires every
//! connection to complete a mutual-TLS handshake, and runs the broadcast
//! room until interrupted.
//!
//! **Client** (`parley client`): joins a hub as a thin terminal
//! participant - stdin lines become chat messages once a display name is
//! accepted, broadcast payloads print to stdout.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parley::{
    client, config,
    config::{ServerConfig, ServerSettings},
    registry::Registry,
    server, tls,
};

/// parley - a mutually-authenticated broadcast chat hub.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the chat hub
    Server {
        /// Address to listen on (default 0.0.0.0:9001)
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// PEM certificate chain presented to clients
        #[arg(long, env = "PARLEY_CERT")]
        cert: Option<PathBuf>,

        /// PEM private key for the certificate
        #[arg(long, env = "PARLEY_KEY")]
        key: Option<PathBuf>,

        /// PEM CA bundle that client certificates must chain to
        #[arg(long, env = "PARLEY_PEER_CA")]
        peer_ca: Option<PathBuf>,

        /// TOML config file supplying defaults for the flags above
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Join a chat hub as a terminal participant
    Client {
        /// Server address (host:port)
        #[arg(long, default_value = "127.0.0.1:9001")]
        connect: String,

        /// Name the server certificate must be valid for
        #[arg(long, default_value = "localhost")]
        server_name: String,

        /// Display name to claim (prompted on stdin if omitted or taken)
        #[arg(long)]
        name: Option<String>,

        /// PEM certificate chain presented to the server
        #[arg(long, env = "PARLEY_CERT")]
        cert: PathBuf,

        /// PEM private key for the certificate
        #[arg(long, env = "PARLEY_KEY")]
        key: PathBuf,

        /// PEM CA bundle that the server certificate must chain to
        #[arg(long, env = "PARLEY_PEER_CA")]
        peer_ca: PathBuf,
    },
}

#[derive(Error, Debug)]
enum ParleyError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("tls error: {0}")]
    Tls(#[from] tls::TlsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), ParleyError> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Server { bind, cert, key, peer_ca, config } => {
            run_server(bind, cert, key, peer_ca, config).await
        }
        Commands::Client { connect, server_name, name, cert, key, peer_ca } => {
            client::run(client::ClientOptions {
                addr: connect,
                server_name,
                name,
                cert,
                key,
                peer_ca,
            })
            .await?;
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "parley=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run_server(
    bind: Option<SocketAddr>,
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
    peer_ca: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<(), ParleyError> {
    // An explicitly named config file must exist; without the flag the
    // server runs from flags alone.
    let file = match config_path {
        Some(path) => Some(
            ServerConfig::load(&path)?.ok_or(config::ConfigError::NotFound(path))?,
        ),
        None => None,
    };
    let settings = ServerSettings::resolve(file, bind, cert, key, peer_ca)?;

    let acceptor = tls::load_acceptor(&settings.cert, &settings.key, &settings.peer_ca)?;
    let listener = tokio::net::TcpListener::bind(settings.listen).await?;

    let registry = Registry::new();
    let cancel = tokio_util::sync::CancellationToken::new();

    tokio::select! {
        result = server::serve(registry, listener, acceptor, cancel.clone()) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
            cancel.cancel();
        }
    }

    Ok(())
}
