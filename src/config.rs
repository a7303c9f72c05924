//! Server configuration, loaded from TOML.
//!
//! Every field is optional in the file; explicit CLI flags override file
//! values, and [`ServerSettings::resolve`] applies the merge. TLS material
//! is mandatory after resolution: the hub refuses to start without mutual
//! authentication.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default listen address when neither flag nor file supplies one.
pub fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9001))
}

/// Top-level server config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listener settings.
    pub server: Option<ListenSection>,
    /// Mutual-TLS identity material.
    pub tls: Option<TlsSection>,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenSection {
    /// Address to listen on (host:port).
    pub listen: Option<SocketAddr>,
}

/// `[tls]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsSection {
    /// PEM certificate chain presented to clients.
    pub cert: Option<PathBuf>,
    /// PEM private key for the certificate.
    pub key: Option<PathBuf>,
    /// PEM CA bundle that client certificates must chain to.
    pub peer_ca: Option<PathBuf>,
}

impl ServerConfig {
    /// Load config from a TOML file path. Returns `None` if the file
    /// doesn't exist.
    pub fn load(path: &std::path::Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;
        Ok(Some(config))
    }

    fn listen(&self) -> Option<SocketAddr> {
        self.server.as_ref().and_then(|s| s.listen)
    }

    fn tls(&self) -> TlsSection {
        self.tls.clone().unwrap_or_default()
    }
}

/// Errors that can occur when loading or resolving config.
#[derive(Debug)]
pub enum ConfigError {
    ReadFailed(PathBuf, std::io::Error),
    ParseFailed(PathBuf, toml::de::Error),
    NotFound(PathBuf),
    MissingTls(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadFailed(path, e) => {
                write!(f, "failed to read config {}: {}", path.display(), e)
            }
            Self::ParseFailed(path, e) => {
                write!(f, "failed to parse config {}: {}", path.display(), e)
            }
            Self::NotFound(path) => write!(f, "config file not found: {}", path.display()),
            Self::MissingTls(field) => write!(
                f,
                "no TLS {} configured (pass --{} or set it in the [tls] section of the config file)",
                field, field
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Fully-resolved server settings after merging flags over the file.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen: SocketAddr,
    pub cert: PathBuf,
    pub key: PathBuf,
    pub peer_ca: PathBuf,
}

impl ServerSettings {
    /// Merge explicit flags over file values. Flags win; the listen address
    /// falls back to [`default_listen`]; TLS paths are required.
    pub fn resolve(
        file: Option<ServerConfig>,
        listen: Option<SocketAddr>,
        cert: Option<PathBuf>,
        key: Option<PathBuf>,
        peer_ca: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();
        let file_tls = file.tls();
        Ok(Self {
            listen: listen.or_else(|| file.listen()).unwrap_or_else(default_listen),
            cert: cert.or(file_tls.cert).ok_or(ConfigError::MissingTls("cert"))?,
            key: key.or(file_tls.key).ok_or(ConfigError::MissingTls("key"))?,
            peer_ca: peer_ca
                .or(file_tls.peer_ca)
                .ok_or(ConfigError::MissingTls("peer-ca"))?,
        })
    }
}
