//! Mutual-TLS setup for the chat hub.
//!
//! Loads PEM-encoded certificate chains, private keys, and peer CA bundles,
//! builds rustls configurations in which *both* sides verify each other, and
//! wraps them in the tokio-rustls acceptor/connector used at the transport
//! boundary. The chat core never touches any of this: sessions are generic
//! over the stream and indifferent to how it was authenticated.

use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Errors that can occur when loading TLS material.
#[derive(Debug)]
pub enum TlsError {
    /// Failed to read the certificate file.
    CertRead(std::io::Error),
    /// Failed to read the private key file.
    KeyRead(std::io::Error),
    /// Failed to read the peer CA bundle.
    CaRead(std::io::Error),
    /// No certificates found in the PEM file.
    NoCerts,
    /// No private key found in the PEM file.
    NoKey,
    /// No CA certificates found in the peer CA bundle.
    NoCaCerts,
    /// A peer CA certificate could not be added to the root store.
    BadCaCert(tokio_rustls::rustls::Error),
    /// Failed to build the client certificate verifier.
    Verifier(tokio_rustls::rustls::server::VerifierBuilderError),
    /// Failed to build the TLS configuration.
    Config(tokio_rustls::rustls::Error),
}

impl std::fmt::Display for TlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CertRead(e) => write!(f, "failed to read TLS certificate file: {}", e),
            Self::KeyRead(e) => write!(f, "failed to read TLS key file: {}", e),
            Self::CaRead(e) => write!(f, "failed to read peer CA bundle: {}", e),
            Self::NoCerts => write!(f, "no certificates found in PEM file"),
            Self::NoKey => write!(f, "no private key found in PEM file"),
            Self::NoCaCerts => write!(f, "no CA certificates found in peer CA bundle"),
            Self::BadCaCert(e) => write!(f, "invalid peer CA certificate: {}", e),
            Self::Verifier(e) => write!(f, "failed to build client certificate verifier: {}", e),
            Self::Config(e) => write!(f, "failed to build TLS config: {}", e),
        }
    }
}

impl std::error::Error for TlsError {}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let data = std::fs::read(path).map_err(TlsError::CertRead)?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut &data[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(TlsError::CertRead)?;
    if certs.is_empty() {
        return Err(TlsError::NoCerts);
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    // Accepts PKCS8, RSA, and EC key formats.
    let data = std::fs::read(path).map_err(TlsError::KeyRead)?;
    rustls_pemfile::private_key(&mut &data[..])
        .map_err(TlsError::KeyRead)?
        .ok_or(TlsError::NoKey)
}

fn load_roots(path: &Path) -> Result<RootCertStore, TlsError> {
    let data = std::fs::read(path).map_err(TlsError::CaRead)?;
    let mut roots = RootCertStore::empty();
    let mut added = 0usize;
    for cert in rustls_pemfile::certs(&mut &data[..]) {
        let cert = cert.map_err(TlsError::CaRead)?;
        roots.add(cert).map_err(TlsError::BadCaCert)?;
        added += 1;
    }
    if added == 0 {
        return Err(TlsError::NoCaCerts);
    }
    Ok(roots)
}

fn install_provider() {
    // Idempotent if a provider is already installed.
    let _ = tokio_rustls::rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Build the server-side acceptor: presents `cert`/`key` and requires every
/// client to present a certificate chaining to `peer_ca`.
pub fn load_acceptor(cert: &Path, key: &Path, peer_ca: &Path) -> Result<TlsAcceptor, TlsError> {
    install_provider();

    let certs = load_certs(cert)?;
    let key = load_key(key)?;
    let roots = load_roots(peer_ca)?;

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(TlsError::Verifier)?;
    let config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(TlsError::Config)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Build the client-side connector: presents `cert`/`key` and verifies the
/// server against `peer_ca`.
pub fn load_connector(cert: &Path, key: &Path, peer_ca: &Path) -> Result<TlsConnector, TlsError> {
    install_provider();

    let certs = load_certs(cert)?;
    let key = load_key(key)?;
    let roots = load_roots(peer_ca)?;

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(TlsError::Config)?;

    Ok(TlsConnector::from(Arc::new(config)))
}
