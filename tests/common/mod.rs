#![allow(dead_code)]

//! Shared helpers for integration tests: a throwaway CA issuing CA-signed
//! identities, a running hub bound to an ephemeral port, and a line-level
//! chat participant over mutual TLS.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;

use parley::registry::Registry;
use parley::server;
use parley::tls;

/// PEM paths for one CA-signed identity.
pub struct Identity {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// A test CA that can issue identities, with its root written as PEM.
pub struct TestCa {
    dir: PathBuf,
    ca_key: rcgen::KeyPair,
    ca_cert: rcgen::Certificate,
    pub ca_path: PathBuf,
}

impl TestCa {
    pub fn new(dir: &Path, stem: &str) -> Self {
        let ca_key = rcgen::KeyPair::generate().unwrap();
        let mut params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let ca_cert = params.self_signed(&ca_key).unwrap();

        let ca_path = dir.join(format!("{stem}.pem"));
        std::fs::write(&ca_path, ca_cert.pem()).unwrap();

        Self {
            dir: dir.to_path_buf(),
            ca_key,
            ca_cert,
            ca_path,
        }
    }

    /// Issue an identity valid for "localhost", signed by this CA.
    pub fn issue(&self, stem: &str) -> Identity {
        let key = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let cert = params.signed_by(&key, &self.ca_cert, &self.ca_key).unwrap();

        let cert_path = self.dir.join(format!("{stem}-cert.pem"));
        let key_path = self.dir.join(format!("{stem}-key.pem"));
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(&key_path, key.serialize_pem()).unwrap();
        Identity {
            cert: cert_path,
            key: key_path,
        }
    }
}

/// A running hub on an ephemeral port, with a connector for a trusted
/// client identity.
pub struct TestHub {
    pub addr: SocketAddr,
    pub registry: Registry,
    pub connector: tokio_rustls::TlsConnector,
    pub ca_path: PathBuf,
    cancel: CancellationToken,
    _dir: tempfile::TempDir,
}

impl TestHub {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ca = TestCa::new(dir.path(), "ca");
        let server_id = ca.issue("server");
        let client_id = ca.issue("client");

        let acceptor = tls::load_acceptor(&server_id.cert, &server_id.key, &ca.ca_path).unwrap();
        let connector = tls::load_connector(&client_id.cert, &client_id.key, &ca.ca_path).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = Registry::new();
        let cancel = CancellationToken::new();
        tokio::spawn(server::serve(
            registry.clone(),
            listener,
            acceptor,
            cancel.clone(),
        ));

        Self {
            addr,
            registry,
            connector,
            ca_path: ca.ca_path.clone(),
            cancel,
            _dir: dir,
        }
    }

    /// Connect with the hub's trusted client identity.
    pub async fn connect(&self) -> Chatter {
        let tcp = TcpStream::connect(self.addr).await.unwrap();
        let domain = ServerName::try_from("localhost".to_string()).unwrap();
        let stream = self.connector.connect(domain, tcp).await.unwrap();
        Chatter {
            frames: Framed::new(stream, LinesCodec::new()),
        }
    }
}

impl Drop for TestHub {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// One line-level participant on an established mutual-TLS stream.
pub struct Chatter {
    pub frames: Framed<TlsStream<TcpStream>, LinesCodec>,
}

impl Chatter {
    pub async fn recv(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(5), self.frames.next())
            .await
            .expect("timed out waiting for server line")
            .expect("stream ended unexpectedly")
            .expect("framing error")
    }

    pub async fn send(&mut self, line: &str) {
        self.frames.send(line.to_string()).await.expect("send failed");
    }

    /// Complete the registration handshake with `name`, which must be free.
    pub async fn register(&mut self, name: &str) {
        assert_eq!(self.recv().await, "SUBMITNAME");
        self.send(name).await;
        assert_eq!(self.recv().await, "NAMEACCEPTED");
    }
}
