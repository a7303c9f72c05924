//! TCP accept loop for the chat hub.
//!
//! One task per connection: the accept loop never blocks on application
//! logic, and a failed TLS handshake closes that one connection without
//! touching the loop or the other sessions. Binding the listener is the
//! caller's job, so the only fatal failure (inability to listen at all)
//! surfaces before this loop starts.

use std::io;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use crate::registry::Registry;
use crate::session::Session;

/// Accept connections until `cancel` fires, spawning an independent session
/// task for each mutually-authenticated stream.
pub async fn serve(
    registry: Registry,
    listener: TcpListener,
    acceptor: TlsAcceptor,
    cancel: CancellationToken,
) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "chat hub listening");
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("accept loop cancelled, stopping");
                break;
            }
            result = listener.accept() => match result {
                Ok((tcp, peer)) => {
                    let registry = registry.clone();
                    let acceptor = acceptor.clone();
                    tokio::spawn(async move {
                        let stream = match acceptor.accept(tcp).await {
                            Ok(stream) => stream,
                            Err(e) => {
                                // Unauthenticated or broken peer: reject this
                                // connection only.
                                tracing::warn!(%peer, error = %e, "TLS handshake failed");
                                return;
                            }
                        };
                        tracing::debug!(%peer, "participant connected");
                        Session::new(registry, stream).run().await;
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                    // Backoff to prevent a tight loop under sustained accept errors
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
    Ok(())
}
