//! Thin terminal client for the chat hub.
//!
//! Connects over mutual TLS and drives the line protocol: answers
//! `SUBMITNAME` with the configured name (or a candidate read from stdin),
//! unlocks chat input only after `NAMEACCEPTED`, and prints `MESSAGE`
//! payloads to stdout. Lines typed before registration are held back as
//! name candidates; they are never sent as chat.

use std::io;
use std::path::PathBuf;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_util::codec::{Framed, LinesCodec};

use crate::protocol::{self, ServerLine};
use crate::tls;

/// Everything needed to join a hub as a participant.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Server address, host:port.
    pub addr: String,
    /// Name the server certificate must be valid for.
    pub server_name: String,
    /// Display name to claim. Prompted on stdin if absent or taken.
    pub name: Option<String>,
    pub cert: PathBuf,
    pub key: PathBuf,
    pub peer_ca: PathBuf,
}

/// Connect and run the protocol loop until the server disconnects or stdin
/// closes.
pub async fn run(opts: ClientOptions) -> io::Result<()> {
    let connector =
        tls::load_connector(&opts.cert, &opts.key, &opts.peer_ca).map_err(io::Error::other)?;

    let tcp = TcpStream::connect(&opts.addr).await?;
    let domain = ServerName::try_from(opts.server_name.clone())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let stream = connector.connect(domain, tcp).await?;
    tracing::debug!(addr = %opts.addr, "connected to chat hub");

    let mut frames = Framed::new(
        stream,
        LinesCodec::new_with_max_length(protocol::MAX_LINE_LEN),
    );

    // Stdin is read on a blocking thread and fed through a channel; the
    // select loop below is the only consumer.
    let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(16);
    tokio::task::spawn_blocking(move || {
        use std::io::BufRead;
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if stdin_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let mut pending_name = opts.name;
    let mut registered = false;

    loop {
        tokio::select! {
            inbound = frames.next() => {
                let line = match inbound {
                    Some(line) => line.map_err(io::Error::other)?,
                    None => {
                        eprintln!("server closed the connection");
                        break;
                    }
                };
                match ServerLine::parse(&line) {
                    Some(ServerLine::SubmitName) => {
                        let candidate = match pending_name.take() {
                            Some(name) => name,
                            None => {
                                eprintln!("choose a screen name:");
                                match stdin_rx.recv().await {
                                    Some(name) => name,
                                    None => break,
                                }
                            }
                        };
                        frames.send(candidate).await.map_err(io::Error::other)?;
                    }
                    Some(ServerLine::NameAccepted) => {
                        registered = true;
                        // Discard anything typed before registration; chat
                        // input starts now.
                        while stdin_rx.try_recv().is_ok() {}
                        eprintln!("name accepted, you are in the room");
                    }
                    Some(ServerLine::Message(body)) => println!("{body}"),
                    None => tracing::debug!(line = %line, "ignoring unknown server line"),
                }
            }
            // Chat input is only live once registered; earlier lines stay
            // queued and serve as name candidates above.
            typed = stdin_rx.recv(), if registered => match typed {
                Some(text) => frames.send(text).await.map_err(io::Error::other)?,
                None => break,
            },
        }
    }

    Ok(())
}
