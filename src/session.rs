//! Per-connection protocol state machine.
//!
//! A session drives one participant from `AwaitingName` through `Registered`
//! to `Closed`. It is generic over the underlying duplex stream: the server
//! hands it a finished mutual-TLS stream, tests hand it an in-memory pipe,
//! and the machine cannot tell the difference.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use crate::protocol::{self, ServerLine};
use crate::registry::{Registry, RegistryError, SessionId};

/// Lifecycle of one connected participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected; no display name claimed yet.
    AwaitingName,
    /// Name claimed and sink published; inbound lines are chat messages.
    Registered { name: String },
    /// Terminal. Registry entries released, stream dropped.
    Closed,
}

/// One participant's state and stream, from accept to close.
pub struct Session<S> {
    id: SessionId,
    registry: Registry,
    frames: Framed<S, LinesCodec>,
    state: SessionState,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    /// Wrap an already-authenticated duplex stream in a new session.
    pub fn new(registry: Registry, stream: S) -> Self {
        Self {
            id: SessionId::new(),
            registry,
            frames: Framed::new(
                stream,
                LinesCodec::new_with_max_length(protocol::MAX_LINE_LEN),
            ),
            state: SessionState::AwaitingName,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Drive the session until its stream ends, then release everything it
    /// holds. Stream errors end the session; they are never propagated
    /// beyond it.
    pub async fn run(mut self) {
        match self.serve().await {
            Ok(()) => tracing::debug!(session = %self.id, "session closed"),
            Err(e) => {
                tracing::debug!(session = %self.id, error = %e, "session ended with stream error")
            }
        }
        self.close();
    }

    async fn serve(&mut self) -> Result<(), LinesCodecError> {
        let Some((name, outbound)) = self.negotiate_name().await? else {
            // Stream ended before a name was claimed; nothing to clean up
            // beyond the stream itself.
            return Ok(());
        };
        self.frames.send(ServerLine::NameAccepted.encode()).await?;
        tracing::info!(session = %self.id, name = %name, "participant registered");
        self.chat(name, outbound).await
    }

    /// `AwaitingName`: prompt until an unclaimed name is submitted.
    ///
    /// Retries are unbounded with no backoff; the exchange is paced by the
    /// client. Returns `None` on EOF before registration.
    async fn negotiate_name(
        &mut self,
    ) -> Result<Option<(String, mpsc::UnboundedReceiver<String>)>, LinesCodecError> {
        loop {
            self.frames.send(ServerLine::SubmitName.encode()).await?;
            let candidate = match self.frames.next().await {
                Some(line) => line?,
                None => return Ok(None),
            };
            let (tx, rx) = mpsc::unbounded_channel();
            match self.registry.try_register(&candidate, self.id, tx) {
                Ok(()) => {
                    self.state = SessionState::Registered {
                        name: candidate.clone(),
                    };
                    return Ok(Some((candidate, rx)));
                }
                Err(RegistryError::NameTaken(name)) => {
                    tracing::debug!(session = %self.id, name = %name, "name collision, re-prompting");
                }
            }
        }
    }

    /// `Registered`: inbound lines are broadcast to the room, outbound lines
    /// queued by the registry drain into this session's stream.
    async fn chat(
        &mut self,
        name: String,
        mut outbound: mpsc::UnboundedReceiver<String>,
    ) -> Result<(), LinesCodecError> {
        loop {
            tokio::select! {
                queued = outbound.recv() => match queued {
                    Some(line) => self.frames.send(line).await?,
                    // Sink was revoked out from under us; nothing left to
                    // deliver through this session.
                    None => return Ok(()),
                },
                inbound = self.frames.next() => match inbound {
                    Some(line) => self.registry.broadcast(&name, &line?),
                    None => return Ok(()),
                },
            }
        }
    }

    /// Terminal transition into `Closed`.
    ///
    /// Runs on every exit path (EOF, read error, write error) and is
    /// idempotent: the registered name and sink are released exactly once.
    fn close(&mut self) {
        if let SessionState::Registered { name } =
            std::mem::replace(&mut self.state, SessionState::Closed)
        {
            self.registry.unregister(&name);
            self.registry.remove_sink(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;

    struct TestClient {
        frames: Framed<DuplexStream, LinesCodec>,
    }

    impl TestClient {
        async fn recv(&mut self) -> String {
            tokio::time::timeout(std::time::Duration::from_secs(5), self.frames.next())
                .await
                .expect("timed out waiting for server line")
                .expect("stream ended unexpectedly")
                .expect("framing error")
        }

        async fn send(&mut self, line: &str) {
            self.frames.send(line.to_string()).await.expect("send failed");
        }
    }

    /// Spawn a session over an in-memory pipe and return the client end.
    fn connect(registry: &Registry) -> (TestClient, JoinHandle<()>) {
        let (server_io, client_io) = tokio::io::duplex(4096);
        let handle = tokio::spawn(Session::new(registry.clone(), server_io).run());
        let client = TestClient {
            frames: Framed::new(client_io, LinesCodec::new()),
        };
        (client, handle)
    }

    #[tokio::test]
    async fn registration_then_self_echo() {
        let registry = Registry::new();
        let (mut client, handle) = connect(&registry);

        assert_eq!(client.recv().await, "SUBMITNAME");
        client.send("alice").await;
        assert_eq!(client.recv().await, "NAMEACCEPTED");

        client.send("hi").await;
        assert_eq!(client.recv().await, "MESSAGE alice: hi");

        drop(client);
        handle.await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn collision_reprompts_until_unique() {
        let registry = Registry::new();
        let (mut alice, _alice_handle) = connect(&registry);
        assert_eq!(alice.recv().await, "SUBMITNAME");
        alice.send("alice").await;
        assert_eq!(alice.recv().await, "NAMEACCEPTED");

        let (mut bob, _bob_handle) = connect(&registry);
        assert_eq!(bob.recv().await, "SUBMITNAME");
        bob.send("alice").await;
        // Collision: prompted again, no acceptance.
        assert_eq!(bob.recv().await, "SUBMITNAME");
        bob.send("alice").await;
        assert_eq!(bob.recv().await, "SUBMITNAME");
        bob.send("bob").await;
        assert_eq!(bob.recv().await, "NAMEACCEPTED");

        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn broadcast_reaches_both_participants() {
        let registry = Registry::new();
        let (mut alice, _h1) = connect(&registry);
        alice.recv().await;
        alice.send("alice").await;
        alice.recv().await;

        let (mut bob, _h2) = connect(&registry);
        bob.recv().await;
        bob.send("bob").await;
        bob.recv().await;

        alice.send("hi").await;
        assert_eq!(alice.recv().await, "MESSAGE alice: hi");
        assert_eq!(bob.recv().await, "MESSAGE alice: hi");
    }

    #[tokio::test]
    async fn eof_before_registration_touches_nothing() {
        let registry = Registry::new();
        let (mut client, handle) = connect(&registry);
        assert_eq!(client.recv().await, "SUBMITNAME");

        drop(client);
        handle.await.unwrap();

        assert!(registry.is_empty());
        // The never-claimed name is free.
        let (mut next, _h) = connect(&registry);
        next.recv().await;
        next.send("alice").await;
        assert_eq!(next.recv().await, "NAMEACCEPTED");
    }

    #[tokio::test]
    async fn abrupt_disconnect_frees_the_name() {
        let registry = Registry::new();
        let (mut alice, handle) = connect(&registry);
        alice.recv().await;
        alice.send("alice").await;
        alice.recv().await;

        drop(alice);
        handle.await.unwrap();
        assert!(registry.is_empty());

        let (mut successor, _h) = connect(&registry);
        successor.recv().await;
        successor.send("alice").await;
        assert_eq!(successor.recv().await, "NAMEACCEPTED");
    }

    #[tokio::test]
    async fn recipient_disconnect_does_not_break_the_sender() {
        let registry = Registry::new();
        let (mut alice, _h1) = connect(&registry);
        alice.recv().await;
        alice.send("alice").await;
        alice.recv().await;

        let (mut bob, bob_handle) = connect(&registry);
        bob.recv().await;
        bob.send("bob").await;
        bob.recv().await;

        drop(bob);
        bob_handle.await.unwrap();

        // Alice keeps chatting and still hears herself.
        alice.send("anyone there?").await;
        assert_eq!(alice.recv().await, "MESSAGE alice: anyone there?");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn empty_line_is_a_valid_name() {
        let registry = Registry::new();
        let (mut client, _h) = connect(&registry);
        assert_eq!(client.recv().await, "SUBMITNAME");
        client.send("").await;
        assert_eq!(client.recv().await, "NAMEACCEPTED");

        client.send("hello").await;
        assert_eq!(client.recv().await, "MESSAGE : hello");
    }

    #[tokio::test]
    async fn pre_registration_lines_never_reach_the_room() {
        let registry = Registry::new();
        let (mut alice, _h1) = connect(&registry);
        alice.recv().await;
        alice.send("alice").await;
        alice.recv().await;

        // Bob's candidate names must not be broadcast, even the colliding one.
        let (mut bob, _h2) = connect(&registry);
        bob.recv().await;
        bob.send("alice").await;
        bob.recv().await;
        bob.send("bob").await;
        bob.recv().await;

        alice.send("ping").await;
        assert_eq!(alice.recv().await, "MESSAGE alice: ping");
        assert_eq!(bob.recv().await, "MESSAGE alice: ping");
    }
}
