//! Shared coordination state for the chat room.
//!
//! The registry owns the two sets whose consistency is a joint invariant:
//! the claimed display names and the active outbound sinks. Both live under
//! a single mutex; `try_register` is the only compound mutation and is
//! atomic by construction. Broadcast snapshots the sink set under the lock
//! and delivers outside it, so a slow or dying participant can never stall
//! registration or the other recipients.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::ServerLine;

/// Opaque per-connection identity, assigned at accept.
///
/// Distinct from the display name: it exists from accept to stream close,
/// while a name is only held between registration and cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Write endpoint through which broadcast lines reach one participant.
///
/// The receiving half stays exclusively owned by the session's select loop,
/// which drains it into the session's stream. The registry only ever holds
/// this sender, and only while the session is registered.
pub type Sink = mpsc::UnboundedSender<String>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("display name already taken: {0}")]
    NameTaken(String),
}

#[derive(Default)]
struct RegistryInner {
    names: HashSet<String>,
    sinks: HashMap<SessionId, Sink>,
}

/// The process-wide name/sink coordination structure.
///
/// Cheap to clone; all clones share the same state. The registry does not
/// own sessions: it holds a non-owning name and sink association that the
/// owning session releases during its terminal cleanup.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `name` and publish `sink` for broadcast delivery.
    ///
    /// Check-and-insert runs under one lock acquisition: no observer ever
    /// sees a claimed name without a deliverable sink, and no broadcast is
    /// delivered to a session that is not fully registered. A collision is
    /// an expected protocol branch, not a failure; the caller re-prompts.
    pub fn try_register(&self, name: &str, id: SessionId, sink: Sink) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        if inner.names.contains(name) {
            return Err(RegistryError::NameTaken(name.to_string()));
        }
        inner.names.insert(name.to_string());
        inner.sinks.insert(id, sink);
        Ok(())
    }

    /// Release a claimed name. No-op if the name is not claimed.
    pub fn unregister(&self, name: &str) {
        self.inner.lock().names.remove(name);
    }

    /// Revoke a published sink. No-op if the sink is already gone.
    pub fn remove_sink(&self, id: SessionId) {
        self.inner.lock().sinks.remove(&id);
    }

    /// Fan one chat line out to every registered participant, the sender
    /// included (self-echo is part of the room's observed behavior).
    ///
    /// Delivery goes to a snapshot of the sink set taken at the moment the
    /// broadcast begins: a session registering afterwards may miss this
    /// message, and one disconnecting mid-delivery is skipped and scheduled
    /// for removal without affecting the remaining recipients or surfacing
    /// an error to the sender.
    pub fn broadcast(&self, sender: &str, text: &str) {
        let line = ServerLine::message(sender, text).encode();
        let targets: Vec<(SessionId, Sink)> = {
            let inner = self.inner.lock();
            inner
                .sinks
                .iter()
                .map(|(id, sink)| (*id, sink.clone()))
                .collect()
        };
        for (id, sink) in targets {
            if sink.send(line.clone()).is_err() {
                tracing::debug!(session = %id, "sink closed mid-broadcast, removing");
                self.remove_sink(id);
            }
        }
    }

    /// Number of currently registered participants.
    pub fn len(&self) -> usize {
        self.inner.lock().sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
