//! Line-oriented wire vocabulary exchanged over each session stream.
//!
//! Every protocol message is exactly one newline-terminated UTF-8 line; no
//! escaping of embedded newlines is defined. The server->client direction
//! carries three tagged lines (`SUBMITNAME`, `NAMEACCEPTED`, `MESSAGE ...`).
//! The client->server direction is untagged free text: a line is a candidate
//! name or a chat message depending on the session's state, never on its
//! content.

/// Request a display name from the client.
pub const SUBMIT_NAME: &str = "SUBMITNAME";

/// Registration succeeded; the client may start chatting.
pub const NAME_ACCEPTED: &str = "NAMEACCEPTED";

/// Prefix carried by every broadcast payload line.
pub const MESSAGE_PREFIX: &str = "MESSAGE ";

/// Maximum accepted line length in bytes. Caps per-connection buffer growth;
/// an overlong line is a framing error that closes that one session.
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// A server->client protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// Ask the client for a (new) display name.
    SubmitName,
    /// Acknowledge a successful registration.
    NameAccepted,
    /// Broadcast payload as displayed by clients: `<sender>: <text>`.
    Message(String),
}

impl ServerLine {
    /// Build the broadcast line for one chat message.
    pub fn message(sender: &str, text: &str) -> Self {
        Self::Message(format!("{sender}: {text}"))
    }

    /// Wire form, without the trailing newline (framing adds it).
    pub fn encode(&self) -> String {
        match self {
            Self::SubmitName => SUBMIT_NAME.to_string(),
            Self::NameAccepted => NAME_ACCEPTED.to_string(),
            Self::Message(body) => format!("{MESSAGE_PREFIX}{body}"),
        }
    }

    /// Parse a server line by prefix.
    ///
    /// Dispatch is prefix-based, matching what clients of this protocol have
    /// always done; lines that carry none of the known prefixes yield `None`
    /// and are ignored by clients.
    pub fn parse(line: &str) -> Option<Self> {
        if line.starts_with(SUBMIT_NAME) {
            Some(Self::SubmitName)
        } else if line.starts_with(NAME_ACCEPTED) {
            Some(Self::NameAccepted)
        } else {
            line.strip_prefix(MESSAGE_PREFIX)
                .map(|body| Self::Message(body.to_string()))
        }
    }
}
