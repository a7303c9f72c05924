//! parley - a mutually-authenticated broadcast chat hub.
//!
//! A server accepts many simultaneous mutual-TLS connections, runs each
//! through a two-phase registration protocol (claim a unique display name,
//! then become an active participant), and fans every chat line out to all
//! registered participants.
//!
//! ## Layout
//!
//! - [`registry`] - the shared name/sink coordination structure; the only
//!   place where shared mutable state lives.
//! - [`session`] - the per-connection state machine, generic over the
//!   underlying duplex stream.
//! - [`server`] - the TCP accept loop that performs TLS handshakes and
//!   spawns one session task per connection.
//! - [`protocol`] - the line-oriented wire vocabulary.
//! - [`tls`] - mutual-TLS acceptor/connector construction from PEM files.
//! - [`client`] - a thin terminal participant speaking the same protocol.
//! - [`config`] - TOML server configuration and flag/file resolution.

pub mod client;
pub mod config;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod tls;
