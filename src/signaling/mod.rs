//! Signaling channel for presence, chat, status and moderation
//!
//! Runs on its own connection with its own reconnect policy, independent of
//! the media transport. A permanent signaling failure degrades the session
//! to media-only instead of ending it.

pub mod channel;
pub mod messages;
pub mod nats;
mod transport;

pub use channel::{SignalingChannel, SignalingEvent, SignalingStatus};
pub use messages::{EventFamily, SignalEnvelope, SignalMessage};
pub use nats::NatsSignalingTransport;
pub use transport::{Inbound, SignalingTransport};
