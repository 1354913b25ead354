//! Real-time media session
//!
//! The transport itself (join/leave, publish/subscribe, token renewal) is an
//! opaque capability behind `MediaTransport`. `MediaSessionClient` layers the
//! connection state machine, gap-free publication and the delayed
//! stream-subscribe retry on top of it. `TrackRegistry` maps transport ids
//! and participants to UI render targets.

mod client;
mod registry;
mod transport;

pub use client::{ConnectionIndicator, MediaSessionClient};
pub use registry::{RenderTarget, TrackRegistry};
pub use transport::{
    ConnectionChangeReason, ConnectionState, JoinParams, MediaTransport, RemoteTrack, TransportEvent,
};
