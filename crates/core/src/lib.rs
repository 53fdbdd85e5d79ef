//! Peer-to-peer session establishment and media bridging
//!
//! This crate connects exactly two processes over a WebRTC transport
//! negotiated with plain HTTP signaling, then bridges media between an
//! inbound source and an outbound sink through a bounded handoff channel.
//!
//! # Features
//!
//! - **HTTP offer/answer signaling**: two POST endpoints per peer, trickled
//!   candidates, processing acknowledged end to end
//! - **Trickle gating**: locally discovered candidates buffer under one lock
//!   until the remote description is known, then flush in discovery order
//! - **Explicit link state machine**: table-checked transitions broadcast to
//!   observers; off-table engine noise is ignored
//! - **Bounded media bridge**: blocking handoff with backpressure, no drops,
//!   no reordering
//! - **Room publishing**: WHIP-style HTTP publish session for forwarding the
//!   received track
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │  initiator process              responder process     │
//! │  H264FileSource                 RemoteTrackSource     │
//! │    ↓ MediaBridge                  ↓ MediaBridge       │
//! │  SampleTrackSink                RtpForwardSink        │
//! │    ↓                              ↓                   │
//! │  ConnectionController ⇄ HTTP ⇄ ConnectionController   │
//! │  (offer, trickle)    signaling  (answer, trickle)     │
//! │                                   ↓                   │
//! │                                 RoomPublisher → room  │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use peerlink_core::config::{PeerConfig, PeerRole};
//!
//! let config = PeerConfig::initiator("0.0.0.0:50000", "http://127.0.0.1:60000")
//!     .with_handoff_capacity(1);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.role, PeerRole::Initiator);
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use peerlink_core::{
//!     build_peer_connection, ConnectionController, HttpSignalingClient, PeerConfig,
//! };
//!
//! # async fn example() -> peerlink_core::Result<()> {
//! let config = PeerConfig::initiator("0.0.0.0:50000", "http://127.0.0.1:60000");
//! config.validate()?;
//!
//! let pc = build_peer_connection(&config.stun_servers, &config.turn_servers).await?;
//! let signaling = Arc::new(HttpSignalingClient::new(config.peer_addr.clone()));
//! let controller = ConnectionController::new(config.role, pc, signaling);
//! controller.register_callbacks();
//! controller.start_negotiation().await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

// Public modules
pub mod bridge;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod publish;
pub mod signaling;
pub mod state;

// Re-exports for public API
pub use bridge::{
    BridgeOutcome, H264FileSource, MediaBridge, MediaSink, MediaSource, MediaUnit,
    RemoteTrackSource, RtpForwardSink, SampleTrackSink,
};
pub use config::{PeerConfig, PeerRole, PublishConfig, TurnServerConfig};
pub use controller::{ConnectionController, DescriptionOutcome, LinkEvent};
pub use engine::{build_peer_connection, h264_capability, spawn_rtcp_drain};
pub use error::{Error, Result};
pub use lifecycle::{terminate, ExitReason};
pub use publish::RoomPublisher;
pub use signaling::{serve, signaling_router, HttpSignalingClient, SignalingSender};
pub use state::LinkState;

/// Crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
