//! HTTP signaling between exactly two peers.
//!
//! Wire format:
//! - `POST /sdp`: JSON-encoded session description (`{"type": ..., "sdp": ...}`)
//! - `POST /candidate`: one opaque candidate string as the raw body
//!
//! Handlers apply a message fully before answering, so a `200 OK` is an
//! end-to-end processing acknowledgement, not a receipt.

mod client;
mod server;

pub use client::HttpSignalingClient;
pub use server::{serve, signaling_router};

use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::error::Result;

/// Outbound half of the signaling channel.
#[async_trait::async_trait]
pub trait SignalingSender: Send + Sync {
    /// Deliver a session description to the peer.
    async fn send_description(&self, description: &RTCSessionDescription) -> Result<()>;

    /// Deliver one trickled candidate to the peer.
    async fn send_candidate(&self, candidate: &str) -> Result<()>;
}
