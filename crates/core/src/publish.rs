//! Publish session: one outbound H.264 track pushed to a media room
//!
//! The room endpoint speaks the WHIP-style HTTP exchange: the offer goes out
//! as `application/sdp` with an optional bearer token, the answer comes back
//! in the response body, and a `Location` header names the session resource
//! used for teardown.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, LOCATION};
use tracing::{debug, info, warn};
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;

use crate::config::{PeerConfig, PublishConfig};
use crate::engine::{build_peer_connection, h264_capability, spawn_rtcp_drain};
use crate::error::{Error, Result};

/// A connected publish session carrying one RTP video track.
#[derive(Debug)]
pub struct RoomPublisher {
    peer_connection: Arc<RTCPeerConnection>,
    track: Arc<TrackLocalStaticRTP>,
    http: reqwest::Client,
    session_url: Option<String>,
}

impl RoomPublisher {
    /// Negotiate a publish session. Runs to completion before signaling with
    /// the peer starts; a failure here is fatal at startup.
    pub async fn connect(peer_config: &PeerConfig, publish: &PublishConfig) -> Result<Self> {
        let peer_connection =
            build_peer_connection(&peer_config.stun_servers, &peer_config.turn_servers).await?;

        let track = Arc::new(TrackLocalStaticRTP::new(
            h264_capability(),
            publish.track_id.clone(),
            publish.stream_id.clone(),
        ));
        let sender = peer_connection
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::Publish(format!("Failed to add publish track: {}", e)))?;
        spawn_rtcp_drain(sender);

        let offer = peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::Publish(format!("Failed to create publish offer: {}", e)))?;
        // Publish endpoints take one complete description, so wait for
        // gathering instead of trickling.
        let mut gather_done = peer_connection.gathering_complete_promise().await;
        peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| Error::Publish(format!("Failed to set publish description: {}", e)))?;
        let _ = gather_done.recv().await;

        let local = peer_connection
            .local_description()
            .await
            .ok_or_else(|| Error::Publish("No local description after gathering".to_string()))?;

        let http = reqwest::Client::new();
        let mut request = http
            .post(&publish.endpoint)
            .header(CONTENT_TYPE, "application/sdp")
            .body(local.sdp);
        if !publish.token.is_empty() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", publish.token));
        }
        let response = request.send().await.map_err(|e| {
            Error::Publish(format!("Publish POST {} failed: {}", publish.endpoint, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Publish(format!(
                "Publish endpoint {} returned {}",
                publish.endpoint, status
            )));
        }

        let session_url = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(|location| resolve_session_url(&publish.endpoint, location));

        let answer_sdp = response
            .text()
            .await
            .map_err(|e| Error::Publish(format!("Failed to read publish answer: {}", e)))?;
        let answer = RTCSessionDescription::answer(answer_sdp)
            .map_err(|e| Error::Publish(format!("Publish answer rejected: {}", e)))?;
        peer_connection
            .set_remote_description(answer)
            .await
            .map_err(|e| Error::Publish(format!("Failed to apply publish answer: {}", e)))?;

        info!(
            endpoint = %publish.endpoint,
            session_url = ?session_url,
            "publish session established"
        );
        Ok(Self {
            peer_connection,
            track,
            http,
            session_url,
        })
    }

    /// The outbound track forwarded media is written to.
    pub fn track(&self) -> Arc<TrackLocalStaticRTP> {
        Arc::clone(&self.track)
    }

    /// Tear the session down: DELETE the session resource, then close the
    /// connection. A rejected DELETE is logged, not fatal.
    pub async fn close(&self) -> Result<()> {
        if let Some(session_url) = &self.session_url {
            debug!(session_url = %session_url, "deleting publish session");
            match self.http.delete(session_url).send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), "publish session delete rejected");
                }
                Err(e) => warn!(error = %e, "publish session delete failed"),
                _ => {}
            }
        }
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::Publish(format!("Failed to close publish connection: {}", e)))
    }
}

/// Resolve a possibly relative `Location` header against the endpoint origin.
fn resolve_session_url(endpoint: &str, location: &str) -> String {
    if location.starts_with('/') {
        let origin: String = endpoint.split('/').take(3).collect::<Vec<_>>().join("/");
        format!("{}{}", origin, location)
    } else {
        location.to_string()
    }
}
