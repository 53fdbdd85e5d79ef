//! HTTP client for the peer's signaling endpoints

use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use super::SignalingSender;
use crate::error::{Error, Result};

/// Sends descriptions and candidates to the peer's signaling server.
///
/// Sends are one-shot: a connection error or a non-success status is a
/// delivery failure and is never retried.
#[derive(Debug, Clone)]
pub struct HttpSignalingClient {
    peer_base: String,
    http: reqwest::Client,
}

impl HttpSignalingClient {
    /// Create a client for a peer base URL such as `http://127.0.0.1:60000`.
    pub fn new(peer_base: impl Into<String>) -> Self {
        let peer_base: String = peer_base.into();
        Self {
            peer_base: peer_base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, body: String) -> Result<()> {
        let url = format!("{}{}", self.peer_base, path);
        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::SignalingDelivery(format!("POST {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::SignalingDelivery(format!(
                "POST {} returned {}",
                url,
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SignalingSender for HttpSignalingClient {
    async fn send_description(&self, description: &RTCSessionDescription) -> Result<()> {
        debug!(sdp_type = %description.sdp_type, "sending description");
        let payload = serde_json::to_string(description)?;
        self.post("/sdp", payload).await
    }

    async fn send_candidate(&self, candidate: &str) -> Result<()> {
        debug!(candidate = %candidate, "sending candidate");
        self.post("/candidate", candidate.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = HttpSignalingClient::new("http://127.0.0.1:60000/");
        assert_eq!(client.peer_base, "http://127.0.0.1:60000");
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_delivery_failure() {
        // Port 9 (discard) has no listener on loopback.
        let client = HttpSignalingClient::new("http://127.0.0.1:9");
        let result = client.send_candidate("candidate:1 1 udp 1 127.0.0.1 1 typ host").await;
        assert!(matches!(result, Err(Error::SignalingDelivery(_))));
    }
}
