//! Configuration types for peer sessions and publishing

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which side of the offer/answer exchange this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    /// Creates the offer and dials the peer first
    Initiator,
    /// Waits for the offer and answers it
    Responder,
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRole::Initiator => write!(f, "initiator"),
            PeerRole::Responder => write!(f, "responder"),
        }
    }
}

/// Main configuration for one peer process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Role this process plays in the exchange
    pub role: PeerRole,

    /// Local address the signaling server binds to
    pub listen_addr: String,

    /// Base URL of the peer's signaling server (http:// or https://)
    pub peer_addr: String,

    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Media handoff channel capacity in units (default: 1)
    pub handoff_capacity: usize,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn:// or turns://)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Configuration for the outbound publish session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Publish endpoint URL accepting an SDP offer (http:// or https://)
    pub endpoint: String,

    /// Bearer token for the publish endpoint (empty for none)
    pub token: String,

    /// Stream identifier for the published track
    pub stream_id: String,

    /// Track identifier for the published track
    pub track_id: String,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            role: PeerRole::Initiator,
            listen_addr: "0.0.0.0:50000".to_string(),
            peer_addr: "http://127.0.0.1:60000".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            handoff_capacity: 1,
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:7880/whip".to_string(),
            token: String::new(),
            stream_id: "peerlink".to_string(),
            track_id: "video".to_string(),
        }
    }
}

impl PeerConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `listen_addr` is not a parseable socket address
    /// - `peer_addr` is not an HTTP(S) URL
    /// - `stun_servers` is empty
    /// - `handoff_capacity` is zero
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(Error::InvalidConfig(format!(
                "listen_addr must be a socket address like 0.0.0.0:50000, got {}",
                self.listen_addr
            )));
        }

        if !self.peer_addr.starts_with("http://") && !self.peer_addr.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "peer_addr must start with http:// or https://, got {}",
                self.peer_addr
            )));
        }

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        if self.handoff_capacity == 0 {
            return Err(Error::InvalidConfig(
                "handoff_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Create a configuration for the offering side
    ///
    /// # Example
    ///
    /// ```
    /// use peerlink_core::config::{PeerConfig, PeerRole};
    ///
    /// let config = PeerConfig::initiator("0.0.0.0:50000", "http://127.0.0.1:60000");
    /// assert_eq!(config.role, PeerRole::Initiator);
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn initiator(listen_addr: &str, peer_addr: &str) -> Self {
        Self {
            role: PeerRole::Initiator,
            listen_addr: listen_addr.to_string(),
            peer_addr: peer_addr.to_string(),
            ..Default::default()
        }
    }

    /// Create a configuration for the answering side
    ///
    /// # Example
    ///
    /// ```
    /// use peerlink_core::config::{PeerConfig, PeerRole};
    ///
    /// let config = PeerConfig::responder("0.0.0.0:60000", "http://127.0.0.1:50000");
    /// assert_eq!(config.role, PeerRole::Responder);
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn responder(listen_addr: &str, peer_addr: &str) -> Self {
        Self {
            role: PeerRole::Responder,
            listen_addr: listen_addr.to_string(),
            peer_addr: peer_addr.to_string(),
            ..Default::default()
        }
    }

    /// Builder: set STUN servers
    pub fn with_stun_servers(mut self, servers: Vec<String>) -> Self {
        self.stun_servers = servers;
        self
    }

    /// Builder: set TURN servers
    pub fn with_turn_servers(mut self, servers: Vec<TurnServerConfig>) -> Self {
        self.turn_servers = servers;
        self
    }

    /// Builder: set the handoff capacity
    pub fn with_handoff_capacity(mut self, capacity: usize) -> Self {
        self.handoff_capacity = capacity;
        self
    }
}

impl PublishConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if `endpoint` is not an HTTP(S) URL or either
    /// identifier is empty.
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "publish endpoint must start with http:// or https://, got {}",
                self.endpoint
            )));
        }

        if self.stream_id.is_empty() || self.track_id.is_empty() {
            return Err(Error::InvalidConfig(
                "publish stream_id and track_id must be non-empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PeerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.role, PeerRole::Initiator);
        assert_eq!(config.handoff_capacity, 1);
    }

    #[test]
    fn test_role_presets() {
        let config = PeerConfig::initiator("0.0.0.0:50000", "http://127.0.0.1:60000");
        assert_eq!(config.role, PeerRole::Initiator);
        assert_eq!(config.listen_addr, "0.0.0.0:50000");

        let config = PeerConfig::responder("0.0.0.0:60000", "http://127.0.0.1:50000");
        assert_eq!(config.role, PeerRole::Responder);
        assert_eq!(config.peer_addr, "http://127.0.0.1:50000");
    }

    #[test]
    fn test_invalid_listen_addr_rejected() {
        let mut config = PeerConfig::default();
        config.listen_addr = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_peer_addr_rejected() {
        let mut config = PeerConfig::default();
        config.peer_addr = "ftp://127.0.0.1:60000".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_stun_servers_rejected() {
        let config = PeerConfig::default().with_stun_servers(Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_handoff_capacity_rejected() {
        let config = PeerConfig::default().with_handoff_capacity(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_turn_server_builder() {
        let config = PeerConfig::default().with_turn_servers(vec![TurnServerConfig {
            url: "turn:turn.example.com:3478".to_string(),
            username: "user".to_string(),
            credential: "pass".to_string(),
        }]);
        assert!(config.validate().is_ok());
        assert_eq!(config.turn_servers.len(), 1);
    }

    #[test]
    fn test_publish_config_defaults_valid() {
        let config = PublishConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_publish_endpoint_scheme_rejected() {
        let mut config = PublishConfig::default();
        config.endpoint = "ws://127.0.0.1:7880".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_publish_empty_ids_rejected() {
        let mut config = PublishConfig::default();
        config.track_id = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = PeerConfig::responder("0.0.0.0:60000", "http://127.0.0.1:50000")
            .with_handoff_capacity(4);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PeerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.role, PeerRole::Responder);
        assert_eq!(parsed.handoff_capacity, 4);
        assert_eq!(parsed.listen_addr, config.listen_addr);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(PeerRole::Initiator.to_string(), "initiator");
        assert_eq!(PeerRole::Responder.to_string(), "responder");
    }
}
