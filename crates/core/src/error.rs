//! Error types for the peerlink core.

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while establishing or running a peer link.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The transport engine could not be created, wired up, or shut down
    #[error("Engine error: {0}")]
    Engine(String),

    /// A description or candidate could not be delivered to the peer
    #[error("Signaling delivery error: {0}")]
    SignalingDelivery(String),

    /// An inbound message could not be decoded or is not valid for this role
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Offer/answer negotiation failed inside the engine
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// A remote candidate was rejected by the engine
    #[error("Candidate error: {0}")]
    Candidate(String),

    /// Media track operation error
    #[error("Media track error: {0}")]
    MediaTrack(String),

    /// The publish endpoint rejected or dropped the session
    #[error("Publish error: {0}")]
    Publish(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for other errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Returns true for failures that happen while the process is still
    /// setting up (configuration, engine construction, socket binds,
    /// publish connect).
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            Error::InvalidConfig(_) | Error::Engine(_) | Error::Publish(_) | Error::Io(_)
        )
    }

    /// Returns true when a message could not be delivered to the peer.
    pub fn is_delivery_failure(&self) -> bool {
        matches!(self, Error::SignalingDelivery(_))
    }

    /// Returns true when the peer sent something this process cannot accept.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::MalformedMessage(_)
                | Error::Negotiation(_)
                | Error::Candidate(_)
                | Error::Serialization(_)
        )
    }
}
