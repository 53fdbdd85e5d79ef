//! Link state machine

use std::fmt;

use serde::{Deserialize, Serialize};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// Lifecycle of a peer link.
///
/// `Failed` and `Closed` are terminal. A link that loses connectivity moves
/// to `Disconnected` and may come back to `Connected`; everything else is
/// one-way. Transitions outside the table are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// Created, negotiation not started
    New,
    /// Offer/answer and candidate exchange in progress
    Negotiating,
    /// Transport established, media can flow
    Connected,
    /// Connectivity lost, may recover
    Disconnected,
    /// Transport gave up; terminal
    Failed,
    /// Locally closed; terminal
    Closed,
}

impl LinkState {
    /// Whether the machine allows moving from `self` to `to`.
    pub fn can_transition(self, to: LinkState) -> bool {
        use LinkState::*;
        matches!(
            (self, to),
            (New, Negotiating)
                | (New, Failed)
                | (New, Closed)
                | (Negotiating, Connected)
                | (Negotiating, Failed)
                | (Negotiating, Closed)
                | (Connected, Disconnected)
                | (Connected, Failed)
                | (Connected, Closed)
                | (Disconnected, Connected)
                | (Disconnected, Failed)
                | (Disconnected, Closed)
        )
    }

    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, LinkState::Failed | LinkState::Closed)
    }

    /// Maps an engine connection state onto the link machine. `None` means
    /// the engine state carries no transition for us.
    pub(crate) fn from_engine(state: RTCPeerConnectionState) -> Option<LinkState> {
        match state {
            RTCPeerConnectionState::Connecting => Some(LinkState::Negotiating),
            RTCPeerConnectionState::Connected => Some(LinkState::Connected),
            RTCPeerConnectionState::Disconnected => Some(LinkState::Disconnected),
            RTCPeerConnectionState::Failed => Some(LinkState::Failed),
            RTCPeerConnectionState::Closed => Some(LinkState::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::New => "new",
            LinkState::Negotiating => "negotiating",
            LinkState::Connected => "connected",
            LinkState::Disconnected => "disconnected",
            LinkState::Failed => "failed",
            LinkState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LinkState::*;

    const ALL: [LinkState; 6] = [New, Negotiating, Connected, Disconnected, Failed, Closed];

    #[test]
    fn test_transition_table() {
        let allowed = [
            (New, Negotiating),
            (New, Failed),
            (New, Closed),
            (Negotiating, Connected),
            (Negotiating, Failed),
            (Negotiating, Closed),
            (Connected, Disconnected),
            (Connected, Failed),
            (Connected, Closed),
            (Disconnected, Connected),
            (Disconnected, Failed),
            (Disconnected, Closed),
        ];
        for from in ALL {
            for to in ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition(to),
                    expected,
                    "transition {} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [Failed, Closed] {
            assert!(terminal.is_terminal());
            for to in ALL {
                assert!(!terminal.can_transition(to));
            }
        }
    }

    #[test]
    fn test_self_transitions_rejected() {
        for state in ALL {
            assert!(!state.can_transition(state));
        }
    }

    #[test]
    fn test_disconnected_can_recover() {
        assert!(Connected.can_transition(Disconnected));
        assert!(Disconnected.can_transition(Connected));
    }

    #[test]
    fn test_engine_state_mapping() {
        assert_eq!(
            LinkState::from_engine(RTCPeerConnectionState::Connected),
            Some(Connected)
        );
        assert_eq!(
            LinkState::from_engine(RTCPeerConnectionState::Failed),
            Some(Failed)
        );
        assert_eq!(LinkState::from_engine(RTCPeerConnectionState::New), None);
    }
}
