//! Connection control: negotiation, candidate trickling, state tracking

use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_remote::TrackRemote;

use crate::config::PeerRole;
use crate::error::{Error, Result};
use crate::signaling::SignalingSender;
use crate::state::LinkState;

/// Outcome of applying a remote description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionOutcome {
    /// First description from this peer; applied and acted upon
    Applied,
    /// The peer re-sent its description; benign no-op
    Duplicate,
}

/// Events broadcast to controller observers.
#[derive(Clone)]
pub enum LinkEvent {
    /// The link moved to a new state
    StateChanged { from: LinkState, to: LinkState },
    /// A remote media track started
    TrackArrived(Arc<TrackRemote>),
    /// A description or candidate could not be delivered to the peer
    SignalingFailed(String),
    /// The peer sent something this process cannot accept
    ProtocolViolation(String),
}

impl fmt::Debug for LinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkEvent::StateChanged { from, to } => f
                .debug_struct("StateChanged")
                .field("from", from)
                .field("to", to)
                .finish(),
            LinkEvent::TrackArrived(track) => {
                f.debug_tuple("TrackArrived").field(&track.id()).finish()
            }
            LinkEvent::SignalingFailed(msg) => {
                f.debug_tuple("SignalingFailed").field(msg).finish()
            }
            LinkEvent::ProtocolViolation(msg) => {
                f.debug_tuple("ProtocolViolation").field(msg).finish()
            }
        }
    }
}

/// Pending candidates plus the remote-description flag, guarded by one lock
/// so buffer-or-send is decided atomically against the description exchange.
#[derive(Debug, Default)]
struct TrickleGate {
    remote_known: bool,
    pending: Vec<String>,
}

/// Drives one peer connection through offer/answer negotiation and candidate
/// trickling, and broadcasts link events to observers.
pub struct ConnectionController {
    role: PeerRole,
    peer_connection: Arc<RTCPeerConnection>,
    signaling: Arc<dyn SignalingSender>,
    gate: Mutex<TrickleGate>,
    state: RwLock<LinkState>,
    events: broadcast::Sender<LinkEvent>,
}

impl ConnectionController {
    /// Create a controller around an existing peer connection.
    pub fn new(
        role: PeerRole,
        peer_connection: Arc<RTCPeerConnection>,
        signaling: Arc<dyn SignalingSender>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            role,
            peer_connection,
            signaling,
            gate: Mutex::new(TrickleGate::default()),
            state: RwLock::new(LinkState::New),
            events,
        })
    }

    /// Role this controller negotiates as.
    pub fn role(&self) -> PeerRole {
        self.role
    }

    /// Current link state.
    pub async fn state(&self) -> LinkState {
        *self.state.read().await
    }

    /// Subscribe to link events.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Wire the engine callbacks into the controller. Call once, before
    /// negotiation starts.
    pub fn register_callbacks(self: &Arc<Self>) {
        let controller = Arc::clone(self);
        self.peer_connection
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let controller = Arc::clone(&controller);
                Box::pin(async move {
                    if let Some(candidate) = candidate {
                        controller.handle_local_candidate(candidate).await;
                    }
                })
            }));

        let controller = Arc::clone(self);
        self.peer_connection.on_peer_connection_state_change(Box::new(
            move |engine_state: RTCPeerConnectionState| {
                let controller = Arc::clone(&controller);
                Box::pin(async move {
                    debug!(state = %engine_state, "engine connection state changed");
                    if let Some(target) = LinkState::from_engine(engine_state) {
                        controller.advance(target).await;
                    }
                })
            },
        ));

        let controller = Arc::clone(self);
        self.peer_connection
            .on_track(Box::new(move |track, _receiver, _transceiver| {
                let controller = Arc::clone(&controller);
                Box::pin(async move {
                    info!(
                        track_id = %track.id(),
                        mime_type = %track.codec().capability.mime_type,
                        "remote track arrived"
                    );
                    controller.emit(LinkEvent::TrackArrived(track));
                })
            }));
    }

    /// Start negotiation from the initiator side: create the offer, set it
    /// locally (which starts candidate discovery), and send it to the peer.
    #[instrument(skip(self), fields(role = %self.role))]
    pub async fn start_negotiation(&self) -> Result<()> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::Engine(format!("Failed to create offer: {}", e)))?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await
            .map_err(|e| Error::Engine(format!("Failed to set local description: {}", e)))?;
        self.advance(LinkState::Negotiating).await;
        info!("sending offer");
        self.signaling.send_description(&offer).await?;
        Ok(())
    }

    /// Apply the description received from the peer.
    ///
    /// The first call applies it to the engine, answers it when this side is
    /// the responder (the answer travels before any trickled candidate), and
    /// flushes every buffered candidate in discovery order. Later calls are
    /// idempotent no-ops.
    #[instrument(skip(self, description), fields(role = %self.role, sdp_type = %description.sdp_type))]
    pub async fn apply_remote_description(
        &self,
        description: RTCSessionDescription,
    ) -> Result<DescriptionOutcome> {
        let expected = match self.role {
            PeerRole::Initiator => RTCSdpType::Answer,
            PeerRole::Responder => RTCSdpType::Offer,
        };
        if description.sdp_type != expected {
            return Err(Error::MalformedMessage(format!(
                "{} expects a remote {}, got {}",
                self.role, expected, description.sdp_type
            )));
        }

        // One lock spans the whole exchange: a candidate discovered while
        // this runs is either buffered and flushed below, or sent after the
        // flush, never both and never lost.
        let mut gate = self.gate.lock().await;
        if gate.remote_known {
            debug!("duplicate remote description ignored");
            return Ok(DescriptionOutcome::Duplicate);
        }

        self.peer_connection
            .set_remote_description(description)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to set remote description: {}", e)))?;
        self.advance(LinkState::Negotiating).await;

        if self.role == PeerRole::Responder {
            let answer = self
                .peer_connection
                .create_answer(None)
                .await
                .map_err(|e| Error::Negotiation(format!("Failed to create answer: {}", e)))?;
            // The answer must reach the peer before any candidate does.
            info!("sending answer");
            self.signaling.send_description(&answer).await?;
            self.peer_connection
                .set_local_description(answer)
                .await
                .map_err(|e| {
                    Error::Negotiation(format!("Failed to set local description: {}", e))
                })?;
        }

        gate.remote_known = true;
        let pending = std::mem::take(&mut gate.pending);
        let flushed = pending.len();
        for candidate in pending {
            self.signaling.send_candidate(&candidate).await?;
        }
        if flushed > 0 {
            info!(count = flushed, "flushed buffered candidates");
        }
        Ok(DescriptionOutcome::Applied)
    }

    /// Engine callback path for a locally discovered candidate.
    async fn handle_local_candidate(&self, candidate: RTCIceCandidate) {
        let raw = match candidate.to_json() {
            Ok(init) => init.candidate,
            Err(e) => {
                warn!(error = %e, "could not serialize local candidate");
                return;
            }
        };
        self.dispatch_local_candidate(raw).await;
    }

    /// Buffer the candidate until the remote description is known, then send
    /// directly. Runs under the trickle lock; the send is a blocking network
    /// call made while holding it.
    async fn dispatch_local_candidate(&self, raw: String) {
        let mut gate = self.gate.lock().await;
        if gate.remote_known {
            if let Err(e) = self.signaling.send_candidate(&raw).await {
                warn!(error = %e, "candidate delivery failed");
                self.emit(LinkEvent::SignalingFailed(e.to_string()));
            }
        } else {
            debug!(candidate = %raw, "buffering candidate until remote description is known");
            gate.pending.push(raw);
        }
    }

    /// Apply a candidate received from the peer.
    ///
    /// Takes no trickle lock: the peer flushes its buffer while this side's
    /// own apply may be holding the lock, and the two flushes cross on the
    /// wire. The engine accepts candidates in any order once negotiation has
    /// begun.
    pub async fn apply_remote_candidate(&self, candidate: &str) -> Result<()> {
        debug!(candidate = %candidate, "applying remote candidate");
        self.peer_connection
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.to_string(),
                sdp_mid: None,
                sdp_mline_index: None,
                username_fragment: None,
            })
            .await
            .map_err(|e| Error::Candidate(format!("Engine rejected candidate: {}", e)))
    }

    /// Table-checked state transition. Off-table targets are ignored.
    pub(crate) async fn advance(&self, target: LinkState) {
        let mut current = self.state.write().await;
        let from = *current;
        if from == target {
            return;
        }
        if !from.can_transition(target) {
            debug!(from = %from, to = %target, "ignoring state transition");
            return;
        }
        *current = target;
        drop(current);
        info!(from = %from, to = %target, "link state changed");
        self.emit(LinkEvent::StateChanged { from, to: target });
    }

    /// Surface an inbound-path error to observers as a fatal event.
    pub(crate) fn report_failure(&self, error: &Error) {
        if error.is_delivery_failure() {
            self.emit(LinkEvent::SignalingFailed(error.to_string()));
        } else {
            self.emit(LinkEvent::ProtocolViolation(error.to_string()));
        }
    }

    pub(crate) fn emit(&self, event: LinkEvent) {
        // Send only fails when nobody subscribes, which is fine.
        let _ = self.events.send(event);
    }

    /// Close the underlying connection and mark the link closed.
    pub async fn close(&self) -> Result<()> {
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::Engine(format!("Failed to close peer connection: {}", e)))?;
        self.advance(LinkState::Closed).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::build_peer_connection;
    use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
    use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
    use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

    #[derive(Debug, Clone, PartialEq)]
    enum Recorded {
        Description(RTCSdpType),
        Candidate(String),
    }

    #[derive(Default)]
    struct RecordingSender {
        messages: Mutex<Vec<Recorded>>,
    }

    impl RecordingSender {
        async fn snapshot(&self) -> Vec<Recorded> {
            self.messages.lock().await.clone()
        }
    }

    #[async_trait::async_trait]
    impl SignalingSender for RecordingSender {
        async fn send_description(&self, description: &RTCSessionDescription) -> Result<()> {
            self.messages
                .lock()
                .await
                .push(Recorded::Description(description.sdp_type));
            Ok(())
        }

        async fn send_candidate(&self, candidate: &str) -> Result<()> {
            self.messages
                .lock()
                .await
                .push(Recorded::Candidate(candidate.to_string()));
            Ok(())
        }
    }

    async fn controller_with_recorder(
        role: PeerRole,
    ) -> (Arc<ConnectionController>, Arc<RecordingSender>) {
        let pc = build_peer_connection(&["stun:stun.l.google.com:19302".to_string()], &[])
            .await
            .unwrap();
        let sender = Arc::new(RecordingSender::default());
        let controller =
            ConnectionController::new(role, pc, Arc::clone(&sender) as Arc<dyn SignalingSender>);
        (controller, sender)
    }

    /// A real offer with one video m-line, from a throwaway connection.
    async fn remote_offer() -> RTCSessionDescription {
        let pc = build_peer_connection(&[], &[]).await.unwrap();
        pc.add_transceiver_from_kind(
            RTPCodecType::Video,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Sendonly,
                send_encodings: vec![],
            }),
        )
        .await
        .unwrap();
        pc.create_offer(None).await.unwrap()
    }

    #[tokio::test]
    async fn test_candidates_buffer_until_remote_known() {
        let (controller, sender) = controller_with_recorder(PeerRole::Initiator).await;
        controller
            .dispatch_local_candidate("candidate:a".to_string())
            .await;
        controller
            .dispatch_local_candidate("candidate:b".to_string())
            .await;
        assert!(sender.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_answer_sent_before_buffered_candidates() {
        let (controller, sender) = controller_with_recorder(PeerRole::Responder).await;
        controller
            .dispatch_local_candidate("candidate:a".to_string())
            .await;
        controller
            .dispatch_local_candidate("candidate:b".to_string())
            .await;

        let outcome = controller
            .apply_remote_description(remote_offer().await)
            .await
            .unwrap();
        assert_eq!(outcome, DescriptionOutcome::Applied);

        let messages = sender.snapshot().await;
        assert_eq!(
            messages,
            vec![
                Recorded::Description(RTCSdpType::Answer),
                Recorded::Candidate("candidate:a".to_string()),
                Recorded::Candidate("candidate:b".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_description_is_benign() {
        let (controller, sender) = controller_with_recorder(PeerRole::Responder).await;
        let offer = remote_offer().await;

        let first = controller
            .apply_remote_description(offer.clone())
            .await
            .unwrap();
        assert_eq!(first, DescriptionOutcome::Applied);
        let before = sender.snapshot().await.len();

        let second = controller.apply_remote_description(offer).await.unwrap();
        assert_eq!(second, DescriptionOutcome::Duplicate);
        assert_eq!(sender.snapshot().await.len(), before);
    }

    #[tokio::test]
    async fn test_candidate_after_exchange_sent_directly() {
        let (controller, sender) = controller_with_recorder(PeerRole::Responder).await;
        controller
            .apply_remote_description(remote_offer().await)
            .await
            .unwrap();

        controller
            .dispatch_local_candidate("candidate:late".to_string())
            .await;

        let messages = sender.snapshot().await;
        assert_eq!(
            messages.last(),
            Some(&Recorded::Candidate("candidate:late".to_string()))
        );
    }

    #[tokio::test]
    async fn test_role_description_mismatch_rejected() {
        let (controller, sender) = controller_with_recorder(PeerRole::Initiator).await;
        let err = controller
            .apply_remote_description(remote_offer().await)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedMessage(_)));
        assert!(sender.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_discovery_and_apply_sends_candidate_once() {
        let (controller, sender) = controller_with_recorder(PeerRole::Responder).await;
        let offer = remote_offer().await;

        let apply_controller = Arc::clone(&controller);
        let apply = tokio::spawn(async move {
            apply_controller.apply_remote_description(offer).await
        });
        let race_controller = Arc::clone(&controller);
        let dispatch = tokio::spawn(async move {
            race_controller
                .dispatch_local_candidate("candidate:racer".to_string())
                .await
        });

        apply.await.unwrap().unwrap();
        dispatch.await.unwrap();

        let seen = sender
            .snapshot()
            .await
            .iter()
            .filter(|m| matches!(m, Recorded::Candidate(c) if c == "candidate:racer"))
            .count();
        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn test_state_events_follow_table() {
        let (controller, _sender) = controller_with_recorder(PeerRole::Initiator).await;
        let mut events = controller.subscribe();

        controller.advance(LinkState::Negotiating).await;
        // Off-table from Negotiating; must be ignored.
        controller.advance(LinkState::Disconnected).await;
        controller.advance(LinkState::Connected).await;

        match events.recv().await.unwrap() {
            LinkEvent::StateChanged { from, to } => {
                assert_eq!(from, LinkState::New);
                assert_eq!(to, LinkState::Negotiating);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match events.recv().await.unwrap() {
            LinkEvent::StateChanged { from, to } => {
                assert_eq!(from, LinkState::Negotiating);
                assert_eq!(to, LinkState::Connected);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(controller.state().await, LinkState::Connected);
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let (controller, _sender) = controller_with_recorder(PeerRole::Initiator).await;
        controller.close().await.unwrap();
        assert_eq!(controller.state().await, LinkState::Closed);

        // Terminal: later engine transitions must not move the state.
        controller.advance(LinkState::Connected).await;
        assert_eq!(controller.state().await, LinkState::Closed);
    }
}
