//! Transport engine construction

use std::sync::Arc;

use tracing::debug;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;

use crate::config::TurnServerConfig;
use crate::error::{Error, Result};

/// Create a peer connection with default codecs and interceptors registered
/// and the given STUN/TURN servers configured.
///
/// # Example
///
/// ```
/// use peerlink_core::build_peer_connection;
///
/// # tokio_test::block_on(async {
/// let pc = build_peer_connection(&["stun:stun.l.google.com:19302".to_string()], &[])
///     .await
///     .unwrap();
/// # });
/// ```
pub async fn build_peer_connection(
    stun_servers: &[String],
    turn_servers: &[TurnServerConfig],
) -> Result<Arc<RTCPeerConnection>> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(|e| Error::Engine(format!("Failed to register codecs: {}", e)))?;

    let interceptor_registry = register_default_interceptors(Default::default(), &mut media_engine)
        .map_err(|e| Error::Engine(format!("Failed to register interceptors: {}", e)))?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(interceptor_registry)
        .build();

    let ice_servers: Vec<RTCIceServer> = stun_servers
        .iter()
        .map(|url| RTCIceServer {
            urls: vec![url.clone()],
            ..Default::default()
        })
        .chain(turn_servers.iter().map(|turn| {
            #[allow(clippy::needless_update)]
            RTCIceServer {
                urls: vec![turn.url.clone()],
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            }
        }))
        .collect();

    let rtc_config = RTCConfiguration {
        ice_servers,
        ..Default::default()
    };

    let peer_connection = api
        .new_peer_connection(rtc_config)
        .await
        .map_err(|e| Error::Engine(format!("Failed to create peer connection: {}", e)))?;

    Ok(Arc::new(peer_connection))
}

/// H.264 capability used for every video track in this crate.
pub fn h264_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_H264.to_owned(),
        ..Default::default()
    }
}

/// Reads and discards RTCP from a sender. Interceptors such as NACK only run
/// while the sender is being read.
pub fn spawn_rtcp_drain(sender: Arc<RTCRtpSender>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut rtcp_buf = vec![0u8; 1500];
        while sender.read(&mut rtcp_buf).await.is_ok() {}
        debug!("rtcp drain ended");
    })
}
