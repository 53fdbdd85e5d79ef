//! Responder binary entry point
//!
//! Answers the initiator's offer, receives its H.264 video track, and
//! republishes the RTP stream to a WHIP-style publish endpoint.
//!
//! # Usage
//!
//! ```bash
//! # Answer an initiator on localhost (default addresses)
//! cargo run -p peerlink-responder
//!
//! # Explicit addresses and publish endpoint
//! cargo run -p peerlink-responder -- \
//!   --listen-addr 0.0.0.0:60000 \
//!   --peer-addr http://192.168.1.10:50000 \
//!   --publish-url http://media.example.com:7880/whip \
//!   --publish-token secret
//! ```

use std::sync::Arc;

use clap::Parser;
use peerlink_core::{
    build_peer_connection, terminate, BridgeOutcome, ConnectionController, ExitReason,
    HttpSignalingClient, LinkEvent, LinkState, MediaBridge, PeerConfig, PeerRole, PublishConfig,
    RemoteTrackSource, RoomPublisher, RtpForwardSink,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use webrtc::api::media_engine::MIME_TYPE_H264;
use webrtc::track::track_remote::TrackRemote;

/// Peerlink responder
///
/// Waits for the initiator's offer, answers it, and forwards the received
/// video track to a publish endpoint.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Local address for the peer's signaling callbacks
    #[arg(long, default_value = "0.0.0.0:60000", env = "PEERLINK_LISTEN_ADDR")]
    listen_addr: String,

    /// Base URL of the initiator's signaling listener
    #[arg(
        long,
        default_value = "http://127.0.0.1:50000",
        env = "PEERLINK_PEER_ADDR"
    )]
    peer_addr: String,

    /// STUN servers (comma-separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302"
    )]
    stun_servers: Vec<String>,

    /// Publish endpoint accepting an SDP offer
    #[arg(
        long,
        default_value = "http://127.0.0.1:7880/whip",
        env = "PEERLINK_PUBLISH_URL"
    )]
    publish_url: String,

    /// Bearer token for the publish endpoint (empty for none)
    #[arg(long, default_value = "", env = "PEERLINK_PUBLISH_TOKEN")]
    publish_token: String,

    /// Stream identifier for the published track
    #[arg(long, default_value = "peerlink", env = "PEERLINK_STREAM_ID")]
    stream_id: String,

    /// Track identifier for the published track
    #[arg(long, default_value = "video", env = "PEERLINK_TRACK_ID")]
    track_id: String,

    /// Bounded handoff capacity between the track reader and the publish writer
    #[arg(long, default_value_t = 1, env = "PEERLINK_HANDOFF_CAPACITY")]
    handoff_capacity: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("responder-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Peerlink responder starting"
    );

    let config = PeerConfig {
        role: PeerRole::Responder,
        listen_addr: args.listen_addr.clone(),
        peer_addr: args.peer_addr.clone(),
        stun_servers: args.stun_servers.clone(),
        handoff_capacity: args.handoff_capacity,
        ..Default::default()
    };
    config.validate()?;

    let publish = PublishConfig {
        endpoint: args.publish_url.clone(),
        token: args.publish_token.clone(),
        stream_id: args.stream_id.clone(),
        track_id: args.track_id.clone(),
    };
    publish.validate()?;

    info!(
        listen_addr = %config.listen_addr,
        peer_addr = %config.peer_addr,
        stun_servers = config.stun_servers.len(),
        publish_url = %publish.endpoint,
        stream_id = %publish.stream_id,
        "Configuration loaded"
    );

    // The publish leg comes up before any signaling is accepted, so an
    // unreachable endpoint fails fast.
    let publisher = RoomPublisher::connect(&config, &publish).await?;

    let peer_connection =
        build_peer_connection(&config.stun_servers, &config.turn_servers).await?;

    let signaling = Arc::new(HttpSignalingClient::new(config.peer_addr.clone()));
    let controller = ConnectionController::new(PeerRole::Responder, peer_connection, signaling);
    controller.register_callbacks();
    let mut events = controller.subscribe();

    let listener = TcpListener::bind(&config.listen_addr).await?;
    let signaling_controller = Arc::clone(&controller);
    tokio::spawn(async move {
        if let Err(error) = peerlink_core::serve(listener, signaling_controller).await {
            error!(%error, "signaling server terminated");
        }
    });

    let mut remote_track: Option<Arc<TrackRemote>> = None;
    let mut connected = false;
    let mut bridge_started = false;
    let mut bridge: Option<JoinHandle<BridgeOutcome>> = None;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(LinkEvent::TrackArrived(track)) => {
                    let mime_type = track.codec().capability.mime_type.clone();
                    if mime_type.eq_ignore_ascii_case(MIME_TYPE_H264) {
                        info!(id = %track.id(), "video track arrived");
                        remote_track = Some(track);
                    } else {
                        warn!(id = %track.id(), %mime_type, "ignoring non-H264 track");
                    }
                }
                Ok(LinkEvent::StateChanged { to: LinkState::Connected, .. }) => {
                    connected = true;
                }
                Ok(LinkEvent::StateChanged { to: LinkState::Failed, .. }) => {
                    terminate(ExitReason::ConnectionFailed);
                }
                Ok(LinkEvent::StateChanged { to: LinkState::Closed, .. }) => break,
                Ok(LinkEvent::StateChanged { .. }) => {}
                Ok(LinkEvent::SignalingFailed(message)) => {
                    error!(%message, "signaling delivery failed");
                    terminate(ExitReason::SignalingFailure);
                }
                Ok(LinkEvent::ProtocolViolation(message)) => {
                    error!(%message, "peer violated the signaling protocol");
                    terminate(ExitReason::ProtocolViolation);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
            outcome = poll_bridge(&mut bridge) => {
                bridge = None;
                // The session outcome is the state machine's call; the end of
                // the inbound stream on its own does not stop the process.
                match outcome {
                    Ok(BridgeOutcome::SourceExhausted) => {
                        info!("inbound track ended");
                    }
                    Ok(BridgeOutcome::SourceFailed(error)) => {
                        warn!(%error, "inbound track read failed");
                    }
                    Ok(BridgeOutcome::SinkFailed(error)) => {
                        warn!(%error, "publish write failed");
                    }
                    Err(error) => {
                        error!(%error, "bridge task aborted");
                    }
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                if let Err(error) = publisher.close().await {
                    warn!(%error, "publish teardown failed");
                }
                if let Err(error) = controller.close().await {
                    warn!(%error, "close on shutdown failed");
                }
                break;
            }
        }

        // Started at most once, when the link is up and the track is known.
        if connected && !bridge_started {
            if let Some(track) = remote_track.take() {
                info!("starting forward bridge to publish endpoint");
                let source = RemoteTrackSource::new(track);
                let sink = RtpForwardSink::new(publisher.track());
                let capacity = config.handoff_capacity;
                bridge_started = true;
                bridge = Some(tokio::spawn(async move {
                    MediaBridge::new(capacity).run(source, sink).await
                }));
            }
        }
    }

    info!("responder stopped");
    Ok(())
}

/// Resolves when the running bridge finishes; pends while there is none.
async fn poll_bridge(
    bridge: &mut Option<JoinHandle<BridgeOutcome>>,
) -> Result<BridgeOutcome, JoinError> {
    match bridge {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn init_tracing() {
    // Initialize tracing with EnvFilter for RUST_LOG support
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
