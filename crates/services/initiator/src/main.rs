//! Initiator binary entry point
//!
//! Offers a session to the responder, trickles ICE candidates over HTTP, and
//! streams an Annex B H.264 file over the negotiated video track once the
//! link is connected.
//!
//! # Usage
//!
//! ```bash
//! # Offer to a responder on localhost (default addresses)
//! cargo run -p peerlink-initiator -- --video ./demo.h264
//!
//! # Explicit addresses and STUN servers
//! cargo run -p peerlink-initiator -- \
//!   --listen-addr 0.0.0.0:50000 \
//!   --peer-addr http://192.168.1.20:60000 \
//!   --stun-servers stun:stun.l.google.com:19302 \
//!   --video ./demo.h264
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use peerlink_core::{
    build_peer_connection, h264_capability, spawn_rtcp_drain, terminate, BridgeOutcome,
    ConnectionController, ExitReason, H264FileSource, HttpSignalingClient, LinkEvent, LinkState,
    MediaBridge, PeerConfig, PeerRole, SampleTrackSink,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Peerlink initiator
///
/// Dials the responder with an offer and bridges a local H.264 file onto the
/// outgoing video track once the link is connected.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Local address for the peer's signaling callbacks
    #[arg(long, default_value = "0.0.0.0:50000", env = "PEERLINK_LISTEN_ADDR")]
    listen_addr: String,

    /// Base URL of the responder's signaling listener
    #[arg(
        long,
        default_value = "http://127.0.0.1:60000",
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

    /// Annex B H.264 file to stream once connected
    #[arg(long, env = "PEERLINK_VIDEO")]
    video: PathBuf,

    /// Pacing interval between video samples in milliseconds
    #[arg(long, default_value_t = 33, env = "PEERLINK_FRAME_INTERVAL_MS")]
    frame_interval_ms: u64,

    /// Bounded handoff capacity between the file reader and the track writer
    #[arg(long, default_value_t = 1, env = "PEERLINK_HANDOFF_CAPACITY")]
    handoff_capacity: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("initiator-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Peerlink initiator starting"
    );

    let config = PeerConfig {
        role: PeerRole::Initiator,
        listen_addr: args.listen_addr.clone(),
        peer_addr: args.peer_addr.clone(),
        stun_servers: args.stun_servers.clone(),
        handoff_capacity: args.handoff_capacity,
        ..Default::default()
    };
    config.validate()?;

    info!(
        listen_addr = %config.listen_addr,
        peer_addr = %config.peer_addr,
        stun_servers = config.stun_servers.len(),
        video = ?args.video,
        frame_interval_ms = args.frame_interval_ms,
        "Configuration loaded"
    );

    // Open the file before any signaling so a bad path fails fast.
    let source = H264FileSource::open(&args.video, Duration::from_millis(args.frame_interval_ms))?;

    let peer_connection =
        build_peer_connection(&config.stun_servers, &config.turn_servers).await?;

    let video_track = Arc::new(TrackLocalStaticSample::new(
        h264_capability(),
        "video".to_string(),
        "peerlink".to_string(),
    ));
    let sender = peer_connection
        .add_track(Arc::clone(&video_track) as Arc<dyn TrackLocal + Send + Sync>)
        .await?;
    spawn_rtcp_drain(sender);

    let signaling = Arc::new(HttpSignalingClient::new(config.peer_addr.clone()));
    let controller = ConnectionController::new(PeerRole::Initiator, peer_connection, signaling);
    controller.register_callbacks();
    let mut events = controller.subscribe();

    let listener = TcpListener::bind(&config.listen_addr).await?;
    let signaling_controller = Arc::clone(&controller);
    tokio::spawn(async move {
        if let Err(error) = peerlink_core::serve(listener, signaling_controller).await {
            error!(%error, "signaling server terminated");
        }
    });

    if let Err(error) = controller.start_negotiation().await {
        error!(%error, "negotiation could not be started");
        terminate(ExitReason::from_error(&error));
    }

    let mut source = Some(source);
    let mut bridge: Option<JoinHandle<BridgeOutcome>> = None;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(LinkEvent::StateChanged { to: LinkState::Connected, .. }) => {
                    // Started at most once; a reconnect keeps the same bridge.
                    if let Some(source) = source.take() {
                        info!("link connected, starting media bridge");
                        let sink = SampleTrackSink::new(Arc::clone(&video_track));
                        let capacity = config.handoff_capacity;
                        bridge = Some(tokio::spawn(async move {
                            MediaBridge::new(capacity).run(source, sink).await
                        }));
                    }
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
                Ok(LinkEvent::TrackArrived(track)) => {
                    warn!(id = %track.id(), "ignoring unexpected inbound track");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
            outcome = poll_bridge(&mut bridge) => {
                bridge = None;
                match outcome {
                    Ok(BridgeOutcome::SourceExhausted) => {
                        info!("media file fully streamed");
                        if let Err(error) = controller.close().await {
                            warn!(%error, "close after media exhaustion failed");
                        }
                        terminate(ExitReason::MediaExhausted);
                    }
                    Ok(BridgeOutcome::SourceFailed(error)) => {
                        error!(%error, "media source failed");
                        terminate(ExitReason::SetupFailure);
                    }
                    Ok(BridgeOutcome::SinkFailed(error)) => {
                        // Track writes fail while the link tears down; the
                        // state machine decides how the process ends.
                        warn!(%error, "track write failed, waiting on link state");
                    }
                    Err(error) => {
                        error!(%error, "bridge task aborted");
                        terminate(ExitReason::SetupFailure);
                    }
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                if let Err(error) = controller.close().await {
                    warn!(%error, "close on shutdown failed");
                }
                break;
            }
        }
    }

    info!("initiator stopped");
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
