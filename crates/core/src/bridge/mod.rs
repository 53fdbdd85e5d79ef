//! Bounded media bridge between a source and a sink

mod h264;
mod tracks;

pub use h264::H264FileSource;
pub use tracks::{RemoteTrackSource, RtpForwardSink, SampleTrackSink};

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use webrtc::rtp;

use crate::error::{Error, Result};

/// One unit moving through the bridge: either a raw transport packet or an
/// encoder-ready sample.
#[derive(Debug, Clone)]
pub enum MediaUnit {
    /// An RTP packet forwarded as-is
    Packet(rtp::packet::Packet),
    /// A timed sample of encoded media
    Sample { data: Bytes, duration: Duration },
}

/// Produces media units until exhaustion.
#[async_trait::async_trait]
pub trait MediaSource: Send {
    /// Next unit, or `Ok(None)` once the source has nothing more to give.
    async fn next_unit(&mut self) -> Result<Option<MediaUnit>>;
}

/// Consumes media units.
#[async_trait::async_trait]
pub trait MediaSink: Send {
    /// Deliver one unit. An error stops the bridge.
    async fn deliver(&mut self, unit: MediaUnit) -> Result<()>;
}

/// Why a bridge run ended.
#[derive(Debug)]
pub enum BridgeOutcome {
    /// The source reported end of media
    SourceExhausted,
    /// The source failed mid-stream
    SourceFailed(Error),
    /// The sink rejected a unit
    SinkFailed(Error),
}

/// One-way bounded pipe from a media source to a media sink.
///
/// The handoff channel is owned by the bridge. A full channel blocks the
/// reader; units are never dropped and never reordered. A bridge runs once
/// and does not resume.
#[derive(Debug, Clone)]
pub struct MediaBridge {
    handoff_capacity: usize,
}

impl MediaBridge {
    /// Create a bridge with the given handoff capacity (minimum 1).
    pub fn new(handoff_capacity: usize) -> Self {
        Self {
            handoff_capacity: handoff_capacity.max(1),
        }
    }

    /// Move units from `source` to `sink` until one side ends.
    pub async fn run<S, K>(&self, mut source: S, mut sink: K) -> BridgeOutcome
    where
        S: MediaSource + 'static,
        K: MediaSink + 'static,
    {
        debug!(capacity = self.handoff_capacity, "bridge started");
        let (handoff_tx, mut handoff_rx) = mpsc::channel::<MediaUnit>(self.handoff_capacity);

        let reader = tokio::spawn(async move {
            loop {
                match source.next_unit().await {
                    Ok(Some(unit)) => {
                        // Blocks while the channel is full; the writer's pace
                        // is the bridge's pace.
                        if handoff_tx.send(unit).await.is_err() {
                            break None;
                        }
                    }
                    Ok(None) => break None,
                    Err(e) => break Some(e),
                }
            }
        });

        let writer = tokio::spawn(async move {
            while let Some(unit) = handoff_rx.recv().await {
                if let Err(e) = sink.deliver(unit).await {
                    return Some(e);
                }
            }
            None
        });

        let source_end = reader.await;
        let sink_end = writer.await;

        let outcome = match (source_end, sink_end) {
            (Ok(_), Ok(Some(e))) => BridgeOutcome::SinkFailed(e),
            (Ok(Some(e)), Ok(None)) => BridgeOutcome::SourceFailed(e),
            (Ok(None), Ok(None)) => BridgeOutcome::SourceExhausted,
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "bridge task ended abnormally");
                BridgeOutcome::SourceFailed(Error::Other(anyhow::anyhow!(
                    "Bridge task ended abnormally: {}",
                    e
                )))
            }
        };
        debug!(outcome = ?outcome, "bridge finished");
        outcome
    }
}
