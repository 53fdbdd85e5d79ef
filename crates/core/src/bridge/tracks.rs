//! Track-backed bridge endpoints

use std::sync::Arc;

use tracing::debug;
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocalWriter;
use webrtc::track::track_remote::TrackRemote;

use super::{MediaSink, MediaSource, MediaUnit};
use crate::error::{Error, Result};

/// Reads RTP packets from a remote track.
///
/// A read error means the track or its transport ended; that is exhaustion,
/// not a failure. What the process does about it is the state machine's
/// call, not this source's.
pub struct RemoteTrackSource {
    track: Arc<TrackRemote>,
}

impl RemoteTrackSource {
    pub fn new(track: Arc<TrackRemote>) -> Self {
        Self { track }
    }
}

#[async_trait::async_trait]
impl MediaSource for RemoteTrackSource {
    async fn next_unit(&mut self) -> Result<Option<MediaUnit>> {
        match self.track.read_rtp().await {
            Ok((packet, _attributes)) => Ok(Some(MediaUnit::Packet(packet))),
            Err(e) => {
                debug!(error = %e, track_id = %self.track.id(), "remote track ended");
                Ok(None)
            }
        }
    }
}

/// Forwards RTP packets to a local RTP track.
pub struct RtpForwardSink {
    track: Arc<TrackLocalStaticRTP>,
}

impl RtpForwardSink {
    pub fn new(track: Arc<TrackLocalStaticRTP>) -> Self {
        Self { track }
    }
}

#[async_trait::async_trait]
impl MediaSink for RtpForwardSink {
    async fn deliver(&mut self, unit: MediaUnit) -> Result<()> {
        match unit {
            MediaUnit::Packet(packet) => self
                .track
                .write_rtp(&packet)
                .await
                .map(|_| ())
                .map_err(|e| Error::MediaTrack(format!("Failed to forward RTP packet: {}", e))),
            MediaUnit::Sample { .. } => Err(Error::MediaTrack(
                "RTP forward sink cannot carry samples".to_string(),
            )),
        }
    }
}

/// Writes encoder-ready samples to a local sample track.
pub struct SampleTrackSink {
    track: Arc<TrackLocalStaticSample>,
}

impl SampleTrackSink {
    pub fn new(track: Arc<TrackLocalStaticSample>) -> Self {
        Self { track }
    }
}

#[async_trait::async_trait]
impl MediaSink for SampleTrackSink {
    async fn deliver(&mut self, unit: MediaUnit) -> Result<()> {
        match unit {
            MediaUnit::Sample { data, duration } => self
                .track
                .write_sample(&Sample {
                    data,
                    duration,
                    ..Default::default()
                })
                .await
                .map_err(|e| Error::MediaTrack(format!("Failed to write sample: {}", e))),
            MediaUnit::Packet(_) => Err(Error::MediaTrack(
                "Sample sink cannot carry raw RTP packets".to_string(),
            )),
        }
    }
}
