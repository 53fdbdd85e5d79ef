//! Paced Annex-B H.264 file source

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};
use webrtc::media::io::h264_reader::{H264Reader, NalUnitType};

use super::{MediaSource, MediaUnit};
use crate::error::{Error, Result};

const ANNEX_B_START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Upper bound for one NAL handed out by the reader.
const MAX_NAL_SIZE: usize = 1_048_576;

/// Sample duration handed to the packetizer with every unit.
const SAMPLE_DURATION: Duration = Duration::from_secs(1);

/// Streams NAL units from an Annex-B H.264 file as timed samples.
///
/// Parameter sets (SPS/PPS) are cached rather than emitted on their own and
/// prepended to the next IDR slice, so every keyframe sample carries its own
/// decoding parameters. Emission is paced by a frame interval; end of file
/// and unparseable tail bytes both end the stream cleanly.
pub struct H264FileSource {
    reader: H264Reader<BufReader<File>>,
    ticker: Interval,
    parameter_cache: BytesMut,
}

impl fmt::Debug for H264FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("H264FileSource")
            .field("ticker", &self.ticker)
            .field("parameter_cache", &self.parameter_cache)
            .finish_non_exhaustive()
    }
}

impl H264FileSource {
    /// Open an Annex-B file, pacing one sample per `frame_interval`.
    pub fn open(path: impl AsRef<Path>, frame_interval: Duration) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::InvalidConfig(format!("Cannot open media file {}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), "opened H264 source");

        let mut ticker = interval(frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            reader: H264Reader::new(BufReader::new(file), MAX_NAL_SIZE),
            ticker,
            parameter_cache: BytesMut::new(),
        })
    }

    /// Read NALs until one sample is ready: parameter sets are cached,
    /// everything else is emitted with a start code (keyframes get the
    /// cached parameter sets prepended).
    fn next_sample(&mut self) -> Option<Bytes> {
        loop {
            let nal = match self.reader.next_nal() {
                Ok(nal) => nal,
                Err(e) => {
                    debug!(error = %e, "H264 stream ended");
                    return None;
                }
            };

            match nal.unit_type {
                NalUnitType::SPS | NalUnitType::PPS => {
                    self.parameter_cache.put_slice(&ANNEX_B_START_CODE);
                    self.parameter_cache.put_slice(&nal.data);
                }
                NalUnitType::CodedSliceIdr => {
                    let mut sample = std::mem::take(&mut self.parameter_cache);
                    sample.put_slice(&ANNEX_B_START_CODE);
                    sample.put_slice(&nal.data);
                    return Some(sample.freeze());
                }
                _ => {
                    let mut sample =
                        BytesMut::with_capacity(ANNEX_B_START_CODE.len() + nal.data.len());
                    sample.put_slice(&ANNEX_B_START_CODE);
                    sample.put_slice(&nal.data);
                    return Some(sample.freeze());
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl MediaSource for H264FileSource {
    async fn next_unit(&mut self) -> Result<Option<MediaUnit>> {
        self.ticker.tick().await;
        match self.next_sample() {
            Some(data) => Ok(Some(MediaUnit::Sample {
                data,
                duration: SAMPLE_DURATION,
            })),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SPS: &[u8] = &[0x67, 0x42, 0x00, 0x1f];
    const PPS: &[u8] = &[0x68, 0xce, 0x3c, 0x80];
    const IDR: &[u8] = &[0x65, 0x88, 0x84, 0x00];
    const NON_IDR: &[u8] = &[0x41, 0x9a, 0x24, 0x6c];

    fn annex_b(nals: &[&[u8]]) -> Vec<u8> {
        let mut data = Vec::new();
        for nal in nals {
            data.extend_from_slice(&ANNEX_B_START_CODE);
            data.extend_from_slice(nal);
        }
        data
    }

    /// The tempfile must outlive the source, which holds an open handle to it.
    fn source_for(bytes: &[u8]) -> (H264FileSource, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        let source = H264FileSource::open(file.path(), Duration::from_millis(1)).unwrap();
        (source, file)
    }

    #[tokio::test]
    async fn test_parameter_sets_prefix_next_keyframe() {
        let (mut source, _file) = source_for(&annex_b(&[SPS, PPS, IDR, NON_IDR]));

        let first = source.next_unit().await.unwrap().unwrap();
        let MediaUnit::Sample { data, duration } = first else {
            panic!("expected a sample unit");
        };
        assert_eq!(data.as_ref(), annex_b(&[SPS, PPS, IDR]).as_slice());
        assert_eq!(duration, SAMPLE_DURATION);

        let second = source.next_unit().await.unwrap().unwrap();
        let MediaUnit::Sample { data, .. } = second else {
            panic!("expected a sample unit");
        };
        assert_eq!(data.as_ref(), annex_b(&[NON_IDR]).as_slice());

        assert!(source.next_unit().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_parameter_cache_cleared_after_keyframe() {
        let (mut source, _file) = source_for(&annex_b(&[SPS, PPS, IDR, IDR]));

        source.next_unit().await.unwrap().unwrap();
        let second = source.next_unit().await.unwrap().unwrap();
        let MediaUnit::Sample { data, .. } = second else {
            panic!("expected a sample unit");
        };
        // Second keyframe must not repeat the already-flushed parameter sets.
        assert_eq!(data.as_ref(), annex_b(&[IDR]).as_slice());
    }

    #[tokio::test]
    async fn test_empty_file_is_exhausted_immediately() {
        let (mut source, _file) = source_for(&[]);
        assert!(source.next_unit().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_file_rejected() {
        let err =
            H264FileSource::open("/nonexistent/clip.h264", Duration::from_millis(33)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
