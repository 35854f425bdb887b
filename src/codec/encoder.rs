//! Opus encoder wrapper
//!
//! Low-latency voice encoding of fixed-size PCM frames. Scratch buffers are
//! reused across frames to keep the per-frame cost to one output copy.

use bytes::Bytes;
use opus::{Application, Bitrate, Channels, Encoder};

use crate::config::MicConfig;
use crate::error::CodecError;

/// Maximum encoded frame we ever expect (libopus caps near 1275 bytes)
const MAX_ENCODED_FRAME: usize = 4000;

/// One-frame-at-a-time encoder.
///
/// `encode` takes exactly one PCM frame and returns its compressed
/// counterpart, or `None` when the codec declines to produce output.
/// Implementations are dropped to release codec resources.
pub trait FrameEncoder: Send {
    fn encode(&mut self, pcm: &[u8]) -> Result<Option<Bytes>, CodecError>;
}

/// Creates a fresh encoder for each capture session
pub trait EncoderFactory: Send + Sync {
    fn create(&self, config: &MicConfig) -> Result<Box<dyn FrameEncoder>, CodecError>;
}

/// Opus encoder configured for voice
pub struct OpusFrameEncoder {
    encoder: Encoder,
    frame_bytes: usize,
    /// PCM conversion scratch (reused to avoid allocations)
    pcm: Vec<i16>,
    /// Encoding output scratch
    out: Vec<u8>,
}

impl OpusFrameEncoder {
    pub fn new(config: &MicConfig) -> Result<Self, CodecError> {
        let channels = match config.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            n => {
                return Err(CodecError::EncoderInit(format!(
                    "unsupported channel count: {n}"
                )))
            }
        };

        let mut encoder = Encoder::new(config.sample_rate, channels, Application::Voip)
            .map_err(|e| CodecError::EncoderInit(e.to_string()))?;
        encoder
            .set_bitrate(Bitrate::Bits(config.bitrate as i32))
            .map_err(|e| CodecError::EncoderInit(format!("failed to set bitrate: {e}")))?;

        let samples_total = config.samples_per_frame() * config.channels as usize;
        Ok(Self {
            encoder,
            frame_bytes: config.bytes_per_frame(),
            pcm: vec![0i16; samples_total],
            out: vec![0u8; MAX_ENCODED_FRAME],
        })
    }
}

impl FrameEncoder for OpusFrameEncoder {
    fn encode(&mut self, pcm: &[u8]) -> Result<Option<Bytes>, CodecError> {
        if pcm.len() != self.frame_bytes {
            return Err(CodecError::InvalidFrameSize(pcm.len()));
        }

        for (sample, pair) in self.pcm.iter_mut().zip(pcm.chunks_exact(2)) {
            *sample = i16::from_le_bytes([pair[0], pair[1]]);
        }

        let n = self
            .encoder
            .encode(&self.pcm, &mut self.out)
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(Bytes::copy_from_slice(&self.out[..n])))
    }
}

/// Default factory producing [`OpusFrameEncoder`]s
pub struct OpusEncoderFactory;

impl EncoderFactory for OpusEncoderFactory {
    fn create(&self, config: &MicConfig) -> Result<Box<dyn FrameEncoder>, CodecError> {
        Ok(Box::new(OpusFrameEncoder::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_a_silent_frame() {
        let config = MicConfig::default();
        let mut encoder = OpusFrameEncoder::new(&config).unwrap();

        let frame = vec![0u8; config.bytes_per_frame()];
        let encoded = encoder.encode(&frame).unwrap();

        let encoded = encoded.expect("opus produced no output for a full frame");
        assert!(!encoded.is_empty());
        assert!(encoded.len() < frame.len());
    }

    #[test]
    fn rejects_wrong_frame_size() {
        let config = MicConfig::default();
        let mut encoder = OpusFrameEncoder::new(&config).unwrap();

        let result = encoder.encode(&[0u8; 100]);
        assert!(matches!(result, Err(CodecError::InvalidFrameSize(100))));
    }

    #[test]
    fn rejects_bad_channel_count() {
        let config = MicConfig {
            channels: 2,
            ..MicConfig::default()
        };
        assert!(OpusFrameEncoder::new(&config).is_ok());

        // validate() normally rejects this first; the encoder guards anyway
        let config = MicConfig {
            channels: 3,
            ..MicConfig::default()
        };
        assert!(matches!(
            OpusFrameEncoder::new(&config),
            Err(CodecError::EncoderInit(_))
        ));
    }
}
