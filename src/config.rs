//! Stream configuration
//!
//! All tunables for one streaming session, loadable from a TOML file.
//! Frame geometry (samples and bytes per frame) is derived, never stored.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::Error;

/// Configuration for a microphone streaming session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MicConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Channel count (1 = mono)
    pub channels: u16,

    /// Frame duration in milliseconds; fixes the frame size
    pub frame_duration_ms: u32,

    /// Opus bitrate in bits per second
    pub bitrate: u32,

    /// Capacity of the outbound compressed-frame queue
    pub queue_capacity: usize,

    /// Interval between host-request polls in milliseconds
    pub host_poll_interval_ms: u64,

    /// Smooth frame emission to the configured cadence instead of letting
    /// bursts through as fast as the device delivers them
    pub pacing: bool,
}

impl Default for MicConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            frame_duration_ms: DEFAULT_FRAME_DURATION_MS,
            bitrate: DEFAULT_BITRATE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            host_poll_interval_ms: DEFAULT_HOST_POLL_INTERVAL_MS,
            pacing: true,
        }
    }
}

impl MicConfig {
    /// Samples per frame, per channel (960 at 48 kHz / 20 ms)
    pub fn samples_per_frame(&self) -> usize {
        self.sample_rate as usize * self.frame_duration_ms as usize / 1000
    }

    /// Bytes per PCM frame, 16-bit samples (1920 at 48 kHz / mono / 20 ms)
    pub fn bytes_per_frame(&self) -> usize {
        self.samples_per_frame() * self.channels as usize * 2
    }

    /// Frame duration as a `Duration`; also the minimum inter-send interval
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_duration_ms as u64)
    }

    /// Interval between host-request polls
    pub fn host_poll_interval(&self) -> Duration {
        Duration::from_millis(self.host_poll_interval_ms)
    }

    /// Size of one device read, decoupled from the frame size
    pub fn capture_chunk_bytes(&self) -> usize {
        self.sample_rate as usize * CAPTURE_CHUNK_MS as usize / 1000 * self.channels as usize * 2
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        if self.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be non-zero".into()));
        }
        if self.channels == 0 || self.channels > 2 {
            return Err(Error::Config(format!(
                "channels must be 1 or 2, got {}",
                self.channels
            )));
        }
        if self.frame_duration_ms == 0 {
            return Err(Error::Config("frame_duration_ms must be non-zero".into()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be non-zero".into()));
        }
        if self.host_poll_interval_ms == 0 {
            return Err(Error::Config("host_poll_interval_ms must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_frame_geometry() {
        let config = MicConfig::default();
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.channels, 1);
        assert_eq!(config.frame_duration_ms, 20);
        assert_eq!(config.samples_per_frame(), 960);
        assert_eq!(config.bytes_per_frame(), 1920);
        assert_eq!(config.frame_interval(), Duration::from_millis(20));
    }

    #[test]
    fn stereo_frame_geometry() {
        let config = MicConfig {
            channels: 2,
            ..MicConfig::default()
        };
        assert_eq!(config.samples_per_frame(), 960);
        assert_eq!(config.bytes_per_frame(), 3840);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: MicConfig = toml::from_str("bitrate = 96000\nchannels = 2\n").unwrap();
        assert_eq!(config.bitrate, 96_000);
        assert_eq!(config.channels, 2);
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.queue_capacity, 5);
        assert!(config.pacing);
    }

    #[test]
    fn validate_rejects_degenerate_values() {
        let mut config = MicConfig {
            sample_rate: 0,
            ..MicConfig::default()
        };
        assert!(config.validate().is_err());

        config.sample_rate = 48_000;
        config.channels = 6;
        assert!(config.validate().is_err());

        config.channels = 1;
        config.queue_capacity = 0;
        assert!(config.validate().is_err());
    }
}
