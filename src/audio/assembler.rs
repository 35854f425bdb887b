//! Frame assembly from raw device reads
//!
//! Device reads arrive in whatever chunk sizes the platform hands out;
//! the encoder needs frames of exactly `bytes_per_frame`. The assembler
//! buffers partial frames and emits only complete ones, so a frame is never
//! delivered downstream in pieces.

use std::time::{Duration, Instant};

use crate::config::MicConfig;

/// Accumulates raw PCM bytes into fixed-size frames.
///
/// A single `push_bytes` call may emit zero, one, or multiple frames
/// depending on how much data is pushed at once. Emission order is input
/// order, and the emitted sequence is independent of how the input was
/// split across calls.
pub struct FrameAssembler {
    frame: Vec<u8>,
    filled: usize,
    /// Minimum spacing between emissions; zero disables pacing
    pacing_floor: Duration,
    last_emit: Option<Instant>,
}

impl FrameAssembler {
    pub fn new(config: &MicConfig) -> Self {
        let pacing_floor = if config.pacing {
            // Hold emission to 80% of the frame cadence
            config.frame_interval() * 4 / 5
        } else {
            Duration::ZERO
        };
        Self::with_frame_size(config.bytes_per_frame(), pacing_floor)
    }

    pub fn with_frame_size(bytes_per_frame: usize, pacing_floor: Duration) -> Self {
        Self {
            frame: vec![0u8; bytes_per_frame],
            filled: 0,
            pacing_floor,
            last_emit: None,
        }
    }

    /// Feed raw bytes; invokes `emit` once per completed frame.
    pub fn push_bytes(&mut self, mut data: &[u8], emit: &mut dyn FnMut(&[u8])) {
        while !data.is_empty() {
            let needed = self.frame.len() - self.filled;
            let take = needed.min(data.len());
            self.frame[self.filled..self.filled + take].copy_from_slice(&data[..take]);
            self.filled += take;
            data = &data[take..];

            if self.filled == self.frame.len() {
                self.pace();
                emit(&self.frame);
                self.filled = 0;
                self.last_emit = Some(Instant::now());
            }
        }
    }

    /// Bytes buffered toward the next frame
    pub fn pending(&self) -> usize {
        self.filled
    }

    fn pace(&self) {
        if self.pacing_floor.is_zero() {
            return;
        }
        if let Some(last) = self.last_emit {
            while last.elapsed() < self.pacing_floor {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
}
