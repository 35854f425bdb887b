//! cpal-backed input device
//!
//! The platform stream is callback-driven, so the bridge to the blocking
//! [`AudioSource`](crate::audio::AudioSource) contract is a bounded channel:
//! the stream callback forwards converted PCM chunks, `read` drains them.
//! The stream handle itself is not `Send` on every backend, so it is built
//! inside `open`, which runs on the capture worker, and owned by the
//! returned source.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::time::Duration;

use crate::audio::capture::{map_recv_timeout, AudioSource, InputDevice};
use crate::config::MicConfig;
use crate::error::AudioError;

/// Longest a single `read` waits for the stream callback before yielding
const READ_WAIT: Duration = Duration::from_millis(100);

/// Chunks buffered between the stream callback and the capture worker
const CHUNK_CHANNEL_CAPACITY: usize = 32;

/// Default-host, default-input-device backend
pub struct CpalInput;

impl InputDevice for CpalInput {
    fn validate(&self, config: &MicConfig) -> Result<(), AudioError> {
        let device = default_input_device()?;
        let rate = SampleRate(config.sample_rate);

        let mut supported = device
            .supported_input_configs()
            .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?;
        let ok = supported.any(|range| {
            range.channels() == config.channels
                && rate >= range.min_sample_rate()
                && rate <= range.max_sample_rate()
                && matches!(range.sample_format(), SampleFormat::I16 | SampleFormat::F32)
        });

        if ok {
            Ok(())
        } else {
            Err(AudioError::UnsupportedFormat(format!(
                "{} Hz / {} channel(s) rejected by the input device",
                config.sample_rate, config.channels
            )))
        }
    }

    fn open(&self, config: &MicConfig) -> Result<Box<dyn AudioSource>, AudioError> {
        let device = default_input_device()?;
        let sample_format = device
            .default_input_config()
            .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?
            .sample_format();

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let (chunk_tx, chunk_rx) = bounded::<Vec<u8>>(CHUNK_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = bounded::<AudioError>(4);
        let error_cb = {
            let error_tx = error_tx.clone();
            move |err: cpal::StreamError| {
                let _ = error_tx.try_send(map_stream_error(err));
            }
        };

        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    forward_i16(data, &chunk_tx);
                },
                error_cb,
                None,
            ),
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    forward_f32(data, &chunk_tx);
                },
                error_cb,
                None,
            ),
            other => {
                return Err(AudioError::UnsupportedFormat(format!(
                    "sample format {other:?} not supported"
                )))
            }
        }
        .map_err(map_build_error)?;

        stream
            .play()
            .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?;

        Ok(Box::new(CpalSource {
            _stream: stream,
            chunks: chunk_rx,
            errors: error_rx,
            pending: Vec::new(),
            pos: 0,
        }))
    }
}

struct CpalSource {
    /// Keeps the device open; capture stops when this drops
    _stream: cpal::Stream,
    chunks: Receiver<Vec<u8>>,
    errors: Receiver<AudioError>,
    pending: Vec<u8>,
    pos: usize,
}

impl AudioSource for CpalSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        if let Ok(err) = self.errors.try_recv() {
            return Err(err);
        }

        if self.pos == self.pending.len() {
            match map_recv_timeout(self.chunks.recv_timeout(READ_WAIT))? {
                Some(chunk) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

fn default_input_device() -> Result<cpal::Device, AudioError> {
    cpal::default_host()
        .default_input_device()
        .ok_or_else(|| AudioError::DeviceInitFailed("no default input device".into()))
}

fn forward_i16(data: &[i16], chunk_tx: &Sender<Vec<u8>>) {
    let mut bytes = Vec::with_capacity(data.len() * 2);
    for sample in data {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    // A full channel means the worker is behind; shed the chunk
    let _ = chunk_tx.try_send(bytes);
}

fn forward_f32(data: &[f32], chunk_tx: &Sender<Vec<u8>>) {
    let mut bytes = Vec::with_capacity(data.len() * 2);
    for sample in data {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    let _ = chunk_tx.try_send(bytes);
}

fn map_build_error(err: cpal::BuildStreamError) -> AudioError {
    match err {
        cpal::BuildStreamError::StreamConfigNotSupported => {
            AudioError::UnsupportedFormat("stream config not supported".into())
        }
        cpal::BuildStreamError::DeviceNotAvailable => {
            AudioError::DeviceInitFailed("device not available".into())
        }
        other => classify_message(other.to_string()),
    }
}

fn map_stream_error(err: cpal::StreamError) -> AudioError {
    match err {
        cpal::StreamError::DeviceNotAvailable => AudioError::DeviceStopped,
        other => {
            let message = other.to_string();
            if is_permission_message(&message) {
                AudioError::PermissionDenied(message)
            } else {
                AudioError::ReadFailed(message)
            }
        }
    }
}

fn classify_message(message: String) -> AudioError {
    if is_permission_message(&message) {
        AudioError::PermissionDenied(message)
    } else {
        AudioError::DeviceInitFailed(message)
    }
}

fn is_permission_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
}
