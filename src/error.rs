//! Error types for the microphone uplink

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stream has not been started")]
    NotStarted,

    #[error("Stream already stopped")]
    Stopped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio capture errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Device initialization failed: {0}")]
    DeviceInitFailed(String),

    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device was stopped")]
    DeviceStopped,

    #[error("Device read failed: {0}")]
    ReadFailed(String),
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Invalid frame size: {0}")]
    InvalidFrameSize(usize),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Invalid packet format")]
    InvalidPacket,
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
