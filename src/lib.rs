//! # Mic Uplink
//!
//! Low-latency microphone-to-host streaming over UDP.
//!
//! Captures raw PCM from the local input device, assembles it into fixed
//! 20 ms frames, Opus-encodes each frame and fires the compressed frames as
//! timestamped datagrams at a remote host, gated on a pollable "the host
//! wants microphone input" signal so capture can pause and resume without
//! tearing the pipeline down.
//!
//! ## Architecture Overview
//!
//! ```text
//!  ┌────────────┐   capture worker    ┌────────────────┐
//!  │ Microphone │ ──── raw PCM ─────► │ FrameAssembler │
//!  └────────────┘                     └───────┬────────┘
//!                                             │ fixed-size frames
//!                                             ▼
//!                                     ┌────────────────┐
//!                                     │  EncodeStage   │  Opus, runs on the
//!                                     └───────┬────────┘  capture worker
//!                                             ▼
//!                                  ┌─────────────────────┐
//!                                  │  BoundedFrameQueue  │  drop-oldest,
//!                                  └──────────┬──────────┘  capacity 5
//!                                             │ paced pop (sender worker)
//!                                             ▼
//!                                  ┌─────────────────────┐
//!                                  │ 12-byte header + UDP│ ──► host:port
//!                                  └─────────────────────┘
//!
//!  host-poll worker: session.microphone_requested() every 500 ms
//!      false → true   start/resume capture
//!      true  → false  pause capture (sender and poller stay alive)
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod diag;
pub mod error;
pub mod network;
pub mod session;
pub mod stream;

mod util;

pub use config::MicConfig;
pub use diag::{DiagnosticsSink, StreamDiagnostics};
pub use error::{Error, Result};
pub use session::{StaticSession, StreamSession};
pub use stream::{MicStream, PipelineState};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for microphone capture
    pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

    /// Default channel count (mono)
    pub const DEFAULT_CHANNELS: u16 = 1;

    /// Default Opus bitrate in bits per second
    pub const DEFAULT_BITRATE: u32 = 64_000;

    /// Default frame duration in milliseconds
    pub const DEFAULT_FRAME_DURATION_MS: u32 = 20;

    /// Default capacity of the outbound frame queue
    pub const DEFAULT_QUEUE_CAPACITY: usize = 5;

    /// Microphone UDP port used when the session reports no negotiated port
    pub const DEFAULT_MIC_PORT: u16 = 47_996;

    /// Interval between host-request polls
    pub const DEFAULT_HOST_POLL_INTERVAL_MS: u64 = 500;

    /// Device reads are sized to this much audio, independent of frame size
    pub const CAPTURE_CHUNK_MS: u32 = 40;

    /// Sender sleep while capture is inactive or the host is not requesting
    pub const SENDER_IDLE_SLEEP_MS: u64 = 5;

    /// Sender backoff after a failed datagram send
    pub const SENDER_RETRY_SLEEP_MS: u64 = 5;

    /// Bound on how long teardown waits for a worker to exit
    pub const JOIN_TIMEOUT_MS: u64 = 300;

    /// Minimum spacing between periodic diagnostics reports
    pub const REPORT_INTERVAL_MS: u64 = 5_000;

    /// Maximum UDP datagram we will ever build (MTU - IP/UDP headers)
    pub const MAX_PACKET_SIZE: usize = 1472;
}
