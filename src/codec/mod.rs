//! Codec boundary
//!
//! The pipeline treats the codec as opaque: one PCM frame in, one
//! compressed frame (or nothing) out. The Opus implementation lives here;
//! everything else depends only on the traits.

pub mod encoder;

pub use encoder::{EncoderFactory, FrameEncoder, OpusEncoderFactory, OpusFrameEncoder};
