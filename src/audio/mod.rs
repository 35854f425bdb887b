//! Audio subsystem module

pub mod assembler;
pub mod capture;
pub mod cpal_input;
pub mod queue;

pub use assembler::FrameAssembler;
pub use capture::{AudioSource, InputDevice, MicCapture};
pub use cpal_input::CpalInput;
pub use queue::BoundedFrameQueue;
