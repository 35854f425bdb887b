//! Network subsystem for UDP microphone transport

pub mod packet;
pub(crate) mod sender;

pub use packet::MicPacket;
