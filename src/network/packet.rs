//! Microphone packet framing
//!
//! One UDP datagram per compressed frame, little-endian, 12-byte header:
//!
//! ```text
//! offset  size  field
//!      0     1  flags           0x00
//!      1     1  packetType      0x61 (Opus microphone audio)
//!      2     2  sequenceNumber  wraps at 65536
//!      4     4  timestamp       low 32 bits of sender wall-clock ms
//!      8     4  ssrc            fixed 0x12345678
//!     12     N  payload         compressed frame bytes
//! ```
//!
//! The protocol is fire-and-forget: nothing here is acknowledged or
//! retransmitted.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::NetworkError;

/// Header length in bytes
pub const HEADER_LEN: usize = 12;

/// Packet type marker for Opus-encoded microphone audio
pub const PACKET_TYPE_OPUS: u8 = 0x61;

/// Fixed synchronization-source identifier
pub const PACKET_SSRC: u32 = 0x1234_5678;

/// Build one outbound datagram. Packets are built at send time and never
/// persisted.
pub fn encode_packet(sequence: u16, timestamp: u32, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u8(0x00);
    buf.put_u8(PACKET_TYPE_OPUS);
    buf.put_u16_le(sequence);
    buf.put_u32_le(timestamp);
    buf.put_u32_le(PACKET_SSRC);
    buf.put_slice(payload);
    buf.freeze()
}

/// Parsed view of a microphone datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicPacket {
    pub flags: u8,
    pub packet_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload: Bytes,
}

impl MicPacket {
    pub fn parse(mut buf: &[u8]) -> Result<Self, NetworkError> {
        if buf.len() < HEADER_LEN {
            return Err(NetworkError::InvalidPacket);
        }
        let flags = buf.get_u8();
        let packet_type = buf.get_u8();
        let sequence = buf.get_u16_le();
        let timestamp = buf.get_u32_le();
        let ssrc = buf.get_u32_le();
        Ok(Self {
            flags,
            packet_type,
            sequence,
            timestamp,
            ssrc,
            payload: Bytes::copy_from_slice(buf),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_stable() {
        let packet = encode_packet(0x0201, 0x0605_0403, &[0xAA, 0xBB]);

        let expected: &[u8] = &[
            0x00, // flags
            0x61, // packet type
            0x01, 0x02, // sequence, little-endian
            0x03, 0x04, 0x05, 0x06, // timestamp, little-endian
            0x78, 0x56, 0x34, 0x12, // ssrc, little-endian
            0xAA, 0xBB, // payload
        ];
        assert_eq!(&packet[..], expected);
    }

    #[test]
    fn parse_recovers_fields() {
        let packet = encode_packet(65_535, 0xDEAD_BEEF, b"opus");
        let parsed = MicPacket::parse(&packet).unwrap();

        assert_eq!(parsed.flags, 0x00);
        assert_eq!(parsed.packet_type, PACKET_TYPE_OPUS);
        assert_eq!(parsed.sequence, 65_535);
        assert_eq!(parsed.timestamp, 0xDEAD_BEEF);
        assert_eq!(parsed.ssrc, PACKET_SSRC);
        assert_eq!(&parsed.payload[..], b"opus");
    }

    #[test]
    fn parse_rejects_short_datagrams() {
        assert!(matches!(
            MicPacket::parse(&[0u8; 11]),
            Err(NetworkError::InvalidPacket)
        ));
    }

    #[test]
    fn empty_payload_is_a_bare_header() {
        let packet = encode_packet(7, 9, &[]);
        assert_eq!(packet.len(), HEADER_LEN);
        let parsed = MicPacket::parse(&packet).unwrap();
        assert!(parsed.payload.is_empty());
    }
}
