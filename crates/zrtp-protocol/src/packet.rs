use bytes::{BufMut, BytesMut};
use crc::{Crc, CRC_32_ISCSI};

use crate::error::ProtocolError;

/// Magic cookie at bytes 4..8 of every ZRTP packet ("ZRTP").
pub const ZRTP_MAGIC: u32 = 0x5A52_5450;

/// ZRTP packet header: flags(1) + unused(1) + sequence(2) + magic(4) + ssrc(4).
pub const ZRTP_HEADER_SIZE: usize = 12;

/// Trailing CRC-32C.
pub const ZRTP_CRC_SIZE: usize = 4;

/// Minimum RTP header (no CSRCs, no extension).
pub const RTP_HEADER_SIZE: usize = 12;

/// Fixed part of an RTCP header covered by authentication only.
pub const RTCP_HEADER_SIZE: usize = 8;

const CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// What a datagram received on a media socket carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Key-agreement (ZRTP) message.
    Zrtp,
    Rtp,
    /// RTCP multiplexed on the RTP port (RFC 5761 packet types 192..=223).
    Rtcp,
    Unknown,
}

/// Demultiplex a packet by its header discriminators.
pub fn classify(data: &[u8]) -> PacketKind {
    if data.len() >= ZRTP_HEADER_SIZE + ZRTP_CRC_SIZE
        && data[0] & 0xF0 == 0x10
        && u32::from_be_bytes([data[4], data[5], data[6], data[7]]) == ZRTP_MAGIC
    {
        return PacketKind::Zrtp;
    }
    if data.len() < RTCP_HEADER_SIZE || data[0] >> 6 != 2 {
        return PacketKind::Unknown;
    }
    if (192..=223).contains(&data[1]) {
        return PacketKind::Rtcp;
    }
    if data.len() >= RTP_HEADER_SIZE {
        PacketKind::Rtp
    } else {
        PacketKind::Unknown
    }
}

/// A ZRTP packet as it travels on the wire.
///
/// Wire format:
/// ```text
/// [0x10] [0x00] [sequence: u16 BE] [magic: u32 BE] [ssrc: u32 BE] [message] [crc32c: u32 BE]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZrtpFrame<'a> {
    pub sequence: u16,
    pub ssrc: u32,
    /// The engine message, without header and CRC.
    pub message: &'a [u8],
}

impl<'a> ZrtpFrame<'a> {
    /// Parse and CRC-check a received ZRTP packet.
    pub fn parse(data: &'a [u8]) -> Result<Self, ProtocolError> {
        let min = ZRTP_HEADER_SIZE + ZRTP_CRC_SIZE;
        if data.len() < min {
            return Err(ProtocolError::PacketTooShort {
                expected: min,
                got: data.len(),
            });
        }
        if classify(data) != PacketKind::Zrtp {
            return Err(ProtocolError::NotZrtp);
        }

        let crc_at = data.len() - ZRTP_CRC_SIZE;
        let received = u32::from_be_bytes([
            data[crc_at],
            data[crc_at + 1],
            data[crc_at + 2],
            data[crc_at + 3],
        ]);
        let computed = CRC32C.checksum(&data[..crc_at]);
        if computed != received {
            return Err(ProtocolError::CrcMismatch { computed, received });
        }

        Ok(Self {
            sequence: u16::from_be_bytes([data[2], data[3]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            message: &data[ZRTP_HEADER_SIZE..crc_at],
        })
    }

    /// Serialize for transmission, appending the CRC.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf =
            BytesMut::with_capacity(ZRTP_HEADER_SIZE + self.message.len() + ZRTP_CRC_SIZE);
        buf.put_u8(0x10);
        buf.put_u8(0x00);
        buf.put_u16(self.sequence);
        buf.put_u32(ZRTP_MAGIC);
        buf.put_u32(self.ssrc);
        buf.put_slice(self.message);
        let crc = CRC32C.checksum(&buf);
        buf.put_u32(crc);
        buf.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rtp_packet(pt: u8) -> Vec<u8> {
        let mut p = vec![0x80, pt, 0, 1, 0, 0, 0, 160, 0x11, 0x22, 0x33, 0x44];
        p.extend_from_slice(b"payload");
        p
    }

    #[test]
    fn zrtp_frame_roundtrip() {
        let frame = ZrtpFrame {
            sequence: 0xBEEF,
            ssrc: 0x0102_0304,
            message: b"\x50\x5a\x00\x05Hello   ",
        };
        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), ZRTP_HEADER_SIZE + frame.message.len() + ZRTP_CRC_SIZE);
        assert_eq!(classify(&bytes), PacketKind::Zrtp);

        let parsed = ZrtpFrame::parse(&bytes).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn zrtp_crc_mismatch_detected() {
        let message = [0u8; 8];
        let mut bytes = ZrtpFrame {
            sequence: 1,
            ssrc: 2,
            message: &message,
        }
        .to_bytes();
        bytes[ZRTP_HEADER_SIZE] ^= 0x01;
        assert!(matches!(
            ZrtpFrame::parse(&bytes),
            Err(ProtocolError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn classify_rtp_and_rtcp() {
        assert_eq!(classify(&rtp_packet(0)), PacketKind::Rtp);
        assert_eq!(classify(&rtp_packet(111)), PacketKind::Rtp);
        // Marker bit set on dynamic PT 96 gives second byte 0xE0 (224): still RTP
        assert_eq!(classify(&rtp_packet(0xE0)), PacketKind::Rtp);
        assert_eq!(classify(&rtp_packet(200)), PacketKind::Rtcp);
        assert_eq!(classify(&rtp_packet(201)), PacketKind::Rtcp);
    }

    #[test]
    fn classify_garbage() {
        assert_eq!(classify(&[]), PacketKind::Unknown);
        assert_eq!(classify(&[0x80, 0x00]), PacketKind::Unknown);
        // Version 1
        assert_eq!(classify(&[0x40; 20]), PacketKind::Unknown);
    }

    #[test]
    fn zrtp_nibble_without_magic_is_not_zrtp() {
        let data = [0x10u8; 20];
        assert_ne!(classify(&data), PacketKind::Zrtp);
        assert_eq!(ZrtpFrame::parse(&data), Err(ProtocolError::NotZrtp));
    }

    #[test]
    fn zrtp_too_short() {
        assert!(matches!(
            ZrtpFrame::parse(&[0x10, 0, 0, 1]),
            Err(ProtocolError::PacketTooShort { .. })
        ));
    }
}
