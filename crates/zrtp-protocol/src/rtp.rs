use crate::error::ProtocolError;
use crate::packet::{RTCP_HEADER_SIZE, RTP_HEADER_SIZE};

/// The RTP header fields the SRTP transform reads.
///
/// ```text
/// [V=2|P|X|CC] [M|PT] [sequence: u16 BE] [timestamp: u32 BE] [ssrc: u32 BE]
/// [csrc: u32 BE * CC] [ext profile: u16] [ext length: u16] [ext data: u32 * length]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    /// Bytes up to the first payload byte, including CSRCs and extension.
    pub header_len: usize,
}

impl RtpHeader {
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < RTP_HEADER_SIZE {
            return Err(ProtocolError::PacketTooShort {
                expected: RTP_HEADER_SIZE,
                got: data.len(),
            });
        }
        let version = data[0] >> 6;
        if version != 2 {
            return Err(ProtocolError::BadVersion(version));
        }

        let csrc_count = (data[0] & 0x0F) as usize;
        let has_extension = data[0] & 0x10 != 0;
        let mut header_len = RTP_HEADER_SIZE + 4 * csrc_count;

        if has_extension {
            if data.len() < header_len + 4 {
                return Err(ProtocolError::PacketTooShort {
                    expected: header_len + 4,
                    got: data.len(),
                });
            }
            let words = u16::from_be_bytes([data[header_len + 2], data[header_len + 3]]) as usize;
            header_len += 4 + 4 * words;
        }
        if data.len() < header_len {
            return Err(ProtocolError::PacketTooShort {
                expected: header_len,
                got: data.len(),
            });
        }

        Ok(Self {
            marker: data[1] & 0x80 != 0,
            payload_type: data[1] & 0x7F,
            sequence: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            header_len,
        })
    }
}

/// First eight bytes of an RTCP compound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcpHeader {
    pub packet_type: u8,
    /// Length field, in 32-bit words minus one.
    pub length: u16,
    pub ssrc: u32,
}

impl RtcpHeader {
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < RTCP_HEADER_SIZE {
            return Err(ProtocolError::PacketTooShort {
                expected: RTCP_HEADER_SIZE,
                got: data.len(),
            });
        }
        let version = data[0] >> 6;
        if version != 2 {
            return Err(ProtocolError::BadVersion(version));
        }
        Ok(Self {
            packet_type: data[1],
            length: u16::from_be_bytes([data[2], data[3]]),
            ssrc: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        })
    }
}
