use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("packet too short: expected at least {expected} bytes, got {got}")]
    PacketTooShort { expected: usize, got: usize },

    #[error("unsupported RTP version {0}")]
    BadVersion(u8),

    #[error("not a ZRTP packet")]
    NotZrtp,

    #[error("ZRTP CRC mismatch: computed 0x{computed:08x}, received 0x{received:08x}")]
    CrcMismatch { computed: u32, received: u32 },

    #[error("unknown stream index {0}")]
    UnknownStream(u32),
}
