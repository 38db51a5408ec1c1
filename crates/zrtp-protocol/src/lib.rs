//! Wire-level vocabulary shared by the ZRTP media-security crates.
//!
//! Nothing in here performs cryptography: it names streams and states,
//! classifies packets arriving on a media socket, frames ZRTP messages
//! and reads the parts of RTP/RTCP headers the SRTP layer needs.

pub mod codes;
pub mod error;
pub mod packet;
pub mod rtp;
pub mod types;

pub use codes::{EnableSecurity, EngineMessage, ErrorCode, InfoCode, InfoEnrollment, SevereCode, WarningCode};
pub use error::ProtocolError;
pub use packet::{classify, PacketKind, ZrtpFrame, ZRTP_MAGIC};
pub use rtp::{RtcpHeader, RtpHeader};
pub use types::{SecurityState, StreamName, StreamType, Zid, ZID_LEN};
