use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Length of a ZRTP long-term identifier in bytes.
pub const ZID_LEN: usize = 12;

/// Selects one media stream of a session, or all of them.
///
/// `AllStreams` is only meaningful where a call broadcasts to every
/// stream (registering sinks). Everywhere else it is an invalid selector
/// and yields the documented neutral value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum StreamName {
    Audio = 0,
    Video = 1,
    AllStreams = 2,
}

impl StreamName {
    /// The two concrete streams, in slot order.
    pub const MEDIA: [StreamName; 2] = [StreamName::Audio, StreamName::Video];

    pub fn from_index(index: u32) -> Result<Self, ProtocolError> {
        match index {
            0 => Ok(Self::Audio),
            1 => Ok(Self::Video),
            2 => Ok(Self::AllStreams),
            other => Err(ProtocolError::UnknownStream(other)),
        }
    }

    /// Slot index for a concrete stream, `None` for `AllStreams`.
    pub fn slot(self) -> Option<usize> {
        match self {
            Self::Audio => Some(0),
            Self::Video => Some(1),
            Self::AllStreams => None,
        }
    }
}

/// Multi-stream role. Audio is always the Master, Video always the Slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamType {
    Master,
    Slave,
}

impl StreamType {
    pub fn for_stream(name: StreamName) -> Option<Self> {
        match name {
            StreamName::Audio => Some(Self::Master),
            StreamName::Video => Some(Self::Slave),
            StreamName::AllStreams => None,
        }
    }
}

/// Security state reported to the application.
///
/// Discriminants match the status values the application-facing API has
/// always exposed; `WrongStream` is returned by accessors whose stream
/// selector does not name an active stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SecurityState {
    WrongStream = 0,
    LookingPeer = 1,
    NoPeer = 2,
    GoingSecure = 3,
    Secure = 4,
    Error = 5,
    SecureMitm = 6,
}

impl SecurityState {
    pub fn is_secure(self) -> bool {
        matches!(self, Self::Secure | Self::SecureMitm)
    }

    /// True for states that end the current negotiation attempt.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::NoPeer)
    }
}

/// A ZRTP identifier (ZID): the long-term identity of an endpoint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Zid(pub [u8; ZID_LEN]);

impl Zid {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < ZID_LEN {
            return Err(ProtocolError::PacketTooShort {
                expected: ZID_LEN,
                got: bytes.len(),
            });
        }
        let mut zid = [0u8; ZID_LEN];
        zid.copy_from_slice(&bytes[..ZID_LEN]);
        Ok(Self(zid))
    }

    pub fn as_bytes(&self) -> &[u8; ZID_LEN] {
        &self.0
    }
}

impl fmt::Display for Zid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Zid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Zid({self})")
    }
}
