//! Message codes a key-agreement engine reports back to its stream.

use std::fmt;

/// Informational progress of a negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoCode {
    HelloReceived,
    CommitDhGenerated,
    RespCommitReceived,
    Dh1DhGenerated,
    InitDh1Received,
    RespDh2Received,
    InitConf1Received,
    RespConf2Received,
    RsMatchFound,
    SecureStateOn,
    SecureStateOff,
}

impl InfoCode {
    /// Codes that mean the peer answered and key agreement is under way.
    pub fn is_negotiating(self) -> bool {
        matches!(
            self,
            Self::CommitDhGenerated
                | Self::RespCommitReceived
                | Self::Dh1DhGenerated
                | Self::InitDh1Received
                | Self::RespDh2Received
                | Self::InitConf1Received
                | Self::RespConf2Received
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningCode {
    DhAesMismatch,
    GoClearReceived,
    DhShort,
    NoRsMatch,
    CrcMismatch,
    SrtpAuthError,
    SrtpReplayError,
    NoExpectedRsMatch,
    NoExpectedAuxMatch,
    HelloHashMismatch,
}

impl WarningCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DhAesMismatch => "s2_c001: hash-length mismatch between DH and AES key",
            Self::GoClearReceived => "s2_c002: GoClear received, not supported",
            Self::DhShort => "s2_c003: DH key too short for AES-256",
            Self::NoRsMatch => "s2_c004: no retained shared secret available",
            Self::CrcMismatch => "s2_c005: ZRTP packet CRC mismatch",
            Self::SrtpAuthError => "s2_c006: SRTP authentication failed",
            Self::SrtpReplayError => "s2_c007: SRTP replay check failed",
            Self::NoExpectedRsMatch => "s2_c008: expected retained secret missing, possible MitM",
            Self::NoExpectedAuxMatch => "s2_c009: auxiliary secret mismatch",
            Self::HelloHashMismatch => "s2_c010: signaled Hello hash does not match",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SevereCode {
    HelloHmacFailed,
    CommitHmacFailed,
    Dh1HmacFailed,
    Dh2HmacFailed,
    CannotSend,
    ProtocolError,
    NoTimer,
    TooMuchRetries,
    SecurityError,
}

/// Error codes carried in ZRTP Error messages (RFC 6189, section 5.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MalformedPacket,
    CriticalSwError,
    UnsuppZrtpVersion,
    HelloCompMismatch,
    UnsuppHashType,
    UnsuppCipherType,
    UnsuppPkExchange,
    UnsuppSrtpAuthTag,
    UnsuppSasScheme,
    NoSharedSecret,
    DhErrorWrongPv,
    DhErrorWrongHvi,
    SasUntrustedMitm,
    ConfirmHmacWrong,
    NonceReused,
    EqualZidHello,
    GoClearNotAllowed,
    Other(u32),
}

impl ErrorCode {
    pub fn from_code(code: u32) -> Self {
        match code {
            0x10 => Self::MalformedPacket,
            0x20 => Self::CriticalSwError,
            0x30 => Self::UnsuppZrtpVersion,
            0x40 => Self::HelloCompMismatch,
            0x51 => Self::UnsuppHashType,
            0x52 => Self::UnsuppCipherType,
            0x53 => Self::UnsuppPkExchange,
            0x54 => Self::UnsuppSrtpAuthTag,
            0x55 => Self::UnsuppSasScheme,
            0x56 => Self::NoSharedSecret,
            0x61 => Self::DhErrorWrongPv,
            0x62 => Self::DhErrorWrongHvi,
            0x63 => Self::SasUntrustedMitm,
            0x70 => Self::ConfirmHmacWrong,
            0x80 => Self::NonceReused,
            0x90 => Self::EqualZidHello,
            0x100 => Self::GoClearNotAllowed,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::MalformedPacket => 0x10,
            Self::CriticalSwError => 0x20,
            Self::UnsuppZrtpVersion => 0x30,
            Self::HelloCompMismatch => 0x40,
            Self::UnsuppHashType => 0x51,
            Self::UnsuppCipherType => 0x52,
            Self::UnsuppPkExchange => 0x53,
            Self::UnsuppSrtpAuthTag => 0x54,
            Self::UnsuppSasScheme => 0x55,
            Self::NoSharedSecret => 0x56,
            Self::DhErrorWrongPv => 0x61,
            Self::DhErrorWrongHvi => 0x62,
            Self::SasUntrustedMitm => 0x63,
            Self::ConfirmHmacWrong => 0x70,
            Self::NonceReused => 0x80,
            Self::EqualZidHello => 0x90,
            Self::GoClearNotAllowed => 0x100,
            Self::Other(code) => code,
        }
    }
}

/// A severity-tagged message from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMessage {
    Info(InfoCode),
    Warning(WarningCode),
    Severe(SevereCode),
    /// Error sent or received in a ZRTP Error message.
    ZrtpError(ErrorCode),
}

impl fmt::Display for EngineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info(code) => write!(f, "info: {code:?}"),
            Self::Warning(code) => f.write_str(code.as_str()),
            Self::Severe(code) => write!(f, "severe: {code:?}"),
            Self::ZrtpError(code) => write!(f, "zrtp error 0x{:x}", code.code()),
        }
    }
}

/// Enrollment (trusted PBX MitM) prompts and results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoEnrollment {
    EnrollmentRequest,
    EnrollmentReconfirm,
    EnrollmentCanceled,
    EnrollmentFailed,
    EnrollmentOk,
}

/// Which direction a set of SRTP secrets applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableSecurity {
    ForReceiver,
    ForSender,
}
