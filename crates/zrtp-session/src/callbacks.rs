//! Application-side sinks.
//!
//! The session keeps only weak references to these, so the application
//! owns them and dropping one is the same as never registering it.

use zrtp_protocol::{InfoEnrollment, SecurityState, StreamName};

/// Security notifications for the user interface.
pub trait UserCallback: Send + Sync {
    /// The stream moved to `state`. `info` carries the SAS for secure
    /// states and the failure text for `Error`.
    fn on_new_status(&self, stream: StreamName, state: SecurityState, info: Option<&str>);

    /// The peer's cached display name, if any, and whether its SAS was
    /// verified before.
    fn on_peer(&self, _stream: StreamName, _name: Option<&str>, _verified: bool) {}

    fn on_warning(&self, _stream: StreamName, _warning: &str) {}

    /// A PBX asks the user to enroll.
    fn on_need_enroll(&self, _stream: StreamName, _info: InfoEnrollment) {}

    /// Outcome of an enrollment.
    fn on_enrollment_result(&self, _stream: StreamName, _info: InfoEnrollment) {}
}

/// Transmits negotiation packets on the media path.
pub trait SendCallback: Send + Sync {
    fn send_rtp(&self, stream: StreamName, packet: &[u8]) -> bool;
}

/// Optional SAS signing backend.
pub trait SasSigner: Send + Sync {
    fn sign(&self, sas_hash: &[u8]) -> Option<Vec<u8>>;

    fn verify(&self, sas_hash: &[u8], signature: &[u8]) -> bool;
}
