//! Seams to the external key-agreement engine.
//!
//! One engine instance runs the negotiation for one stream. The stream
//! hands it every incoming negotiation message and timer expiry, and the
//! engine reports back through [`EngineCallback`].
//!
//! Engines may call back synchronously from any of their methods, so an
//! engine must not hold its own internal locks while invoking a callback.

use std::sync::Arc;

use zrtp_crypto::SrtpSecrets;
use zrtp_protocol::{EnableSecurity, EngineMessage, InfoEnrollment, Zid};

use crate::config::ZrtpConfig;

/// Negotiation result reported when a stream goes secure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureOn {
    /// Negotiated cipher description.
    pub cipher: String,
    /// Short authentication string for the user to compare.
    pub sas: String,
    /// The SAS was verified in an earlier call with this peer.
    pub verified: bool,
    /// The peer is a relay (trusted MitM).
    pub mitm: bool,
}

/// Capabilities the stream provides to its engine.
pub trait EngineCallback: Send + Sync {
    /// Frame and send one negotiation message.
    fn send_data(&self, message: &[u8]) -> bool;

    /// Request a timeout; replaces any pending one for this stream.
    fn activate_timer(&self, millis: u64) -> bool;

    fn cancel_timer(&self) -> bool;

    fn send_info(&self, message: EngineMessage);

    /// Key material is available for one direction.
    fn srtp_secrets_ready(&self, secrets: &SrtpSecrets, part: EnableSecurity) -> bool;

    fn srtp_secrets_off(&self, part: EnableSecurity);

    /// Both directions are keyed and confirmed.
    fn srtp_secrets_on(&self, secure: SecureOn);

    fn handle_go_clear(&self);

    fn negotiation_failed(&self, message: EngineMessage);

    /// The peer answered but does not speak the protocol.
    fn not_supported_other(&self);

    fn ask_enrollment(&self, info: InfoEnrollment);

    fn inform_enrollment(&self, info: InfoEnrollment);

    fn sign_sas(&self, sas_hash: &[u8]) -> bool;

    fn check_sas_signature(&self, sas_hash: &[u8]) -> bool;
}

/// A running key-agreement protocol instance.
pub trait KeyAgreementEngine: Send + Sync {
    fn start(&self);

    fn stop(&self);

    /// Handle one message with framing and CRC already stripped.
    fn process_message(&self, message: &[u8], peer_ssrc: u32);

    fn process_timeout(&self);

    /// Exported key material that lets further streams skip the DH exchange.
    /// Empty until this engine has gone secure.
    fn multi_stream_params(&self) -> Vec<u8>;

    fn set_multi_stream_params(&self, params: &[u8]);

    fn is_multi_stream(&self) -> bool;

    fn peer_zid(&self) -> Option<Zid>;

    fn sas_verified(&self);

    fn reset_sas_verified(&self);

    /// Opaque string-keyed query; unknown keys give `None`.
    fn info(&self, key: &str) -> Option<String>;

    /// Own Hello hash as "<version> <hex>".
    fn hello_hash(&self) -> String;

    /// Peer Hello hash as "<version> <hex>", empty before Hello.
    fn peer_hello_hash(&self) -> String;

    /// Keep the second retained secret valid for the next call.
    fn set_rs2_valid(&self);

    fn set_signature_data(&self, data: &[u8]) -> bool;

    /// Signature data received from the peer.
    fn signature_data(&self) -> Option<Vec<u8>>;
}

/// Everything an engine is constructed with.
pub struct EngineParams<'a> {
    pub own_zid: Zid,
    pub callback: Arc<dyn EngineCallback>,
    pub client_id: &'a str,
    pub config: &'a ZrtpConfig,
    pub mitm_mode: bool,
    pub sign_sas: bool,
}

/// Builds one engine per stream.
pub trait EngineFactory: Send + Sync {
    fn create(&self, params: EngineParams<'_>) -> Arc<dyn KeyAgreementEngine>;
}
