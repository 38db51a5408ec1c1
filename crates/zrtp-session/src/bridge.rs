//! Engine callbacks: how a stream reacts to its key-agreement engine.

use std::sync::Weak;
use std::time::Duration;

use tracing::{debug, info, trace, warn};
use zrtp_crypto::{CryptoError, SrtcpContext, SrtpContext, SrtpSecrets};
use zrtp_protocol::{
    EnableSecurity, EngineMessage, InfoCode, InfoEnrollment, SecurityState, StreamType,
    WarningCode, ZrtpFrame,
};

use crate::engine::{EngineCallback, SecureOn};
use crate::stream::{hex_part, Stream};
use crate::timer::{TimeoutHandler, TimerKey};

/// Handle given to the engine. Holds the stream weakly since the stream
/// owns the engine; every call is a no-op once the stream is gone.
pub(crate) struct StreamBridge {
    stream: Weak<Stream>,
}

impl StreamBridge {
    pub fn new(stream: Weak<Stream>) -> Self {
        Self { stream }
    }
}

impl EngineCallback for StreamBridge {
    fn send_data(&self, message: &[u8]) -> bool {
        self.stream.upgrade().is_some_and(|s| s.send_data(message))
    }

    fn activate_timer(&self, millis: u64) -> bool {
        self.stream.upgrade().is_some_and(|s| s.activate_timer(millis))
    }

    fn cancel_timer(&self) -> bool {
        self.stream.upgrade().is_some_and(|s| s.cancel_timer())
    }

    fn send_info(&self, message: EngineMessage) {
        if let Some(s) = self.stream.upgrade() {
            s.send_info(message);
        }
    }

    fn srtp_secrets_ready(&self, secrets: &SrtpSecrets, part: EnableSecurity) -> bool {
        self.stream
            .upgrade()
            .is_some_and(|s| s.srtp_secrets_ready(secrets, part))
    }

    fn srtp_secrets_off(&self, part: EnableSecurity) {
        if let Some(s) = self.stream.upgrade() {
            s.srtp_secrets_off(part);
        }
    }

    fn srtp_secrets_on(&self, secure: SecureOn) {
        if let Some(s) = self.stream.upgrade() {
            s.srtp_secrets_on(secure);
        }
    }

    fn handle_go_clear(&self) {
        if let Some(s) = self.stream.upgrade() {
            warn!(stream = ?s.name, "GoClear received, not supported");
        }
    }

    fn negotiation_failed(&self, message: EngineMessage) {
        if let Some(s) = self.stream.upgrade() {
            s.negotiation_failed(message);
        }
    }

    fn not_supported_other(&self) {
        if let Some(s) = self.stream.upgrade() {
            s.not_supported_other();
        }
    }

    fn ask_enrollment(&self, info: InfoEnrollment) {
        if let Some(s) = self.stream.upgrade() {
            if let Some(user) = s.active_user() {
                user.on_need_enroll(s.name, info);
            }
        }
    }

    fn inform_enrollment(&self, info: InfoEnrollment) {
        if let Some(s) = self.stream.upgrade() {
            if let Some(user) = s.active_user() {
                user.on_enrollment_result(s.name, info);
            }
        }
    }

    fn sign_sas(&self, sas_hash: &[u8]) -> bool {
        self.stream.upgrade().is_some_and(|s| s.sign_sas(sas_hash))
    }

    fn check_sas_signature(&self, sas_hash: &[u8]) -> bool {
        self.stream
            .upgrade()
            .is_some_and(|s| s.check_sas_signature(sas_hash))
    }
}

impl TimeoutHandler for Stream {
    fn handle_timeout(&self, key: TimerKey) {
        if key != self.timer_key || self.lock().stopped {
            return;
        }
        trace!(stream = ?self.name, "negotiation timeout");
        self.engine.process_timeout();
    }
}

impl Stream {
    fn send_data(&self, message: &[u8]) -> bool {
        let (sender, packet) = {
            let mut st = self.lock();
            if st.stopped {
                return false;
            }
            let Some(sender) = st.sender() else {
                trace!(stream = ?self.name, "no send callback, ZRTP message discarded");
                return false;
            };
            let sequence = st.sender_seq;
            st.sender_seq = sequence.wrapping_add(1);
            let frame = ZrtpFrame {
                sequence,
                ssrc: st.own_ssrc,
                message,
            };
            (sender, frame.to_bytes())
        };
        sender.send_rtp(self.name, &packet)
    }

    fn activate_timer(&self, millis: u64) -> bool {
        if self.lock().stopped {
            return false;
        }
        self.context.scheduler.request_timeout(
            self.timer_key,
            Duration::from_millis(millis),
            self.timeout_handler(),
        )
    }

    fn cancel_timer(&self) -> bool {
        self.context.scheduler.cancel(self.timer_key);
        true
    }

    fn send_info(&self, message: EngineMessage) {
        match message {
            EngineMessage::Info(InfoCode::HelloReceived) => self.check_hello_hash(),
            EngineMessage::Info(code) if code.is_negotiating() => {
                let user = {
                    let mut st = self.lock();
                    if st.stopped || st.security != SecurityState::LookingPeer {
                        return;
                    }
                    st.transition(SecurityState::GoingSecure);
                    st.user()
                };
                debug!(stream = ?self.name, ?code, "going secure");
                if let Some(user) = user {
                    user.on_new_status(self.name, SecurityState::GoingSecure, None);
                }
            }
            EngineMessage::Info(code) => debug!(stream = ?self.name, ?code, "engine info"),
            EngineMessage::Warning(code) => {
                warn!(stream = ?self.name, warning = code.as_str(), "engine warning");
                if let Some(user) = self.active_user() {
                    user.on_warning(self.name, code.as_str());
                }
            }
            EngineMessage::Severe(_) | EngineMessage::ZrtpError(_) => {
                warn!(stream = ?self.name, error = %message, "engine error");
            }
        }
    }

    /// Compare the peer's Hello hash with the one received via signaling.
    fn check_hello_hash(&self) {
        let expected = {
            let st = self.lock();
            if st.stopped || st.peer_hello_hash.is_empty() {
                return;
            }
            st.peer_hello_hash.clone()
        };
        let peer = self.engine.peer_hello_hash();
        let matched = hex_part(&peer).eq_ignore_ascii_case(hex_part(&expected));

        let user = {
            let mut st = self.lock();
            st.hash_match = matched;
            st.user()
        };
        if matched {
            debug!(stream = ?self.name, "hello hash matches signaling");
            return;
        }
        warn!(stream = ?self.name, "hello hash differs from signaling");
        if let Some(user) = user {
            user.on_warning(self.name, WarningCode::HelloHashMismatch.as_str());
        }
    }

    fn srtp_secrets_ready(&self, secrets: &SrtpSecrets, part: EnableSecurity) -> bool {
        let master = match part {
            EnableSecurity::ForReceiver => secrets.receiver_key(),
            EnableSecurity::ForSender => secrets.sender_key(),
        };
        let contexts = master.and_then(|master| -> Result<_, CryptoError> {
            Ok((SrtpContext::new(&master)?, SrtcpContext::new(&master)?))
        });
        let (rtp, rtcp) = match contexts {
            Ok(contexts) => contexts,
            Err(e) => {
                warn!(stream = ?self.name, ?part, error = %e, "unusable SRTP key material");
                return false;
            }
        };

        let mut st = self.lock();
        if st.stopped {
            return false;
        }
        match part {
            EnableSecurity::ForReceiver => {
                st.recv_srtp = Some(rtp);
                st.recv_srtcp = Some(rtcp);
            }
            EnableSecurity::ForSender => {
                st.send_srtp = Some(rtp);
                st.send_srtcp = Some(rtcp);
            }
        }
        debug!(stream = ?self.name, ?part, "SRTP contexts installed");
        true
    }

    fn srtp_secrets_off(&self, part: EnableSecurity) {
        let mut st = self.lock();
        match part {
            EnableSecurity::ForReceiver => {
                st.recv_srtp = None;
                st.recv_srtcp = None;
            }
            EnableSecurity::ForSender => {
                st.send_srtp = None;
                st.send_srtcp = None;
            }
        }
        debug!(stream = ?self.name, ?part, "SRTP contexts removed");
    }

    fn srtp_secrets_on(&self, secure: SecureOn) {
        let next = if secure.mitm {
            SecurityState::SecureMitm
        } else {
            SecurityState::Secure
        };
        let user = {
            let mut st = self.lock();
            if st.stopped {
                return;
            }
            st.transition(next);
            st.sas_verified = secure.verified;
            st.user()
        };
        info!(
            stream = ?self.name,
            cipher = %secure.cipher,
            verified = secure.verified,
            mitm = secure.mitm,
            "stream secure"
        );

        if let Some(user) = user {
            user.on_new_status(self.name, next, Some(&secure.sas));
            let name = self
                .engine
                .peer_zid()
                .and_then(|zid| self.context.identity.peer_name(&zid));
            user.on_peer(self.name, name.as_deref(), secure.verified);
        }

        if self.kind == StreamType::Master {
            if let Some(session) = self.context.session.upgrade() {
                session.master_stream_secure(self);
            }
        }
    }

    fn negotiation_failed(&self, message: EngineMessage) {
        let user = {
            let mut st = self.lock();
            if st.stopped {
                return;
            }
            st.transition(SecurityState::Error);
            st.user()
        };
        warn!(stream = ?self.name, error = %message, "key agreement failed");
        if let Some(user) = user {
            user.on_new_status(self.name, SecurityState::Error, Some(&message.to_string()));
        }
    }

    fn not_supported_other(&self) {
        let user = {
            let mut st = self.lock();
            if st.stopped {
                return;
            }
            st.transition(SecurityState::NoPeer);
            st.user()
        };
        info!(stream = ?self.name, "peer does not support ZRTP");
        if let Some(user) = user {
            user.on_new_status(self.name, SecurityState::NoPeer, None);
        }
    }

    fn sign_sas(&self, sas_hash: &[u8]) -> bool {
        if !self.context.sign_sas {
            return false;
        }
        let Some(signer) = self.context.signer.as_ref() else {
            return false;
        };
        match signer.sign(sas_hash) {
            Some(signature) => self.engine.set_signature_data(&signature),
            None => {
                warn!(stream = ?self.name, "SAS signing failed");
                false
            }
        }
    }

    fn check_sas_signature(&self, sas_hash: &[u8]) -> bool {
        let Some(signer) = self.context.signer.as_ref() else {
            return true;
        };
        match self.engine.signature_data() {
            Some(signature) => signer.verify(sas_hash, &signature),
            None => false,
        }
    }
}
