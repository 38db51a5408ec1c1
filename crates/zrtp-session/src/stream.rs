//! One media stream: packet pipeline and security state.
//!
//! All mutable state lives behind a single mutex that is held for the whole
//! of a protect/unprotect, so `release()` can never tear down a context in
//! the middle of a packet. The lock is never held while calling into the
//! engine or an application sink.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use rand::Rng;
use tracing::{debug, info, trace, warn};
use zrtp_crypto::{CryptoError, IdentityCache, SrtcpContext, SrtpContext};
use zrtp_protocol::{
    classify, PacketKind, ProtocolError, SecurityState, StreamName, StreamType, WarningCode, Zid,
    ZrtpFrame,
};

use crate::bridge::StreamBridge;
use crate::callbacks::{SasSigner, SendCallback, UserCallback};
use crate::config::ZrtpConfig;
use crate::engine::{EngineCallback, EngineFactory, EngineParams, KeyAgreementEngine};
use crate::session::SessionShared;
use crate::timer::{TimeoutHandler, TimeoutScheduler, TimerKey};

/// Below this many authenticated packets a released call keeps the second
/// retained secret valid.
const RS2_VALID_THRESHOLD: u64 = 50;

/// Outcome of [`ZrtpSession::process_incoming_rtp`](crate::ZrtpSession::process_incoming_rtp).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomingRtp {
    /// Hand the first `n` bytes to the application.
    Deliver(usize),
    /// Consumed or ignored; nothing to deliver.
    Drop,
    AuthFailure,
    ReplayFailure,
}

impl IncomingRtp {
    /// Numeric form: 1 deliver, 0 drop, -1 auth failure, -2 replay.
    pub fn code(self) -> i32 {
        match self {
            Self::Deliver(_) => 1,
            Self::Drop => 0,
            Self::AuthFailure => -1,
            Self::ReplayFailure => -2,
        }
    }
}

/// Packet counters of one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub protect: u64,
    pub unprotect: u64,
    pub unprotect_failed: u64,
    /// Next SRTCP index to be sent.
    pub srtcp_index: u32,
}

/// What a stream needs from its session.
pub(crate) struct StreamContext {
    pub session: Weak<SessionShared>,
    pub scheduler: Arc<dyn TimeoutScheduler>,
    pub identity: Arc<dyn IdentityCache>,
    pub signer: Option<Arc<dyn SasSigner>>,
    pub sign_sas: bool,
}

/// Engine construction inputs.
pub(crate) struct EngineSetup<'a> {
    pub factory: &'a dyn EngineFactory,
    pub own_zid: Zid,
    pub client_id: &'a str,
    pub config: &'a ZrtpConfig,
    pub mitm_mode: bool,
    pub sign_sas: bool,
}

pub(crate) struct StreamState {
    pub own_ssrc: u32,
    pub peer_ssrc: u32,
    pub enabled: bool,
    pub started: bool,
    pub stopped: bool,
    pub security: SecurityState,
    pub previous: SecurityState,
    pub recv_srtp: Option<SrtpContext>,
    pub recv_srtcp: Option<SrtcpContext>,
    pub send_srtp: Option<SrtpContext>,
    pub send_srtcp: Option<SrtcpContext>,
    pub protect: u64,
    pub unprotect: u64,
    pub unprotect_failed: u64,
    pub sender_seq: u16,
    pub peer_hello_hash: String,
    pub hash_match: bool,
    pub sas_verified: bool,
    pub user: Option<Weak<dyn UserCallback>>,
    pub sender: Option<Weak<dyn SendCallback>>,
}

impl StreamState {
    fn new() -> Self {
        Self {
            own_ssrc: 0,
            peer_ssrc: 0,
            enabled: false,
            started: false,
            stopped: false,
            security: SecurityState::LookingPeer,
            previous: SecurityState::LookingPeer,
            recv_srtp: None,
            recv_srtcp: None,
            send_srtp: None,
            send_srtcp: None,
            protect: 0,
            unprotect: 0,
            unprotect_failed: 0,
            sender_seq: rand::thread_rng().gen(),
            peer_hello_hash: String::new(),
            hash_match: false,
            sas_verified: false,
            user: None,
            sender: None,
        }
    }

    /// Move to `next`, remembering the current state as previous.
    pub fn transition(&mut self, next: SecurityState) {
        self.previous = self.security;
        self.security = next;
    }

    pub fn user(&self) -> Option<Arc<dyn UserCallback>> {
        self.user.as_ref()?.upgrade()
    }

    pub fn sender(&self) -> Option<Arc<dyn SendCallback>> {
        self.sender.as_ref()?.upgrade()
    }
}

pub(crate) struct Stream {
    pub name: StreamName,
    pub kind: StreamType,
    pub timer_key: TimerKey,
    pub engine: Arc<dyn KeyAgreementEngine>,
    pub context: StreamContext,
    state: Mutex<StreamState>,
    /// Serializes `start_engine` and `release`. Never taken by engine
    /// callbacks.
    control: Mutex<()>,
    this: Weak<Stream>,
}

impl Stream {
    pub fn new(
        name: StreamName,
        kind: StreamType,
        timer_key: TimerKey,
        context: StreamContext,
        setup: EngineSetup<'_>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| {
            let callback: Arc<dyn EngineCallback> = Arc::new(StreamBridge::new(this.clone()));
            let engine = setup.factory.create(EngineParams {
                own_zid: setup.own_zid,
                callback,
                client_id: setup.client_id,
                config: setup.config,
                mitm_mode: setup.mitm_mode,
                sign_sas: setup.sign_sas,
            });
            Self {
                name,
                kind,
                timer_key,
                engine,
                context,
                state: Mutex::new(StreamState::new()),
                control: Mutex::new(()),
                this: this.clone(),
            }
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn control(&self) -> MutexGuard<'_, ()> {
        self.control.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn timeout_handler(&self) -> Weak<dyn TimeoutHandler> {
        let handler: Weak<dyn TimeoutHandler> = self.this.clone();
        handler
    }

    pub fn set_user_callback(&self, callback: Weak<dyn UserCallback>) {
        self.lock().user = Some(callback);
    }

    pub fn set_send_callback(&self, callback: Weak<dyn SendCallback>) {
        self.lock().sender = Some(callback);
    }

    pub fn set_own_ssrc(&self, ssrc: u32) {
        self.lock().own_ssrc = ssrc;
    }

    /// Enable negotiation without starting the engine.
    pub fn enable(&self) {
        self.lock().enabled = true;
    }

    /// Enable and start the engine, importing multi-stream material first
    /// when given. Returns false if the engine was already started.
    pub fn start_engine(&self, multi_stream: Option<&[u8]>) -> bool {
        let _control = self.control();
        let ssrc = {
            let mut st = self.lock();
            st.enabled = true;
            if st.started {
                return false;
            }
            st.started = true;
            st.own_ssrc
        };
        if let Some(params) = multi_stream {
            self.engine.set_multi_stream_params(params);
        }
        info!(
            stream = ?self.name,
            ssrc,
            multi_stream = multi_stream.is_some(),
            "starting key agreement"
        );
        self.engine.start();
        true
    }

    pub fn stop(&self) {
        self.lock().stopped = true;
        debug!(stream = ?self.name, "stream stopped");
    }

    /// Reset to the pre-start condition. Registered sinks are kept.
    pub fn release(&self) {
        let _control = self.control();
        let (started, unprotect) = {
            let mut st = self.lock();
            st.stopped = true;
            (st.started, st.unprotect)
        };

        if started {
            if unprotect < RS2_VALID_THRESHOLD && !self.engine.is_multi_stream() {
                self.engine.set_rs2_valid();
            }
            self.engine.stop();
        }
        self.context.scheduler.cancel(self.timer_key);

        let mut st = self.lock();
        let user = st.user.take();
        let sender = st.sender.take();
        *st = StreamState {
            user,
            sender,
            ..StreamState::new()
        };
        debug!(stream = ?self.name, "stream released");
    }

    pub fn is_secure(&self) -> bool {
        self.lock().security.is_secure()
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    pub fn current_state(&self) -> SecurityState {
        self.lock().security
    }

    pub fn previous_state(&self) -> SecurityState {
        self.lock().previous
    }

    pub fn stats(&self) -> StreamStats {
        let st = self.lock();
        StreamStats {
            protect: st.protect,
            unprotect: st.unprotect,
            unprotect_failed: st.unprotect_failed,
            srtcp_index: st.send_srtcp.as_ref().map_or(0, SrtcpContext::next_index),
        }
    }

    pub fn signaling_hello_hash(&self) -> String {
        hex_part(&self.engine.hello_hash()).to_string()
    }

    pub fn set_signaling_hello_hash(&self, hash: &str) {
        self.lock().peer_hello_hash = hash.to_string();
    }

    pub fn set_sas_verified(&self, verified: bool) {
        if verified {
            self.engine.sas_verified();
        } else {
            self.engine.reset_sas_verified();
        }
        self.lock().sas_verified = verified;
    }

    /// Protect an outgoing RTP or RTCP packet in place.
    ///
    /// Returns the length to send, or `None` when a send context exists
    /// but protection failed and the packet must not go out.
    pub fn process_outgoing(&self, packet: &mut Vec<u8>) -> Option<usize> {
        let mut guard = self.lock();
        let st = &mut *guard;
        if st.stopped || !st.enabled {
            return Some(packet.len());
        }

        let result = match classify(packet) {
            PacketKind::Rtp => match st.send_srtp.as_mut() {
                Some(ctx) => ctx.protect(packet),
                None => return Some(packet.len()),
            },
            PacketKind::Rtcp => match st.send_srtcp.as_mut() {
                Some(ctx) => ctx.protect(packet),
                None => return Some(packet.len()),
            },
            PacketKind::Zrtp | PacketKind::Unknown => return Some(packet.len()),
        };

        match result {
            Ok(()) => {
                st.protect += 1;
                Some(packet.len())
            }
            Err(e) => {
                warn!(stream = ?self.name, error = %e, "cannot protect packet");
                None
            }
        }
    }

    /// Classify an incoming packet and either hand it to the engine or
    /// unprotect it in place.
    pub fn process_incoming(&self, packet: &mut Vec<u8>) -> IncomingRtp {
        let kind = classify(packet);
        if kind == PacketKind::Zrtp {
            self.process_zrtp(packet);
            return IncomingRtp::Drop;
        }

        let (outcome, user) = {
            let mut guard = self.lock();
            let st = &mut *guard;
            if st.stopped {
                return IncomingRtp::Drop;
            }

            let result = match kind {
                PacketKind::Rtp => match st.recv_srtp.as_mut() {
                    Some(ctx) => ctx.unprotect(packet),
                    None => return IncomingRtp::Deliver(packet.len()),
                },
                PacketKind::Rtcp => match st.recv_srtcp.as_mut() {
                    Some(ctx) => ctx.unprotect(packet),
                    None => return IncomingRtp::Deliver(packet.len()),
                },
                PacketKind::Zrtp | PacketKind::Unknown => {
                    trace!(stream = ?self.name, len = packet.len(), "dropping unknown packet");
                    return IncomingRtp::Drop;
                }
            };

            match result {
                Ok(()) => {
                    st.unprotect += 1;
                    return IncomingRtp::Deliver(packet.len());
                }
                Err(CryptoError::Replay(index)) => {
                    st.unprotect_failed += 1;
                    debug!(stream = ?self.name, index, "replayed packet");
                    (IncomingRtp::ReplayFailure, st.user())
                }
                Err(e) => {
                    st.unprotect_failed += 1;
                    debug!(stream = ?self.name, error = %e, "packet failed authentication");
                    (IncomingRtp::AuthFailure, st.user())
                }
            }
        };

        if let Some(user) = user {
            let warning = match outcome {
                IncomingRtp::ReplayFailure => WarningCode::SrtpReplayError,
                _ => WarningCode::SrtpAuthError,
            };
            user.on_warning(self.name, warning.as_str());
        }
        outcome
    }

    fn process_zrtp(&self, packet: &[u8]) {
        let frame = match ZrtpFrame::parse(packet) {
            Ok(frame) => frame,
            Err(ProtocolError::CrcMismatch { computed, received }) => {
                warn!(stream = ?self.name, computed, received, "ZRTP packet CRC mismatch");
                if let Some(user) = self.active_user() {
                    user.on_warning(self.name, WarningCode::CrcMismatch.as_str());
                }
                return;
            }
            Err(e) => {
                debug!(stream = ?self.name, error = %e, "malformed ZRTP packet");
                return;
            }
        };

        {
            let mut st = self.lock();
            if st.stopped || !st.enabled || st.security.is_terminal() {
                trace!(stream = ?self.name, state = ?st.security, "ignoring ZRTP packet");
                return;
            }
            st.peer_ssrc = frame.ssrc;
        }
        self.engine.process_message(frame.message, frame.ssrc);
    }

    /// The user sink, unless the stream is stopped.
    pub fn active_user(&self) -> Option<Arc<dyn UserCallback>> {
        let st = self.lock();
        if st.stopped {
            return None;
        }
        st.user()
    }
}

/// Hex part of a "<version> <hex>" hello hash.
pub(crate) fn hex_part(hash: &str) -> &str {
    hash.rsplit_once(' ').map_or(hash, |(_, hex)| hex)
}
