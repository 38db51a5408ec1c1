//! Session controller.
//!
//! A session owns the audio (Master) and video (Slave) streams. Streams are
//! created once in [`ZrtpSession::init`] and live as long as the session.
//!
//! Every accessor runs the same guard: before the session is ready, for a
//! selector without a stream (including [`StreamName::AllStreams`] where a
//! single stream is meant) and, for some accessors, on a stopped stream, it
//! returns a neutral value (`false`, zero, empty, or
//! [`SecurityState::WrongStream`]) and changes nothing.
//!
//! # Multi-stream ordering
//!
//! The video stream never runs its own DH exchange. Starting it before the
//! audio stream is secure only enables it; it starts once audio goes secure.
//! Starting it afterwards starts it immediately. Either way it starts
//! exactly once, but when that happens relative to `start()` returning
//! depends on the caller's ordering.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tracing::{debug, info, warn};
use zrtp_crypto::{default_zid_path, global_identity_cache, IdentityCache, IdentityError};
use zrtp_protocol::{SecurityState, StreamName, StreamType};

use crate::callbacks::{SasSigner, SendCallback, UserCallback};
use crate::config::ZrtpConfig;
use crate::engine::EngineFactory;
use crate::error::SessionError;
use crate::stream::{EngineSetup, Stream, StreamContext};
use crate::timer::{TimeoutScheduler, TimerKey, TokioTimeoutScheduler};

pub use crate::stream::{IncomingRtp, StreamStats};

/// Client identifier announced by the engines unless overridden.
pub const DEFAULT_CLIENT_ID: &str = concat!("zrtp-rs ", env!("CARGO_PKG_VERSION"));

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Which streams an accessor accepts.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Guard {
    Any,
    Running,
}

pub(crate) struct SessionShared {
    id: u64,
    client_id: String,
    mitm_mode: bool,
    sign_sas: bool,
    paranoid_mode: bool,
    factory: Arc<dyn EngineFactory>,
    identity: Arc<dyn IdentityCache>,
    scheduler: Arc<dyn TimeoutScheduler>,
    signer: Option<Arc<dyn SasSigner>>,
    streams: [OnceLock<Arc<Stream>>; 2],
    ready: AtomicBool,
    /// The session lock. Holds the Master's exported multi-stream material
    /// (empty until the Master is secure) and serializes stream creation
    /// and the Slave start decision.
    multi_stream: Mutex<Vec<u8>>,
}

impl SessionShared {
    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.multi_stream.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn slot(&self, which: StreamName) -> Option<&Arc<Stream>> {
        self.streams[which.slot()?].get()
    }

    /// Called by the Master stream once it is secure.
    pub(crate) fn master_stream_secure(&self, master: &Stream) {
        let params = master.engine.multi_stream_params();
        if params.is_empty() {
            warn!(session = self.id, "master secure without multi-stream parameters");
        }

        let mut stored = self.lock();
        *stored = params;
        let Some(slave) = self.slot(StreamName::Video) else {
            return;
        };
        if stored.is_empty() || !slave.is_enabled() || slave.is_started() || slave.is_stopped() {
            return;
        }
        debug!(session = self.id, "starting deferred slave stream");
        slave.start_engine(Some(stored.as_slice()));
    }
}

/// Configures a [`ZrtpSession`].
pub struct SessionBuilder {
    factory: Arc<dyn EngineFactory>,
    identity: Option<Arc<dyn IdentityCache>>,
    scheduler: Option<Arc<dyn TimeoutScheduler>>,
    signer: Option<Arc<dyn SasSigner>>,
    client_id: String,
    mitm_mode: bool,
    sign_sas: bool,
    paranoid_mode: bool,
}

impl SessionBuilder {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            identity: None,
            scheduler: None,
            signer: None,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            mitm_mode: false,
            sign_sas: false,
            paranoid_mode: false,
        }
    }

    /// Identity cache to use instead of the process-wide one.
    pub fn identity_cache(mut self, cache: Arc<dyn IdentityCache>) -> Self {
        self.identity = Some(cache);
        self
    }

    /// Timeout scheduler to use instead of a tokio-backed one.
    pub fn scheduler(mut self, scheduler: Arc<dyn TimeoutScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn sas_signer(mut self, signer: Arc<dyn SasSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Act as a trusted MitM (PBX). Applies to the Master stream.
    pub fn mitm_mode(mut self, enable: bool) -> Self {
        self.mitm_mode = enable;
        self
    }

    /// Sign the SAS. Applies to the Master stream.
    pub fn sign_sas(mut self, enable: bool) -> Self {
        self.sign_sas = enable;
        self
    }

    pub fn paranoid_mode(mut self, enable: bool) -> Self {
        self.paranoid_mode = enable;
        self
    }

    pub fn build(self) -> Result<ZrtpSession, SessionError> {
        let identity: Arc<dyn IdentityCache> = match self.identity {
            Some(cache) => cache,
            None => global_identity_cache(),
        };
        let scheduler: Arc<dyn TimeoutScheduler> = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(TokioTimeoutScheduler::new()?),
        };

        Ok(ZrtpSession {
            shared: Arc::new(SessionShared {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                client_id: self.client_id,
                mitm_mode: self.mitm_mode,
                sign_sas: self.sign_sas,
                paranoid_mode: self.paranoid_mode,
                factory: self.factory,
                identity,
                scheduler,
                signer: self.signer,
                streams: [OnceLock::new(), OnceLock::new()],
                ready: AtomicBool::new(false),
                multi_stream: Mutex::new(Vec::new()),
            }),
        })
    }
}

/// ZRTP keying for the audio and video streams of one call.
pub struct ZrtpSession {
    shared: Arc<SessionShared>,
}

impl ZrtpSession {
    pub fn builder(factory: Arc<dyn EngineFactory>) -> SessionBuilder {
        SessionBuilder::new(factory)
    }

    /// Open the identity cache if needed and create the requested streams.
    ///
    /// `identity_path` defaults to [`default_zid_path`]; `config` defaults
    /// to the standard suite. The session's paranoid-mode flag is applied
    /// to the configuration either way. An identity cache that cannot be
    /// opened is the only error, and leaves the session not ready.
    pub fn init(
        &self,
        audio: bool,
        video: bool,
        identity_path: Option<&Path>,
        config: Option<ZrtpConfig>,
    ) -> Result<(), SessionError> {
        let shared = &self.shared;
        let _guard = shared.lock();

        let mut config = config.unwrap_or_else(ZrtpConfig::standard);
        config.set_paranoid_mode(shared.paranoid_mode);

        if !shared.identity.is_open() {
            let path = identity_path.map_or_else(default_zid_path, Path::to_path_buf);
            if let Err(e) = shared.identity.open(&path) {
                warn!(path = %path.display(), error = %e, "cannot open identity cache");
                return Err(e.into());
            }
        }
        let own_zid = shared.identity.own_zid().ok_or(IdentityError::NotOpen)?;

        for (name, wanted) in [(StreamName::Audio, audio), (StreamName::Video, video)] {
            if !wanted {
                continue;
            }
            let (Some(slot), Some(kind)) = (name.slot(), StreamType::for_stream(name)) else {
                continue;
            };
            let master = kind == StreamType::Master;
            shared.streams[slot].get_or_init(|| {
                debug!(session = shared.id, stream = ?name, ?kind, "creating stream");
                Stream::new(
                    name,
                    kind,
                    TimerKey {
                        session: shared.id,
                        stream: name,
                    },
                    StreamContext {
                        session: Arc::downgrade(shared),
                        scheduler: Arc::clone(&shared.scheduler),
                        identity: Arc::clone(&shared.identity),
                        signer: shared.signer.clone(),
                        sign_sas: master && shared.sign_sas,
                    },
                    EngineSetup {
                        factory: shared.factory.as_ref(),
                        own_zid,
                        client_id: &shared.client_id,
                        config: &config,
                        mitm_mode: master && shared.mitm_mode,
                        sign_sas: master && shared.sign_sas,
                    },
                )
            });
        }

        shared.ready.store(true, Ordering::Release);
        info!(session = shared.id, audio, video, zid = %own_zid, "session initialised");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    fn stream(&self, which: StreamName, guard: Guard) -> Option<&Arc<Stream>> {
        if !self.is_ready() {
            return None;
        }
        let stream = self.shared.slot(which)?;
        if guard == Guard::Running && stream.is_stopped() {
            return None;
        }
        Some(stream)
    }

    /// Streams addressed by `which`; every existing one for `AllStreams`.
    fn targets(&self, which: StreamName) -> Vec<&Arc<Stream>> {
        if which == StreamName::AllStreams {
            if !self.is_ready() {
                return Vec::new();
            }
            return StreamName::MEDIA
                .iter()
                .filter_map(|&name| self.shared.slot(name))
                .collect();
        }
        self.stream(which, Guard::Any).into_iter().collect()
    }

    /// Register the user sink. Only a weak reference is kept.
    pub fn set_user_callback(&self, callback: &Arc<dyn UserCallback>, which: StreamName) {
        for stream in self.targets(which) {
            stream.set_user_callback(Arc::downgrade(callback));
        }
    }

    /// Register the send sink. Only a weak reference is kept.
    pub fn set_send_callback(&self, callback: &Arc<dyn SendCallback>, which: StreamName) {
        for stream in self.targets(which) {
            stream.set_send_callback(Arc::downgrade(callback));
        }
    }

    /// Set the stream's SSRC and start negotiation. A Slave stream started
    /// before the Master is secure is only enabled.
    pub fn start(&self, ssrc: u32, which: StreamName) {
        let Some(stream) = self.stream(which, Guard::Any) else {
            return;
        };
        stream.set_own_ssrc(ssrc);
        match stream.kind {
            StreamType::Master => {
                stream.start_engine(None);
            }
            StreamType::Slave => {
                let params = self.shared.lock();
                if params.is_empty() {
                    stream.enable();
                    debug!(session = self.shared.id, stream = ?which, "waiting for master key material");
                } else {
                    stream.start_engine(Some(params.as_slice()));
                }
            }
        }
    }

    /// Suspend packet and callback processing. State is kept.
    pub fn stop(&self, which: StreamName) {
        for stream in self.targets(which) {
            stream.stop();
        }
    }

    /// Reset one stream (or all) to the reusable pre-start condition.
    pub fn release_stream(&self, which: StreamName) {
        for stream in self.targets(which) {
            stream.release();
            if stream.kind == StreamType::Master {
                // the next call negotiates its own master secret
                self.shared.lock().clear();
                debug!(session = self.shared.id, "multi-stream parameters cleared");
            }
        }
    }

    pub fn release(&self) {
        self.release_stream(StreamName::AllStreams);
    }

    /// Remember `name` for the peer of the audio stream.
    pub fn set_last_peer_name(&self, name: &str) {
        let Some(stream) = self.stream(StreamName::Audio, Guard::Running) else {
            return;
        };
        let Some(peer) = stream.engine.peer_zid() else {
            debug!(session = self.shared.id, "no peer ZID yet, name not stored");
            return;
        };
        if let Err(e) = self.shared.identity.put_peer_name(&peer, name) {
            warn!(session = self.shared.id, zid = %peer, error = %e, "cannot store peer name");
        }
    }

    /// Set or clear the SAS-verified flag of the audio stream.
    pub fn set_verify(&self, verified: bool) {
        if let Some(stream) = self.stream(StreamName::Audio, Guard::Running) {
            stream.set_sas_verified(verified);
        }
    }

    pub fn is_secure(&self, which: StreamName) -> bool {
        self.stream(which, Guard::Any)
            .is_some_and(|s| s.is_secure())
    }

    pub fn is_started(&self, which: StreamName) -> bool {
        self.stream(which, Guard::Any)
            .is_some_and(|s| s.is_started())
    }

    pub fn is_enabled(&self, which: StreamName) -> bool {
        self.stream(which, Guard::Running)
            .is_some_and(|s| s.is_enabled())
    }

    pub fn current_state(&self, which: StreamName) -> SecurityState {
        self.stream(which, Guard::Running)
            .map_or(SecurityState::WrongStream, |s| s.current_state())
    }

    pub fn previous_state(&self, which: StreamName) -> SecurityState {
        self.stream(which, Guard::Running)
            .map_or(SecurityState::WrongStream, |s| s.previous_state())
    }

    /// Engine-defined information, passed through verbatim.
    pub fn info(&self, key: &str, which: StreamName) -> Option<String> {
        self.stream(which, Guard::Any)?.engine.info(key)
    }

    /// Hex part of this stream's Hello hash, for the signaling layer.
    pub fn signaling_hello_hash(&self, which: StreamName) -> String {
        self.stream(which, Guard::Running)
            .map(|s| s.signaling_hello_hash())
            .unwrap_or_default()
    }

    /// Hello hash of the peer as received via signaling.
    pub fn set_signaling_hello_hash(&self, hash: &str, which: StreamName) {
        if let Some(stream) = self.stream(which, Guard::Running) {
            stream.set_signaling_hello_hash(hash);
        }
    }

    pub fn stats(&self, which: StreamName) -> StreamStats {
        self.stream(which, Guard::Any)
            .map(|s| s.stats())
            .unwrap_or_default()
    }

    /// Protect an outgoing RTP or RTCP packet in place.
    ///
    /// Returns the length to send. Packets pass through unchanged until the
    /// stream has send keys. `None` means protection failed and the packet
    /// must be discarded.
    pub fn process_outgoing_rtp(&self, packet: &mut Vec<u8>, which: StreamName) -> Option<usize> {
        match self.stream(which, Guard::Any) {
            Some(stream) => stream.process_outgoing(packet),
            None => Some(packet.len()),
        }
    }

    /// Handle one packet received on the media path.
    pub fn process_incoming_rtp(&self, packet: &mut Vec<u8>, which: StreamName) -> IncomingRtp {
        match self.stream(which, Guard::Any) {
            Some(stream) => stream.process_incoming(packet),
            None => IncomingRtp::Drop,
        }
    }

    #[cfg(test)]
    pub(crate) fn stream_handle(&self, which: StreamName) -> Option<Arc<Stream>> {
        self.shared.slot(which).cloned()
    }
}

impl Drop for ZrtpSession {
    fn drop(&mut self) {
        for name in StreamName::MEDIA {
            if let Some(stream) = self.shared.slot(name) {
                stream.release();
            }
        }
    }
}
