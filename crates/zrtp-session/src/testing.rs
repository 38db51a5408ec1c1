//! Fakes shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tempfile::TempDir;
use zrtp_crypto::{Role, SrtpSecrets, ZidFile};
use zrtp_protocol::{EnableSecurity, InfoEnrollment, SecurityState, StreamName, Zid, ZrtpFrame};

use crate::callbacks::{SasSigner, SendCallback, UserCallback};
use crate::config::ZrtpConfig;
use crate::engine::{EngineCallback, EngineFactory, EngineParams, KeyAgreementEngine, SecureOn};
use crate::session::{SessionBuilder, ZrtpSession};
use crate::stream::Stream;
use crate::timer::{TimeoutHandler, TimeoutScheduler, TimerKey};

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
pub(crate) struct EngineLog {
    pub started: usize,
    pub stopped: usize,
    pub messages: Vec<(Vec<u8>, u32)>,
    pub timeouts: usize,
    pub multi_stream_in: Option<Vec<u8>>,
    pub rs2_valid: bool,
    pub verified: Option<bool>,
    pub signature_out: Option<Vec<u8>>,
}

/// Records every call; tests drive its callback directly.
pub(crate) struct FakeEngine {
    pub own_zid: Zid,
    pub client_id: String,
    pub config: ZrtpConfig,
    pub mitm_mode: bool,
    pub sign_sas: bool,
    callback: Arc<dyn EngineCallback>,
    log: Mutex<EngineLog>,
    pub multi_stream_out: Mutex<Vec<u8>>,
    pub peer_zid: Mutex<Option<Zid>>,
    pub peer_hello: Mutex<String>,
    pub peer_signature: Mutex<Option<Vec<u8>>>,
}

impl FakeEngine {
    pub fn callback(&self) -> Arc<dyn EngineCallback> {
        Arc::clone(&self.callback)
    }

    pub fn log(&self) -> MutexGuard<'_, EngineLog> {
        self.log.lock().unwrap()
    }
}

impl KeyAgreementEngine for FakeEngine {
    fn start(&self) {
        self.log().started += 1;
    }

    fn stop(&self) {
        self.log().stopped += 1;
    }

    fn process_message(&self, message: &[u8], peer_ssrc: u32) {
        self.log().messages.push((message.to_vec(), peer_ssrc));
    }

    fn process_timeout(&self) {
        self.log().timeouts += 1;
    }

    fn multi_stream_params(&self) -> Vec<u8> {
        self.multi_stream_out.lock().unwrap().clone()
    }

    fn set_multi_stream_params(&self, params: &[u8]) {
        self.log().multi_stream_in = Some(params.to_vec());
    }

    fn is_multi_stream(&self) -> bool {
        self.log().multi_stream_in.is_some()
    }

    fn peer_zid(&self) -> Option<Zid> {
        *self.peer_zid.lock().unwrap()
    }

    fn sas_verified(&self) {
        self.log().verified = Some(true);
    }

    fn reset_sas_verified(&self) {
        self.log().verified = Some(false);
    }

    fn info(&self, key: &str) -> Option<String> {
        match key {
            "client" => Some(self.client_id.clone()),
            _ => None,
        }
    }

    fn hello_hash(&self) -> String {
        "1.10 0123abcd".to_string()
    }

    fn peer_hello_hash(&self) -> String {
        self.peer_hello.lock().unwrap().clone()
    }

    fn set_rs2_valid(&self) {
        self.log().rs2_valid = true;
    }

    fn set_signature_data(&self, data: &[u8]) -> bool {
        self.log().signature_out = Some(data.to_vec());
        true
    }

    fn signature_data(&self) -> Option<Vec<u8>> {
        self.peer_signature.lock().unwrap().clone()
    }
}

/// Hands out [`FakeEngine`]s in creation order (audio before video).
#[derive(Default)]
pub(crate) struct FakeFactory {
    engines: Mutex<Vec<Arc<FakeEngine>>>,
}

impl FakeFactory {
    pub fn engine(&self, index: usize) -> Arc<FakeEngine> {
        Arc::clone(&self.engines.lock().unwrap()[index])
    }

    pub fn count(&self) -> usize {
        self.engines.lock().unwrap().len()
    }
}

impl EngineFactory for FakeFactory {
    fn create(&self, params: EngineParams<'_>) -> Arc<dyn KeyAgreementEngine> {
        let engine = Arc::new(FakeEngine {
            own_zid: params.own_zid,
            client_id: params.client_id.to_string(),
            config: params.config.clone(),
            mitm_mode: params.mitm_mode,
            sign_sas: params.sign_sas,
            callback: params.callback,
            log: Mutex::new(EngineLog::default()),
            multi_stream_out: Mutex::new(Vec::new()),
            peer_zid: Mutex::new(None),
            peer_hello: Mutex::new(String::new()),
            peer_signature: Mutex::new(None),
        });
        self.engines.lock().unwrap().push(Arc::clone(&engine));
        engine
    }
}

/// Scheduler whose timeouts fire only when a test says so.
#[derive(Default)]
pub(crate) struct ManualScheduler {
    pending: Mutex<HashMap<TimerKey, (Duration, Weak<dyn TimeoutHandler>)>>,
}

impl ManualScheduler {
    pub fn delay(&self, key: TimerKey) -> Option<Duration> {
        self.pending.lock().unwrap().get(&key).map(|(delay, _)| *delay)
    }

    pub fn is_pending(&self, key: TimerKey) -> bool {
        self.pending.lock().unwrap().contains_key(&key)
    }

    /// Expire the timeout for `key`. False if none was armed.
    pub fn fire(&self, key: TimerKey) -> bool {
        let entry = self.pending.lock().unwrap().remove(&key);
        match entry.and_then(|(_, handler)| handler.upgrade()) {
            Some(handler) => {
                handler.handle_timeout(key);
                true
            }
            None => false,
        }
    }
}

impl TimeoutScheduler for ManualScheduler {
    fn request_timeout(
        &self,
        key: TimerKey,
        delay: Duration,
        handler: Weak<dyn TimeoutHandler>,
    ) -> bool {
        self.pending.lock().unwrap().insert(key, (delay, handler));
        true
    }

    fn cancel(&self, key: TimerKey) {
        self.pending.lock().unwrap().remove(&key);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UserEvent {
    Status(StreamName, SecurityState, Option<String>),
    Peer(StreamName, Option<String>, bool),
    Warning(StreamName, String),
    NeedEnroll(StreamName, InfoEnrollment),
    EnrollmentResult(StreamName, InfoEnrollment),
}

#[derive(Default)]
pub(crate) struct RecordingUser {
    events: Mutex<Vec<UserEvent>>,
}

impl RecordingUser {
    pub fn events(&self) -> Vec<UserEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UserEvent::Warning(_, w) => Some(w),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: UserEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl UserCallback for RecordingUser {
    fn on_new_status(&self, stream: StreamName, state: SecurityState, info: Option<&str>) {
        self.push(UserEvent::Status(stream, state, info.map(str::to_string)));
    }

    fn on_peer(&self, stream: StreamName, name: Option<&str>, verified: bool) {
        self.push(UserEvent::Peer(stream, name.map(str::to_string), verified));
    }

    fn on_warning(&self, stream: StreamName, warning: &str) {
        self.push(UserEvent::Warning(stream, warning.to_string()));
    }

    fn on_need_enroll(&self, stream: StreamName, info: InfoEnrollment) {
        self.push(UserEvent::NeedEnroll(stream, info));
    }

    fn on_enrollment_result(&self, stream: StreamName, info: InfoEnrollment) {
        self.push(UserEvent::EnrollmentResult(stream, info));
    }
}

pub(crate) struct RecordingSender {
    packets: Mutex<Vec<(StreamName, Vec<u8>)>>,
    accept: AtomicBool,
}

impl Default for RecordingSender {
    fn default() -> Self {
        Self {
            packets: Mutex::new(Vec::new()),
            accept: AtomicBool::new(true),
        }
    }
}

impl RecordingSender {
    pub fn packets(&self) -> Vec<(StreamName, Vec<u8>)> {
        self.packets.lock().unwrap().clone()
    }

    pub fn refuse(&self) {
        self.accept.store(false, Ordering::Relaxed);
    }
}

impl SendCallback for RecordingSender {
    fn send_rtp(&self, stream: StreamName, packet: &[u8]) -> bool {
        self.packets.lock().unwrap().push((stream, packet.to_vec()));
        self.accept.load(Ordering::Relaxed)
    }
}

/// Signs by prefixing the hash.
pub(crate) struct TestSigner;

impl SasSigner for TestSigner {
    fn sign(&self, sas_hash: &[u8]) -> Option<Vec<u8>> {
        Some([b"signed:".as_slice(), sas_hash].concat())
    }

    fn verify(&self, sas_hash: &[u8], signature: &[u8]) -> bool {
        signature.strip_prefix(b"signed:".as_slice()) == Some(sas_hash)
    }
}

/// One session wired to fakes and an isolated identity file.
pub(crate) struct Harness {
    pub session: ZrtpSession,
    pub factory: Arc<FakeFactory>,
    pub scheduler: Arc<ManualScheduler>,
    pub cache: Arc<ZidFile>,
    pub user: Arc<RecordingUser>,
    pub sender: Arc<RecordingSender>,
    dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(|builder| builder)
    }

    pub fn with(configure: impl FnOnce(SessionBuilder) -> SessionBuilder) -> Self {
        init_tracing();
        let factory = Arc::new(FakeFactory::default());
        let scheduler = Arc::new(ManualScheduler::default());
        let cache = Arc::new(ZidFile::new());
        let builder = ZrtpSession::builder(factory.clone())
            .identity_cache(cache.clone())
            .scheduler(scheduler.clone());
        let session = configure(builder).build().unwrap();
        Self {
            session,
            factory,
            scheduler,
            cache,
            user: Arc::new(RecordingUser::default()),
            sender: Arc::new(RecordingSender::default()),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Initialise and register both sinks on every stream.
    pub fn init(&self, audio: bool, video: bool) {
        self.init_without_sinks(audio, video);
        let user: Arc<dyn UserCallback> = self.user.clone();
        let sender: Arc<dyn SendCallback> = self.sender.clone();
        self.session.set_user_callback(&user, StreamName::AllStreams);
        self.session.set_send_callback(&sender, StreamName::AllStreams);
    }

    pub fn init_without_sinks(&self, audio: bool, video: bool) {
        let path = self.dir.path().join("test.zid");
        self.session.init(audio, video, Some(&path), None).unwrap();
    }

    pub fn stream(&self, which: StreamName) -> Arc<Stream> {
        self.session.stream_handle(which).unwrap()
    }

    pub fn audio_engine(&self) -> Arc<FakeEngine> {
        self.factory.engine(0)
    }

    pub fn video_engine(&self) -> Arc<FakeEngine> {
        self.factory.engine(1)
    }

    /// Two started audio sessions keyed against each other, as if their
    /// engines had completed a key agreement.
    pub fn pair() -> (Self, Self) {
        let a = Self::new();
        let b = Self::new();
        for (h, role, ssrc) in [(&a, Role::Initiator, 0xaaaa), (&b, Role::Responder, 0xbbbb)] {
            h.init(true, false);
            h.session.start(ssrc, StreamName::Audio);
            let callback = h.audio_engine().callback();
            let keys = secrets(role);
            assert!(callback.srtp_secrets_ready(&keys, EnableSecurity::ForSender));
            assert!(callback.srtp_secrets_ready(&keys, EnableSecurity::ForReceiver));
            callback.srtp_secrets_on(SecureOn {
                cipher: "AES-128".into(),
                sas: "test".into(),
                verified: false,
                mitm: false,
            });
        }
        (a, b)
    }
}

pub(crate) fn secrets(role: Role) -> SrtpSecrets {
    SrtpSecrets {
        key_initiator: vec![0x11; 16],
        salt_initiator: vec![0x22; 12],
        key_responder: vec![0x33; 16],
        salt_responder: vec![0x44; 12],
        role,
    }
}

pub(crate) fn rtp_packet(sequence: u16, ssrc: u32, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x80, 0x00];
    packet.extend_from_slice(&sequence.to_be_bytes());
    packet.extend_from_slice(&(u32::from(sequence) * 160).to_be_bytes());
    packet.extend_from_slice(&ssrc.to_be_bytes());
    packet.extend_from_slice(payload);
    packet
}

pub(crate) fn rtcp_packet(ssrc: u32, body: &[u8]) -> Vec<u8> {
    let words = (4 + body.len()) / 4;
    let mut packet = vec![0x80, 200];
    packet.extend_from_slice(&(words as u16).to_be_bytes());
    packet.extend_from_slice(&ssrc.to_be_bytes());
    packet.extend_from_slice(body);
    packet
}

pub(crate) fn zrtp_packet(sequence: u16, ssrc: u32, message: &[u8]) -> Vec<u8> {
    ZrtpFrame {
        sequence,
        ssrc,
        message,
    }
    .to_bytes()
}
