//! Session and stream orchestration for ZRTP-keyed SRTP media.
//!
//! A [`ZrtpSession`] owns up to two streams (audio is the multi-stream
//! Master, video the Slave). Each stream owns one key-agreement engine,
//! demultiplexes incoming packets between that engine and the SRTP
//! transform, and turns engine callbacks into security state changes
//! and application notifications.
//!
//! The key-agreement protocol itself is external: plug it in through
//! [`EngineFactory`] and [`KeyAgreementEngine`].

mod bridge;
pub mod callbacks;
pub mod config;
pub mod engine;
pub mod error;
pub mod session;
mod stream;
pub mod timer;

#[cfg(test)]
mod testing;

pub use callbacks::{SasSigner, SendCallback, UserCallback};
pub use config::ZrtpConfig;
pub use engine::{EngineCallback, EngineFactory, EngineParams, KeyAgreementEngine, SecureOn};
pub use error::SessionError;
pub use session::{IncomingRtp, SessionBuilder, StreamStats, ZrtpSession, DEFAULT_CLIENT_ID};
pub use timer::{TimeoutHandler, TimeoutScheduler, TimerKey, TokioTimeoutScheduler};

pub use zrtp_protocol::{SecurityState, StreamName, StreamType, Zid};
