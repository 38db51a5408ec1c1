use std::path::PathBuf;

use thiserror::Error;
use zrtp_protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unsupported master key length {0} (expected 16 or 32)")]
    KeyLength(usize),

    #[error("master salt must be {expected} bytes, got {got}")]
    SaltLength { expected: usize, got: usize },

    #[error("authentication failed")]
    AuthFailed,

    #[error("replayed or too old packet index {0}")]
    Replay(u64),

    #[error("packet index space exhausted, rekey required")]
    IndexExhausted,

    #[error("key derivation failed")]
    Kdf,

    #[error("encryption failed")]
    Seal,

    #[error("malformed packet: {0}")]
    Malformed(#[from] ProtocolError),
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity cache is not open")]
    NotOpen,

    #[error("random generator failed")]
    Rng,

    #[error("identity file {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}
