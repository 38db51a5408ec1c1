use thiserror::Error;
use zrtp_crypto::IdentityError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot open identity cache: {0}")]
    IdentityCache(#[from] IdentityError),

    #[error("cannot start timer runtime: {0}")]
    Runtime(#[from] std::io::Error),
}
