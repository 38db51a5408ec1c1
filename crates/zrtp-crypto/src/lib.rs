//! Media protection for ZRTP-keyed streams.
//!
//! This crate provides:
//! - Containers for the SRTP key material a key-agreement engine hands over
//! - Per-direction SRTP and SRTCP transform contexts (AES-GCM via ring)
//! - A 64-packet replay window
//! - The identity cache holding this endpoint's ZID and known peer names

pub mod error;
pub mod identity;
pub mod keys;
pub mod persistence;
pub mod replay;
pub mod srtp;

// Re-export key types for convenience
pub use error::{CryptoError, IdentityError};
pub use identity::{generate_zid, IdentityCache};
pub use keys::{MasterKey, Role, SrtpSecrets};
pub use persistence::{default_zid_path, global_identity_cache, ZidFile};
pub use replay::ReplayWindow;
pub use srtp::{SrtcpContext, SrtpContext, SRTCP_OVERHEAD, SRTP_TAG_LEN};
