//! Long-term identity (ZID) storage seen by the session layer.
//!
//! Each endpoint has one random ZID generated the first time its cache
//! file is created and kept across sessions. The cache also remembers
//! display names the user assigned to peers, keyed by the peer's ZID.

use std::path::Path;

use ring::rand::{SecureRandom, SystemRandom};
use zrtp_protocol::{Zid, ZID_LEN};

use crate::error::IdentityError;

/// Store of this endpoint's ZID and per-peer records.
///
/// Implementations are shared between sessions and must be internally
/// synchronized.
pub trait IdentityCache: Send + Sync {
    fn is_open(&self) -> bool;

    /// Open (creating if missing) the store at `path`.
    fn open(&self, path: &Path) -> Result<(), IdentityError>;

    /// This endpoint's identifier, `None` while closed.
    fn own_zid(&self) -> Option<Zid>;

    fn put_peer_name(&self, peer: &Zid, name: &str) -> Result<(), IdentityError>;

    fn peer_name(&self, peer: &Zid) -> Option<String>;

    fn close(&self);
}

/// Generate a fresh random ZID.
pub fn generate_zid() -> Result<Zid, IdentityError> {
    let rng = SystemRandom::new();
    let mut zid = [0u8; ZID_LEN];
    rng.fill(&mut zid).map_err(|_| IdentityError::Rng)?;
    Ok(Zid(zid))
}
