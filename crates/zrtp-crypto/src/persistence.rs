//! File-backed identity cache.
//!
//! File format: [ZIDC magic(4)] [version(1)] [postcard payload]
//!
//! The payload holds this endpoint's ZID and the peer name records. Every
//! change is written through atomically (write to `.tmp`, then rename).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zrtp_protocol::Zid;

use crate::error::IdentityError;
use crate::identity::{generate_zid, IdentityCache};

const MAGIC: &[u8; 4] = b"ZIDC";
const VERSION: u8 = 0x01;
const HEADER_LEN: usize = 4 + 1;

const DEFAULT_FILE_NAME: &str = "GNUZRTP.zid";

#[derive(Serialize, Deserialize)]
struct ZidRecords {
    own_zid: Zid,
    peers: Vec<PeerRecord>,
}

#[derive(Serialize, Deserialize)]
struct PeerRecord {
    zid: Zid,
    name: String,
}

struct OpenFile {
    path: PathBuf,
    records: ZidRecords,
}

/// Identity cache persisted in a single file.
#[derive(Default)]
pub struct ZidFile {
    inner: Mutex<Option<OpenFile>>,
}

impl ZidFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the currently open file.
    pub fn path(&self) -> Option<PathBuf> {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.as_ref().map(|f| f.path.clone())
    }
}

impl IdentityCache for ZidFile {
    fn is_open(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    fn open(&self, path: &Path) -> Result<(), IdentityError> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if inner.is_some() {
            return Ok(());
        }

        let records = if path.exists() {
            let records = std::fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))
                .and_then(|data| decode_records(&data))
                .map_err(|source| IdentityError::Storage {
                    path: path.to_path_buf(),
                    source,
                })?;
            debug!(path = %path.display(), peers = records.peers.len(), "opened identity cache");
            records
        } else {
            let records = ZidRecords {
                own_zid: generate_zid()?,
                peers: Vec::new(),
            };
            save_records(path, &records)?;
            info!(path = %path.display(), zid = %records.own_zid, "created identity cache");
            records
        };

        *inner = Some(OpenFile {
            path: path.to_path_buf(),
            records,
        });
        Ok(())
    }

    fn own_zid(&self) -> Option<Zid> {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.as_ref().map(|f| f.records.own_zid)
    }

    fn put_peer_name(&self, peer: &Zid, name: &str) -> Result<(), IdentityError> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let file = inner.as_mut().ok_or(IdentityError::NotOpen)?;

        match file.records.peers.iter_mut().find(|r| r.zid == *peer) {
            Some(record) => record.name = name.to_string(),
            None => file.records.peers.push(PeerRecord {
                zid: *peer,
                name: name.to_string(),
            }),
        }
        save_records(&file.path, &file.records)
    }

    fn peer_name(&self, peer: &Zid) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner
            .as_ref()?
            .records
            .peers
            .iter()
            .find(|r| r.zid == *peer)
            .map(|r| r.name.clone())
    }

    fn close(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(file) = inner.take() {
            debug!(path = %file.path.display(), "closed identity cache");
        }
    }
}

fn encode_records(records: &ZidRecords) -> anyhow::Result<Vec<u8>> {
    let payload = postcard::to_allocvec(records)
        .map_err(|e| anyhow::anyhow!("serialization failed: {e}"))?;
    let mut data = Vec::with_capacity(HEADER_LEN + payload.len());
    data.extend_from_slice(MAGIC);
    data.push(VERSION);
    data.extend_from_slice(&payload);
    Ok(data)
}

fn decode_records(data: &[u8]) -> anyhow::Result<ZidRecords> {
    if data.len() < HEADER_LEN {
        anyhow::bail!("file too short");
    }
    if &data[0..4] != MAGIC {
        anyhow::bail!("invalid file format (expected ZIDC header)");
    }
    if data[4] != VERSION {
        anyhow::bail!("unsupported file version {}", data[4]);
    }
    postcard::from_bytes(&data[HEADER_LEN..])
        .map_err(|e| anyhow::anyhow!("deserialization failed: {e}"))
}

fn save_records(path: &Path, records: &ZidRecords) -> Result<(), IdentityError> {
    let write = || -> anyhow::Result<()> {
        let data = encode_records(records)?;
        let tmp = path.with_extension("zid.tmp");
        std::fs::write(&tmp, &data)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to rename {}", tmp.display()))?;
        Ok(())
    };
    write().map_err(|source| IdentityError::Storage {
        path: path.to_path_buf(),
        source,
    })
}

/// `~/.GNUZRTP.zid`, or `./GNUZRTP.zid` when no home directory is known.
pub fn default_zid_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(format!(".{DEFAULT_FILE_NAME}")),
        None => PathBuf::from(".").join(DEFAULT_FILE_NAME),
    }
}

/// The process-wide identity cache.
///
/// Created closed on first use; the first session to initialize opens it
/// and it stays open until `close()` is called.
pub fn global_identity_cache() -> Arc<ZidFile> {
    static GLOBAL: OnceLock<Arc<ZidFile>> = OnceLock::new();
    GLOBAL.get_or_init(|| Arc::new(ZidFile::new())).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_file_with_fresh_zid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.zid");

        let cache = ZidFile::new();
        assert!(!cache.is_open());
        assert!(cache.own_zid().is_none());

        cache.open(&path).unwrap();
        assert!(cache.is_open());
        assert!(path.exists());
        assert!(cache.own_zid().is_some());
    }

    #[test]
    fn zid_and_names_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.zid");
        let peer = Zid([9; 12]);

        let cache = ZidFile::new();
        cache.open(&path).unwrap();
        let zid = cache.own_zid().unwrap();
        cache.put_peer_name(&peer, "alice").unwrap();
        cache.put_peer_name(&peer, "alice (work)").unwrap();
        cache.close();
        assert!(!cache.is_open());

        let reopened = ZidFile::new();
        reopened.open(&path).unwrap();
        assert_eq!(reopened.own_zid(), Some(zid));
        assert_eq!(reopened.peer_name(&peer).as_deref(), Some("alice (work)"));
        assert_eq!(reopened.peer_name(&Zid([1; 12])), None);
    }

    #[test]
    fn corrupt_file_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.zid");
        std::fs::write(&path, b"not a zid file").unwrap();

        let cache = ZidFile::new();
        let err = cache.open(&path).unwrap_err();
        assert!(matches!(err, IdentityError::Storage { .. }));
        assert!(!cache.is_open());
    }

    #[test]
    fn put_name_requires_open() {
        let cache = ZidFile::new();
        assert!(matches!(
            cache.put_peer_name(&Zid([0; 12]), "bob"),
            Err(IdentityError::NotOpen)
        ));
    }

    #[test]
    fn unwritable_location_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("x.zid");
        let cache = ZidFile::new();
        assert!(cache.open(&path).is_err());
        assert!(!cache.is_open());
    }

    #[test]
    fn default_path_ends_with_file_name() {
        let path = default_zid_path();
        assert!(path.to_string_lossy().ends_with("GNUZRTP.zid"));
    }

    #[test]
    fn global_cache_is_shared() {
        let a = global_identity_cache();
        let b = global_identity_cache();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
