//! SRTP key material as delivered by a key-agreement engine.
//!
//! The engine derives one key/salt pair for the initiator and one for the
//! responder. Each side sends with its own role's pair and receives with
//! the peer's pair. Session keys for RTP and RTCP are expanded from a pair
//! with HKDF-SHA256.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

/// Master salt length (AES-GCM SRTP profile).
pub const MASTER_SALT_LEN: usize = 12;

/// This endpoint's role in the key agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// One master key and salt. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: Vec<u8>,
    salt: Vec<u8>,
}

impl MasterKey {
    pub fn new(key: &[u8], salt: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != 16 && key.len() != 32 {
            return Err(CryptoError::KeyLength(key.len()));
        }
        if salt.len() != MASTER_SALT_LEN {
            return Err(CryptoError::SaltLength {
                expected: MASTER_SALT_LEN,
                got: salt.len(),
            });
        }
        Ok(Self {
            key: key.to_vec(),
            salt: salt.to_vec(),
        })
    }

    pub fn key_len(&self) -> usize {
        self.key.len()
    }

    /// Expand session keys for one packet family.
    pub(crate) fn derive(&self, usage: KeyUsage) -> Result<SessionKeys, CryptoError> {
        let hk = Hkdf::<Sha256>::new(Some(&self.salt), &self.key);

        let mut key = Zeroizing::new(vec![0u8; self.key.len()]);
        hk.expand(usage.key_label(), &mut key)
            .map_err(|_| CryptoError::Kdf)?;

        let mut salt = [0u8; MASTER_SALT_LEN];
        hk.expand(usage.salt_label(), &mut salt)
            .map_err(|_| CryptoError::Kdf)?;

        Ok(SessionKeys { key, salt })
    }
}

/// Packet family a session key is derived for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyUsage {
    Rtp,
    Rtcp,
}

impl KeyUsage {
    fn key_label(self) -> &'static [u8] {
        match self {
            Self::Rtp => b"zrtp srtp encryption key",
            Self::Rtcp => b"zrtp srtcp encryption key",
        }
    }

    fn salt_label(self) -> &'static [u8] {
        match self {
            Self::Rtp => b"zrtp srtp salting key",
            Self::Rtcp => b"zrtp srtcp salting key",
        }
    }
}

pub(crate) struct SessionKeys {
    pub key: Zeroizing<Vec<u8>>,
    pub salt: [u8; MASTER_SALT_LEN],
}

impl Drop for SessionKeys {
    fn drop(&mut self) {
        self.salt.zeroize();
    }
}

/// Secrets for both directions of one stream.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SrtpSecrets {
    pub key_initiator: Vec<u8>,
    pub salt_initiator: Vec<u8>,
    pub key_responder: Vec<u8>,
    pub salt_responder: Vec<u8>,
    #[zeroize(skip)]
    pub role: Role,
}

impl SrtpSecrets {
    /// Key material for packets this endpoint sends.
    pub fn sender_key(&self) -> Result<MasterKey, CryptoError> {
        match self.role {
            Role::Initiator => MasterKey::new(&self.key_initiator, &self.salt_initiator),
            Role::Responder => MasterKey::new(&self.key_responder, &self.salt_responder),
        }
    }

    /// Key material for packets this endpoint receives.
    pub fn receiver_key(&self) -> Result<MasterKey, CryptoError> {
        match self.role {
            Role::Initiator => MasterKey::new(&self.key_responder, &self.salt_responder),
            Role::Responder => MasterKey::new(&self.key_initiator, &self.salt_initiator),
        }
    }

    /// The same secrets seen from the other endpoint.
    pub fn for_peer(&self) -> Self {
        let mut peer = self.clone();
        peer.role = match self.role {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        };
        peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets() -> SrtpSecrets {
        SrtpSecrets {
            key_initiator: vec![1; 16],
            salt_initiator: vec![2; 12],
            key_responder: vec![3; 16],
            salt_responder: vec![4; 12],
            role: Role::Initiator,
        }
    }

    #[test]
    fn rejects_bad_key_length() {
        assert!(matches!(
            MasterKey::new(&[0; 20], &[0; 12]),
            Err(CryptoError::KeyLength(20))
        ));
        assert!(matches!(
            MasterKey::new(&[0; 16], &[0; 14]),
            Err(CryptoError::SaltLength { got: 14, .. })
        ));
        assert!(MasterKey::new(&[0; 32], &[0; 12]).is_ok());
    }

    #[test]
    fn sender_of_one_side_is_receiver_of_other() {
        let ours = secrets();
        let theirs = ours.for_peer();
        let a = ours.sender_key().unwrap().derive(KeyUsage::Rtp).unwrap();
        let b = theirs.receiver_key().unwrap().derive(KeyUsage::Rtp).unwrap();
        assert_eq!(*a.key, *b.key);
        assert_eq!(a.salt, b.salt);
    }

    #[test]
    fn rtp_and_rtcp_keys_differ() {
        let master = secrets().sender_key().unwrap();
        let rtp = master.derive(KeyUsage::Rtp).unwrap();
        let rtcp = master.derive(KeyUsage::Rtcp).unwrap();
        assert_ne!(*rtp.key, *rtcp.key);
        assert_ne!(rtp.salt, rtcp.salt);
        assert_eq!(rtp.key.len(), 16);
    }
}
