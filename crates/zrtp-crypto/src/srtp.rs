//! SRTP/SRTCP transform contexts with AES-GCM (RFC 7714 packet layout).
//!
//! A context protects or unprotects one direction of one packet family.
//! Packets are transformed in place inside a `Vec<u8>`: protecting grows
//! the buffer by the tag (and the SRTCP index trailer), unprotecting
//! shrinks it back to the plaintext packet.

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_128_GCM, AES_256_GCM};
use tracing::trace;
use zrtp_protocol::packet::RTCP_HEADER_SIZE;
use zrtp_protocol::{ProtocolError, RtcpHeader, RtpHeader};

use crate::error::CryptoError;
use crate::keys::{KeyUsage, MasterKey, MASTER_SALT_LEN};
use crate::replay::ReplayWindow;

/// AES-GCM authentication tag size.
pub const SRTP_TAG_LEN: usize = 16;

/// E flag + SRTCP index trailer.
pub const SRTCP_INDEX_LEN: usize = 4;

/// Total growth of a protected RTCP packet.
pub const SRTCP_OVERHEAD: usize = SRTP_TAG_LEN + SRTCP_INDEX_LEN;

const SRTCP_E_FLAG: u32 = 0x8000_0000;
const MAX_SRTCP_INDEX: u32 = 0x7FFF_FFFF;

struct AeadKey {
    key: LessSafeKey,
    salt: [u8; MASTER_SALT_LEN],
}

impl AeadKey {
    fn new(master: &MasterKey, usage: KeyUsage) -> Result<Self, CryptoError> {
        let session = master.derive(usage)?;
        let algorithm = match master.key_len() {
            16 => &AES_128_GCM,
            32 => &AES_256_GCM,
            other => return Err(CryptoError::KeyLength(other)),
        };
        let unbound =
            UnboundKey::new(algorithm, &session.key).map_err(|_| CryptoError::KeyLength(session.key.len()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            salt: session.salt,
        })
    }

    /// IV = salt XOR (00 00 || SSRC || ROC || SEQ)
    fn rtp_nonce(&self, ssrc: u32, roc: u32, seq: u16) -> Nonce {
        let mut iv = [0u8; 12];
        iv[2..6].copy_from_slice(&ssrc.to_be_bytes());
        iv[6..10].copy_from_slice(&roc.to_be_bytes());
        iv[10..12].copy_from_slice(&seq.to_be_bytes());
        self.salted(iv)
    }

    /// IV = salt XOR (00 00 || SSRC || 00 00 || 0 || SRTCP index)
    fn rtcp_nonce(&self, ssrc: u32, index: u32) -> Nonce {
        let mut iv = [0u8; 12];
        iv[2..6].copy_from_slice(&ssrc.to_be_bytes());
        iv[8..12].copy_from_slice(&index.to_be_bytes());
        self.salted(iv)
    }

    fn salted(&self, mut iv: [u8; 12]) -> Nonce {
        for (b, s) in iv.iter_mut().zip(self.salt.iter()) {
            *b ^= s;
        }
        Nonce::assume_unique_for_key(iv)
    }
}

/// One direction of SRTP for one SSRC.
pub struct SrtpContext {
    aead: AeadKey,
    /// Rollover counter of the highest authenticated (or sent) sequence.
    roc: u32,
    last_seq: Option<u16>,
    replay: ReplayWindow,
}

impl SrtpContext {
    pub fn new(master: &MasterKey) -> Result<Self, CryptoError> {
        Ok(Self {
            aead: AeadKey::new(master, KeyUsage::Rtp)?,
            roc: 0,
            last_seq: None,
            replay: ReplayWindow::new(),
        })
    }

    pub fn roc(&self) -> u32 {
        self.roc
    }

    /// Encrypt the payload and append the tag.
    pub fn protect(&mut self, packet: &mut Vec<u8>) -> Result<(), CryptoError> {
        let header = RtpHeader::parse(packet)?;

        if let Some(prev) = self.last_seq {
            if header.sequence < prev && prev - header.sequence > 0x8000 {
                self.roc = self.roc.checked_add(1).ok_or(CryptoError::IndexExhausted)?;
            }
        }
        self.last_seq = Some(header.sequence);

        let nonce = self.aead.rtp_nonce(header.ssrc, self.roc, header.sequence);
        let (hdr, payload) = packet.split_at_mut(header.header_len);
        let tag = self
            .aead
            .key
            .seal_in_place_separate_tag(nonce, Aad::from(&*hdr), payload)
            .map_err(|_| CryptoError::Seal)?;
        packet.extend_from_slice(tag.as_ref());
        Ok(())
    }

    /// Check replay state, authenticate and decrypt. The tag is removed.
    pub fn unprotect(&mut self, packet: &mut Vec<u8>) -> Result<(), CryptoError> {
        let header = RtpHeader::parse(packet)?;
        let min = header.header_len + SRTP_TAG_LEN;
        if packet.len() < min {
            return Err(ProtocolError::PacketTooShort {
                expected: min,
                got: packet.len(),
            }
            .into());
        }

        let (roc, index) = self.estimate_index(header.sequence)?;
        if !self.replay.check(index) {
            return Err(CryptoError::Replay(index));
        }

        let nonce = self.aead.rtp_nonce(header.ssrc, roc, header.sequence);
        let (hdr, body) = packet.split_at_mut(header.header_len);
        let plain_len = self
            .aead
            .key
            .open_in_place(nonce, Aad::from(&*hdr), body)
            .map_err(|_| CryptoError::AuthFailed)?
            .len();
        packet.truncate(header.header_len + plain_len);

        let newest = self.replay.highest().map_or(true, |h| index > h);
        self.replay.accept(index);
        if newest {
            if roc != self.roc {
                trace!(ssrc = header.ssrc, roc, "SRTP rollover counter advanced");
            }
            self.roc = roc;
            self.last_seq = Some(header.sequence);
        }
        Ok(())
    }

    /// Guess the ROC a received sequence number belongs to (RFC 3711, appendix A).
    fn estimate_index(&self, seq: u16) -> Result<(u32, u64), CryptoError> {
        let roc = match self.last_seq {
            None => self.roc,
            Some(s_l) if s_l < 0x8000 => {
                if u32::from(seq) > u32::from(s_l) + 0x8000 {
                    // Late packet from before the last wrap.
                    self.roc
                        .checked_sub(1)
                        .ok_or(CryptoError::Replay(u64::from(seq)))?
                } else {
                    self.roc
                }
            }
            Some(s_l) => {
                if u32::from(s_l) - 0x8000 > u32::from(seq) {
                    self.roc.checked_add(1).ok_or(CryptoError::IndexExhausted)?
                } else {
                    self.roc
                }
            }
        };
        Ok((roc, (u64::from(roc) << 16) | u64::from(seq)))
    }
}

/// One direction of SRTCP for one SSRC.
pub struct SrtcpContext {
    aead: AeadKey,
    /// Next index to send.
    index: u32,
    replay: ReplayWindow,
}

impl SrtcpContext {
    pub fn new(master: &MasterKey) -> Result<Self, CryptoError> {
        Ok(Self {
            aead: AeadKey::new(master, KeyUsage::Rtcp)?,
            index: 0,
            replay: ReplayWindow::new(),
        })
    }

    /// Index the next protected packet will carry.
    pub fn next_index(&self) -> u32 {
        self.index
    }

    /// Output: header(8) || ciphertext || tag || E|index.
    pub fn protect(&mut self, packet: &mut Vec<u8>) -> Result<(), CryptoError> {
        let header = RtcpHeader::parse(packet)?;
        if self.index > MAX_SRTCP_INDEX {
            return Err(CryptoError::IndexExhausted);
        }
        let index = self.index;
        self.index += 1;

        let trailer = (SRTCP_E_FLAG | index).to_be_bytes();
        let nonce = self.aead.rtcp_nonce(header.ssrc, index);
        let (hdr, payload) = packet.split_at_mut(RTCP_HEADER_SIZE);
        let aad = rtcp_aad(hdr, &trailer);
        let tag = self
            .aead
            .key
            .seal_in_place_separate_tag(nonce, Aad::from(aad), payload)
            .map_err(|_| CryptoError::Seal)?;
        packet.extend_from_slice(tag.as_ref());
        packet.extend_from_slice(&trailer);
        Ok(())
    }

    pub fn unprotect(&mut self, packet: &mut Vec<u8>) -> Result<(), CryptoError> {
        let min = RTCP_HEADER_SIZE + SRTCP_OVERHEAD;
        if packet.len() < min {
            return Err(ProtocolError::PacketTooShort {
                expected: min,
                got: packet.len(),
            }
            .into());
        }
        let header = RtcpHeader::parse(packet)?;

        let body_end = packet.len() - SRTCP_INDEX_LEN;
        let mut trailer = [0u8; SRTCP_INDEX_LEN];
        trailer.copy_from_slice(&packet[body_end..]);
        let word = u32::from_be_bytes(trailer);
        if word & SRTCP_E_FLAG == 0 {
            // Unencrypted SRTCP is never produced by this transform.
            return Err(CryptoError::AuthFailed);
        }
        let index = word & MAX_SRTCP_INDEX;
        if !self.replay.check(u64::from(index)) {
            return Err(CryptoError::Replay(u64::from(index)));
        }

        let nonce = self.aead.rtcp_nonce(header.ssrc, index);
        let (hdr, rest) = packet.split_at_mut(RTCP_HEADER_SIZE);
        let aad = rtcp_aad(hdr, &trailer);
        let plain_len = self
            .aead
            .key
            .open_in_place(nonce, Aad::from(aad), &mut rest[..body_end - RTCP_HEADER_SIZE])
            .map_err(|_| CryptoError::AuthFailed)?
            .len();
        packet.truncate(RTCP_HEADER_SIZE + plain_len);

        self.replay.accept(u64::from(index));
        Ok(())
    }
}

fn rtcp_aad(header: &[u8], trailer: &[u8; SRTCP_INDEX_LEN]) -> [u8; RTCP_HEADER_SIZE + SRTCP_INDEX_LEN] {
    let mut aad = [0u8; RTCP_HEADER_SIZE + SRTCP_INDEX_LEN];
    aad[..RTCP_HEADER_SIZE].copy_from_slice(&header[..RTCP_HEADER_SIZE]);
    aad[RTCP_HEADER_SIZE..].copy_from_slice(trailer);
    aad
}
