//! AEAD envelope and Associated Authenticated Data construction.
//!
//! Wire format: `iv(12) ‖ tag(16) ‖ ciphertext`. AES-256-GCM's native
//! wire format appends the tag after the ciphertext; this module
//! reorders bytes at the boundary so the rest of the system can treat
//! the tag as a fixed-offset header.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use thiserror::Error;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AeadError {
    #[error("invalid authentication tag")]
    InvalidAuthTag,
    #[error("envelope too short to contain iv and tag")]
    Truncated,
}

/// Encrypt `plaintext` under `key` (32 bytes) with `aad` bound into the
/// GCM tag. Returns `iv(12) ‖ tag(16) ‖ ciphertext`.
pub fn aead_encrypt(plaintext: &[u8], key: &[u8; 32], aad: &[u8]) -> Vec<u8> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    // aes-gcm's own wire format is ciphertext || tag.
    let ct_and_tag = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .expect("AES-256-GCM encryption with a correctly-sized key cannot fail");

    let split_at = ct_and_tag.len() - TAG_LEN;
    let (ciphertext, tag) = ct_and_tag.split_at(split_at);

    let mut out = Vec::with_capacity(IV_LEN + TAG_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(tag);
    out.extend_from_slice(ciphertext);
    out
}

/// Decrypt an `iv(12) ‖ tag(16) ‖ ciphertext` envelope produced by
/// [`aead_encrypt`]. Fails with [`AeadError::InvalidAuthTag`] if `aad`
/// doesn't match what was used at encryption time, or if the ciphertext
/// was tampered with.
pub fn aead_decrypt(envelope: &[u8], key: &[u8; 32], aad: &[u8]) -> Result<Vec<u8>, AeadError> {
    if envelope.len() < IV_LEN + TAG_LEN {
        return Err(AeadError::Truncated);
    }
    let (iv, rest) = envelope.split_at(IV_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);

    let mut ct_and_tag = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    ct_and_tag.extend_from_slice(ciphertext);
    ct_and_tag.extend_from_slice(tag);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(iv);

    cipher
        .decrypt(nonce, Payload { msg: &ct_and_tag, aad })
        .map_err(|_| AeadError::InvalidAuthTag)
}

/// Record-type tags bound into the AAD, preventing ciphertext
/// substitution across record kinds even when the same key is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    Umk = 0x01,
    Mnemonic = 0x02,
    AgentPrivkey = 0x03,
    EumkExec = 0x04,
}

/// `build_aad(wallet_pubkey, record_type, version=1) -> 37B` =
/// `u32_le(version) ‖ u8(record_type_tag) ‖ wallet_pubkey(32)`.
pub fn build_aad(wallet_pubkey: &[u8; 32], record_type: RecordType, version: u32) -> [u8; 37] {
    let mut out = [0u8; 37];
    out[0..4].copy_from_slice(&version.to_le_bytes());
    out[4] = record_type as u8;
    out[5..37].copy_from_slice(wallet_pubkey);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_matching_aad_recovers_plaintext() {
        let key = [7u8; 32];
        let wallet = [1u8; 32];
        let aad = build_aad(&wallet, RecordType::AgentPrivkey, 1);
        let plaintext = b"a 64-byte-ish secret seed goes here for the agent wallet..padding";

        let envelope = aead_encrypt(plaintext, &key, &aad);
        let recovered = aead_decrypt(&envelope, &key, &aad).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn mismatched_aad_fails_with_invalid_auth_tag() {
        let key = [7u8; 32];
        let wallet = [1u8; 32];
        let aad = build_aad(&wallet, RecordType::Umk, 1);
        let other_aad = build_aad(&wallet, RecordType::Mnemonic, 1);
        let plaintext = b"secret";

        let envelope = aead_encrypt(plaintext, &key, &aad);
        let err = aead_decrypt(&envelope, &key, &other_aad).unwrap_err();
        assert_eq!(err, AeadError::InvalidAuthTag);
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let key = [7u8; 32];
        let aad = build_aad(&[1u8; 32], RecordType::Umk, 1);
        let mut envelope = aead_encrypt(b"secret", &key, &aad);
        let last = envelope.len() - 1;
        envelope[last] ^= 0xFF;
        assert_eq!(aead_decrypt(&envelope, &key, &aad).unwrap_err(), AeadError::InvalidAuthTag);
    }

    #[test]
    fn build_aad_is_exactly_37_bytes_with_expected_layout() {
        let wallet = [0xABu8; 32];
        let aad = build_aad(&wallet, RecordType::Mnemonic, 1);
        assert_eq!(aad.len(), 37);
        assert_eq!(&aad[0..4], &1u32.to_le_bytes());
        assert_eq!(aad[4], 0x02);
        assert_eq!(&aad[5..37], &wallet);
    }

    #[test]
    fn envelope_shorter_than_header_is_rejected() {
        let key = [1u8; 32];
        assert_eq!(aead_decrypt(&[0u8; 10], &key, b"").unwrap_err(), AeadError::Truncated);
    }
}
