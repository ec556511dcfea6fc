//! BIP39-seeded agent keypair generation, AEAD custody at rest, and
//! signing capability gated on a live UMK session.

use std::str::FromStr;

use bip39::Mnemonic;
use ed25519_dalek::SigningKey;
use ed25519_dalek_bip32::{DerivationPath, ExtendedSecretKey};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::{aead_decrypt, aead_encrypt, build_aad, RecordType};

/// Standard Solana BIP44 derivation path.
const DERIVATION_PATH: &str = "m/44'/501'/0'/0'";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("mnemonic generation or parsing failed: {0}")]
    Mnemonic(String),
    #[error("key derivation failed: {0}")]
    Derivation(String),
    #[error("decrypted key is malformed")]
    InvalidKey,
    #[error("no live UMK session to decrypt with")]
    NoSession,
}

/// An `AgentKey` record: the custodial subkey the core generates
/// and holds on behalf of one user wallet. `encrypted_secret` is the
/// `iv ‖ tag ‖ ciphertext` envelope over the 64-byte secret seed.
#[derive(Debug, Clone)]
pub struct AgentKey {
    pub public_address: Pubkey,
    pub encrypted_secret: Vec<u8>,
    pub derivation_index: u32,
}

/// Generate a fresh agent keypair from 256-bit BIP39 entropy, derive the
/// ed25519 seed at `m/44'/501'/0'/0'`, and encrypt it at rest under a
/// subkey derived from the live session's UMK.
///
/// Returns the `AgentKey` record to persist and, transiently, the
/// plaintext [`Keypair`] for immediate use (e.g. to fund/sign the first
/// transaction) — callers must not retain the plaintext keypair beyond
/// that operation's scope.
pub fn generate_agent_key(
    wallet_pubkey: &Pubkey,
    umk: &[u8; 32],
) -> Result<(AgentKey, Keypair), WalletError> {
    let mnemonic = Mnemonic::generate(24).map_err(|err| WalletError::Mnemonic(err.to_string()))?;
    let bip39_seed = mnemonic.to_seed("");

    let agent_seed = derive_agent_seed(&bip39_seed)?;
    let signing_key = SigningKey::from_bytes(&agent_seed);
    let keypair = Keypair::from_bytes(&keypair_bytes(&signing_key))
        .map_err(|_| WalletError::Derivation("derived bytes did not form a valid keypair".into()))?;

    let public_address = keypair.pubkey();
    let subkey = crate::crypto::derive_subkey(umk, "agent_privkey");
    let aad = build_aad(&wallet_pubkey.to_bytes(), RecordType::AgentPrivkey, 1);
    let encrypted_secret = aead_encrypt(&secret_seed_bytes(&signing_key), &subkey, &aad);

    Ok((AgentKey { public_address, encrypted_secret, derivation_index: 0 }, keypair))
}

/// Decrypt an [`AgentKey`]'s secret and reconstruct a signing [`Keypair`].
/// Requires a live UMK session — the subkey is re-derived from `umk`,
/// never persisted.
pub fn unlock_agent_key(
    agent_key: &AgentKey,
    wallet_pubkey: &Pubkey,
    umk: &[u8; 32],
) -> Result<Keypair, WalletError> {
    let subkey = crate::crypto::derive_subkey(umk, "agent_privkey");
    let aad = build_aad(&wallet_pubkey.to_bytes(), RecordType::AgentPrivkey, 1);
    let secret_seed: Zeroizing<Vec<u8>> = Zeroizing::new(
        aead_decrypt(&agent_key.encrypted_secret, &subkey, &aad).map_err(|_| WalletError::InvalidKey)?,
    );

    if secret_seed.len() != 64 {
        return Err(WalletError::InvalidKey);
    }
    let keypair = Keypair::from_bytes(&secret_seed).map_err(|_| WalletError::InvalidKey)?;

    // Invariant: public_address equals the curve-point of the
    // decrypted secret.
    if keypair.pubkey() != agent_key.public_address {
        return Err(WalletError::InvalidKey);
    }
    Ok(keypair)
}

fn derive_agent_seed(bip39_seed: &[u8; 64]) -> Result<[u8; 32], WalletError> {
    let path = DerivationPath::from_str(DERIVATION_PATH)
        .map_err(|err| WalletError::Derivation(err.to_string()))?;
    let extended = ExtendedSecretKey::from_seed(bip39_seed)
        .map_err(|err| WalletError::Derivation(err.to_string()))?
        .derive(&path)
        .map_err(|err| WalletError::Derivation(err.to_string()))?;
    Ok(extended.secret_key.to_bytes())
}

/// `solana_sdk::signature::Keypair::from_bytes` expects the 64-byte
/// `secret_seed(32) ‖ public_key(32)` layout `ed25519-dalek` uses on the
/// wire.
fn keypair_bytes(signing_key: &SigningKey) -> [u8; 64] {
    let mut out = [0u8; 64];
    out[..32].copy_from_slice(&signing_key.to_bytes());
    out[32..].copy_from_slice(signing_key.verifying_key().as_bytes());
    out
}

fn secret_seed_bytes(signing_key: &SigningKey) -> [u8; 64] {
    keypair_bytes(signing_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_unlocks_with_the_same_session_umk() {
        let wallet = Pubkey::new_unique();
        let umk = [42u8; 32];
        let (agent_key, generated_keypair) = generate_agent_key(&wallet, &umk).unwrap();

        let unlocked = unlock_agent_key(&agent_key, &wallet, &umk).unwrap();
        assert_eq!(unlocked.pubkey(), generated_keypair.pubkey());
        assert_eq!(unlocked.pubkey(), agent_key.public_address);
    }

    #[test]
    fn unlocking_with_the_wrong_umk_fails_closed() {
        let wallet = Pubkey::new_unique();
        let umk = [42u8; 32];
        let wrong_umk = [7u8; 32];
        let (agent_key, _keypair) = generate_agent_key(&wallet, &umk).unwrap();

        assert_eq!(unlock_agent_key(&agent_key, &wallet, &wrong_umk).unwrap_err(), WalletError::InvalidKey);
    }

    #[test]
    fn unlocking_with_the_wrong_wallet_fails_closed() {
        let wallet = Pubkey::new_unique();
        let other_wallet = Pubkey::new_unique();
        let umk = [42u8; 32];
        let (agent_key, _keypair) = generate_agent_key(&wallet, &umk).unwrap();

        assert_eq!(unlock_agent_key(&agent_key, &other_wallet, &umk).unwrap_err(), WalletError::InvalidKey);
    }
}
