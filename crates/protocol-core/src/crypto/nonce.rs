//! Single-use nonce issuance and consumption, plus the disclosure rate
//! limiter for high-risk reveals such as mnemonic export.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use ed25519_dalek::{Signature, VerifyingKey};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::NonceTtls;

use super::PRODUCT;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NonceError {
    #[error("nonce invalid, expired, or already used")]
    InvalidOrUsed,
    #[error("signature did not verify against the reconstructed challenge")]
    BadSignature,
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
}

struct NonceRecord {
    wallet: [u8; 32],
    purpose: String,
    expires_at: Instant,
    used_at: Option<Instant>,
}

/// Disclosure purposes are rate-limited at at most 3 per rolling 60
/// minutes per wallet.
const DISCLOSURE_WINDOW: Duration = Duration::from_secs(60 * 60);
const DISCLOSURE_MAX_PER_WINDOW: usize = 3;

fn is_disclosure_purpose(purpose: &str) -> bool {
    matches!(purpose, "mnemonic_reveal" | "recovery_phrase_reveal")
}

/// In-memory, single-use nonce store keyed by nonce hash.
pub struct NonceStore {
    records: RwLock<HashMap<[u8; 32], NonceRecord>>,
    disclosures: RwLock<HashMap<[u8; 32], VecDeque<Instant>>>,
    ttls: NonceTtls,
}

impl NonceStore {
    pub fn new(ttls: NonceTtls) -> Self {
        Self { records: RwLock::new(HashMap::new()), disclosures: RwLock::new(HashMap::new()), ttls }
    }

    /// `issue_nonce(wallet, purpose) -> (nonce_plain, message_to_sign, expires_at)`.
    ///
    /// For disclosure purposes, this also consults the rolling rate
    /// limiter and refuses to issue a nonce once the quota is spent.
    pub async fn issue_nonce(
        &self,
        wallet: &[u8; 32],
        purpose: &str,
    ) -> Result<(Vec<u8>, Vec<u8>, Instant), NonceError> {
        if is_disclosure_purpose(purpose) {
            self.check_disclosure_rate_limit(wallet).await?;
        }

        let mut nonce_plain = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce_plain);

        let message = canonical_message(wallet, purpose, &nonce_plain);
        let hash = hash_nonce(&nonce_plain);
        let expires_at = Instant::now() + self.ttls.ttl_for(purpose);

        let mut records = self.records.write().await;
        records.insert(
            hash,
            NonceRecord { wallet: *wallet, purpose: purpose.to_string(), expires_at, used_at: None },
        );
        Ok((nonce_plain, message, expires_at))
    }

    /// `consume_nonce(hash, wallet, purpose)`: atomic, single-use.
    /// Returns `Ok(())` the first time; `InvalidOrUsed` on every
    /// subsequent call for the same hash.
    pub async fn consume_nonce(
        &self,
        hash: &[u8; 32],
        wallet: &[u8; 32],
        purpose: &str,
    ) -> Result<(), NonceError> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(hash) else {
            return Err(NonceError::InvalidOrUsed);
        };
        if record.used_at.is_some()
            || record.wallet != *wallet
            || record.purpose != purpose
            || Instant::now() >= record.expires_at
        {
            return Err(NonceError::InvalidOrUsed);
        }
        record.used_at = Some(Instant::now());

        if is_disclosure_purpose(purpose) {
            drop(records);
            self.record_disclosure(wallet).await;
        }
        Ok(())
    }

    /// Reconstructs the exact canonical message for `(wallet, purpose,
    /// nonce_plain)`, verifies `signature` against it, and consumes the
    /// nonce only if verification succeeds.
    pub async fn verify_signature_and_consume(
        &self,
        wallet: &[u8; 32],
        purpose: &str,
        nonce_plain: &[u8],
        signature: &[u8; 64],
    ) -> Result<(), NonceError> {
        let hash = hash_nonce(nonce_plain);
        let message = canonical_message(wallet, purpose, nonce_plain);

        let verifying_key =
            VerifyingKey::from_bytes(wallet).map_err(|_| NonceError::BadSignature)?;
        let sig = Signature::from_bytes(signature);
        verifying_key
            .verify_strict(&message, &sig)
            .map_err(|_| NonceError::BadSignature)?;

        self.consume_nonce(&hash, wallet, purpose).await
    }

    async fn check_disclosure_rate_limit(&self, wallet: &[u8; 32]) -> Result<(), NonceError> {
        let mut disclosures = self.disclosures.write().await;
        let window_start = Instant::now() - DISCLOSURE_WINDOW;
        let entry = disclosures.entry(*wallet).or_default();
        while let Some(front) = entry.front() {
            if *front < window_start {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() >= DISCLOSURE_MAX_PER_WINDOW {
            let oldest = *entry.front().expect("len >= MAX > 0");
            let retry_after = (oldest + DISCLOSURE_WINDOW).saturating_duration_since(Instant::now());
            return Err(NonceError::RateLimited { retry_after_ms: retry_after.as_millis() as u64 });
        }
        Ok(())
    }

    async fn record_disclosure(&self, wallet: &[u8; 32]) {
        let mut disclosures = self.disclosures.write().await;
        disclosures.entry(*wallet).or_default().push_back(Instant::now());
    }
}

fn hash_nonce(nonce_plain: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(nonce_plain);
    hasher.finalize().into()
}

/// The exact message a wallet is asked to sign: binds product, purpose,
/// wallet, and the nonce together so a signature can't be replayed
/// across purposes or wallets.
fn canonical_message(wallet: &[u8; 32], purpose: &str, nonce_plain: &[u8]) -> Vec<u8> {
    let mut msg = format!("{PRODUCT} auth challenge\npurpose: {purpose}\nwallet: ").into_bytes();
    msg.extend_from_slice(bs58::encode(wallet).into_string().as_bytes());
    msg.extend_from_slice(b"\nnonce: ");
    msg.extend_from_slice(hex_encode(nonce_plain).as_bytes());
    msg
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").expect("writing to a String cannot fail");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn store() -> NonceStore {
        NonceStore::new(NonceTtls::default())
    }

    #[tokio::test]
    async fn consuming_same_nonce_twice_fails_second_time() {
        let store = store();
        let wallet = [1u8; 32];
        let (nonce_plain, _msg, _exp) = store.issue_nonce(&wallet, "deposit").await.unwrap();
        let hash = hash_nonce(&nonce_plain);

        assert!(store.consume_nonce(&hash, &wallet, "deposit").await.is_ok());
        assert_eq!(
            store.consume_nonce(&hash, &wallet, "deposit").await.unwrap_err(),
            NonceError::InvalidOrUsed
        );
    }

    #[tokio::test]
    async fn verify_signature_and_consume_round_trips_with_a_real_signature() {
        let store = store();
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        let wallet: [u8; 32] = signing_key.verifying_key().to_bytes();

        let (nonce_plain, message, _exp) = store.issue_nonce(&wallet, "unlock").await.unwrap();
        let signature = signing_key.sign(&message);

        store
            .verify_signature_and_consume(&wallet, "unlock", &nonce_plain, &signature.to_bytes())
            .await
            .unwrap();

        // second attempt with the same nonce must fail, it's single use
        assert!(store
            .verify_signature_and_consume(&wallet, "unlock", &nonce_plain, &signature.to_bytes())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn wrong_signature_is_rejected_without_consuming() {
        let store = store();
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        let wallet: [u8; 32] = signing_key.verifying_key().to_bytes();
        let other_key = SigningKey::generate(&mut rand::thread_rng());

        let (nonce_plain, message, _exp) = store.issue_nonce(&wallet, "unlock").await.unwrap();
        let bad_signature = other_key.sign(&message);

        assert_eq!(
            store
                .verify_signature_and_consume(&wallet, "unlock", &nonce_plain, &bad_signature.to_bytes())
                .await
                .unwrap_err(),
            NonceError::BadSignature
        );
    }

    #[tokio::test]
    async fn disclosure_rate_limit_trips_after_three_in_window() {
        let store = store();
        let wallet = [5u8; 32];
        for _ in 0..3 {
            let (nonce_plain, _msg, _exp) = store.issue_nonce(&wallet, "mnemonic_reveal").await.unwrap();
            let hash = hash_nonce(&nonce_plain);
            store.consume_nonce(&hash, &wallet, "mnemonic_reveal").await.unwrap();
        }
        let err = store.issue_nonce(&wallet, "mnemonic_reveal").await.unwrap_err();
        assert!(matches!(err, NonceError::RateLimited { .. }));
    }
}
