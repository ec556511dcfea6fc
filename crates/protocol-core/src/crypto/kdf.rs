//! HKDF-SHA256 key derivation.

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::PRODUCT;

/// Generate a fresh 32-byte User Master Key. Only ever held in memory
/// callers are expected to wrap the result in
/// [`Zeroizing`] themselves once derived downstream.
pub fn generate_umk() -> Zeroizing<[u8; 32]> {
    let mut out = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut out);
    Zeroizing::new(out)
}

/// Generate a fresh 32-byte per-user salt, persisted alongside the
/// `AgentKey` record.
pub fn generate_user_salt() -> [u8; 32] {
    let mut out = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut out);
    out
}

/// `derive_session_key(wallet_pubkey, signature, user_salt, purpose) -> 32B`
/// via HKDF-SHA256 with `info = "<PRODUCT>:SK:<purpose>"`.
///
/// The wallet's ed25519 signature over a nonce challenge is the input
/// keying material; `user_salt` is HKDF's salt parameter.
pub fn derive_session_key(
    wallet_pubkey: &[u8; 32],
    signature: &[u8; 64],
    user_salt: &[u8; 32],
    purpose: &str,
) -> Zeroizing<[u8; 32]> {
    let mut ikm = Vec::with_capacity(32 + 64);
    ikm.extend_from_slice(wallet_pubkey);
    ikm.extend_from_slice(signature);

    let hk = Hkdf::<Sha256>::new(Some(user_salt), &ikm);
    let info = format!("{PRODUCT}:SK:{purpose}");
    let mut out = [0u8; 32];
    hk.expand(info.as_bytes(), &mut out)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    Zeroizing::new(out)
}

/// `derive_subkey(umk, purpose) -> 32B` via HKDF-SHA256 with a
/// zero-filled 32-byte salt and `info = "<PRODUCT>:subkey:<purpose>"`.
/// Used to derive the `agent_privkey` subkey and any other long-lived-secret
/// subkeys from the in-memory UMK.
pub fn derive_subkey(umk: &[u8; 32], purpose: &str) -> Zeroizing<[u8; 32]> {
    let zero_salt = [0u8; 32];
    let hk = Hkdf::<Sha256>::new(Some(&zero_salt), umk);
    let info = format!("{PRODUCT}:subkey:{purpose}");
    let mut out = [0u8; 32];
    hk.expand(info.as_bytes(), &mut out)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    Zeroizing::new(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_key_is_deterministic_given_same_inputs() {
        let wallet = [1u8; 32];
        let sig = [2u8; 64];
        let salt = [3u8; 32];
        let a = derive_session_key(&wallet, &sig, &salt, "unlock");
        let b = derive_session_key(&wallet, &sig, &salt, "unlock");
        assert_eq!(*a, *b);
    }

    #[test]
    fn session_key_differs_by_purpose() {
        let wallet = [1u8; 32];
        let sig = [2u8; 64];
        let salt = [3u8; 32];
        let a = derive_session_key(&wallet, &sig, &salt, "unlock");
        let b = derive_session_key(&wallet, &sig, &salt, "recovery");
        assert_ne!(*a, *b);
    }

    #[test]
    fn subkey_differs_by_purpose_and_umk() {
        let umk1 = [9u8; 32];
        let umk2 = [8u8; 32];
        let a = derive_subkey(&umk1, "agent_privkey");
        let b = derive_subkey(&umk1, "mnemonic");
        let c = derive_subkey(&umk2, "agent_privkey");
        assert_ne!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn umk_and_salt_generation_produce_distinct_outputs() {
        let a = generate_umk();
        let b = generate_umk();
        assert_ne!(*a, *b, "RNG collision across 32 bytes is astronomically unlikely");
        assert_ne!(generate_user_salt(), generate_user_salt());
    }
}
