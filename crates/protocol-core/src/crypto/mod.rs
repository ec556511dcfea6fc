//! AEAD encryption, HKDF subkey derivation, nonce issuance, and the
//! in-memory session store.

pub mod aead;
pub mod kdf;
pub mod nonce;
pub mod session;

pub use aead::{aead_decrypt, aead_encrypt, build_aad, AeadError, RecordType};
pub use kdf::{derive_session_key, derive_subkey, generate_umk, generate_user_salt};
pub use nonce::{NonceError, NonceStore};
pub use session::{Session, SessionStore};

/// Product namespace used in HKDF `info` strings. Kept as a
/// constant rather than inline literals so every derivation site agrees.
pub(crate) const PRODUCT: &str = "PROTOCOL-CORE";
