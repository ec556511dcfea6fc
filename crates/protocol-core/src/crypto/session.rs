//! In-memory UMK session store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::RngCore;
use tokio::sync::RwLock;
use tracing::debug;
use zeroize::Zeroize;

/// Opaque 256-bit session identifier, never derived from user-controlled
/// input.
pub type SessionId = [u8; 32];

/// A live UMK session. `umk` is zeroised when the session is
/// dropped, whether by explicit invalidation or janitor eviction.
pub struct Session {
    pub wallet_address: [u8; 32],
    umk: [u8; 32],
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl Session {
    /// Borrow the UMK for the lifetime of one signing/decryption
    /// operation. Callers must not persist the returned reference.
    pub fn umk(&self) -> &[u8; 32] {
        &self.umk
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.umk.zeroize();
    }
}

/// Protected, single-writer-per-key session map.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), ttl }
    }

    /// Open a new session for `wallet_address`, taking ownership of
    /// `umk`. Returns the opaque session id the caller should hand back
    /// on subsequent requests.
    pub async fn open(&self, wallet_address: [u8; 32], umk: [u8; 32]) -> SessionId {
        let mut id = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut id);
        let now = Instant::now();
        let session = Session { wallet_address, umk, created_at: now, expires_at: now + self.ttl };
        self.sessions.write().await.insert(id, session);
        id
    }

    /// Look up a live, unexpired session. Expired sessions are evicted
    /// (and their UMK zeroised via `Drop`) as a side effect of lookup,
    /// not just the janitor, so a racing caller never observes stale
    /// key material.
    pub async fn get(&self, id: &SessionId) -> Option<[u8; 32]> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(id) {
            Some(session) if session.is_expired() => {
                sessions.remove(id);
                None
            }
            Some(session) => Some(*session.umk()),
            None => None,
        }
    }

    /// Explicit invalidation, e.g. on user-initiated logout.
    pub async fn invalidate(&self, id: &SessionId) {
        self.sessions.write().await.remove(id);
    }

    /// Remove every expired session. Intended to be called from a
    /// `tokio::spawn`ed loop roughly once per minute, but is also safe to
    /// call on-demand (e.g. from tests).
    pub async fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired());
        before - sessions.len()
    }

    /// Spawn the janitor task: sweeps expired sessions every 60s for as
    /// long as the returned handle is not aborted/dropped.
    pub fn spawn_janitor(store: std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                let evicted = store.sweep_expired().await;
                if evicted > 0 {
                    debug!(evicted, "session janitor evicted expired sessions");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_then_get_returns_the_same_umk() {
        let store = SessionStore::new(Duration::from_secs(60));
        let wallet = [1u8; 32];
        let umk = [2u8; 32];
        let id = store.open(wallet, umk).await;
        assert_eq!(store.get(&id).await, Some(umk));
    }

    #[tokio::test]
    async fn expired_session_is_evicted_on_lookup() {
        let store = SessionStore::new(Duration::from_millis(1));
        let id = store.open([1u8; 32], [2u8; 32]).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.get(&id).await, None);
    }

    #[tokio::test]
    async fn invalidate_removes_the_session_immediately() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.open([1u8; 32], [2u8; 32]).await;
        store.invalidate(&id).await;
        assert_eq!(store.get(&id).await, None);
    }

    #[tokio::test]
    async fn sweep_expired_counts_and_removes_only_expired_entries() {
        let store = SessionStore::new(Duration::from_millis(1));
        store.open([1u8; 32], [2u8; 32]).await;
        store.open([3u8; 32], [4u8; 32]).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.sweep_expired().await, 2);
    }
}
