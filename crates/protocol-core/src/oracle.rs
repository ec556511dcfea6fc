//! Oracle Resolver (C5): on-chain oracle lookup with a TTL cache and a
//! safe fallback.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use solana_sdk::pubkey::Pubkey;
use tokio::sync::RwLock;
use tracing::warn;

use crate::config::Environment;
use crate::decode::decode_spot_market_oracle;
use crate::rpc::{RpcError, RpcReader};

/// `(market_pda, market_index)` cache key (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OracleKey {
    pub market_pda: Pubkey,
    pub market_index: u16,
}

struct CachedOracle {
    oracle: Pubkey,
    fetched_at: Instant,
}

/// Read-mostly oracle cache, single writer per key (§5), TTL 60s default.
pub struct OracleResolver {
    cache: RwLock<HashMap<OracleKey, CachedOracle>>,
    ttl: Duration,
    fallback: Pubkey,
}

impl OracleResolver {
    pub fn new(ttl: Duration, fallback_oracle: Pubkey) -> Self {
        Self { cache: RwLock::new(HashMap::new()), ttl, fallback: fallback_oracle }
    }

    pub fn for_environment(env: Environment, ttl: Duration) -> Self {
        Self::new(ttl, fallback_oracle_for(env))
    }

    /// Resolve the oracle for `key`. On a cache hit within TTL, returns
    /// immediately with no RPC call (§8 invariant 6). On a miss, fetches
    /// the spot market account, extracts the oracle at offset 40 (C4),
    /// and caches it. On any failure, returns the environment's fallback
    /// oracle so liveness is preserved (§4.5, scenario S5).
    pub async fn resolve(&self, key: OracleKey, rpc: &dyn RpcReader) -> Pubkey {
        if let Some(oracle) = self.cached(key).await {
            return oracle;
        }

        match self.fetch_and_cache(key, rpc).await {
            Ok(oracle) => oracle,
            Err(err) => {
                warn!(?err, market_index = key.market_index, "oracle lookup failed, using fallback");
                self.fallback
            }
        }
    }

    async fn cached(&self, key: OracleKey) -> Option<Pubkey> {
        let cache = self.cache.read().await;
        cache.get(&key).and_then(|entry| {
            if entry.fetched_at.elapsed() < self.ttl {
                Some(entry.oracle)
            } else {
                None
            }
        })
    }

    async fn fetch_and_cache(&self, key: OracleKey, rpc: &dyn RpcReader) -> Result<Pubkey, RpcError> {
        let account = rpc.get_account(&key.market_pda).await?.ok_or(RpcError::AccountNotFound)?;
        let oracle = decode_spot_market_oracle(&account.data).map_err(|_| RpcError::AccountNotFound)?;

        let mut cache = self.cache.write().await;
        cache.insert(key, CachedOracle { oracle, fetched_at: Instant::now() });
        Ok(oracle)
    }
}

/// Fallback oracle constants per chain environment (§4.5, §6). These are
/// placeholders for the environment's well-known stable-market oracle;
/// a production deployment wires in the real mainnet/devnet addresses.
fn fallback_oracle_for(env: Environment) -> Pubkey {
    match env {
        Environment::Mainnet => solana_sdk::pubkey!("BjUgj6YCnFBZ49wF54ddBVA9qu8TeqkFtkbqmZcee8uW"),
        Environment::Devnet => solana_sdk::pubkey!("J83w4HKfqxwcq3BEMMkPFSppX3gqekLyLJBexebFVkix"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::RpcAccount;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingRpc {
        calls: Arc<AtomicUsize>,
        oracle: Pubkey,
        fail: bool,
    }

    #[async_trait]
    impl RpcReader for CountingRpc {
        async fn get_account(&self, _pubkey: &Pubkey) -> Result<Option<RpcAccount>, RpcError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Ok(None);
            }
            let mut data = vec![0u8; 128];
            data[40..72].copy_from_slice(self.oracle.as_ref());
            Ok(Some(RpcAccount { data, owner: Pubkey::new_unique(), lamports: 0 }))
        }
    }

    #[tokio::test]
    async fn repeated_calls_within_ttl_hit_cache_not_rpc() {
        let calls = Arc::new(AtomicUsize::new(0));
        let oracle = Pubkey::new_unique();
        let rpc = CountingRpc { calls: calls.clone(), oracle, fail: false };
        let resolver = OracleResolver::new(Duration::from_secs(60), Pubkey::new_unique());
        let key = OracleKey { market_pda: Pubkey::new_unique(), market_index: 0 };

        let first = resolver.resolve(key, &rpc).await;
        let second = resolver.resolve(key, &rpc).await;

        assert_eq!(first, oracle);
        assert_eq!(second, oracle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rpc_failure_falls_back_without_panicking() {
        let calls = Arc::new(AtomicUsize::new(0));
        let rpc = CountingRpc { calls, oracle: Pubkey::new_unique(), fail: true };
        let fallback = Pubkey::new_unique();
        let resolver = OracleResolver::new(Duration::from_secs(60), fallback);
        let key = OracleKey { market_pda: Pubkey::new_unique(), market_index: 0 };

        assert_eq!(resolver.resolve(key, &rpc).await, fallback);
    }

    #[tokio::test]
    async fn expired_entry_triggers_a_fresh_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let oracle = Pubkey::new_unique();
        let rpc = CountingRpc { calls: calls.clone(), oracle, fail: false };
        let resolver = OracleResolver::new(Duration::from_millis(1), Pubkey::new_unique());
        let key = OracleKey { market_pda: Pubkey::new_unique(), market_index: 0 };

        resolver.resolve(key, &rpc).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        resolver.resolve(key, &rpc).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
