//! Periodic Reconciliation (C13): a timed sweep of active accounts that
//! compares on-chain perp positions against the stored local mirror.
//!
//! Distinct from [`crate::reconciler`] (C10), which is the pure ledger
//! math one fill at a time; this module is the scheduling and RPC-driving
//! layer that calls it for every active bot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::address::user_pda;
use crate::decode::decode_user;
use crate::metrics;
use crate::reconciler::{detect_drift, should_auto_correct, LocalPosition};
use crate::rpc::RpcReader;
use crate::store::{ActiveBotRef, StoreHandle};

/// Default sweep period (§4.13, §5).
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// §5 "Reconciliation for a given (bot, market) pair is serialised;
/// across distinct pairs it is parallel." One lock per pair, created on
/// first touch, shared for the process lifetime.
#[derive(Default)]
pub struct PairLocks {
    locks: Mutex<HashMap<(u16, u16), Arc<Mutex<()>>>>,
}

impl PairLocks {
    async fn lock_for(&self, sub_account_id: u16, market_index: u16) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry((sub_account_id, market_index)).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

/// One sweep pass over every active bot (§4.13): "for each wallet with at
/// least one active bot... for each bot, fetch its on-chain perp position
/// and upsert the local mirror. Positions of paused bots are only
/// refreshed if their local record is non-zero."
pub async fn run_sweep<S: StoreHandle>(
    store: &S,
    rpc: &dyn RpcReader,
    pair_locks: &PairLocks,
    program_id: &solana_sdk::pubkey::Pubkey,
) {
    let bots = store.active_bots().await;
    debug!(count = bots.len(), "periodic reconciliation sweep starting");

    for bot in bots {
        reconcile_one_bot(store, rpc, pair_locks, program_id, bot).await;
    }
}

async fn reconcile_one_bot<S: StoreHandle>(
    store: &S,
    rpc: &dyn RpcReader,
    pair_locks: &PairLocks,
    program_id: &solana_sdk::pubkey::Pubkey,
    bot: ActiveBotRef,
) {
    let lock = pair_locks.lock_for(bot.sub_account_id, bot.market_index).await;
    let _guard = lock.lock().await;

    let prior = store
        .get_local_position(&bot.wallet, bot.sub_account_id, bot.market_index)
        .await
        .unwrap_or_else(LocalPosition::flat);

    if bot.paused && prior.base_size.is_zero() {
        return;
    }

    let (user_account_pda, _bump) = user_pda(&bot.agent_address, bot.sub_account_id, program_id);
    let account = match rpc.get_account(&user_account_pda).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            debug!(wallet = %bot.wallet, "no on-chain user account yet, skipping sweep for this bot");
            return;
        }
        Err(err) => {
            warn!(wallet = %bot.wallet, ?err, "rpc failure during reconciliation sweep");
            return;
        }
    };

    let Ok(user) = decode_user(&account.data) else {
        warn!(wallet = %bot.wallet, "failed to decode user account during sweep");
        return;
    };

    let Some(position) = user.perp_positions.iter().find(|p| p.market_index == bot.market_index) else {
        return;
    };

    let on_chain_base =
        Decimal::from(position.base_asset_amount) / Decimal::from(1_000_000_000u64);

    let drift_detected = detect_drift(prior.base_size, on_chain_base);
    let mut updated = prior.clone();
    let mut corrected = false;

    if drift_detected && should_auto_correct(prior.base_size, on_chain_base) {
        updated.base_size = on_chain_base;
        if on_chain_base.is_zero() {
            updated.avg_entry_price = Decimal::ZERO;
        }
        corrected = true;
    }

    metrics::record_reconciliation_outcome(drift_detected, corrected);

    if corrected {
        store.upsert_local_position(&bot.wallet, bot.sub_account_id, bot.market_index, updated).await;
    }
}

/// Spawn the §4.13 sweep loop: fires every [`SWEEP_INTERVAL`] for as long
/// as the returned handle is not aborted/dropped.
pub fn spawn_periodic_reconciliation<S: StoreHandle + 'static, R: RpcReader + 'static>(
    store: Arc<S>,
    rpc: Arc<R>,
    program_id: solana_sdk::pubkey::Pubkey,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let pair_locks = PairLocks::default();
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            run_sweep(store.as_ref(), rpc.as_ref(), &pair_locks, &program_id).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{RpcAccount, RpcError};
    use crate::store::test_support::InMemoryStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use solana_sdk::pubkey::Pubkey;

    struct StubRpc {
        base_asset_amount: i64,
        account_present: bool,
    }

    #[async_trait]
    impl RpcReader for StubRpc {
        async fn get_account(&self, _pubkey: &Pubkey) -> Result<Option<RpcAccount>, RpcError> {
            if !self.account_present {
                return Ok(None);
            }
            let mut data = vec![0u8; crate::address::user_account_layout::MIN_ACCOUNT_LEN];
            let perp_base = crate::address::user_account_layout::PERP_POSITIONS_OFFSET;
            data[perp_base..perp_base + 8].copy_from_slice(&self.base_asset_amount.to_le_bytes());
            Ok(Some(RpcAccount { data, owner: Pubkey::new_unique(), lamports: 0 }))
        }
        async fn get_balance(&self, _pubkey: &Pubkey) -> Result<u64, RpcError> {
            Ok(0)
        }
        async fn get_token_account_balance(&self, _pubkey: &Pubkey) -> Result<u64, RpcError> {
            Ok(0)
        }
        async fn get_slot(&self, _c: solana_sdk::commitment_config::CommitmentConfig) -> Result<u64, RpcError> {
            Ok(0)
        }
    }

    fn bot(wallet: Pubkey, paused: bool) -> ActiveBotRef {
        ActiveBotRef { wallet, agent_address: Pubkey::new_unique(), sub_account_id: 0, market_index: 0, paused }
    }

    #[tokio::test]
    async fn sweep_corrects_local_mirror_to_nonzero_on_chain_base() {
        let store = InMemoryStore::default();
        let wallet = Pubkey::new_unique();
        store.bots.lock().unwrap().push(bot(wallet, false));
        let rpc = StubRpc { base_asset_amount: 1_500_000_000, account_present: true };
        let locks = PairLocks::default();

        run_sweep(&store, &rpc, &locks, &Pubkey::new_unique()).await;

        let updated = store.get_local_position(&wallet, 0, 0).await.unwrap();
        assert_eq!(updated.base_size, dec!(1.5));
    }

    #[tokio::test]
    async fn paused_bot_with_zero_local_record_is_skipped() {
        let store = InMemoryStore::default();
        let wallet = Pubkey::new_unique();
        store.bots.lock().unwrap().push(bot(wallet, true));
        let rpc = StubRpc { base_asset_amount: 2_000_000_000, account_present: true };
        let locks = PairLocks::default();

        run_sweep(&store, &rpc, &locks, &Pubkey::new_unique()).await;

        assert!(store.get_local_position(&wallet, 0, 0).await.is_none());
    }

    #[tokio::test]
    async fn paused_bot_with_nonzero_local_record_is_still_refreshed() {
        let store = InMemoryStore::default();
        let wallet = Pubkey::new_unique();
        store.bots.lock().unwrap().push(bot(wallet, true));
        store
            .upsert_local_position(
                &wallet,
                0,
                0,
                LocalPosition { base_size: dec!(1), ..LocalPosition::flat() },
            )
            .await;
        let rpc = StubRpc { base_asset_amount: 0, account_present: true };
        let locks = PairLocks::default();

        run_sweep(&store, &rpc, &locks, &Pubkey::new_unique()).await;

        let updated = store.get_local_position(&wallet, 0, 0).await.unwrap();
        assert_eq!(updated.base_size, Decimal::ZERO);
    }

    #[tokio::test]
    async fn missing_on_chain_account_does_not_panic_or_write() {
        let store = InMemoryStore::default();
        let wallet = Pubkey::new_unique();
        store.bots.lock().unwrap().push(bot(wallet, false));
        let rpc = StubRpc { base_asset_amount: 0, account_present: false };
        let locks = PairLocks::default();

        run_sweep(&store, &rpc, &locks, &Pubkey::new_unique()).await;

        assert!(store.get_local_position(&wallet, 0, 0).await.is_none());
    }
}
