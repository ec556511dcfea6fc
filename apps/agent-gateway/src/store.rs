//! In-memory implementation of protocol-core's persisted-state contract
//! ([`protocol_core::store::StoreHandle`], [`protocol_core::subaccount::SubaccountStore`]).
//!
//! The real relational schema is an external collaborator the core
//! deliberately leaves unpinned; this is the bootstrap implementation the
//! gateway runs against until one exists, mirroring the ingest handler's
//! own "accept and hold, don't model the schema yet" posture.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use protocol_core::reconciler::LocalPosition;
use protocol_core::store::{ActiveBotRef, EquityEvent, RetryJob, StoreHandle};
use protocol_core::subaccount::SubaccountStore;

#[derive(Default)]
pub struct GatewayStore {
    allocations: Mutex<BTreeMap<Pubkey, BTreeSet<u16>>>,
    positions: Mutex<BTreeMap<(Pubkey, u16, u16), LocalPosition>>,
    equity_events: Mutex<Vec<EquityEvent>>,
    retry_jobs: Mutex<Vec<RetryJob>>,
    bots: Mutex<Vec<ActiveBotRef>>,
}

impl GatewayStore {
    /// Registers (or updates) a bot so the periodic sweep (§4.13) picks it
    /// up. Exposed to the `/ops/bots` bootstrap endpoint until bots are
    /// sourced from a real schema.
    pub fn upsert_bot(&self, bot: ActiveBotRef) {
        let mut bots = self.bots.lock().unwrap();
        if let Some(existing) = bots
            .iter_mut()
            .find(|b| b.wallet == bot.wallet && b.sub_account_id == bot.sub_account_id && b.market_index == bot.market_index)
        {
            *existing = bot;
        } else {
            bots.push(bot);
        }
    }

    pub fn snapshot_positions(&self) -> Vec<((Pubkey, u16, u16), LocalPosition)> {
        self.positions.lock().unwrap().iter().map(|(k, v)| (*k, v.clone())).collect()
    }
}

#[async_trait]
impl SubaccountStore for GatewayStore {
    async fn allocated_in_store(&self, wallet: &Pubkey) -> BTreeSet<u16> {
        self.allocations.lock().unwrap().get(wallet).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl StoreHandle for GatewayStore {
    async fn upsert_local_position(
        &self,
        wallet: &Pubkey,
        sub_account_id: u16,
        market_index: u16,
        position: LocalPosition,
    ) {
        self.positions.lock().unwrap().insert((*wallet, sub_account_id, market_index), position);
    }

    async fn get_local_position(
        &self,
        wallet: &Pubkey,
        sub_account_id: u16,
        market_index: u16,
    ) -> Option<LocalPosition> {
        self.positions.lock().unwrap().get(&(*wallet, sub_account_id, market_index)).cloned()
    }

    async fn active_bots(&self) -> Vec<ActiveBotRef> {
        self.bots.lock().unwrap().clone()
    }

    async fn record_equity_event(&self, event: EquityEvent) {
        self.equity_events.lock().unwrap().push(event);
    }

    async fn upsert_retry_job(&self, job: RetryJob) {
        let mut jobs = self.retry_jobs.lock().unwrap();
        if let Some(existing) = jobs.iter_mut().find(|j| j.trade_id == job.trade_id) {
            *existing = job;
        } else {
            jobs.push(job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn upsert_and_read_local_position_round_trips() {
        let store = GatewayStore::default();
        let wallet = Pubkey::new_unique();
        store
            .upsert_local_position(&wallet, 0, 0, LocalPosition { base_size: dec!(1.5), ..LocalPosition::flat() })
            .await;
        let read = store.get_local_position(&wallet, 0, 0).await.unwrap();
        assert_eq!(read.base_size, dec!(1.5));
    }

    #[test]
    fn upsert_bot_replaces_the_same_pair_instead_of_duplicating() {
        let store = GatewayStore::default();
        let wallet = Pubkey::new_unique();
        let agent = Pubkey::new_unique();
        store.upsert_bot(ActiveBotRef { wallet, agent_address: agent, sub_account_id: 0, market_index: 0, paused: false });
        store.upsert_bot(ActiveBotRef { wallet, agent_address: agent, sub_account_id: 0, market_index: 0, paused: true });
        assert_eq!(store.bots.lock().unwrap().len(), 1);
        assert!(store.bots.lock().unwrap()[0].paused);
    }
}
