//! Persisted-state contract (§6 "Persisted state (store contract
//! consumed by core)"). The relational store itself is an external
//! collaborator (§1 Out of scope) — this module pins only the trait
//! boundary the core calls through, mirroring [`crate::rpc::RpcReader`]'s
//! role for the RPC transport.
//!
//! Implementations live outside this crate (the `apps/agent-gateway`
//! binary wires a concrete one against its own persistence). Core
//! requires only atomic upsert semantics on each record and a
//! `select-distinct-active-bots` query for the reconciliation sweep.

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::reconciler::LocalPosition;
use crate::subaccount::SubaccountStore;

/// One bot's identity for the periodic reconciliation sweep (§4.13): the
/// wallet that owns it, its agent address, and the subaccount/market
/// pair its position lives at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveBotRef {
    pub wallet: Pubkey,
    pub agent_address: Pubkey,
    pub sub_account_id: u16,
    pub market_index: u16,
    /// Paused bots are only refreshed when their local record is
    /// non-zero (§4.13) — the store, not the sweep, knows pause state.
    pub paused: bool,
}

/// An `EquityEvent` record (§4.8 step 6): emitted once an operation's
/// transaction confirms, carrying the fill context the reconciler needs.
#[derive(Debug, Clone, Copy)]
pub struct EquityEvent {
    pub wallet: Pubkey,
    pub sub_account_id: u16,
    pub market_index: u16,
    pub delta_base: rust_decimal::Decimal,
    pub fill_price: Option<rust_decimal::Decimal>,
    pub fee: rust_decimal::Decimal,
    pub trade_id: String,
    pub trade_at: i64,
}

/// A `RetryJob` record (§3): tracks a failed operation eligible for
/// bounded retry. Terminal when `status` is `Completed`, `Failed`, or
/// `Voided`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryJobStatus {
    Pending,
    Completed,
    Failed,
    Voided,
}

#[derive(Debug, Clone)]
pub struct RetryJob {
    pub trade_id: String,
    pub attempts: u32,
    pub next_attempt_at: i64,
    pub last_error: Option<String>,
    pub status: RetryJobStatus,
}

/// The full persisted-state surface the core's orchestrator (C8) and
/// periodic reconciliation (C13) call through. Extends
/// [`SubaccountStore`] so a single implementer covers both the
/// allocator's narrower need and the broader bookkeeping surface.
#[async_trait]
pub trait StoreHandle: SubaccountStore {
    /// Upsert the local mirror position for `(wallet, sub_account_id,
    /// market_index)`. Atomic per key (§5 "single-writer-per-key").
    async fn upsert_local_position(
        &self,
        wallet: &Pubkey,
        sub_account_id: u16,
        market_index: u16,
        position: LocalPosition,
    );

    /// Read the current local mirror, if any has been recorded yet.
    async fn get_local_position(
        &self,
        wallet: &Pubkey,
        sub_account_id: u16,
        market_index: u16,
    ) -> Option<LocalPosition>;

    /// `select-distinct-active-bots`: every bot belonging to a wallet
    /// with at least one active bot (§4.13), for the periodic sweep.
    async fn active_bots(&self) -> Vec<ActiveBotRef>;

    /// Append an `EquityEvent` row. Never called before a transaction's
    /// on-chain confirmation (§7 "never writes local ledger entries on
    /// an unconfirmed transaction").
    async fn record_equity_event(&self, event: EquityEvent);

    /// Upsert a `RetryJob`, e.g. after a `Timeout` classification (§7).
    async fn upsert_retry_job(&self, job: RetryJob);
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// A minimal in-memory [`StoreHandle`] for exercising C8/C13 control
    /// flow in tests, without a real persistence layer.
    #[derive(Default)]
    pub struct InMemoryStore {
        pub allocations: Mutex<BTreeMap<Pubkey, std::collections::BTreeSet<u16>>>,
        pub positions: Mutex<BTreeMap<(Pubkey, u16, u16), LocalPosition>>,
        pub equity_events: Mutex<Vec<EquityEvent>>,
        pub retry_jobs: Mutex<Vec<RetryJob>>,
        pub bots: Mutex<Vec<ActiveBotRef>>,
    }

    #[async_trait]
    impl SubaccountStore for InMemoryStore {
        async fn allocated_in_store(&self, wallet: &Pubkey) -> std::collections::BTreeSet<u16> {
            self.allocations.lock().unwrap().get(wallet).cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl StoreHandle for InMemoryStore {
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
            self.retry_jobs.lock().unwrap().push(job);
        }
    }
}
