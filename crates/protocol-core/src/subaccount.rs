//! Subaccount Allocator (C7): merges on-chain truth with local
//! allocations to return the next sequential subaccount id.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::Mutex;

use crate::address::user_pda;
use crate::rpc::RpcReader;

/// Highest subaccount id probed on-chain before allocating (§4.7 step 1).
const PROBE_RANGE: std::ops::Range<u16> = 0..8;

/// The local bookkeeping store's view of pending allocations (§3
/// Subaccount, external collaborator per §1). Implementations live
/// outside this crate; this trait pins the contract the allocator needs.
#[async_trait]
pub trait SubaccountStore: Send + Sync {
    async fn allocated_in_store(&self, wallet: &Pubkey) -> BTreeSet<u16>;
}

/// `next_sub_id(wallet) -> u16` (§4.7):
/// 1. Probe on-chain for subaccount existence for ids 0..7; collect `on_chain`.
/// 2. Read `allocated_in_store(wallet)`.
/// 3. Candidate = smallest id ≥ 1 not in `on_chain ∪ allocated_in_store`.
/// 4. If any id `p < candidate` is missing from `on_chain`, return `p` instead.
pub fn next_sub_id_given(on_chain: &BTreeSet<u16>, allocated_in_store: &BTreeSet<u16>) -> u16 {
    let mut candidate: u16 = 1;
    loop {
        if !on_chain.contains(&candidate) && !allocated_in_store.contains(&candidate) {
            break;
        }
        candidate += 1;
    }
    for p in 1..candidate {
        if !on_chain.contains(&p) {
            return p;
        }
    }
    candidate
}

/// Per-wallet serialization for [`SubaccountAllocator::next_sub_id`] (§5):
/// two concurrent bot-creation calls for the same wallet must never
/// observe the same candidate id.
pub struct SubaccountAllocator<S: SubaccountStore> {
    store: S,
    locks: Mutex<HashMap<Pubkey, Arc<Mutex<()>>>>,
}

impl<S: SubaccountStore> SubaccountAllocator<S> {
    pub fn new(store: S) -> Self {
        Self { store, locks: Mutex::new(HashMap::new()) }
    }

    async fn lock_for(&self, wallet: &Pubkey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(*wallet).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Probe ids 0..7 on-chain, merge with the local store's pending
    /// allocations, and return the next id per §4.7. Serialized per
    /// wallet so a second concurrent caller for the same wallet blocks
    /// until the first completes (and presumably records its
    /// allocation in the store before releasing).
    pub async fn next_sub_id(
        &self,
        wallet: &Pubkey,
        authority: &Pubkey,
        program_id: &Pubkey,
        rpc: &dyn RpcReader,
    ) -> u16 {
        let wallet_lock = self.lock_for(wallet).await;
        let _guard = wallet_lock.lock().await;

        let on_chain = probe_on_chain_subaccounts(authority, program_id, rpc).await;
        let allocated = self.store.allocated_in_store(wallet).await;
        next_sub_id_given(&on_chain, &allocated)
    }
}

async fn probe_on_chain_subaccounts(
    authority: &Pubkey,
    program_id: &Pubkey,
    rpc: &dyn RpcReader,
) -> BTreeSet<u16> {
    let mut on_chain = BTreeSet::new();
    for sub_account_id in PROBE_RANGE {
        let (pda, _bump) = user_pda(authority, sub_account_id, program_id);
        if matches!(rpc.get_account(&pda).await, Ok(Some(_))) {
            on_chain.insert(sub_account_id);
        }
    }
    on_chain
}
