//! In-process execution path: used when the underlying protocol client
//! is loadable directly in the host runtime (§4.9, §9 "Dynamic module
//! loading" redesign note).

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;

use super::{compute_limit_price, derive_close, ExecResult, ExecutionPath, Side};
use crate::address::user_pda;
use crate::decode::decode_user;
use crate::error::ErrorKind;
use crate::oracle::{OracleKey, OracleResolver};
use crate::rpc::RpcReader;

/// Order parameters handed to the underlying client once slippage and
/// direction are resolved.
#[derive(Debug, Clone)]
pub struct PerpOrderParams {
    pub market_index: u16,
    pub side: Side,
    pub size_base: Decimal,
    pub sub_account_id: u16,
    pub reduce_only: bool,
    /// Omitted only when the oracle was unavailable (§4.9).
    pub limit_price: Option<Decimal>,
}

/// Abstraction over the actual perp-order/settle/delete-subaccount
/// program calls. Unlike C3's five instructions, their wire schemas are
/// not pinned down by this core (per spec.md's open questions) — a
/// concrete implementation is either a first-party instruction builder,
/// once its IDL is verified, or an FFI-bound vendor client. This crate
/// pins only the typed contract the executor depends on (§9 "a typed
/// `ProtocolClient` abstraction").
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    async fn place_perp_order(&self, params: PerpOrderParams) -> Result<ExecResult, ErrorKind>;
    async fn settle_pnl(&self, market_index: u16, sub_account_id: u16) -> Result<ExecResult, ErrorKind>;
    async fn delete_subaccount(&self, sub_account_id: u16) -> Result<ExecResult, ErrorKind>;
}

pub struct InProcessExecutor<C: ProtocolClient> {
    client: Arc<C>,
    rpc: Arc<dyn RpcReader>,
    oracle: Arc<OracleResolver>,
    authority: Pubkey,
    program_id: Pubkey,
}

impl<C: ProtocolClient> InProcessExecutor<C> {
    pub fn new(
        client: Arc<C>,
        rpc: Arc<dyn RpcReader>,
        oracle: Arc<OracleResolver>,
        authority: Pubkey,
        program_id: Pubkey,
    ) -> Self {
        Self { client, rpc, oracle, authority, program_id }
    }

    async fn resolve_limit_price(&self, market_index: u16, side: Side, slippage_bps: u32) -> Option<Decimal> {
        let (spot_market_pda, _bump) = crate::address::spot_market_pda(market_index, &self.program_id);
        let key = OracleKey { market_pda: spot_market_pda, market_index };
        let account = self.rpc.get_account(&spot_market_pda).await.ok().flatten()?;
        if account.data.is_empty() {
            return None;
        }
        let oracle_price = self.fetch_oracle_price(key).await?;
        Some(compute_limit_price(oracle_price, side, slippage_bps))
    }

    /// Oracle accounts carry the price themselves on-chain; resolving the
    /// oracle pubkey (C5) is a prerequisite step the caller-supplied
    /// `ProtocolClient` is expected to do its own price read against.
    /// This core only needs the oracle's *address* to be resolvable —
    /// treating resolution success as price availability is the signal
    /// §4.9 asks for ("omit the limit only if oracle is unavailable").
    async fn fetch_oracle_price(&self, key: OracleKey) -> Option<Decimal> {
        let oracle_pubkey = self.oracle.resolve(key, self.rpc.as_ref()).await;
        let account = self.rpc.get_account(&oracle_pubkey).await.ok().flatten()?;
        if account.data.len() < 8 {
            return None;
        }
        let raw = i64::from_le_bytes(account.data[0..8].try_into().ok()?);
        Some(Decimal::from(raw) / Decimal::from(1_000_000u64))
    }
}

#[async_trait]
impl<C: ProtocolClient> ExecutionPath for InProcessExecutor<C> {
    async fn execute_perp(
        &self,
        market_index: u16,
        side: Side,
        size_base: Decimal,
        sub_account_id: u16,
        reduce_only: bool,
        slippage_bps: u32,
    ) -> Result<ExecResult, ErrorKind> {
        let limit_price = self.resolve_limit_price(market_index, side, slippage_bps).await;
        self.client
            .place_perp_order(PerpOrderParams { market_index, side, size_base, sub_account_id, reduce_only, limit_price })
            .await
    }

    async fn close_perp(&self, market_index: u16, sub_account_id: u16) -> Result<ExecResult, ErrorKind> {
        let (user_account_pda, _bump) = user_pda(&self.authority, sub_account_id, &self.program_id);
        let account = self
            .rpc
            .get_account(&user_account_pda)
            .await
            .map_err(|_| ErrorKind::TransactionFailed { code: None })?
            .ok_or(ErrorKind::AccountNotInitialized)?;

        let user = decode_user(&account.data).map_err(|_| ErrorKind::TransactionFailed { code: None })?;
        let position = user
            .perp_positions
            .iter()
            .find(|p| p.market_index == market_index)
            .ok_or(ErrorKind::TransactionFailed { code: None })?;

        let Some((close_side, close_amount)) = derive_close(position) else {
            return Ok(ExecResult::already_flat());
        };

        self.client
            .place_perp_order(PerpOrderParams {
                market_index,
                side: close_side,
                size_base: close_amount,
                sub_account_id,
                reduce_only: true,
                limit_price: None,
            })
            .await
    }
}
