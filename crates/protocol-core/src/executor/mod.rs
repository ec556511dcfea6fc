//! Execution Executor (C9): a single `ExecutionPath` contract with two
//! implementations — in-process and subprocess — selected by whichever
//! client runtime is actually loadable in the host process.

mod in_process;
mod subprocess;

pub use in_process::{InProcessExecutor, PerpOrderParams, ProtocolClient};
pub use subprocess::SubprocessExecutor;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::decode::PerpPosition;
use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub signature: Option<String>,
    pub fill_price: Option<Decimal>,
}

impl ExecResult {
    /// A no-op success: the position was already flat, nothing was
    /// submitted (§4.9 close semantics).
    pub fn already_flat() -> Self {
        Self { signature: None, fill_price: None }
    }
}

/// The abstraction both execution paths implement (§4.9, §9 "Dynamic
/// module loading" redesign note). Parameters are in UI units (base size
/// in whole units, not the on-chain 1e9-scaled integer).
#[async_trait]
pub trait ExecutionPath: Send + Sync {
    async fn execute_perp(
        &self,
        market_index: u16,
        side: Side,
        size_base: Decimal,
        sub_account_id: u16,
        reduce_only: bool,
        slippage_bps: u32,
    ) -> Result<ExecResult, ErrorKind>;

    /// Read the current perp position, flatten it with a reduce-only
    /// order in the opposite direction, and return success with no
    /// signature if it was already flat (§4.9).
    async fn close_perp(&self, market_index: u16, sub_account_id: u16) -> Result<ExecResult, ErrorKind>;
}

/// `limit = oracle_price × (1 ± slippage_bps / 10000)`; LONG takes the
/// upper bound, SHORT the lower (§4.9).
pub fn compute_limit_price(oracle_price: Decimal, side: Side, slippage_bps: u32) -> Decimal {
    let slippage = Decimal::from(slippage_bps) / Decimal::from(10_000u32);
    match side {
        Side::Long => oracle_price * (Decimal::ONE + slippage),
        Side::Short => oracle_price * (Decimal::ONE - slippage),
    }
}

/// Scale factor for on-chain `base_asset_amount` (§3: scaled 1e9).
const BASE_ASSET_PRECISION: i64 = 1_000_000_000;

/// Derive the reduce-only order that flattens `position`, or `None` if it
/// is already flat (§4.9 close semantics).
pub fn derive_close(position: &PerpPosition) -> Option<(Side, Decimal)> {
    if position.is_flat() {
        return None;
    }
    let close_side = if position.is_long() { Side::Short } else { Side::Long };
    let amount = Decimal::from(position.base_asset_amount.unsigned_abs()) / Decimal::from(BASE_ASSET_PRECISION);
    Some((close_side, amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn long_limit_price_is_above_oracle() {
        let limit = compute_limit_price(dec!(100), Side::Long, 50);
        assert_eq!(limit, dec!(100.5));
    }

    #[test]
    fn short_limit_price_is_below_oracle() {
        let limit = compute_limit_price(dec!(100), Side::Short, 50);
        assert_eq!(limit, dec!(99.5));
    }

    #[test]
    fn closing_a_flat_position_yields_none() {
        let flat = PerpPosition {
            base_asset_amount: 0,
            quote_asset_amount: 0,
            quote_entry_amount: 0,
            quote_break_even_amount: 0,
            market_index: 0,
        };
        assert_eq!(derive_close(&flat), None);
    }

    #[test]
    fn closing_a_long_submits_a_short_of_the_same_magnitude() {
        let long = PerpPosition {
            base_asset_amount: 1_500_000_000,
            quote_asset_amount: 0,
            quote_entry_amount: 0,
            quote_break_even_amount: 0,
            market_index: 0,
        };
        assert_eq!(derive_close(&long), Some((Side::Short, dec!(1.5))));
    }

    #[test]
    fn closing_a_short_submits_a_long_of_the_same_magnitude() {
        let short = PerpPosition {
            base_asset_amount: -2_000_000_000,
            quote_asset_amount: 0,
            quote_entry_amount: 0,
            quote_break_even_amount: 0,
            market_index: 0,
        };
        assert_eq!(derive_close(&short), Some((Side::Long, dec!(2))));
    }
}
