//! Position Reconciler (C10): fee-prorated realized-PnL bookkeeping on
//! arbitrary-precision decimals, plus on-chain drift detection and the
//! auto-correction policy that guards against blanking a position on a
//! transient on-chain read.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Drift tolerance in base units (§4.10).
pub const DRIFT_TOLERANCE: Decimal = dec!(0.0001);

/// A single fill applied to a [`LocalPosition`]. `delta` is signed: positive
/// buys, negative sells.
#[derive(Debug, Clone, Copy)]
pub struct Fill {
    pub delta: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
}

/// The local mirror of an on-chain perp position (§3 LocalPosition).
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPosition {
    pub base_size: Decimal,
    pub avg_entry_price: Decimal,
    pub cost_basis: Decimal,
    pub realized_pnl: Decimal,
    pub total_fees: Decimal,
    pub last_trade_id: Option<String>,
    pub last_trade_at: Option<i64>,
}

impl LocalPosition {
    pub fn flat() -> Self {
        Self {
            base_size: Decimal::ZERO,
            avg_entry_price: Decimal::ZERO,
            cost_basis: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            last_trade_id: None,
            last_trade_at: None,
        }
    }
}

/// Apply one fill to `position` per §4.10's ledger equations and return the
/// updated position. Does not touch on-chain state; callers reconcile the
/// result against on-chain truth separately via [`detect_drift`].
pub fn apply_fill(position: &LocalPosition, fill: Fill, trade_id: String, trade_at: i64) -> LocalPosition {
    let prior_base = position.base_size;
    let prior_cost_basis = position.cost_basis;
    let prior_realized = position.realized_pnl;

    let total_fees = position.total_fees + fill.fee;

    let (cost_basis, base_size, realized_pnl) = if prior_base.is_zero() || prior_base.signum() == fill.delta.signum()
    {
        // Adding to (or opening) a position: no realization, just grow cost basis.
        (prior_cost_basis + fill.delta.abs() * fill.price + fill.fee, prior_base + fill.delta, prior_realized)
    } else {
        // Reducing, fully closing, or flipping.
        let close = prior_base.abs().min(fill.delta.abs());
        let avg = prior_cost_basis / prior_base.abs();
        let ratio = close / fill.delta.abs();
        let f_close = fill.fee * ratio;
        let f_new = fill.fee - f_close;

        let realized_delta = if prior_base > Decimal::ZERO { (fill.price - avg) * close } else { (avg - fill.price) * close } - f_close;

        let new_base = prior_base + fill.delta;
        let new_cost_basis = if fill.delta.abs() > close {
            // Flip: the excess beyond the closed leg opens a fresh position.
            (fill.delta.abs() - close) * fill.price + f_new
        } else {
            prior_cost_basis - close * avg
        };

        (new_cost_basis, new_base, prior_realized + realized_delta)
    };

    let avg_entry_price = if base_size.is_zero() { Decimal::ZERO } else { cost_basis / base_size.abs() };

    LocalPosition {
        base_size,
        avg_entry_price,
        cost_basis,
        realized_pnl,
        total_fees,
        last_trade_id: Some(trade_id),
        last_trade_at: Some(trade_at),
    }
}

/// `|on_chain_base − local_base| > 1e-4` (§4.10, invariant-adjacent).
/// `local_base` should be the freshly recomputed `base_size` (the `B'` of
/// §4.10), not a stale prior value.
pub fn detect_drift(local_base: Decimal, on_chain_base: Decimal) -> bool {
    (on_chain_base - local_base).abs() > DRIFT_TOLERANCE
}

/// Auto-correction is permitted only when on-chain shows a non-zero
/// position, or the local record was non-zero and on-chain now shows zero.
/// A zero-vs-zero pair never reaches here since [`detect_drift`] would
/// already be false for it; this guard exists for the genuinely driftful
/// cases so a transient empty on-chain read never silently blanks a
/// position that on-chain itself still carries.
pub fn should_auto_correct(local_base: Decimal, on_chain_base: Decimal) -> bool {
    !on_chain_base.is_zero() || (!local_base.is_zero() && on_chain_base.is_zero())
}

/// Outcome of reconciling one fill against a subsequently-read on-chain base.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationOutcome {
    pub position: LocalPosition,
    pub drift_detected: bool,
    pub corrected: bool,
}

/// Apply a fill, then compare the result against the authoritative on-chain
/// base size, correcting in place when the policy allows it (§4.10).
pub fn reconcile_after_fill(
    prior: &LocalPosition,
    fill: Fill,
    trade_id: String,
    trade_at: i64,
    on_chain_base: Decimal,
) -> ReconciliationOutcome {
    let mut updated = apply_fill(prior, fill, trade_id, trade_at);
    let drift_detected = detect_drift(updated.base_size, on_chain_base);
    let mut corrected = false;

    if drift_detected && should_auto_correct(updated.base_size, on_chain_base) {
        updated.base_size = on_chain_base;
        updated.avg_entry_price = if on_chain_base.is_zero() { Decimal::ZERO } else { updated.avg_entry_price };
        corrected = true;
    }

    ReconciliationOutcome { position: updated, drift_detected, corrected }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_s3_closing_a_long_realizes_the_full_pnl_and_flattens() {
        let prior = LocalPosition {
            base_size: dec!(1.5),
            avg_entry_price: dec!(120),
            cost_basis: dec!(180),
            realized_pnl: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            last_trade_id: None,
            last_trade_at: None,
        };
        let fill = Fill { delta: dec!(-1.5), price: dec!(150), fee: dec!(0.05) };

        let updated = apply_fill(&prior, fill, "t1".into(), 1000);

        assert_eq!(updated.realized_pnl, dec!(44.95));
        assert_eq!(updated.base_size, Decimal::ZERO);
        assert_eq!(updated.cost_basis, Decimal::ZERO);
        assert_eq!(updated.avg_entry_price, Decimal::ZERO);
        assert_eq!(updated.total_fees, dec!(0.05));
    }

    #[test]
    fn scenario_s4_flipping_short_to_long_realizes_the_closed_leg_and_reopens() {
        let prior = LocalPosition {
            base_size: dec!(-1),
            avg_entry_price: dec!(110),
            cost_basis: dec!(110),
            realized_pnl: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            last_trade_id: None,
            last_trade_at: None,
        };
        let fill = Fill { delta: dec!(2), price: dec!(100), fee: dec!(0.04) };

        let updated = apply_fill(&prior, fill, "t2".into(), 2000);

        assert_eq!(updated.realized_pnl, dec!(9.98));
        assert_eq!(updated.base_size, dec!(1));
        assert_eq!(updated.cost_basis, dec!(100.02));
        assert_eq!(updated.avg_entry_price, dec!(100.02));
        assert_eq!(updated.total_fees, dec!(0.04));
    }

    #[test]
    fn opening_a_flat_position_carries_no_realization() {
        let prior = LocalPosition::flat();
        let fill = Fill { delta: dec!(3), price: dec!(50), fee: dec!(0.1) };

        let updated = apply_fill(&prior, fill, "t3".into(), 3000);

        assert_eq!(updated.base_size, dec!(3));
        assert_eq!(updated.cost_basis, dec!(150.1));
        assert_eq!(updated.avg_entry_price, dec!(150.1) / dec!(3));
        assert_eq!(updated.realized_pnl, Decimal::ZERO);
    }

    #[test]
    fn adding_to_an_existing_long_grows_cost_basis_without_realizing() {
        let prior = LocalPosition {
            base_size: dec!(1),
            avg_entry_price: dec!(100),
            cost_basis: dec!(100),
            realized_pnl: dec!(5),
            total_fees: dec!(0.01),
            last_trade_id: None,
            last_trade_at: None,
        };
        let fill = Fill { delta: dec!(1), price: dec!(110), fee: dec!(0.02) };

        let updated = apply_fill(&prior, fill, "t4".into(), 4000);

        assert_eq!(updated.base_size, dec!(2));
        assert_eq!(updated.cost_basis, dec!(210.02));
        assert_eq!(updated.realized_pnl, dec!(5));
        assert_eq!(updated.total_fees, dec!(0.03));
    }

    #[test]
    fn partial_reduce_without_flip_keeps_remaining_leg_at_its_old_average() {
        // Long 2 @ 100 (cost basis 200), sell 1 @ 130, fee 0.
        let prior = LocalPosition {
            base_size: dec!(2),
            avg_entry_price: dec!(100),
            cost_basis: dec!(200),
            realized_pnl: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            last_trade_id: None,
            last_trade_at: None,
        };
        let fill = Fill { delta: dec!(-1), price: dec!(130), fee: Decimal::ZERO };

        let updated = apply_fill(&prior, fill, "t5".into(), 5000);

        assert_eq!(updated.base_size, dec!(1));
        assert_eq!(updated.realized_pnl, dec!(30));
        // close=1, avg=100, C' = C - close*avg = 200 - 100 = 100, avg_entry' = 100/1.
        assert_eq!(updated.cost_basis, dec!(100));
        assert_eq!(updated.avg_entry_price, dec!(100));
    }

    #[test]
    fn drift_within_tolerance_is_not_flagged() {
        assert!(!detect_drift(dec!(1.00000), dec!(1.00005)));
    }

    #[test]
    fn drift_beyond_tolerance_is_flagged() {
        assert!(detect_drift(dec!(1.0), dec!(1.001)));
    }

    #[test]
    fn reconcile_corrects_to_on_chain_when_on_chain_is_nonzero() {
        let prior = LocalPosition::flat();
        let fill = Fill { delta: dec!(1), price: dec!(100), fee: Decimal::ZERO };

        // Local would predict base_size 1, but on-chain (already adjusted
        // by a prior unseen fill) reports 1.5.
        let outcome = reconcile_after_fill(&prior, fill, "t6".into(), 6000, dec!(1.5));

        assert!(outcome.drift_detected);
        assert!(outcome.corrected);
        assert_eq!(outcome.position.base_size, dec!(1.5));
    }

    #[test]
    fn reconcile_corrects_to_zero_when_local_was_nonzero_and_on_chain_flattened() {
        let prior = LocalPosition {
            base_size: dec!(2),
            avg_entry_price: dec!(100),
            cost_basis: dec!(200),
            realized_pnl: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            last_trade_id: None,
            last_trade_at: None,
        };
        // A fill that (incorrectly, per local math) still predicts a residual
        // position, while on-chain has actually gone flat (e.g. liquidated).
        let fill = Fill { delta: dec!(-1), price: dec!(100), fee: Decimal::ZERO };

        let outcome = reconcile_after_fill(&prior, fill, "t7".into(), 7000, Decimal::ZERO);

        assert!(outcome.drift_detected);
        assert!(outcome.corrected);
        assert_eq!(outcome.position.base_size, Decimal::ZERO);
        assert_eq!(outcome.position.avg_entry_price, Decimal::ZERO);
    }
}
