//! Thin wrappers around the `metrics` crate's recording macros (SPEC_FULL
//! §1, §3 "protocol-core::metrics"). `protocol-core` never installs a
//! recorder itself — that's the binary's job (`agent-gateway` installs a
//! Prometheus one) — it only records against whatever recorder is
//! globally installed, a no-op if none is.
//!
//! §1 of spec.md calls dashboards/alerting out of scope; it does not call
//! emitting the metrics out of scope, so this crate still instruments the
//! calls most worth watching in production: RPC latency, reconciliation
//! drift, and classified error kinds.

use std::time::Duration;

use metrics::{counter, histogram};

use crate::error::ErrorKind;

/// Record how long one RPC call took, labeled by its method name.
pub fn record_rpc_latency(method: &'static str, elapsed: Duration) {
    histogram!("protocol_core_rpc_latency_seconds", "method" => method).record(elapsed.as_secs_f64());
}

/// Increment the counter for a classified error kind, labeled by its
/// stable taxonomy name (§7).
pub fn increment_error_kind(kind: &ErrorKind) {
    counter!("protocol_core_errors_total", "kind" => error_kind_label(kind)).increment(1);
}

/// Record a reconciliation sweep outcome: whether drift was detected and
/// whether the local record was auto-corrected (§4.10, §4.13).
pub fn record_reconciliation_outcome(drift_detected: bool, corrected: bool) {
    counter!("protocol_core_reconciliation_sweeps_total").increment(1);
    if drift_detected {
        counter!("protocol_core_reconciliation_drift_total").increment(1);
    }
    if corrected {
        counter!("protocol_core_reconciliation_corrected_total").increment(1);
    }
}

/// Increment the counter for a successfully confirmed on-chain operation,
/// labeled by operation name (deposit, withdraw, trade, ...).
pub fn increment_operation_success(operation: &'static str) {
    counter!("protocol_core_operations_total", "operation" => operation, "outcome" => "ok").increment(1);
}

fn error_kind_label(kind: &ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InsufficientGas { .. } => "insufficient_gas",
        ErrorKind::InsufficientCollateral => "insufficient_collateral",
        ErrorKind::AccountNotInitialized => "account_not_initialized",
        ErrorKind::AccountAlreadyInitialized => "account_already_initialized",
        ErrorKind::OracleUnavailable => "oracle_unavailable",
        ErrorKind::MaxPositionExceeded => "max_position_exceeded",
        ErrorKind::InvalidKey { .. } => "invalid_key",
        ErrorKind::Cancelled => "cancelled",
        ErrorKind::Timeout => "timeout",
        ErrorKind::RateLimited { .. } => "rate_limited",
        ErrorKind::TransactionFailed { .. } => "transaction_failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_labels_are_stable_snake_case() {
        assert_eq!(error_kind_label(&ErrorKind::OracleUnavailable), "oracle_unavailable");
        assert_eq!(error_kind_label(&ErrorKind::Cancelled), "cancelled");
        assert_eq!(
            error_kind_label(&ErrorKind::RateLimited { retry_after_ms: 10 }),
            "rate_limited"
        );
    }

    #[test]
    fn recording_without_an_installed_recorder_does_not_panic() {
        record_rpc_latency("get_account", Duration::from_millis(5));
        increment_error_kind(&ErrorKind::Timeout);
        record_reconciliation_outcome(true, false);
        increment_operation_success("deposit");
    }
}
