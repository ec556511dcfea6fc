//! Stable error taxonomy (§7) and the program-error classifier (C12).

use thiserror::Error;

/// Stable error kinds surfaced to callers of the orchestrator (§7).
///
/// Every public operation in this crate that can fail terminates in one of
/// these kinds rather than leaking a raw RPC or program error, so callers
/// can make one switch statement's worth of recovery decisions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Agent lacks native token for transaction fees.
    #[error("insufficient gas: {detail}")]
    InsufficientGas { detail: String },

    /// Program rejected the instruction for insufficient margin.
    #[error("insufficient collateral")]
    InsufficientCollateral,

    /// Target subaccount (user/user_stats) is not yet initialized on-chain.
    #[error("account not initialized")]
    AccountNotInitialized,

    /// Idempotent-initialization race; the caller should treat this as success.
    #[error("account already initialized")]
    AccountAlreadyInitialized,

    /// Oracle account could not be read; the fallback oracle was or should be used.
    #[error("oracle unavailable")]
    OracleUnavailable,

    /// Requested position size exceeds the program's configured maximum.
    #[error("max position exceeded")]
    MaxPositionExceeded,

    /// A decrypted or parsed key failed validation. Always fatal.
    #[error("invalid key: {detail}")]
    InvalidKey { detail: String },

    /// Caller cancelled the operation prior to submission.
    #[error("cancelled")]
    Cancelled,

    /// An RPC call or subprocess exceeded its deadline.
    #[error("timeout")]
    Timeout,

    /// Upstream or internal rate limiting; retry after the given delay.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Any other program or validator error, with the raw code when known.
    #[error("transaction failed{}", code.map(|c| format!(" (code {c})")).unwrap_or_default())]
    TransactionFailed { code: Option<u32> },
}

/// Recognized on-chain program error codes (§4.12).
///
/// These are the custom-error-code offsets Anchor programs emit (added to
/// `6000`); they are not re-derived from an IDL here. Per the open
/// question in spec.md §9, a production build should source this table
/// from the program's IDL at build time and fail startup on mismatch —
/// that step is out of scope for this core.
pub fn classify_program_error(code: u32) -> ErrorKind {
    match code {
        6001 => ErrorKind::AccountNotInitialized,
        6010 => ErrorKind::InsufficientCollateral,
        6036 => ErrorKind::OracleUnavailable,
        6040 => ErrorKind::MaxPositionExceeded,
        6214 => ErrorKind::AccountAlreadyInitialized,
        other => ErrorKind::TransactionFailed { code: Some(other) },
    }
}

/// Classify an RPC-shaped error string (e.g. a `sendTransaction`
/// simulation log or a `TransactionError` Display) into a stable kind.
///
/// RPC error surfaces are not structured the way program errors are; this
/// does best-effort text matching for the shapes the orchestrator actually
/// needs to distinguish (custom program errors vs. everything else).
pub fn classify_rpc_error(message: &str) -> ErrorKind {
    if let Some(code) = extract_custom_program_code(message) {
        return classify_program_error(code);
    }
    if message.contains("insufficient funds") || message.contains("insufficient lamports") {
        return ErrorKind::InsufficientGas { detail: message.to_string() };
    }
    if message.contains("blockhash not found") || message.contains("timed out") {
        return ErrorKind::Timeout;
    }
    ErrorKind::TransactionFailed { code: None }
}

/// Extract a `Custom(N)` program error code from a validator error
/// message, e.g. `"... InstructionError(0, Custom(6010)) ..."`.
fn extract_custom_program_code(message: &str) -> Option<u32> {
    let idx = message.find("Custom(")?;
    let rest = &message[idx + "Custom(".len()..];
    let end = rest.find(')')?;
    rest[..end].trim().parse().ok()
}

/// A discriminated orchestrator result (§7): either a confirmed signature
/// or a classified error with caller-facing detail.
#[derive(Debug, Clone)]
pub struct OrchestratorResult {
    pub outcome: Result<String, ErrorKind>,
    pub detail: Option<String>,
    pub suggested_action: Option<String>,
}

impl OrchestratorResult {
    pub fn ok(signature: impl Into<String>) -> Self {
        Self { outcome: Ok(signature.into()), detail: None, suggested_action: None }
    }

    pub fn err(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self { outcome: Err(kind), detail: Some(detail.into()), suggested_action: None }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggested_action = Some(suggestion.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}
