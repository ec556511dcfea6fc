//! Out-of-process execution path: delegates to a subprocess over the
//! line-delimited JSON protocol (C11) when the in-process client can't be
//! loaded in the host runtime (§4.9).

use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use super::{ExecResult, ExecutionPath, Side};
use crate::error::ErrorKind;
use crate::ipc::{execute_via_subprocess, IpcAction, IpcCommand, IpcError};

pub struct SubprocessExecutor {
    binary_path: String,
    encrypted_private_key: String,
}

impl SubprocessExecutor {
    pub fn new(binary_path: impl Into<String>, encrypted_private_key: impl Into<String>) -> Self {
        Self { binary_path: binary_path.into(), encrypted_private_key: encrypted_private_key.into() }
    }

    async fn run(&self, action: IpcAction, payload: serde_json::Value) -> Result<ExecResult, ErrorKind> {
        let command = IpcCommand {
            action,
            payload,
            encrypted_private_key: Some(self.encrypted_private_key.clone()),
            private_key_base58: None,
        };
        let response = execute_via_subprocess(&self.binary_path, &command).await.map_err(map_ipc_error)?;

        if response.success {
            Ok(ExecResult { signature: response.signature, fill_price: response.fill_price.and_then(Decimal::from_f64) })
        } else {
            Err(ErrorKind::TransactionFailed { code: None })
        }
    }
}

#[async_trait]
impl ExecutionPath for SubprocessExecutor {
    async fn execute_perp(
        &self,
        market_index: u16,
        side: Side,
        size_base: Decimal,
        sub_account_id: u16,
        reduce_only: bool,
        slippage_bps: u32,
    ) -> Result<ExecResult, ErrorKind> {
        let payload = serde_json::json!({
            "market_index": market_index,
            "side": match side { Side::Long => "long", Side::Short => "short" },
            "size_base": size_base.to_string(),
            "sub_account_id": sub_account_id,
            "reduce_only": reduce_only,
            "slippage_bps": slippage_bps,
        });
        self.run(IpcAction::Trade, payload).await
    }

    async fn close_perp(&self, market_index: u16, sub_account_id: u16) -> Result<ExecResult, ErrorKind> {
        let payload = serde_json::json!({ "market_index": market_index, "sub_account_id": sub_account_id });
        self.run(IpcAction::Close, payload).await
    }
}

fn map_ipc_error(err: IpcError) -> ErrorKind {
    match err {
        IpcError::Timeout => ErrorKind::Timeout,
        IpcError::InvalidKey(detail) => ErrorKind::InvalidKey { detail },
        IpcError::Spawn(_) | IpcError::Io(_) | IpcError::Decode(_) => ErrorKind::TransactionFailed { code: None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn execute_perp_against_a_missing_binary_surfaces_transaction_failed() {
        let executor = SubprocessExecutor::new("/nonexistent/binary/path", "ciphertext");
        let result = executor.execute_perp(0, Side::Long, Decimal::ONE, 0, false, 50).await;
        assert_eq!(result.unwrap_err(), ErrorKind::TransactionFailed { code: None });
    }
}
