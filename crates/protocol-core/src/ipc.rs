//! One-shot line-delimited JSON protocol used by the out-of-process
//! execution path when the in-process client isn't loadable in the host
//! runtime.

use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

/// Hard deadline for the whole spawn-write-read round trip.
pub const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(60);

/// `private_key_base58` must fall in this length range to be accepted
/// without spawning the child at all (key-length sanity check).
const BASE58_KEY_LEN_RANGE: std::ops::RangeInclusive<usize> = 80..=95;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IpcError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("failed to spawn subprocess: {0}")]
    Spawn(String),
    #[error("subprocess io error: {0}")]
    Io(String),
    #[error("subprocess timed out")]
    Timeout,
    #[error("malformed response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IpcAction {
    Trade,
    Close,
    Deposit,
    SettlePnl,
    DeleteSubaccount,
}

/// One JSON command written to the child's stdin. `payload`
/// carries the action-specific fields; exactly one of `encrypted_private_key`
/// / `private_key_base58` must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcCommand {
    pub action: IpcAction,
    #[serde(flatten)]
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_private_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_base58: Option<String>,
}

/// The single JSON response read from the child's stdout.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IpcResponse {
    pub success: bool,
    pub signature: Option<String>,
    pub error: Option<String>,
    pub fill_price: Option<f64>,
}

/// Validate a command's key material before spawning anything. Exactly
/// one of the two key fields must be present, and a plaintext
/// `private_key_base58` must be a plausible ed25519 keypair length.
pub fn validate_command(command: &IpcCommand) -> Result<(), IpcError> {
    match (&command.encrypted_private_key, &command.private_key_base58) {
        (Some(_), Some(_)) | (None, None) => {
            return Err(IpcError::InvalidKey(
                "exactly one of encrypted_private_key or private_key_base58 must be present".into(),
            ));
        }
        _ => {}
    }

    if let Some(key) = &command.private_key_base58 {
        if !BASE58_KEY_LEN_RANGE.contains(&key.len()) {
            return Err(IpcError::InvalidKey(format!(
                "private_key_base58 length {} outside [{}, {}]",
                key.len(),
                BASE58_KEY_LEN_RANGE.start(),
                BASE58_KEY_LEN_RANGE.end()
            )));
        }
    }

    Ok(())
}

/// Spawn `binary_path`, write one JSON command line, read one JSON
/// response line, and enforce the 60s hard timeout. `stderr` lines are
/// mirrored to this process's log but never parsed as protocol.
pub async fn execute_via_subprocess(
    binary_path: &str,
    command: &IpcCommand,
) -> Result<IpcResponse, IpcError> {
    validate_command(command)?;

    let mut child = Command::new(binary_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| IpcError::Spawn(err.to_string()))?;

    let mut stdin = child.stdin.take().expect("stdin piped at spawn");
    let stdout = child.stdout.take().expect("stdout piped at spawn");
    let stderr = child.stderr.take().expect("stderr piped at spawn");

    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            warn!(target: "subprocess_executor", "{line}");
        }
    });

    let line = serde_json::to_string(command).map_err(|err| IpcError::Io(err.to_string()))?;

    let round_trip = async {
        stdin.write_all(line.as_bytes()).await.map_err(|err| IpcError::Io(err.to_string()))?;
        stdin.write_all(b"\n").await.map_err(|err| IpcError::Io(err.to_string()))?;
        stdin.shutdown().await.map_err(|err| IpcError::Io(err.to_string()))?;

        let mut lines = BufReader::new(stdout).lines();
        let response_line = lines
            .next_line()
            .await
            .map_err(|err| IpcError::Io(err.to_string()))?
            .ok_or_else(|| IpcError::Io("child closed stdout without a response".into()))?;

        serde_json::from_str::<IpcResponse>(&response_line).map_err(|err| IpcError::Decode(err.to_string()))
    };

    match timeout(SUBPROCESS_TIMEOUT, round_trip).await {
        Ok(result) => {
            let _ = child.wait().await;
            result
        }
        Err(_) => {
            let _ = child.start_kill();
            Err(IpcError::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command_with(encrypted: Option<&str>, plain: Option<&str>) -> IpcCommand {
        IpcCommand {
            action: IpcAction::Trade,
            payload: serde_json::json!({"market_index": 0}),
            encrypted_private_key: encrypted.map(String::from),
            private_key_base58: plain.map(String::from),
        }
    }

    #[test]
    fn rejects_commands_with_neither_key_field() {
        assert_eq!(
            validate_command(&command_with(None, None)),
            Err(IpcError::InvalidKey(
                "exactly one of encrypted_private_key or private_key_base58 must be present".into()
            ))
        );
    }

    #[test]
    fn rejects_commands_with_both_key_fields() {
        assert!(validate_command(&command_with(Some("enc"), Some(&"1".repeat(88)))).is_err());
    }

    #[test]
    fn rejects_base58_key_outside_length_range() {
        assert!(validate_command(&command_with(None, Some("short"))).is_err());
        assert!(validate_command(&command_with(None, Some(&"1".repeat(200)))).is_err());
    }

    #[test]
    fn accepts_a_plausible_base58_key_length() {
        assert!(validate_command(&command_with(None, Some(&"1".repeat(88)))).is_ok());
    }

    #[test]
    fn accepts_an_encrypted_key_with_no_length_constraint() {
        assert!(validate_command(&command_with(Some("opaque-ciphertext"), None)).is_ok());
    }

    #[tokio::test]
    async fn spawning_a_nonexistent_binary_surfaces_spawn_error() {
        let command = command_with(None, Some(&"1".repeat(88)));
        let result = execute_via_subprocess("/nonexistent/binary/path", &command).await;
        assert!(matches!(result, Err(IpcError::Spawn(_))));
    }

    #[tokio::test]
    async fn a_terminating_child_that_echoes_non_response_json_decodes_to_an_error() {
        // `cat` echoes our own command line back, which isn't shaped like
        // an `IpcResponse` (no `success` field) — this exercises the
        // round trip end to end without a dedicated test binary.
        let command = command_with(None, Some(&"1".repeat(88)));
        let result = execute_via_subprocess("cat", &command).await;
        assert!(matches!(result, Err(IpcError::Decode(_))));
    }
}
