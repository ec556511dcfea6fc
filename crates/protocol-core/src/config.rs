//! Typed configuration surface.
//!
//! `protocol-core` itself never reads environment variables directly —
//! callers (the CLI binary, the gateway app) build a [`CoreConfig`] via
//! [`CoreConfig::from_env`] and pass it in. This keeps the library
//! environment-free and testable with hand-built configs.

use std::time::Duration;

use thiserror::Error;

/// Target chain environment. Selects the USDC mint, fallback oracle, and
/// airdrop policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Devnet,
    Mainnet,
}

impl Environment {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.to_ascii_lowercase().as_str() {
            "devnet" => Ok(Self::Devnet),
            "mainnet" => Ok(Self::Mainnet),
            other => Err(ConfigError::InvalidValue {
                key: "ENV",
                detail: format!("expected 'devnet' or 'mainnet', got '{other}'"),
            }),
        }
    }

    /// Default minimum native-token balance required for fees.
    pub fn default_min_sol_for_fees(self) -> f64 {
        match self {
            Environment::Mainnet => 0.01,
            Environment::Devnet => 0.05,
        }
    }

    /// Whether this environment permits self-service airdrops.
    pub fn allows_airdrop(self) -> bool {
        matches!(self, Environment::Devnet)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required config key {key}")]
    Missing { key: &'static str },
    #[error("invalid value for {key}: {detail}")]
    InvalidValue { key: &'static str, detail: String },
}

/// Per-purpose nonce TTL overrides (`NONCE_TTL_MS`).
#[derive(Debug, Clone)]
pub struct NonceTtls {
    pub default_ms: u64,
    pub high_risk_ms: u64,
}

impl Default for NonceTtls {
    fn default() -> Self {
        Self { default_ms: 5 * 60 * 1000, high_risk_ms: 2 * 60 * 1000 }
    }
}

impl NonceTtls {
    pub fn ttl_for(&self, purpose: &str) -> Duration {
        if is_high_risk_purpose(purpose) {
            Duration::from_millis(self.high_risk_ms)
        } else {
            Duration::from_millis(self.default_ms)
        }
    }
}

/// High-risk disclosure purposes get the shorter nonce TTL.
fn is_high_risk_purpose(purpose: &str) -> bool {
    matches!(purpose, "mnemonic_reveal" | "recovery_phrase_reveal")
}

/// The recognized configuration surface, fully typed.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub env: Environment,
    pub rpc_url: String,
    pub min_sol_for_fees: f64,
    pub airdrop_amount_sol: f64,
    pub oracle_cache_ttl: Duration,
    pub session_ttl: Duration,
    pub nonce_ttls: NonceTtls,
    /// 32-byte server execution key, parsed from 64 hex chars.
    pub server_execution_key: [u8; 32],
}

impl CoreConfig {
    /// Build a config from environment variables. Fails fast (never falls
    /// back silently) on a missing or malformed `SERVER_EXECUTION_KEY`:
    /// refuses to start if it is absent or not exactly 64 hex chars.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env = Environment::parse(&env_var_or("ENV", "devnet"))?;
        let rpc_url = env_var_or(
            "RPC_URL",
            match env {
                Environment::Mainnet => "https://api.mainnet-beta.solana.com",
                Environment::Devnet => "https://api.devnet.solana.com",
            },
        );
        let min_sol_for_fees = env_var_f64_or("MIN_SOL_FOR_FEES", env.default_min_sol_for_fees())?;
        let airdrop_amount_sol = env_var_f64_or("AIRDROP_AMOUNT", 1.0)?;
        let oracle_cache_ttl_ms = env_var_u64_or("ORACLE_CACHE_TTL_MS", 60_000)?;
        let session_ttl_ms = env_var_u64_or("SESSION_TTL_MS", 30 * 60 * 1000)?;
        let nonce_default_ms = env_var_u64_or("NONCE_TTL_MS", 5 * 60 * 1000)?;

        let server_execution_key = parse_server_execution_key(&require_env_var("SERVER_EXECUTION_KEY")?)?;

        Ok(Self {
            env,
            rpc_url,
            min_sol_for_fees,
            airdrop_amount_sol,
            oracle_cache_ttl: Duration::from_millis(oracle_cache_ttl_ms),
            session_ttl: Duration::from_millis(session_ttl_ms),
            nonce_ttls: NonceTtls { default_ms: nonce_default_ms, high_risk_ms: 2 * 60 * 1000 },
            server_execution_key,
        })
    }
}

fn parse_server_execution_key(raw: &str) -> Result<[u8; 32], ConfigError> {
    if raw.len() != 64 || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ConfigError::InvalidValue {
            key: "SERVER_EXECUTION_KEY",
            detail: "must be exactly 64 hex characters (32 bytes)".to_string(),
        });
    }
    let mut out = [0u8; 32];
    for (i, chunk) in raw.as_bytes().chunks(2).enumerate() {
        let hex_byte = std::str::from_utf8(chunk).expect("ascii hex checked above");
        out[i] = u8::from_str_radix(hex_byte, 16).expect("hex digit checked above");
    }
    Ok(out)
}

fn require_env_var(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing { key })
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_var_f64_or(key: &'static str, default: f64) -> Result<f64, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            detail: format!("'{raw}' is not a valid number"),
        }),
        Err(_) => Ok(default),
    }
}

fn env_var_u64_or(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            detail: format!("'{raw}' is not a valid integer"),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!(Environment::parse("Mainnet").unwrap(), Environment::Mainnet);
        assert_eq!(Environment::parse("devnet").unwrap(), Environment::Devnet);
        assert!(Environment::parse("testnet").is_err());
    }

    #[test]
    fn default_fee_floors_by_environment() {
        assert_eq!(Environment::Mainnet.default_min_sol_for_fees(), 0.01);
        assert_eq!(Environment::Devnet.default_min_sol_for_fees(), 0.05);
    }

    #[test]
    fn server_execution_key_requires_64_hex_chars() {
        assert!(parse_server_execution_key("ab").is_err());
        assert!(parse_server_execution_key(&"zz".repeat(32)).is_err());
        let valid = "11".repeat(32);
        assert_eq!(parse_server_execution_key(&valid).unwrap(), [0x11u8; 32]);
    }

    #[test]
    fn nonce_ttl_is_shorter_for_high_risk_purposes() {
        let ttls = NonceTtls::default();
        assert_eq!(ttls.ttl_for("mnemonic_reveal"), Duration::from_secs(120));
        assert_eq!(ttls.ttl_for("deposit"), Duration::from_secs(300));
    }
}
