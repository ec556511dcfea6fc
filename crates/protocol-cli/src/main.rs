//! Protocol CLI: a thin `clap` front end over `protocol-core`.
//!
//! `execute` is the out-of-process worker C9/C11 spawn as a child — one
//! `IpcCommand` JSON line in on stdin, one `IpcResponse` JSON line out on
//! stdout, exit code 0 regardless of `success`. `derive-address` and
//! `decode-account` are operational debugging subcommands.

use std::io::{self, BufRead, Write};
use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use protocol_core::address;
use protocol_core::config::CoreConfig;
use protocol_core::crypto::{aead_decrypt, build_aad, derive_subkey, RecordType};
use protocol_core::decode::{decode_spot_market_oracle, decode_user};
use protocol_core::ipc::{validate_command, IpcAction, IpcCommand, IpcResponse};
use protocol_core::oracle::OracleResolver;
use protocol_core::orchestrator::{FeeFloor, Orchestrator};
use protocol_core::rpc::SolanaRpc;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tracing::warn;

#[derive(Parser)]
#[command(name = "protocol-cli")]
#[command(about = "Protocol client core CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// RPC URL used by `execute`. Ignored by `derive-address`/`decode-account`.
    #[arg(long, env = "RPC_URL", default_value = "https://api.mainnet-beta.solana.com")]
    rpc_url: String,

    /// Program id to derive addresses against; defaults to the core's
    /// built-in target program.
    #[arg(long, env = "PROGRAM_ID")]
    program_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read one `IpcCommand` JSON line from stdin, execute it, write one
    /// `IpcResponse` JSON line to stdout (§4.11).
    Execute,
    /// Derive and print a program-derived address.
    DeriveAddress {
        #[command(subcommand)]
        kind: DeriveAddressKind,
    },
    /// Decode a base64-encoded account's bytes and print the result as JSON.
    DecodeAccount {
        #[command(subcommand)]
        kind: DecodeAccountKind,
    },
}

#[derive(Subcommand)]
enum DeriveAddressKind {
    State,
    User { authority: String, sub_account_id: u16 },
    UserStats { authority: String },
    SpotMarket { market_index: u16 },
    SpotMarketVault { market_index: u16 },
    PerpMarket { market_index: u16 },
    DriftSigner,
    ReferrerName { name: String },
}

#[derive(Subcommand)]
enum DecodeAccountKind {
    /// Decode a `User` account's bytes (base64).
    User { data_base64: String },
    /// Decode a `SpotMarket` account's oracle pubkey (base64).
    SpotMarketOracle { data_base64: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let program_id = match &cli.program_id {
        Some(raw) => Pubkey::from_str(raw)?,
        None => protocol_core::PROGRAM_ID,
    };

    match cli.command {
        Commands::Execute => run_execute(&cli.rpc_url, program_id).await,
        Commands::DeriveAddress { kind } => run_derive_address(kind, program_id),
        Commands::DecodeAccount { kind } => run_decode_account(kind),
    }
}

fn run_derive_address(kind: DeriveAddressKind, program_id: Pubkey) -> anyhow::Result<()> {
    let (label, pda) = match kind {
        DeriveAddressKind::State => ("state".to_string(), address::state_pda(&program_id)),
        DeriveAddressKind::User { authority, sub_account_id } => {
            let authority = Pubkey::from_str(&authority)?;
            (format!("user({authority}, {sub_account_id})"), address::user_pda(&authority, sub_account_id, &program_id))
        }
        DeriveAddressKind::UserStats { authority } => {
            let authority = Pubkey::from_str(&authority)?;
            (format!("user_stats({authority})"), address::user_stats_pda(&authority, &program_id))
        }
        DeriveAddressKind::SpotMarket { market_index } => {
            (format!("spot_market({market_index})"), address::spot_market_pda(market_index, &program_id))
        }
        DeriveAddressKind::SpotMarketVault { market_index } => {
            (format!("spot_market_vault({market_index})"), address::spot_market_vault_pda(market_index, &program_id))
        }
        DeriveAddressKind::PerpMarket { market_index } => {
            (format!("perp_market({market_index})"), address::perp_market_pda(market_index, &program_id))
        }
        DeriveAddressKind::DriftSigner => ("drift_signer".to_string(), address::drift_signer_pda(&program_id)),
        DeriveAddressKind::ReferrerName { name } => {
            (format!("referrer_name({name})"), address::referrer_name_pda(&name, &program_id))
        }
    };

    println!("{label} = {} (bump {})", pda.0, pda.1);
    Ok(())
}

fn run_decode_account(kind: DecodeAccountKind) -> anyhow::Result<()> {
    use base64::Engine;

    match kind {
        DecodeAccountKind::User { data_base64 } => {
            let bytes = base64::engine::general_purpose::STANDARD.decode(data_base64)?;
            let user = decode_user(&bytes)?;
            let perp: Vec<_> = user
                .perp_positions
                .iter()
                .filter(|p| !p.is_flat())
                .map(|p| serde_json::json!({"market_index": p.market_index, "base_asset_amount": p.base_asset_amount}))
                .collect();
            println!(
                "{}",
                serde_json::json!({"authority": user.authority.to_string(), "perp_positions": perp})
            );
        }
        DecodeAccountKind::SpotMarketOracle { data_base64 } => {
            let bytes = base64::engine::general_purpose::STANDARD.decode(data_base64)?;
            let oracle = decode_spot_market_oracle(&bytes)?;
            println!("{}", serde_json::json!({"oracle": oracle.to_string()}));
        }
    }
    Ok(())
}

async fn run_execute(rpc_url: &str, program_id: Pubkey) -> anyhow::Result<()> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;

    let response = match serde_json::from_str::<IpcCommand>(line.trim()) {
        Ok(command) => handle_command(rpc_url, program_id, command).await,
        Err(err) => IpcResponse { success: false, signature: None, error: Some(format!("malformed command: {err}")), fill_price: None },
    };

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
    Ok(())
}

async fn handle_command(rpc_url: &str, program_id: Pubkey, command: IpcCommand) -> IpcResponse {
    if let Err(err) = validate_command(&command) {
        return IpcResponse { success: false, signature: None, error: Some(err.to_string()), fill_price: None };
    }

    let agent = match resolve_signer(&command) {
        Ok(keypair) => keypair,
        Err(err) => return IpcResponse { success: false, signature: None, error: Some(err), fill_price: None },
    };

    match command.action {
        IpcAction::Deposit => run_deposit(rpc_url, program_id, &agent, &command.payload).await,
        IpcAction::Trade | IpcAction::Close | IpcAction::SettlePnl | IpcAction::DeleteSubaccount => IpcResponse {
            success: false,
            signature: None,
            error: Some(format!(
                "{:?} is not implemented by this binary: perp order/settle/close wire schemas are a vendor-specific ProtocolClient this core does not pin",
                command.action
            )),
            fill_price: None,
        },
    }
}

/// `private_key_base58` is used as-is; `encrypted_private_key` is
/// decrypted with a session UMK passed through `AGENT_UMK_HEX` (64 hex
/// chars) — the only channel available to a one-shot child process that
/// never holds a live session of its own.
fn resolve_signer(command: &IpcCommand) -> Result<Keypair, String> {
    if let Some(raw) = &command.private_key_base58 {
        let bytes = bs58::decode(raw).into_vec().map_err(|err| format!("invalid base58 key: {err}"))?;
        return Keypair::from_bytes(&bytes).map_err(|err| format!("invalid keypair bytes: {err}"));
    }

    let envelope_b64 = command.encrypted_private_key.as_ref().expect("validate_command enforces exactly one key field");
    let wallet_raw = command
        .payload
        .get("wallet")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "payload.wallet is required to decrypt encrypted_private_key".to_string())?;
    let wallet = Pubkey::from_str(wallet_raw).map_err(|err| format!("invalid wallet pubkey: {err}"))?;

    let umk_hex = std::env::var("AGENT_UMK_HEX").map_err(|_| "AGENT_UMK_HEX not set".to_string())?;
    let umk = parse_hex_32(&umk_hex)?;

    use base64::Engine;
    let envelope = base64::engine::general_purpose::STANDARD
        .decode(envelope_b64)
        .map_err(|err| format!("invalid base64 envelope: {err}"))?;

    let subkey = derive_subkey(&umk, "agent_privkey");
    let aad = build_aad(&wallet.to_bytes(), RecordType::AgentPrivkey, 1);
    let secret_seed = aead_decrypt(&envelope, &subkey, &aad).map_err(|_| "failed to decrypt agent key".to_string())?;

    Keypair::from_bytes(&secret_seed).map_err(|err| format!("decrypted key is malformed: {err}"))
}

fn parse_hex_32(raw: &str) -> Result<[u8; 32], String> {
    if raw.len() != 64 || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err("AGENT_UMK_HEX must be exactly 64 hex characters".to_string());
    }
    let mut out = [0u8; 32];
    for (i, chunk) in raw.as_bytes().chunks(2).enumerate() {
        out[i] = u8::from_str_radix(std::str::from_utf8(chunk).expect("ascii"), 16).expect("hex checked above");
    }
    Ok(out)
}

async fn run_deposit(rpc_url: &str, program_id: Pubkey, agent: &Keypair, payload: &serde_json::Value) -> IpcResponse {
    let result = try_deposit(rpc_url, program_id, agent, payload).await;
    match result {
        Ok((signature, fill_price)) => IpcResponse { success: true, signature: Some(signature), error: None, fill_price },
        Err(err) => {
            warn!(%err, "execute deposit failed");
            IpcResponse { success: false, signature: None, error: Some(err), fill_price: None }
        }
    }
}

async fn try_deposit(
    rpc_url: &str,
    program_id: Pubkey,
    agent: &Keypair,
    payload: &serde_json::Value,
) -> Result<(String, Option<f64>), String> {
    let wallet = payload
        .get("wallet")
        .and_then(|v| v.as_str())
        .map(Pubkey::from_str)
        .transpose()
        .map_err(|err| format!("invalid wallet: {err}"))?
        .unwrap_or_else(|| agent.pubkey());
    let sub_account_id = payload.get("sub_account_id").and_then(|v| v.as_u64()).unwrap_or(0) as u16;
    let market_index = payload.get("market_index").and_then(|v| v.as_u64()).ok_or("payload.market_index is required")? as u16;
    let amount = payload.get("amount").and_then(|v| v.as_u64()).ok_or("payload.amount is required")?;
    let reduce_only = payload.get("reduce_only").and_then(|v| v.as_bool()).unwrap_or(false);
    let user_token_account = payload
        .get("user_token_account")
        .and_then(|v| v.as_str())
        .map(Pubkey::from_str)
        .transpose()
        .map_err(|err| format!("invalid user_token_account: {err}"))?
        .ok_or("payload.user_token_account is required")?;

    let config = CoreConfig::from_env().map_err(|err| err.to_string())?;
    let rpc = Arc::new(SolanaRpc::new(rpc_url.to_string()));
    let oracle = Arc::new(OracleResolver::for_environment(config.env, config.oracle_cache_ttl));
    let fee_floor = FeeFloor {
        min_lamports: (config.min_sol_for_fees * 1_000_000_000.0) as u64,
        allow_airdrop: config.env.allows_airdrop(),
        airdrop_lamports: (config.airdrop_amount_sol * 1_000_000_000.0) as u64,
    };

    let orchestrator = Orchestrator::new(rpc, null_store(), oracle, program_id, token_program_id(), fee_floor);

    let outcome = orchestrator
        .deposit(agent, &wallet, sub_account_id, market_index, amount, reduce_only, user_token_account, [0u8; 32], None)
        .await
        .map_err(|err| err.to_string())?;

    Ok((outcome.signature.unwrap_or_default(), None))
}

fn token_program_id() -> Pubkey {
    spl_token_2022::id()
}

fn null_store() -> Arc<NullStore> {
    Arc::new(NullStore::default())
}

/// A `StoreHandle` that discards every write. `execute` is a one-shot
/// child process with no durable state of its own (§4.11) — the parent
/// reconciles from the `IpcResponse` this binary returns.
#[derive(Default)]
struct NullStore;

#[async_trait::async_trait]
impl protocol_core::subaccount::SubaccountStore for NullStore {
    async fn allocated_in_store(&self, _wallet: &Pubkey) -> std::collections::BTreeSet<u16> {
        std::collections::BTreeSet::new()
    }
}

#[async_trait::async_trait]
impl protocol_core::store::StoreHandle for NullStore {
    async fn upsert_local_position(
        &self,
        _wallet: &Pubkey,
        _sub_account_id: u16,
        _market_index: u16,
        _position: protocol_core::reconciler::LocalPosition,
    ) {
    }

    async fn get_local_position(
        &self,
        _wallet: &Pubkey,
        _sub_account_id: u16,
        _market_index: u16,
    ) -> Option<protocol_core::reconciler::LocalPosition> {
        None
    }

    async fn active_bots(&self) -> Vec<protocol_core::store::ActiveBotRef> {
        Vec::new()
    }

    async fn record_equity_event(&self, _event: protocol_core::store::EquityEvent) {}

    async fn upsert_retry_job(&self, _job: protocol_core::store::RetryJob) {}
}
