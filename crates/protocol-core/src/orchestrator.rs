//! Transaction Orchestrator (C8): composes instructions, fetches a
//! blockhash, signs, submits, confirms, and classifies errors for each
//! caller-level operation (deposit, withdraw, transfer, open, close,
//! close-subaccount).

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::Transaction;
use tracing::{info, warn};

use crate::address::{drift_signer_pda, spot_market_pda, spot_market_vault_pda, state_pda, user_pda, user_stats_pda};
use crate::error::{classify_rpc_error, ErrorKind};
use crate::instructions::{
    deposit as build_deposit, initialize_user, initialize_user_stats, transfer_deposit as build_transfer_deposit,
    withdraw as build_withdraw, DepositAccounts, InitializeUserAccounts, InitializeUserStatsAccounts,
    TransferDepositAccounts, WithdrawAccounts,
};
use crate::metrics;
use crate::oracle::{OracleKey, OracleResolver};
use crate::reconciler::{apply_fill, Fill, LocalPosition};
use crate::rpc::{ConfirmationRequest, RpcError, RpcReader, RpcWriter, SendOptions};
use crate::store::{EquityEvent, StoreHandle};

/// Disk-free pause inserted after a fresh `initialize_user` confirmation
/// and before the first subsequent read/write against that account, to
/// defeat observed RPC read-after-write lag (§5, scenario S1).
const INIT_READ_AFTER_WRITE_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

/// Minimum confirmed-on-chain native-token balance required before any
/// transaction is attempted (§4.8 step 1, §6 `MIN_SOL_FOR_FEES`).
#[derive(Debug, Clone, Copy)]
pub struct FeeFloor {
    pub min_lamports: u64,
    pub allow_airdrop: bool,
    pub airdrop_lamports: u64,
}

pub struct Orchestrator<R: RpcReader + RpcWriter, S: StoreHandle> {
    rpc: Arc<R>,
    store: Arc<S>,
    oracle: Arc<OracleResolver>,
    program_id: Pubkey,
    token_program: Pubkey,
    fee_floor: FeeFloor,
}

/// Outcome of one caller-level operation (§7): either a confirmed
/// signature or a classified error with detail, matching the
/// `{ok: sig} | {err: kind, detail, suggested_action?}` surface.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub signature: Option<String>,
    pub init_signature: Option<String>,
}

impl<R: RpcReader + RpcWriter, S: StoreHandle> Orchestrator<R, S> {
    pub fn new(
        rpc: Arc<R>,
        store: Arc<S>,
        oracle: Arc<OracleResolver>,
        program_id: Pubkey,
        token_program: Pubkey,
        fee_floor: FeeFloor,
    ) -> Self {
        Self { rpc, store, oracle, program_id, token_program, fee_floor }
    }

    /// §4.8 step 1: verify the agent has enough native token for fees.
    /// On devnet, request a single airdrop before surfacing failure; on
    /// mainnet, surface `InsufficientGas` immediately.
    async fn ensure_fee_balance(&self, agent_address: &Pubkey) -> Result<(), ErrorKind> {
        let balance = self.rpc.get_balance(agent_address).await.map_err(map_rpc_error)?;
        if balance >= self.fee_floor.min_lamports {
            return Ok(());
        }
        if !self.fee_floor.allow_airdrop {
            return Err(ErrorKind::InsufficientGas {
                detail: format!("agent balance {balance} lamports below floor {}", self.fee_floor.min_lamports),
            });
        }
        self.rpc
            .request_airdrop(agent_address, self.fee_floor.airdrop_lamports)
            .await
            .map_err(map_rpc_error)?;
        let balance_after = self.rpc.get_balance(agent_address).await.map_err(map_rpc_error)?;
        if balance_after >= self.fee_floor.min_lamports {
            Ok(())
        } else {
            Err(ErrorKind::InsufficientGas { detail: "airdrop did not raise balance above floor".into() })
        }
    }

    /// §4.8 step 2: send an idempotent `initialize_user_stats` +
    /// `initialize_user` transaction. `AccountAlreadyInitialized` is
    /// treated as success (RPC-cache race), matching scenario S6.
    async fn ensure_initialized(
        &self,
        agent: &Keypair,
        sub_account_id: u16,
        name: [u8; 32],
        referrer: Option<(Pubkey, Pubkey)>,
    ) -> Result<Option<String>, ErrorKind> {
        let authority = agent.pubkey();
        let (state, _) = state_pda(&self.program_id);
        let (user, _) = user_pda(&authority, sub_account_id, &self.program_id);

        if matches!(self.rpc.get_account(&user).await, Ok(Some(_))) {
            return Ok(None);
        }

        let (user_stats, _) = user_stats_pda(&authority, &self.program_id);

        let mut instructions = vec![];
        if sub_account_id == 0 {
            instructions.push(initialize_user_stats(
                self.program_id,
                InitializeUserStatsAccounts { user_stats, state, authority, payer: authority },
            ));
        }
        instructions.push(initialize_user(
            self.program_id,
            sub_account_id,
            name,
            InitializeUserAccounts { user, user_stats, state, authority, payer: authority, referrer },
        ));

        // Initialization skips preflight (§4.8 step 4) to bypass stale
        // simulator state right after a fresh user-stats creation.
        match self.submit_and_confirm(agent, instructions, SendOptions { skip_preflight: true }).await {
            Ok(sig) => Ok(Some(sig)),
            Err(ErrorKind::AccountAlreadyInitialized) => {
                info!("init race: account already initialized, treating as success");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// `deposit(market_index, amount, reduce_only)` end to end (§4.8,
    /// scenario S1).
    #[allow(clippy::too_many_arguments)]
    pub async fn deposit(
        &self,
        agent: &Keypair,
        wallet: &Pubkey,
        sub_account_id: u16,
        market_index: u16,
        amount: u64,
        reduce_only: bool,
        user_token_account: Pubkey,
        name: [u8; 32],
        referrer: Option<(Pubkey, Pubkey)>,
    ) -> Result<OperationOutcome, ErrorKind> {
        self.ensure_fee_balance(&agent.pubkey()).await?;
        let init_signature = self.ensure_initialized(agent, sub_account_id, name, referrer).await?;
        if init_signature.is_some() {
            // §5: a fresh init transaction just landed; give the RPC's
            // read path time to catch up before the first read/write
            // against the new user account (scenario S1's "2 s pause").
            tokio::time::sleep(INIT_READ_AFTER_WRITE_DELAY).await;
        }

        let authority = agent.pubkey();
        let (state, _) = state_pda(&self.program_id);
        let (user, _) = user_pda(&authority, sub_account_id, &self.program_id);
        let (user_stats, _) = user_stats_pda(&authority, &self.program_id);
        let (spot_market, _) = spot_market_pda(market_index, &self.program_id);
        let (spot_market_vault, _) = spot_market_vault_pda(market_index, &self.program_id);
        let oracle = self.oracle.resolve(OracleKey { market_pda: spot_market, market_index }, self.rpc.as_ref()).await;

        let ix = build_deposit(
            self.program_id,
            market_index,
            amount,
            reduce_only,
            DepositAccounts {
                state,
                user,
                user_stats,
                authority,
                spot_market_vault,
                user_token_account,
                token_program: self.token_program,
                oracle,
                spot_market,
            },
        );

        let signature =
            self.submit_and_confirm(agent, vec![ix], SendOptions { skip_preflight: false }).await?;

        self.on_operation_confirmed(
            wallet,
            sub_account_id,
            market_index,
            Decimal::from(amount) / Decimal::from(1_000_000u64),
            None,
            Decimal::ZERO,
            signature.clone(),
        )
        .await;
        metrics::increment_operation_success("deposit");
        Ok(OperationOutcome { signature: Some(signature), init_signature })
    }

    /// `withdraw(market_index, amount, reduce_only)` end to end (§4.8).
    #[allow(clippy::too_many_arguments)]
    pub async fn withdraw(
        &self,
        agent: &Keypair,
        wallet: &Pubkey,
        sub_account_id: u16,
        market_index: u16,
        amount: u64,
        reduce_only: bool,
        user_token_account: Pubkey,
    ) -> Result<OperationOutcome, ErrorKind> {
        self.ensure_fee_balance(&agent.pubkey()).await?;

        let authority = agent.pubkey();
        let (state, _) = state_pda(&self.program_id);
        let (user, _) = user_pda(&authority, sub_account_id, &self.program_id);
        let (user_stats, _) = user_stats_pda(&authority, &self.program_id);
        let (spot_market, _) = spot_market_pda(market_index, &self.program_id);
        let (spot_market_vault, _) = spot_market_vault_pda(market_index, &self.program_id);
        let (drift_signer, _) = drift_signer_pda(&self.program_id);
        let oracle = self.oracle.resolve(OracleKey { market_pda: spot_market, market_index }, self.rpc.as_ref()).await;

        let ix = build_withdraw(
            self.program_id,
            market_index,
            amount,
            reduce_only,
            WithdrawAccounts {
                state,
                user,
                user_stats,
                authority,
                spot_market_vault,
                drift_signer,
                user_token_account,
                token_program: self.token_program,
                oracle,
                spot_market,
            },
        );

        let signature =
            self.submit_and_confirm(agent, vec![ix], SendOptions { skip_preflight: false }).await?;

        self.on_operation_confirmed(
            wallet,
            sub_account_id,
            market_index,
            -(Decimal::from(amount) / Decimal::from(1_000_000u64)),
            None,
            Decimal::ZERO,
            signature.clone(),
        )
        .await;
        metrics::increment_operation_success("withdraw");
        Ok(OperationOutcome { signature: Some(signature), init_signature: None })
    }

    /// `transfer_deposit(market_index, amount)` between two subaccounts
    /// of the same authority (§4.3, §4.8).
    pub async fn transfer_deposit(
        &self,
        agent: &Keypair,
        market_index: u16,
        amount: u64,
        from_sub_account_id: u16,
        to_sub_account_id: u16,
    ) -> Result<OperationOutcome, ErrorKind> {
        self.ensure_fee_balance(&agent.pubkey()).await?;

        let authority = agent.pubkey();
        let (state, _) = state_pda(&self.program_id);
        let (from_user, _) = user_pda(&authority, from_sub_account_id, &self.program_id);
        let (to_user, _) = user_pda(&authority, to_sub_account_id, &self.program_id);
        let (user_stats, _) = user_stats_pda(&authority, &self.program_id);
        let (spot_market, _) = spot_market_pda(market_index, &self.program_id);

        let ix = build_transfer_deposit(
            self.program_id,
            market_index,
            amount,
            TransferDepositAccounts { from_user, to_user, user_stats, authority, state, spot_market },
        );

        let signature =
            self.submit_and_confirm(agent, vec![ix], SendOptions { skip_preflight: false }).await?;
        metrics::increment_operation_success("transfer_deposit");
        Ok(OperationOutcome { signature: Some(signature), init_signature: None })
    }

    /// §4.8 steps 3-5: build instructions were already done by the
    /// caller; this signs with the agent key, fetches a fresh blockhash,
    /// submits, and confirms by `(signature, blockhash,
    /// last_valid_block_height)`, treating `value.err == null` as
    /// success.
    async fn submit_and_confirm(
        &self,
        agent: &Keypair,
        instructions: Vec<Instruction>,
        opts: SendOptions,
    ) -> Result<String, ErrorKind> {
        let started = Instant::now();
        let blockhash_info = self.rpc.get_latest_blockhash().await.map_err(map_rpc_error)?;
        metrics::record_rpc_latency("get_latest_blockhash", started.elapsed());

        let mut tx = Transaction::new_with_payer(&instructions, Some(&agent.pubkey()));
        tx.sign(&[agent], blockhash_info.blockhash);

        let wire_bytes = bincode::serialize(&tx).map_err(|err| {
            warn!(error = %err, "failed to serialize transaction");
            ErrorKind::TransactionFailed { code: None }
        })?;

        let send_started = Instant::now();
        let signature = self.rpc.send_raw_transaction(&wire_bytes, opts).await.map_err(map_rpc_error)?;
        metrics::record_rpc_latency("send_raw_transaction", send_started.elapsed());

        let confirmed = self
            .rpc
            .confirm_transaction(ConfirmationRequest {
                signature,
                blockhash: blockhash_info.blockhash,
                last_valid_block_height: blockhash_info.last_valid_block_height,
            })
            .await
            .map_err(map_rpc_error)?;

        if !confirmed {
            let err = ErrorKind::TransactionFailed { code: None };
            metrics::increment_error_kind(&err);
            return Err(err);
        }
        Ok(signature.to_string())
    }

    /// §4.8 step 6: on success, feed the fill into the reconciler (C10)
    /// and persist the updated local mirror plus an `EquityEvent`.
    #[allow(clippy::too_many_arguments)]
    async fn on_operation_confirmed(
        &self,
        wallet: &Pubkey,
        sub_account_id: u16,
        market_index: u16,
        delta_base: Decimal,
        fill_price: Option<Decimal>,
        fee: Decimal,
        trade_id: String,
    ) {
        let prior = self
            .store
            .get_local_position(wallet, sub_account_id, market_index)
            .await
            .unwrap_or_else(LocalPosition::flat);
        let price = fill_price.unwrap_or(Decimal::ONE);
        let fill = Fill { delta: delta_base, price, fee };
        let updated = apply_fill(&prior, fill, trade_id.clone(), now_unix_seconds());

        self.store.upsert_local_position(wallet, sub_account_id, market_index, updated).await;
        self.store
            .record_equity_event(EquityEvent {
                wallet: *wallet,
                sub_account_id,
                market_index,
                delta_base,
                fill_price,
                fee,
                trade_id,
                trade_at: now_unix_seconds(),
            })
            .await;
    }
}

/// Wall-clock seconds since epoch for bookkeeping timestamps. Isolated in
/// one place so a deterministic clock can be substituted in tests.
fn now_unix_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn map_rpc_error(err: RpcError) -> ErrorKind {
    match err {
        RpcError::Timeout => ErrorKind::Timeout,
        RpcError::AccountNotFound => ErrorKind::AccountNotInitialized,
        RpcError::Transport(message) => {
            warn!(%message, "rpc transport error during orchestration");
            classify_rpc_error(&message)
        }
    }
}
