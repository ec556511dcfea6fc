//! The RPC client interface this core consumes (§6), and a thin async
//! wrapper over `solana-client`'s nonblocking client that implements it.
//!
//! The RPC transport itself is explicitly out of scope (§1); this module
//! exists only to pin down the typed contract the rest of the crate
//! depends on, so components can be tested against an in-memory fake
//! without a live validator.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient as SolanaRpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::account::Account;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum RpcError {
    #[error("account not found")]
    AccountNotFound,
    #[error("rpc call timed out")]
    Timeout,
    #[error("rpc transport error: {0}")]
    Transport(String),
}

/// A minimal, owned account view — decoupled from `solana_sdk::Account`
/// so in-memory fakes don't need to construct a full SDK type.
#[derive(Debug, Clone)]
pub struct RpcAccount {
    pub data: Vec<u8>,
    pub owner: Pubkey,
    pub lamports: u64,
}

impl From<Account> for RpcAccount {
    fn from(account: Account) -> Self {
        Self { data: account.data, owner: account.owner, lamports: account.lamports }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BlockhashInfo {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    pub skip_preflight: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ConfirmationRequest {
    pub signature: Signature,
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// The read/write RPC surface (§6). Consumed by C5/C8/C9/C13; never
/// implemented by them.
#[async_trait]
pub trait RpcReader: Send + Sync {
    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<RpcAccount>, RpcError>;

    async fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<Option<RpcAccount>>, RpcError> {
        let mut out = Vec::with_capacity(pubkeys.len());
        for pubkey in pubkeys {
            out.push(self.get_account(pubkey).await?);
        }
        Ok(out)
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, RpcError>;

    async fn get_token_account_balance(&self, pubkey: &Pubkey) -> Result<u64, RpcError>;

    async fn get_slot(&self, commitment: CommitmentConfig) -> Result<u64, RpcError>;
}

#[async_trait]
pub trait RpcWriter: Send + Sync {
    async fn get_latest_blockhash(&self) -> Result<BlockhashInfo, RpcError>;

    async fn send_raw_transaction(
        &self,
        wire_bytes: &[u8],
        opts: SendOptions,
    ) -> Result<Signature, RpcError>;

    async fn confirm_transaction(&self, request: ConfirmationRequest) -> Result<bool, RpcError>;

    async fn request_airdrop(&self, pubkey: &Pubkey, lamports: u64) -> Result<Signature, RpcError>;
}

/// Production implementation backed by `solana-client`'s nonblocking
/// `RpcClient`.
pub struct SolanaRpc {
    inner: SolanaRpcClient,
}

impl SolanaRpc {
    pub fn new(url: String) -> Self {
        Self { inner: SolanaRpcClient::new(url) }
    }

    pub fn new_with_commitment(url: String, commitment: CommitmentConfig) -> Self {
        Self { inner: SolanaRpcClient::new_with_commitment(url, commitment) }
    }
}

#[async_trait]
impl RpcReader for SolanaRpc {
    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<RpcAccount>, RpcError> {
        match self.inner.get_account(pubkey).await {
            Ok(account) => Ok(Some(account.into())),
            Err(err) if err.to_string().contains("AccountNotFound") => Ok(None),
            Err(err) => Err(RpcError::Transport(err.to_string())),
        }
    }

    async fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<Option<RpcAccount>>, RpcError> {
        let accounts = self
            .inner
            .get_multiple_accounts(pubkeys)
            .await
            .map_err(|err| RpcError::Transport(err.to_string()))?;
        Ok(accounts.into_iter().map(|maybe| maybe.map(RpcAccount::from)).collect())
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, RpcError> {
        self.inner.get_balance(pubkey).await.map_err(|err| RpcError::Transport(err.to_string()))
    }

    async fn get_token_account_balance(&self, pubkey: &Pubkey) -> Result<u64, RpcError> {
        let balance = self
            .inner
            .get_token_account_balance(pubkey)
            .await
            .map_err(|err| RpcError::Transport(err.to_string()))?;
        balance.amount.parse().map_err(|_| RpcError::Transport("non-numeric token amount".into()))
    }

    async fn get_slot(&self, commitment: CommitmentConfig) -> Result<u64, RpcError> {
        self.inner
            .get_slot_with_commitment(commitment)
            .await
            .map_err(|err| RpcError::Transport(err.to_string()))
    }
}

#[async_trait]
impl RpcWriter for SolanaRpc {
    async fn get_latest_blockhash(&self) -> Result<BlockhashInfo, RpcError> {
        let (blockhash, last_valid_block_height) = self
            .inner
            .get_latest_blockhash_with_commitment(CommitmentConfig::confirmed())
            .await
            .map_err(|err| RpcError::Transport(err.to_string()))?;
        Ok(BlockhashInfo { blockhash, last_valid_block_height })
    }

    async fn send_raw_transaction(
        &self,
        wire_bytes: &[u8],
        opts: SendOptions,
    ) -> Result<Signature, RpcError> {
        let config = RpcSendTransactionConfig { skip_preflight: opts.skip_preflight, ..Default::default() };
        self.inner
            .send_raw_transaction_with_config(wire_bytes, config)
            .await
            .map_err(|err| RpcError::Transport(err.to_string()))
    }

    async fn confirm_transaction(&self, request: ConfirmationRequest) -> Result<bool, RpcError> {
        // `value.err == null` is success (§4.8 step 5): a transaction
        // that landed without an on-chain error confirms `true`.
        self.inner
            .confirm_transaction_with_commitment(&request.signature, CommitmentConfig::confirmed())
            .await
            .map(|response| response.value)
            .map_err(|err| RpcError::Transport(err.to_string()))
    }

    async fn request_airdrop(&self, pubkey: &Pubkey, lamports: u64) -> Result<Signature, RpcError> {
        self.inner
            .request_airdrop(pubkey, lamports)
            .await
            .map_err(|err| RpcError::Transport(err.to_string()))
    }
}
