//! Anchor-style discriminators, little-endian argument encoding, and the
//! exact remaining-account ordering the on-chain program depends on.

use sha2::{Digest, Sha256};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::sysvar;

/// `data[0..8] = sha256("global:" ‖ snake_case_name)[0..8]`.
/// Anchor's "global" instruction-discriminator convention.
pub fn discriminator(snake_case_name: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(b"global:");
    hasher.update(snake_case_name.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[0..8]);
    out
}

/// Parameters identifying which accounts to wire into an instruction
/// that needs the system/token/rent context. Built by the caller from
/// PDA derivation and externally-supplied accounts (payer, token
/// accounts).
pub struct InitializeUserStatsAccounts {
    pub user_stats: Pubkey,
    pub state: Pubkey,
    pub authority: Pubkey,
    pub payer: Pubkey,
}

/// `initialize_user_stats`: args ∅.
pub fn initialize_user_stats(program_id: Pubkey, accounts: InitializeUserStatsAccounts) -> Instruction {
    let metas = vec![
        AccountMeta::new(accounts.user_stats, false),
        AccountMeta::new(accounts.state, false),
        AccountMeta::new_readonly(accounts.authority, false),
        AccountMeta::new(accounts.payer, true),
        AccountMeta::new_readonly(sysvar::rent::id(), false),
        AccountMeta::new_readonly(solana_sdk::system_program::id(), false),
    ];
    Instruction { program_id, accounts: metas, data: discriminator("initialize_user_stats").to_vec() }
}

pub struct InitializeUserAccounts {
    pub user: Pubkey,
    pub user_stats: Pubkey,
    pub state: Pubkey,
    pub authority: Pubkey,
    pub payer: Pubkey,
    /// Present only when `sub_account_id == 0` and a referrer is
    /// configured.
    pub referrer: Option<(Pubkey, Pubkey)>,
}

/// `initialize_user(sub_id: u16, name: [u8;32])`. For `sub_id == 0`
/// only, appends `(referrer_user(w), referrer_user_stats(w))` when a
/// referrer is configured.
pub fn initialize_user(
    program_id: Pubkey,
    sub_account_id: u16,
    name: [u8; 32],
    accounts: InitializeUserAccounts,
) -> Instruction {
    let mut metas = vec![
        AccountMeta::new(accounts.user, false),
        AccountMeta::new(accounts.user_stats, false),
        AccountMeta::new(accounts.state, false),
        AccountMeta::new_readonly(accounts.authority, false),
        AccountMeta::new(accounts.payer, true),
        AccountMeta::new_readonly(sysvar::rent::id(), false),
        AccountMeta::new_readonly(solana_sdk::system_program::id(), false),
    ];

    if sub_account_id == 0 {
        if let Some((referrer_user, referrer_user_stats)) = accounts.referrer {
            metas.push(AccountMeta::new(referrer_user, false));
            metas.push(AccountMeta::new(referrer_user_stats, false));
        }
    }

    let mut data = discriminator("initialize_user").to_vec();
    data.extend_from_slice(&sub_account_id.to_le_bytes());
    data.extend_from_slice(&name);
    Instruction { program_id, accounts: metas, data }
}

pub struct DepositAccounts {
    pub state: Pubkey,
    pub user: Pubkey,
    pub user_stats: Pubkey,
    pub authority: Pubkey,
    pub spot_market_vault: Pubkey,
    pub user_token_account: Pubkey,
    pub token_program: Pubkey,
    pub oracle: Pubkey,
    pub spot_market: Pubkey,
}

/// `deposit(market_index: u16, amount: u64, reduce_only: bool)`.
/// The trailing oracle-before-spot_market ordering is mandatory — the
/// 8th meta is oracle, the 9th is spot_market, both non-signer.
pub fn deposit(
    program_id: Pubkey,
    market_index: u16,
    amount: u64,
    reduce_only: bool,
    accounts: DepositAccounts,
) -> Instruction {
    let metas = vec![
        AccountMeta::new_readonly(accounts.state, false),
        AccountMeta::new(accounts.user, false),
        AccountMeta::new(accounts.user_stats, false),
        AccountMeta::new_readonly(accounts.authority, true),
        AccountMeta::new(accounts.spot_market_vault, false),
        AccountMeta::new(accounts.user_token_account, false),
        AccountMeta::new_readonly(accounts.token_program, false),
        AccountMeta::new_readonly(accounts.oracle, false),
        AccountMeta::new(accounts.spot_market, false),
    ];

    let mut data = discriminator("deposit").to_vec();
    data.extend_from_slice(&market_index.to_le_bytes());
    data.extend_from_slice(&amount.to_le_bytes());
    data.push(reduce_only as u8);
    Instruction { program_id, accounts: metas, data }
}

pub struct WithdrawAccounts {
    pub state: Pubkey,
    pub user: Pubkey,
    pub user_stats: Pubkey,
    pub authority: Pubkey,
    pub spot_market_vault: Pubkey,
    pub drift_signer: Pubkey,
    pub user_token_account: Pubkey,
    pub token_program: Pubkey,
    pub oracle: Pubkey,
    pub spot_market: Pubkey,
}

/// `withdraw(market_index: u16, amount: u64, reduce_only: bool)` (§4.3).
pub fn withdraw(
    program_id: Pubkey,
    market_index: u16,
    amount: u64,
    reduce_only: bool,
    accounts: WithdrawAccounts,
) -> Instruction {
    let metas = vec![
        AccountMeta::new_readonly(accounts.state, false),
        AccountMeta::new(accounts.user, false),
        AccountMeta::new(accounts.user_stats, false),
        AccountMeta::new_readonly(accounts.authority, true),
        AccountMeta::new(accounts.spot_market_vault, false),
        AccountMeta::new_readonly(accounts.drift_signer, false),
        AccountMeta::new(accounts.user_token_account, false),
        AccountMeta::new_readonly(accounts.token_program, false),
        AccountMeta::new_readonly(accounts.oracle, false),
        AccountMeta::new(accounts.spot_market, false),
    ];

    let mut data = discriminator("withdraw").to_vec();
    data.extend_from_slice(&market_index.to_le_bytes());
    data.extend_from_slice(&amount.to_le_bytes());
    data.push(reduce_only as u8);
    Instruction { program_id, accounts: metas, data }
}

pub struct TransferDepositAccounts {
    pub from_user: Pubkey,
    pub to_user: Pubkey,
    pub user_stats: Pubkey,
    pub authority: Pubkey,
    pub state: Pubkey,
    pub spot_market: Pubkey,
}

/// `transfer_deposit(market_index: u16, amount: u64, padding: u16=0)` (§4.3).
pub fn transfer_deposit(
    program_id: Pubkey,
    market_index: u16,
    amount: u64,
    accounts: TransferDepositAccounts,
) -> Instruction {
    let metas = vec![
        AccountMeta::new(accounts.from_user, false),
        AccountMeta::new(accounts.to_user, false),
        AccountMeta::new(accounts.user_stats, false),
        AccountMeta::new_readonly(accounts.authority, true),
        AccountMeta::new_readonly(accounts.state, false),
        AccountMeta::new(accounts.spot_market, false),
    ];

    let mut data = discriminator("transfer_deposit").to_vec();
    data.extend_from_slice(&market_index.to_le_bytes());
    data.extend_from_slice(&amount.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes()); // padding, always zero
    Instruction { program_id, accounts: metas, data }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pk() -> Pubkey {
        Pubkey::new_unique()
    }

    #[test]
    fn initialize_user_stats_uses_its_own_discriminator_not_initialize_users() {
        let ix = initialize_user_stats(
            pk(),
            InitializeUserStatsAccounts { user_stats: pk(), state: pk(), authority: pk(), payer: pk() },
        );
        assert_eq!(&ix.data[0..8], &discriminator("initialize_user_stats"));
        assert_ne!(&ix.data[0..8], &discriminator("initialize_user"));
    }

    #[test]
    fn deposit_discriminator_and_args_are_bit_exact() {
        let ix = deposit(
            pk(),
            7,
            123_456_789,
            true,
            DepositAccounts {
                state: pk(),
                user: pk(),
                user_stats: pk(),
                authority: pk(),
                spot_market_vault: pk(),
                user_token_account: pk(),
                token_program: pk(),
                oracle: pk(),
                spot_market: pk(),
            },
        );
        assert_eq!(&ix.data[0..8], &discriminator("deposit"));
        assert_eq!(&ix.data[8..10], &7u16.to_le_bytes());
        assert_eq!(&ix.data[10..18], &123_456_789u64.to_le_bytes());
        assert_eq!(ix.data[18], 1u8);
        assert_eq!(ix.data.len(), 19);
    }

    #[test]
    fn deposit_places_oracle_then_spot_market_as_metas_8_and_9() {
        let oracle = pk();
        let spot_market = pk();
        let ix = deposit(
            pk(),
            0,
            0,
            false,
            DepositAccounts {
                state: pk(),
                user: pk(),
                user_stats: pk(),
                authority: pk(),
                spot_market_vault: pk(),
                user_token_account: pk(),
                token_program: pk(),
                oracle,
                spot_market,
            },
        );
        assert_eq!(ix.accounts[7].pubkey, oracle);
        assert!(!ix.accounts[7].is_signer);
        assert_eq!(ix.accounts[8].pubkey, spot_market);
        assert!(!ix.accounts[8].is_signer);
    }

    #[test]
    fn withdraw_places_oracle_then_spot_market_as_metas_8_and_9() {
        let oracle = pk();
        let spot_market = pk();
        let ix = withdraw(
            pk(),
            1,
            10,
            false,
            WithdrawAccounts {
                state: pk(),
                user: pk(),
                user_stats: pk(),
                authority: pk(),
                spot_market_vault: pk(),
                drift_signer: pk(),
                user_token_account: pk(),
                token_program: pk(),
                oracle,
                spot_market,
            },
        );
        assert_eq!(ix.accounts[7].pubkey, oracle);
        assert_eq!(ix.accounts[8].pubkey, spot_market);
    }

    #[test]
    fn initialize_user_appends_referrer_metas_only_for_sub_account_zero() {
        let referrer_user = pk();
        let referrer_user_stats = pk();
        let with_referrer = initialize_user(
            pk(),
            0,
            [0u8; 32],
            InitializeUserAccounts {
                user: pk(),
                user_stats: pk(),
                state: pk(),
                authority: pk(),
                payer: pk(),
                referrer: Some((referrer_user, referrer_user_stats)),
            },
        );
        assert_eq!(with_referrer.accounts.len(), 9);
        assert_eq!(with_referrer.accounts[7].pubkey, referrer_user);
        assert_eq!(with_referrer.accounts[8].pubkey, referrer_user_stats);

        let non_zero_sub = initialize_user(
            pk(),
            1,
            [0u8; 32],
            InitializeUserAccounts {
                user: pk(),
                user_stats: pk(),
                state: pk(),
                authority: pk(),
                payer: pk(),
                referrer: Some((referrer_user, referrer_user_stats)),
            },
        );
        assert_eq!(non_zero_sub.accounts.len(), 7);
    }

    #[test]
    fn transfer_deposit_encodes_zero_padding() {
        let ix = transfer_deposit(
            pk(),
            2,
            500,
            TransferDepositAccounts {
                from_user: pk(),
                to_user: pk(),
                user_stats: pk(),
                authority: pk(),
                state: pk(),
                spot_market: pk(),
            },
        );
        assert_eq!(ix.data.len(), 8 + 2 + 8 + 2);
        assert_eq!(&ix.data[18..20], &0u16.to_le_bytes());
    }
}
