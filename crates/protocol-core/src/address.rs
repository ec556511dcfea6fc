//! PDA derivation, associated-token-account derivation, and the on-chain
//! account-byte-offset constants the decoder decodes against.

use solana_sdk::pubkey::Pubkey;

/// `state` PDA: `["drift_state"]`.
pub fn state_pda(program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[b"drift_state"], program_id)
}

/// `user(authority, sub_id)` PDA: `["user", authority_bytes, u16_le(sub_id)]`.
pub fn user_pda(authority: &Pubkey, sub_account_id: u16, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[b"user", authority.as_ref(), &sub_account_id.to_le_bytes()],
        program_id,
    )
}

/// `user_stats(authority)` PDA: `["user_stats", authority_bytes]`.
pub fn user_stats_pda(authority: &Pubkey, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[b"user_stats", authority.as_ref()], program_id)
}

/// `spot_market(index)` PDA: `["spot_market", u16_le(index)]`.
pub fn spot_market_pda(market_index: u16, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[b"spot_market", &market_index.to_le_bytes()], program_id)
}

/// `spot_market_vault(index)` PDA: `["spot_market_vault", u16_le(index)]`.
pub fn spot_market_vault_pda(market_index: u16, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[b"spot_market_vault", &market_index.to_le_bytes()], program_id)
}

/// `perp_market(index)` PDA: `["perp_market", u16_le(index)]`.
pub fn perp_market_pda(market_index: u16, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[b"perp_market", &market_index.to_le_bytes()], program_id)
}

/// `drift_signer` PDA: `["drift_signer"]`. Named for the literal account
/// role the program's `withdraw` instruction expects.
pub fn drift_signer_pda(program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[b"drift_signer"], program_id)
}

/// `referrer_name(encoded_name)` PDA: `["referrer_name", encoded_name(32)]`
/// where `encoded_name` pads to 32 bytes with ASCII space (0x20), not NUL.
pub fn referrer_name_pda(name: &str, program_id: &Pubkey) -> (Pubkey, u8) {
    let encoded = encode_referrer_name(name);
    Pubkey::find_program_address(&[b"referrer_name", &encoded], program_id)
}

/// Pad `name` to 32 bytes with ASCII space. Truncates names longer than
/// 32 bytes rather than panicking, since this is reachable from
/// user-influenced input (a referral code).
pub fn encode_referrer_name(name: &str) -> [u8; 32] {
    let mut out = [0x20u8; 32];
    let bytes = name.as_bytes();
    let n = bytes.len().min(32);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// Associated-token-account address for `(owner, mint)`, using the SPL
/// Associated Token Account program's standard derivation.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    spl_associated_token_account::get_associated_token_address(owner, mint)
}

/// Associated-token-account address for a Token-2022 mint.
pub fn associated_token_address_2022(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    spl_associated_token_account::get_associated_token_address_with_program_id(
        owner,
        mint,
        &spl_token_2022::id(),
    )
}

/// `User` account byte layout. Approximately 4376 bytes on-chain; decoders
/// validate length but tolerate trailing bytes (program version skew).
pub mod user_account_layout {
    pub const DISCRIMINATOR_LEN: usize = 8;
    pub const AUTHORITY_OFFSET: usize = 8;
    pub const DELEGATE_OFFSET: usize = 40;
    pub const NAME_OFFSET: usize = 72;
    pub const NAME_LEN: usize = 32;
    pub const SPOT_POSITIONS_OFFSET: usize = 104;
    pub const SPOT_POSITION_LEN: usize = 40;
    pub const SPOT_POSITIONS_COUNT: usize = 8;
    /// 8 bytes of padding after the spot-position array before the
    /// perp-position array begins.
    pub const SPOT_POSITIONS_PADDING: usize = 8;
    pub const PERP_POSITIONS_OFFSET: usize = 432;
    pub const PERP_POSITION_LEN: usize = 184;
    pub const PERP_POSITIONS_COUNT: usize = 8;

    /// Minimum byte length a `User` account must have to be decodable.
    pub const MIN_ACCOUNT_LEN: usize =
        PERP_POSITIONS_OFFSET + PERP_POSITION_LEN * PERP_POSITIONS_COUNT;
}

/// `SpotPosition` field offsets within its 40-byte record.
pub mod spot_position_layout {
    pub const SCALED_BALANCE_OFFSET: usize = 0;
    pub const OPEN_BIDS_OFFSET: usize = 8;
    pub const OPEN_ASKS_OFFSET: usize = 16;
    pub const CUMULATIVE_DEPOSITS_OFFSET: usize = 24;
    pub const MARKET_INDEX_OFFSET: usize = 32;
    pub const BALANCE_TYPE_OFFSET: usize = 34;
    pub const OPEN_ORDERS_OFFSET: usize = 35;
}

/// `PerpPosition` field offsets within its 184-byte record.
///
/// `MARKET_INDEX_OFFSET` is empirically 116 but not re-verified across
/// program versions; a production build should re-derive it from the
/// program IDL and fail startup on mismatch. This crate hardcodes it as a
/// named constant specifically so that re-derivation is a one-line change.
pub mod perp_position_layout {
    pub const BASE_ASSET_AMOUNT_OFFSET: usize = 0;
    pub const QUOTE_ASSET_AMOUNT_OFFSET: usize = 8;
    pub const QUOTE_BREAK_EVEN_AMOUNT_OFFSET: usize = 16;
    pub const QUOTE_ENTRY_AMOUNT_OFFSET: usize = 24;
    pub const MARKET_INDEX_OFFSET: usize = 116;
}

/// `SpotMarket` account field offsets.
pub mod spot_market_layout {
    pub const ORACLE_OFFSET: usize = 40;
    pub const CUMULATIVE_DEPOSIT_INTEREST_OFFSET: usize = 464;
}
