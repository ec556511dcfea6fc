//! Account Decoder (C4): typed decode of `User` accounts (spot/perp
//! positions) and `SpotMarket` accounts.

use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::address::{perp_position_layout, spot_market_layout, spot_position_layout, user_account_layout};
use crate::{PERP_POSITIONS, SPOT_POSITIONS};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("account too short: got {got} bytes, need at least {want}")]
    TooShort { got: usize, want: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceType {
    Deposit,
    Borrow,
}

impl BalanceType {
    fn from_u8(tag: u8) -> Self {
        if tag == 0 { BalanceType::Deposit } else { BalanceType::Borrow }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpotPosition {
    pub scaled_balance: u64,
    pub open_bids: i64,
    pub open_asks: i64,
    pub cumulative_deposits: i64,
    pub market_index: u16,
    pub balance_type: BalanceType,
    pub open_orders: u8,
}

/// Sign of `base_asset_amount` encodes side: positive = LONG, negative = SHORT (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerpPosition {
    pub base_asset_amount: i64,
    pub quote_asset_amount: i64,
    pub quote_entry_amount: i64,
    pub quote_break_even_amount: i64,
    pub market_index: u16,
}

impl PerpPosition {
    pub fn is_long(&self) -> bool {
        self.base_asset_amount > 0
    }

    pub fn is_flat(&self) -> bool {
        self.base_asset_amount == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub authority: Pubkey,
    pub delegate: Pubkey,
    pub name: [u8; 32],
    pub spot_positions: [SpotPosition; SPOT_POSITIONS],
    pub perp_positions: [PerpPosition; PERP_POSITIONS],
}

/// `decode_user(bytes) -> UserAccount` (§4.4). Robust against version
/// skew: only a minimum length is enforced, and unknown trailing bytes
/// past the last perp-position record are ignored.
pub fn decode_user(bytes: &[u8]) -> Result<UserAccount, DecodeError> {
    use user_account_layout as l;

    if bytes.len() < l::MIN_ACCOUNT_LEN {
        return Err(DecodeError::TooShort { got: bytes.len(), want: l::MIN_ACCOUNT_LEN });
    }

    let authority = Pubkey::try_from(&bytes[l::AUTHORITY_OFFSET..l::AUTHORITY_OFFSET + 32])
        .expect("slice is exactly 32 bytes");
    let delegate = Pubkey::try_from(&bytes[l::DELEGATE_OFFSET..l::DELEGATE_OFFSET + 32])
        .expect("slice is exactly 32 bytes");
    let mut name = [0u8; 32];
    name.copy_from_slice(&bytes[l::NAME_OFFSET..l::NAME_OFFSET + l::NAME_LEN]);

    let mut spot_positions = [SpotPosition {
        scaled_balance: 0,
        open_bids: 0,
        open_asks: 0,
        cumulative_deposits: 0,
        market_index: 0,
        balance_type: BalanceType::Deposit,
        open_orders: 0,
    }; SPOT_POSITIONS];
    for (i, slot) in spot_positions.iter_mut().enumerate() {
        let base = l::SPOT_POSITIONS_OFFSET + i * l::SPOT_POSITION_LEN;
        *slot = decode_spot_position(&bytes[base..base + l::SPOT_POSITION_LEN]);
    }

    let mut perp_positions = [PerpPosition {
        base_asset_amount: 0,
        quote_asset_amount: 0,
        quote_entry_amount: 0,
        quote_break_even_amount: 0,
        market_index: 0,
    }; PERP_POSITIONS];
    for (i, slot) in perp_positions.iter_mut().enumerate() {
        let base = l::PERP_POSITIONS_OFFSET + i * l::PERP_POSITION_LEN;
        *slot = decode_perp_position(&bytes[base..base + l::PERP_POSITION_LEN]);
    }

    Ok(UserAccount { authority, delegate, name, spot_positions, perp_positions })
}

fn decode_spot_position(record: &[u8]) -> SpotPosition {
    use spot_position_layout as l;
    SpotPosition {
        scaled_balance: read_u64(record, l::SCALED_BALANCE_OFFSET),
        open_bids: read_i64(record, l::OPEN_BIDS_OFFSET),
        open_asks: read_i64(record, l::OPEN_ASKS_OFFSET),
        cumulative_deposits: read_i64(record, l::CUMULATIVE_DEPOSITS_OFFSET),
        market_index: read_u16(record, l::MARKET_INDEX_OFFSET),
        balance_type: BalanceType::from_u8(record[l::BALANCE_TYPE_OFFSET]),
        open_orders: record[l::OPEN_ORDERS_OFFSET],
    }
}

fn decode_perp_position(record: &[u8]) -> PerpPosition {
    use perp_position_layout as l;
    PerpPosition {
        base_asset_amount: read_i64(record, l::BASE_ASSET_AMOUNT_OFFSET),
        quote_asset_amount: read_i64(record, l::QUOTE_ASSET_AMOUNT_OFFSET),
        quote_break_even_amount: read_i64(record, l::QUOTE_BREAK_EVEN_AMOUNT_OFFSET),
        quote_entry_amount: read_i64(record, l::QUOTE_ENTRY_AMOUNT_OFFSET),
        market_index: read_u16(record, l::MARKET_INDEX_OFFSET),
    }
}

/// `decode_spot_market_oracle(bytes) -> pubkey` at offset 40 (§4.4).
pub fn decode_spot_market_oracle(bytes: &[u8]) -> Result<Pubkey, DecodeError> {
    let want = spot_market_layout::ORACLE_OFFSET + 32;
    if bytes.len() < want {
        return Err(DecodeError::TooShort { got: bytes.len(), want });
    }
    Ok(Pubkey::try_from(&bytes[spot_market_layout::ORACLE_OFFSET..want]).expect("slice is 32 bytes"))
}

/// `decode_spot_market_cumulative_deposit_interest(bytes) -> u128` at
/// offset 464, a u128 field (§4.2).
///
/// i128/u128 reads are done as two 64-bit limbs (§4.4): when the high
/// limb is zero the value fits in u64 and callers can use it directly
/// without promoting to a 128-bit type.
pub fn decode_spot_market_cumulative_deposit_interest(bytes: &[u8]) -> Result<u128, DecodeError> {
    let offset = spot_market_layout::CUMULATIVE_DEPOSIT_INTEREST_OFFSET;
    let want = offset + 16;
    if bytes.len() < want {
        return Err(DecodeError::TooShort { got: bytes.len(), want });
    }
    let low = read_u64(bytes, offset);
    let high = read_u64(bytes, offset + 8);
    Ok(combine_limbs(low, high))
}

/// Combine a little-endian `(low, high)` 64-bit limb pair into a u128.
pub fn combine_limbs(low: u64, high: u64) -> u128 {
    (u128::from(high) << 64) | u128::from(low)
}

/// `compute_spot_ui_amount(scaled_balance, cumulative_deposit_interest)
/// -> decimal`: `(scaled_balance × interest) / 1e9 / 1e10`, carrying
/// remainder for display precision (§4.4).
pub fn compute_spot_ui_amount(scaled_balance: u64, cumulative_deposit_interest: u128) -> Decimal {
    let balance = Decimal::from(scaled_balance);
    let interest = u128_to_decimal(cumulative_deposit_interest);
    let balance_precision = Decimal::from(1_000_000_000u64); // 1e9
    let interest_precision = Decimal::from(10_000_000_000u64); // 1e10
    balance * interest / balance_precision / interest_precision
}

fn u128_to_decimal(value: u128) -> Decimal {
    match u64::try_from(value) {
        Ok(v) => Decimal::from(v),
        Err(_) => value
            .to_string()
            .parse()
            .expect("cumulative deposit interest magnitudes fit Decimal's 96-bit range in practice"),
    }
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(bytes[offset..offset + 2].try_into().expect("2-byte slice"))
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + 8].try_into().expect("8-byte slice"))
}

fn read_i64(bytes: &[u8], offset: usize) -> i64 {
    i64::from_le_bytes(bytes[offset..offset + 8].try_into().expect("8-byte slice"))
}
