//! # protocol-core
//!
//! Protocol Client Core: the subsystem that lets a custodial trading agent
//! derive protocol PDAs, build and sign raw program instructions, decode
//! on-chain positions, manage agent keys under authenticated encryption,
//! and reconcile local bookkeeping against on-chain truth for a
//! perpetuals-futures protocol.
//!
//! This crate never holds end-user wallet keys. It only ever holds the
//! agent subkey it generates for a user (see [`wallet`]).
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use protocol_core::address;
//! use solana_sdk::pubkey::Pubkey;
//!
//! let authority = Pubkey::new_unique();
//! let (user_pda, _bump) = address::user_pda(&authority, 0, &protocol_core::PROGRAM_ID);
//! ```

pub mod address;
pub mod config;
pub mod crypto;
pub mod decode;
pub mod error;
pub mod executor;
pub mod instructions;
pub mod ipc;
pub mod metrics;
pub mod oracle;
pub mod orchestrator;
pub mod reconciler;
pub mod reconciliation;
pub mod rpc;
pub mod store;
pub mod subaccount;
pub mod wallet;

use solana_sdk::pubkey::Pubkey;

/// The on-chain perpetuals program this core targets. The design is
/// program-agnostic (see [`config::CoreConfig`]), but a concrete default is
/// needed for tests and for callers who don't override it.
pub const PROGRAM_ID: Pubkey = solana_sdk::pubkey!("dRiftyHA39MWEi3m9aunc5MzRF1JYuBsbn6VPcn33UH");

/// Number of spot position slots in a `User` account.
pub const SPOT_POSITIONS: usize = 8;
/// Number of perp position slots in a `User` account.
pub const PERP_POSITIONS: usize = 8;

pub use error::ErrorKind;
