use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use protocol_core::reconciliation::{run_sweep, PairLocks};
use protocol_core::store::ActiveBotRef;

use crate::state::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

pub async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    (StatusCode::OK, state.metrics.render())
}

#[derive(Debug, Deserialize)]
pub struct RegisterBotRequest {
    pub wallet: String,
    pub agent_address: String,
    pub sub_account_id: u16,
    pub market_index: u16,
    #[serde(default)]
    pub paused: bool,
}

/// Bootstrap endpoint: registers a bot so the periodic sweep (§4.13)
/// picks it up, pending a real schema the bot roster is sourced from.
pub async fn register_bot(
    State(state): State<AppState>,
    Json(body): Json<RegisterBotRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let wallet = match Pubkey::from_str(&body.wallet) {
        Ok(pk) => pk,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(json!({ "ok": false, "error": "invalid wallet pubkey" }))),
    };
    let agent_address = match Pubkey::from_str(&body.agent_address) {
        Ok(pk) => pk,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(json!({ "ok": false, "error": "invalid agent_address pubkey" }))),
    };
    state.store.upsert_bot(ActiveBotRef {
        wallet,
        agent_address,
        sub_account_id: body.sub_account_id,
        market_index: body.market_index,
        paused: body.paused,
    });
    (StatusCode::OK, Json(json!({ "ok": true })))
}

/// Runs one reconciliation sweep on demand (§4.13 is otherwise a timed
/// loop); useful for operators who don't want to wait out the interval.
pub async fn trigger_reconcile(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let pair_locks = PairLocks::default();
    run_sweep(state.store.as_ref(), state.rpc.as_ref(), &pair_locks, &state.program_id).await;
    (StatusCode::OK, Json(json!({ "ok": true })))
}
