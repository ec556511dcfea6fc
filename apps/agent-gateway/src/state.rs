use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use solana_sdk::pubkey::Pubkey;

use protocol_core::oracle::OracleResolver;
use protocol_core::rpc::SolanaRpc;

use crate::db::Db;
use crate::store::GatewayStore;

#[derive(Clone)]
pub struct AppState {
    pub pool: Db,
    pub metrics: PrometheusHandle,
    pub store: Arc<GatewayStore>,
    pub rpc: Arc<SolanaRpc>,
    pub oracle: Arc<OracleResolver>,
    pub program_id: Pubkey,
}
