use std::sync::Arc;

use axum::{routing::{get, post}, Router};
use dotenvy::dotenv;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use protocol_core::config::CoreConfig;
use protocol_core::oracle::OracleResolver;
use protocol_core::reconciliation::spawn_periodic_reconciliation;
use protocol_core::rpc::SolanaRpc;

mod api;
mod db;
mod ingest;
mod state;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics_handle = install_metrics();
    let config = CoreConfig::from_env()?;

    // Initialize DB pool if configured
    let pool = db::init_pool(std::env::var("DATABASE_URL").ok().as_deref()).await?;
    let store = Arc::new(store::GatewayStore::default());
    let rpc = Arc::new(SolanaRpc::new(config.rpc_url.clone()));
    let oracle = Arc::new(OracleResolver::for_environment(config.env, config.oracle_cache_ttl));
    let program_id = protocol_core::PROGRAM_ID;

    spawn_periodic_reconciliation(store.clone(), rpc.clone(), program_id);

    let app_state = state::AppState { pool, metrics: metrics_handle.clone(), store, rpc, oracle, program_id };

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/metrics", get(api::metrics))
        .route("/ingest", post(ingest::ingest_handler))
        .route("/ops/bots", post(api::register_bot))
        .route("/ops/reconcile", post(api::trigger_reconcile))
        .with_state(app_state);

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8080);
    let addr: SocketAddr = format!("{}:{}", host, port).parse().expect("invalid HOST/PORT");
    info!("listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn install_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("install metrics recorder")
}
