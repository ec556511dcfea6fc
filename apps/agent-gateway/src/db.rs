//! Postgres pool bootstrap. The schema itself is an external collaborator
//! (§6 "the relational store itself is out of scope") — this module only
//! owns the connection lifecycle; [`crate::store::GatewayStore`] is the
//! thing that actually implements protocol-core's persisted-state
//! contract, in-memory for now pending a real schema.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub type Db = Option<PgPool>;

/// Connects if `database_url` is set, otherwise runs pool-less (the
/// ingest bootstrap and reconciliation sweep don't require Postgres to
/// function, only to durably persist).
pub async fn init_pool(database_url: Option<&str>) -> anyhow::Result<Db> {
    let Some(url) = database_url else {
        tracing::warn!("DATABASE_URL not set, running without a database pool");
        return Ok(None);
    };
    let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
    Ok(Some(pool))
}
