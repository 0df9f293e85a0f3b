use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Creates the PostgreSQL pool backing the subscription store and the usage
/// ledger. Gate traffic is point reads and single-row inserts, so the pool
/// stays small; size it via `DB_MAX_CONNECTIONS` when one instance serves
/// heavier bursts.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    info!("Connecting to PostgreSQL (pool size {max_connections})...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    info!("Entitlement database pool established");
    Ok(pool)
}
