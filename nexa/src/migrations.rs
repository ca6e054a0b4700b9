use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

/// Bring the playback-core schema up to date at startup. Single-replica
/// deployments apply migrations directly; sqlx's own `_sqlx_migrations`
/// bookkeeping makes reruns a no-op.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrator = sqlx::migrate!("../migrations");
    let known = migrator.migrations.len();

    migrator
        .run(pool)
        .await
        .context("applying playback-core schema migrations")?;

    info!(known_migrations = known, "database schema is current");
    Ok(())
}
