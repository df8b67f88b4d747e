use anyhow::{Context, Result};
use diesel::connection::SimpleConnection;
use diesel::{Connection, SqliteConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Opens the scheduler database, configures locking, and brings the schema
/// up to date. Several processes may share one file; writers wait up to
/// `busy_timeout_ms` for the write lock before failing.
pub fn establish(database_url: &str, busy_timeout_ms: u64) -> Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(database_url)
        .with_context(|| format!("Failed to open database {}", database_url))?;

    conn.batch_execute(&format!(
        "PRAGMA busy_timeout = {}; PRAGMA journal_mode = WAL;",
        busy_timeout_ms
    ))?;

    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
    info!("Applied {} pending migrations", applied.len());

    Ok(conn)
}

#[cfg(test)]
pub fn in_memory() -> SqliteConnection {
    establish(":memory:", 0).expect("in-memory database")
}
