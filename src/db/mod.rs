pub mod pool;
pub mod repo;
pub mod schema;

pub use pool::{MysqlPool, MysqlPooledConnection, build_pool};

use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

/// Embedded at compile time so a deployed binary never depends on a
/// `migrations/` directory being present alongside it, matching the
/// teacher's `tests/common/mod.rs` embedding pattern.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Runs any pending migrations against `pool`. Called once at startup
/// before the batch writer or HTTP server touch the relational store.
pub fn run_pending_migrations(pool: &MysqlPool) -> anyhow::Result<()> {
    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|err| anyhow::anyhow!("running pending migrations: {err}"))?;
    Ok(())
}
