//! Common test utilities for database-backed integration tests.
//!
//! Mirrors the teacher's `TestDatabase` pattern but targets MySQL: each test
//! gets its own freshly created database with pending migrations applied,
//! so integration tests can run in parallel without interfering with one
//! another. The database is dropped on `Drop`, including on panic.

use anyhow::{Context, Result};
use diesel::mysql::MysqlConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

type MysqlPool = Pool<ConnectionManager<MysqlConnection>>;

pub struct TestDatabase {
    db_name: String,
    pool: MysqlPool,
    admin_url: String,
}

impl TestDatabase {
    pub async fn new() -> Result<Self> {
        dotenvy::dotenv().ok();

        let base_url = std::env::var("TEST_MYSQL_DSN")
            .unwrap_or_else(|_| "mysql://root@localhost/fanethub_test".to_string());

        let (admin_url, db_name) = Self::generate_database_info(&base_url)?;

        Self::create_database(&admin_url, &db_name)
            .await
            .context("failed to create test database")?;

        let test_db_url = Self::build_database_url(&base_url, &db_name);

        Self::run_migrations(&test_db_url)
            .await
            .context("failed to run migrations")?;

        let manager = ConnectionManager::<MysqlConnection>::new(&test_db_url);
        let pool = Pool::builder()
            .max_size(5)
            .build(manager)
            .with_context(|| format!("failed to build connection pool for {db_name}"))?;

        Ok(TestDatabase { db_name, pool, admin_url })
    }

    pub fn pool(&self) -> MysqlPool {
        self.pool.clone()
    }

    #[allow(dead_code)]
    pub fn name(&self) -> &str {
        &self.db_name
    }

    fn generate_database_info(base_url: &str) -> Result<(String, String)> {
        use rand::Rng;
        let suffix: u64 = rand::thread_rng().gen();
        let db_name = format!("fanethub_test_{suffix:016x}");
        let admin_url = base_url
            .rsplit_once('/')
            .map(|(prefix, _)| format!("{prefix}/mysql"))
            .unwrap_or_else(|| base_url.to_string());
        Ok((admin_url, db_name))
    }

    fn build_database_url(base_url: &str, db_name: &str) -> String {
        base_url
            .rsplit_once('/')
            .map(|(prefix, _)| format!("{prefix}/{db_name}"))
            .unwrap_or_else(|| base_url.to_string())
    }

    async fn create_database(admin_url: &str, db_name: &str) -> Result<()> {
        use diesel::Connection;

        let admin_url = admin_url.to_string();
        let db_name = db_name.to_string();

        tokio::task::spawn_blocking(move || {
            let mut conn = MysqlConnection::establish(&admin_url)
                .context("failed to connect to MySQL for database creation. Is MySQL running?")?;

            diesel::sql_query(format!("CREATE DATABASE `{db_name}`"))
                .execute(&mut conn)
                .with_context(|| format!("failed to create database '{db_name}'"))?;

            Ok::<(), anyhow::Error>(())
        })
        .await
        .context("database creation task panicked")?
    }

    async fn run_migrations(db_url: &str) -> Result<()> {
        use diesel::Connection;

        let db_url = db_url.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = MysqlConnection::establish(&db_url)
                .context("failed to connect to test database for migrations")?;
            conn.run_pending_migrations(MIGRATIONS)
                .map_err(|err| anyhow::anyhow!("failed to run migrations: {err}"))?;
            Ok::<(), anyhow::Error>(())
        })
        .await
        .context("migration task panicked")?
    }

    fn cleanup(&self) {
        use diesel::Connection;
        use std::panic::AssertUnwindSafe;

        let db_name = self.db_name.clone();
        let admin_url = self.admin_url.clone();

        let result = std::panic::catch_unwind(AssertUnwindSafe(move || {
            let mut conn = MysqlConnection::establish(&admin_url).ok()?;
            diesel::sql_query(format!("DROP DATABASE IF EXISTS `{db_name}`"))
                .execute(&mut conn)
                .ok()
        }));

        if result.is_err() {
            eprintln!(
                "warning: failed to drop test database '{}'. Clean up manually: DROP DATABASE {};",
                self.db_name, self.db_name
            );
        }
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_unique_database_names() {
        let base = "mysql://root@localhost/fanethub_test";
        let (_, name1) = TestDatabase::generate_database_info(base).unwrap();
        let (_, name2) = TestDatabase::generate_database_info(base).unwrap();
        assert_ne!(name1, name2);
        assert!(name1.starts_with("fanethub_test_"));
    }

    #[test]
    fn builds_database_url_from_base() {
        let base = "mysql://root:pw@localhost:3306/fanethub_test";
        let url = TestDatabase::build_database_url(base, "fanethub_test_abc123");
        assert_eq!(url, "mysql://root:pw@localhost:3306/fanethub_test_abc123");
    }
}
