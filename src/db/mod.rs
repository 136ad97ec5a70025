//! Database connection pool with embedded migrations.

use anyhow::{Context, Result};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use diesel::sql_query;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = r2d2::PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Applies the connection pragmas every pooled connection needs.
#[derive(Debug, Clone)]
struct ConnectionPragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        sql_query("PRAGMA foreign_keys = ON;")
            .execute(conn)
            .map_err(diesel::r2d2::Error::QueryError)?;

        sql_query("PRAGMA journal_mode = WAL;")
            .execute(conn)
            .map_err(diesel::r2d2::Error::QueryError)?;

        // Wait for locks instead of failing immediately; background sweeps
        // and request handlers share the same file.
        sql_query("PRAGMA busy_timeout = 5000;")
            .execute(conn)
            .map_err(diesel::r2d2::Error::QueryError)?;

        sql_query("PRAGMA synchronous = NORMAL;")
            .execute(conn)
            .map_err(diesel::r2d2::Error::QueryError)?;

        Ok(())
    }
}

/// Create the connection pool and run pending migrations.
pub fn create_pool(database_url: &str) -> Result<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .max_size(10)
        .connection_customizer(Box::new(ConnectionPragmas))
        .build(manager)
        .context("Failed to create database connection pool")?;

    let mut conn = pool.get().context("Failed to get connection for migrations")?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {e}"))?;
    if !applied.is_empty() {
        info!(count = applied.len(), "Applied pending database migrations");
    }

    Ok(pool)
}

/// In-memory pool for tests. Single connection so every query sees the same
/// database.
pub fn create_test_pool() -> DbPool {
    let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .connection_customizer(Box::new(ConnectionPragmas))
        .build(manager)
        .expect("in-memory pool");
    let mut conn = pool.get().expect("in-memory connection");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("in-memory migrations");
    pool
}
