//! Database connection pool

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Create a new SQLite connection pool
pub async fn create_pool(database_path: &str) -> Result<SqlitePool, sqlx::Error> {
    // Ensure parent directory exists
    if let Some(parent) = Path::new(database_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let options = SqliteConnectOptions::from_str(database_path)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Run database migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // All migration files in order
    let migrations = [include_str!("../../migrations/001_initial_schema.sql")];

    for migration_sql in migrations {
        for stmt in split_statements(migration_sql) {
            if let Err(e) = sqlx::query(&stmt).execute(pool).await {
                let err_str = e.to_string();
                if !err_str.contains("already exists") {
                    tracing::warn!(
                        "Migration statement failed: {} - {}",
                        &stmt[..stmt.len().min(50)],
                        e
                    );
                }
            }
        }
    }

    Ok(())
}

/// Split a migration file into executable statements. Line comments are
/// stripped first; statements in our migrations never contain literal
/// semicolons.
fn split_statements(sql: &str) -> Vec<String> {
    let without_comments: String = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Initialize database - create pool and run migrations
pub async fn init_database(database_path: &str) -> Result<SqlitePool, sqlx::Error> {
    let pool = create_pool(database_path).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}
