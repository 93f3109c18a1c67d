//! Ledger access for parkwatch-ingest
//!
//! The ledger exclusively owns the Vehicle, Batch, Photo and ParkingSession
//! entities; every other component reads and writes through the functions in
//! the per-entity modules.

pub mod batches;
pub mod photos;
pub mod sessions;
pub mod vehicles;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize ledger connection pool
pub async fn init_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to ledger: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create ledger tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vehicles (
            id TEXT PRIMARY KEY,
            fingerprint TEXT UNIQUE,
            encrypted_plate TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS batches (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            reconciled_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS photos (
            id TEXT PRIMARY KEY,
            vehicle_id TEXT NOT NULL REFERENCES vehicles(id),
            batch_id TEXT NOT NULL REFERENCES batches(id),
            captured_at TEXT NOT NULL,
            latitude REAL,
            longitude REAL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parking_sessions (
            id TEXT PRIMARY KEY,
            vehicle_id TEXT NOT NULL REFERENCES vehicles(id),
            arrival TEXT NOT NULL,
            departure TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one open session per vehicle
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_open
        ON parking_sessions(vehicle_id) WHERE departure IS NULL
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Ledger tables initialized (vehicles, batches, photos, parking_sessions)");

    Ok(())
}
