//! Vehicle ledger operations
//!
//! A vehicle row is the identity anchor: one row per distinct fingerprint,
//! created on first observation and never deleted by normal operation. Only
//! the fingerprint and the recoverable ciphertext are stored; plate text
//! never reaches this layer in the clear.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Vehicle record
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: Uuid,
    /// Deterministic digest of (canonical plate, public key). NULL only for
    /// legacy rows created before fingerprinting existed; those rows are
    /// excluded from reconciliation.
    pub fingerprint: Option<String>,
    /// Base64 RSA-OAEP ciphertext of the canonical plate text
    pub encrypted_plate: String,
    pub created_at: DateTime<Utc>,
}

/// Create a vehicle for `fingerprint`, or fetch the existing one.
///
/// Atomic per fingerprint: concurrent first-sightings of the same plate race
/// on the UNIQUE constraint, the losers observe the winner's row. Returns
/// `(vehicle, created)`.
pub async fn create_or_fetch(
    pool: &SqlitePool,
    fingerprint: &str,
    encrypted_plate: &str,
) -> Result<(Vehicle, bool)> {
    let candidate_id = Uuid::new_v4();
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO vehicles (id, fingerprint, encrypted_plate, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(fingerprint) DO NOTHING
        "#,
    )
    .bind(candidate_id.to_string())
    .bind(fingerprint)
    .bind(encrypted_plate)
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;

    let created = result.rows_affected() == 1;

    let vehicle = load_by_fingerprint(pool, fingerprint)
        .await?
        .ok_or_else(|| anyhow::anyhow!("vehicle row missing after insert"))?;

    Ok((vehicle, created))
}

/// Load vehicle by fingerprint
pub async fn load_by_fingerprint(
    pool: &SqlitePool,
    fingerprint: &str,
) -> Result<Option<Vehicle>> {
    let row = sqlx::query(
        r#"
        SELECT id, fingerprint, encrypted_plate, created_at
        FROM vehicles
        WHERE fingerprint = ?
        "#,
    )
    .bind(fingerprint)
    .fetch_optional(pool)
    .await?;

    row.map(vehicle_from_row).transpose()
}

/// Load vehicle by id
pub async fn load(pool: &SqlitePool, id: Uuid) -> Result<Option<Vehicle>> {
    let row = sqlx::query(
        r#"
        SELECT id, fingerprint, encrypted_plate, created_at
        FROM vehicles
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(vehicle_from_row).transpose()
}

/// Load all vehicles, oldest first (reveal-all walks this)
pub async fn load_all(pool: &SqlitePool) -> Result<Vec<Vehicle>> {
    let rows = sqlx::query(
        r#"
        SELECT id, fingerprint, encrypted_plate, created_at
        FROM vehicles
        ORDER BY created_at, id
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(vehicle_from_row).collect()
}

fn vehicle_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Vehicle> {
    let id_str: String = row.get("id");
    let created_str: String = row.get("created_at");

    Ok(Vehicle {
        id: Uuid::parse_str(&id_str)?,
        fingerprint: row.get("fingerprint"),
        encrypted_plate: row.get("encrypted_plate"),
        created_at: DateTime::parse_from_rfc3339(&created_str)?.with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_create_then_fetch_same_row() {
        let pool = test_pool().await;

        let (first, created) = create_or_fetch(&pool, "fp-1", "cipher-1").await.unwrap();
        assert!(created);

        let (second, created) = create_or_fetch(&pool, "fp-1", "cipher-other").await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        // Ciphertext is backfilled at creation only, never overwritten
        assert_eq!(second.encrypted_plate, "cipher-1");
    }

    #[tokio::test]
    async fn test_distinct_fingerprints_distinct_rows() {
        let pool = test_pool().await;

        let (a, _) = create_or_fetch(&pool, "fp-a", "ca").await.unwrap();
        let (b, _) = create_or_fetch(&pool, "fp-b", "cb").await.unwrap();
        assert_ne!(a.id, b.id);

        let all = load_all(&pool).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_load_by_id() {
        let pool = test_pool().await;

        let (vehicle, _) = create_or_fetch(&pool, "fp-1", "cipher").await.unwrap();
        let loaded = load(&pool, vehicle.id).await.unwrap().unwrap();
        assert_eq!(loaded.fingerprint.as_deref(), Some("fp-1"));

        assert!(load(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }
}
