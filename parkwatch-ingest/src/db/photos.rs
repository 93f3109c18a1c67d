//! Photo ledger operations
//!
//! A photo row is created only after the plate was recognized and
//! normalized; quarantined images never reach this table. Within a batch a
//! vehicle may have many photos; the earliest and latest capture times per
//! (vehicle, batch) are the reconciler's arrival/departure bounds.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

/// One processed image
#[derive(Debug, Clone)]
pub struct Photo {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub batch_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Photo {
    pub fn new(
        vehicle_id: Uuid,
        batch_id: Uuid,
        captured_at: DateTime<Utc>,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            vehicle_id,
            batch_id,
            captured_at,
            latitude,
            longitude,
            created_at: Utc::now(),
        }
    }
}

/// Append a photo to the ledger
pub async fn insert(pool: &SqlitePool, photo: &Photo) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO photos (id, vehicle_id, batch_id, captured_at, latitude, longitude, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(photo.id.to_string())
    .bind(photo.vehicle_id.to_string())
    .bind(photo.batch_id.to_string())
    .bind(photo.captured_at.to_rfc3339())
    .bind(photo.latitude)
    .bind(photo.longitude)
    .bind(photo.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Fingerprints of every vehicle photographed in a batch.
///
/// Legacy vehicles without a fingerprint are excluded; they cannot take part
/// in reconciliation until backfilled.
pub async fn fingerprints_in_batch(
    pool: &SqlitePool,
    batch_id: Uuid,
) -> Result<HashSet<String>> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT v.fingerprint AS fingerprint
        FROM photos p
        JOIN vehicles v ON v.id = p.vehicle_id
        WHERE p.batch_id = ? AND v.fingerprint IS NOT NULL
        "#,
    )
    .bind(batch_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| row.get::<String, _>("fingerprint"))
        .collect())
}

/// Earliest capture time for (vehicle, batch)
pub async fn earliest_capture(
    pool: &SqlitePool,
    vehicle_id: Uuid,
    batch_id: Uuid,
) -> Result<Option<DateTime<Utc>>> {
    capture_bound(pool, vehicle_id, batch_id, "MIN").await
}

/// Latest capture time for (vehicle, batch)
pub async fn latest_capture(
    pool: &SqlitePool,
    vehicle_id: Uuid,
    batch_id: Uuid,
) -> Result<Option<DateTime<Utc>>> {
    capture_bound(pool, vehicle_id, batch_id, "MAX").await
}

async fn capture_bound(
    pool: &SqlitePool,
    vehicle_id: Uuid,
    batch_id: Uuid,
    agg: &str,
) -> Result<Option<DateTime<Utc>>> {
    // rfc3339 strings with a fixed UTC offset sort chronologically
    let sql = format!(
        "SELECT {}(captured_at) AS bound FROM photos WHERE vehicle_id = ? AND batch_id = ?",
        agg
    );

    let row = sqlx::query(&sql)
        .bind(vehicle_id.to_string())
        .bind(batch_id.to_string())
        .fetch_one(pool)
        .await?;

    let bound: Option<String> = row.get("bound");
    bound
        .map(|s| Ok(DateTime::parse_from_rfc3339(&s)?.with_timezone(&Utc)))
        .transpose()
}
