//! Batch ledger operations
//!
//! Batches are totally ordered by creation time (id as tie-break). The
//! "previous batch" for reconciliation is the most recently created batch
//! strictly older than the current one. `reconciled_at` stays NULL for a
//! batch that was aborted before reconciliation ran.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// One ingestion run
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub reconciled_at: Option<DateTime<Utc>>,
}

/// Create a new batch
pub async fn create(pool: &SqlitePool) -> Result<Batch> {
    let batch = Batch {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        reconciled_at: None,
    };

    sqlx::query(
        r#"
        INSERT INTO batches (id, created_at, reconciled_at)
        VALUES (?, ?, NULL)
        "#,
    )
    .bind(batch.id.to_string())
    .bind(batch.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(batch)
}

/// Most recently created batch strictly older than `current`
pub async fn previous(pool: &SqlitePool, current: &Batch) -> Result<Option<Batch>> {
    let row = sqlx::query(
        r#"
        SELECT id, created_at, reconciled_at
        FROM batches
        WHERE created_at < ? OR (created_at = ? AND id < ?)
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(current.created_at.to_rfc3339())
    .bind(current.created_at.to_rfc3339())
    .bind(current.id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(batch_from_row).transpose()
}

/// Record that reconciliation completed for this batch
pub async fn mark_reconciled(pool: &SqlitePool, batch_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE batches SET reconciled_at = ? WHERE id = ?
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .bind(batch_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a batch by id
pub async fn load(pool: &SqlitePool, batch_id: Uuid) -> Result<Option<Batch>> {
    let row = sqlx::query(
        r#"
        SELECT id, created_at, reconciled_at
        FROM batches
        WHERE id = ?
        "#,
    )
    .bind(batch_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(batch_from_row).transpose()
}

fn batch_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Batch> {
    let id_str: String = row.get("id");
    let created_str: String = row.get("created_at");
    let reconciled_str: Option<String> = row.get("reconciled_at");

    Ok(Batch {
        id: Uuid::parse_str(&id_str)?,
        created_at: DateTime::parse_from_rfc3339(&created_str)?.with_timezone(&Utc),
        reconciled_at: reconciled_str
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|t| t.with_timezone(&Utc)))
            .transpose()?,
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
    async fn test_previous_is_strictly_older() {
        let pool = test_pool().await;

        let first = create(&pool).await.unwrap();
        assert!(previous(&pool, &first).await.unwrap().is_none());

        let second = create(&pool).await.unwrap();
        let prev = previous(&pool, &second).await.unwrap().unwrap();
        assert_eq!(prev.id, first.id);

        // Previous of the current batch is the immediately preceding one,
        // not a merge of all older batches.
        let third = create(&pool).await.unwrap();
        let prev = previous(&pool, &third).await.unwrap().unwrap();
        assert_eq!(prev.id, second.id);
    }

    #[tokio::test]
    async fn test_mark_reconciled() {
        let pool = test_pool().await;

        let batch = create(&pool).await.unwrap();
        assert!(load(&pool, batch.id).await.unwrap().unwrap().reconciled_at.is_none());

        mark_reconciled(&pool, batch.id).await.unwrap();
        assert!(load(&pool, batch.id).await.unwrap().unwrap().reconciled_at.is_some());
    }
}
