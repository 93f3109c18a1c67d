//! Parking session ledger operations
//!
//! A session is a continuous presence interval. The schema enforces at most
//! one open session per vehicle (partial unique index); closed sessions are
//! never edited, a reappearing vehicle gets a brand-new session.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Continuous presence interval. `departure = None` means still present.
#[derive(Debug, Clone)]
pub struct ParkingSession {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub arrival: DateTime<Utc>,
    pub departure: Option<DateTime<Utc>>,
}

/// Open a new session for a vehicle.
///
/// Fails on the unique open-session index if one is already open; the
/// reconciler only opens sessions for vehicles absent from the previous
/// batch, so a violation here is a consistency fault at the caller.
pub async fn open(
    pool: &SqlitePool,
    vehicle_id: Uuid,
    arrival: DateTime<Utc>,
) -> Result<ParkingSession> {
    let session = ParkingSession {
        id: Uuid::new_v4(),
        vehicle_id,
        arrival,
        departure: None,
    };

    sqlx::query(
        r#"
        INSERT INTO parking_sessions (id, vehicle_id, arrival, departure)
        VALUES (?, ?, ?, NULL)
        "#,
    )
    .bind(session.id.to_string())
    .bind(session.vehicle_id.to_string())
    .bind(session.arrival.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(session)
}

/// All open sessions for a vehicle (the invariant says zero or one; the
/// reconciler checks the count rather than assuming it)
pub async fn open_for_vehicle(
    pool: &SqlitePool,
    vehicle_id: Uuid,
) -> Result<Vec<ParkingSession>> {
    let rows = sqlx::query(
        r#"
        SELECT id, vehicle_id, arrival, departure
        FROM parking_sessions
        WHERE vehicle_id = ? AND departure IS NULL
        "#,
    )
    .bind(vehicle_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(session_from_row).collect()
}

/// Close a session by setting its departure timestamp.
///
/// Errors when the session does not exist or is already closed; closed
/// sessions are never edited.
pub async fn close(
    pool: &SqlitePool,
    session_id: Uuid,
    departure: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE parking_sessions SET departure = ? WHERE id = ? AND departure IS NULL
        "#,
    )
    .bind(departure.to_rfc3339())
    .bind(session_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        anyhow::bail!("session {} is not open", session_id);
    }

    Ok(())
}

/// All sessions for a vehicle, oldest arrival first
pub async fn load_for_vehicle(
    pool: &SqlitePool,
    vehicle_id: Uuid,
) -> Result<Vec<ParkingSession>> {
    let rows = sqlx::query(
        r#"
        SELECT id, vehicle_id, arrival, departure
        FROM parking_sessions
        WHERE vehicle_id = ?
        ORDER BY arrival, id
        "#,
    )
    .bind(vehicle_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(session_from_row).collect()
}

fn session_from_row(row: sqlx::sqlite::SqliteRow) -> Result<ParkingSession> {
    let id_str: String = row.get("id");
    let vehicle_str: String = row.get("vehicle_id");
    let arrival_str: String = row.get("arrival");
    let departure_str: Option<String> = row.get("departure");

    Ok(ParkingSession {
        id: Uuid::parse_str(&id_str)?,
        vehicle_id: Uuid::parse_str(&vehicle_str)?,
        arrival: DateTime::parse_from_rfc3339(&arrival_str)?.with_timezone(&Utc),
        departure: departure_str
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|t| t.with_timezone(&Utc)))
            .transpose()?,
    })
}
