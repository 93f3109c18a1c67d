//! Batch-to-batch presence reconciliation
//!
//! Compares the current batch's vehicle set against the immediately
//! preceding batch's and mutates the session ledger: arrivals open sessions,
//! departures close them, the intersection is left alone.
//!
//! Only two adjacent batches are compared, not the full history: a vehicle
//! missed in exactly one intervening batch (an OCR failure, say) is closed
//! and reopened as two sessions rather than one continuous stay.

use crate::db::{batches, batches::Batch, photos, sessions, vehicles};
use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashSet;

/// Pure set difference between two batch vehicle sets.
///
/// No previous batch means the whole current set arrives.
pub fn diff(current: &HashSet<String>, previous: Option<&HashSet<String>>) -> Diff {
    let (mut arrivals, mut departures) = match previous {
        None => (current.iter().cloned().collect::<Vec<_>>(), Vec::new()),
        Some(previous) => (
            current.difference(previous).cloned().collect(),
            previous.difference(current).cloned().collect(),
        ),
    };

    // Deterministic application order
    arrivals.sort();
    departures.sort();

    Diff {
        arrivals,
        departures,
    }
}

/// Arrived and departed fingerprints for one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    pub arrivals: Vec<String>,
    pub departures: Vec<String>,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct ReconcileSummary {
    /// Sessions opened for arriving vehicles
    pub opened: usize,
    /// Sessions closed for departing vehicles
    pub closed: usize,
    /// Ledger states that violated the one-open-session invariant; surfaced,
    /// never swallowed, never batch-fatal
    pub faults: Vec<String>,
}

/// Reconcile `current` against its immediately preceding batch.
///
/// Must run only after every photo of the batch has been committed; the
/// caller enforces that barrier. Marks the batch reconciled on completion.
pub async fn reconcile(pool: &SqlitePool, current: &Batch) -> Result<ReconcileSummary> {
    let current_set = photos::fingerprints_in_batch(pool, current.id).await?;
    let previous_batch = batches::previous(pool, current).await?;

    let previous_set = match &previous_batch {
        Some(batch) => Some(photos::fingerprints_in_batch(pool, batch.id).await?),
        None => None,
    };

    let diff = diff(&current_set, previous_set.as_ref());

    let mut summary = ReconcileSummary::default();

    for fingerprint in &diff.arrivals {
        let vehicle = vehicles::load_by_fingerprint(pool, fingerprint)
            .await?
            .ok_or_else(|| anyhow::anyhow!("arrival fingerprint has no vehicle row"))?;

        let arrival = photos::earliest_capture(pool, vehicle.id, current.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("arrival vehicle has no photos in batch"))?;

        sessions::open(pool, vehicle.id, arrival).await?;
        summary.opened += 1;
    }

    if let Some(previous_batch) = &previous_batch {
        for fingerprint in &diff.departures {
            let vehicle = vehicles::load_by_fingerprint(pool, fingerprint)
                .await?
                .ok_or_else(|| anyhow::anyhow!("departure fingerprint has no vehicle row"))?;

            let open = sessions::open_for_vehicle(pool, vehicle.id).await?;
            if open.len() != 1 {
                let fault = format!(
                    "vehicle {} departing with {} open sessions, expected exactly 1",
                    vehicle.id,
                    open.len()
                );
                tracing::error!("{}", fault);
                summary.faults.push(fault);
                continue;
            }

            // Last known sighting: the vehicle was never seen in the current
            // batch, so its latest photo in the previous batch is the bound.
            let mut departure = photos::latest_capture(pool, vehicle.id, previous_batch.id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("departure vehicle has no photos in previous batch"))?;

            // Skewed EXIF clocks across batches can put the last sighting
            // before the recorded arrival; never store a negative interval.
            if departure < open[0].arrival {
                let fault = format!(
                    "vehicle {} last sighting {} precedes arrival {}, closing at arrival",
                    vehicle.id,
                    departure.to_rfc3339(),
                    open[0].arrival.to_rfc3339()
                );
                tracing::error!("{}", fault);
                summary.faults.push(fault);
                departure = open[0].arrival;
            }

            sessions::close(pool, open[0].id, departure).await?;
            summary.closed += 1;
        }
    }

    batches::mark_reconciled(pool, current.id).await?;

    tracing::info!(
        batch = %current.id,
        opened = summary.opened,
        closed = summary.closed,
        faults = summary.faults.len(),
        "Reconciliation complete"
    );

    Ok(summary)
}
