//! Ingestion pipeline orchestrator
//!
//! Runs one batch end to end: preflight custody checks, photo fan-out,
//! ledger commits, redaction, and the reconciliation barrier. Photos are
//! independent up to their ledger writes and are processed concurrently;
//! reconciliation runs once, only after every photo has settled.
//!
//! Per-photo failures quarantine that photo and the batch continues; only
//! configuration problems abort before a batch is created.

use crate::db::{self, batches, photos, photos::Photo, vehicles};
use crate::services::{
    metadata_extractor, photo_scanner, plate_normalizer, reconciler,
    reconciler::ReconcileSummary, redaction, vault, Recognizer,
};
use futures::stream::{self, StreamExt};
use parkwatch_common::config::Config;
use parkwatch_common::Error;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error as ThisError;
use uuid::Uuid;

/// Photos processed concurrently within a batch
const PHOTO_CONCURRENCY: usize = 4;

/// Why a photo was quarantined instead of committed
#[derive(Debug, ThisError)]
pub enum QuarantineReason {
    /// Gateway network failure, timeout, or non-success status
    #[error("gateway: {0}")]
    Gateway(String),

    /// The oracle found no plate in the image
    #[error("no plate detected")]
    NoPlateDetected,

    /// Recognized text matched no accepted plate format
    #[error("format rejected: {0:?}")]
    FormatRejected(String),

    /// Image could not be decoded, redacted, or filed
    #[error("image: {0}")]
    Image(String),

    /// Plate encryption failed; never degrades to plaintext storage
    #[error("crypto: {0}")]
    Crypto(String),

    /// Ledger write failed for this photo
    #[error("ledger: {0}")]
    Ledger(String),
}

/// User-visible result of one batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    /// None when the source directory held no eligible images (no-op run)
    pub batch_id: Option<Uuid>,
    /// Photos committed to the ledger
    pub processed: usize,
    /// Distinct vehicles resolved in this batch
    pub vehicles_seen: usize,
    /// Quarantined photos with reasons
    pub quarantined: Vec<(PathBuf, QuarantineReason)>,
    /// Session mutations; None for a no-op run
    pub reconciliation: Option<ReconcileSummary>,
}

/// Batch ingestion pipeline
pub struct Pipeline {
    db: SqlitePool,
    recognizer: Arc<dyn Recognizer>,
    public_key_pem: String,
    output_root: PathBuf,
}

/// Separation-of-custody and key preflight.
///
/// Fatal before any batch is created: the private key must not be present at
/// its configured location during ingestion, and the public key must load as
/// a well-formed RSA public key.
pub fn preflight(config: &Config) -> Result<String, Error> {
    if config.private_key_path.exists() {
        return Err(Error::Config(format!(
            "private key present at {}; it must be stored on separate media and removed \
             before ingestion can run",
            config.private_key_path.display()
        )));
    }

    vault::load_public_key(&config.public_key_path).map_err(|e| {
        Error::Config(format!(
            "public key at {} is required for ingestion: {}",
            config.public_key_path.display(),
            e
        ))
    })
}

impl Pipeline {
    pub fn new(
        db: SqlitePool,
        recognizer: Arc<dyn Recognizer>,
        public_key_pem: String,
        output_root: PathBuf,
    ) -> Self {
        Self {
            db,
            recognizer,
            public_key_pem,
            output_root,
        }
    }

    /// Run one batch over `input_dir`.
    ///
    /// Zero eligible images is a no-op success: no batch row is created.
    pub async fn run(&self, input_dir: &Path) -> anyhow::Result<BatchReport> {
        let files = photo_scanner::scan(input_dir)?;

        if files.is_empty() {
            tracing::info!("No photos to process");
            return Ok(BatchReport::default());
        }

        let batch = batches::create(&self.db).await?;
        let batch_id = batch.id;
        tracing::info!(batch = %batch_id, photos = files.len(), "Batch created");

        let outcomes: Vec<(PathBuf, Result<String, QuarantineReason>)> =
            stream::iter(files.into_iter())
                .map(|path| async move {
                    let outcome = self.process_photo(batch_id, &path).await;
                    (path, outcome)
                })
                .buffer_unordered(PHOTO_CONCURRENCY)
                .collect()
                .await;

        let mut report = BatchReport {
            batch_id: Some(batch_id),
            ..Default::default()
        };

        let mut fingerprints = std::collections::HashSet::new();
        for (path, outcome) in outcomes {
            match outcome {
                Ok(fingerprint) => {
                    report.processed += 1;
                    fingerprints.insert(fingerprint);
                }
                Err(reason) => {
                    tracing::warn!(photo = %path.display(), %reason, "Photo quarantined");
                    report.quarantined.push((path, reason));
                }
            }
        }
        report.vehicles_seen = fingerprints.len();

        // Barrier: every photo above has settled before sessions move
        let summary = reconciler::reconcile(&self.db, &batch).await?;
        report.reconciliation = Some(summary);

        Ok(report)
    }

    /// One photo through the whole per-photo pipeline.
    ///
    /// Returns the vehicle fingerprint on success so the batch can count
    /// distinct vehicles without another ledger read.
    async fn process_photo(
        &self,
        batch_id: Uuid,
        path: &Path,
    ) -> Result<String, QuarantineReason> {
        let metadata = metadata_extractor::extract(path);

        let image = redaction::load_and_resize(path)
            .map_err(|e| QuarantineReason::Image(e.to_string()))?;

        let image_b64 = redaction::encode_jpeg_base64(&image)
            .map_err(|e| QuarantineReason::Image(e.to_string()))?;

        let detection = self
            .recognizer
            .recognize(&image_b64)
            .await
            .map_err(|e| QuarantineReason::Gateway(e.to_string()))?
            .ok_or(QuarantineReason::NoPlateDetected)?;

        let canonical = plate_normalizer::normalize(&detection.plate)
            .ok_or_else(|| QuarantineReason::FormatRejected(detection.plate.clone()))?;

        // From here on the plate exists only as fingerprint + ciphertext
        let fingerprint = vault::fingerprint(&canonical, &self.public_key_pem);
        let encrypted_plate = vault::encrypt_plate(&canonical, &self.public_key_pem)
            .map_err(|e| QuarantineReason::Crypto(e.to_string()))?;

        let (vehicle, created) =
            vehicles::create_or_fetch(&self.db, &fingerprint, &encrypted_plate)
                .await
                .map_err(|e| QuarantineReason::Ledger(e.to_string()))?;

        if created {
            tracing::info!(vehicle = %vehicle.id, "New vehicle observed");
        }

        let photo = Photo::new(
            vehicle.id,
            batch_id,
            metadata.captured_at,
            metadata.latitude,
            metadata.longitude,
        );

        // Redact before the image is persisted anywhere downstream
        let redacted = redaction::redact(&image, &detection.bounding_box)
            .map_err(|e| QuarantineReason::Image(e.to_string()))?;

        let destination = redaction::organize(
            &redacted,
            path,
            &self.output_root,
            vehicle.id,
            photo.id,
            photo.captured_at,
        )
        .map_err(|e| QuarantineReason::Image(e.to_string()))?;

        // Ledger commit comes last: a quarantined photo must leave no batch
        // trace, or reconciliation would act on a vehicle the report never
        // counted as resolved
        photos::insert(&self.db, &photo)
            .await
            .map_err(|e| QuarantineReason::Ledger(e.to_string()))?;

        tracing::debug!(
            photo = %photo.id,
            destination = %destination.display(),
            "Photo processed"
        );

        Ok(fingerprint)
    }
}

/// Open the ledger for a configured run
pub async fn open_ledger(config: &Config) -> anyhow::Result<SqlitePool> {
    db::init_pool(&config.database_path).await
}
