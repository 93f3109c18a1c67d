//! Pipeline services
//!
//! Per-photo stages (metadata, recognition, normalization, vault, redaction)
//! plus the batch-level reconciler and the orchestrating pipeline.

pub mod gateway;
pub mod metadata_extractor;
pub mod photo_scanner;
pub mod pipeline;
pub mod plate_normalizer;
pub mod reconciler;
pub mod redaction;
pub mod vault;

pub use gateway::{HttpRecognizer, Recognizer};
pub use pipeline::{BatchReport, Pipeline};
