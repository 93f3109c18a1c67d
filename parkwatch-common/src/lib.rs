//! Shared types for Parkwatch
//!
//! Error taxonomy, configuration resolution, and session time rules used by
//! the ingest service and its CLI.

pub mod config;
pub mod error;
pub mod time;

pub use crate::error::{Error, Result};
