//! parkwatch-ingest library interface
//!
//! Exposes the ledger and pipeline services for integration testing and for
//! the `parkwatch` binary.

pub mod db;
pub mod services;
