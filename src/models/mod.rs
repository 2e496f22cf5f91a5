//! Data models for the datasource registry.
//!
//! This module re-exports all model types used throughout the crate.

pub mod datasource;
pub mod host;

// Re-export commonly used types
pub use datasource::{DatasourceId, DatasourceInfo, DatasourceSummary, SwapOutcome};
pub use host::{BackendKind, SqlHost, SqlHosts};
