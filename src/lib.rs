//! Datasource registry library.
//!
//! Keeps a numbered set of SQL connections (SQLite, PostgreSQL, MySQL) for a
//! process, hands out relational mappers bound to them and resolves table
//! names for registered record types.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, RegistryOptions};
pub use db::{DatasourceRegistry, DbMap, DbPool, Dialect, TableRegistry};
pub use error::{DbError, DbResult, PragmaWarning};
pub use models::{BackendKind, DatasourceId, SqlHost, SqlHosts, SwapOutcome};
