//! Database layer.
//!
//! - Backend-specific connection handles and the dispatch macro
//! - Connection initializer for embedded and networked backends
//! - Datasource registry with lazy default mappers and primary/secondary swap
//! - Relational mapper, dialect rules and table registrations

pub mod connect;
pub mod dialect;
#[macro_use]
pub mod macros;
pub mod mapper;
pub mod pool;
pub mod registry;
pub mod tables;

pub use connect::{ConnectionString, OpenedConnection};
pub use dialect::Dialect;
pub use mapper::{DbMap, ExecOutcome};
pub use pool::DbPool;
pub use registry::{DatasourceRegistry, MapperFactory};
pub use tables::{TableMap, TableRegistry, bare_type_name};
