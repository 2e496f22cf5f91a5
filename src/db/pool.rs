//! Backend-specific connection handles.
//!
//! Each datasource owns exactly one [`DbPool`]. Clones share the underlying
//! sqlx pool, so a mapper holding a clone sees the pool close when the
//! registry closes it.

use crate::models::BackendKind;
use sqlx::{Connection, MySqlPool, PgPool, SqlitePool};
use tracing::{debug, warn};

/// One sqlx pool, typed by backend.
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool. Closing twice is harmless.
    pub async fn close(&self) {
        impl_db_dispatch!(self, {
            MySql(p) => p.close().await,
            Postgres(p) => p.close().await,
            SQLite(p) => p.close().await,
        })
    }

    pub fn is_closed(&self) -> bool {
        impl_db_dispatch!(self, {
            MySql(p) => p.is_closed(),
            Postgres(p) => p.is_closed(),
            SQLite(p) => p.is_closed(),
        })
    }

    /// Get the backend kind for this pool.
    pub fn kind(&self) -> BackendKind {
        match self {
            DbPool::MySql(_) => BackendKind::MySql,
            DbPool::Postgres(_) => BackendKind::Postgres,
            DbPool::SQLite(_) => BackendKind::Sqlite,
        }
    }

    /// Whether two handles refer to the same underlying pool.
    pub fn same_pool(&self, other: &DbPool) -> bool {
        match (self, other) {
            (DbPool::MySql(a), DbPool::MySql(b)) => pool_eq(a, b),
            (DbPool::Postgres(a), DbPool::Postgres(b)) => pool_eq(a, b),
            (DbPool::SQLite(a), DbPool::SQLite(b)) => pool_eq(a, b),
            _ => false,
        }
    }

    /// Acquire a connection and ping it.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        impl_db_dispatch!(self, {
            MySql(p) => p.acquire().await?.ping().await,
            Postgres(p) => p.acquire().await?.ping().await,
            SQLite(p) => p.acquire().await?.ping().await,
        })
    }

    /// Get the server version, best effort.
    pub async fn server_version(&self) -> Option<String> {
        let result = impl_db_dispatch!(self, {
            MySql(p) => sqlx::query_scalar::<_, String>("SELECT version()").fetch_one(p).await,
            Postgres(p) => sqlx::query_scalar::<_, String>("SELECT version()").fetch_one(p).await,
            SQLite(p) => sqlx::query_scalar::<_, String>("SELECT sqlite_version()").fetch_one(p).await,
        });
        match result {
            Ok(version) => {
                debug!(version = %version, "Got server version");
                Some(version)
            }
            Err(e) => {
                warn!(error = %e, "Failed to get server version");
                None
            }
        }
    }
}

/// sqlx pools are reference-counted handles; two clones of one pool share
/// their connect options object.
fn pool_eq<DB: sqlx::Database>(a: &sqlx::Pool<DB>, b: &sqlx::Pool<DB>) -> bool {
    std::sync::Arc::ptr_eq(&a.connect_options(), &b.connect_options())
}
