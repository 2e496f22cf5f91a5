//! Relational mapper bound to one datasource connection.
//!
//! A [`DbMap`] pairs a connection handle with the dialect of the backend it
//! was opened for and the application's table registrations. It never owns
//! the connection's lifetime: once the registry closes the datasource, every
//! statement issued through a stale mapper fails with a closed-pool error.

use crate::db::dialect::Dialect;
use crate::db::pool::DbPool;
use crate::db::tables::{TableMap, TableRegistry, bare_type_name};
use crate::error::{DbError, DbResult, PragmaWarning};
use crate::models::BackendKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Log target for statement tracing.
pub const TRACE_TARGET: &str = "datasource_registry::trace";

/// Rows affected and generated id of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Not reported by PostgreSQL.
    pub last_insert_id: Option<i64>,
}

impl ExecOutcome {
    fn log(&self, label: &str) {
        let id = self.last_insert_id.filter(|id| *id > 0);
        match (self.rows_affected, id) {
            (0, None) => {}
            (affected, Some(id)) if affected > 0 => {
                debug!(datasource = %label, affected, id, "{} row(s) affected; Id {}", affected, id)
            }
            (affected, None) => {
                debug!(datasource = %label, affected, "{} row(s) affected", affected)
            }
            (_, Some(id)) => debug!(datasource = %label, id, "Id {}", id),
        }
    }
}

#[derive(Debug)]
pub struct DbMap {
    pool: DbPool,
    dialect: Dialect,
    tables: Arc<TableRegistry>,
    /// Selection key of the datasource, used in log lines.
    label: String,
    traced: AtomicBool,
    pragma_warnings: Vec<PragmaWarning>,
}

impl DbMap {
    /// Build a mapper for `pool`, choosing the dialect from `kind`.
    ///
    /// Embedded connections get foreign-key enforcement switched on, which
    /// SQLite scopes to the connection and never persists. A rejected or
    /// ineffective pragma is logged and kept in
    /// [`pragma_warnings`](Self::pragma_warnings); it does not fail the build.
    pub async fn build(
        pool: DbPool,
        kind: BackendKind,
        label: impl Into<String>,
        tables: Arc<TableRegistry>,
    ) -> DbResult<Self> {
        if pool.kind() != kind {
            return Err(DbError::internal(format!(
                "Datasource recorded as {} but holds a {} connection",
                kind,
                pool.kind()
            )));
        }

        let mut mapper = Self {
            pool,
            dialect: Dialect::for_kind(kind),
            tables,
            label: label.into(),
            traced: AtomicBool::new(false),
            pragma_warnings: Vec::new(),
        };

        if kind.is_embedded() {
            mapper.enforce_foreign_keys().await;
        }

        debug!(datasource = %mapper.label, dialect = %mapper.dialect, "Built mapper");
        Ok(mapper)
    }

    async fn enforce_foreign_keys(&mut self) {
        if let Err(e) = self.execute("PRAGMA foreign_keys = ON").await {
            self.warn(PragmaWarning::rejected("foreign_keys", "1", e));
        }
        let readback = self.fetch_i64("PRAGMA foreign_keys").await;
        if let Some(warning) = check_foreign_keys(readback) {
            self.warn(warning);
        }
    }

    fn warn(&mut self, warning: PragmaWarning) {
        warn!(datasource = %self.label, warning = %warning, "Pragma not effective");
        self.pragma_warnings.push(warning);
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn kind(&self) -> BackendKind {
        self.dialect.kind()
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pragma_warnings(&self) -> &[PragmaWarning] {
        &self.pragma_warnings
    }

    pub fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    /// Register a table on this mapper only.
    ///
    /// Registrations are copy-on-write: other mappers sharing the registry
    /// are unaffected.
    pub fn add_table_with_name<T: 'static>(&mut self, table_name: impl Into<String>) -> &TableMap {
        Arc::make_mut(&mut self.tables).add_table_with_name::<T>(table_name)
    }

    /// Register `T` on this mapper only, under its bare type name.
    pub fn add_table<T: 'static>(&mut self) -> &TableMap {
        Arc::make_mut(&mut self.tables).add_table::<T>()
    }

    pub fn table_for<T: 'static>(&self) -> Option<&TableMap> {
        self.tables.table_for::<T>()
    }

    /// Dialect-quoted table name for `T`, or the bare type name when `T` is
    /// not registered.
    pub fn table_name<T: 'static>(&self) -> String {
        match self.table_for::<T>() {
            Some(table) => self.dialect.quote_field(&table.table_name),
            None => bare_type_name::<T>().to_string(),
        }
    }

    pub fn trace_on(&self) {
        self.traced.store(true, Ordering::Release);
    }

    pub fn trace_off(&self) {
        self.traced.store(false, Ordering::Release);
    }

    pub fn is_traced(&self) -> bool {
        self.traced.load(Ordering::Acquire)
    }

    fn trace(&self, sql: &str) {
        if self.is_traced() {
            info!(target: TRACE_TARGET, datasource = %self.label, sql = %sql, "trace");
        }
    }

    /// Execute a statement on this mapper's connection.
    pub async fn exec(&self, sql: &str) -> DbResult<ExecOutcome> {
        self.trace(sql);
        let outcome = self.execute(sql).await?;
        outcome.log(&self.label);
        Ok(outcome)
    }

    /// First column of the first row as an integer.
    pub async fn select_i64(&self, sql: &str) -> DbResult<Option<i64>> {
        self.trace(sql);
        self.fetch_i64(sql).await
    }

    /// First column of the first row as text.
    pub async fn select_string(&self, sql: &str) -> DbResult<Option<String>> {
        self.trace(sql);
        let value = impl_db_dispatch!(&self.pool, {
            MySql(p) => sqlx::query_scalar::<_, String>(sql).fetch_optional(p).await?,
            Postgres(p) => sqlx::query_scalar::<_, String>(sql).fetch_optional(p).await?,
            SQLite(p) => sqlx::query_scalar::<_, String>(sql).fetch_optional(p).await?,
        });
        Ok(value)
    }

    async fn execute(&self, sql: &str) -> DbResult<ExecOutcome> {
        let outcome = impl_db_dispatch!(&self.pool, {
            MySql(p) => {
                let result = sqlx::query(sql).execute(p).await?;
                ExecOutcome {
                    rows_affected: result.rows_affected(),
                    last_insert_id: i64::try_from(result.last_insert_id()).ok(),
                }
            },
            Postgres(p) => {
                let result = sqlx::query(sql).execute(p).await?;
                ExecOutcome {
                    rows_affected: result.rows_affected(),
                    last_insert_id: None,
                }
            },
            SQLite(p) => {
                let result = sqlx::query(sql).execute(p).await?;
                ExecOutcome {
                    rows_affected: result.rows_affected(),
                    last_insert_id: Some(result.last_insert_rowid()),
                }
            },
        });
        Ok(outcome)
    }

    async fn fetch_i64(&self, sql: &str) -> DbResult<Option<i64>> {
        let value = impl_db_dispatch!(&self.pool, {
            MySql(p) => sqlx::query_scalar::<_, i64>(sql).fetch_optional(p).await?,
            Postgres(p) => sqlx::query_scalar::<_, i64>(sql).fetch_optional(p).await?,
            SQLite(p) => sqlx::query_scalar::<_, i64>(sql).fetch_optional(p).await?,
        });
        Ok(value)
    }
}

/// Judge the `PRAGMA foreign_keys` read-back; anything but `1` is a warning.
fn check_foreign_keys(readback: DbResult<Option<i64>>) -> Option<PragmaWarning> {
    match readback {
        Ok(Some(1)) => None,
        Ok(other) => Some(PragmaWarning::mismatch(
            "foreign_keys",
            "1",
            other.map(|v| v.to_string()),
        )),
        Err(e) => Some(PragmaWarning::rejected("foreign_keys", "1", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    struct ParamGroup;
    struct Unmapped;

    async fn sqlite_pool() -> DbPool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        DbPool::SQLite(pool)
    }

    fn tables() -> Arc<TableRegistry> {
        Arc::new(TableRegistry::new().with_table::<ParamGroup>("paramgroup"))
    }

    #[tokio::test]
    async fn test_build_enables_foreign_keys() {
        let mapper = DbMap::build(sqlite_pool().await, BackendKind::Sqlite, "dsn1", tables())
            .await
            .unwrap();

        assert!(mapper.pragma_warnings().is_empty());
        assert_eq!(mapper.select_i64("PRAGMA foreign_keys").await.unwrap(), Some(1));
        assert_eq!(mapper.dialect(), &Dialect::Sqlite);
    }

    #[tokio::test]
    async fn test_build_rejects_kind_mismatch() {
        let result = DbMap::build(sqlite_pool().await, BackendKind::MySql, "dsn1", tables()).await;
        assert!(matches!(result, Err(DbError::Internal { .. })));
    }

    #[tokio::test]
    async fn test_pragma_failures_are_warnings_only() {
        let pool = sqlite_pool().await;
        pool.close().await;

        let mapper = DbMap::build(pool, BackendKind::Sqlite, "dsn1", tables())
            .await
            .unwrap();
        assert_eq!(mapper.pragma_warnings().len(), 2);
        assert!(mapper.pragma_warnings().iter().all(|w| w.pragma == "foreign_keys"));
    }

    #[test]
    fn test_check_foreign_keys() {
        assert!(check_foreign_keys(Ok(Some(1))).is_none());

        let mismatch = check_foreign_keys(Ok(Some(0))).unwrap();
        assert_eq!(mismatch.actual.as_deref(), Some("0"));
        assert!(mismatch.error.is_none());

        let missing = check_foreign_keys(Ok(None)).unwrap();
        assert!(missing.actual.is_none());

        let failed = check_foreign_keys(Err(DbError::internal("boom"))).unwrap();
        assert!(failed.error.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_table_name_resolution() {
        let mapper = DbMap::build(sqlite_pool().await, BackendKind::Sqlite, "dsn1", tables())
            .await
            .unwrap();

        assert_eq!(mapper.table_name::<ParamGroup>(), "\"paramgroup\"");
        assert_eq!(mapper.table_name::<Unmapped>(), "Unmapped");
    }

    #[tokio::test]
    async fn test_add_table_does_not_touch_shared_registry() {
        let shared = tables();
        let mut mapper = DbMap::build(
            sqlite_pool().await,
            BackendKind::Sqlite,
            "dsn1",
            Arc::clone(&shared),
        )
        .await
        .unwrap();

        mapper.add_table_with_name::<Unmapped>("unmapped");
        assert_eq!(mapper.table_name::<Unmapped>(), "\"unmapped\"");
        assert!(shared.table_for::<Unmapped>().is_none());
    }

    #[tokio::test]
    async fn test_exec_reports_outcome() {
        let mapper = DbMap::build(sqlite_pool().await, BackendKind::Sqlite, "dsn1", tables())
            .await
            .unwrap();
        mapper.trace_on();
        assert!(mapper.is_traced());

        mapper
            .exec("CREATE TABLE paramgroup (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .unwrap();
        let outcome = mapper
            .exec("INSERT INTO paramgroup (name) VALUES ('alpha')")
            .await
            .unwrap();
        assert_eq!(outcome.rows_affected, 1);
        assert_eq!(outcome.last_insert_id, Some(1));

        let name = mapper
            .select_string("SELECT name FROM paramgroup WHERE id = 1")
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some("alpha"));

        mapper.trace_off();
        assert!(!mapper.is_traced());
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let mapper = DbMap::build(sqlite_pool().await, BackendKind::Sqlite, "dsn1", tables())
            .await
            .unwrap();
        mapper
            .exec("CREATE TABLE parent (id INTEGER PRIMARY KEY)")
            .await
            .unwrap();
        mapper
            .exec("CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent(id))")
            .await
            .unwrap();

        let result = mapper
            .exec("INSERT INTO child (id, parent_id) VALUES (1, 42)")
            .await;
        assert!(matches!(result, Err(DbError::Database { .. })));
    }
}
