//! Integration tests for mappers handed out by the registry.
//!
//! Tests verify that:
//! - Table names resolve through the registered table map with dialect quoting
//! - Unregistered record types fall back to their bare type name
//! - Embedded mappers run with foreign keys enforced and no pragma warnings
//! - Independent mappers never leak registrations or trace state

use datasource_registry::config::RegistryOptions;
use datasource_registry::db::{DatasourceRegistry, Dialect, TableRegistry};
use datasource_registry::models::{DatasourceId, SqlHost, SqlHosts};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

const PRIMARY: DatasourceId = DatasourceId::PRIMARY;

struct ParamGroup;
struct Pivot;
struct Trade;

async fn setup() -> (DatasourceRegistry, TempDir) {
    let dir = TempDir::new().unwrap();
    let host = SqlHost::sqlite(dir.path().join("mapped").to_string_lossy().into_owned())
        .with_create_if_missing(true);

    let tables = TableRegistry::new()
        .with_table::<ParamGroup>("paramgroup")
        .with_table::<Pivot>("Pivot_Values");

    let registry = DatasourceRegistry::new(
        SqlHosts::new().with_host("dsn1", host),
        tables,
        RegistryOptions::default().with_selection_env_prefix("DSREG_IT_MAPPER_"),
    );
    assert_ok!(registry.init(PRIMARY, None).await);
    (registry, dir)
}

#[tokio::test]
async fn test_table_name_registered_and_fallback() {
    let (registry, _dir) = setup().await;

    assert_eq!(
        assert_ok!(registry.table_name::<ParamGroup>(PRIMARY).await),
        "\"paramgroup\""
    );
    assert_eq!(
        assert_ok!(registry.table_name::<Pivot>(PRIMARY).await),
        "\"Pivot_Values\""
    );
    assert_eq!(assert_ok!(registry.table_name::<Trade>(PRIMARY).await), "Trade");

    assert_err!(registry.table_name::<Trade>(DatasourceId::SECONDARY).await);
}

#[tokio::test]
async fn test_default_mapper_enforces_foreign_keys() {
    let (registry, _dir) = setup().await;
    let mapper = assert_ok!(registry.default_mapper(PRIMARY).await);

    assert_eq!(mapper.dialect(), &Dialect::Sqlite);
    assert!(mapper.pragma_warnings().is_empty());
    assert_eq!(
        assert_ok!(mapper.select_i64("PRAGMA foreign_keys").await),
        Some(1)
    );

    assert_ok!(mapper.exec("CREATE TABLE paramgroup (id INTEGER PRIMARY KEY)").await);
    assert_ok!(
        mapper
            .exec("CREATE TABLE param (id INTEGER PRIMARY KEY, grp INTEGER REFERENCES paramgroup(id))")
            .await
    );
    assert_err!(mapper.exec("INSERT INTO param (id, grp) VALUES (1, 99)").await);

    assert_ok!(mapper.exec("INSERT INTO paramgroup (id) VALUES (99)").await);
    let outcome = assert_ok!(mapper.exec("INSERT INTO param (id, grp) VALUES (1, 99)").await);
    assert_eq!(outcome.rows_affected, 1);
}

#[tokio::test]
async fn test_embedded_connection_is_tuned() {
    let (registry, _dir) = setup().await;
    let mapper = assert_ok!(registry.independent_mapper(PRIMARY).await);

    let journal = assert_ok!(mapper.select_string("PRAGMA journal_mode").await);
    assert_eq!(journal.as_deref(), Some("off"));
    assert_eq!(assert_ok!(mapper.select_i64("PRAGMA synchronous").await), Some(0));
}

#[tokio::test]
async fn test_independent_mapper_is_isolated() {
    let (registry, _dir) = setup().await;
    let shared = assert_ok!(registry.default_mapper(PRIMARY).await);

    let mut own = assert_ok!(registry.independent_mapper(PRIMARY).await);
    own.add_table_with_name::<Trade>("trades");
    own.trace_on();

    assert_eq!(own.table_name::<Trade>(), "\"trades\"");
    assert_eq!(shared.table_name::<Trade>(), "Trade");
    assert!(!shared.is_traced());

    let again = assert_ok!(registry.default_mapper(PRIMARY).await);
    assert!(Arc::ptr_eq(&shared, &again));
}

#[tokio::test]
async fn test_mapper_factory_builds_fresh_instances() {
    let (registry, _dir) = setup().await;
    let factory = registry.mapper_factory(PRIMARY);
    assert_eq!(factory.id(), PRIMARY);

    let mut a = assert_ok!(factory.build().await);
    let b = assert_ok!(factory.build().await);
    assert!(a.pool().same_pool(b.pool()));

    a.add_table_with_name::<Trade>("trades");
    assert!(a.table_for::<Trade>().is_some());
    assert!(b.table_for::<Trade>().is_none());
    assert_eq!(a.label(), "dsn1");
}

#[tokio::test]
async fn test_registry_trace_applies_to_default_mappers() {
    let (registry, _dir) = setup().await;
    let before = assert_ok!(registry.default_mapper(PRIMARY).await);

    registry.trace_on().await;
    assert!(before.is_traced());

    // Mappers built after the toggle pick it up; independent ones do not.
    assert_ok!(registry.init(PRIMARY, None).await);
    let rebuilt = assert_ok!(registry.default_mapper(PRIMARY).await);
    assert!(rebuilt.is_traced());
    let own = assert_ok!(registry.independent_mapper(PRIMARY).await);
    assert!(!own.is_traced());

    registry.trace_off().await;
    assert!(!rebuilt.is_traced());
}
