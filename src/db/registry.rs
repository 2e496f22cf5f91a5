//! Process-wide registry of numbered datasources.
//!
//! # Design Decisions
//!
//! - **Explicit registry value**: cheaply clonable (`Arc` inner), passed to
//!   whoever needs a connection instead of living in a global
//! - **Lifecycle `Mutex`**: init, close and swap are serialized; the slot
//!   `RwLock` is only taken briefly so readers never wait on a connect
//! - **`OnceCell` per slot**: single-flight construction of the default
//!   mapper; the cell travels with its slot on swap and is dropped on re-init
//!
//! # Concurrency Safety
//!
//! - Slot locks are never held across connection opens or mapper builds
//! - Swap exchanges both slots under one write lock, so no reader observes a
//!   half-swapped pair
//! - A mapper handed out before a close keeps a clone of the closed pool;
//!   statements on it fail with a closed-pool error

use crate::config::RegistryOptions;
use crate::db::connect;
use crate::db::mapper::DbMap;
use crate::db::pool::DbPool;
use crate::db::tables::TableRegistry;
use crate::error::{DbError, DbResult};
use crate::models::{
    BackendKind, DatasourceId, DatasourceInfo, DatasourceSummary, SqlHost, SqlHosts, SwapOutcome,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, info, warn};

/// One initialized slot.
#[derive(Debug)]
struct Datasource {
    key: String,
    host: SqlHost,
    pool: DbPool,
    mapper: Arc<OnceCell<Arc<DbMap>>>,
}

impl Datasource {
    fn is_swappable(&self) -> bool {
        !self.host.db_name.is_empty() && !self.pool.is_closed()
    }

    fn summary(&self, id: DatasourceId) -> DatasourceSummary {
        DatasourceSummary {
            id,
            key: self.key.clone(),
            kind: self.host.kind,
            db_name: self.host.db_name.clone(),
            mapper_built: self.mapper.initialized(),
            closed: self.pool.is_closed(),
        }
    }
}

#[derive(Debug)]
struct RegistryInner {
    hosts: SqlHosts,
    tables: Arc<TableRegistry>,
    options: RegistryOptions,
    slots: RwLock<HashMap<DatasourceId, Datasource>>,
    lifecycle: Mutex<()>,
    /// Trace state applied to default mappers.
    trace: AtomicBool,
}

/// Registry of datasources addressed by [`DatasourceId`].
#[derive(Debug, Clone)]
pub struct DatasourceRegistry {
    inner: Arc<RegistryInner>,
}

impl DatasourceRegistry {
    pub fn new(hosts: SqlHosts, tables: TableRegistry, options: RegistryOptions) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                hosts,
                tables: Arc::new(tables),
                options,
                slots: RwLock::new(HashMap::new()),
                lifecycle: Mutex::new(()),
                trace: AtomicBool::new(false),
            }),
        }
    }

    pub fn hosts(&self) -> &SqlHosts {
        &self.inner.hosts
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.inner.options
    }

    /// Selection key for `id`: the explicit key if given, else the
    /// environment variable `<prefix><id+1>`, else `<default prefix><id+1>`.
    pub fn resolve_key(&self, id: DatasourceId, explicit: Option<&str>) -> String {
        if let Some(key) = explicit.filter(|k| !k.is_empty()) {
            return key.to_string();
        }

        let options = &self.inner.options;
        let env_name = format!("{}{}", options.selection_env_prefix, id.ordinal());
        match std::env::var(&env_name) {
            Ok(key) if !key.is_empty() => {
                debug!(datasource_id = %id, env = %env_name, key = %key, "Selection key from environment");
                key
            }
            _ => format!("{}{}", options.default_key_prefix, id.ordinal()),
        }
    }

    /// Initialize datasource `id`, replacing any connection already there.
    ///
    /// The host descriptor is resolved first, so an unknown key leaves the
    /// current connection untouched. Otherwise the previous connection is
    /// closed before the replacement is opened; if the open fails the slot
    /// stays empty.
    pub async fn init(&self, id: DatasourceId, key: Option<&str>) -> DbResult<DatasourceInfo> {
        let key = self.resolve_key(id, key);
        let host = self.inner.hosts.get(&key)?.clone();

        let _lifecycle = self.inner.lifecycle.lock().await;

        let previous = self.inner.slots.write().await.remove(&id);
        if let Some(previous) = previous {
            info!(datasource_id = %id, key = %previous.key, "Closing previous connection");
            previous.pool.close().await;
        }

        let opened = connect::open(&key, &host, &self.inner.options).await?;
        info!(
            datasource_id = %id,
            key = %key,
            kind = %host.kind,
            location = %opened.location,
            "Datasource initialized"
        );

        let info = DatasourceInfo {
            id,
            key: key.clone(),
            kind: host.kind,
            db_name: host.db_name.clone(),
            server_version: opened.server_version,
        };

        self.inner.slots.write().await.insert(
            id,
            Datasource {
                key,
                host,
                pool: opened.pool,
                mapper: Arc::new(OnceCell::new()),
            },
        );

        Ok(info)
    }

    async fn with_slot<R>(
        &self,
        id: DatasourceId,
        f: impl FnOnce(&Datasource) -> R,
    ) -> DbResult<R> {
        let slots = self.inner.slots.read().await;
        slots
            .get(&id)
            .map(f)
            .ok_or_else(|| DbError::not_initialized(id))
    }

    /// Connection handle of datasource `id`.
    pub async fn get(&self, id: DatasourceId) -> DbResult<DbPool> {
        self.with_slot(id, |ds| ds.pool.clone()).await
    }

    pub async fn kind(&self, id: DatasourceId) -> DbResult<BackendKind> {
        self.with_slot(id, |ds| ds.host.kind).await
    }

    pub async fn host(&self, id: DatasourceId) -> DbResult<SqlHost> {
        self.with_slot(id, |ds| ds.host.clone()).await
    }

    pub async fn key(&self, id: DatasourceId) -> DbResult<String> {
        self.with_slot(id, |ds| ds.key.clone()).await
    }

    pub async fn is_initialized(&self, id: DatasourceId) -> bool {
        self.inner.slots.read().await.contains_key(&id)
    }

    /// Summaries of all datasources, ordered by id.
    pub async fn list(&self) -> Vec<DatasourceSummary> {
        let slots = self.inner.slots.read().await;
        let mut summaries: Vec<_> = slots.iter().map(|(id, ds)| ds.summary(*id)).collect();
        summaries.sort_by_key(|s| s.id);
        summaries
    }

    /// Close datasource `id`. Closing an absent datasource is a no-op.
    pub async fn close(&self, id: DatasourceId) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let removed = self.inner.slots.write().await.remove(&id);
        match removed {
            Some(ds) => {
                ds.pool.close().await;
                info!(datasource_id = %id, key = %ds.key, "Datasource closed");
            }
            None => debug!(datasource_id = %id, "Close on absent datasource"),
        }
    }

    pub async fn close_all(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let drained: Vec<_> = self.inner.slots.write().await.drain().collect();
        for (id, ds) in drained {
            ds.pool.close().await;
            info!(datasource_id = %id, key = %ds.key, "Datasource closed");
        }
    }

    /// Exchange datasources 0 and 1.
    ///
    /// Requires datasource 1 to hold an open connection for a named database;
    /// otherwise nothing changes and [`SwapOutcome::SecondaryNotSet`] is
    /// returned. When datasource 0 is empty, datasource 1 moves into it.
    pub async fn swap(&self) -> SwapOutcome {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let mut slots = self.inner.slots.write().await;

        let ready = slots
            .get(&DatasourceId::SECONDARY)
            .is_some_and(Datasource::is_swappable);
        if !ready {
            let outcome = SwapOutcome::SecondaryNotSet;
            warn!("{}", outcome);
            return outcome;
        }

        if let Some(secondary) = slots.remove(&DatasourceId::SECONDARY) {
            if let Some(primary) = slots.insert(DatasourceId::PRIMARY, secondary) {
                slots.insert(DatasourceId::SECONDARY, primary);
            }
        }

        let outcome = SwapOutcome::Swapped;
        info!(
            primary = ?slots.get(&DatasourceId::PRIMARY).map(|ds| &ds.key),
            secondary = ?slots.get(&DatasourceId::SECONDARY).map(|ds| &ds.key),
            "{}",
            outcome
        );
        outcome
    }

    /// Shared mapper of datasource `id`, built on first use.
    ///
    /// Concurrent first calls for one id build a single mapper. The mapper
    /// is kept until the datasource is re-initialized or closed.
    pub async fn default_mapper(&self, id: DatasourceId) -> DbResult<Arc<DbMap>> {
        let (cell, pool, kind, key) = self
            .with_slot(id, |ds| {
                (
                    Arc::clone(&ds.mapper),
                    ds.pool.clone(),
                    ds.host.kind,
                    ds.key.clone(),
                )
            })
            .await?;

        let built = AtomicBool::new(false);
        let built_here = &built;
        let mapper = cell
            .get_or_try_init(|| async move {
                let mapper = DbMap::build(pool, kind, key, Arc::clone(&self.inner.tables)).await?;
                built_here.store(true, Ordering::Relaxed);
                debug!(datasource_id = %id, "Default mapper built");
                Ok::<_, DbError>(Arc::new(mapper))
            })
            .await?;

        // A toggle that ran while this mapper was being built could not see
        // it in its slot; pick up the current flag once it is published.
        if built.load(Ordering::Relaxed) {
            if self.inner.trace.load(Ordering::SeqCst) {
                mapper.trace_on();
            } else {
                mapper.trace_off();
            }
        }

        Ok(Arc::clone(mapper))
    }

    /// A newly built mapper of datasource `id`, owned by the caller.
    ///
    /// Registrations and trace state changed on it stay local.
    pub async fn independent_mapper(&self, id: DatasourceId) -> DbResult<DbMap> {
        let (pool, kind, key) = self
            .with_slot(id, |ds| (ds.pool.clone(), ds.host.kind, ds.key.clone()))
            .await?;
        DbMap::build(pool, kind, key, Arc::clone(&self.inner.tables)).await
    }

    /// Reusable builder of independent mappers for datasource `id`.
    pub fn mapper_factory(&self, id: DatasourceId) -> MapperFactory {
        MapperFactory {
            registry: self.clone(),
            id,
        }
    }

    /// Table name for record type `T` on datasource `id`.
    pub async fn table_name<T: 'static>(&self, id: DatasourceId) -> DbResult<String> {
        Ok(self.default_mapper(id).await?.table_name::<T>())
    }

    /// Turn statement tracing on for every default mapper, including ones
    /// built later.
    pub async fn trace_on(&self) {
        self.set_trace(true).await;
    }

    pub async fn trace_off(&self) {
        self.set_trace(false).await;
    }

    async fn set_trace(&self, on: bool) {
        self.inner.trace.store(on, Ordering::SeqCst);
        let slots = self.inner.slots.read().await;
        for mapper in slots.values().filter_map(|ds| ds.mapper.get()) {
            if on {
                mapper.trace_on();
            } else {
                mapper.trace_off();
            }
        }
        info!(trace = on, "Statement tracing toggled");
    }
}

/// Builds independent mappers for one datasource id.
#[derive(Debug, Clone)]
pub struct MapperFactory {
    registry: DatasourceRegistry,
    id: DatasourceId,
}

impl MapperFactory {
    pub fn id(&self) -> DatasourceId {
        self.id
    }

    /// Build a mapper against whatever datasource currently holds the id.
    pub async fn build(&self) -> DbResult<DbMap> {
        self.registry.independent_mapper(self.id).await
    }
}
