//! dsreg - Main entry point.
//!
//! Initializes the configured datasources, optionally swaps primary and
//! secondary, and prints a JSON summary of the registry.

use clap::Parser;
use datasource_registry::config::Config;
use datasource_registry::db::{DatasourceRegistry, TableRegistry};
use datasource_registry::models::{DatasourceId, SqlHosts};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

async fn run(config: &Config, registry: &DatasourceRegistry) -> Result<(), Box<dyn std::error::Error>> {
    let primary = registry
        .init(DatasourceId::PRIMARY, config.primary.as_deref())
        .await?;
    info!(key = %primary.key, kind = %primary.kind, "Primary datasource ready");

    if config.wants_secondary() {
        match registry
            .init(DatasourceId::SECONDARY, config.secondary.as_deref())
            .await
        {
            Ok(secondary) => {
                info!(key = %secondary.key, kind = %secondary.kind, "Secondary datasource ready")
            }
            Err(e) => warn!(error = %e, "Secondary datasource unavailable"),
        }
    }

    if config.swap {
        let outcome = registry.swap().await;
        if !outcome.is_swapped() {
            warn!("Swap requested but skipped: {}", outcome);
        }
    }

    if config.trace {
        registry.trace_on().await;
        let mapper = registry.default_mapper(DatasourceId::PRIMARY).await?;
        mapper.select_i64("SELECT 1").await?;
    }

    let summary = registry.list().await;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    info!(
        hosts = %config.hosts.display(),
        "Starting dsreg v{}",
        env!("CARGO_PKG_VERSION")
    );

    let hosts = SqlHosts::from_path(&config.hosts)?;
    info!(count = hosts.len(), "Loaded host descriptors");

    let registry = DatasourceRegistry::new(hosts, TableRegistry::new(), config.registry_options());

    let result = run(&config, &registry).await;
    registry.close_all().await;

    if let Err(e) = result {
        error!(error = %e, "dsreg failed");
        return Err(e);
    }

    info!("All datasources closed");
    Ok(())
}
