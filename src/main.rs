//! gridcache demo
//!
//! Boots an in-process cluster, replicates a batch of writes, reads them back
//! lazily on another member, compacts, and exercises the cluster loader.
//!
//! ```text
//!  node-0 ──put──▶ replicate ──▶ node-1 .. node-N   (bytes only)
//!  node-N ──get──▶ deserialize on first read
//!  node-N ──get(miss)──▶ clustered get ──▶ node-0
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use futures::future::try_join_all;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gridcache::{
    Address, Cache, CacheConfig, CacheManager, CacheMode, Error, Flag, LocalCluster, Result,
    VersionAwareMarshaller,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// gridcache - replicated cache with lazy deserialization
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of cluster members to start
    #[arg(long, env = "GRIDCACHE_NODES", default_value = "3")]
    nodes: usize,

    /// Number of entries to write
    #[arg(long, env = "GRIDCACHE_ENTRIES", default_value = "10")]
    entries: usize,

    /// Store plain objects instead of marshalled values
    #[arg(long, env = "GRIDCACHE_EAGER")]
    eager: bool,

    /// Cluster loader timeout in milliseconds
    #[arg(long, env = "GRIDCACHE_REMOTE_CALL_TIMEOUT_MS", default_value = "5000")]
    remote_call_timeout_ms: u64,

    /// Cache configuration file (YAML); overrides the flags above
    #[arg(long, env = "GRIDCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

const CACHE_NAME: &str = "demo";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = match &args.config {
        Some(path) => CacheConfig::from_file(path)?,
        None => CacheConfig::replicated(CacheMode::ReplSync)
            .with_lazy_deserialization(!args.eager)
            .with_cluster_loader(args.remote_call_timeout_ms),
    };
    if args.nodes < 2 {
        return Err(Error::Config("at least two nodes are needed".into()));
    }

    info!("Starting gridcache demo");
    info!("  Nodes: {}", args.nodes);
    info!("  Entries: {}", args.entries);
    info!("  Cache mode: {}", config.cache_mode);
    info!("  Lazy deserialization: {}", config.use_lazy_deserialization);

    let cluster = LocalCluster::new();
    let managers: Vec<Arc<CacheManager>> = (0..args.nodes)
        .map(|i| {
            CacheManager::clustered_as(
                &cluster,
                Address::new(format!("node-{i}")),
                VersionAwareMarshaller::with_builtins(),
            )
        })
        .collect();

    let caches = try_join_all(
        managers
            .iter()
            .map(|m| m.define_cache(CACHE_NAME, config.clone())),
    )
    .await?;
    info!("Cluster formed: {:?}", cluster.members());

    let (writer, reader) = match (caches.first(), caches.last()) {
        (Some(writer), Some(reader)) => (writer, reader),
        _ => return Err(Error::Internal("no caches defined".into())),
    };

    run_demo(writer, reader, args.entries).await?;

    for cache in &caches {
        cache.compact()?;
    }
    info!("Compacted every member");

    for (manager, cache) in managers.iter().zip(&caches) {
        let snapshot = serde_json::to_string(&cache.stats().snapshot())
            .map_err(|e| Error::Internal(format!("Failed to encode statistics: {}", e)))?;
        info!(node = %manager.address(), "stats {}", snapshot);
    }

    for manager in &managers {
        manager.stop().await?;
    }
    info!("Demo complete");
    Ok(())
}

async fn run_demo(writer: &Cache, reader: &Cache, entries: usize) -> Result<()> {
    for i in 0..entries {
        writer.put(format!("key-{i}"), i as i64).await?;
    }
    info!("Wrote {} entries on {}", entries, writer.name());

    let mut found = 0;
    for i in 0..entries {
        if reader.get(format!("key-{i}")).await?.is_some() {
            found += 1;
        }
    }
    info!("Read {}/{} entries on the last member", found, entries);

    // Only the writer holds this one; the reader must ask the cluster
    writer
        .with_flags(&[Flag::CacheModeLocal])
        .put("local-only", "hello")
        .await?;
    match reader.get("local-only").await? {
        Some(value) => info!("Cluster loader fetched {:?}", value),
        None => warn!("Cluster loader found nothing; is cluster_loader configured?"),
    }

    let keys = reader.key_set().await?;
    info!("Last member holds {} keys", keys.len());
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
