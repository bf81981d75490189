use anyhow::Context;
use clap::Parser;
use keyway_cache::MokaLookupCache;
use keyway_core::{IdentifierAllocator, MappingStore};
use keyway_gateway::cli::{AllocatorArg, StorageBackendArg, CLI};
use keyway_gateway::{App, AppState};
use keyway_idalloc::{BlockAllocator, Flake, FlakeSettings, InMemoryBlockAuthority};
use keyway_shortener::ShortenerService;
use keyway_storage::{MemoryShard, MySqlBlockAuthority, MySqlShard, Reaper, ShardedStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::try_parse()?;
    keyway_telemetry::init(config.log_format.into())?;

    info!(
        listen_addr = %config.listen_addr,
        node_id = config.node_id,
        storage_backend = %config.storage,
        allocator = %config.allocator,
        "starting keyway gateway"
    );

    let store = build_store(&config).await?;
    let allocator = build_allocator(&config).await?;
    let cache = MokaLookupCache::new(config.cache_settings());
    let service = ShortenerService::new(
        Arc::clone(&store),
        cache,
        allocator,
        config.service_settings(),
    );
    let state = AppState::new(Arc::new(service), config.public_base_url.clone());

    let (stop_reaper, reaper_stopped) = oneshot::channel::<()>();
    let reaper = tokio::spawn(
        Reaper::new(Arc::clone(&store), config.reaper_interval()).run_until(async move {
            let _ = reaper_stopped.await;
        }),
    );

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "listening");

    axum::serve(listener, App::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    let _ = stop_reaper.send(());
    reaper.await.context("reaper task panicked")?;
    info!("keyway gateway stopped");
    Ok(())
}

async fn build_store(config: &CLI) -> anyhow::Result<Arc<dyn MappingStore>> {
    match config.storage {
        StorageBackendArg::InMemory => {
            let shards = (0..config.shards.max(1)).map(|_| MemoryShard::new()).collect();
            Ok(Arc::new(ShardedStore::with_uniform_routing(shards)?))
        }
        StorageBackendArg::Mysql => {
            let mut shards = Vec::with_capacity(config.mysql_shard_dsns.len());
            for dsn in &config.mysql_shard_dsns {
                shards.push(MySqlShard::connect(dsn).await?);
            }
            info!(shards = shards.len(), "connected mysql shards");
            Ok(Arc::new(ShardedStore::with_uniform_routing(shards)?))
        }
    }
}

async fn build_allocator(config: &CLI) -> anyhow::Result<Arc<dyn IdentifierAllocator>> {
    match config.allocator {
        AllocatorArg::Flake => {
            let settings = FlakeSettings::builder()
                .node_id(config.node_id)
                .start_epoch(config.flake_epoch)
                .build();
            Ok(Arc::new(Flake::new(settings)?))
        }
        AllocatorArg::Block => match config.authority_dsn() {
            Some(dsn) if config.storage == StorageBackendArg::Mysql => {
                let authority = MySqlBlockAuthority::connect(dsn).await?;
                Ok(Arc::new(BlockAllocator::with_block_size(
                    authority,
                    config.node_id,
                    config.block_size,
                )))
            }
            _ => Ok(Arc::new(BlockAllocator::with_block_size(
                InMemoryBlockAuthority::new(),
                config.node_id,
                config.block_size,
            ))),
        },
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
