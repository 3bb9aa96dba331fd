// OAO Stats Server
// Serves aggregated callback statistics from the OAO subgraph

use anyhow::Result;
use oao_stats::api::{router, AppState};
use oao_stats::cache::PageCache;
use oao_stats::config::Config;
use oao_stats::pipeline::Pipeline;
use oao_stats::price::CoinGeckoSource;
use oao_stats::service::StatsService;
use oao_stats::source::GraphSource;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("oao_stats=info".parse()?)
                .add_directive("hyper=warn".parse()?),
        )
        .init();

    info!("Starting OAO Stats Server");

    let config = Config::from_env()?;

    info!("Configuration:");
    info!("  Subgraph: {}", config.graph_url);
    info!("  Price source: {} ({}/{})", config.price.url, config.price.asset, config.price.currency);
    info!("  Page size: {}", config.page_size);
    info!("  Cache TTL: {}s", config.cache_ttl.as_secs());
    info!("  Refresh interval: {}s", config.refresh_interval.as_secs());
    info!("  Tracked models: {:?}", config.metrics.models);
    info!("  Tracked accounts: {:?}", config.metrics.accounts);
    info!("  Server Port: {}", config.port);

    if !config.cache_ttl.is_zero() && config.cache_ttl < config.refresh_interval {
        warn!(
            "CACHE_TTL_SECS ({}s) is shorter than the refresh interval; cached pages will expire unused",
            config.cache_ttl.as_secs()
        );
    }

    let graph = GraphSource::new(config.graph_url.clone(), config.page_timeout)?;
    let source = Arc::new(PageCache::new(graph, config.cache_ttl));
    let price_source = Arc::new(CoinGeckoSource::new(&config.price, config.page_timeout)?);

    let pipeline = Pipeline::new(
        source,
        price_source,
        config.page_size,
        config.metrics.clone(),
        config.report.preview_size,
    );
    let service = Arc::new(StatsService::new(pipeline, config.refresh_interval));

    // Start refresh loop in background
    let cancel = CancellationToken::new();
    let refresh_handle = service.clone().spawn_refresh_task(cancel.clone());

    let state = Arc::new(AppState {
        service,
        metrics: config.metrics.clone(),
        report: config.report,
    });
    let app = router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("OAO Stats listening on {}", listener.local_addr()?);

    let shutdown = cancel.clone();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown requested");
            shutdown.cancel();
        })
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    cancel.cancel();
    refresh_handle.await?;
    Ok(())
}
