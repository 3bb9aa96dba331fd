// Background refresh of the stats view

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::pipeline::{LoadedView, Pipeline};

/// Holds the most recent complete view and recomputes it on an interval.
pub struct StatsService {
    pipeline: Pipeline,
    refresh_interval: Duration,
    latest: RwLock<Option<Arc<LoadedView>>>,
}

impl StatsService {
    pub fn new(pipeline: Pipeline, refresh_interval: Duration) -> Self {
        Self {
            pipeline,
            refresh_interval,
            latest: RwLock::new(None),
        }
    }

    pub async fn latest(&self) -> Option<Arc<LoadedView>> {
        self.latest.read().await.clone()
    }

    /// Run one pass and publish it. Returns false if it was cancelled.
    pub async fn refresh(&self, cancel: &CancellationToken) -> bool {
        let Some(view) = self.pipeline.run(Utc::now(), cancel).await else {
            return false;
        };

        if cancel.is_cancelled() {
            return false;
        }

        if !view.requests.status.is_complete() || !view.results.status.is_complete() {
            warn!(
                "Publishing partial stats: requests={:?} results={:?}",
                view.requests.status, view.results.status
            );
        }

        *self.latest.write().await = Some(Arc::new(view));
        true
    }

    /// Spawn the periodic refresh loop; it stops when `cancel` fires.
    pub fn spawn_refresh_task(
        self: Arc<Self>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Stats refresh task started (interval: {}s)",
                self.refresh_interval.as_secs()
            );

            let mut ticker = tokio::time::interval(self.refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Stats refresh task shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.refresh(&cancel).await;
                    }
                }
            }
        })
    }
}
