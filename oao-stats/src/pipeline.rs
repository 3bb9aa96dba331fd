// Fetch -> join -> aggregate pipeline

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::MetricsConfig;
use crate::fetcher::{Collection, FetchOutcome, PaginationFetcher};
use crate::joiner::join_preview;
use crate::metrics::{MetricsAggregator, MetricsSnapshot};
use crate::models::{JoinedPreviewEntry, RequestRecord, ResultRecord};
use crate::price::{CurrencyConverter, PriceSource};
use crate::source::CollectionSource;

/// Everything one refresh produced.
#[derive(Debug, Clone)]
pub struct LoadedView {
    pub requests: Collection<RequestRecord>,
    pub results: Collection<ResultRecord>,
    pub snapshot: MetricsSnapshot,
    pub preview: Vec<JoinedPreviewEntry>,
    pub converter: CurrencyConverter,
    pub price_error: Option<String>,
}

pub struct Pipeline {
    source: Arc<dyn CollectionSource>,
    price_source: Arc<dyn PriceSource>,
    page_size: u64,
    metrics: MetricsConfig,
    preview_size: usize,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn CollectionSource>,
        price_source: Arc<dyn PriceSource>,
        page_size: u64,
        metrics: MetricsConfig,
        preview_size: usize,
    ) -> Self {
        Self {
            source,
            price_source,
            page_size,
            metrics,
            preview_size,
        }
    }

    /// Run one full pass evaluated at `now`.
    ///
    /// Returns `None` when cancelled; nothing fetched so far is kept.
    pub async fn run(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> Option<LoadedView> {
        let aggregator = MetricsAggregator::new(self.metrics.clone(), now);

        let request_fetcher: PaginationFetcher<'_, RequestRecord> =
            PaginationFetcher::new(self.source.as_ref(), self.page_size, cancel.clone());
        let result_fetcher: PaginationFetcher<'_, ResultRecord> =
            PaginationFetcher::new(self.source.as_ref(), self.page_size, cancel.clone());

        let mut request_sink = (Vec::new(), aggregator.request_tally());
        let mut result_sink = (Vec::new(), aggregator.result_tally());

        let price_fetch = async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.price_source.spot_price() => Some(result),
            }
        };

        let (request_outcome, result_outcome, price) = tokio::join!(
            request_fetcher.fetch_into(&mut request_sink),
            result_fetcher.fetch_into(&mut result_sink),
            price_fetch,
        );

        let (
            FetchOutcome::Finished { pages: request_pages, status: request_status, .. },
            FetchOutcome::Finished { pages: result_pages, status: result_status, .. },
            Some(price),
        ) = (request_outcome, result_outcome, price)
        else {
            info!("Refresh cancelled, discarding fetched data");
            return None;
        };

        let price_error = price.as_ref().err().map(|e| e.to_string());
        let converter = CurrencyConverter::from_fetch(price);

        let (request_records, request_tally) = request_sink;
        let (result_records, result_tally) = result_sink;
        let snapshot = aggregator.finish(request_tally, result_tally);

        let requests = Collection::new(request_records, request_pages, request_status);
        let results = Collection::new(result_records, result_pages, result_status);
        let preview = join_preview(&requests.records, &results.records, self.preview_size);

        info!(
            "Aggregated {} requests and {} results",
            snapshot.total_requests, snapshot.total_results
        );

        Some(LoadedView {
            requests,
            results,
            snapshot,
            preview,
            converter,
            price_error,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{FetchError, PriceError};
    use crate::fetcher::FetchStatus;
    use crate::metrics::tests::{metrics_config, now};
    use crate::price::{scale_price_from_f64, SpotPrice};
    use crate::source::PageQuery;
    use alloy_primitives::U256;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;

    /// Serves both collections from memory.
    pub(crate) struct MemorySource {
        pub requests: Vec<Value>,
        pub results: Vec<Value>,
        pub fail_results: bool,
        pub delay: Duration,
    }

    #[async_trait]
    impl CollectionSource for MemorySource {
        fn endpoint(&self) -> &str {
            "mock://graph"
        }

        async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<Value>, FetchError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let entries = match query.collection {
                "aicallbackRequests" => &self.requests,
                _ if self.fail_results => return Err(FetchError::Timeout),
                _ => &self.results,
            };
            Ok(entries
                .iter()
                .skip(query.skip as usize)
                .take(query.first as usize)
                .cloned()
                .collect())
        }
    }

    pub(crate) struct FixedPrice(pub Option<f64>);

    #[async_trait]
    impl PriceSource for FixedPrice {
        async fn spot_price(&self) -> Result<SpotPrice, PriceError> {
            match self.0 {
                Some(rate) => Ok(SpotPrice {
                    asset: "ethereum".to_string(),
                    currency: "usd".to_string(),
                    rate: scale_price_from_f64(rate)?,
                    fetched_at: now(),
                }),
                None => Err(PriceError::MissingAsset("ethereum".to_string())),
            }
        }
    }

    pub(crate) fn request_entry(request_id: u64, model_id: &str, value: &str) -> Value {
        json!({
            "id": format!("req-{}", request_id),
            "account": "0xE75AF5294F4CB4A8423EF8260595A54298C7A2FB",
            "requestId": request_id.to_string(),
            "modelId": model_id,
            "input": format!("0x{}", hex::encode(format!("prompt {}", request_id))),
            "gasPrice": "1000000000",
            "gasUsed": "100000",
            "value": value,
            "blockTimestamp": now().timestamp().to_string(),
        })
    }

    pub(crate) fn result_entry(request_id: u64) -> Value {
        json!({
            "id": format!("res-{}", request_id),
            "requestId": request_id.to_string(),
            "output": format!("0x{}", hex::encode(format!("answer {}", request_id))),
            "gasPrice": "1000000000",
            "gasUsed": "50000",
        })
    }

    pub(crate) fn memory_source() -> MemorySource {
        MemorySource {
            requests: (1..=5)
                .rev()
                .map(|i| request_entry(i, if i % 2 == 0 { "50" } else { "11" }, "1000000000000000000"))
                .collect(),
            results: vec![result_entry(5), result_entry(3), result_entry(1)],
            fail_results: false,
            delay: Duration::ZERO,
        }
    }

    fn pipeline(source: MemorySource, price: Option<f64>) -> Pipeline {
        Pipeline::new(Arc::new(source), Arc::new(FixedPrice(price)), 2, metrics_config(), 3)
    }

    #[tokio::test]
    async fn test_full_pass() {
        let view = pipeline(memory_source(), Some(2000.0))
            .run(now(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(view.requests.len(), 5);
        assert_eq!(view.requests.pages, 3);
        assert_eq!(view.requests.status, FetchStatus::Complete);
        assert_eq!(view.results.len(), 3);
        assert_eq!(view.snapshot.total_requests, 5);
        assert_eq!(view.snapshot.count_by_model["11"], 3);
        assert_eq!(view.snapshot.count_by_account["0xe75af5294f4cb4a8423ef8260595a54298c7a2fb"], 5);
        assert_eq!(view.snapshot.total_revenue, U256::from(5_000_000_000_000_000_000u64));

        let ids: Vec<&str> = view.preview.iter().map(|e| e.request_id.as_str()).collect();
        assert_eq!(ids, vec!["5", "4", "3"]);
        assert!(view.preview[0].output.is_some());
        assert!(view.preview[1].output.is_none());
        assert_eq!(view.converter.to_fiat_f64(view.snapshot.total_revenue), Some(10_000.0));
        assert!(view.price_error.is_none());
    }

    #[tokio::test]
    async fn test_failed_results_stream_degrades() {
        let mut source = memory_source();
        source.fail_results = true;
        let view = pipeline(source, Some(2000.0)).run(now(), &CancellationToken::new()).await.unwrap();

        assert!(matches!(view.results.status, FetchStatus::Failed { .. }));
        assert_eq!(view.requests.status, FetchStatus::Complete);
        assert_eq!(view.snapshot.total_requests, 5);
        assert_eq!(view.snapshot.total_result_gas, U256::ZERO);
        assert!(view.preview.iter().all(|e| e.output.is_none()));
    }

    #[tokio::test]
    async fn test_price_failure_keeps_native_figures() {
        let view = pipeline(memory_source(), None).run(now(), &CancellationToken::new()).await.unwrap();

        assert!(!view.converter.fiat_available());
        assert!(view.price_error.is_some());
        assert_eq!(view.snapshot.total_revenue, U256::from(5_000_000_000_000_000_000u64));
    }

    #[tokio::test]
    async fn test_cancelled_run_yields_nothing() {
        let mut source = memory_source();
        source.delay = Duration::from_secs(30);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(pipeline(source, Some(1.0)).run(now(), &cancel).await.is_none());
    }
}
