// TTL page cache in front of a collection source

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::FetchError;
use crate::source::{CollectionSource, OrderDirection, PageQuery};

/// Identity of one cached page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub endpoint: String,
    pub collection: &'static str,
    pub first: u64,
    pub order_by: &'static str,
    pub order_direction: OrderDirection,
    pub skip: u64,
}

impl PageKey {
    fn new(endpoint: &str, query: &PageQuery) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            collection: query.collection,
            first: query.first,
            order_by: query.order_by,
            order_direction: query.order_direction,
            skip: query.skip,
        }
    }
}

struct CachedPage {
    fetched_at: Instant,
    entries: Arc<Vec<Value>>,
}

/// Serves pages from memory while they are younger than the TTL.
///
/// Only successful pages are stored, so a failed request is always retried
/// on the next refresh.
pub struct PageCache<S> {
    inner: S,
    ttl: Duration,
    pages: RwLock<HashMap<PageKey, CachedPage>>,
}

impl<S: CollectionSource> PageCache<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            pages: RwLock::new(HashMap::new()),
        }
    }

    async fn lookup(&self, key: &PageKey) -> Option<Arc<Vec<Value>>> {
        let pages = self.pages.read().await;
        pages
            .get(key)
            .filter(|page| page.fetched_at.elapsed() < self.ttl)
            .map(|page| page.entries.clone())
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.pages.read().await.len()
    }
}

#[async_trait]
impl<S: CollectionSource> CollectionSource for PageCache<S> {
    fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<Value>, FetchError> {
        let key = PageKey::new(self.inner.endpoint(), query);

        if let Some(entries) = self.lookup(&key).await {
            debug!("Cache hit for {} skip={}", query.collection, query.skip);
            return Ok(entries.as_ref().clone());
        }

        let entries = self.inner.fetch_page(query).await?;

        let mut pages = self.pages.write().await;
        let ttl = self.ttl;
        pages.retain(|_, page| page.fetched_at.elapsed() < ttl);
        pages.insert(
            key,
            CachedPage {
                fetched_at: Instant::now(),
                entries: Arc::new(entries.clone()),
            },
        );

        Ok(entries)
    }
}
