// Exhaustive offset pagination over one subgraph collection

use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::models::IndexedRecord;
use crate::source::{CollectionSource, OrderDirection, PageQuery};

pub const DEFAULT_PAGE_SIZE: u64 = 1000;
const ORDER_KEY: &str = "requestId";

/// Receives each page in fetch order.
pub trait PageSink<T> {
    fn push_page(&mut self, page: &[T]);
}

impl<T: Clone> PageSink<T> for Vec<T> {
    fn push_page(&mut self, page: &[T]) {
        self.extend_from_slice(page);
    }
}

impl<T, A: PageSink<T>, B: PageSink<T>> PageSink<T> for (A, B) {
    fn push_page(&mut self, page: &[T]) {
        self.0.push_page(page);
        self.1.push_page(page);
    }
}

/// How a pagination stream ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FetchStatus {
    /// A short page was received.
    Complete,
    /// Failed after at least one page; earlier pages are kept.
    Partial { error: String },
    /// Failed before any page arrived.
    Failed { error: String },
}

impl FetchStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, FetchStatus::Complete)
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    Finished { pages: u64, records: u64, status: FetchStatus },
    Cancelled,
}

/// A fully assembled, immutable collection.
#[derive(Debug, Clone)]
pub struct Collection<T> {
    pub records: Arc<[T]>,
    pub pages: u64,
    pub status: FetchStatus,
}

impl<T> Collection<T> {
    pub fn new(records: Vec<T>, pages: u64, status: FetchStatus) -> Self {
        Self {
            records: records.into(),
            pages,
            status,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Requests successive pages of `T` until a short page arrives.
pub struct PaginationFetcher<'a, T> {
    source: &'a dyn CollectionSource,
    page_size: u64,
    cancel: CancellationToken,
    _record: PhantomData<fn() -> T>,
}

impl<'a, T: IndexedRecord> PaginationFetcher<'a, T> {
    pub fn new(source: &'a dyn CollectionSource, page_size: u64, cancel: CancellationToken) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            cancel,
            _record: PhantomData,
        }
    }

    fn page_query(&self, page: u64) -> PageQuery {
        PageQuery {
            collection: T::COLLECTION,
            fields: T::FIELDS,
            first: self.page_size,
            skip: page * self.page_size,
            order_by: ORDER_KEY,
            order_direction: OrderDirection::Desc,
        }
    }

    async fn fetch_one(&self, query: &PageQuery) -> Result<Vec<T>, FetchError> {
        let entries = self.source.fetch_page(query).await?;
        entries
            .into_iter()
            .map(|entry| {
                serde_json::from_value(entry).map_err(|e| {
                    FetchError::Malformed(format!("bad {} entry: {}", T::COLLECTION, e))
                })
            })
            .collect()
    }

    /// Stream every page into `sink`.
    ///
    /// Transport and parse failures end the stream with a `Partial` or
    /// `Failed` status; they are never returned as errors.
    pub async fn fetch_into<K: PageSink<T>>(&self, sink: &mut K) -> FetchOutcome {
        let mut pages = 0u64;
        let mut records = 0u64;

        loop {
            let query = self.page_query(pages);

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Fetch of {} cancelled after {} pages", T::COLLECTION, pages);
                    return FetchOutcome::Cancelled;
                }
                result = self.fetch_one(&query) => result,
            };

            let page = match result {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        "Fetching {} stopped at skip={}: {}",
                        T::COLLECTION, query.skip, e
                    );
                    let error = e.to_string();
                    let status = if pages == 0 {
                        FetchStatus::Failed { error }
                    } else {
                        FetchStatus::Partial { error }
                    };
                    return FetchOutcome::Finished { pages, records, status };
                }
            };

            pages += 1;
            records += page.len() as u64;
            debug!("Fetched {} {} at skip={}", page.len(), T::COLLECTION, query.skip);
            sink.push_page(&page);

            if (page.len() as u64) < self.page_size {
                info!("Fetched {} {} in {} pages", records, T::COLLECTION, pages);
                return FetchOutcome::Finished {
                    pages,
                    records,
                    status: FetchStatus::Complete,
                };
            }
        }
    }

    /// Collect every page into an immutable collection.
    pub async fn fetch_all(&self) -> Option<Collection<T>>
    where
        T: Clone,
    {
        let mut records = Vec::new();
        match self.fetch_into(&mut records).await {
            FetchOutcome::Finished { pages, status, .. } => {
                Some(Collection::new(records, pages, status))
            }
            FetchOutcome::Cancelled => None,
        }
    }
}
