// Remote collection source backed by the OAO subgraph

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;

/// One page request against a named collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageQuery {
    pub collection: &'static str,
    pub fields: &'static [&'static str],
    pub first: u64,
    pub skip: u64,
    pub order_by: &'static str,
    pub order_direction: OrderDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "asc",
            OrderDirection::Desc => "desc",
        }
    }
}

impl PageQuery {
    pub fn to_graphql(&self) -> String {
        format!(
            "{{ {}(first: {}, orderBy: {}, orderDirection: {}, skip: {}) {{ {} }} }}",
            self.collection,
            self.first,
            self.order_by,
            self.order_direction.as_str(),
            self.skip,
            self.fields.join(" ")
        )
    }
}

/// Anything that can serve one page of a collection as raw JSON entries.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    /// Endpoint identity, used for cache keys and logs.
    fn endpoint(&self) -> &str;

    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<Value>, FetchError>;
}

#[derive(Debug, Deserialize)]
struct GraphResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
}

/// GraphQL subgraph endpoint.
pub struct GraphSource {
    http_client: HttpClient,
    graph_url: String,
}

impl GraphSource {
    pub fn new(graph_url: String, page_timeout: Duration) -> Result<Self, FetchError> {
        let http_client = HttpClient::builder().timeout(page_timeout).build()?;
        Ok(Self {
            http_client,
            graph_url,
        })
    }
}

#[async_trait]
impl CollectionSource for GraphSource {
    fn endpoint(&self) -> &str {
        &self.graph_url
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<Value>, FetchError> {
        let payload = json!({ "query": query.to_graphql() });

        debug!(
            "Requesting {} (first={}, skip={})",
            query.collection, query.first, query.skip
        );

        let resp = self
            .http_client
            .post(&self.graph_url)
            .json(&payload)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?
            .error_for_status()
            .map_err(FetchError::from_reqwest)?;

        let graph_resp: GraphResponse = resp.json().await.map_err(FetchError::from_reqwest)?;

        if let Some(first_error) = graph_resp.errors.first() {
            return Err(FetchError::Query(first_error.message.clone()));
        }

        let mut data = graph_resp
            .data
            .ok_or_else(|| FetchError::Malformed("no data in response".to_string()))?;

        match data.get_mut(query.collection).map(Value::take) {
            Some(Value::Array(entries)) => Ok(entries),
            Some(other) => Err(FetchError::Malformed(format!(
                "{} is not a list: {}",
                query.collection, other
            ))),
            None => Err(FetchError::Malformed(format!(
                "{} missing from response",
                query.collection
            ))),
        }
    }
}
