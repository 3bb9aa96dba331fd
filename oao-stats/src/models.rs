// Subgraph record models for the OAO stats backend

use alloy_primitives::U256;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::decoder::DecodedPayload;

/// A record type served as one named collection by the subgraph.
pub trait IndexedRecord: serde::de::DeserializeOwned + Send + 'static {
    /// Collection name in the GraphQL schema.
    const COLLECTION: &'static str;
    /// Selection set requested for each entry.
    const FIELDS: &'static [&'static str];

    fn request_id(&self) -> &str;
}

/// AI callback request emitted by the OAO contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub id: String,
    pub account: String,
    pub request_id: String,
    pub model_id: String,
    #[serde(default)]
    pub transaction_hash: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub gas_price: String,
    #[serde(default)]
    pub gas_used: String,
    #[serde(default)]
    pub cumulative_gas_used: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub block_timestamp: String,
}

impl IndexedRecord for RequestRecord {
    const COLLECTION: &'static str = "aicallbackRequests";
    const FIELDS: &'static [&'static str] = &[
        "id",
        "account",
        "requestId",
        "modelId",
        "transactionHash",
        "input",
        "gasPrice",
        "gasUsed",
        "cumulativeGasUsed",
        "value",
        "blockTimestamp",
    ];

    fn request_id(&self) -> &str {
        &self.request_id
    }
}

/// AI callback result delivered back on-chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    #[serde(default)]
    pub id: String,
    pub request_id: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub gas_price: String,
    #[serde(default)]
    pub gas_used: String,
    #[serde(default)]
    pub cumulative_gas_used: String,
    #[serde(default)]
    pub block_timestamp: String,
}

impl IndexedRecord for ResultRecord {
    const COLLECTION: &'static str = "aicallbackResults";
    const FIELDS: &'static [&'static str] = &[
        "id",
        "requestId",
        "output",
        "gasPrice",
        "gasUsed",
        "cumulativeGasUsed",
        "blockTimestamp",
    ];

    fn request_id(&self) -> &str {
        &self.request_id
    }
}

/// One decoded request/result pair shown in the preview
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedPreviewEntry {
    pub request_id: String,
    pub model_id: String,
    pub input: DecodedPayload,
    /// `None` when no result has been indexed for the request yet.
    pub output: Option<DecodedPayload>,
}

/// Parse a base-unit integer string. Accepts decimal or `0x` hex.
pub fn parse_base_units(raw: &str) -> Option<U256> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.strip_prefix("0x") {
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16).ok(),
        None => U256::from_str_radix(raw, 10).ok(),
    }
}

/// Parse a unix-seconds timestamp string.
pub fn parse_block_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = raw.trim().parse().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

/// Gas cost in wei for a `gasUsed * gasPrice` pair.
pub fn gas_cost(gas_used: &str, gas_price: &str) -> Option<U256> {
    let used = parse_base_units(gas_used)?;
    let price = parse_base_units(gas_price)?;
    Some(used.saturating_mul(price))
}
