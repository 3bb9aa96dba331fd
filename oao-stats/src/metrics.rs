// Streaming aggregation of request/result collections into one snapshot

use alloy_primitives::{utils::format_ether, U256};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::MetricsConfig;
use crate::fetcher::PageSink;
use crate::models::{gas_cost, parse_base_units, parse_block_timestamp, RequestRecord, ResultRecord};

/// Width of the recent revenue window.
pub const RECENT_WINDOW_SECS: i64 = 30 * 24 * 60 * 60;

/// Revenue collected on one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: U256,
}

/// Aggregate statistics over both collections at one evaluation instant.
///
/// Monetary fields are exact wei amounts.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub evaluated_at: DateTime<Utc>,
    pub total_requests: u64,
    pub total_results: u64,
    pub count_by_model: BTreeMap<String, u64>,
    pub percentage_by_model: BTreeMap<String, f64>,
    /// Keyed by lowercased address.
    pub count_by_account: BTreeMap<String, u64>,
    pub total_revenue: U256,
    pub revenue_last_30_days: U256,
    pub highest_daily_revenue: U256,
    /// Ascending by date.
    pub daily_revenue: Vec<DailyRevenue>,
    pub total_request_gas: U256,
    pub total_result_gas: U256,
    pub total_gas: U256,
    pub malformed_records: u64,
}

/// `count / total * 100`, defined as 0 for an empty dataset.
pub fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Lossy conversion of a wei amount to ether for display.
pub fn wei_to_ether_f64(wei: U256) -> f64 {
    format_ether(wei).parse().unwrap_or(0.0)
}

/// Running totals over the request collection.
#[derive(Debug, Clone)]
pub struct RequestTally {
    window_start: i64,
    tracked_models: Vec<String>,
    tracked_accounts: Vec<String>,
    total_requests: u64,
    count_by_model: BTreeMap<String, u64>,
    count_by_account: BTreeMap<String, u64>,
    total_revenue: U256,
    revenue_last_30_days: U256,
    daily: BTreeMap<NaiveDate, U256>,
    request_gas: U256,
    malformed: u64,
}

impl RequestTally {
    fn new(config: &MetricsConfig, now: DateTime<Utc>) -> Self {
        let tracked_models: Vec<String> = config.models.iter().map(|m| m.id.clone()).collect();
        let tracked_accounts: Vec<String> =
            config.accounts.iter().map(|a| a.address.to_lowercase()).collect();

        Self {
            window_start: now.timestamp() - RECENT_WINDOW_SECS,
            count_by_model: tracked_models.iter().map(|id| (id.clone(), 0)).collect(),
            count_by_account: tracked_accounts.iter().map(|a| (a.clone(), 0)).collect(),
            tracked_models,
            tracked_accounts,
            total_requests: 0,
            total_revenue: U256::ZERO,
            revenue_last_30_days: U256::ZERO,
            daily: BTreeMap::new(),
            request_gas: U256::ZERO,
            malformed: 0,
        }
    }

    pub fn push(&mut self, record: &RequestRecord) {
        self.total_requests += 1;

        if self.tracked_models.iter().any(|id| *id == record.model_id) {
            *self.count_by_model.entry(record.model_id.clone()).or_default() += 1;
        }

        let account = record.account.to_lowercase();
        if self.tracked_accounts.contains(&account) {
            *self.count_by_account.entry(account).or_default() += 1;
        }

        let mut malformed = false;

        match gas_cost(&record.gas_used, &record.gas_price) {
            Some(cost) => self.request_gas = self.request_gas.saturating_add(cost),
            None => malformed = true,
        }

        let value = parse_base_units(&record.value);
        let timestamp = parse_block_timestamp(&record.block_timestamp);
        match (value, timestamp) {
            (Some(value), Some(timestamp)) => {
                self.total_revenue = self.total_revenue.saturating_add(value);
                if timestamp.timestamp() >= self.window_start {
                    self.revenue_last_30_days = self.revenue_last_30_days.saturating_add(value);
                }
                let bucket = self.daily.entry(timestamp.date_naive()).or_insert(U256::ZERO);
                *bucket = bucket.saturating_add(value);
            }
            _ => malformed = true,
        }

        if malformed {
            debug!("Request {} has malformed numeric fields", record.request_id);
            self.malformed += 1;
        }
    }
}

impl PageSink<RequestRecord> for RequestTally {
    fn push_page(&mut self, page: &[RequestRecord]) {
        page.iter().for_each(|record| self.push(record));
    }
}

/// Running totals over the result collection.
#[derive(Debug, Clone, Default)]
pub struct ResultTally {
    total_results: u64,
    result_gas: U256,
    malformed: u64,
}

impl ResultTally {
    pub fn push(&mut self, record: &ResultRecord) {
        self.total_results += 1;
        match gas_cost(&record.gas_used, &record.gas_price) {
            Some(cost) => self.result_gas = self.result_gas.saturating_add(cost),
            None => self.malformed += 1,
        }
    }
}

impl PageSink<ResultRecord> for ResultTally {
    fn push_page(&mut self, page: &[ResultRecord]) {
        page.iter().for_each(|record| self.push(record));
    }
}

/// Builds tallies for one pass and finishes them into a snapshot.
pub struct MetricsAggregator {
    config: MetricsConfig,
    evaluated_at: DateTime<Utc>,
}

impl MetricsAggregator {
    pub fn new(config: MetricsConfig, evaluated_at: DateTime<Utc>) -> Self {
        Self {
            config,
            evaluated_at,
        }
    }

    pub fn request_tally(&self) -> RequestTally {
        RequestTally::new(&self.config, self.evaluated_at)
    }

    pub fn result_tally(&self) -> ResultTally {
        ResultTally::default()
    }

    /// Close a pass once both streams have been fully folded.
    pub fn finish(&self, requests: RequestTally, results: ResultTally) -> MetricsSnapshot {
        let total = requests.total_requests;
        let percentage_by_model = requests
            .count_by_model
            .iter()
            .map(|(id, count)| (id.clone(), percentage(*count, total)))
            .collect();

        let daily_revenue: Vec<DailyRevenue> = requests
            .daily
            .into_iter()
            .map(|(date, revenue)| DailyRevenue { date, revenue })
            .collect();
        let highest_daily_revenue =
            daily_revenue.iter().map(|d| d.revenue).max().unwrap_or(U256::ZERO);

        MetricsSnapshot {
            evaluated_at: self.evaluated_at,
            total_requests: total,
            total_results: results.total_results,
            count_by_model: requests.count_by_model,
            percentage_by_model,
            count_by_account: requests.count_by_account,
            total_revenue: requests.total_revenue,
            revenue_last_30_days: requests.revenue_last_30_days,
            highest_daily_revenue,
            daily_revenue,
            total_request_gas: requests.request_gas,
            total_result_gas: results.result_gas,
            total_gas: requests.request_gas.saturating_add(results.result_gas),
            malformed_records: requests.malformed + results.malformed,
        }
    }

    /// Single pass over already assembled collections.
    pub fn aggregate(&self, requests: &[RequestRecord], results: &[ResultRecord]) -> MetricsSnapshot {
        let mut request_tally = self.request_tally();
        request_tally.push_page(requests);
        let mut result_tally = self.result_tally();
        result_tally.push_page(results);
        self.finish(request_tally, result_tally)
    }
}
