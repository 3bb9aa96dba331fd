// Rendering of a loaded view into the JSON report served to the dashboard

use alloy_primitives::{utils::format_ether, U256};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::config::{DisplayCurrency, MetricsConfig, ReportConfig};
use crate::fetcher::{Collection, FetchStatus};
use crate::metrics::wei_to_ether_f64;
use crate::models::{JoinedPreviewEntry, RequestRecord, ResultRecord};
use crate::pipeline::LoadedView;
use crate::price::CurrencyConverter;

const NATIVE_UNIT: &str = "ETH";

/// A monetary figure in the report's display currency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Amount {
    pub value: f64,
    pub formatted: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyInfo {
    pub mode: DisplayCurrency,
    pub unit: String,
    pub fiat_available: bool,
    pub spot_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamStatus {
    pub records: usize,
    pub pages: u64,
    #[serde(flatten)]
    pub status: FetchStatus,
}

impl<T> From<&Collection<T>> for StreamStatus {
    fn from(collection: &Collection<T>) -> Self {
        Self {
            records: collection.len(),
            pages: collection.pages,
            status: collection.status.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatus {
    pub requests: StreamStatus,
    pub results: StreamStatus,
    pub price_error: Option<String>,
    /// True only when both streams ended on a short page.
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelShare {
    pub id: String,
    pub label: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountCount {
    pub address: String,
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyAmount {
    pub date: NaiveDate,
    pub amount: Amount,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueFigures {
    pub total: Amount,
    pub last_30_days: Amount,
    pub highest_daily: Amount,
    pub daily: Vec<DailyAmount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GasFigures {
    pub requests: Amount,
    pub results: Amount,
    pub total: Amount,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub evaluated_at: DateTime<Utc>,
    pub currency: CurrencyInfo,
    pub status: ReportStatus,
    pub total_requests: u64,
    pub total_results: u64,
    pub malformed_records: u64,
    pub models: Vec<ModelShare>,
    pub accounts: Vec<AccountCount>,
    pub revenue: RevenueFigures,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<GasFigures>,
    pub preview: Vec<JoinedPreviewEntry>,
}

/// Raw collections for diagnostics.
#[derive(Debug, Serialize)]
pub struct DataDump<'a> {
    pub requests: &'a [RequestRecord],
    pub results: &'a [ResultRecord],
}

impl<'a> From<&'a LoadedView> for DataDump<'a> {
    fn from(view: &'a LoadedView) -> Self {
        Self {
            requests: &view.requests.records,
            results: &view.results.records,
        }
    }
}

struct AmountFormatter<'a> {
    converter: Option<&'a CurrencyConverter>,
}

impl AmountFormatter<'_> {
    fn format(&self, wei: U256) -> Amount {
        match self.converter.and_then(|c| c.to_fiat_f64(wei)) {
            Some(value) => Amount {
                value,
                formatted: format!("{:.2}", value),
            },
            None => Amount {
                value: wei_to_ether_f64(wei),
                formatted: format_ether(wei),
            },
        }
    }
}

/// Render `view` under `config`.
///
/// Fiat display falls back to native units when no spot price is available.
pub fn render(view: &LoadedView, metrics: &MetricsConfig, config: &ReportConfig) -> StatsReport {
    let snapshot = &view.snapshot;
    let converter = &view.converter;

    let mode = match config.display_currency {
        DisplayCurrency::Fiat if converter.fiat_available() => DisplayCurrency::Fiat,
        _ => DisplayCurrency::Native,
    };
    let formatter = AmountFormatter {
        converter: (mode == DisplayCurrency::Fiat).then_some(converter),
    };
    let unit = match (mode, converter.price()) {
        (DisplayCurrency::Fiat, Some(price)) => price.currency.to_uppercase(),
        _ => NATIVE_UNIT.to_string(),
    };

    let models = metrics
        .models
        .iter()
        .map(|model| ModelShare {
            id: model.id.clone(),
            label: model.label.clone(),
            count: snapshot.count_by_model.get(&model.id).copied().unwrap_or(0),
            percentage: snapshot.percentage_by_model.get(&model.id).copied().unwrap_or(0.0),
        })
        .collect();

    let accounts = metrics
        .accounts
        .iter()
        .map(|account| {
            let address = account.address.to_lowercase();
            AccountCount {
                count: snapshot.count_by_account.get(&address).copied().unwrap_or(0),
                address,
                label: account.label.clone(),
            }
        })
        .collect();

    let revenue = RevenueFigures {
        total: formatter.format(snapshot.total_revenue),
        last_30_days: formatter.format(snapshot.revenue_last_30_days),
        highest_daily: formatter.format(snapshot.highest_daily_revenue),
        daily: snapshot
            .daily_revenue
            .iter()
            .map(|day| DailyAmount {
                date: day.date,
                amount: formatter.format(day.revenue),
            })
            .collect(),
    };

    let gas = config.include_gas_breakdown.then(|| GasFigures {
        requests: formatter.format(snapshot.total_request_gas),
        results: formatter.format(snapshot.total_result_gas),
        total: formatter.format(snapshot.total_gas),
    });

    StatsReport {
        evaluated_at: snapshot.evaluated_at,
        currency: CurrencyInfo {
            mode,
            unit,
            fiat_available: converter.fiat_available(),
            spot_price: converter.price().map(|p| p.rate_f64()),
        },
        status: ReportStatus {
            requests: (&view.requests).into(),
            results: (&view.results).into(),
            price_error: view.price_error.clone(),
            complete: view.requests.status.is_complete() && view.results.status.is_complete(),
        },
        total_requests: snapshot.total_requests,
        total_results: snapshot.total_results,
        malformed_records: snapshot.malformed_records,
        models,
        accounts,
        revenue,
        gas,
        preview: view.preview.iter().take(config.preview_size).cloned().collect(),
    }
}
