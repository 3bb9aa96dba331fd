// Configuration for the OAO stats backend

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::fetcher::DEFAULT_PAGE_SIZE;

const DEFAULT_GRAPH_URL: &str =
    "https://api.studio.thegraph.com/query/72067/oao-manifest/version/latest";
const DEFAULT_PRICE_URL: &str = "https://api.coingecko.com";
const DEFAULT_MODELS: &str = "11=Llama2,50=Stable Diffusion";
const DEFAULT_PAGE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;
// Pages stay cached across two refreshes
const DEFAULT_CACHE_TTL_SECS: u64 = 2 * DEFAULT_REFRESH_INTERVAL_SECS;
const DEFAULT_ACCOUNTS: &str = "0xe75af5294f4CB4a8423ef8260595a54298c7a2FB=Prompt,\
                                0x696c83111a49eBb94267ecf4DDF6E220D5A80129=SimplePrompt";

/// A model id whose request share is reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedModel {
    pub id: String,
    pub label: String,
}

/// A contract address whose calls are counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedAccount {
    pub address: String,
    pub label: String,
}

/// Identifiers the aggregation counts against.
#[derive(Debug, Clone, Default)]
pub struct MetricsConfig {
    pub models: Vec<TrackedModel>,
    pub accounts: Vec<TrackedAccount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayCurrency {
    Native,
    Fiat,
}

impl FromStr for DisplayCurrency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(DisplayCurrency::Native),
            "fiat" => Ok(DisplayCurrency::Fiat),
            other => Err(format!("unknown display currency '{}'", other)),
        }
    }
}

/// Which figures a rendered report carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportConfig {
    pub display_currency: DisplayCurrency,
    pub include_gas_breakdown: bool,
    pub preview_size: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            display_currency: DisplayCurrency::Native,
            include_gas_breakdown: true,
            preview_size: 3,
        }
    }
}

/// Spot price endpoint settings.
#[derive(Debug, Clone)]
pub struct PriceConfig {
    pub url: String,
    pub asset: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub graph_url: String,
    pub price: PriceConfig,
    pub page_size: u64,
    pub page_timeout: Duration,
    pub cache_ttl: Duration,
    pub refresh_interval: Duration,
    pub metrics: MetricsConfig,
    pub report: ReportConfig,
    pub port: u16,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let page_size: u64 = parse_var(&lookup, "PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        if page_size == 0 {
            return Err(ConfigError::Invalid {
                key: "PAGE_SIZE",
                reason: "must be greater than zero".to_string(),
            });
        }

        let display_currency = var("DISPLAY_CURRENCY", "native")
            .parse::<DisplayCurrency>()
            .map_err(|reason| ConfigError::Invalid {
                key: "DISPLAY_CURRENCY",
                reason,
            })?;

        Ok(Self {
            graph_url: var("GRAPH_URL", DEFAULT_GRAPH_URL),
            price: PriceConfig {
                url: var("PRICE_URL", DEFAULT_PRICE_URL),
                asset: var("PRICE_ASSET", "ethereum"),
                currency: var("PRICE_CURRENCY", "usd"),
            },
            page_size,
            page_timeout: nonzero_secs(&lookup, "PAGE_TIMEOUT_SECS", DEFAULT_PAGE_TIMEOUT_SECS)?,
            cache_ttl: Duration::from_secs(parse_var(
                &lookup,
                "CACHE_TTL_SECS",
                DEFAULT_CACHE_TTL_SECS,
            )?),
            refresh_interval: nonzero_secs(
                &lookup,
                "REFRESH_INTERVAL_SECS",
                DEFAULT_REFRESH_INTERVAL_SECS,
            )?,
            metrics: MetricsConfig {
                models: parse_pairs("TRACKED_MODELS", &var("TRACKED_MODELS", DEFAULT_MODELS))?
                    .into_iter()
                    .map(|(id, label)| TrackedModel { id, label })
                    .collect(),
                accounts: parse_pairs(
                    "TRACKED_ACCOUNTS",
                    &var("TRACKED_ACCOUNTS", DEFAULT_ACCOUNTS),
                )?
                .into_iter()
                .map(|(address, label)| TrackedAccount { address, label })
                .collect(),
            },
            report: ReportConfig {
                display_currency,
                include_gas_breakdown: parse_var(&lookup, "INCLUDE_GAS_BREAKDOWN", true)?,
                preview_size: parse_var(&lookup, "PREVIEW_SIZE", 3)?,
            },
            port: parse_var(&lookup, "PORT", 4000)?,
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn nonzero_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    match parse_var(lookup, key, default)? {
        0 => Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

/// Parse `key=label,key=label` lists.
fn parse_pairs(key: &'static str, raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (id, label) = item.split_once('=').ok_or_else(|| ConfigError::Invalid {
                key,
                reason: format!("expected id=label, got '{}'", item),
            })?;
            Ok((id.trim().to_string(), label.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.page_size, 1000);
        assert_eq!(config.port, 4000);
        assert_eq!(config.page_timeout, Duration::from_secs(30));
        assert_eq!(config.refresh_interval, Duration::from_secs(300));
        assert!(config.cache_ttl >= config.refresh_interval);
        assert_eq!(config.report, ReportConfig::default());
        assert_eq!(config.metrics.models.len(), 2);
        assert_eq!(config.metrics.models[0].id, "11");
        assert_eq!(config.metrics.models[1].label, "Stable Diffusion");
        assert_eq!(config.metrics.accounts[1].label, "SimplePrompt");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PAGE_SIZE", "250"),
            ("DISPLAY_CURRENCY", "FIAT"),
            ("CACHE_TTL_SECS", "0"),
            ("INCLUDE_GAS_BREAKDOWN", "false"),
            ("PREVIEW_SIZE", "5"),
            ("TRACKED_MODELS", "7=Grok"),
            ("TRACKED_ACCOUNTS", ""),
        ]))
        .unwrap();
        assert_eq!(config.page_size, 250);
        assert_eq!(config.report.display_currency, DisplayCurrency::Fiat);
        assert!(!config.report.include_gas_breakdown);
        assert_eq!(config.report.preview_size, 5);
        assert_eq!(config.cache_ttl, Duration::ZERO);
        assert_eq!(
            config.metrics.models,
            vec![TrackedModel { id: "7".to_string(), label: "Grok".to_string() }]
        );
        assert!(config.metrics.accounts.is_empty());
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_lookup(lookup(&[("PAGE_SIZE", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("PAGE_SIZE", "many")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DISPLAY_CURRENCY", "gold")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DISPLAY_CURRENCY", "usd")])).is_err());
        assert!(Config::from_lookup(lookup(&[("TRACKED_MODELS", "11")])).is_err());

        let err = Config::from_lookup(lookup(&[("REFRESH_INTERVAL_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "REFRESH_INTERVAL_SECS", .. }));
        let err = Config::from_lookup(lookup(&[("PAGE_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PAGE_TIMEOUT_SECS", .. }));
    }
}
