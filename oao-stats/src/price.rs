// Spot price lookup and fiat conversion

use alloy_primitives::{utils::format_units, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client as HttpClient;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::PriceConfig;
use crate::error::PriceError;

/// Decimal places of a scaled price.
pub const PRICE_DECIMALS: u8 = 8;
const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;

/// Native asset price in a fiat unit, scaled by 1e8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotPrice {
    pub asset: String,
    pub currency: String,
    pub rate: U256,
    pub fetched_at: DateTime<Utc>,
}

impl SpotPrice {
    pub fn rate_f64(&self) -> f64 {
        scaled_to_f64(self.rate)
    }
}

/// Scale a floating point quote to 8 decimals.
pub fn scale_price_from_f64(price: f64) -> Result<U256, PriceError> {
    if !price.is_finite() || price < 0.0 {
        return Err(PriceError::InvalidPrice(price.to_string()));
    }
    let scaled = (price * 10f64.powi(PRICE_DECIMALS as i32)).round();
    if scaled > u128::MAX as f64 {
        return Err(PriceError::InvalidPrice(price.to_string()));
    }
    Ok(U256::from(scaled as u128))
}

fn scaled_to_f64(amount: U256) -> f64 {
    format_units(amount, PRICE_DECIMALS)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0)
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn spot_price(&self) -> Result<SpotPrice, PriceError>;
}

/// CoinGecko style `simple/price` endpoint.
pub struct CoinGeckoSource {
    http_client: HttpClient,
    base_url: String,
    asset: String,
    currency: String,
}

impl CoinGeckoSource {
    pub fn new(config: &PriceConfig, timeout: Duration) -> Result<Self, PriceError> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            asset: config.asset.clone(),
            currency: config.currency.clone(),
        })
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    async fn spot_price(&self) -> Result<SpotPrice, PriceError> {
        let url = format!("{}/api/v3/simple/price", self.base_url);

        let data: HashMap<String, HashMap<String, f64>> = self
            .http_client
            .get(&url)
            .query(&[("ids", self.asset.as_str()), ("vs_currencies", self.currency.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let price = data
            .get(&self.asset)
            .and_then(|quotes| quotes.get(&self.currency))
            .ok_or_else(|| PriceError::MissingAsset(self.asset.clone()))?;

        let rate = scale_price_from_f64(*price)?;
        info!("Spot price {}/{} = {}", self.asset, self.currency, price);

        Ok(SpotPrice {
            asset: self.asset.clone(),
            currency: self.currency.clone(),
            rate,
            fetched_at: Utc::now(),
        })
    }
}

/// Rescales native amounts with the single price fetched at load time.
///
/// The same price is applied to every figure regardless of when the
/// underlying records occurred.
#[derive(Debug, Clone, Default)]
pub struct CurrencyConverter {
    price: Option<SpotPrice>,
}

impl CurrencyConverter {
    pub fn new(price: Option<SpotPrice>) -> Self {
        Self { price }
    }

    /// Build from a fetch result; a failed fetch disables fiat display.
    pub fn from_fetch(result: Result<SpotPrice, PriceError>) -> Self {
        match result {
            Ok(price) => Self::new(Some(price)),
            Err(e) => {
                warn!("Spot price unavailable, fiat display disabled: {}", e);
                Self::new(None)
            }
        }
    }

    pub fn price(&self) -> Option<&SpotPrice> {
        self.price.as_ref()
    }

    pub fn fiat_available(&self) -> bool {
        self.price.is_some()
    }

    /// Fiat value of `wei`, scaled by 1e8. `None` without a price.
    pub fn to_fiat_scaled(&self, wei: U256) -> Option<U256> {
        let price = self.price.as_ref()?;
        Some(wei.saturating_mul(price.rate) / U256::from(WEI_PER_ETHER))
    }

    pub fn to_fiat_f64(&self, wei: U256) -> Option<f64> {
        self.to_fiat_scaled(wei).map(scaled_to_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn price(rate: f64) -> SpotPrice {
        SpotPrice {
            asset: "ethereum".to_string(),
            currency: "usd".to_string(),
            rate: scale_price_from_f64(rate).unwrap(),
            fetched_at: Utc::now(),
        }
    }

    fn price_config(url: String) -> PriceConfig {
        PriceConfig {
            url,
            asset: "ethereum".to_string(),
            currency: "usd".to_string(),
        }
    }

    #[test]
    fn test_scale_price() {
        assert_eq!(scale_price_from_f64(2500.50).unwrap(), U256::from(250_050_000_000u64));
        assert!(scale_price_from_f64(f64::NAN).is_err());
        assert!(scale_price_from_f64(-1.0).is_err());
    }

    #[test]
    fn test_conversion_uses_single_price() {
        let converter = CurrencyConverter::new(Some(price(3000.0)));
        let one_ether = U256::from(WEI_PER_ETHER);

        assert_eq!(converter.to_fiat_f64(one_ether), Some(3000.0));
        assert_eq!(converter.to_fiat_f64(one_ether / U256::from(2)), Some(1500.0));
        assert_eq!(converter.to_fiat_f64(U256::ZERO), Some(0.0));
    }

    #[test]
    fn test_failed_fetch_disables_fiat() {
        let converter = CurrencyConverter::from_fetch(Err(PriceError::MissingAsset("x".into())));
        assert!(!converter.fiat_available());
        assert_eq!(converter.to_fiat_f64(U256::from(WEI_PER_ETHER)), None);
    }

    #[tokio::test]
    async fn test_coingecko_price() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/simple/price"))
            .and(query_param("ids", "ethereum"))
            .and(query_param("vs_currencies", "usd"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ethereum": { "usd": 2500.5 } })),
            )
            .mount(&server)
            .await;

        let source = CoinGeckoSource::new(&price_config(server.uri()), Duration::from_secs(5)).unwrap();
        let spot = source.spot_price().await.unwrap();
        assert_eq!(spot.rate, U256::from(250_050_000_000u64));
        assert_eq!(spot.rate_f64(), 2500.5);
    }

    #[tokio::test]
    async fn test_coingecko_missing_asset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let source = CoinGeckoSource::new(&price_config(server.uri()), Duration::from_secs(5)).unwrap();
        assert!(matches!(source.spot_price().await, Err(PriceError::MissingAsset(_))));
    }

    #[tokio::test]
    async fn test_coingecko_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let source = CoinGeckoSource::new(&price_config(server.uri()), Duration::from_secs(5)).unwrap();
        assert!(matches!(source.spot_price().await, Err(PriceError::Http(_))));
    }
}
