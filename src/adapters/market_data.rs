//! Market-data adapter: one quotes request per invocation for the configured
//! symbol list, normalized into PricePoint records.

use super::{
    check_status, decode_error, transport_error, RecordBatch, SourceAdapter, HTTP_TIMEOUT,
};
use crate::config::MarketSourceConfig;
use crate::domain::PricePoint;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

const SOURCE: &str = "market_data";

#[derive(Debug, Deserialize)]
struct QuotesResponse {
    data: Vec<QuotePayload>,
}

#[derive(Debug, Deserialize)]
struct QuotePayload {
    symbol: String,
    /// Unix seconds
    timestamp: i64,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume_24h: Decimal,
    market_cap: Option<Decimal>,
    percent_change_24h: Option<Decimal>,
}

#[derive(Clone)]
pub struct MarketDataAdapter {
    http: Client,
    config: MarketSourceConfig,
}

impl MarketDataAdapter {
    pub fn new(config: MarketSourceConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent("klaxon-market-adapter/0.1")
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| transport_error(SOURCE, e))?;
        Ok(Self { http, config })
    }

    fn normalize(&self, payload: QuotePayload) -> Result<PricePoint> {
        let timestamp = DateTime::<Utc>::from_timestamp(payload.timestamp, 0)
            .ok_or_else(|| decode_error(SOURCE, format!("bad timestamp {}", payload.timestamp)))?;

        Ok(PricePoint {
            timestamp,
            symbol: payload.symbol,
            open: payload.open,
            high: payload.high,
            low: payload.low,
            close: payload.close,
            volume: payload.volume_24h,
            market_cap: payload.market_cap,
            price_change_24h: payload.percent_change_24h,
        })
    }
}

#[async_trait]
impl SourceAdapter for MarketDataAdapter {
    fn name(&self) -> &'static str {
        "market_sync"
    }

    async fn fetch(&self) -> Result<RecordBatch> {
        let url = format!("{}/v1/quotes", self.config.base_url.trim_end_matches('/'));
        let symbols = self.config.symbols.join(",");

        let mut request = self.http.get(&url).query(&[("symbols", symbols.as_str())]);
        if let Some(ref key) = self.config.api_key {
            request = request.header("X-API-KEY", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(SOURCE, e))?;
        let response = check_status(SOURCE, response)?;

        let payload: QuotesResponse = response.json().await.map_err(|e| decode_error(SOURCE, e))?;

        let points = payload
            .data
            .into_iter()
            .map(|q| self.normalize(q))
            .collect::<Result<Vec<_>>>()?;

        debug!("Fetched {} market quotes", points.len());
        Ok(RecordBatch::Prices(points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn adapter() -> MarketDataAdapter {
        MarketDataAdapter::new(MarketSourceConfig {
            base_url: "https://quotes.example.com".to_string(),
            api_key: None,
            symbols: vec!["BTC".to_string()],
        })
        .unwrap()
    }

    #[test]
    fn test_normalize_quote() {
        let payload: QuotesResponse = serde_json::from_str(
            r#"{
                "data": [{
                    "symbol": "BTC",
                    "timestamp": 1700000000,
                    "open": 37000.5,
                    "high": 37500.0,
                    "low": 36800.0,
                    "close": 37200.25,
                    "volume_24h": 18000000000,
                    "market_cap": 720000000000,
                    "percent_change_24h": -2.4
                }]
            }"#,
        )
        .unwrap();

        let point = adapter().normalize(payload.data.into_iter().next().unwrap()).unwrap();
        assert_eq!(point.symbol, "BTC");
        assert_eq!(point.close, dec!(37200.25));
        assert_eq!(point.price_change_24h, Some(dec!(-2.4)));
        assert_eq!(point.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_normalize_rejects_bad_timestamp() {
        let payload = QuotePayload {
            symbol: "BTC".to_string(),
            timestamp: i64::MAX,
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume_24h: dec!(0),
            market_cap: None,
            percent_change_24h: None,
        };
        assert!(adapter().normalize(payload).is_err());
    }
}
