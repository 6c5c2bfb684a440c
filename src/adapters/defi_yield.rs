//! DeFi yield adapter. Fetches the pool universe and keeps the top pools by
//! TVL, stamped with the fetch time (samples are append-only).

use super::{
    check_status, decode_error, transport_error, RecordBatch, SourceAdapter, HTTP_TIMEOUT,
};
use crate::config::DefiSourceConfig;
use crate::domain::DefiYieldSample;
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

const SOURCE: &str = "defi_yield";

#[derive(Debug, Deserialize)]
struct PoolsResponse {
    data: Vec<PoolPayload>,
}

#[derive(Debug, Deserialize)]
struct PoolPayload {
    project: String,
    chain: String,
    pool: String,
    #[serde(default)]
    apy: Option<Decimal>,
    #[serde(rename = "tvlUsd")]
    tvl_usd: Decimal,
    #[serde(default)]
    risk_score: Option<f64>,
}

#[derive(Clone)]
pub struct DefiYieldAdapter {
    http: Client,
    config: DefiSourceConfig,
}

impl DefiYieldAdapter {
    pub fn new(config: DefiSourceConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent("klaxon-defi-adapter/0.1")
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| transport_error(SOURCE, e))?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl SourceAdapter for DefiYieldAdapter {
    fn name(&self) -> &'static str {
        "defi_sync"
    }

    async fn fetch(&self) -> Result<RecordBatch> {
        let url = format!("{}/pools", self.config.base_url.trim_end_matches('/'));

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(SOURCE, e))?;
        let response = check_status(SOURCE, response)?;

        let payload: PoolsResponse = response.json().await.map_err(|e| decode_error(SOURCE, e))?;

        let now = Utc::now();
        let mut pools = payload.data;
        pools.sort_by(|a, b| b.tvl_usd.cmp(&a.tvl_usd));
        pools.truncate(self.config.top_pools as usize);

        let samples = pools
            .into_iter()
            .map(|p| DefiYieldSample {
                timestamp: now,
                protocol: p.project,
                chain: p.chain,
                pool: p.pool,
                apy: p.apy.unwrap_or(Decimal::ZERO),
                tvl_usd: p.tvl_usd,
                risk_score: p.risk_score,
            })
            .collect::<Vec<_>>();

        debug!("Fetched {} defi pools", samples.len());
        Ok(RecordBatch::DefiYields(samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pool_payload_parsing() {
        let payload: PoolsResponse = serde_json::from_str(
            r#"{
                "data": [
                    {"project": "aave-v3", "chain": "Ethereum", "pool": "aave-usdc",
                     "apy": 3.2, "tvlUsd": 420000000, "risk_score": 0.1},
                    {"project": "curve", "chain": "Ethereum", "pool": "3pool",
                     "tvlUsd": 180000000}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(payload.data.len(), 2);
        assert_eq!(payload.data[0].apy, Some(dec!(3.2)));
        assert_eq!(payload.data[1].apy, None);
        assert_eq!(payload.data[1].tvl_usd, dec!(180000000));
    }
}
