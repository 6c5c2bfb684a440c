//! Cross-chain quote adapter. One request per configured token; each response
//! carries the same token priced on two chains plus transfer costs.

use super::{
    check_status, decode_error, transport_error, RecordBatch, SourceAdapter, HTTP_TIMEOUT,
};
use crate::config::CrossChainSourceConfig;
use crate::domain::CrossChainQuote;
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

const SOURCE: &str = "cross_chain";

#[derive(Debug, Deserialize)]
struct PairQuotePayload {
    token: String,
    chain_a: String,
    price_a: Decimal,
    liquidity_a: Decimal,
    gas_cost_a_usd: Decimal,
    chain_b: String,
    price_b: Decimal,
    liquidity_b: Decimal,
    gas_cost_b_usd: Decimal,
    bridge_fee_usd: Decimal,
}

#[derive(Clone)]
pub struct CrossChainAdapter {
    http: Client,
    config: CrossChainSourceConfig,
}

impl CrossChainAdapter {
    pub fn new(config: CrossChainSourceConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent("klaxon-bridge-adapter/0.1")
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| transport_error(SOURCE, e))?;
        Ok(Self { http, config })
    }

    fn normalize(&self, payload: PairQuotePayload) -> CrossChainQuote {
        CrossChainQuote {
            timestamp: Utc::now(),
            token: payload.token,
            chain_a: payload.chain_a,
            price_a: payload.price_a,
            liquidity_a: payload.liquidity_a,
            chain_b: payload.chain_b,
            price_b: payload.price_b,
            liquidity_b: payload.liquidity_b,
            bridge_fee_usd: payload.bridge_fee_usd,
            gas_cost_a_usd: payload.gas_cost_a_usd,
            gas_cost_b_usd: payload.gas_cost_b_usd,
        }
    }
}

#[async_trait]
impl SourceAdapter for CrossChainAdapter {
    fn name(&self) -> &'static str {
        "cross_chain_sync"
    }

    async fn fetch(&self) -> Result<RecordBatch> {
        let url = format!("{}/v1/quote", self.config.base_url.trim_end_matches('/'));

        let mut quotes = Vec::with_capacity(self.config.tokens.len());
        for token in &self.config.tokens {
            let response = self
                .http
                .get(&url)
                .query(&[("token", token.as_str())])
                .send()
                .await
                .map_err(|e| transport_error(SOURCE, e))?;
            let response = check_status(SOURCE, response)?;

            let payload: PairQuotePayload =
                response.json().await.map_err(|e| decode_error(SOURCE, e))?;
            quotes.push(self.normalize(payload));
        }

        debug!("Fetched {} cross-chain quotes", quotes.len());
        Ok(RecordBatch::CrossChainQuotes(quotes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pair_quote_parsing() {
        let payload: PairQuotePayload = serde_json::from_str(
            r#"{
                "token": "USDC",
                "chain_a": "ethereum",
                "price_a": 1.001,
                "liquidity_a": 5000000,
                "gas_cost_a_usd": 12.5,
                "chain_b": "arbitrum",
                "price_b": 0.998,
                "liquidity_b": 2000000,
                "gas_cost_b_usd": 0.4,
                "bridge_fee_usd": 8.0
            }"#,
        )
        .unwrap();

        assert_eq!(payload.token, "USDC");
        assert_eq!(payload.price_a, dec!(1.001));
        assert_eq!(payload.bridge_fee_usd, dec!(8.0));
    }
}
