//! Whale-transaction adapter. Pulls large transfers above the configured USD
//! floor; request volume is bounded by the per-invocation limit.

use super::{
    check_status, decode_error, transport_error, RecordBatch, SourceAdapter, HTTP_TIMEOUT,
};
use crate::config::WhaleSourceConfig;
use crate::domain::{WalletKind, WhaleTransaction};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

const SOURCE: &str = "whale_alert";

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    transactions: Vec<TransactionPayload>,
}

#[derive(Debug, Deserialize)]
struct TransactionPayload {
    blockchain: String,
    hash: String,
    from: EndpointPayload,
    to: EndpointPayload,
    symbol: String,
    amount: Decimal,
    amount_usd: Decimal,
    /// Unix seconds
    timestamp: i64,
    #[serde(default)]
    transaction_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EndpointPayload {
    address: String,
    #[serde(default)]
    owner_type: Option<String>,
}

#[derive(Clone)]
pub struct WhaleAlertAdapter {
    http: Client,
    config: WhaleSourceConfig,
}

impl WhaleAlertAdapter {
    pub fn new(config: WhaleSourceConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent("klaxon-whale-adapter/0.1")
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| transport_error(SOURCE, e))?;
        Ok(Self { http, config })
    }

    fn normalize(&self, payload: TransactionPayload) -> Result<WhaleTransaction> {
        let timestamp = DateTime::<Utc>::from_timestamp(payload.timestamp, 0)
            .ok_or_else(|| decode_error(SOURCE, format!("bad timestamp {}", payload.timestamp)))?;

        Ok(WhaleTransaction {
            timestamp,
            blockchain: payload.blockchain,
            tx_hash: payload.hash,
            from_address: payload.from.address,
            to_address: payload.to.address,
            symbol: payload.symbol.to_uppercase(),
            amount: payload.amount,
            amount_usd: payload.amount_usd,
            from_type: payload
                .from
                .owner_type
                .as_deref()
                .map(WalletKind::from_str)
                .unwrap_or(WalletKind::Unknown),
            to_type: payload
                .to
                .owner_type
                .as_deref()
                .map(WalletKind::from_str)
                .unwrap_or(WalletKind::Unknown),
            transaction_type: payload
                .transaction_type
                .unwrap_or_else(|| "transfer".to_string()),
        })
    }
}

#[async_trait]
impl SourceAdapter for WhaleAlertAdapter {
    fn name(&self) -> &'static str {
        "whale_sync"
    }

    async fn fetch(&self) -> Result<RecordBatch> {
        let url = format!(
            "{}/v1/transactions",
            self.config.base_url.trim_end_matches('/')
        );

        let min_value = self.config.min_value_usd.to_string();
        let limit = self.config.limit.to_string();
        let mut request = self
            .http
            .get(&url)
            .query(&[("min_value", min_value.as_str()), ("limit", limit.as_str())]);
        if let Some(ref key) = self.config.api_key {
            request = request.header("X-WA-API-KEY", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(SOURCE, e))?;
        let response = check_status(SOURCE, response)?;

        let payload: TransactionsResponse =
            response.json().await.map_err(|e| decode_error(SOURCE, e))?;

        let transactions = payload
            .transactions
            .into_iter()
            .map(|t| self.normalize(t))
            .collect::<Result<Vec<_>>>()?;

        debug!("Fetched {} whale transactions", transactions.len());
        Ok(RecordBatch::WhaleTransactions(transactions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn adapter() -> WhaleAlertAdapter {
        WhaleAlertAdapter::new(WhaleSourceConfig {
            base_url: "https://whales.example.com".to_string(),
            api_key: Some("key".to_string()),
            min_value_usd: dec!(1000000),
            limit: 100,
        })
        .unwrap()
    }

    #[test]
    fn test_normalize_transaction() {
        let payload: TransactionsResponse = serde_json::from_str(
            r#"{
                "transactions": [{
                    "blockchain": "ethereum",
                    "hash": "0xdeadbeef",
                    "from": {"address": "0x1111", "owner_type": "wallet"},
                    "to": {"address": "0x2222", "owner_type": "exchange"},
                    "symbol": "eth",
                    "amount": 1500.5,
                    "amount_usd": 5000000,
                    "timestamp": 1700000000,
                    "transaction_type": "transfer"
                }]
            }"#,
        )
        .unwrap();

        let tx = adapter()
            .normalize(payload.transactions.into_iter().next().unwrap())
            .unwrap();
        assert_eq!(tx.tx_hash, "0xdeadbeef");
        assert_eq!(tx.symbol, "ETH");
        assert_eq!(tx.from_type, WalletKind::Wallet);
        assert_eq!(tx.to_type, WalletKind::Exchange);
        assert!(tx.is_exchange_inflow());
        assert_eq!(tx.amount_usd, dec!(5000000));
    }

    #[test]
    fn test_normalize_defaults_unknown_owner() {
        let payload: TransactionPayload = serde_json::from_str(
            r#"{
                "blockchain": "bitcoin",
                "hash": "abc",
                "from": {"address": "1A"},
                "to": {"address": "1B"},
                "symbol": "BTC",
                "amount": 120,
                "amount_usd": 6000000,
                "timestamp": 1700000000
            }"#,
        )
        .unwrap();

        let tx = adapter().normalize(payload).unwrap();
        assert_eq!(tx.from_type, WalletKind::Unknown);
        assert_eq!(tx.transaction_type, "transfer");
    }
}
