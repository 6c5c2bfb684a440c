use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV observation for a symbol. Unique per (timestamp, symbol);
/// re-syncing the same key corrects the row in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub market_cap: Option<Decimal>,
    /// 24h percentage change as reported by the source
    pub price_change_24h: Option<Decimal>,
}

/// Classification of the wallet on either end of a whale transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    Exchange,
    Wallet,
    Contract,
    Unknown,
}

impl WalletKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletKind::Exchange => "exchange",
            WalletKind::Wallet => "wallet",
            WalletKind::Contract => "contract",
            WalletKind::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "exchange" => WalletKind::Exchange,
            "wallet" => WalletKind::Wallet,
            "contract" => WalletKind::Contract,
            _ => WalletKind::Unknown,
        }
    }
}

impl std::fmt::Display for WalletKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A large on-chain transfer. Deduplicated by tx_hash, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhaleTransaction {
    pub timestamp: DateTime<Utc>,
    pub blockchain: String,
    pub tx_hash: String,
    pub from_address: String,
    pub to_address: String,
    pub symbol: String,
    pub amount: Decimal,
    pub amount_usd: Decimal,
    pub from_type: WalletKind,
    pub to_type: WalletKind,
    pub transaction_type: String,
}

impl WhaleTransaction {
    /// Transfer into an exchange: historically precedes selling pressure.
    pub fn is_exchange_inflow(&self) -> bool {
        self.to_type == WalletKind::Exchange && self.from_type != WalletKind::Exchange
    }

    /// Transfer out of an exchange: accumulation signal.
    pub fn is_exchange_outflow(&self) -> bool {
        self.from_type == WalletKind::Exchange && self.to_type != WalletKind::Exchange
    }
}

/// Append-only social sentiment observation for a symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentSample {
    pub timestamp: DateTime<Utc>,
    pub platform: String,
    pub symbol: String,
    /// Score in [-1, 1]
    pub sentiment_score: f64,
    pub mention_count: i64,
    pub positive_mentions: i64,
    pub negative_mentions: i64,
}

/// Append-only DeFi pool observation, refreshed each sync cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefiYieldSample {
    pub timestamp: DateTime<Utc>,
    pub protocol: String,
    pub chain: String,
    pub pool: String,
    pub apy: Decimal,
    pub tvl_usd: Decimal,
    /// Source-reported risk score in [0, 1]
    pub risk_score: Option<f64>,
}

/// Simultaneous quote of one token on two chains, feeding arbitrage detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossChainQuote {
    pub timestamp: DateTime<Utc>,
    pub token: String,
    pub chain_a: String,
    pub price_a: Decimal,
    pub liquidity_a: Decimal,
    pub chain_b: String,
    pub price_b: Decimal,
    pub liquidity_b: Decimal,
    pub bridge_fee_usd: Decimal,
    pub gas_cost_a_usd: Decimal,
    pub gas_cost_b_usd: Decimal,
}

/// Liveness of a sync handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Ok,
    Error,
    /// Three or more consecutive failures
    Degraded,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Ok => "ok",
            SyncState::Error => "error",
            SyncState::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for SyncState {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "ok" => Ok(SyncState::Ok),
            "error" => Ok(SyncState::Error),
            "degraded" => Ok(SyncState::Degraded),
            other => Err(format!("Unknown sync state: {}", other)),
        }
    }
}

/// One row per handler. `last_sync` and `records_synced` only move forward on
/// success, so staleness is always `now - last_sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub handler_name: String,
    pub last_sync: Option<DateTime<Utc>>,
    pub records_synced: i64,
    pub status: SyncState,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SyncStatus {
    /// Seconds since the last successful sync, if any
    pub fn staleness_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_sync.map(|t| (now - t).num_seconds().max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(from: WalletKind, to: WalletKind) -> WhaleTransaction {
        WhaleTransaction {
            timestamp: Utc::now(),
            blockchain: "ethereum".to_string(),
            tx_hash: "0xabc".to_string(),
            from_address: "0x1".to_string(),
            to_address: "0x2".to_string(),
            symbol: "ETH".to_string(),
            amount: Decimal::from(1000),
            amount_usd: Decimal::from(2_000_000),
            from_type: from,
            to_type: to,
            transaction_type: "transfer".to_string(),
        }
    }

    #[test]
    fn test_exchange_flow_classification() {
        assert!(tx(WalletKind::Wallet, WalletKind::Exchange).is_exchange_inflow());
        assert!(tx(WalletKind::Exchange, WalletKind::Wallet).is_exchange_outflow());

        let hop = tx(WalletKind::Exchange, WalletKind::Exchange);
        assert!(!hop.is_exchange_inflow());
        assert!(!hop.is_exchange_outflow());
    }

    #[test]
    fn test_sync_staleness() {
        let now = Utc::now();
        let status = SyncStatus {
            handler_name: "market_sync".to_string(),
            last_sync: Some(now - chrono::Duration::seconds(90)),
            records_synced: 10,
            status: SyncState::Ok,
            error_message: None,
            updated_at: now,
        };
        assert_eq!(status.staleness_secs(now), Some(90));

        let never = SyncStatus {
            last_sync: None,
            ..status
        };
        assert_eq!(never.staleness_secs(now), None);
    }
}
