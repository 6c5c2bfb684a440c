use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Denormalized per-symbol summary. Fully recomputed on each refresh (replace
/// semantics); never mutated outside the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardRow {
    pub symbol: String,
    pub current_price: Decimal,
    pub price_change_24h: Option<Decimal>,
    pub volume: Decimal,
    pub market_cap: Option<Decimal>,
    pub whale_tx_24h: i64,
    pub whale_volume_24h: Decimal,
    pub avg_sentiment: Option<f64>,
    pub last_alert_time: Option<DateTime<Utc>>,
    pub refreshed_at: DateTime<Utc>,
}
