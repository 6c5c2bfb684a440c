use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Windowed derived values for one symbol at one evaluation instant.
/// Percentage changes are None when no previous point exists or the previous
/// value is zero (a derivation gap, not an error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolMetrics {
    pub symbol: String,
    pub as_of: DateTime<Utc>,
    pub close: Option<Decimal>,
    pub price_change_1h: Option<f64>,
    pub volume_change_1h: Option<f64>,
    /// 24h change carried from the latest PricePoint
    pub price_change_24h: Option<f64>,
    pub whale_tx_count_24h: i64,
    pub whale_volume_24h: Decimal,
    pub mention_volume_24h: i64,
    /// Composite signal in [0, 1]
    pub anomaly_score: f64,
}

/// Dominant whale pressure inferred from 24h exchange flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhaleAction {
    MassiveSell,
    MassiveBuy,
    Exit,
    Accumulate,
    Neutral,
}

impl WhaleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WhaleAction::MassiveSell => "massive_sell",
            WhaleAction::MassiveBuy => "massive_buy",
            WhaleAction::Exit => "exit",
            WhaleAction::Accumulate => "accumulate",
            WhaleAction::Neutral => "neutral",
        }
    }

    /// Actions that warrant an alert when probability is high enough
    pub fn is_alertable(&self) -> bool {
        matches!(
            self,
            WhaleAction::MassiveSell | WhaleAction::MassiveBuy | WhaleAction::Exit
        )
    }
}

impl std::fmt::Display for WhaleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Forecast of the next dominant whale action for a symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhaleForecast {
    pub symbol: String,
    pub next_action: WhaleAction,
    /// Probability in [0, 1], proportional to flow imbalance
    pub probability: f64,
    pub inflow_usd: Decimal,
    pub outflow_usd: Decimal,
}

/// Net cross-chain price dislocation for one token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub token: String,
    pub buy_chain: String,
    pub sell_chain: String,
    /// Net profit on the configured notional after bridge fee and gas
    pub profit_usd: Decimal,
    /// Probability in [0, 1) from liquidity coverage of the notional
    pub success_probability: f64,
    pub spread_pct: f64,
}
