use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert rule classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Anomaly,
    PriceMovement,
    WhaleMovement,
    CrossChainArbitrage,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Anomaly => "anomaly",
            AlertType::PriceMovement => "price_movement",
            AlertType::WhaleMovement => "whale_movement",
            AlertType::CrossChainArbitrage => "cross_chain_arbitrage",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "anomaly" => Some(AlertType::Anomaly),
            "price_movement" => Some(AlertType::PriceMovement),
            "whale_movement" => Some(AlertType::WhaleMovement),
            "cross_chain_arbitrage" => Some(AlertType::CrossChainArbitrage),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordinal severity scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }

    /// Tier a percentage-style magnitude (price/anomaly-class rules):
    /// >20 critical, >10 high, >5 medium, else low.
    pub fn from_percent_magnitude(m: f64) -> Self {
        let m = m.abs();
        if m > 20.0 {
            Severity::Critical
        } else if m > 10.0 {
            Severity::High
        } else if m > 5.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Tier a probability/score magnitude: >0.9 critical, >0.8 high,
    /// >0.7 medium, else low.
    pub fn from_score(score: f64) -> Self {
        if score > 0.9 {
            Severity::Critical
        } else if score > 0.8 {
            Severity::High
        } else if score > 0.7 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Tier a USD profit magnitude: >1000 critical, >500 high, else medium.
    pub fn from_profit_usd(profit: f64) -> Self {
        if profit > 1000.0 {
            Severity::Critical
        } else if profit > 500.0 {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fired alert. Immutable after creation except for the acknowledged flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Option<i64>,
    pub alert_type: AlertType,
    pub symbol: String,
    pub severity: Severity,
    pub message: String,
    /// Rule-specific structured payload
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        symbol: &str,
        severity: Severity,
        message: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            alert_type,
            symbol: symbol.to_string(),
            severity,
            message,
            data: serde_json::json!({}),
            created_at,
            acknowledged: false,
        }
    }

    /// Attach structured payload to the alert
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
