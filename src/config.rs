use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub alerting: AlertingConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Ops HTTP server port (default: 8080)
    #[serde(default)]
    pub health_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Per-source adapter settings
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub market: MarketSourceConfig,
    pub whale: WhaleSourceConfig,
    pub defi: DefiSourceConfig,
    pub cross_chain: CrossChainSourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketSourceConfig {
    /// REST endpoint for market quotes
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Symbols to track (e.g., ["BTC", "ETH", "SOL"])
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhaleSourceConfig {
    /// REST endpoint for large-transaction feed
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Minimum transaction value in USD to ingest
    #[serde(default = "default_whale_min_value")]
    pub min_value_usd: Decimal,
    /// Maximum transactions fetched per invocation
    #[serde(default = "default_fetch_limit")]
    pub limit: u32,
}

fn default_whale_min_value() -> Decimal {
    Decimal::from(1_000_000)
}

fn default_fetch_limit() -> u32 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefiSourceConfig {
    /// REST endpoint for pool/yield data
    pub base_url: String,
    /// Keep the top N pools by TVL per sync
    #[serde(default = "default_pool_limit")]
    pub top_pools: u32,
}

fn default_pool_limit() -> u32 {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrossChainSourceConfig {
    /// REST endpoint for cross-chain price quotes
    pub base_url: String,
    /// Tokens to quote across chains
    pub tokens: Vec<String>,
    /// Notional trade size in USD used for arbitrage profit estimates
    #[serde(default = "default_notional")]
    pub notional_usd: Decimal,
}

fn default_notional() -> Decimal {
    Decimal::from(10_000)
}

/// Per-job periods in seconds
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_market_period")]
    pub market_sync_secs: u64,
    #[serde(default = "default_whale_period")]
    pub whale_sync_secs: u64,
    #[serde(default = "default_defi_period")]
    pub defi_sync_secs: u64,
    #[serde(default = "default_cross_chain_period")]
    pub cross_chain_sync_secs: u64,
    #[serde(default = "default_analytics_period")]
    pub analytics_secs: u64,
    #[serde(default = "default_dashboard_period")]
    pub dashboard_secs: u64,
    #[serde(default = "default_prune_period")]
    pub prune_secs: u64,
    /// Delay between successive job starts, to stagger first ticks
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,
}

fn default_market_period() -> u64 {
    60
}
fn default_whale_period() -> u64 {
    120
}
fn default_defi_period() -> u64 {
    300
}
fn default_cross_chain_period() -> u64 {
    120
}
fn default_analytics_period() -> u64 {
    60
}
fn default_dashboard_period() -> u64 {
    300
}
fn default_prune_period() -> u64 {
    86_400
}
fn default_stagger_ms() -> u64 {
    500
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            market_sync_secs: default_market_period(),
            whale_sync_secs: default_whale_period(),
            defi_sync_secs: default_defi_period(),
            cross_chain_sync_secs: default_cross_chain_period(),
            analytics_secs: default_analytics_period(),
            dashboard_secs: default_dashboard_period(),
            prune_secs: default_prune_period(),
            stagger_ms: default_stagger_ms(),
        }
    }
}

/// Alert rule thresholds and dedup windows
#[derive(Debug, Clone, Deserialize)]
pub struct AlertingConfig {
    /// Anomaly score above which an anomaly alert fires
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,
    /// Absolute 24h price change (%) above which a price alert fires
    #[serde(default = "default_price_threshold")]
    pub price_change_threshold: f64,
    /// Whale next-action probability above which a whale alert fires
    #[serde(default = "default_whale_probability")]
    pub whale_probability_threshold: f64,
    /// Minimum net arbitrage profit in USD
    #[serde(default = "default_arb_profit")]
    pub arbitrage_min_profit: Decimal,
    /// Minimum arbitrage success probability
    #[serde(default = "default_arb_probability")]
    pub arbitrage_min_probability: f64,
    /// Dedup window per alert class in seconds
    #[serde(default = "default_dedup_secs")]
    pub dedup_window_secs: u64,
    #[serde(default)]
    pub anomaly: AnomalyWeights,
}

fn default_anomaly_threshold() -> f64 {
    0.7
}
fn default_price_threshold() -> f64 {
    5.0
}
fn default_whale_probability() -> f64 {
    0.7
}
fn default_arb_profit() -> Decimal {
    Decimal::from(100)
}
fn default_arb_probability() -> f64 {
    0.8
}
fn default_dedup_secs() -> u64 {
    3600
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold: default_anomaly_threshold(),
            price_change_threshold: default_price_threshold(),
            whale_probability_threshold: default_whale_probability(),
            arbitrage_min_profit: default_arb_profit(),
            arbitrage_min_probability: default_arb_probability(),
            dedup_window_secs: default_dedup_secs(),
            anomaly: AnomalyWeights::default(),
        }
    }
}

/// Anomaly score composition. Each component signal is saturated against its
/// `*_saturation` constant, clamped to [0,1], then combined as a weighted
/// mean. Weights are normalized by their sum, so only ratios matter.
#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyWeights {
    #[serde(default = "default_price_weight")]
    pub price_weight: f64,
    #[serde(default = "default_volume_weight")]
    pub volume_weight: f64,
    #[serde(default = "default_whale_weight")]
    pub whale_weight: f64,
    #[serde(default = "default_social_weight")]
    pub social_weight: f64,
    /// |price_change_1h| (%) mapping to a full-strength price signal
    #[serde(default = "default_price_saturation")]
    pub price_saturation: f64,
    /// |volume_change_1h| (%) mapping to a full-strength volume signal
    #[serde(default = "default_volume_saturation")]
    pub volume_saturation: f64,
    /// Whale transactions in 24h mapping to a full-strength whale signal
    #[serde(default = "default_whale_saturation")]
    pub whale_saturation: f64,
    /// Social mentions in 24h mapping to a full-strength social signal
    #[serde(default = "default_social_saturation")]
    pub social_saturation: f64,
}

fn default_price_weight() -> f64 {
    0.35
}
fn default_volume_weight() -> f64 {
    0.25
}
fn default_whale_weight() -> f64 {
    0.25
}
fn default_social_weight() -> f64 {
    0.15
}
fn default_price_saturation() -> f64 {
    10.0
}
fn default_volume_saturation() -> f64 {
    50.0
}
fn default_whale_saturation() -> f64 {
    10.0
}
fn default_social_saturation() -> f64 {
    500.0
}

impl Default for AnomalyWeights {
    fn default() -> Self {
        Self {
            price_weight: default_price_weight(),
            volume_weight: default_volume_weight(),
            whale_weight: default_whale_weight(),
            social_weight: default_social_weight(),
            price_saturation: default_price_saturation(),
            volume_saturation: default_volume_saturation(),
            whale_saturation: default_whale_saturation(),
            social_saturation: default_social_saturation(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Days of PricePoint history to keep
    #[serde(default = "default_retention_days")]
    pub price_days: u32,
}

fn default_retention_days() -> u32 {
    365
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            price_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for rolling log files (empty = console only)
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("KLAXON_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (KLAXON_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("KLAXON")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.sources.market.symbols.is_empty() {
            errors.push("sources.market.symbols must not be empty".to_string());
        }

        for (name, value) in [
            ("anomaly_threshold", self.alerting.anomaly_threshold),
            (
                "whale_probability_threshold",
                self.alerting.whale_probability_threshold,
            ),
            (
                "arbitrage_min_probability",
                self.alerting.arbitrage_min_probability,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("alerting.{name} must be between 0 and 1"));
            }
        }

        let w = &self.alerting.anomaly;
        let weight_sum = w.price_weight + w.volume_weight + w.whale_weight + w.social_weight;
        if weight_sum <= 0.0 {
            errors.push("alerting.anomaly weights must sum to a positive value".to_string());
        }
        for (name, value) in [
            ("price_saturation", w.price_saturation),
            ("volume_saturation", w.volume_saturation),
            ("whale_saturation", w.whale_saturation),
            ("social_saturation", w.social_saturation),
        ] {
            if value <= 0.0 {
                errors.push(format!("alerting.anomaly.{name} must be positive"));
            }
        }

        if self.scheduler.analytics_secs == 0 {
            errors.push("scheduler periods must be non-zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            database: DatabaseConfig {
                url: "postgres://localhost/klaxon".to_string(),
                max_connections: 5,
            },
            sources: SourcesConfig {
                market: MarketSourceConfig {
                    base_url: "https://quotes.example.com".to_string(),
                    api_key: None,
                    symbols: vec!["BTC".to_string(), "ETH".to_string()],
                },
                whale: WhaleSourceConfig {
                    base_url: "https://whales.example.com".to_string(),
                    api_key: None,
                    min_value_usd: default_whale_min_value(),
                    limit: 100,
                },
                defi: DefiSourceConfig {
                    base_url: "https://pools.example.com".to_string(),
                    top_pools: 50,
                },
                cross_chain: CrossChainSourceConfig {
                    base_url: "https://bridge.example.com".to_string(),
                    tokens: vec!["USDC".to_string()],
                    notional_usd: default_notional(),
                },
            },
            scheduler: SchedulerConfig::default(),
            alerting: AlertingConfig::default(),
            retention: RetentionConfig::default(),
            logging: LoggingConfig::default(),
            health_port: Some(8080),
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut cfg = test_config();
        cfg.alerting.anomaly_threshold = 1.5;
        let errors = cfg.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("anomaly_threshold")));
    }

    #[test]
    fn test_validate_rejects_empty_symbols() {
        let mut cfg = test_config();
        cfg.sources.market.symbols.clear();
        assert!(cfg.validate().is_err());
    }
}
