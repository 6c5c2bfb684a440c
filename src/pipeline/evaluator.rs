//! Alert rule evaluation with per-(type, symbol) deduplication.
//!
//! Each alert key runs a quiet → firing → cooling machine: the firing edge
//! writes an Alert and starts the cooldown; repeated conditions inside the
//! window are suppressed; once the window has elapsed the key either fires
//! again (condition still holding) or returns to quiet. The cooldown expiry
//! is tracked explicitly per key, not rediscovered by scanning stored alerts.

use crate::config::AlertingConfig;
use crate::domain::{
    Alert, AlertType, ArbitrageOpportunity, Severity, SymbolMetrics, WhaleForecast,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleState {
    Quiet,
    Cooling { until: DateTime<Utc> },
}

/// Stateful evaluator. Time is always passed in, so behavior is fully
/// deterministic under test.
pub struct AlertEvaluator {
    config: AlertingConfig,
    states: HashMap<(AlertType, String), RuleState>,
    /// Completed evaluation passes per rule class; lets operators tell a
    /// quiet rule apart from one that has never been evaluated.
    runs: HashMap<AlertType, u64>,
}

impl AlertEvaluator {
    pub fn new(config: AlertingConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
            runs: HashMap::new(),
        }
    }

    fn dedup_window(&self) -> Duration {
        Duration::seconds(self.config.dedup_window_secs as i64)
    }

    /// Completed evaluation passes for a rule class
    pub fn evaluated_runs(&self, alert_type: AlertType) -> u64 {
        self.runs.get(&alert_type).copied().unwrap_or(0)
    }

    /// Current state for inspection: true while the key is cooling
    pub fn is_cooling(&self, alert_type: AlertType, symbol: &str, now: DateTime<Utc>) -> bool {
        matches!(
            self.states.get(&(alert_type, symbol.to_string())),
            Some(RuleState::Cooling { until }) if now < *until
        )
    }

    /// Drive the state machine for one key. Returns true on the quiet→firing
    /// edge; while cooling, repeated conditions are suppressed.
    fn transition(
        &mut self,
        alert_type: AlertType,
        symbol: &str,
        triggered: bool,
        now: DateTime<Utc>,
    ) -> bool {
        let key = (alert_type, symbol.to_string());
        let state = self.states.get(&key).copied().unwrap_or(RuleState::Quiet);

        match state {
            RuleState::Quiet => {
                if triggered {
                    self.states
                        .insert(key, RuleState::Cooling { until: now + self.dedup_window() });
                    true
                } else {
                    false
                }
            }
            RuleState::Cooling { until } => {
                if now < until {
                    if triggered {
                        debug!(
                            "Suppressing {} alert for {} (cooling until {})",
                            alert_type, symbol, until
                        );
                    }
                    false
                } else if triggered {
                    // Window elapsed with the condition still holding: fire again
                    self.states
                        .insert(key, RuleState::Cooling { until: now + self.dedup_window() });
                    true
                } else {
                    self.states.remove(&key);
                    false
                }
            }
        }
    }

    fn record_run(&mut self, alert_type: AlertType) {
        *self.runs.entry(alert_type).or_insert(0) += 1;
    }

    /// Evaluate the anomaly and price-movement rules for one symbol's derived
    /// metrics. A rule whose inputs are absent is skipped without affecting
    /// the other.
    pub fn evaluate_metrics(&mut self, metrics: &SymbolMetrics, now: DateTime<Utc>) -> Vec<Alert> {
        let mut alerts = Vec::new();

        // Anomaly rule: composite score above threshold
        let score = metrics.anomaly_score;
        let triggered = score > self.config.anomaly_threshold;
        if self.transition(AlertType::Anomaly, &metrics.symbol, triggered, now) {
            let severity = Severity::from_score(score);
            info!(
                "Anomaly alert for {}: score {:.2} ({})",
                metrics.symbol, score, severity
            );
            alerts.push(
                Alert::new(
                    AlertType::Anomaly,
                    &metrics.symbol,
                    severity,
                    format!(
                        "Anomalous activity on {}: composite score {:.2}",
                        metrics.symbol, score
                    ),
                    now,
                )
                .with_data(serde_json::json!({
                    "anomaly_score": score,
                    "price_change_1h": metrics.price_change_1h,
                    "volume_change_1h": metrics.volume_change_1h,
                    "whale_tx_count_24h": metrics.whale_tx_count_24h,
                    "mention_volume_24h": metrics.mention_volume_24h,
                })),
            );
        }
        self.record_run(AlertType::Anomaly);

        // Price-movement rule: driven by the larger of the 1h and 24h moves.
        // Skipped entirely when both windows are gaps.
        let magnitude = match (metrics.price_change_1h, metrics.price_change_24h) {
            (None, None) => {
                debug!(
                    "Skipping price rule for {}: no change data this cycle",
                    metrics.symbol
                );
                return alerts;
            }
            (a, b) => f64::max(
                a.map(f64::abs).unwrap_or(0.0),
                b.map(f64::abs).unwrap_or(0.0),
            ),
        };

        let triggered = magnitude > self.config.price_change_threshold;
        if self.transition(AlertType::PriceMovement, &metrics.symbol, triggered, now) {
            let severity = Severity::from_percent_magnitude(magnitude);
            info!(
                "Price movement alert for {}: {:.1}% ({})",
                metrics.symbol, magnitude, severity
            );
            alerts.push(
                Alert::new(
                    AlertType::PriceMovement,
                    &metrics.symbol,
                    severity,
                    format!(
                        "{} moved {:.1}% (1h: {}, 24h: {})",
                        metrics.symbol,
                        magnitude,
                        fmt_pct(metrics.price_change_1h),
                        fmt_pct(metrics.price_change_24h),
                    ),
                    now,
                )
                .with_data(serde_json::json!({
                    "magnitude": magnitude,
                    "price_change_1h": metrics.price_change_1h,
                    "price_change_24h": metrics.price_change_24h,
                    "close": metrics.close,
                })),
            );
        }
        self.record_run(AlertType::PriceMovement);

        alerts
    }

    /// Evaluate the whale-movement rule for one forecast
    pub fn evaluate_whale(&mut self, forecast: &WhaleForecast, now: DateTime<Utc>) -> Option<Alert> {
        let triggered = forecast.probability > self.config.whale_probability_threshold
            && forecast.next_action.is_alertable();

        let fired = self.transition(AlertType::WhaleMovement, &forecast.symbol, triggered, now);
        self.record_run(AlertType::WhaleMovement);
        if !fired {
            return None;
        }

        let severity = Severity::from_score(forecast.probability);
        info!(
            "Whale movement alert for {}: {} p={:.2} ({})",
            forecast.symbol, forecast.next_action, forecast.probability, severity
        );
        Some(
            Alert::new(
                AlertType::WhaleMovement,
                &forecast.symbol,
                severity,
                format!(
                    "Whale flows on {} point to {} (p={:.2})",
                    forecast.symbol, forecast.next_action, forecast.probability
                ),
                now,
            )
            .with_data(serde_json::json!({
                "next_action": forecast.next_action,
                "probability": forecast.probability,
                "inflow_usd": forecast.inflow_usd,
                "outflow_usd": forecast.outflow_usd,
            })),
        )
    }

    /// Evaluate the cross-chain arbitrage rule for one opportunity
    pub fn evaluate_arbitrage(
        &mut self,
        opportunity: &ArbitrageOpportunity,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        let triggered = opportunity.profit_usd > self.config.arbitrage_min_profit
            && opportunity.success_probability > self.config.arbitrage_min_probability;

        let fired = self.transition(
            AlertType::CrossChainArbitrage,
            &opportunity.token,
            triggered,
            now,
        );
        self.record_run(AlertType::CrossChainArbitrage);
        if !fired {
            return None;
        }

        let profit = opportunity.profit_usd.to_f64().unwrap_or(0.0);
        let severity = Severity::from_profit_usd(profit);
        info!(
            "Arbitrage alert for {}: ${:.0} {}→{} ({})",
            opportunity.token, profit, opportunity.buy_chain, opportunity.sell_chain, severity
        );
        Some(
            Alert::new(
                AlertType::CrossChainArbitrage,
                &opportunity.token,
                severity,
                format!(
                    "{} arbitrage: buy {} / sell {} nets ${:.0} ({:.2}% spread)",
                    opportunity.token,
                    opportunity.buy_chain,
                    opportunity.sell_chain,
                    profit,
                    opportunity.spread_pct
                ),
                now,
            )
            .with_data(serde_json::json!({
                "profit_usd": opportunity.profit_usd,
                "success_probability": opportunity.success_probability,
                "buy_chain": opportunity.buy_chain,
                "sell_chain": opportunity.sell_chain,
                "spread_pct": opportunity.spread_pct,
            })),
        )
    }
}

fn fmt_pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.1}%"),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WhaleAction;
    use rust_decimal_macros::dec;

    fn evaluator() -> AlertEvaluator {
        AlertEvaluator::new(AlertingConfig::default())
    }

    fn metrics(symbol: &str, change_1h: Option<f64>, score: f64) -> SymbolMetrics {
        SymbolMetrics {
            symbol: symbol.to_string(),
            as_of: Utc::now(),
            close: Some(dec!(100)),
            price_change_1h: change_1h,
            volume_change_1h: Some(0.0),
            price_change_24h: None,
            whale_tx_count_24h: 0,
            whale_volume_24h: dec!(0),
            mention_volume_24h: 0,
            anomaly_score: score,
        }
    }

    #[test]
    fn test_small_move_no_alert() {
        let mut eval = evaluator();
        let now = Utc::now();
        let alerts = eval.evaluate_metrics(&metrics("BTC", Some(-4.0), 0.2), now);
        assert!(alerts.is_empty());
        assert_eq!(eval.evaluated_runs(AlertType::PriceMovement), 1);
    }

    #[test]
    fn test_crash_fires_critical_price_alert() {
        let mut eval = evaluator();
        let now = Utc::now();
        let alerts = eval.evaluate_metrics(&metrics("BTC", Some(-30.0), 0.2), now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::PriceMovement);
        assert_eq!(alerts[0].severity, Severity::Critical);
    }

    #[test]
    fn test_dedup_window_two_hours_sustained() {
        // Condition holds continuously for 2h with a 1h cooldown: exactly 2
        // alerts, not one per tick.
        let mut eval = evaluator();
        let start = Utc::now();

        let mut fired = 0;
        for minute in (0..120).step_by(5) {
            let now = start + Duration::minutes(minute);
            fired += eval
                .evaluate_metrics(&metrics("BTC", Some(-12.0), 0.0), now)
                .len();
        }
        assert_eq!(fired, 2);
    }

    #[test]
    fn test_returns_to_quiet_after_window() {
        let mut eval = evaluator();
        let start = Utc::now();

        let fired = eval.evaluate_metrics(&metrics("BTC", Some(-12.0), 0.0), start);
        assert_eq!(fired.len(), 1);
        assert!(eval.is_cooling(AlertType::PriceMovement, "BTC", start));

        // Condition gone after the window: back to quiet
        let later = start + Duration::minutes(61);
        let fired = eval.evaluate_metrics(&metrics("BTC", Some(0.5), 0.0), later);
        assert!(fired.is_empty());
        assert!(!eval.is_cooling(AlertType::PriceMovement, "BTC", later));

        // A fresh condition then fires immediately
        let fired = eval.evaluate_metrics(&metrics("BTC", Some(-12.0), 0.0), later);
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn test_cooldowns_are_per_key() {
        let mut eval = evaluator();
        let now = Utc::now();

        assert_eq!(
            eval.evaluate_metrics(&metrics("BTC", Some(-12.0), 0.0), now)
                .len(),
            1
        );
        // Different symbol, same class: independent cooldown
        assert_eq!(
            eval.evaluate_metrics(&metrics("ETH", Some(-12.0), 0.0), now)
                .len(),
            1
        );
        // Same symbol, different class: also independent
        let fired = eval.evaluate_metrics(&metrics("BTC", Some(0.0), 0.95), now);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].alert_type, AlertType::Anomaly);
    }

    #[test]
    fn test_anomaly_threshold_and_severity() {
        let mut eval = evaluator();
        let now = Utc::now();

        assert!(eval
            .evaluate_metrics(&metrics("SOL", Some(0.0), 0.69), now)
            .is_empty());

        let fired = eval.evaluate_metrics(&metrics("ADA", Some(0.0), 0.95), now);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].severity, Severity::Critical);
    }

    #[test]
    fn test_price_rule_skipped_without_inputs() {
        let mut eval = evaluator();
        let now = Utc::now();

        // No 1h or 24h change: the price rule is skipped, anomaly still runs
        let fired = eval.evaluate_metrics(&metrics("NEW", None, 0.95), now);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].alert_type, AlertType::Anomaly);
        assert_eq!(eval.evaluated_runs(AlertType::Anomaly), 1);
    }

    #[test]
    fn test_whale_rule_requires_alertable_action() {
        let mut eval = evaluator();
        let now = Utc::now();

        let accumulate = WhaleForecast {
            symbol: "ETH".to_string(),
            next_action: WhaleAction::Accumulate,
            probability: 0.9,
            inflow_usd: dec!(0),
            outflow_usd: dec!(3000000),
        };
        assert!(eval.evaluate_whale(&accumulate, now).is_none());

        let sell = WhaleForecast {
            next_action: WhaleAction::MassiveSell,
            inflow_usd: dec!(9000000),
            outflow_usd: dec!(500000),
            ..accumulate
        };
        let alert = eval.evaluate_whale(&sell, now).unwrap();
        assert_eq!(alert.severity, Severity::High);
    }

    #[test]
    fn test_arbitrage_rule_thresholds() {
        let mut eval = evaluator();
        let now = Utc::now();

        let mut opp = ArbitrageOpportunity {
            token: "USDC".to_string(),
            buy_chain: "arbitrum".to_string(),
            sell_chain: "ethereum".to_string(),
            profit_usd: dec!(2000),
            success_probability: 0.5,
            spread_pct: 1.2,
        };
        // High profit but low confidence: no alert
        assert!(eval.evaluate_arbitrage(&opp, now).is_none());

        opp.success_probability = 0.9;
        let alert = eval.evaluate_arbitrage(&opp, now).unwrap();
        assert_eq!(alert.severity, Severity::Critical);
    }
}
