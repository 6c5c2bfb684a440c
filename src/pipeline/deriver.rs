//! Windowed metric derivation.
//!
//! All functions are pure over their inputs: history slices come from
//! explicit ordered store queries, never from in-process last-value state, so
//! derivation is stateless and restartable.

use crate::config::AnomalyWeights;
use crate::domain::{
    ArbitrageOpportunity, CrossChainQuote, PricePoint, SymbolMetrics, WhaleAction, WhaleForecast,
    WhaleTransaction,
};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Inflow imbalance above which a one-sided rush to exchanges is read as a
/// coordinated exit rather than ordinary selling
const EXIT_IMBALANCE: f64 = 0.9;
/// Minimum inflow transactions for the exit classification
const EXIT_MIN_TRANSACTIONS: usize = 5;

pub struct MetricDeriver {
    weights: AnomalyWeights,
}

impl MetricDeriver {
    pub fn new(weights: AnomalyWeights) -> Self {
        Self { weights }
    }

    /// Percentage change from previous to current. None when previous is
    /// missing or zero (derivation gap, not an error).
    pub fn pct_change(current: Decimal, previous: Option<Decimal>) -> Option<f64> {
        let previous = previous?;
        if previous.is_zero() {
            return None;
        }
        ((current - previous) / previous * Decimal::ONE_HUNDRED).to_f64()
    }

    /// Derive metrics for one symbol from its price history (newest first)
    /// plus 24h whale and social context.
    pub fn derive(
        &self,
        symbol: &str,
        history: &[PricePoint],
        whale_tx_count_24h: i64,
        whale_volume_24h: Decimal,
        mention_volume_24h: i64,
        as_of: DateTime<Utc>,
    ) -> SymbolMetrics {
        let current = history.first();
        let previous = history.get(1);

        let price_change_1h = current
            .and_then(|c| Self::pct_change(c.close, previous.map(|p| p.close)));
        let volume_change_1h = current
            .and_then(|c| Self::pct_change(c.volume, previous.map(|p| p.volume)));
        let price_change_24h = current
            .and_then(|c| c.price_change_24h)
            .and_then(|d| d.to_f64());

        let anomaly_score = self.anomaly_score(
            price_change_1h,
            volume_change_1h,
            whale_tx_count_24h,
            mention_volume_24h,
        );

        SymbolMetrics {
            symbol: symbol.to_string(),
            as_of,
            close: current.map(|c| c.close),
            price_change_1h,
            volume_change_1h,
            price_change_24h,
            whale_tx_count_24h,
            whale_volume_24h,
            mention_volume_24h,
            anomaly_score,
        }
    }

    /// Composite anomaly signal in [0, 1]: weighted mean of four saturated
    /// components. Monotonic in the magnitude of every input; missing inputs
    /// contribute zero.
    pub fn anomaly_score(
        &self,
        price_change_1h: Option<f64>,
        volume_change_1h: Option<f64>,
        whale_tx_count_24h: i64,
        mention_volume_24h: i64,
    ) -> f64 {
        let w = &self.weights;

        let price_signal = saturate(price_change_1h.unwrap_or(0.0).abs(), w.price_saturation);
        let volume_signal = saturate(volume_change_1h.unwrap_or(0.0).abs(), w.volume_saturation);
        let whale_signal = saturate(whale_tx_count_24h as f64, w.whale_saturation);
        let social_signal = saturate(mention_volume_24h as f64, w.social_saturation);

        let weight_sum = w.price_weight + w.volume_weight + w.whale_weight + w.social_weight;
        if weight_sum <= 0.0 {
            return 0.0;
        }

        let score = (price_signal * w.price_weight
            + volume_signal * w.volume_weight
            + whale_signal * w.whale_weight
            + social_signal * w.social_weight)
            / weight_sum;

        score.clamp(0.0, 1.0)
    }

    /// Infer the dominant whale pressure from 24h exchange flows. None when
    /// no exchange-touching flow was observed.
    pub fn whale_forecast(symbol: &str, transactions: &[WhaleTransaction]) -> Option<WhaleForecast> {
        let mut inflow = Decimal::ZERO;
        let mut outflow = Decimal::ZERO;
        let mut inflow_count = 0usize;

        for tx in transactions {
            if tx.is_exchange_inflow() {
                inflow += tx.amount_usd;
                inflow_count += 1;
            } else if tx.is_exchange_outflow() {
                outflow += tx.amount_usd;
            }
        }

        let total = inflow + outflow;
        if total.is_zero() {
            return None;
        }

        let imbalance = ((inflow - outflow) / total).to_f64()?;
        let probability = imbalance.abs().clamp(0.0, 1.0);

        let next_action = if imbalance >= EXIT_IMBALANCE && inflow_count >= EXIT_MIN_TRANSACTIONS {
            WhaleAction::Exit
        } else if imbalance >= 0.5 {
            WhaleAction::MassiveSell
        } else if imbalance <= -0.5 {
            WhaleAction::MassiveBuy
        } else if imbalance < 0.0 {
            WhaleAction::Accumulate
        } else {
            WhaleAction::Neutral
        };

        Some(WhaleForecast {
            symbol: symbol.to_string(),
            next_action,
            probability,
            inflow_usd: inflow,
            outflow_usd: outflow,
        })
    }

    /// Net cross-chain dislocation on a fixed notional. None when prices are
    /// unusable or the gross spread cannot cover transfer costs.
    pub fn arbitrage(quote: &CrossChainQuote, notional_usd: Decimal) -> Option<ArbitrageOpportunity> {
        if quote.price_a <= Decimal::ZERO || quote.price_b <= Decimal::ZERO {
            return None;
        }

        let (buy_chain, buy_price, buy_liq, sell_chain, sell_price, sell_liq) =
            if quote.price_a <= quote.price_b {
                (
                    &quote.chain_a,
                    quote.price_a,
                    quote.liquidity_a,
                    &quote.chain_b,
                    quote.price_b,
                    quote.liquidity_b,
                )
            } else {
                (
                    &quote.chain_b,
                    quote.price_b,
                    quote.liquidity_b,
                    &quote.chain_a,
                    quote.price_a,
                    quote.liquidity_a,
                )
            };

        let spread = (sell_price - buy_price) / buy_price;
        let gross = notional_usd * spread;
        let profit = gross - quote.bridge_fee_usd - quote.gas_cost_a_usd - quote.gas_cost_b_usd;
        if profit <= Decimal::ZERO {
            return None;
        }

        // Thinner side's depth relative to a 10x notional buffer; deep books
        // approach certainty but never reach it.
        let min_liquidity = buy_liq.min(sell_liq);
        let coverage = (min_liquidity / (notional_usd * Decimal::TEN)).to_f64()?;
        let success_probability = coverage.clamp(0.0, 0.99);

        Some(ArbitrageOpportunity {
            token: quote.token.clone(),
            buy_chain: buy_chain.clone(),
            sell_chain: sell_chain.clone(),
            profit_usd: profit,
            success_probability,
            spread_pct: (spread * Decimal::ONE_HUNDRED).to_f64().unwrap_or(0.0),
        })
    }
}

fn saturate(value: f64, saturation: f64) -> f64 {
    if saturation <= 0.0 {
        return 0.0;
    }
    (value / saturation).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WalletKind;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn point(symbol: &str, ts: DateTime<Utc>, close: Decimal, volume: Decimal) -> PricePoint {
        PricePoint {
            timestamp: ts,
            symbol: symbol.to_string(),
            open: close,
            high: close,
            low: close,
            close,
            volume,
            market_cap: None,
            price_change_24h: None,
        }
    }

    fn deriver() -> MetricDeriver {
        MetricDeriver::new(AnomalyWeights::default())
    }

    #[test]
    fn test_pct_change_basic() {
        assert_eq!(
            MetricDeriver::pct_change(dec!(96), Some(dec!(100))),
            Some(-4.0)
        );
        assert_eq!(
            MetricDeriver::pct_change(dec!(70), Some(dec!(100))),
            Some(-30.0)
        );
    }

    #[test]
    fn test_pct_change_gaps() {
        // Missing previous and zero previous are gaps, not errors
        assert_eq!(MetricDeriver::pct_change(dec!(100), None), None);
        assert_eq!(MetricDeriver::pct_change(dec!(100), Some(dec!(0))), None);
    }

    #[test]
    fn test_derive_btc_minus_four_percent() {
        let t1 = Utc::now();
        let t0 = t1 - Duration::hours(1);
        // Newest first
        let history = vec![
            point("BTC", t1, dec!(96), dec!(1000)),
            point("BTC", t0, dec!(100), dec!(1000)),
        ];

        let metrics = deriver().derive("BTC", &history, 0, Decimal::ZERO, 0, t1);
        assert_eq!(metrics.price_change_1h, Some(-4.0));
        assert_eq!(metrics.volume_change_1h, Some(0.0));
        // Modest move, no whale/social activity: stays well below firing range
        assert!(metrics.anomaly_score < 0.7);
    }

    #[test]
    fn test_derive_single_point_has_gaps() {
        let t1 = Utc::now();
        let history = vec![point("BTC", t1, dec!(100), dec!(1000))];
        let metrics = deriver().derive("BTC", &history, 0, Decimal::ZERO, 0, t1);
        assert_eq!(metrics.price_change_1h, None);
        assert_eq!(metrics.volume_change_1h, None);
    }

    #[test]
    fn test_anomaly_score_bounds() {
        let d = deriver();
        assert_eq!(d.anomaly_score(None, None, 0, 0), 0.0);
        // Extreme everything still clamps to 1.0
        let max = d.anomaly_score(Some(1000.0), Some(1000.0), 1000, 100_000);
        assert!((max - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_anomaly_score_monotonic() {
        let d = deriver();
        let base = d.anomaly_score(Some(2.0), Some(10.0), 2, 50);
        assert!(d.anomaly_score(Some(4.0), Some(10.0), 2, 50) >= base);
        assert!(d.anomaly_score(Some(2.0), Some(20.0), 2, 50) >= base);
        assert!(d.anomaly_score(Some(2.0), Some(10.0), 5, 50) >= base);
        assert!(d.anomaly_score(Some(2.0), Some(10.0), 2, 100) >= base);
    }

    fn whale_tx(usd: Decimal, from: WalletKind, to: WalletKind) -> WhaleTransaction {
        WhaleTransaction {
            timestamp: Utc::now(),
            blockchain: "ethereum".to_string(),
            tx_hash: format!("0x{usd}"),
            from_address: "0xa".to_string(),
            to_address: "0xb".to_string(),
            symbol: "ETH".to_string(),
            amount: usd,
            amount_usd: usd,
            from_type: from,
            to_type: to,
            transaction_type: "transfer".to_string(),
        }
    }

    #[test]
    fn test_whale_forecast_sell_pressure() {
        let txs = vec![
            whale_tx(dec!(9000000), WalletKind::Wallet, WalletKind::Exchange),
            whale_tx(dec!(1000000), WalletKind::Exchange, WalletKind::Wallet),
        ];
        let forecast = MetricDeriver::whale_forecast("ETH", &txs).unwrap();
        assert_eq!(forecast.next_action, WhaleAction::MassiveSell);
        assert!((forecast.probability - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_whale_forecast_exit_needs_many_inflows() {
        let txs: Vec<_> = (0..6)
            .map(|i| {
                whale_tx(
                    Decimal::from(2_000_000 + i),
                    WalletKind::Wallet,
                    WalletKind::Exchange,
                )
            })
            .collect();
        let forecast = MetricDeriver::whale_forecast("ETH", &txs).unwrap();
        assert_eq!(forecast.next_action, WhaleAction::Exit);
        assert!(forecast.probability > 0.99);
    }

    #[test]
    fn test_whale_forecast_none_without_exchange_flow() {
        let txs = vec![whale_tx(
            dec!(5000000),
            WalletKind::Wallet,
            WalletKind::Wallet,
        )];
        assert!(MetricDeriver::whale_forecast("ETH", &txs).is_none());
    }

    fn quote(price_a: Decimal, price_b: Decimal) -> CrossChainQuote {
        CrossChainQuote {
            timestamp: Utc::now(),
            token: "USDC".to_string(),
            chain_a: "ethereum".to_string(),
            price_a,
            liquidity_a: dec!(5000000),
            chain_b: "arbitrum".to_string(),
            price_b,
            liquidity_b: dec!(2000000),
            bridge_fee_usd: dec!(8),
            gas_cost_a_usd: dec!(12),
            gas_cost_b_usd: dec!(1),
        }
    }

    #[test]
    fn test_arbitrage_nets_out_costs() {
        // 5% spread on 10k notional = 500 gross, minus 21 in fees
        let opp = MetricDeriver::arbitrage(&quote(dec!(1.00), dec!(1.05)), dec!(10000)).unwrap();
        assert_eq!(opp.buy_chain, "ethereum");
        assert_eq!(opp.sell_chain, "arbitrum");
        assert_eq!(opp.profit_usd, dec!(479));
        assert_eq!(opp.success_probability, 0.99);
    }

    #[test]
    fn test_arbitrage_none_when_costs_dominate() {
        // 0.1% spread = 10 gross, fees are 21
        assert!(MetricDeriver::arbitrage(&quote(dec!(1.000), dec!(1.001)), dec!(10000)).is_none());
    }
}
