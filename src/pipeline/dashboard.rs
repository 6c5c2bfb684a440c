//! Dashboard job body: full per-symbol recompute of the summary projection.
//!
//! Replace, never merge: a symbol absent from the latest price set drops off
//! the dashboard on the next refresh.

use crate::adapters::PostgresStore;
use crate::domain::{DashboardRow, PricePoint};
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

pub struct DashboardAggregator {
    store: PostgresStore,
}

impl DashboardAggregator {
    pub fn new(store: PostgresStore) -> Self {
        Self { store }
    }

    /// Recompute and replace the dashboard. Returns the number of rows.
    pub async fn run(&self) -> Result<u64> {
        let now = Utc::now();
        let day_ago = now - Duration::hours(24);

        let latest = self.store.latest_price_points().await?;
        let whales: HashMap<String, (i64, Decimal)> = self
            .store
            .whale_rollups(day_ago)
            .await?
            .into_iter()
            .map(|(symbol, count, volume)| (symbol, (count, volume)))
            .collect();
        let sentiment: HashMap<String, Option<f64>> = self
            .store
            .sentiment_averages(day_ago)
            .await?
            .into_iter()
            .collect();
        let alert_times: HashMap<String, DateTime<Utc>> = self
            .store
            .latest_alert_times()
            .await?
            .into_iter()
            .collect();

        let rows = build_rows(&latest, &whales, &sentiment, &alert_times, now);
        self.store.replace_dashboard(&rows).await?;
        Ok(rows.len() as u64)
    }
}

/// Join the latest price points with the 24h rollups. Missing whale or
/// sentiment data leaves zeros/NULLs; only a missing price point drops the
/// symbol.
fn build_rows(
    latest: &[PricePoint],
    whales: &HashMap<String, (i64, Decimal)>,
    sentiment: &HashMap<String, Option<f64>>,
    alert_times: &HashMap<String, DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Vec<DashboardRow> {
    latest
        .iter()
        .map(|point| {
            let (whale_tx, whale_volume) = whales
                .get(&point.symbol)
                .copied()
                .unwrap_or((0, Decimal::ZERO));
            DashboardRow {
                symbol: point.symbol.clone(),
                current_price: point.close,
                price_change_24h: point.price_change_24h,
                volume: point.volume,
                market_cap: point.market_cap,
                whale_tx_24h: whale_tx,
                whale_volume_24h: whale_volume,
                avg_sentiment: sentiment.get(&point.symbol).copied().flatten(),
                last_alert_time: alert_times.get(&point.symbol).copied(),
                refreshed_at: now,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn point(symbol: &str, close: Decimal) -> PricePoint {
        PricePoint {
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1000),
            market_cap: Some(dec!(1000000)),
            price_change_24h: Some(dec!(1.5)),
        }
    }

    #[test]
    fn test_build_rows_joins_rollups() {
        let now = Utc::now();
        let latest = vec![point("BTC", dec!(37000)), point("ETH", dec!(2000))];

        let mut whales = HashMap::new();
        whales.insert("BTC".to_string(), (4i64, dec!(20000000)));
        let mut sentiment = HashMap::new();
        sentiment.insert("BTC".to_string(), Some(0.6));
        let mut alerts = HashMap::new();
        alerts.insert("BTC".to_string(), now);

        let rows = build_rows(&latest, &whales, &sentiment, &alerts, now);
        assert_eq!(rows.len(), 2);

        let btc = rows.iter().find(|r| r.symbol == "BTC").unwrap();
        assert_eq!(btc.whale_tx_24h, 4);
        assert_eq!(btc.whale_volume_24h, dec!(20000000));
        assert_eq!(btc.avg_sentiment, Some(0.6));
        assert_eq!(btc.last_alert_time, Some(now));

        // ETH has no whale/sentiment/alert data: zeros and NULLs, still present
        let eth = rows.iter().find(|r| r.symbol == "ETH").unwrap();
        assert_eq!(eth.whale_tx_24h, 0);
        assert_eq!(eth.whale_volume_24h, Decimal::ZERO);
        assert_eq!(eth.avg_sentiment, None);
        assert_eq!(eth.last_alert_time, None);
    }

    #[test]
    fn test_symbol_absent_from_latest_is_dropped() {
        let now = Utc::now();
        // Whale data exists for SOL but SOL has no latest price point
        let latest = vec![point("BTC", dec!(37000))];
        let mut whales = HashMap::new();
        whales.insert("SOL".to_string(), (10i64, dec!(90000000)));

        let rows = build_rows(&latest, &whales, &HashMap::new(), &HashMap::new(), now);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].symbol, "BTC");
    }
}
