//! Analytics job body: derive metrics per symbol from the canonical store,
//! evaluate alert rules, and persist any fired alerts.

use super::{AlertEvaluator, MetricDeriver};
use crate::adapters::PostgresStore;
use crate::domain::Alert;
use crate::error::Result;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::warn;

pub struct AnalyticsRunner {
    store: PostgresStore,
    deriver: MetricDeriver,
    evaluator: Mutex<AlertEvaluator>,
    arbitrage_notional: Decimal,
}

impl AnalyticsRunner {
    pub fn new(
        store: PostgresStore,
        deriver: MetricDeriver,
        evaluator: AlertEvaluator,
        arbitrage_notional: Decimal,
    ) -> Self {
        Self {
            store,
            deriver,
            evaluator: Mutex::new(evaluator),
            arbitrage_notional,
        }
    }

    /// Run one analytics pass. Returns the number of alerts written. A symbol
    /// or rule whose inputs cannot be gathered is skipped; the pass continues.
    pub async fn run(&self) -> Result<u64> {
        let now = Utc::now();
        let day_ago = now - Duration::hours(24);

        // Latest committed point per symbol defines the working set; a sync
        // job writing concurrently only ever adds whole records.
        let latest = self.store.latest_price_points().await?;

        let mut evaluator = self.evaluator.lock().await;
        let mut fired = Vec::new();

        for point in &latest {
            let symbol = &point.symbol;

            let history = match self.store.price_history(symbol, 2).await {
                Ok(h) => h,
                Err(e) => {
                    warn!("Skipping {}: price history unavailable ({})", symbol, e);
                    continue;
                }
            };
            let whale_txs = match self.store.whale_transactions_since(symbol, day_ago).await {
                Ok(t) => t,
                Err(e) => {
                    warn!("Skipping {}: whale history unavailable ({})", symbol, e);
                    continue;
                }
            };
            let (_, mentions) = match self.store.sentiment_stats(symbol, day_ago).await {
                Ok(s) => s,
                Err(e) => {
                    warn!("{}: sentiment unavailable, treating as gap ({})", symbol, e);
                    (None, 0)
                }
            };

            let whale_volume: Decimal = whale_txs.iter().map(|t| t.amount_usd).sum();
            let metrics = self.deriver.derive(
                symbol,
                &history,
                whale_txs.len() as i64,
                whale_volume,
                mentions,
                now,
            );

            fired.extend(evaluator.evaluate_metrics(&metrics, now));

            if let Some(forecast) = MetricDeriver::whale_forecast(symbol, &whale_txs) {
                fired.extend(evaluator.evaluate_whale(&forecast, now));
            }
        }

        match self.store.latest_cross_chain_quotes().await {
            Ok(quotes) => {
                for quote in &quotes {
                    if let Some(opp) = MetricDeriver::arbitrage(quote, self.arbitrage_notional) {
                        fired.extend(evaluator.evaluate_arbitrage(&opp, now));
                    }
                }
            }
            Err(e) => warn!("Skipping arbitrage rules: quotes unavailable ({})", e),
        }

        drop(evaluator);
        self.persist(&fired).await
    }

    async fn persist(&self, alerts: &[Alert]) -> Result<u64> {
        let mut written = 0u64;
        for alert in alerts {
            match self.store.insert_alert(alert).await {
                Ok(_) => written += 1,
                Err(e) => warn!(
                    "Failed to persist {} alert for {}: {}",
                    alert.alert_type, alert.symbol, e
                ),
            }
        }
        Ok(written)
    }
}
