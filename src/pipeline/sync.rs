//! Sync job body: fetch one batch from a source adapter, upsert it into the
//! canonical store, and record the outcome in the handler's SyncStatus row.

use crate::adapters::{RecordBatch, SourceAdapter};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Store surface a sync job needs. PostgresStore implements this; tests mock it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncSink: Send + Sync {
    async fn apply_batch(&self, batch: &RecordBatch) -> Result<u64>;
    async fn record_sync_success(&self, handler: &str, records: u64) -> Result<()>;
    async fn record_sync_failure(&self, handler: &str, error: &str) -> Result<()>;
    async fn record_sync_degraded(&self, handler: &str, error: &str) -> Result<()>;
}

#[async_trait]
impl SyncSink for crate::adapters::PostgresStore {
    async fn apply_batch(&self, batch: &RecordBatch) -> Result<u64> {
        // Inherent methods of the same name; fully-qualified calls keep
        // resolution unambiguous.
        crate::adapters::PostgresStore::apply_batch(self, batch).await
    }

    async fn record_sync_success(&self, handler: &str, records: u64) -> Result<()> {
        crate::adapters::PostgresStore::record_sync_success(self, handler, records).await
    }

    async fn record_sync_failure(&self, handler: &str, error: &str) -> Result<()> {
        crate::adapters::PostgresStore::record_sync_failure(self, handler, error).await
    }

    async fn record_sync_degraded(&self, handler: &str, error: &str) -> Result<()> {
        crate::adapters::PostgresStore::record_sync_degraded(self, handler, error).await
    }
}

/// One source's recurring sync. No retry here: a failed run surfaces as an
/// error and the next scheduled tick tries again.
pub struct SyncRunner<S: SyncSink> {
    adapter: Arc<dyn SourceAdapter>,
    sink: Arc<S>,
}

impl<S: SyncSink> SyncRunner<S> {
    pub fn new(adapter: Arc<dyn SourceAdapter>, sink: Arc<S>) -> Self {
        Self { adapter, sink }
    }

    pub fn handler_name(&self) -> &'static str {
        self.adapter.name()
    }

    /// Run one sync cycle. Returns the number of rows written.
    pub async fn run(&self) -> Result<u64> {
        let handler = self.adapter.name();

        match self.adapter.fetch().await {
            Ok(batch) => {
                let fetched = batch.len();
                let written = self.sink.apply_batch(&batch).await?;
                self.sink.record_sync_success(handler, written).await?;
                info!(
                    "{}: fetched {} records, wrote {}",
                    handler, fetched, written
                );
                Ok(written)
            }
            Err(e) => {
                let message = format!("{}: {}", e.category(), e);
                warn!("{}: sync failed ({})", handler, message);
                if let Err(status_err) = self.sink.record_sync_failure(handler, &message).await {
                    warn!("{}: could not record sync failure: {}", handler, status_err);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockSourceAdapter;
    use crate::domain::PricePoint;
    use crate::error::KlaxonError;
    use chrono::Utc;
    use mockall::predicate::eq;
    use rust_decimal_macros::dec;

    fn price_batch() -> RecordBatch {
        RecordBatch::Prices(vec![PricePoint {
            timestamp: Utc::now(),
            symbol: "BTC".to_string(),
            open: dec!(100),
            high: dec!(101),
            low: dec!(99),
            close: dec!(100.5),
            volume: dec!(1000),
            market_cap: None,
            price_change_24h: None,
        }])
    }

    #[tokio::test]
    async fn test_successful_sync_records_status() {
        let mut adapter = MockSourceAdapter::new();
        adapter.expect_name().return_const("market_sync");
        adapter.expect_fetch().times(1).returning(|| Ok(price_batch()));

        let mut sink = MockSyncSink::new();
        sink.expect_apply_batch().times(1).returning(|_| Ok(1));
        sink.expect_record_sync_success()
            .with(eq("market_sync"), eq(1u64))
            .times(1)
            .returning(|_, _| Ok(()));

        let runner = SyncRunner::new(Arc::new(adapter), Arc::new(sink));
        assert_eq!(runner.run().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_records_error_and_propagates() {
        let mut adapter = MockSourceAdapter::new();
        adapter.expect_name().return_const("whale_sync");
        adapter
            .expect_fetch()
            .times(1)
            .returning(|| Err(KlaxonError::RateLimited("whale feed".to_string())));

        let mut sink = MockSyncSink::new();
        sink.expect_apply_batch().times(0);
        sink.expect_record_sync_failure()
            .withf(|handler, message| {
                handler == "whale_sync" && message.starts_with("rate_limited")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let runner = SyncRunner::new(Arc::new(adapter), Arc::new(sink));
        assert!(runner.run().await.is_err());
    }

    #[tokio::test]
    async fn test_replayed_batch_reports_zero_new_rows() {
        // Insert-once entities: the sink reports only genuinely new rows, so
        // replaying an identical batch yields 0.
        let mut adapter = MockSourceAdapter::new();
        adapter.expect_name().return_const("whale_sync");
        adapter.expect_fetch().times(2).returning(|| Ok(price_batch()));

        let mut sink = MockSyncSink::new();
        let mut first = true;
        sink.expect_apply_batch().times(2).returning(move |_| {
            if first {
                first = false;
                Ok(1)
            } else {
                Ok(0)
            }
        });
        sink.expect_record_sync_success()
            .times(2)
            .returning(|_, _| Ok(()));

        let runner = SyncRunner::new(Arc::new(adapter), Arc::new(sink));
        assert_eq!(runner.run().await.unwrap(), 1);
        assert_eq!(runner.run().await.unwrap(), 0);
    }
}
