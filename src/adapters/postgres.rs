use super::RecordBatch;
use crate::domain::{
    Alert, AlertType, CrossChainQuote, DashboardRow, DefiYieldSample, PricePoint, SentimentSample,
    Severity, SyncState, SyncStatus, WalletKind, WhaleTransaction,
};
use crate::error::{KlaxonError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info, instrument};

/// PostgreSQL canonical store
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a store from an existing connection pool (zero-cost reuse)
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Cheap connectivity probe for readiness checks
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Apply a normalized batch, dispatching on entity kind.
    /// Returns the number of rows actually written.
    pub async fn apply_batch(&self, batch: &RecordBatch) -> Result<u64> {
        match batch {
            RecordBatch::Prices(points) => self.upsert_price_points(points).await,
            RecordBatch::WhaleTransactions(txs) => self.insert_whale_transactions(txs).await,
            RecordBatch::DefiYields(samples) => self.insert_defi_yields(samples).await,
            RecordBatch::CrossChainQuotes(quotes) => self.insert_cross_chain_quotes(quotes).await,
        }
    }

    // ==================== Price points ====================

    /// Upsert price points, keyed by (symbol, timestamp). Latest wins: a
    /// replayed key corrects the row in place. Each statement is atomic per
    /// record, so readers never observe a partial row.
    #[instrument(skip_all, fields(count = points.len()))]
    pub async fn upsert_price_points(&self, points: &[PricePoint]) -> Result<u64> {
        if points.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for point in points {
            let result = sqlx::query(
                r#"
                INSERT INTO price_points (
                    symbol, timestamp, open, high, low, close, volume, market_cap, price_change_24h
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (symbol, timestamp) DO UPDATE SET
                    open = EXCLUDED.open,
                    high = EXCLUDED.high,
                    low = EXCLUDED.low,
                    close = EXCLUDED.close,
                    volume = EXCLUDED.volume,
                    market_cap = EXCLUDED.market_cap,
                    price_change_24h = EXCLUDED.price_change_24h
                "#,
            )
            .bind(&point.symbol)
            .bind(point.timestamp)
            .bind(point.open)
            .bind(point.high)
            .bind(point.low)
            .bind(point.close)
            .bind(point.volume)
            .bind(point.market_cap)
            .bind(point.price_change_24h)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        debug!("Upserted {} price points", written);
        Ok(written)
    }

    /// Ordered history for one symbol, newest first
    pub async fn price_history(&self, symbol: &str, limit: i64) -> Result<Vec<PricePoint>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, timestamp, open, high, low, close, volume, market_cap, price_change_24h
            FROM price_points
            WHERE symbol = $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(symbol)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(price_point_from_row).collect())
    }

    /// Latest committed price point per symbol
    pub async fn latest_price_points(&self) -> Result<Vec<PricePoint>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (symbol)
                   symbol, timestamp, open, high, low, close, volume, market_cap, price_change_24h
            FROM price_points
            ORDER BY symbol, timestamp DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(price_point_from_row).collect())
    }

    /// Delete price points older than the cutoff. Returns rows removed.
    pub async fn prune_price_points(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM price_points WHERE timestamp < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;

        let pruned = result.rows_affected();
        if pruned > 0 {
            info!("Pruned {} price points older than {}", pruned, before);
        }
        Ok(pruned)
    }

    // ==================== Whale transactions ====================

    /// Insert whale transactions, deduplicated by tx_hash. Replayed hashes are
    /// silently skipped; the returned count covers only genuinely new rows.
    #[instrument(skip_all, fields(count = transactions.len()))]
    pub async fn insert_whale_transactions(
        &self,
        transactions: &[WhaleTransaction],
    ) -> Result<u64> {
        if transactions.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for t in transactions {
            let result = sqlx::query(
                r#"
                INSERT INTO whale_transactions (
                    tx_hash, timestamp, blockchain, from_address, to_address, symbol,
                    amount, amount_usd, from_type, to_type, transaction_type
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (tx_hash) DO NOTHING
                "#,
            )
            .bind(&t.tx_hash)
            .bind(t.timestamp)
            .bind(&t.blockchain)
            .bind(&t.from_address)
            .bind(&t.to_address)
            .bind(&t.symbol)
            .bind(t.amount)
            .bind(t.amount_usd)
            .bind(t.from_type.as_str())
            .bind(t.to_type.as_str())
            .bind(&t.transaction_type)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        debug!(
            "Inserted {} whale transactions ({} duplicates skipped)",
            written,
            transactions.len() as u64 - written
        );
        Ok(written)
    }

    /// Whale transactions for one symbol since the cutoff, oldest first
    pub async fn whale_transactions_since(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<WhaleTransaction>> {
        let rows = sqlx::query(
            r#"
            SELECT tx_hash, timestamp, blockchain, from_address, to_address, symbol,
                   amount, amount_usd, from_type, to_type, transaction_type
            FROM whale_transactions
            WHERE symbol = $1 AND timestamp >= $2
            ORDER BY timestamp ASC
            "#,
        )
        .bind(symbol)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| WhaleTransaction {
                tx_hash: r.get("tx_hash"),
                timestamp: r.get("timestamp"),
                blockchain: r.get("blockchain"),
                from_address: r.get("from_address"),
                to_address: r.get("to_address"),
                symbol: r.get("symbol"),
                amount: r.get("amount"),
                amount_usd: r.get("amount_usd"),
                from_type: WalletKind::from_str(r.get::<&str, _>("from_type")),
                to_type: WalletKind::from_str(r.get::<&str, _>("to_type")),
                transaction_type: r.get("transaction_type"),
            })
            .collect())
    }

    /// Per-symbol 24h-style rollup: (count, summed USD) since the cutoff
    pub async fn whale_rollups(&self, since: DateTime<Utc>) -> Result<Vec<(String, i64, Decimal)>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, COUNT(*) AS tx_count, COALESCE(SUM(amount_usd), 0) AS volume_usd
            FROM whale_transactions
            WHERE timestamp >= $1
            GROUP BY symbol
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| (r.get("symbol"), r.get("tx_count"), r.get("volume_usd")))
            .collect())
    }

    // ==================== Sentiment ====================

    /// Append sentiment samples (written by the external analysis platform
    /// through this surface)
    pub async fn insert_sentiment_samples(&self, samples: &[SentimentSample]) -> Result<u64> {
        if samples.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for s in samples {
            let result = sqlx::query(
                r#"
                INSERT INTO sentiment_samples (
                    timestamp, platform, symbol, sentiment_score,
                    mention_count, positive_mentions, negative_mentions
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(s.timestamp)
            .bind(&s.platform)
            .bind(&s.symbol)
            .bind(s.sentiment_score)
            .bind(s.mention_count)
            .bind(s.positive_mentions)
            .bind(s.negative_mentions)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    /// (average score, total mentions) for one symbol since the cutoff
    pub async fn sentiment_stats(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<(Option<f64>, i64)> {
        let row = sqlx::query(
            r#"
            SELECT AVG(sentiment_score) AS avg_score,
                   COALESCE(SUM(mention_count), 0)::BIGINT AS mentions
            FROM sentiment_samples
            WHERE symbol = $1 AND timestamp >= $2
            "#,
        )
        .bind(symbol)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok((row.get("avg_score"), row.get("mentions")))
    }

    /// Per-symbol average sentiment since the cutoff
    pub async fn sentiment_averages(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, Option<f64>)>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, AVG(sentiment_score) AS avg_score
            FROM sentiment_samples
            WHERE timestamp >= $1
            GROUP BY symbol
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| (r.get("symbol"), r.get("avg_score")))
            .collect())
    }

    // ==================== DeFi yields ====================

    /// Append yield samples from one sync cycle
    pub async fn insert_defi_yields(&self, samples: &[DefiYieldSample]) -> Result<u64> {
        if samples.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for s in samples {
            let result = sqlx::query(
                r#"
                INSERT INTO defi_yield_samples (
                    timestamp, protocol, chain, pool, apy, tvl_usd, risk_score
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(s.timestamp)
            .bind(&s.protocol)
            .bind(&s.chain)
            .bind(&s.pool)
            .bind(s.apy)
            .bind(s.tvl_usd)
            .bind(s.risk_score)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    // ==================== Cross-chain quotes ====================

    /// Append cross-chain quotes
    pub async fn insert_cross_chain_quotes(&self, quotes: &[CrossChainQuote]) -> Result<u64> {
        if quotes.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for q in quotes {
            let result = sqlx::query(
                r#"
                INSERT INTO cross_chain_quotes (
                    timestamp, token, chain_a, price_a, liquidity_a,
                    chain_b, price_b, liquidity_b,
                    bridge_fee_usd, gas_cost_a_usd, gas_cost_b_usd
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(q.timestamp)
            .bind(&q.token)
            .bind(&q.chain_a)
            .bind(q.price_a)
            .bind(q.liquidity_a)
            .bind(&q.chain_b)
            .bind(q.price_b)
            .bind(q.liquidity_b)
            .bind(q.bridge_fee_usd)
            .bind(q.gas_cost_a_usd)
            .bind(q.gas_cost_b_usd)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Latest quote per token
    pub async fn latest_cross_chain_quotes(&self) -> Result<Vec<CrossChainQuote>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (token)
                   timestamp, token, chain_a, price_a, liquidity_a,
                   chain_b, price_b, liquidity_b,
                   bridge_fee_usd, gas_cost_a_usd, gas_cost_b_usd
            FROM cross_chain_quotes
            ORDER BY token, timestamp DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| CrossChainQuote {
                timestamp: r.get("timestamp"),
                token: r.get("token"),
                chain_a: r.get("chain_a"),
                price_a: r.get("price_a"),
                liquidity_a: r.get("liquidity_a"),
                chain_b: r.get("chain_b"),
                price_b: r.get("price_b"),
                liquidity_b: r.get("liquidity_b"),
                bridge_fee_usd: r.get("bridge_fee_usd"),
                gas_cost_a_usd: r.get("gas_cost_a_usd"),
                gas_cost_b_usd: r.get("gas_cost_b_usd"),
            })
            .collect())
    }

    // ==================== Sync status ====================

    /// Record a successful sync. Moves last_sync and records_synced forward
    /// and clears any previous error.
    pub async fn record_sync_success(&self, handler: &str, records: u64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_status (handler_name, last_sync, records_synced, status, error_message, updated_at)
            VALUES ($1, NOW(), $2, 'ok', NULL, NOW())
            ON CONFLICT (handler_name) DO UPDATE SET
                last_sync = NOW(),
                records_synced = EXCLUDED.records_synced,
                status = 'ok',
                error_message = NULL,
                updated_at = NOW()
            "#,
        )
        .bind(handler)
        .bind(records as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed sync. last_sync and records_synced keep their values
    /// from the prior success, so staleness stays detectable.
    pub async fn record_sync_failure(&self, handler: &str, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_status (handler_name, last_sync, records_synced, status, error_message, updated_at)
            VALUES ($1, NULL, 0, 'error', $2, NOW())
            ON CONFLICT (handler_name) DO UPDATE SET
                status = 'error',
                error_message = EXCLUDED.error_message,
                updated_at = NOW()
            "#,
        )
        .bind(handler)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Escalate a handler to degraded after repeated consecutive failures
    pub async fn record_sync_degraded(&self, handler: &str, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_status (handler_name, last_sync, records_synced, status, error_message, updated_at)
            VALUES ($1, NULL, 0, 'degraded', $2, NOW())
            ON CONFLICT (handler_name) DO UPDATE SET
                status = 'degraded',
                error_message = EXCLUDED.error_message,
                updated_at = NOW()
            "#,
        )
        .bind(handler)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All sync status rows, for the ops surface
    pub async fn get_sync_statuses(&self) -> Result<Vec<SyncStatus>> {
        let rows = sqlx::query(
            r#"
            SELECT handler_name, last_sync, records_synced, status, error_message, updated_at
            FROM sync_status
            ORDER BY handler_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let status = SyncState::try_from(r.get::<&str, _>("status"))
                    .map_err(KlaxonError::Internal)?;
                Ok(SyncStatus {
                    handler_name: r.get("handler_name"),
                    last_sync: r.get("last_sync"),
                    records_synced: r.get("records_synced"),
                    status,
                    error_message: r.get("error_message"),
                    updated_at: r.get("updated_at"),
                })
            })
            .collect()
    }

    // ==================== Alerts ====================

    /// Insert a fired alert
    pub async fn insert_alert(&self, alert: &Alert) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO alerts (alert_type, symbol, severity, message, data, created_at, acknowledged)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE)
            RETURNING id
            "#,
        )
        .bind(alert.alert_type.as_str())
        .bind(&alert.symbol)
        .bind(alert.severity.as_str())
        .bind(&alert.message)
        .bind(&alert.data)
        .bind(alert.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    /// Unacknowledged alerts, newest first (the downstream notification feed)
    pub async fn unacknowledged_alerts(&self, limit: i64) -> Result<Vec<Alert>> {
        let rows = sqlx::query(
            r#"
            SELECT id, alert_type, symbol, severity, message, data, created_at, acknowledged
            FROM alerts
            WHERE acknowledged = FALSE
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(alert_from_row).collect()
    }

    /// Flag an alert as acknowledged. Returns false when the id is unknown.
    pub async fn acknowledge_alert(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE alerts SET acknowledged = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Most recent alert timestamp per symbol
    pub async fn latest_alert_times(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, MAX(created_at) AS last_alert
            FROM alerts
            GROUP BY symbol
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| (r.get("symbol"), r.get("last_alert")))
            .collect())
    }

    // ==================== Dashboard ====================

    /// Replace the dashboard projection in one transaction. A symbol missing
    /// from `rows` disappears; nothing is merged.
    #[instrument(skip_all, fields(count = rows.len()))]
    pub async fn replace_dashboard(&self, rows: &[DashboardRow]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM dashboard_summary")
            .execute(&mut *tx)
            .await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO dashboard_summary (
                    symbol, current_price, price_change_24h, volume, market_cap,
                    whale_tx_24h, whale_volume_24h, avg_sentiment, last_alert_time, refreshed_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(&row.symbol)
            .bind(row.current_price)
            .bind(row.price_change_24h)
            .bind(row.volume)
            .bind(row.market_cap)
            .bind(row.whale_tx_24h)
            .bind(row.whale_volume_24h)
            .bind(row.avg_sentiment)
            .bind(row.last_alert_time)
            .bind(row.refreshed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Dashboard refreshed with {} rows", rows.len());
        Ok(())
    }

    /// Current dashboard rows
    pub async fn get_dashboard(&self) -> Result<Vec<DashboardRow>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, current_price, price_change_24h, volume, market_cap,
                   whale_tx_24h, whale_volume_24h, avg_sentiment, last_alert_time, refreshed_at
            FROM dashboard_summary
            ORDER BY symbol
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| DashboardRow {
                symbol: r.get("symbol"),
                current_price: r.get("current_price"),
                price_change_24h: r.get("price_change_24h"),
                volume: r.get("volume"),
                market_cap: r.get("market_cap"),
                whale_tx_24h: r.get("whale_tx_24h"),
                whale_volume_24h: r.get("whale_volume_24h"),
                avg_sentiment: r.get("avg_sentiment"),
                last_alert_time: r.get("last_alert_time"),
                refreshed_at: r.get("refreshed_at"),
            })
            .collect())
    }
}

fn price_point_from_row(row: &sqlx::postgres::PgRow) -> PricePoint {
    PricePoint {
        symbol: row.get("symbol"),
        timestamp: row.get("timestamp"),
        open: row.get("open"),
        high: row.get("high"),
        low: row.get("low"),
        close: row.get("close"),
        volume: row.get("volume"),
        market_cap: row.get("market_cap"),
        price_change_24h: row.get("price_change_24h"),
    }
}

fn alert_from_row(row: &sqlx::postgres::PgRow) -> Result<Alert> {
    let type_str: &str = row.get("alert_type");
    let alert_type = AlertType::from_str(type_str)
        .ok_or_else(|| KlaxonError::Internal(format!("unknown alert type in DB: {type_str}")))?;
    let severity_str: &str = row.get("severity");
    let severity = Severity::from_str(severity_str)
        .ok_or_else(|| KlaxonError::Internal(format!("unknown severity in DB: {severity_str}")))?;

    Ok(Alert {
        id: Some(row.get("id")),
        alert_type,
        symbol: row.get("symbol"),
        severity,
        message: row.get("message"),
        data: row.get("data"),
        created_at: row.get("created_at"),
        acknowledged: row.get("acknowledged"),
    })
}
