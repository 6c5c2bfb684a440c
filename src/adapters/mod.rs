//! Source adapters and the canonical store.
//!
//! Each adapter normalizes one external feed into canonical records. Adapters
//! never retry: a transient failure surfaces as an error and the scheduler's
//! next tick is the retry.

mod cross_chain;
mod defi_yield;
mod market_data;
mod postgres;
mod whale_alert;

pub use cross_chain::CrossChainAdapter;
pub use defi_yield::DefiYieldAdapter;
pub use market_data::MarketDataAdapter;
pub use postgres::PostgresStore;
pub use whale_alert::WhaleAlertAdapter;

use crate::domain::{CrossChainQuote, DefiYieldSample, PricePoint, WhaleTransaction};
use crate::error::{KlaxonError, Result};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use std::time::Duration;

/// Cap on any single source request, so an adapter cannot block past its
/// job's period
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Normalized output of one adapter invocation
#[derive(Debug, Clone)]
pub enum RecordBatch {
    Prices(Vec<PricePoint>),
    WhaleTransactions(Vec<WhaleTransaction>),
    DefiYields(Vec<DefiYieldSample>),
    CrossChainQuotes(Vec<CrossChainQuote>),
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        match self {
            RecordBatch::Prices(v) => v.len(),
            RecordBatch::WhaleTransactions(v) => v.len(),
            RecordBatch::DefiYields(v) => v.len(),
            RecordBatch::CrossChainQuotes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A polymorphic data source. One fetch pulls a bounded number of records;
/// rate limits are respected by that bound, never by blocking.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Handler name, used as the SyncStatus key
    fn name(&self) -> &'static str;

    /// Fetch and normalize one batch of records
    async fn fetch(&self) -> Result<RecordBatch>;
}

/// Map a non-success HTTP response to the adapter error taxonomy.
pub(crate) fn check_status(source: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = format!("{} returned HTTP {}", source, status);
    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(KlaxonError::RateLimited(detail)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(KlaxonError::Auth(detail)),
        _ => Err(KlaxonError::SourceUnavailable(detail)),
    }
}

/// Wrap a reqwest transport failure as SourceUnavailable
pub(crate) fn transport_error(source: &str, err: reqwest::Error) -> KlaxonError {
    KlaxonError::SourceUnavailable(format!("{}: {}", source, err))
}

/// Wrap a payload decode failure as MalformedResponse
pub(crate) fn decode_error(source: &str, err: impl std::fmt::Display) -> KlaxonError {
    KlaxonError::MalformedResponse {
        origin: source.to_string(),
        detail: err.to_string(),
    }
}
