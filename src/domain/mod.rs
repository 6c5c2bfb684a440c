mod alert;
mod dashboard;
mod metrics;
mod records;

pub use alert::{Alert, AlertType, Severity};
pub use dashboard::DashboardRow;
pub use metrics::{ArbitrageOpportunity, SymbolMetrics, WhaleAction, WhaleForecast};
pub use records::{
    CrossChainQuote, DefiYieldSample, PricePoint, SentimentSample, SyncState, SyncStatus,
    WalletKind, WhaleTransaction,
};
