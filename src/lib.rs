pub mod adapters;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod scheduler;
pub mod services;

pub use adapters::{
    CrossChainAdapter, DefiYieldAdapter, MarketDataAdapter, PostgresStore, RecordBatch,
    SourceAdapter, WhaleAlertAdapter,
};
pub use config::AppConfig;
pub use coordination::{install_signal_handlers, GracefulShutdown};
pub use domain::{
    Alert, AlertType, CrossChainQuote, DashboardRow, DefiYieldSample, PricePoint, SentimentSample,
    Severity, SymbolMetrics, SyncState, SyncStatus, WhaleTransaction,
};
pub use error::{KlaxonError, Result};
pub use pipeline::{AlertEvaluator, AnalyticsRunner, DashboardAggregator, MetricDeriver, SyncRunner};
pub use scheduler::{JobRegistry, Scheduler};
pub use services::{OpsServer, OpsState};
