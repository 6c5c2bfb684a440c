//! The market-event pipeline: sync → derive → evaluate → aggregate, connected
//! only through the canonical store.

mod analytics;
mod dashboard;
mod deriver;
mod evaluator;
mod sync;

pub use analytics::AnalyticsRunner;
pub use dashboard::DashboardAggregator;
pub use deriver::MetricDeriver;
pub use evaluator::AlertEvaluator;
pub use sync::{SyncRunner, SyncSink};
