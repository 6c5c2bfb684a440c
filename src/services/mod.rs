mod health;

pub use health::{HealthStatus, OpsServer, OpsState};
