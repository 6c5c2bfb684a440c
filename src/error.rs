use thiserror::Error;

/// Main error type for the market-event pipeline
#[derive(Error, Debug)]
pub enum KlaxonError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Source adapter errors
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Malformed response from {origin}: {detail}")]
    MalformedResponse { origin: String, detail: String },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Scheduler errors
    #[error("Job already registered: {0}")]
    DuplicateJob(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for KlaxonError
pub type Result<T> = std::result::Result<T, KlaxonError>;

impl KlaxonError {
    /// Short machine-readable category, used in SyncStatus error messages
    /// and job run records.
    pub fn category(&self) -> &'static str {
        match self {
            KlaxonError::Config(_) => "config",
            KlaxonError::Database(_) | KlaxonError::Migration(_) => "database",
            KlaxonError::Http(_) | KlaxonError::SourceUnavailable(_) => "source_unavailable",
            KlaxonError::RateLimited(_) => "rate_limited",
            KlaxonError::Auth(_) => "auth",
            KlaxonError::MalformedResponse { .. } => "malformed_response",
            KlaxonError::Json(_) => "json",
            KlaxonError::DuplicateJob(_) => "duplicate_job",
            KlaxonError::Io(_) => "io",
            KlaxonError::Internal(_) | KlaxonError::Other(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let err = KlaxonError::RateLimited("whale source".to_string());
        assert_eq!(err.category(), "rate_limited");

        let err = KlaxonError::MalformedResponse {
            origin: "market_data".to_string(),
            detail: "missing quote field".to_string(),
        };
        assert_eq!(err.category(), "malformed_response");
    }
}
