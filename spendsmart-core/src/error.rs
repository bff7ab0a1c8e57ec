//! Error taxonomy and pipeline stage tracking

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpendError {
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Banking or AI API unreachable, rate-limited, or rejecting auth.
    /// Retried with backoff before being surfaced.
    #[error("{service} unavailable: {reason}")]
    UpstreamUnavailable { service: String, reason: String },

    /// Model returned a label outside the closed category set.
    /// Recovered locally by defaulting to Other.
    #[error("unrecognized category label: {0:?}")]
    AmbiguousCategory(String),

    /// Database unreachable; fatal for the current run.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Spreadsheet write failed; sync flags stay false so the next run
    /// retries.
    #[error("spreadsheet sync failed: {0}")]
    SyncFailure(String),
}

impl SpendError {
    pub fn upstream(service: &str, reason: impl std::fmt::Display) -> Self {
        SpendError::UpstreamUnavailable {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Only upstream outages are worth retrying; everything else is either
    /// fatal or already recovered locally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SpendError::UpstreamUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, SpendError>;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Categorizing,
    Persisting,
    Syncing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Fetching => "fetching",
            Stage::Categorizing => "categorizing",
            Stage::Persisting => "persisting",
            Stage::Syncing => "syncing",
        };
        f.write_str(s)
    }
}

/// Terminal failure state: which stage aborted the run, and why
#[derive(Error, Debug)]
#[error("pipeline failed while {stage}: {error}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub error: SpendError,
}

impl StageError {
    pub fn new(stage: Stage, error: SpendError) -> Self {
        Self { stage, error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SpendError::upstream("plaid", "timeout").is_retryable());
        assert!(!SpendError::StorageUnavailable("gone".into()).is_retryable());
        assert!(!SpendError::Config("missing".into()).is_retryable());
    }

    #[test]
    fn test_stage_error_display() {
        let e = StageError::new(Stage::Syncing, SpendError::SyncFailure("quota".into()));
        let msg = e.to_string();
        assert!(msg.contains("syncing"));
        assert!(msg.contains("quota") || e.error.to_string().contains("quota"));
    }
}
