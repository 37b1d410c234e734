//! Error types shared across the stamp engine workspace.

use thiserror::Error;

/// Result type alias using StampError.
pub type StampResult<T> = Result<T, StampError>;

/// Primary error type for stamp engine operations.
#[derive(Debug, Error)]
pub enum StampError {
    // === Provider Errors ===
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Provider request timed out")]
    ProviderTimeout,

    #[error("No geometry available for stamp: {0}")]
    NoGeometry(String),

    #[error("No native size available for stamp: {0}")]
    NoSize(String),

    // === Geometry Errors ===
    #[error("Degenerate cell geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Projection error: {0}")]
    ProjectionError(String),

    // === Storage Errors ===
    #[error("Store error: {0}")]
    StoreError(String),

    // === Render Errors ===
    #[error("Render failed: {0}")]
    RenderError(String),

    #[error("Render cancelled")]
    Cancelled,

    // === Infrastructure Errors ===
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl StampError {
    /// Whether a failure is transient: the caller should retry on the next
    /// render pass rather than surfacing it as fatal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StampError::ProviderUnavailable(_)
                | StampError::ProviderTimeout
                | StampError::StoreError(_)
        )
    }
}

impl From<std::io::Error> for StampError {
    fn from(err: std::io::Error) -> Self {
        StampError::StoreError(err.to_string())
    }
}

impl From<serde_json::Error> for StampError {
    fn from(err: serde_json::Error) -> Self {
        StampError::InternalError(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StampError::ProviderTimeout.is_transient());
        assert!(StampError::StoreError("disk full".into()).is_transient());
        assert!(!StampError::NoGeometry("stamp1".into()).is_transient());
        assert!(!StampError::Cancelled.is_transient());
    }
}
