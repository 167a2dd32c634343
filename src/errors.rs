// Error types for the download engine

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for queue runs and resolver calls.
///
/// Configuration errors are fatal to a run; per-item errors are recovered
/// at the item boundary and only counted.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Required external tool (yt-dlp, ffmpeg) is missing
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Output directory could not be created or used
    #[error("invalid output directory {path}: {reason}")]
    OutputDir { path: PathBuf, reason: String },

    /// A run is already in progress; overlapping runs are never permitted
    #[error("a download run is already in progress")]
    AlreadyRunning,

    /// Start was requested with nothing queued
    #[error("download queue is empty")]
    EmptyQueue,

    /// Metadata resolution failed for one queued reference
    #[error("failed to resolve '{reference}': {reason}")]
    Resolve { reference: String, reason: String },

    /// Materialization (download/post-processing) failed for one reference
    #[error("download failed for '{reference}': {reason}")]
    Materialize { reference: String, reason: String },

    /// Resolver emitted output we could not parse
    #[error("parse error: {0}")]
    Parse(String),

    /// Subprocess could not be spawned or awaited
    #[error("execution error: {0}")]
    Execution(String),

    /// Cooperative stop was honored mid-operation; not a failure
    #[error("cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Whether this error aborts the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ToolNotFound(_) | Self::OutputDir { .. } | Self::AlreadyRunning | Self::EmptyQueue
        )
    }

    pub(crate) fn resolve(reference: &str, reason: impl Into<String>) -> Self {
        Self::Resolve {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn materialize(reference: &str, reason: impl Into<String>) -> Self {
        Self::Materialize {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(DownloadError::ToolNotFound("yt-dlp".into()).is_fatal());
        assert!(DownloadError::EmptyQueue.is_fatal());
        assert!(!DownloadError::resolve("x", "timeout").is_fatal());
        assert!(!DownloadError::Cancelled.is_fatal());
    }
}
