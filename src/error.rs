//! Error taxonomy for the scene generation core.
//!
//! Every phase and pipeline reports through [`WorkerError`]; the REST layer
//! maps variants onto HTTP status codes and the job worker uses
//! [`WorkerError::is_retryable`] to decide whether another attempt makes sense.

use thiserror::Error;

use crate::model::scenario::SceneKind;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Request shape wrong; surfaced as 400 with a details array.
    #[error("validation failed: {}", details.join("; "))]
    Validation { details: Vec<String> },

    /// Resource missing; 404.
    #[error("{0} not found")]
    NotFound(String),

    /// Operation not permitted in the record's current status; 400.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An AI or media collaborator returned an error or timed out.
    #[error("{service} call failed: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    /// FFmpeg exited non-zero or produced a missing/empty output file.
    #[error("media processing failed: {0}")]
    Media(String),

    /// The LLM response could not be parsed or validated into a scenario.
    #[error("scenario invalid: {0}")]
    ScenarioInvalid(String),

    /// No registered pipeline handles the scene kind.
    #[error("no pipeline registered for scene kind {0}")]
    NoPipeline(SceneKind),

    /// Final composition found zero completed scenes.
    #[error("no completed scenes to compose")]
    NothingToCompose,

    /// Queue backend unreachable; the caller downgrades to inline execution.
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Catch-all; 500 with the message hidden outside development mode.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WorkerError {
    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation {
            details: vec![detail.into()],
        }
    }

    pub fn upstream(service: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Upstream {
            service,
            message: format!("{error:#}"),
        }
    }

    /// ジョブ再試行の対象になるエラーかどうか。
    ///
    /// バリデーション・状態エラーは何度実行しても結果が変わらないため
    /// 再試行しない。上流障害・メディア障害・内部エラーは再試行対象。
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation { .. }
            | Self::NotFound(_)
            | Self::InvalidState(_)
            | Self::ScenarioInvalid(_)
            | Self::NoPipeline(_)
            | Self::NothingToCompose => false,
            Self::Upstream { .. }
            | Self::Media(_)
            | Self::QueueUnavailable(_)
            | Self::Internal(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_not_retryable() {
        assert!(!WorkerError::validation("prompt is required").is_retryable());
        assert!(!WorkerError::ScenarioInvalid("empty timeline".into()).is_retryable());
        assert!(!WorkerError::NothingToCompose.is_retryable());
    }

    #[test]
    fn upstream_and_media_errors_are_retryable() {
        assert!(WorkerError::upstream("llm", "timed out").is_retryable());
        assert!(WorkerError::Media("ffmpeg exited with status 1".into()).is_retryable());
    }

    #[test]
    fn validation_message_joins_details() {
        let error = WorkerError::Validation {
            details: vec!["a".into(), "b".into()],
        };
        assert_eq!(error.to_string(), "validation failed: a; b");
    }
}
