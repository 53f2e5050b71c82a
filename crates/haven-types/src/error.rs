//! Error types for the haven orchestrator.
//!
//! [`HavenError`] is the top-level error type. Most variants are recovered
//! locally (handler failures are retried, target failures fall back to the
//! next target); only [`HavenError::Exhausted`] and [`HavenError::Internal`]
//! are expected to surface at the orchestration boundary, where they are
//! converted into a response envelope rather than returned to the caller.

use thiserror::Error;

/// Boxed error used by handler callbacks and other dynamic boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for haven.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HavenError {
    // ── Recoverable ──────────────────────────────────────────────────

    /// A publish call carried a malformed topic or payload.
    #[error("validation failed: {reason}")]
    Validation {
        /// What is wrong with the input.
        reason: String,
    },

    /// A subscribed handler failed after exhausting its retry policy.
    #[error("handler '{handler}' failed after {attempts} attempt(s): {source}")]
    HandlerFailed {
        /// Handler name.
        handler: String,
        /// How many attempts were made.
        attempts: u32,
        /// The final error.
        #[source]
        source: BoxError,
    },

    /// An operation exceeded its deadline.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Human-readable name of the operation that timed out.
        operation: String,
    },

    /// The safety gate rejected the content.
    #[error("safety rejection: {reason}")]
    SafetyRejection {
        /// Violations that caused the rejection.
        reason: String,
    },

    /// A processing target failed to produce a response.
    #[error("target '{target}' failed: {message}")]
    TargetInvocation {
        /// Target identifier.
        target: String,
        /// Failure description.
        message: String,
    },

    // ── Terminal ─────────────────────────────────────────────────────

    /// The primary target and every declared fallback failed.
    #[error("all targets exhausted: {}", attempts.join("; "))]
    Exhausted {
        /// One `"target: error"` line per failed attempt.
        attempts: Vec<String>,
    },

    /// An unexpected failure (including a caught panic).
    #[error("internal error: {0}")]
    Internal(String),

    /// The component has been shut down and no longer accepts work.
    #[error("{component} is shut down")]
    ShutDown {
        /// Which component rejected the call.
        component: String,
    },

    /// Configuration is malformed or semantically invalid.
    #[error("invalid config: {reason}")]
    ConfigInvalid {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HavenError {
    /// Shorthand for a [`HavenError::Validation`].
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`HavenError::ConfigInvalid`].
    pub fn config(reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            reason: reason.into(),
        }
    }
}

/// A convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, HavenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display() {
        let err = HavenError::validation("topic must not be empty");
        assert_eq!(err.to_string(), "validation failed: topic must not be empty");
    }

    #[test]
    fn handler_failed_preserves_source() {
        let source: BoxError = "connection reset".into();
        let err = HavenError::HandlerFailed {
            handler: "audit-log".into(),
            attempts: 3,
            source,
        };
        let text = err.to_string();
        assert!(text.contains("audit-log"));
        assert!(text.contains("3 attempt(s)"));
        assert!(text.contains("connection reset"));
    }

    #[test]
    fn exhausted_joins_attempts() {
        let err = HavenError::Exhausted {
            attempts: vec!["a: timeout".into(), "b: 503".into()],
        };
        assert_eq!(err.to_string(), "all targets exhausted: a: timeout; b: 503");
    }

    #[test]
    fn from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{{bad}}").unwrap_err();
        let err: HavenError = json_err.into();
        assert!(matches!(err, HavenError::Json(_)));
    }

    #[test]
    fn shut_down_names_component() {
        let err = HavenError::ShutDown {
            component: "event dispatcher".into(),
        };
        assert_eq!(err.to_string(), "event dispatcher is shut down");
    }
}
