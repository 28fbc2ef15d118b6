//! Pipeline status attached to evaluated data.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a [`PipelineStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusType {
    /// Evaluation succeeded.
    Ok,
    /// Evaluation succeeded with a caveat.
    Warning,
    /// Evaluation failed.
    Error,
}

/// Terminal result classification of one evaluation request.
///
/// Every blocking wait inspects this value; it is never dropped silently.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "message", rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Evaluation succeeded.
    #[default]
    Ok,
    /// Evaluation succeeded; the message describes a caveat.
    Warning(String),
    /// Evaluation failed; the message is the plugin-supplied reason.
    Error(String),
}

impl PipelineStatus {
    /// Creates a warning status.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning(message.into())
    }

    /// Creates an error status.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Returns the status classification.
    #[must_use]
    pub const fn status_type(&self) -> StatusType {
        match self {
            Self::Ok => StatusType::Ok,
            Self::Warning(_) => StatusType::Warning,
            Self::Error(_) => StatusType::Error,
        }
    }

    /// Returns the attached message (empty for `Ok`).
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Ok => "",
            Self::Warning(message) | Self::Error(message) => message,
        }
    }

    /// Returns true for `Error`.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Warning(message) => write!(f, "warning: {message}"),
            Self::Error(message) => write!(f, "error: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_type() {
        assert_eq!(PipelineStatus::Ok.status_type(), StatusType::Ok);
        assert_eq!(
            PipelineStatus::warning("cell guessed").status_type(),
            StatusType::Warning
        );
        assert!(PipelineStatus::error("bad line").is_error());
        assert_eq!(PipelineStatus::error("bad line").text(), "bad line");
    }

    #[test]
    fn test_status_serializes_tagged() {
        let json = serde_json::to_value(PipelineStatus::error("boom")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "error", "message": "boom"}));
    }
}
