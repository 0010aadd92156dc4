//! Crate-wide error taxonomy.
//!
//! Every fatal pipeline error carries the same structured payload: a
//! message, the component that raised it, and a suggested remediation.
//! Kinds map one-to-one to pipeline stages; all of them terminate the run
//! with a controlled exit code.

use thiserror::Error;

/// Structured, stage-tagged pipeline error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Invalid or missing configuration (config.yaml).
    #[error("[ConfigError] {message} (source={origin}) | action: {suggested_action}")]
    Config {
        message: String,
        origin: String,
        suggested_action: String,
    },

    /// Malformed or inconsistent input data.
    #[error("[DataError] {message} (source={origin}) | action: {suggested_action}")]
    Data {
        message: String,
        origin: String,
        suggested_action: String,
    },

    /// Inconsistent intermediate state while building the model.
    #[error("[ModelError] {message} (source={origin}) | action: {suggested_action}")]
    Model {
        message: String,
        origin: String,
        suggested_action: String,
    },

    /// Solver reported an invalid model, or a post-solve artifact was
    /// requested from a non-feasible run.
    #[error("[SolveError] {message} (source={origin}) | action: {suggested_action}")]
    Solve {
        message: String,
        origin: String,
        suggested_action: String,
    },

    /// Fatally malformed assignment set handed to the validator.
    #[error("[ValidationError] {message} (source={origin}) | action: {suggested_action}")]
    Validation {
        message: String,
        origin: String,
        suggested_action: String,
    },
}

impl SchedulerError {
    pub fn config(message: impl Into<String>, origin: &str, action: &str) -> Self {
        Self::Config {
            message: message.into(),
            origin: origin.to_string(),
            suggested_action: action.to_string(),
        }
    }

    pub fn data(message: impl Into<String>, origin: &str, action: &str) -> Self {
        Self::Data {
            message: message.into(),
            origin: origin.to_string(),
            suggested_action: action.to_string(),
        }
    }

    pub fn model(message: impl Into<String>, origin: &str, action: &str) -> Self {
        Self::Model {
            message: message.into(),
            origin: origin.to_string(),
            suggested_action: action.to_string(),
        }
    }

    pub fn solve(message: impl Into<String>, origin: &str, action: &str) -> Self {
        Self::Solve {
            message: message.into(),
            origin: origin.to_string(),
            suggested_action: action.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>, origin: &str, action: &str) -> Self {
        Self::Validation {
            message: message.into(),
            origin: origin.to_string(),
            suggested_action: action.to_string(),
        }
    }

    /// Short kind tag used in structured log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "ConfigError",
            Self::Data { .. } => "DataError",
            Self::Model { .. } => "ModelError",
            Self::Solve { .. } => "SolveError",
            Self::Validation { .. } => "ValidationError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_origin_and_action() {
        let err = SchedulerError::config("bad key", "config::load", "remove the key");
        let text = err.to_string();
        assert!(text.starts_with("[ConfigError] bad key"));
        assert!(text.contains("source=config::load"));
        assert!(text.contains("action: remove the key"));
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            SchedulerError::data("x", "y", "z").kind(),
            "DataError"
        );
        assert_eq!(
            SchedulerError::validation("x", "y", "z").kind(),
            "ValidationError"
        );
    }
}
