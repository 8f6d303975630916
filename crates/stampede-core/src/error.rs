//! Error types for stampede load test configuration and setup

use thiserror::Error;

/// Result type alias for stampede operations
pub type Result<T> = std::result::Result<T, StampedeError>;

/// Errors that can occur while loading or starting a load test.
///
/// Every variant is fatal before the first virtual user starts. Runtime
/// request failures are never represented here: they are recorded as
/// outcomes and the run continues.
#[derive(Error, Debug)]
pub enum StampedeError {
    // === Plan structure ===
    /// Scenario has no request steps
    #[error("Scenario has no request steps")]
    EmptyScenario,

    /// Step path does not start with '/'
    #[error("Step '{step}' has invalid path '{path}': paths must start with '/'")]
    InvalidStepPath { step: String, path: String },

    /// Base URL is missing a scheme
    #[error("Invalid base URL '{0}': expected http:// or https://")]
    InvalidBaseUrl(String),

    // === Schedule ===
    /// Constant schedule with zero virtual users
    #[error("Constant schedule requires at least one virtual user")]
    ZeroVus,

    /// Ramp schedule with no stages
    #[error("Ramp schedule has no stages")]
    EmptyStages,

    /// A duration field is zero
    #[error("Duration must be positive: {field}")]
    ZeroDuration { field: String },

    // === Thresholds ===
    /// Unknown metric name in the thresholds table
    #[error("Unknown threshold metric: '{0}'")]
    UnknownMetric(String),

    /// Threshold expression could not be parsed
    #[error("Invalid threshold for '{metric}': '{expr}' ({reason})")]
    InvalidThreshold {
        metric: String,
        expr: String,
        reason: String,
    },

    // === Plan loading ===
    /// Plan file could not be read
    #[error("Failed to read plan file: {0}")]
    Io(#[from] std::io::Error),

    /// Plan file is not valid TOML
    #[error("Failed to parse plan file: {0}")]
    Parse(#[from] toml::de::Error),

    // === Engine setup ===
    /// HTTP client construction failed
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// Metrics exporter could not bind its listen address
    #[error("Failed to start metrics exporter: {0}")]
    ExporterBind(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StampedeError::InvalidThreshold {
            metric: "http_req_failed".to_string(),
            expr: "rate!0.01".to_string(),
            reason: "missing comparison operator".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("http_req_failed"));
        assert!(msg.contains("rate!0.01"));

        let err = StampedeError::ZeroDuration {
            field: "schedule.stages[2].duration_secs".to_string(),
        };
        assert!(format!("{}", err).contains("stages[2]"));
    }
}
