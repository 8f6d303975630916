//! Test plan: the full declarative configuration of one load test run.
//!
//! Plans are TOML files. Loading and validation happen before any virtual
//! user starts; a malformed plan terminates the process with an error
//! naming the offending field.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StampedeError};
use crate::scenario::Scenario;
use crate::schedule::Schedule;
use crate::threshold::ThresholdSpec;

/// Complete load test configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestPlan {
    /// Plan name, used in logs and the final report
    #[serde(default = "default_plan_name")]
    pub name: String,

    /// Target base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Pause between scenario iterations, per virtual user
    #[serde(default = "default_sleep_ms")]
    pub sleep_ms: u64,

    /// The request sequence every virtual user repeats
    pub scenario: Scenario,

    /// Concurrency profile over time
    pub schedule: Schedule,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpSettings,

    /// Metric name -> threshold expressions
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,

    /// Optional Prometheus snapshot exporter
    #[serde(default)]
    pub export: Option<ExportSettings>,
}

fn default_plan_name() -> String {
    "loadtest".to_string()
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_sleep_ms() -> u64 {
    1000
}

/// HTTP client settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Connection pool size per host
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    /// User-Agent header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_pool_max_idle_per_host() -> usize {
    100
}

fn default_user_agent() -> String {
    concat!("stampede/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            user_agent: default_user_agent(),
        }
    }
}

/// Prometheus exporter settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Listen address for the /metrics endpoint
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

fn default_metrics_address() -> String {
    "127.0.0.1:9615".to_string()
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            address: default_metrics_address(),
        }
    }
}

impl TestPlan {
    /// Parse a plan from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let plan: Self = toml::from_str(text)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Load a plan file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Validate every field that could abort a run. This is the single
    /// fatal gate: after it passes, nothing at runtime terminates the test.
    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(StampedeError::InvalidBaseUrl(self.base_url.clone()));
        }
        self.scenario.validate()?;
        self.schedule.validate()?;
        ThresholdSpec::parse_all(&self.thresholds)?;
        Ok(())
    }

    /// Parsed threshold specs, in deterministic (metric name) order
    pub fn threshold_specs(&self) -> Result<Vec<ThresholdSpec>> {
        ThresholdSpec::parse_all(&self.thresholds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Schedule;
    use std::io::Write;

    const MINIMAL: &str = r#"
name = "minimal"

[scenario]
[[scenario.steps]]
name = "home"
path = "/"

[schedule]
mode = "constant"
vus = 1
duration_secs = 1
"#;

    #[test]
    fn test_minimal_plan_defaults() {
        let plan = TestPlan::from_toml_str(MINIMAL).unwrap();
        assert_eq!(plan.base_url, "http://127.0.0.1:8000");
        assert_eq!(plan.sleep_ms, 1000);
        assert_eq!(plan.http.request_timeout_secs, 30);
        assert!(plan.thresholds.is_empty());
        assert!(plan.export.is_none());
    }

    #[test]
    fn test_invalid_plans_name_the_field() {
        let bad_url = MINIMAL.replace("name = \"minimal\"", "base_url = \"ftp://x\"");
        match TestPlan::from_toml_str(&bad_url) {
            Err(StampedeError::InvalidBaseUrl(url)) => assert_eq!(url, "ftp://x"),
            other => panic!("expected InvalidBaseUrl, got {:?}", other),
        }

        let bad_threshold = format!(
            "{}\n[thresholds]\nhttp_req_failed = [\"rate!0.01\"]\n",
            MINIMAL
        );
        assert!(matches!(
            TestPlan::from_toml_str(&bad_threshold),
            Err(StampedeError::InvalidThreshold { .. })
        ));

        let zero_stage = r#"
[scenario]
[[scenario.steps]]
name = "home"
path = "/"

[schedule]
mode = "ramp"
[[schedule.stages]]
duration_secs = 0
target = 10
"#;
        match TestPlan::from_toml_str(zero_stage) {
            Err(StampedeError::ZeroDuration { field }) => {
                assert_eq!(field, "schedule.stages[0].duration_secs")
            }
            other => panic!("expected ZeroDuration, got {:?}", other),
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let plan = TestPlan::load(file.path()).unwrap();
        assert_eq!(plan.name, "minimal");

        assert!(matches!(
            TestPlan::load("/nonexistent/plan.toml"),
            Err(StampedeError::Io(_))
        ));
    }

    #[test]
    fn test_shipped_plans_validate() {
        let texts = [
            include_str!("../../../plans/perf_basico.toml"),
            include_str!("../../../plans/perf_reportes.toml"),
            include_str!("../../../plans/stress_ots.toml"),
            include_str!("../../../plans/stress_reportes.toml"),
        ];
        for text in texts {
            let plan = TestPlan::from_toml_str(text).unwrap();
            assert!(!plan.thresholds.is_empty());
        }
    }

    #[test]
    fn test_shipped_stress_profile_shape() {
        let plan =
            TestPlan::from_toml_str(include_str!("../../../plans/stress_ots.toml")).unwrap();
        assert_eq!(plan.schedule.max_target(), 80);
        match &plan.schedule {
            Schedule::Ramp { stages } => {
                assert_eq!(stages.len(), 6);
                assert_eq!(stages.last().unwrap().target, 0);
            }
            _ => panic!("stress plan should ramp"),
        }
    }
}
