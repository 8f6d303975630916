//! Scenario model: the ordered request sequence one virtual user repeats.
//!
//! A scenario is defined once at plan load time and is immutable for the
//! whole run. Each step issues a single GET request; its checks are named
//! predicates over the response, recorded per name but never altering
//! control flow.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StampedeError};

/// One iteration's worth of requests for a single virtual user
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name, used in logs and the final report
    #[serde(default = "default_scenario_name")]
    pub name: String,

    /// Request steps, executed strictly in declared order
    pub steps: Vec<RequestStep>,
}

fn default_scenario_name() -> String {
    "default".to_string()
}

impl Scenario {
    /// Validate scenario structure. Fatal before any virtual user starts.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(StampedeError::EmptyScenario);
        }
        for step in &self.steps {
            if !step.path.starts_with('/') {
                return Err(StampedeError::InvalidStepPath {
                    step: step.name.clone(),
                    path: step.path.clone(),
                });
            }
        }
        Ok(())
    }
}

/// A single GET request within a scenario
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestStep {
    /// Step name, used to label outcomes
    pub name: String,

    /// Path relative to the plan's base URL, starting with '/'
    pub path: String,

    /// Optional query string, appended as '?{query}'
    #[serde(default)]
    pub query: Option<String>,

    /// Checks evaluated against the response
    #[serde(default)]
    pub checks: Vec<Check>,
}

impl RequestStep {
    /// Full request URL for this step
    pub fn url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match &self.query {
            Some(query) => format!("{}{}?{}", base, self.path, query),
            None => format!("{}{}", base, self.path),
        }
    }
}

/// A named pass/fail predicate over one response
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Check {
    /// Check name, used as the aggregation key in the report
    pub name: String,

    /// The predicate itself
    #[serde(flatten)]
    pub condition: CheckCondition,
}

/// Supported check predicates
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCondition {
    /// Response status equals the given code
    StatusIs(u16),

    /// Response status is one of the given codes
    StatusIn(Vec<u16>),

    /// Request completed within the given number of milliseconds
    MaxDurationMs(u64),
}

impl CheckCondition {
    /// Evaluate the predicate. A transport error (`status == None`) fails
    /// every condition.
    pub fn evaluate(&self, status: Option<u16>, latency_ms: u64) -> bool {
        match self {
            Self::StatusIs(code) => status == Some(*code),
            Self::StatusIn(codes) => status.is_some_and(|s| codes.contains(&s)),
            Self::MaxDurationMs(limit) => status.is_some() && latency_ms <= *limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(path: &str) -> RequestStep {
        RequestStep {
            name: "step".to_string(),
            path: path.to_string(),
            query: None,
            checks: Vec::new(),
        }
    }

    #[test]
    fn test_url_assembly() {
        let mut s = step("/ots/");
        assert_eq!(s.url("http://127.0.0.1:8000"), "http://127.0.0.1:8000/ots/");

        // trailing slash on the base does not double up
        assert_eq!(s.url("http://127.0.0.1:8000/"), "http://127.0.0.1:8000/ots/");

        s.query = Some("rango=ult7".to_string());
        assert_eq!(
            s.url("http://127.0.0.1:8000"),
            "http://127.0.0.1:8000/ots/?rango=ult7"
        );
    }

    #[test]
    fn test_status_checks() {
        let redirect_ok = CheckCondition::StatusIn(vec![200, 302]);
        assert!(redirect_ok.evaluate(Some(200), 5));
        assert!(redirect_ok.evaluate(Some(302), 5));
        assert!(!redirect_ok.evaluate(Some(404), 5));
        assert!(!redirect_ok.evaluate(None, 5));

        let exact = CheckCondition::StatusIs(200);
        assert!(exact.evaluate(Some(200), 5));
        assert!(!exact.evaluate(Some(302), 5));
    }

    #[test]
    fn test_duration_check_fails_on_transport_error() {
        let fast = CheckCondition::MaxDurationMs(1000);
        assert!(fast.evaluate(Some(200), 999));
        assert!(fast.evaluate(Some(200), 1000));
        assert!(!fast.evaluate(Some(200), 1001));
        assert!(!fast.evaluate(None, 0));
    }

    #[test]
    fn test_validate_rejects_empty_and_bad_paths() {
        let empty = Scenario {
            name: "empty".to_string(),
            steps: Vec::new(),
        };
        assert!(matches!(
            empty.validate(),
            Err(StampedeError::EmptyScenario)
        ));

        let bad = Scenario {
            name: "bad".to_string(),
            steps: vec![step("ots/")],
        };
        assert!(matches!(
            bad.validate(),
            Err(StampedeError::InvalidStepPath { .. })
        ));
    }

    #[test]
    fn test_check_toml_roundtrip() {
        let toml = r#"
name = "ots responde 200/302"
status_in = [200, 302]
"#;
        let check: Check = toml::from_str(toml).unwrap();
        assert_eq!(check.name, "ots responde 200/302");
        assert!(check.condition.evaluate(Some(302), 0));
    }
}
