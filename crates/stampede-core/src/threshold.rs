//! Threshold expressions: declarative pass/fail predicates over run metrics.
//!
//! A plan attaches expression strings like `rate<0.01` or `p(95)<2000` to a
//! metric name. Expressions are parsed once at plan load (malformed ones are
//! fatal) and evaluated once against the final aggregates. All comparisons
//! are exact: `rate<0.01` fails at an observed rate of exactly 0.01.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StampedeError};
use crate::metrics::RunMetrics;

/// Metrics a threshold may target
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    /// Failure rate: transport errors plus non-2xx/3xx statuses
    HttpReqFailed,
    /// Request latency, milliseconds
    HttpReqDuration,
    /// Pass rate across all check evaluations
    Checks,
    /// Total request count
    HttpReqs,
}

impl Metric {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "http_req_failed" => Ok(Self::HttpReqFailed),
            "http_req_duration" => Ok(Self::HttpReqDuration),
            "checks" => Ok(Self::Checks),
            "http_reqs" => Ok(Self::HttpReqs),
            other => Err(StampedeError::UnknownMetric(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpReqFailed => "http_req_failed",
            Self::HttpReqDuration => "http_req_duration",
            Self::Checks => "checks",
            Self::HttpReqs => "http_reqs",
        }
    }
}

/// How the metric stream is reduced to the scalar being compared
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Aggregation {
    Rate,
    Count,
    Avg,
    Min,
    Max,
    Med,
    /// Percentile, 0 < p < 100
    Percentile(f64),
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rate => write!(f, "rate"),
            Self::Count => write!(f, "count"),
            Self::Avg => write!(f, "avg"),
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
            Self::Med => write!(f, "med"),
            Self::Percentile(p) => write!(f, "p({})", p),
        }
    }
}

/// Comparison operator against the bound
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn compare(&self, observed: f64, bound: f64) -> bool {
        match self {
            Self::Lt => observed < bound,
            Self::Le => observed <= bound,
            Self::Gt => observed > bound,
            Self::Ge => observed >= bound,
        }
    }
}

/// One parsed threshold predicate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThresholdSpec {
    pub metric: Metric,
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub bound: f64,
    /// Original expression text, kept for reporting
    pub expression: String,
}

/// Verdict for one threshold after evaluation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub observed: f64,
    pub passed: bool,
}

impl ThresholdSpec {
    /// Parse one expression for the given metric. Fatal on malformed input.
    pub fn parse(metric_name: &str, expression: &str) -> Result<Self> {
        let metric = Metric::parse(metric_name)?;
        let expr = expression.trim();

        let invalid = |reason: &str| StampedeError::InvalidThreshold {
            metric: metric_name.to_string(),
            expr: expression.to_string(),
            reason: reason.to_string(),
        };

        // longest operators first so "<=" is not read as "<"
        let (op_at, op_len, comparison) = ["<=", ">=", "<", ">"]
            .iter()
            .find_map(|op| expr.find(op).map(|at| (at, op.len(), *op)))
            .map(|(at, len, op)| {
                let cmp = match op {
                    "<=" => Comparison::Le,
                    ">=" => Comparison::Ge,
                    "<" => Comparison::Lt,
                    _ => Comparison::Gt,
                };
                (at, len, cmp)
            })
            .ok_or_else(|| invalid("missing comparison operator"))?;

        let aggregation = Self::parse_aggregation(expr[..op_at].trim(), &invalid)?;
        let bound: f64 = expr[op_at + op_len..]
            .trim()
            .parse()
            .map_err(|_| invalid("bound is not a number"))?;

        let allowed = match metric {
            Metric::HttpReqFailed | Metric::Checks => matches!(aggregation, Aggregation::Rate),
            Metric::HttpReqs => matches!(aggregation, Aggregation::Count),
            Metric::HttpReqDuration => !matches!(
                aggregation,
                Aggregation::Rate | Aggregation::Count
            ),
        };
        if !allowed {
            return Err(invalid(&format!(
                "aggregation '{}' is not valid for this metric",
                aggregation
            )));
        }

        Ok(Self {
            metric,
            aggregation,
            comparison,
            bound,
            expression: expr.to_string(),
        })
    }

    fn parse_aggregation(
        token: &str,
        invalid: &impl Fn(&str) -> StampedeError,
    ) -> Result<Aggregation> {
        match token {
            "rate" => Ok(Aggregation::Rate),
            "count" => Ok(Aggregation::Count),
            "avg" => Ok(Aggregation::Avg),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "med" => Ok(Aggregation::Med),
            _ => {
                let inner = token
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| invalid("unknown aggregation"))?;
                let percentile: f64 = inner
                    .trim()
                    .parse()
                    .map_err(|_| invalid("percentile is not a number"))?;
                if !(0.0..100.0).contains(&percentile) || percentile == 0.0 {
                    return Err(invalid("percentile must be between 0 and 100 exclusive"));
                }
                Ok(Aggregation::Percentile(percentile))
            }
        }
    }

    /// Parse the whole thresholds table of a plan
    pub fn parse_all(table: &BTreeMap<String, Vec<String>>) -> Result<Vec<Self>> {
        let mut specs = Vec::new();
        for (metric_name, expressions) in table {
            for expression in expressions {
                specs.push(Self::parse(metric_name, expression)?);
            }
        }
        Ok(specs)
    }

    /// Extract the observed scalar and compare it against the bound
    pub fn evaluate(&self, metrics: &RunMetrics) -> ThresholdResult {
        let observed = match (self.metric, self.aggregation) {
            (Metric::HttpReqFailed, _) => metrics.failure_rate(),
            (Metric::Checks, _) => metrics.check_pass_rate(),
            (Metric::HttpReqs, _) => metrics.total() as f64,
            (Metric::HttpReqDuration, Aggregation::Avg) => metrics.latency_mean_ms(),
            (Metric::HttpReqDuration, Aggregation::Min) => metrics.latency_min_ms(),
            (Metric::HttpReqDuration, Aggregation::Max) => metrics.latency_max_ms(),
            (Metric::HttpReqDuration, Aggregation::Med) => metrics.latency_quantile_ms(0.50),
            (Metric::HttpReqDuration, Aggregation::Percentile(p)) => {
                metrics.latency_quantile_ms(p / 100.0)
            }
            // unreachable after parse-time validation, but harmless
            (Metric::HttpReqDuration, _) => metrics.latency_mean_ms(),
        };

        ThresholdResult {
            metric: self.metric.as_str().to_string(),
            expression: self.expression.clone(),
            observed,
            passed: self.comparison.compare(observed, self.bound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RequestOutcome;
    use std::time::Duration;

    fn metrics_with_failures(total: u64, failed: u64) -> RunMetrics {
        let metrics = RunMetrics::new();
        for i in 0..total {
            let status = if i < failed { Some(500) } else { Some(200) };
            metrics.record(&RequestOutcome {
                step: "step".to_string(),
                status,
                latency: Duration::from_millis(10),
                error: None,
                checks: Vec::new(),
            });
        }
        metrics
    }

    #[test]
    fn test_parse_shipped_expressions() {
        let spec = ThresholdSpec::parse("http_req_failed", "rate<0.01").unwrap();
        assert_eq!(spec.metric, Metric::HttpReqFailed);
        assert_eq!(spec.aggregation, Aggregation::Rate);
        assert_eq!(spec.comparison, Comparison::Lt);
        assert!((spec.bound - 0.01).abs() < 1e-12);

        let spec = ThresholdSpec::parse("http_req_duration", "p(95)<2000").unwrap();
        assert_eq!(spec.aggregation, Aggregation::Percentile(95.0));

        let spec = ThresholdSpec::parse("http_req_duration", " avg <= 150.5 ").unwrap();
        assert_eq!(spec.comparison, Comparison::Le);

        let spec = ThresholdSpec::parse("http_reqs", "count>100").unwrap();
        assert_eq!(spec.aggregation, Aggregation::Count);

        let spec = ThresholdSpec::parse("checks", "rate>=0.99").unwrap();
        assert_eq!(spec.comparison, Comparison::Ge);
    }

    #[test]
    fn test_parse_rejects_malformed_expressions() {
        assert!(matches!(
            ThresholdSpec::parse("http_req_bogus", "rate<0.01"),
            Err(StampedeError::UnknownMetric(_))
        ));
        assert!(ThresholdSpec::parse("http_req_failed", "rate=0.01").is_err());
        assert!(ThresholdSpec::parse("http_req_failed", "rate<abc").is_err());
        assert!(ThresholdSpec::parse("http_req_duration", "p(0)<2000").is_err());
        assert!(ThresholdSpec::parse("http_req_duration", "p(100)<2000").is_err());
        assert!(ThresholdSpec::parse("http_req_duration", "p(x)<2000").is_err());
        assert!(ThresholdSpec::parse("http_req_duration", "quantile(95)<2000").is_err());

        // aggregation/metric mismatches
        assert!(ThresholdSpec::parse("http_req_failed", "p(95)<2000").is_err());
        assert!(ThresholdSpec::parse("http_req_duration", "rate<0.01").is_err());
        assert!(ThresholdSpec::parse("http_reqs", "rate<0.01").is_err());
    }

    // Strict inequality at the boundary: exactly 1% observed must fail.
    #[test]
    fn test_rate_boundary_is_strict() {
        let spec = ThresholdSpec::parse("http_req_failed", "rate<0.01").unwrap();

        let at_bound = metrics_with_failures(10_000, 100);
        assert!(!spec.evaluate(&at_bound).passed);

        let under_bound = metrics_with_failures(10_000, 99);
        let result = spec.evaluate(&under_bound);
        assert!(result.passed);
        assert!((result.observed - 0.0099).abs() < 1e-9);
    }

    #[test]
    fn test_duration_percentile_evaluation() {
        let metrics = RunMetrics::new();
        for ms in [10u64, 20, 30, 40, 5000] {
            metrics.record(&RequestOutcome {
                step: "step".to_string(),
                status: Some(200),
                latency: Duration::from_millis(ms),
                error: None,
                checks: Vec::new(),
            });
        }

        let strict = ThresholdSpec::parse("http_req_duration", "p(95)<2000").unwrap();
        assert!(!strict.evaluate(&metrics).passed);

        let loose = ThresholdSpec::parse("http_req_duration", "p(50)<2000").unwrap();
        assert!(loose.evaluate(&metrics).passed);
    }

    #[test]
    fn test_parse_all_preserves_every_expression() {
        let mut table = BTreeMap::new();
        table.insert(
            "http_req_duration".to_string(),
            vec!["p(95)<2000".to_string(), "max<10000".to_string()],
        );
        table.insert("http_req_failed".to_string(), vec!["rate<0.01".to_string()]);

        let specs = ThresholdSpec::parse_all(&table).unwrap();
        assert_eq!(specs.len(), 3);
    }
}
