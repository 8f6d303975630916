//! Final run report: aggregates, check stats, threshold verdicts.

use serde::{Deserialize, Serialize};

use stampede_core::metrics::{CheckStat, MetricsSummary, RunMetrics};
use stampede_core::threshold::{ThresholdResult, ThresholdSpec};

/// Everything an invoking CLI or CI pipeline needs from a finished run.
/// `passed` is true iff every declared threshold passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub plan: String,
    pub summary: MetricsSummary,
    pub checks: Vec<CheckStat>,
    pub thresholds: Vec<ThresholdResult>,
    pub passed: bool,
}

impl RunReport {
    /// Evaluate the thresholds against the final aggregates and assemble
    /// the report. This is the authoritative verdict.
    pub fn assemble(plan: &str, metrics: &RunMetrics, thresholds: &[ThresholdSpec]) -> Self {
        let results: Vec<ThresholdResult> =
            thresholds.iter().map(|spec| spec.evaluate(metrics)).collect();
        let passed = results.iter().all(|r| r.passed);

        Self {
            plan: plan.to_string(),
            summary: metrics.summary(),
            checks: metrics.check_stats(),
            thresholds: results,
            passed,
        }
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        let s = &self.summary;

        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║ STAMPEDE RUN: {:<46} ║", truncate(&self.plan, 46));
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ Duration:          {:>12.2} s                              ║", s.duration_secs);
        println!("║ Total Requests:    {:>12}                                ║", s.total_requests);
        println!("║ Failed:            {:>12}                                ║", s.failed_requests);
        println!("║ Failure Rate:      {:>12.4}                                ║", s.failure_rate);
        println!("║ Avg RPS:           {:>12.2}                                ║", s.avg_rps);
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ LATENCY (ms)                                                 ║");
        println!("║   min:             {:>12.2}                                ║", s.latency_min_ms);
        println!("║   avg:             {:>12.2}                                ║", s.latency_mean_ms);
        println!("║   med:             {:>12.2}                                ║", s.latency_med_ms);
        println!("║   p90:             {:>12.2}                                ║", s.latency_p90_ms);
        println!("║   p95:             {:>12.2}                                ║", s.latency_p95_ms);
        println!("║   p99:             {:>12.2}                                ║", s.latency_p99_ms);
        println!("║   max:             {:>12.2}                                ║", s.latency_max_ms);

        if !s.error_counts.is_empty() {
            println!("╠══════════════════════════════════════════════════════════════╣");
            println!("║ TRANSPORT ERRORS                                             ║");
            for (kind, count) in &s.error_counts {
                println!("║   {:<40} {:>10}       ║", truncate(kind, 40), count);
            }
        }
        println!("╚══════════════════════════════════════════════════════════════╝");

        if !self.checks.is_empty() {
            println!("\nCHECKS");
            for check in &self.checks {
                let total = check.passes + check.fails;
                println!(
                    "  {} {:<45} {:>6}/{:<6} ({:.2}%)",
                    if check.fails == 0 { "✅" } else { "❌" },
                    truncate(&check.name, 45),
                    check.passes,
                    total,
                    check.pass_rate() * 100.0
                );
            }
        }

        println!("\nTHRESHOLDS");
        for result in &self.thresholds {
            println!(
                "  {} {}: '{}'  observed {:.4}",
                if result.passed { "✅ PASS" } else { "❌ FAIL" },
                result.metric,
                result.expression,
                result.observed
            );
        }

        println!(
            "\nOVERALL: {}\n",
            if self.passed {
                "✅ ALL THRESHOLDS PASS"
            } else {
                "❌ SOME THRESHOLDS FAILED"
            }
        );
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::metrics::RequestOutcome;
    use std::time::Duration;

    fn metrics_all_ok(n: u64) -> RunMetrics {
        let metrics = RunMetrics::new();
        metrics.mark_started();
        for _ in 0..n {
            metrics.record(&RequestOutcome {
                step: "home".to_string(),
                status: Some(200),
                latency: Duration::from_millis(12),
                error: None,
                checks: vec![("home responde 200/302".to_string(), true)],
            });
        }
        metrics
    }

    #[test]
    fn test_assemble_overall_verdict() {
        let metrics = metrics_all_ok(50);
        let specs = vec![
            ThresholdSpec::parse("http_req_failed", "rate<0.01").unwrap(),
            ThresholdSpec::parse("http_req_duration", "p(95)<2000").unwrap(),
        ];

        let report = RunReport::assemble("demo", &metrics, &specs);
        assert!(report.passed);
        assert_eq!(report.thresholds.len(), 2);
        assert!(report.thresholds.iter().all(|t| t.passed));
        assert_eq!(report.checks.len(), 1);
    }

    #[test]
    fn test_one_failing_threshold_fails_the_run() {
        let metrics = metrics_all_ok(50);
        let specs = vec![
            ThresholdSpec::parse("http_req_failed", "rate<0.01").unwrap(),
            // impossible bound so this one fails
            ThresholdSpec::parse("http_req_duration", "max<0.001").unwrap(),
        ];

        let report = RunReport::assemble("demo", &metrics, &specs);
        assert!(!report.passed);
        assert!(report.thresholds[0].passed);
        assert!(!report.thresholds[1].passed);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let metrics = metrics_all_ok(3);
        let report = RunReport::assemble("demo", &metrics, &[]);
        let json = serde_json::to_string_pretty(&report).unwrap();
        assert!(json.contains("\"plan\": \"demo\""));
        assert!(json.contains("\"passed\": true"));
    }
}
