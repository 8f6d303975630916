//! Run orchestration: validate, build, drive, evaluate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::info;

use stampede_core::error::Result;
use stampede_core::metrics::RunMetrics;
use stampede_core::plan::TestPlan;

use crate::client::build_client;
use crate::export::MetricsExporter;
use crate::report::RunReport;
use crate::scheduler::Scheduler;

/// Owns one load test run from plan to report
pub struct Runner {
    plan: Arc<TestPlan>,
    metrics: Arc<RunMetrics>,
    active: Arc<AtomicUsize>,
}

impl Runner {
    /// Validate the plan and prepare shared state. Every configuration
    /// error surfaces here, before any virtual user exists.
    pub fn new(plan: TestPlan) -> Result<Self> {
        plan.validate()?;
        Ok(Self {
            plan: Arc::new(plan),
            metrics: Arc::new(RunMetrics::new()),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Live aggregates, shared with the scheduler and exporter
    pub fn metrics(&self) -> Arc<RunMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Currently running virtual users
    pub fn active_vus(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Execute the plan and return the authoritative report.
    ///
    /// Runtime request failures never abort the run; the only errors this
    /// returns occur during setup (client build, exporter bind).
    pub async fn run(&self) -> Result<RunReport> {
        let thresholds = self.plan.threshold_specs()?;
        let client = build_client(&self.plan.http)?;

        let exporter = match &self.plan.export {
            Some(settings) => {
                let exporter = MetricsExporter::bind(settings)?;
                Some(exporter.spawn(Arc::clone(&self.metrics), Arc::clone(&self.active)))
            }
            None => None,
        };

        info!(
            plan = %self.plan.name,
            target = %self.plan.base_url,
            steps = self.plan.scenario.steps.len(),
            thresholds = thresholds.len(),
            "load test starting"
        );
        self.metrics.mark_started();

        Scheduler::new(
            Arc::clone(&self.plan),
            client,
            Arc::clone(&self.metrics),
            Arc::clone(&self.active),
        )
        .run()
        .await;

        // every VU has drained; the report is built from final aggregates
        let report = RunReport::assemble(&self.plan.name, &self.metrics, &thresholds);

        if let Some(handle) = exporter {
            handle.abort();
        }

        info!(
            plan = %self.plan.name,
            requests = report.summary.total_requests,
            passed = report.passed,
            "load test finished"
        );
        Ok(report)
    }
}
