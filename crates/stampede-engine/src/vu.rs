//! Virtual user: one tokio task repeating the scenario until retired.
//!
//! A VU is strictly serial: step k+1 never starts before step k's response
//! (or error) is observed. The retire and stop signals are only acted on at
//! the iteration boundary, so an in-flight request is never cancelled. A
//! stop signal may shorten the inter-iteration sleep.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace};

use stampede_core::metrics::{RequestOutcome, RunMetrics};
use stampede_core::plan::TestPlan;
use stampede_core::scenario::RequestStep;

/// Handle to a spawned virtual user
pub(crate) struct VuHandle {
    pub id: u32,
    /// Set to retire the VU at its next iteration boundary
    pub retire: Arc<AtomicBool>,
    pub task: JoinHandle<()>,
}

impl VuHandle {
    pub fn is_retiring(&self) -> bool {
        self.retire.load(Ordering::Relaxed)
    }

    pub fn mark_retired(&self) {
        self.retire.store(true, Ordering::Relaxed);
    }
}

/// Spawn one virtual user. `active` tracks the live VU count for the
/// scheduler and the exporter gauge.
pub(crate) fn spawn_vu(
    id: u32,
    plan: Arc<TestPlan>,
    client: reqwest::Client,
    metrics: Arc<RunMetrics>,
    active: Arc<AtomicUsize>,
    stop: watch::Receiver<bool>,
) -> VuHandle {
    let retire = Arc::new(AtomicBool::new(false));
    let retire_flag = Arc::clone(&retire);

    let task = tokio::spawn(async move {
        active.fetch_add(1, Ordering::SeqCst);
        trace!(vu = id, "virtual user started");

        let mut stop = stop;
        loop {
            if *stop.borrow() || retire_flag.load(Ordering::Relaxed) {
                break;
            }

            for step in &plan.scenario.steps {
                let outcome = execute_step(&client, &plan.base_url, step).await;
                metrics.record(&outcome);
            }

            // inter-iteration pause; a stop signal cuts the sleep short and
            // the loop head decides whether this VU winds down
            tokio::select! {
                _ = sleep(Duration::from_millis(plan.sleep_ms)) => {}
                _ = stop.changed() => {}
            }
        }

        active.fetch_sub(1, Ordering::SeqCst);
        trace!(vu = id, "virtual user stopped");
    });

    VuHandle { id, retire, task }
}

/// Issue one GET and evaluate the step's checks. Transport errors are data,
/// not errors: they yield an outcome with `status: None` and every check
/// failed.
async fn execute_step(
    client: &reqwest::Client,
    base_url: &str,
    step: &RequestStep,
) -> RequestOutcome {
    let url = step.url(base_url);
    let start = Instant::now();

    let (status, error) = match client.get(&url).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            // drain the body so the pooled connection can be reused
            let _ = response.bytes().await;
            (Some(status), None)
        }
        Err(e) => (None, Some(e.to_string())),
    };

    let latency = start.elapsed();
    let latency_ms = latency.as_millis().min(u64::MAX as u128) as u64;

    if status.is_none() {
        debug!(step = %step.name, url = %url, "request failed in transport");
    }

    let checks = step
        .checks
        .iter()
        .map(|check| {
            (
                check.name.clone(),
                check.condition.evaluate(status, latency_ms),
            )
        })
        .collect();

    RequestOutcome {
        step: step.name.clone(),
        status,
        latency,
        error,
        checks,
    }
}
