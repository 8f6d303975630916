//! Load scheduler: realizes the plan's concurrency profile over time.
//!
//! Constant mode spawns every VU up front and signals a graceful stop when
//! the duration expires. Ramp mode reconciles the live VU count against
//! `Schedule::target_at` on a fixed tick, spawning when below target and
//! retiring the most recently spawned VUs when above. Retirement is always
//! cooperative: VUs wind down at their next iteration boundary, never
//! mid-request.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::{interval, sleep};
use tracing::{debug, info};

use stampede_core::metrics::RunMetrics;
use stampede_core::plan::TestPlan;
use stampede_core::schedule::Schedule;

use crate::vu::{spawn_vu, VuHandle};

const TICK: Duration = Duration::from_millis(100);

pub(crate) struct Scheduler {
    plan: Arc<TestPlan>,
    client: reqwest::Client,
    metrics: Arc<RunMetrics>,
    active: Arc<AtomicUsize>,
}

impl Scheduler {
    pub fn new(
        plan: Arc<TestPlan>,
        client: reqwest::Client,
        metrics: Arc<RunMetrics>,
        active: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            plan,
            client,
            metrics,
            active,
        }
    }

    /// Drive the schedule to completion. Returns once every VU has wound
    /// down, so the active count is exactly 0 when this resolves.
    pub async fn run(&self) {
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut handles = match &self.plan.schedule {
            Schedule::Constant { vus, duration_secs } => {
                self.run_constant(*vus, *duration_secs, stop_rx).await
            }
            Schedule::Ramp { .. } => self.run_ramp(stop_rx).await,
        };

        // graceful drain: current iterations finish, nothing is cancelled
        let _ = stop_tx.send(true);
        for handle in handles.drain(..) {
            let _ = handle.task.await;
        }
        debug!("all virtual users drained");
    }

    async fn run_constant(
        &self,
        vus: u32,
        duration_secs: u64,
        stop_rx: watch::Receiver<bool>,
    ) -> Vec<VuHandle> {
        info!(vus, duration_secs, "constant load phase started");

        let mut handles = Vec::with_capacity(vus as usize);
        for id in 0..vus {
            handles.push(self.spawn(id, stop_rx.clone()));
        }

        sleep(Duration::from_secs(duration_secs)).await;
        info!("constant load phase complete, draining");
        handles
    }

    async fn run_ramp(&self, stop_rx: watch::Receiver<bool>) -> Vec<VuHandle> {
        let total = self.plan.schedule.total_duration();
        info!(
            max_target = self.plan.schedule.max_target(),
            total_secs = total.as_secs(),
            "ramp load phase started"
        );

        let start = Instant::now();
        let mut handles: Vec<VuHandle> = Vec::new();
        let mut next_id = 0u32;
        let mut tick = interval(TICK);

        while start.elapsed() < total {
            tick.tick().await;
            let desired = self.plan.schedule.target_at(start.elapsed()) as usize;
            self.reconcile(&mut handles, desired, &mut next_id, &stop_rx);
        }

        // a final stage with target 0 must drain to exactly zero before the
        // run can report; keep ticking until the last VU exits
        if self.plan.schedule.target_at(total) == 0 {
            for handle in &handles {
                handle.mark_retired();
            }
            while self.active.load(Ordering::SeqCst) > 0 {
                tick.tick().await;
            }
        }

        info!("ramp load phase complete, draining");
        handles
    }

    /// Adjust the running VU set toward `desired`. Spawn decisions count
    /// every VU still running (including ones winding down) so the live
    /// count can never exceed the stage target; retire decisions count only
    /// committed VUs, newest retired first.
    fn reconcile(
        &self,
        handles: &mut Vec<VuHandle>,
        desired: usize,
        next_id: &mut u32,
        stop_rx: &watch::Receiver<bool>,
    ) {
        handles.retain(|h| !h.task.is_finished());

        let running = handles.len();
        let committed = handles.iter().filter(|h| !h.is_retiring()).count();

        if desired > running {
            for _ in 0..(desired - running) {
                handles.push(self.spawn(*next_id, stop_rx.clone()));
                *next_id += 1;
            }
            debug!(desired, spawned = desired - running, "ramp scaled up");
        } else if desired < committed {
            let mut excess = committed - desired;
            for handle in handles.iter().rev() {
                if excess == 0 {
                    break;
                }
                if !handle.is_retiring() {
                    handle.mark_retired();
                    excess -= 1;
                }
            }
            debug!(desired, retired = committed - desired, "ramp scaled down");
        }
    }

    fn spawn(&self, id: u32, stop_rx: watch::Receiver<bool>) -> VuHandle {
        spawn_vu(
            id,
            Arc::clone(&self.plan),
            self.client.clone(),
            Arc::clone(&self.metrics),
            Arc::clone(&self.active),
            stop_rx,
        )
    }
}
