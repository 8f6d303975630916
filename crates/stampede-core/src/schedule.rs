//! Load schedule: the virtual-user concurrency profile over wall-clock time.
//!
//! Two modes exist. `constant` holds a fixed VU count for a fixed duration.
//! `ramp` walks an ordered list of stages, interpolating linearly from the
//! previous stage's target to each stage's target across its duration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StampedeError};

/// Virtual-user concurrency profile
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Schedule {
    /// Fixed VU count for a fixed duration
    Constant { vus: u32, duration_secs: u64 },

    /// Staged ramp, stages executed strictly in order
    Ramp { stages: Vec<Stage> },
}

/// One segment of a ramp schedule
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Stage {
    /// Stage duration in seconds
    pub duration_secs: u64,

    /// VU count to reach by the end of the stage
    pub target: u32,
}

impl Schedule {
    /// Validate the profile. Fatal before any virtual user starts.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Constant { vus, duration_secs } => {
                if *vus == 0 {
                    return Err(StampedeError::ZeroVus);
                }
                if *duration_secs == 0 {
                    return Err(StampedeError::ZeroDuration {
                        field: "schedule.duration_secs".to_string(),
                    });
                }
            }
            Self::Ramp { stages } => {
                if stages.is_empty() {
                    return Err(StampedeError::EmptyStages);
                }
                for (i, stage) in stages.iter().enumerate() {
                    if stage.duration_secs == 0 {
                        return Err(StampedeError::ZeroDuration {
                            field: format!("schedule.stages[{}].duration_secs", i),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Total wall-clock duration of the profile
    pub fn total_duration(&self) -> Duration {
        match self {
            Self::Constant { duration_secs, .. } => Duration::from_secs(*duration_secs),
            Self::Ramp { stages } => {
                Duration::from_secs(stages.iter().map(|s| s.duration_secs).sum())
            }
        }
    }

    /// Highest VU count the profile ever asks for
    pub fn max_target(&self) -> u32 {
        match self {
            Self::Constant { vus, .. } => *vus,
            Self::Ramp { stages } => stages.iter().map(|s| s.target).max().unwrap_or(0),
        }
    }

    /// Target VU count at `elapsed` since run start.
    ///
    /// Ramp stages interpolate linearly from the previous stage's target
    /// (starting at 0); past the end of the profile the final target holds.
    pub fn target_at(&self, elapsed: Duration) -> u32 {
        match self {
            Self::Constant { vus, duration_secs } => {
                if elapsed < Duration::from_secs(*duration_secs) {
                    *vus
                } else {
                    0
                }
            }
            Self::Ramp { stages } => {
                let mut from = 0u32;
                let mut offset = Duration::ZERO;
                for stage in stages {
                    let span = Duration::from_secs(stage.duration_secs);
                    if elapsed < offset + span {
                        let progress =
                            (elapsed - offset).as_secs_f64() / span.as_secs_f64();
                        let interpolated =
                            from as f64 + (stage.target as f64 - from as f64) * progress;
                        return interpolated.round() as u32;
                    }
                    from = stage.target;
                    offset += span;
                }
                stages.last().map(|s| s.target).unwrap_or(0)
            }
        }
    }
}
