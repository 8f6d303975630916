//! # Stampede Core
//!
//! Data model and aggregation for the stampede virtual-user load generator.
//!
//! This crate provides the declarative building blocks a run is made of:
//! - `TestPlan` - one TOML file describing a complete load test
//! - `Scenario` - the ordered GET sequence a virtual user repeats
//! - `Schedule` - the concurrency profile (constant or staged ramp)
//! - `ThresholdSpec` - pass/fail predicates over the final aggregates
//! - `RunMetrics` - the streaming outcome aggregator shared by all VUs
//!
//! No I/O happens here; issuing requests and realizing schedules is the
//! engine crate's job.

pub mod error;
pub mod metrics;
pub mod plan;
pub mod scenario;
pub mod schedule;
pub mod threshold;

pub use error::{Result, StampedeError};
pub use metrics::{CheckStat, MetricsSummary, RequestOutcome, RunMetrics};
pub use plan::{ExportSettings, HttpSettings, TestPlan};
pub use scenario::{Check, CheckCondition, RequestStep, Scenario};
pub use schedule::{Schedule, Stage};
pub use threshold::{ThresholdResult, ThresholdSpec};
