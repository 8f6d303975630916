//! # Stampede Engine
//!
//! Virtual-user execution engine for the stampede load generator.
//!
//! The engine turns a validated [`TestPlan`](stampede_core::TestPlan) into
//! load: a scheduler realizes the concurrency profile, each virtual user
//! repeats the scenario over a shared HTTP client, and every outcome
//! streams into the shared aggregates. `Runner::run` resolves to the final
//! report once the last VU has wound down.

pub mod client;
pub mod export;
pub mod report;
pub mod runner;
mod scheduler;
mod vu;

pub use export::MetricsExporter;
pub use report::RunReport;
pub use runner::Runner;
