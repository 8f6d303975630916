//! # Stampede CLI
//!
//! Command-line interface for running load test plans.
//!
//! ## Usage
//!
//! ```bash
//! # Run a plan
//! stampede run --plan plans/perf_basico.toml
//!
//! # Point the same plan at a staging host and keep the JSON report
//! stampede run --plan plans/stress_ots.toml --target https://staging.taller.pe --output results.json
//!
//! # Validate a plan without sending a single request
//! stampede check --plan plans/perf_reportes.toml
//! ```
//!
//! Exit status: 0 when every threshold passes, 1 when any threshold fails,
//! 2 on a configuration or load error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stampede_core::plan::{ExportSettings, TestPlan};
use stampede_engine::Runner;

#[derive(Parser)]
#[command(name = "stampede")]
#[command(version)]
#[command(about = "Virtual-user HTTP load generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test plan
    Run {
        /// Plan file (TOML)
        #[arg(short, long)]
        plan: PathBuf,

        /// Override the plan's base URL
        #[arg(short, long)]
        target: Option<String>,

        /// Write the full report as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Serve live Prometheus metrics on this address during the run
        #[arg(long)]
        metrics_addr: Option<String>,
    },

    /// Validate a plan without running it
    Check {
        /// Plan file (TOML)
        #[arg(short, long)]
        plan: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match run_command(cli.command).await {
        Ok(passed) => {
            if passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run_command(command: Commands) -> anyhow::Result<bool> {
    match command {
        Commands::Run {
            plan,
            target,
            output,
            metrics_addr,
        } => {
            let mut plan = TestPlan::load(&plan)?;
            if let Some(target) = target {
                plan.base_url = target;
            }
            if let Some(address) = metrics_addr {
                plan.export = Some(ExportSettings { address });
            }

            let runner = Runner::new(plan)?;
            let report = runner.run().await?;
            report.print_report();

            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&report)?;
                std::fs::write(&path, json)?;
                info!("report saved to {}", path.display());
            }

            Ok(report.passed)
        }
        Commands::Check { plan } => {
            let plan = TestPlan::load(&plan)?;
            let thresholds = plan.threshold_specs()?;
            info!(
                plan = %plan.name,
                steps = plan.scenario.steps.len(),
                max_vus = plan.schedule.max_target(),
                duration_secs = plan.schedule.total_duration().as_secs(),
                thresholds = thresholds.len(),
                "plan is valid"
            );
            Ok(true)
        }
    }
}
