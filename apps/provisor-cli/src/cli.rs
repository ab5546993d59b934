use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use provisor_config::load_config;
use provisor_core::planner::PlanBuilder;
use provisor_core::OrchestrationEngine;
use provisor_stores::JsonFileLedger;

use crate::report::RunSummary;
use crate::sim::SimBackend;

#[derive(Debug, Parser)]
#[command(name = "provisor", about = "Phased resource provisioning CLI")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the plan and execute it against the backend
    Run(RunArgs),
    /// Build and print the plan without executing anything
    Plan(PlanArgs),
}

#[derive(Debug, Args, Clone)]
struct RunArgs {
    #[arg(long, default_value = "configs/deploy.example.yaml")]
    config: PathBuf,
    /// Ledger file; created on first run, consulted on resume
    #[arg(long, default_value = "deployment-ledger.json")]
    ledger: PathBuf,
    /// Write the run summary to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Args, Clone)]
struct PlanArgs {
    #[arg(long, default_value = "configs/deploy.example.yaml")]
    config: PathBuf,
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Run(args) => {
                ensure_log_filter(args.verbose);
                init_tracing();
                run_deployment(args).await
            }
            Command::Plan(args) => {
                ensure_log_filter(args.verbose);
                init_tracing();
                print_plan(args)
            }
        }
    }
}

async fn run_deployment(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let plan = PlanBuilder::build(&config)?;
    info!(
        steps = plan.step_count(),
        phases = plan.phases.len(),
        "plan built"
    );

    let ledger = Arc::new(JsonFileLedger::open(&args.ledger)?);
    let backend = Arc::new(SimBackend::new());

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; stopping after the current step");
            signal_token.cancel();
        }
    });

    let engine = OrchestrationEngine::new(ledger, backend).with_cancellation(cancel);
    let outcome = engine.run(&plan).await?;

    let summary = RunSummary::from_outcome(&config, &outcome);
    let rendered = serde_json::to_string_pretty(&summary)?;
    match &args.output {
        Some(path) => {
            tokio::fs::write(path, rendered.as_bytes()).await?;
            info!(path = %path.display(), "run summary written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn print_plan(args: PlanArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let plan = PlanBuilder::build(&config)?;
    for phase in &plan.phases {
        println!("phase: {}", phase.name);
        for step in &phase.steps {
            println!("  {}", step.id);
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn ensure_log_filter(verbose: bool) {
    if verbose {
        env::set_var("RUST_LOG", "debug");
        return;
    }
    if env::var("RUST_LOG").is_ok() {
        return;
    }
    env::set_var("RUST_LOG", "info");
}
