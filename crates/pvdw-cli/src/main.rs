use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pvdw_core::Phase;
use pvdw_hydrate::RuntimeConfig;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pvdw-cli")]
#[command(about = "Parking violations warehouse loader")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Drop and recreate every warehouse relation.
    Create,
    /// Run the pipeline once.
    Run {
        /// Comma-separated phases, e.g. `facts,quality`; defaults to the pipeline file.
        #[arg(long, value_delimiter = ',')]
        phases: Option<Vec<Phase>>,
    },
    /// Run only the quality checks.
    Check,
    /// Run the pipeline on the configured cron schedule until interrupted.
    Schedule,
    /// Print a digest of recent run reports.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run { phases: None }) {
        Commands::Create => {
            let created = pvdw_hydrate::create_schema_from_env().await?;
            println!("schema created: {created} relations");
        }
        Commands::Run { phases } => {
            let summary = pvdw_hydrate::run_pipeline_from_env(phases.as_deref()).await?;
            println!(
                "run complete: run_id={} phases={} facts_inserted={} quality_failures={} elapsed_ms={}",
                summary.run_id,
                summary.phases.len(),
                summary.facts.map(|f| f.inserted).unwrap_or(0),
                summary.quality_failures().count(),
                summary.elapsed_ms
            );
        }
        Commands::Check => {
            let summary = pvdw_hydrate::run_pipeline_from_env(Some(&[Phase::Quality][..])).await?;
            for result in &summary.quality {
                let mark = if result.passed { "ok" } else { "FAILED" };
                println!(
                    "[{mark}] {} (expected {}, got {})",
                    result.description, result.expected_row_count, result.actual_row_count
                );
            }
        }
        Commands::Schedule => {
            let runtime = RuntimeConfig::from_env();
            let Some(mut sched) = pvdw_hydrate::maybe_build_scheduler(&runtime).await? else {
                eprintln!("scheduler disabled; set PVDW_SCHEDULER_ENABLED=true");
                return Ok(());
            };
            sched.start().await.context("starting scheduler")?;
            tracing::info!(cron = %runtime.cron, "scheduler running; ctrl-c to stop");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            sched.shutdown().await.context("stopping scheduler")?;
        }
        Commands::Report { runs } => {
            println!("{}", pvdw_hydrate::report_digest_from_env(runs).await?);
        }
    }

    Ok(())
}
