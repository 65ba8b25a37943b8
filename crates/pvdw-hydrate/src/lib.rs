//! Warehouse hydration: dimensions, facts, quality checks and the phase orchestrator.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use pvdw_core::{Action, Phase, Table};
use pvdw_storage::{StatementRegistry, Warehouse};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

pub mod config;
pub mod dimension;
pub mod fact;
pub mod orchestrator;
pub mod quality;
pub mod report;

pub use config::{PipelineConfig, RuntimeConfig, TransportConfig};
pub use orchestrator::{Orchestrator, RunSummary};
pub use quality::{QualityCheck, QualityResult};

pub const CRATE_NAME: &str = "pvdw-hydrate";

/// Drops and recreates every relation in the catalogue.
pub async fn create_schema(warehouse: &mut Warehouse, registry: &StatementRegistry) -> Result<usize> {
    registry.validate(
        Table::ALL
            .into_iter()
            .flat_map(|t| [(t, Action::Drop), (t, Action::Create)]),
    )?;
    for table in Table::ALL {
        warehouse.dispatch(registry, table, Action::Drop).await?;
        warehouse.dispatch(registry, table, Action::Create).await?;
        info!(%table, "created");
    }
    Ok(Table::ALL.len())
}

/// One full invocation: load config, connect, run the phases, write reports.
pub async fn run_pipeline_once(runtime: &RuntimeConfig, phases: Option<&[Phase]>) -> Result<RunSummary> {
    let pipeline = PipelineConfig::load_or_default(&runtime.pipeline_path).await?;
    let registry = StatementRegistry::standard();
    let selected: BTreeSet<Phase> = pipeline.selected_phases(phases);
    registry.validate(pipeline.required_statements(&selected))?;

    let mut warehouse = Warehouse::connect(&runtime.warehouse).await?;
    let orchestrator = Orchestrator::new(&pipeline, &registry, &runtime.credentials);
    let summary = orchestrator.run(&mut warehouse, &selected).await?;
    warehouse.close().await?;

    let run_dir = report::write_reports(&pipeline.reports_dir, &summary).await?;
    for failed in summary.quality_failures() {
        warn!(
            check = %failed.description,
            expected = failed.expected_row_count,
            actual = failed.actual_row_count,
            "warehouse integrity alert"
        );
    }
    info!(run_id = %summary.run_id, reports = %run_dir.display(), "run reports written");
    Ok(summary)
}

pub async fn run_pipeline_from_env(phases: Option<&[Phase]>) -> Result<RunSummary> {
    run_pipeline_once(&RuntimeConfig::from_env(), phases).await
}

pub async fn create_schema_from_env() -> Result<usize> {
    let runtime = RuntimeConfig::from_env();
    let registry = StatementRegistry::standard();
    let mut warehouse = Warehouse::connect(&runtime.warehouse).await?;
    let created = create_schema(&mut warehouse, &registry).await?;
    warehouse.close().await?;
    Ok(created)
}

pub async fn report_digest_from_env(runs: usize) -> Result<String> {
    let runtime = RuntimeConfig::from_env();
    let pipeline = PipelineConfig::load_or_default(&runtime.pipeline_path).await?;
    report::report_digest_markdown(runs, &pipeline.reports_dir)
}

/// Cron-driven full runs, or `None` when scheduling is disabled.
pub async fn maybe_build_scheduler(runtime: &RuntimeConfig) -> Result<Option<JobScheduler>> {
    if !runtime.scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job_runtime = runtime.clone();
    let job = Job::new_async(&runtime.cron, move |_uuid, _l| {
        let runtime = job_runtime.clone();
        Box::pin(async move {
            match run_pipeline_once(&runtime, None).await {
                Ok(summary) => info!(
                    run_id = %summary.run_id,
                    quality_failures = summary.quality_failures().count(),
                    "scheduled run finished"
                ),
                Err(err) => error!(error = %format!("{err:#}"), "scheduled run failed"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {}", runtime.cron))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(Some(sched))
}
