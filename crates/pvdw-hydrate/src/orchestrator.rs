//! Runs the selected phases in canonical order over one warehouse connection.

use std::collections::BTreeSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use pvdw_core::{Phase, Table};
use pvdw_storage::{
    CopyFormat, LoadReport, LocalCopyTransport, ObjectStoreCredentials, S3CopyTransport, StagingLoader,
    StagingTransport, StatementRegistry, Warehouse,
};
use serde::Serialize;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config::{PipelineConfig, TransportConfig};
use crate::dimension::DimensionHydrator;
use crate::fact::{FactHydrator, FactLoad};
use crate::quality::{standard_checks, verify, QualityResult};

#[derive(Debug, Clone, Serialize)]
pub struct TableRows {
    pub phase: Phase,
    pub table: Table,
    pub rows: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub rows: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub warehouse: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub phases: Vec<PhaseReport>,
    pub tables: Vec<TableRows>,
    pub staged: Vec<LoadReport>,
    pub facts: Option<FactLoad>,
    pub quality: Vec<QualityResult>,
}

impl RunSummary {
    pub fn quality_failures(&self) -> impl Iterator<Item = &QualityResult> {
        self.quality.iter().filter(|r| !r.passed)
    }

    pub fn rows_for(&self, table: Table) -> u64 {
        self.tables
            .iter()
            .filter(|t| t.table == table)
            .map(|t| t.rows)
            .sum()
    }
}

pub fn transport_for(
    config: &TransportConfig,
    credentials: &ObjectStoreCredentials,
) -> Box<dyn StagingTransport> {
    match config {
        TransportConfig::S3Copy { bucket } => {
            Box::new(S3CopyTransport::new(bucket.clone(), credentials.clone()))
        }
        TransportConfig::LocalCopy { root } => Box::new(LocalCopyTransport::new(root.clone())),
    }
}

pub struct Orchestrator<'a> {
    config: &'a PipelineConfig,
    registry: &'a StatementRegistry,
    loader: StagingLoader,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        registry: &'a StatementRegistry,
        credentials: &ObjectStoreCredentials,
    ) -> Self {
        let transport = transport_for(&config.transport, credentials);
        Self::with_transport(config, registry, transport)
    }

    pub fn with_transport(
        config: &'a PipelineConfig,
        registry: &'a StatementRegistry,
        transport: Box<dyn StagingTransport>,
    ) -> Self {
        Self {
            config,
            registry,
            loader: StagingLoader::new(transport),
        }
    }

    /// Validates every statement the phases need, then executes them; the first failure aborts.
    pub async fn run(
        &self,
        warehouse: &mut Warehouse,
        phases: &BTreeSet<Phase>,
    ) -> anyhow::Result<RunSummary> {
        self.registry
            .validate(self.config.required_statements(phases))?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut summary = RunSummary {
            run_id,
            warehouse: warehouse.endpoint().to_string(),
            started_at,
            finished_at: started_at,
            elapsed_ms: 0,
            phases: Vec::new(),
            tables: Vec::new(),
            staged: Vec::new(),
            facts: None,
            quality: Vec::new(),
        };
        info!(%run_id, warehouse = %summary.warehouse, phases = phases.len(), "pipeline run started");

        for &phase in phases {
            let span = info_span!("phase", %run_id, %phase);
            let phase_started = Utc::now();
            let phase_clock = Instant::now();
            let rows = self
                .run_phase(warehouse, phase, &mut summary)
                .instrument(span)
                .await?;
            let report = PhaseReport {
                phase,
                started_at: phase_started,
                finished_at: Utc::now(),
                elapsed_ms: phase_clock.elapsed().as_millis() as u64,
                rows,
            };
            info!(%run_id, %phase, rows, elapsed_ms = report.elapsed_ms, "phase complete");
            summary.phases.push(report);
        }

        summary.finished_at = Utc::now();
        summary.elapsed_ms = clock.elapsed().as_millis() as u64;
        info!(
            %run_id,
            elapsed_ms = summary.elapsed_ms,
            quality_failures = summary.quality_failures().count(),
            "pipeline run finished"
        );
        Ok(summary)
    }

    async fn run_phase(
        &self,
        warehouse: &mut Warehouse,
        phase: Phase,
        summary: &mut RunSummary,
    ) -> anyhow::Result<u64> {
        let tables = &self.config.tables;
        let dimensions = DimensionHydrator::new(self.registry);
        let mut total = 0u64;
        let mut record = |summary: &mut RunSummary, table: Table, rows: u64| {
            total += rows;
            summary.tables.push(TableRows { phase, table, rows });
        };

        match phase {
            Phase::StageCsv | Phase::StageJson => {
                let (list, format) = if phase == Phase::StageCsv {
                    (&tables.stage_csv, self.config.csv_format())
                } else {
                    (&tables.stage_json, CopyFormat::Json)
                };
                for &table in list {
                    let report = self
                        .loader
                        .load_table(warehouse, self.registry, table, format)
                        .await?;
                    record(summary, table, report.rows);
                    summary.staged.push(report);
                }
            }
            Phase::SeedSentinels => {
                for &table in &tables.sentinel_seed {
                    let rows = dimensions
                        .seed_sentinel(warehouse, table)
                        .instrument(info_span!("table", %table))
                        .await?;
                    record(summary, table, rows);
                }
            }
            Phase::ReplaceDimensions => {
                for &table in &tables.replace_dimensions {
                    let rows = dimensions
                        .replace(warehouse, table)
                        .instrument(info_span!("table", %table))
                        .await?;
                    record(summary, table, rows);
                }
            }
            Phase::AppendDimensions => {
                for &table in &tables.append_dimensions {
                    let rows = dimensions
                        .append(warehouse, table)
                        .instrument(info_span!("table", %table))
                        .await?;
                    record(summary, table, rows);
                }
            }
            Phase::Facts => {
                let facts = FactHydrator::new(self.registry, self.config.fact_batch_size);
                for &table in &tables.facts {
                    let load = facts
                        .hydrate(warehouse, table)
                        .instrument(info_span!("table", %table))
                        .await?;
                    record(summary, table, load.inserted);
                    summary.facts = Some(load);
                }
            }
            Phase::Quality => {
                summary.quality = verify(warehouse, &standard_checks()).await?;
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn transport_follows_configuration() {
        let creds = ObjectStoreCredentials::default();
        let s3 = transport_for(
            &TransportConfig::S3Copy {
                bucket: "s3://extracts/".into(),
            },
            &creds,
        );
        assert_eq!(s3.describe(), "s3://extracts");

        let local = transport_for(
            &TransportConfig::LocalCopy {
                root: PathBuf::from("/tmp/extracts"),
            },
            &creds,
        );
        assert_eq!(local.describe(), "/tmp/extracts");
    }

    #[test]
    fn summary_totals_rows_per_table() {
        let now = Utc::now();
        let summary = RunSummary {
            run_id: Uuid::new_v4(),
            warehouse: "localhost:5432/pvdw".into(),
            started_at: now,
            finished_at: now,
            elapsed_ms: 0,
            phases: vec![],
            tables: vec![
                TableRows {
                    phase: Phase::SeedSentinels,
                    table: Table::DimVehicle,
                    rows: 1,
                },
                TableRows {
                    phase: Phase::AppendDimensions,
                    table: Table::DimVehicle,
                    rows: 28,
                },
            ],
            staged: vec![],
            facts: None,
            quality: vec![QualityResult {
                description: "times".into(),
                expected_row_count: 0,
                actual_row_count: 2,
                passed: false,
            }],
        };
        assert_eq!(summary.rows_for(Table::DimVehicle), 29);
        assert_eq!(summary.rows_for(Table::DimDate), 0);
        assert_eq!(summary.quality_failures().count(), 1);
    }
}
