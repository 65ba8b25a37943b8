//! Runtime settings from the environment and the versioned pipeline file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use pvdw_core::{Action, Phase, Table, TableKind};
use pvdw_storage::{CopyFormat, ObjectStoreCredentials, WarehouseConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::dimension::{strategy_for, DimensionStrategy};

pub const PIPELINE_FILE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unsupported pipeline file version {0}; expected {PIPELINE_FILE_VERSION}")]
    UnsupportedVersion(u32),
    #[error("table `{table}` cannot appear in `{list}`")]
    MisplacedTable { table: Table, list: &'static str },
    #[error("fact_batch_size must be at least 1")]
    EmptyBatch,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub warehouse: WarehouseConfig,
    pub credentials: ObjectStoreCredentials,
    pub pipeline_path: PathBuf,
    pub scheduler_enabled: bool,
    pub cron: String,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self {
            warehouse: WarehouseConfig::from_env(),
            credentials: ObjectStoreCredentials::from_env(),
            pipeline_path: std::env::var("PVDW_PIPELINE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("pipeline.yaml")),
            scheduler_enabled: std::env::var("PVDW_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            cron: std::env::var("PVDW_CRON").unwrap_or_else(|_| "0 4 * * *".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Warehouse-side `COPY ... FROM 's3://...'`. Only Redshift accepts it, and the
    /// hydration statements are PostgreSQL; not usable for a full run.
    S3Copy { bucket: String },
    LocalCopy { root: PathBuf },
}

/// Ordered table lists, one per phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseTables {
    pub stage_csv: Vec<Table>,
    pub stage_json: Vec<Table>,
    pub sentinel_seed: Vec<Table>,
    pub replace_dimensions: Vec<Table>,
    pub append_dimensions: Vec<Table>,
    pub facts: Vec<Table>,
}

impl Default for PhaseTables {
    fn default() -> Self {
        Self {
            stage_csv: vec![
                Table::StageIssuingAgency,
                Table::StagePrecinct,
                Table::StageRegistrationState,
                Table::StageVehicle,
                Table::StageViolation,
            ],
            stage_json: vec![Table::StageParkingViolations],
            sentinel_seed: vec![Table::DimVehicle],
            replace_dimensions: vec![
                Table::DimRegistrationState,
                Table::DimViolation,
                Table::DimPrecinct,
                Table::DimIssuingAgency,
                Table::DimBorough,
            ],
            append_dimensions: vec![Table::DimVehicle, Table::DimTime, Table::DimDate],
            facts: vec![Table::FactParkingViolation],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub version: u32,
    pub phases: Vec<Phase>,
    pub tables: PhaseTables,
    pub transport: TransportConfig,
    pub csv_header_rows: usize,
    pub fact_batch_size: usize,
    pub reports_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            version: PIPELINE_FILE_VERSION,
            phases: Phase::ALL.to_vec(),
            tables: PhaseTables::default(),
            transport: TransportConfig::LocalCopy {
                root: PathBuf::from("extracts"),
            },
            csv_header_rows: 1,
            fact_batch_size: 10_000,
            reports_dir: PathBuf::from("reports"),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(text).context("parsing pipeline yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    /// Falls back to the built-in pipeline when `path` does not exist.
    pub async fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        let exists = tokio::fs::try_exists(path)
            .await
            .with_context(|| format!("checking {}", path.display()))?;
        if exists {
            Self::load(path).await
        } else {
            info!(path = %path.display(), "pipeline file not found; using built-in pipeline");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != PIPELINE_FILE_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.version));
        }
        if self.fact_batch_size == 0 {
            return Err(ConfigError::EmptyBatch);
        }

        let tables = &self.tables;
        check_list(&tables.stage_csv, "stage_csv", |t| t.kind() == TableKind::Staging)?;
        check_list(&tables.stage_json, "stage_json", |t| t.kind() == TableKind::Staging)?;
        check_list(&tables.sentinel_seed, "sentinel_seed", |t| {
            t.kind() == TableKind::Dimension
        })?;
        check_list(&tables.replace_dimensions, "replace_dimensions", |t| {
            strategy_for(t) == Some(DimensionStrategy::Replace)
        })?;
        check_list(&tables.append_dimensions, "append_dimensions", |t| {
            strategy_for(t) == Some(DimensionStrategy::Append)
        })?;
        check_list(&tables.facts, "facts", |t| t == Table::FactParkingViolation)?;
        Ok(())
    }

    /// The configured phase set, or `requested` when given; always iterated in canonical order.
    pub fn selected_phases(&self, requested: Option<&[Phase]>) -> BTreeSet<Phase> {
        match requested {
            Some(phases) => phases.iter().copied().collect(),
            None => self.phases.iter().copied().collect(),
        }
    }

    pub fn csv_format(&self) -> CopyFormat {
        CopyFormat::Csv {
            header_rows: self.csv_header_rows,
        }
    }

    /// Every `(table, action)` pair the selected phases will dispatch.
    pub fn required_statements(&self, phases: &BTreeSet<Phase>) -> Vec<(Table, Action)> {
        let tables = &self.tables;
        let mut out = Vec::new();
        for phase in phases {
            match phase {
                Phase::StageCsv | Phase::StageJson => {
                    let list = if *phase == Phase::StageCsv {
                        &tables.stage_csv
                    } else {
                        &tables.stage_json
                    };
                    for &table in list {
                        out.push((table, Action::Truncate));
                        out.push((table, Action::Copy));
                    }
                }
                Phase::SeedSentinels => {
                    out.extend(tables.sentinel_seed.iter().map(|&t| (t, Action::ZeroSk)));
                }
                Phase::ReplaceDimensions => {
                    for &table in &tables.replace_dimensions {
                        out.push((table, Action::Truncate));
                        out.push((table, Action::Insert));
                        out.push((table, Action::ZeroSk));
                        if table == Table::DimBorough {
                            out.push((Table::WorkBorough, Action::Truncate));
                        }
                    }
                }
                Phase::AppendDimensions => {
                    for &table in &tables.append_dimensions {
                        out.push((table, Action::Insert));
                        let work = match table {
                            Table::DimVehicle => Some(Table::WorkColor),
                            Table::DimTime => Some(Table::WorkTime),
                            Table::DimDate => Some(Table::WorkDate),
                            _ => None,
                        };
                        if let Some(work) = work {
                            out.push((work, Action::Truncate));
                        }
                    }
                }
                Phase::Facts => {
                    for &table in &tables.facts {
                        out.push((table, Action::Insert));
                        out.push((Table::WorkFact, Action::Truncate));
                    }
                }
                Phase::Quality => {}
            }
        }
        out
    }
}

fn check_list(
    list: &[Table],
    name: &'static str,
    allowed: impl Fn(Table) -> bool,
) -> Result<(), ConfigError> {
    match list.iter().copied().find(|t| !allowed(*t)) {
        Some(table) => Err(ConfigError::MisplacedTable { table, list: name }),
        None => Ok(()),
    }
}
