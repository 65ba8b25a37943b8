//! Run reports on disk and the digest printed by `report`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::fs;

use crate::orchestrator::RunSummary;

pub const SUMMARY_FILE: &str = "run_summary.json";
pub const BRIEF_FILE: &str = "run_brief.md";

/// Writes `<reports_dir>/<run_id>/{run_summary.json,run_brief.md}`; returns the run directory.
pub async fn write_reports(reports_dir: &Path, summary: &RunSummary) -> anyhow::Result<PathBuf> {
    let run_dir = reports_dir.join(summary.run_id.to_string());
    fs::create_dir_all(&run_dir)
        .await
        .with_context(|| format!("creating {}", run_dir.display()))?;

    let json = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
    fs::write(run_dir.join(SUMMARY_FILE), json)
        .await
        .with_context(|| format!("writing {SUMMARY_FILE}"))?;
    fs::write(run_dir.join(BRIEF_FILE), render_brief(summary))
        .await
        .with_context(|| format!("writing {BRIEF_FILE}"))?;

    Ok(run_dir)
}

pub fn render_brief(summary: &RunSummary) -> String {
    let phases = summary
        .phases
        .iter()
        .map(|p| format!("- {}: {} rows in {} ms", p.phase, p.rows, p.elapsed_ms))
        .collect::<Vec<_>>()
        .join("\n");
    let tables = summary
        .tables
        .iter()
        .map(|t| format!("- {} `{}`: {}", t.phase, t.table, t.rows))
        .collect::<Vec<_>>()
        .join("\n");
    let quality = if summary.quality.is_empty() {
        "- not run".to_string()
    } else {
        summary
            .quality
            .iter()
            .map(|q| {
                let mark = if q.passed { "ok" } else { "FAILED" };
                format!(
                    "- [{mark}] {} (expected {}, got {})",
                    q.description, q.expected_row_count, q.actual_row_count
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "# PVDW Run Brief\n\n- Run ID: `{}`\n- Warehouse: {}\n- Started: {}\n- Finished: {}\n- Elapsed: {} ms\n\n## Phases\n{}\n\n## Tables\n{}\n\n## Quality\n{}\n",
        summary.run_id,
        summary.warehouse,
        summary.started_at,
        summary.finished_at,
        summary.elapsed_ms,
        phases,
        tables,
        quality,
    )
}

/// Markdown digest of the latest `runs` reports, newest first.
pub fn report_digest_markdown(runs: usize, reports_dir: &Path) -> anyhow::Result<String> {
    let mut dirs = std::fs::read_dir(reports_dir)
        .with_context(|| format!("reading {}", reports_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .filter(|entry| entry.path().join(SUMMARY_FILE).exists())
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();
    let dirs = dirs.into_iter().take(runs.max(1)).collect::<Vec<_>>();

    let mut lines = vec!["# PVDW Run Digest".to_string(), String::new()];
    for dir in dirs {
        let run_id = dir.file_name().to_string_lossy().to_string();
        let summary_path = dir.path().join(SUMMARY_FILE);
        let brief_path = dir.path().join(BRIEF_FILE);

        let value: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&summary_path)
                .with_context(|| format!("reading {}", summary_path.display()))?,
        )
        .with_context(|| format!("parsing {}", summary_path.display()))?;

        let started = value.get("started_at").and_then(|v| v.as_str()).unwrap_or("unknown");
        let elapsed = value.get("elapsed_ms").and_then(|v| v.as_u64()).unwrap_or(0);
        let warehouse = value.get("warehouse").and_then(|v| v.as_str()).unwrap_or("unknown");
        let fact_rows = value
            .get("facts")
            .and_then(|v| v.get("inserted"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let quality = value
            .get("quality")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let failed = quality
            .iter()
            .filter(|q| q.get("passed").and_then(|p| p.as_bool()) == Some(false))
            .count();

        lines.push(format!("## Run `{run_id}`"));
        lines.push(format!("- started: {started}"));
        lines.push(format!("- elapsed: {elapsed} ms"));
        lines.push(format!("- warehouse: `{warehouse}`"));
        lines.push(format!("- facts inserted: {fact_rows}"));
        if !quality.is_empty() {
            lines.push(format!("- quality: {} checks, {failed} failed", quality.len()));
        }
        lines.push(format!("- summary: `{}`", summary_path.display()));
        if brief_path.exists() {
            lines.push(format!("- brief: `{}`", brief_path.display()));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::FactLoad;
    use crate::orchestrator::{PhaseReport, TableRows};
    use crate::quality::QualityResult;
    use chrono::{TimeZone, Utc};
    use pvdw_core::{Phase, Table};
    use tempfile::tempdir;
    use uuid::Uuid;

    fn mk_summary() -> RunSummary {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 4, 0, 0).single().unwrap();
        RunSummary {
            run_id: Uuid::new_v4(),
            warehouse: "dwh.internal:5439/violations".into(),
            started_at: at,
            finished_at: at,
            elapsed_ms: 1250,
            phases: vec![PhaseReport {
                phase: Phase::Facts,
                started_at: at,
                finished_at: at,
                elapsed_ms: 900,
                rows: 42,
            }],
            tables: vec![TableRows {
                phase: Phase::Facts,
                table: Table::FactParkingViolation,
                rows: 42,
            }],
            staged: vec![],
            facts: Some(FactLoad {
                staged_rows: 43,
                skipped_rows: 1,
                candidates: 42,
                inserted: 42,
            }),
            quality: vec![
                QualityResult {
                    description: "Fact vehicles exist in dim_vehicle".into(),
                    expected_row_count: 0,
                    actual_row_count: 0,
                    passed: true,
                },
                QualityResult {
                    description: "Fact violation times exist in dim_time".into(),
                    expected_row_count: 0,
                    actual_row_count: 2,
                    passed: false,
                },
            ],
        }
    }

    #[test]
    fn brief_lists_phases_and_failed_checks() {
        let brief = render_brief(&mk_summary());
        assert!(brief.contains("- facts: 42 rows in 900 ms"));
        assert!(brief.contains("- facts `fact_parkingviolation`: 42"));
        assert!(brief.contains("[FAILED] Fact violation times exist in dim_time (expected 0, got 2)"));
    }

    #[tokio::test]
    async fn reports_round_trip_into_digest() {
        let dir = tempdir().expect("tempdir");
        let summary = mk_summary();
        let run_dir = write_reports(dir.path(), &summary).await.expect("write");
        assert!(run_dir.join(SUMMARY_FILE).exists());
        assert!(run_dir.join(BRIEF_FILE).exists());

        std::fs::create_dir_all(dir.path().join("stray")).unwrap();

        let digest = report_digest_markdown(5, dir.path()).expect("digest");
        assert!(digest.contains(&format!("## Run `{}`", summary.run_id)));
        assert!(digest.contains("- facts inserted: 42"));
        assert!(digest.contains("- quality: 2 checks, 1 failed"));
        assert!(!digest.contains("stray"));
    }
}
