//! Post-load integrity probes. Mismatches are reported, never fatal.

use pvdw_storage::Warehouse;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityCheck {
    pub query: String,
    pub description: String,
    pub expected_row_count: usize,
}

impl QualityCheck {
    pub fn new(query: impl Into<String>, description: impl Into<String>, expected_row_count: usize) -> Self {
        Self {
            query: query.into(),
            description: description.into(),
            expected_row_count,
        }
    }

    /// A fact row whose `fk_column` has no matching `dim_key` in `dimension`; expects none.
    ///
    /// Stops at the first orphan, so a failed check reports 1 however broken the load is.
    pub fn orphans(fk_column: &str, dimension: &str, dim_key: &str, description: &str) -> Self {
        Self::new(
            format!(
                "SELECT f.summons_number FROM fact_parkingviolation f \
                 LEFT JOIN {dimension} d ON d.{dim_key} = f.{fk_column} \
                 WHERE d.{dim_key} IS NULL \
                 LIMIT 1"
            ),
            description,
            0,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityResult {
    pub description: String,
    pub expected_row_count: usize,
    pub actual_row_count: usize,
    pub passed: bool,
}

/// Staged summons numbers, restricted to the ones that parse as integers.
const STAGED_SUMMONS: &str = "SELECT CAST(TRIM(summons_number) AS BIGINT) AS summons_number \
     FROM stage_parking_violations WHERE TRIM(summons_number) ~ '^[0-9]{1,18}$'";

pub fn standard_checks() -> Vec<QualityCheck> {
    let mut checks = vec![QualityCheck::new(
        format!(
            "SELECT COUNT(DISTINCT s.summons_number) AS n FROM ({STAGED_SUMMONS}) s \
             UNION \
             SELECT COUNT(DISTINCT f.summons_number) AS n FROM fact_parkingviolation f \
             WHERE f.summons_number IN (SELECT summons_number FROM ({STAGED_SUMMONS}) s)"
        ),
        "Staged summons numbers and their fact rows have the same count",
        1,
    )];

    checks.extend([
        QualityCheck::orphans("borough_key", "dim_borough", "borough_key", "Fact boroughs exist in dim_borough"),
        QualityCheck::orphans("issue_date_key", "dim_date", "date_key", "Fact issue dates exist in dim_date"),
        QualityCheck::orphans(
            "vehicle_expiration_date_key",
            "dim_date",
            "date_key",
            "Fact vehicle expiration dates exist in dim_date",
        ),
        QualityCheck::orphans(
            "issuing_agency_key",
            "dim_issuingagency",
            "issuing_agency_key",
            "Fact issuing agencies exist in dim_issuingagency",
        ),
        QualityCheck::orphans(
            "issuer_precinct_key",
            "dim_precinct",
            "precinct_key",
            "Fact issuer precincts exist in dim_precinct",
        ),
        QualityCheck::orphans(
            "violation_precinct_key",
            "dim_precinct",
            "precinct_key",
            "Fact violation precincts exist in dim_precinct",
        ),
        QualityCheck::orphans(
            "registration_state_key",
            "dim_registrationstate",
            "registration_state_key",
            "Fact registration states exist in dim_registrationstate",
        ),
        QualityCheck::orphans("time_key", "dim_time", "time_key", "Fact violation times exist in dim_time"),
        QualityCheck::orphans("vehicle_key", "dim_vehicle", "vehicle_key", "Fact vehicles exist in dim_vehicle"),
        QualityCheck::orphans(
            "violation_key",
            "dim_violation",
            "violation_key",
            "Fact violation types exist in dim_violation",
        ),
    ]);
    checks
}

/// Runs every check in order; only warehouse errors abort.
pub async fn verify(warehouse: &mut Warehouse, checks: &[QualityCheck]) -> anyhow::Result<Vec<QualityResult>> {
    let mut results = Vec::with_capacity(checks.len());
    for check in checks {
        let actual_row_count = warehouse.fetch_all(&check.query).await?.len();
        let result = evaluate(check, actual_row_count);
        if result.passed {
            info!(check = %result.description, rows = actual_row_count, "quality check passed");
        } else {
            warn!(
                check = %result.description,
                expected = result.expected_row_count,
                actual = result.actual_row_count,
                "quality check failed"
            );
        }
        results.push(result);
    }
    Ok(results)
}

pub fn evaluate(check: &QualityCheck, actual_row_count: usize) -> QualityResult {
    QualityResult {
        description: check.description.clone(),
        expected_row_count: check.expected_row_count,
        actual_row_count,
        passed: actual_row_count == check.expected_row_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_checks_cover_parity_and_every_foreign_key() {
        let checks = standard_checks();
        assert_eq!(checks.len(), 11);
        assert_eq!(checks[0].expected_row_count, 1);
        assert!(checks[0].query.contains("UNION"));
        assert!(checks[1..].iter().all(|c| c.expected_row_count == 0));

        let fks = [
            "borough_key",
            "issue_date_key",
            "vehicle_expiration_date_key",
            "issuing_agency_key",
            "issuer_precinct_key",
            "violation_precinct_key",
            "registration_state_key",
            "time_key",
            "vehicle_key",
            "violation_key",
        ];
        for fk in fks {
            assert!(
                checks.iter().any(|c| c.query.contains(&format!("= f.{fk} "))),
                "missing orphan check for {fk}"
            );
        }
    }

    #[test]
    fn orphan_checks_fetch_at_most_one_row() {
        let check = QualityCheck::orphans("vehicle_key", "dim_vehicle", "vehicle_key", "vehicles");
        assert!(check.query.ends_with("WHERE d.vehicle_key IS NULL LIMIT 1"), "{}", check.query);
        assert!(standard_checks()[1..].iter().all(|c| c.query.ends_with("LIMIT 1")));
    }

    #[test]
    fn mismatches_are_reported_not_raised() {
        let check = QualityCheck::orphans("time_key", "dim_time", "time_key", "times");
        let ok = evaluate(&check, 0);
        assert!(ok.passed);
        let bad = evaluate(&check, 3);
        assert!(!bad.passed);
        assert_eq!(bad.expected_row_count, 0);
        assert_eq!(bad.actual_row_count, 3);
    }
}
