//! Immutable `(table, action)` → statement mapping, built once at startup.

use std::collections::HashMap;

use pvdw_core::{Action, CatalogError, Table, TableKind};
use thiserror::Error;

use crate::sql;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no `{action}` statement registered for table `{table}`")]
    Unresolved { table: Table, action: Action },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone)]
pub struct StatementRegistry {
    statements: HashMap<(Table, Action), String>,
}

impl StatementRegistry {
    /// The full statement catalogue for the warehouse schema.
    pub fn standard() -> Self {
        let mut statements = HashMap::new();

        for table in Table::ALL {
            statements.insert((table, Action::Drop), format!("DROP TABLE IF EXISTS {table}"));
            statements.insert((table, Action::Truncate), format!("TRUNCATE TABLE {table}"));
            if table.kind() == TableKind::Staging {
                statements.insert((table, Action::Copy), format!("COPY {table}"));
            }
        }

        let creates = [
            (Table::StageIssuingAgency, sql::STAGE_ISSUINGAGENCY_CREATE),
            (Table::StagePrecinct, sql::STAGE_PRECINCT_CREATE),
            (Table::StageRegistrationState, sql::STAGE_REGISTRATIONSTATE_CREATE),
            (Table::StageVehicle, sql::STAGE_VEHICLE_CREATE),
            (Table::StageViolation, sql::STAGE_VIOLATION_CREATE),
            (Table::StageParkingViolations, sql::STAGE_PARKING_VIOLATIONS_CREATE),
            (Table::DimRegistrationState, sql::DIM_REGISTRATIONSTATE_CREATE),
            (Table::DimViolation, sql::DIM_VIOLATION_CREATE),
            (Table::DimPrecinct, sql::DIM_PRECINCT_CREATE),
            (Table::DimIssuingAgency, sql::DIM_ISSUINGAGENCY_CREATE),
            (Table::DimBorough, sql::DIM_BOROUGH_CREATE),
            (Table::DimVehicle, sql::DIM_VEHICLE_CREATE),
            (Table::DimTime, sql::DIM_TIME_CREATE),
            (Table::DimDate, sql::DIM_DATE_CREATE),
            (Table::FactParkingViolation, sql::FACT_PARKINGVIOLATION_CREATE),
            (Table::WorkBorough, sql::WORK_BOROUGH_CREATE),
            (Table::WorkColor, sql::WORK_COLOR_CREATE),
            (Table::WorkTime, sql::WORK_TIME_CREATE),
            (Table::WorkDate, sql::WORK_DATE_CREATE),
            (Table::WorkFact, sql::WORK_FACT_CREATE),
        ];
        for (table, text) in creates {
            statements.insert((table, Action::Create), text.trim().to_string());
        }

        let inserts = [
            (Table::DimRegistrationState, sql::DIM_REGISTRATIONSTATE_INSERT),
            (Table::DimViolation, sql::DIM_VIOLATION_INSERT),
            (Table::DimPrecinct, sql::DIM_PRECINCT_INSERT),
            (Table::DimIssuingAgency, sql::DIM_ISSUINGAGENCY_INSERT),
            (Table::DimBorough, sql::DIM_BOROUGH_INSERT),
            (Table::DimVehicle, sql::DIM_VEHICLE_INSERT),
            (Table::DimTime, sql::DIM_TIME_INSERT),
            (Table::DimDate, sql::DIM_DATE_INSERT),
            (Table::FactParkingViolation, sql::FACT_PARKINGVIOLATION_INSERT),
        ];
        for (table, text) in inserts {
            statements.insert((table, Action::Insert), text.trim().to_string());
        }

        let zero_members = [
            (Table::DimRegistrationState, sql::zero_member_registrationstate()),
            (Table::DimViolation, sql::zero_member_violation()),
            (Table::DimPrecinct, sql::zero_member_precinct()),
            (Table::DimIssuingAgency, sql::zero_member_issuingagency()),
            (Table::DimBorough, sql::zero_member_borough()),
            (Table::DimVehicle, sql::zero_member_vehicle()),
        ];
        for (table, text) in zero_members {
            statements.insert((table, Action::ZeroSk), text);
        }

        Self { statements }
    }

    pub fn resolve(&self, table: Table, action: Action) -> Result<&str, DispatchError> {
        self.statements
            .get(&(table, action))
            .map(String::as_str)
            .ok_or(DispatchError::Unresolved { table, action })
    }

    /// Resolves the textual form used in configuration files and on the command line.
    pub fn resolve_tag(&self, table: &str, action: &str) -> Result<&str, DispatchError> {
        let table: Table = table.parse()?;
        let action: Action = action.parse()?;
        self.resolve(table, action)
    }

    pub fn contains(&self, table: Table, action: Action) -> bool {
        self.statements.contains_key(&(table, action))
    }

    /// Fails on the first pair without a statement, before anything touches the warehouse.
    pub fn validate<I>(&self, required: I) -> Result<(), DispatchError>
    where
        I: IntoIterator<Item = (Table, Action)>,
    {
        for (table, action) in required {
            self.resolve(table, action)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_has_lifecycle_statements() {
        let registry = StatementRegistry::standard();
        for table in Table::ALL {
            for action in [Action::Create, Action::Drop, Action::Truncate] {
                assert!(registry.contains(table, action), "{table} {action}");
            }
        }
    }

    #[test]
    fn copy_is_registered_for_staging_only() {
        let registry = StatementRegistry::standard();
        assert_eq!(
            registry.resolve(Table::StageVehicle, Action::Copy),
            Ok("COPY stage_vehicle")
        );
        assert_eq!(
            registry.resolve(Table::DimVehicle, Action::Copy),
            Err(DispatchError::Unresolved {
                table: Table::DimVehicle,
                action: Action::Copy
            })
        );
    }

    #[test]
    fn zero_member_statements_are_idempotent_inserts() {
        let registry = StatementRegistry::standard();
        let seed = registry.resolve(Table::DimVehicle, Action::ZeroSk).unwrap();
        assert!(seed.starts_with("INSERT INTO dim_vehicle"));
        assert!(seed.contains("WHERE NOT EXISTS"));
        assert!(!registry.contains(Table::DimTime, Action::ZeroSk));
    }

    #[test]
    fn append_inserts_anti_join_their_target() {
        let registry = StatementRegistry::standard();
        let fact = registry.resolve(Table::FactParkingViolation, Action::Insert).unwrap();
        assert!(fact.contains("LEFT JOIN fact_parkingviolation f ON f.summons_number = w.summons_number"));
        assert!(fact.contains("WHERE f.summons_number IS NULL"));
        let time = registry.resolve(Table::DimTime, Action::Insert).unwrap();
        assert!(time.contains("WHERE d.time_key IS NULL"));
    }

    #[test]
    fn vehicle_candidates_fit_the_dimension_columns() {
        let registry = StatementRegistry::standard();
        let vehicle = registry.resolve(Table::DimVehicle, Action::Insert).unwrap();
        assert!(vehicle.contains("LEFT(UPPER(TRIM(make)), 50) AS make"));
        assert!(vehicle.contains("LEFT(UPPER(TRIM(vehicle_body_type)), 50) AS body_style"));
        assert!(vehicle.contains("LEFT(UPPER(TRIM(body_type)), 50)"));
        assert!(vehicle.contains("LEFT(COALESCE(UPPER(TRIM(record_type)), ''), 50) AS record_type"));
    }

    #[test]
    fn textual_dispatch_reports_unknown_names() {
        let registry = StatementRegistry::standard();
        assert!(registry.resolve_tag("dim_date", "insert").is_ok());
        assert_eq!(
            registry.resolve_tag("dim_dates", "insert"),
            Err(DispatchError::Catalog(CatalogError::UnknownTable("dim_dates".into())))
        );
        assert_eq!(
            registry.resolve_tag("dim_date", "upsert"),
            Err(DispatchError::Catalog(CatalogError::UnknownAction("upsert".into())))
        );
        assert!(matches!(
            registry.resolve_tag("stage_vehicle", "insert"),
            Err(DispatchError::Unresolved { .. })
        ));
    }

    #[test]
    fn validate_stops_at_first_missing_pair() {
        let registry = StatementRegistry::standard();
        assert!(registry
            .validate([(Table::DimDate, Action::Insert), (Table::DimVehicle, Action::ZeroSk)])
            .is_ok());
        assert!(registry
            .validate([(Table::DimDate, Action::Insert), (Table::WorkFact, Action::Insert)])
            .is_err());
    }
}
