//! Warehouse relation catalogue, command actions and pipeline phases.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("unknown table `{0}`")]
    UnknownTable(String),
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("unknown phase `{0}`")]
    UnknownPhase(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Staging,
    Dimension,
    Fact,
    Work,
}

/// Every relation the pipeline reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    StageIssuingAgency,
    StagePrecinct,
    StageRegistrationState,
    StageVehicle,
    StageViolation,
    StageParkingViolations,
    DimRegistrationState,
    DimViolation,
    DimPrecinct,
    DimIssuingAgency,
    DimBorough,
    DimVehicle,
    DimTime,
    DimDate,
    FactParkingViolation,
    WorkBorough,
    WorkColor,
    WorkTime,
    WorkDate,
    WorkFact,
}

impl Table {
    pub const ALL: [Table; 20] = [
        Table::StageIssuingAgency,
        Table::StagePrecinct,
        Table::StageRegistrationState,
        Table::StageVehicle,
        Table::StageViolation,
        Table::StageParkingViolations,
        Table::DimRegistrationState,
        Table::DimViolation,
        Table::DimPrecinct,
        Table::DimIssuingAgency,
        Table::DimBorough,
        Table::DimVehicle,
        Table::DimTime,
        Table::DimDate,
        Table::FactParkingViolation,
        Table::WorkBorough,
        Table::WorkColor,
        Table::WorkTime,
        Table::WorkDate,
        Table::WorkFact,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::StageIssuingAgency => "stage_issuingagency",
            Table::StagePrecinct => "stage_precinct",
            Table::StageRegistrationState => "stage_registrationstate",
            Table::StageVehicle => "stage_vehicle",
            Table::StageViolation => "stage_violation",
            Table::StageParkingViolations => "stage_parking_violations",
            Table::DimRegistrationState => "dim_registrationstate",
            Table::DimViolation => "dim_violation",
            Table::DimPrecinct => "dim_precinct",
            Table::DimIssuingAgency => "dim_issuingagency",
            Table::DimBorough => "dim_borough",
            Table::DimVehicle => "dim_vehicle",
            Table::DimTime => "dim_time",
            Table::DimDate => "dim_date",
            Table::FactParkingViolation => "fact_parkingviolation",
            Table::WorkBorough => "work_borough",
            Table::WorkColor => "work_color",
            Table::WorkTime => "work_time",
            Table::WorkDate => "work_date",
            Table::WorkFact => "work_fact",
        }
    }

    pub fn kind(self) -> TableKind {
        match self {
            Table::StageIssuingAgency
            | Table::StagePrecinct
            | Table::StageRegistrationState
            | Table::StageVehicle
            | Table::StageViolation
            | Table::StageParkingViolations => TableKind::Staging,
            Table::DimRegistrationState
            | Table::DimViolation
            | Table::DimPrecinct
            | Table::DimIssuingAgency
            | Table::DimBorough
            | Table::DimVehicle
            | Table::DimTime
            | Table::DimDate => TableKind::Dimension,
            Table::FactParkingViolation => TableKind::Fact,
            Table::WorkBorough
            | Table::WorkColor
            | Table::WorkTime
            | Table::WorkDate
            | Table::WorkFact => TableKind::Work,
        }
    }

    /// Object-store folder for a staging relation: the table name without its `stage_` prefix.
    pub fn object_prefix(self) -> Option<&'static str> {
        match self.kind() {
            TableKind::Staging => Some(self.name().trim_start_matches("stage_")),
            _ => None,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Table::ALL
            .iter()
            .copied()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| CatalogError::UnknownTable(s.to_string()))
    }
}

impl Serialize for Table {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Table {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Command action tags understood by the statement registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Drop,
    Truncate,
    Insert,
    #[serde(rename = "zerosk")]
    ZeroSk,
    Copy,
}

impl Action {
    pub fn tag(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Drop => "drop",
            Action::Truncate => "truncate",
            Action::Insert => "insert",
            Action::ZeroSk => "zerosk",
            Action::Copy => "copy",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Action {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Action::Create),
            "drop" => Ok(Action::Drop),
            "truncate" => Ok(Action::Truncate),
            "insert" => Ok(Action::Insert),
            "zerosk" => Ok(Action::ZeroSk),
            "copy" => Ok(Action::Copy),
            _ => Err(CatalogError::UnknownAction(s.to_string())),
        }
    }
}

/// Pipeline phases in their canonical execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    StageCsv,
    StageJson,
    SeedSentinels,
    ReplaceDimensions,
    AppendDimensions,
    Facts,
    Quality,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::StageCsv,
        Phase::StageJson,
        Phase::SeedSentinels,
        Phase::ReplaceDimensions,
        Phase::AppendDimensions,
        Phase::Facts,
        Phase::Quality,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::StageCsv => "stage_csv",
            Phase::StageJson => "stage_json",
            Phase::SeedSentinels => "seed_sentinels",
            Phase::ReplaceDimensions => "replace_dimensions",
            Phase::AppendDimensions => "append_dimensions",
            Phase::Facts => "facts",
            Phase::Quality => "quality",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Phase {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Phase::ALL
            .iter()
            .copied()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| CatalogError::UnknownPhase(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_round_trip_through_from_str() {
        for table in Table::ALL {
            assert_eq!(table.name().parse::<Table>(), Ok(table));
        }
        assert_eq!(
            "stage_nope".parse::<Table>(),
            Err(CatalogError::UnknownTable("stage_nope".into()))
        );
    }

    #[test]
    fn object_prefix_strips_stage_prefix_only_for_staging() {
        assert_eq!(Table::StageParkingViolations.object_prefix(), Some("parking_violations"));
        assert_eq!(Table::StageVehicle.object_prefix(), Some("vehicle"));
        assert_eq!(Table::DimVehicle.object_prefix(), None);
    }

    #[test]
    fn action_tags_parse_case_insensitively() {
        assert_eq!("ZEROSK".parse::<Action>(), Ok(Action::ZeroSk));
        assert_eq!("copy".parse::<Action>(), Ok(Action::Copy));
        assert!("merge".parse::<Action>().is_err());
    }

    #[test]
    fn phases_sort_in_execution_order() {
        let mut phases = vec![Phase::Quality, Phase::StageJson, Phase::Facts, Phase::StageCsv];
        phases.sort();
        assert_eq!(
            phases,
            vec![Phase::StageCsv, Phase::StageJson, Phase::Facts, Phase::Quality]
        );
    }
}
