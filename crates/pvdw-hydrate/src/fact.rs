//! Fact hydration: resolve every staged violation against the dimensions, then promote
//! the unseen summons numbers into `fact_parkingviolation`.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Context};
use pvdw_core::keys::{color_code, date_key, decode_expiration_code, decode_issue_date, decode_time_opt};
use pvdw_core::{
    clean_text, parse_code, Action, FactCandidate, StagedViolation, Table, INVALID_PLATE_TYPE,
    UNKNOWN_AGENCY_KEY, UNKNOWN_KEY, UNKNOWN_PLATE_TYPE, UNKNOWN_STATE_KEY,
    UNREGISTERED_STATE_CODE, VEHICLE_TEXT_WIDTH,
};
use pvdw_storage::{bulk_insert, StatementRegistry, Warehouse};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{Connection, Row};
use tracing::{debug, info, warn};

const STAGE_CURSOR: &str = "stage_violation_cursor";

const STAGED_COLUMNS: [&str; 18] = [
    "summons_number",
    "plate_id",
    "registration_state",
    "plate_type",
    "issue_date",
    "violation_code",
    "vehicle_body_type",
    "vehicle_make",
    "issuing_agency",
    "vehicle_expiration_date",
    "violation_precinct",
    "issuer_precinct",
    "violation_time",
    "house_number",
    "street_name",
    "vehicle_color",
    "unregistered_vehicle",
    "vehicle_year",
];

const WORK_FACT_COLUMNS: [&str; 20] = [
    "load_seq",
    "summons_number",
    "plate_id",
    "registration_state_key",
    "plate_type",
    "fine_amount",
    "issue_date_key",
    "violation_key",
    "issuing_agency_key",
    "vehicle_expiration_date_key",
    "violation_precinct_key",
    "issuer_precinct_key",
    "borough_key",
    "time_key",
    "violation_address",
    "is_unregistered_vehicle",
    "vehicle_year",
    "vehicle_make",
    "vehicle_body_type",
    "vehicle_color_code",
];

/// House-number values the source uses to mean "none".
const MISSING_HOUSE_NUMBERS: [&str; 5] = ["NA", "N/A", "NULL", "NONE", "-"];
const UNREGISTERED_FLAGS: [&str; 5] = ["1", "Y", "YES", "TRUE", "T"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViolationFines {
    pub below_96th: Option<i32>,
    pub other: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrecinctRef {
    pub is_below_96th: bool,
    pub borough_key: i32,
}

/// In-memory view of the dimension members a violation can reference.
#[derive(Debug, Clone, Default)]
pub struct DimensionLookups {
    states: HashSet<String>,
    violations: HashMap<i32, ViolationFines>,
    precincts: HashMap<i32, PrecinctRef>,
    agencies: HashSet<String>,
}

impl DimensionLookups {
    pub async fn load(warehouse: &mut Warehouse) -> anyhow::Result<Self> {
        let mut lookups = Self::default();

        for row in warehouse
            .fetch_all("SELECT registration_state_key FROM dim_registrationstate")
            .await?
        {
            let key: String = row.try_get("registration_state_key")?;
            lookups.states.insert(key.trim().to_string());
        }

        for row in warehouse
            .fetch_all(
                "SELECT violation_key, fine_amount_96th_st_below, fine_amount_other FROM dim_violation",
            )
            .await?
        {
            lookups.violations.insert(
                row.try_get("violation_key")?,
                ViolationFines {
                    below_96th: row.try_get("fine_amount_96th_st_below")?,
                    other: row.try_get("fine_amount_other")?,
                },
            );
        }

        for row in warehouse
            .fetch_all(
                r#"
                SELECT p.precinct_key, p.is_below_96th, COALESCE(b.borough_key, 0) AS borough_key
                  FROM dim_precinct p
                  LEFT JOIN (SELECT UPPER(borough_name) AS borough_name, MIN(borough_key) AS borough_key
                               FROM dim_borough
                              WHERE borough_key <> 0
                              GROUP BY UPPER(borough_name)) b
                    ON b.borough_name = UPPER(TRIM(p.borough_name))
                "#,
            )
            .await?
        {
            lookups.precincts.insert(
                row.try_get("precinct_key")?,
                PrecinctRef {
                    is_below_96th: row.try_get("is_below_96th")?,
                    borough_key: row.try_get("borough_key")?,
                },
            );
        }

        for row in warehouse
            .fetch_all("SELECT issuing_agency_key FROM dim_issuingagency")
            .await?
        {
            let key: String = row.try_get("issuing_agency_key")?;
            lookups.agencies.insert(key.trim().to_string());
        }

        debug!(
            states = lookups.states.len(),
            violations = lookups.violations.len(),
            precincts = lookups.precincts.len(),
            agencies = lookups.agencies.len(),
            "dimension lookups loaded"
        );
        Ok(lookups)
    }

    pub fn with_state(mut self, key: &str) -> Self {
        self.states.insert(key.to_string());
        self
    }

    pub fn with_violation(mut self, key: i32, fines: ViolationFines) -> Self {
        self.violations.insert(key, fines);
        self
    }

    pub fn with_precinct(mut self, key: i32, precinct: PrecinctRef) -> Self {
        self.precincts.insert(key, precinct);
        self
    }

    pub fn with_agency(mut self, key: &str) -> Self {
        self.agencies.insert(key.to_string());
        self
    }
}

/// Pure per-row resolution; the vehicle key is left to the promoting join.
#[derive(Debug, Clone)]
pub struct FactResolver {
    lookups: DimensionLookups,
}

impl FactResolver {
    pub fn new(lookups: DimensionLookups) -> Self {
        Self { lookups }
    }

    /// `None` when the row has no usable summons number.
    pub fn resolve(&self, row: &StagedViolation) -> Option<FactCandidate> {
        let summons_number = parse_code(row.summons_number.as_deref())?;

        let violation_key = self.member_key(row.violation_code.as_deref(), |k| {
            self.lookups.violations.contains_key(&k)
        });
        let violation_precinct_key = self.member_key(row.violation_precinct.as_deref(), |k| {
            self.lookups.precincts.contains_key(&k)
        });
        let issuer_precinct_key = self.member_key(row.issuer_precinct.as_deref(), |k| {
            self.lookups.precincts.contains_key(&k)
        });

        let precinct = self
            .lookups
            .precincts
            .get(&violation_precinct_key)
            .copied()
            .unwrap_or_default();
        let fines = self
            .lookups
            .violations
            .get(&violation_key)
            .copied()
            .unwrap_or_default();
        let fine_amount = if precinct.is_below_96th {
            fines.below_96th
        } else {
            fines.other
        }
        .unwrap_or(0);

        let registration_state = clean_text(row.registration_state.as_deref()).map(str::to_ascii_uppercase);
        let is_unregistered_state = registration_state.as_deref() == Some(UNREGISTERED_STATE_CODE);

        Some(FactCandidate {
            summons_number,
            plate_id: clean_text(row.plate_id.as_deref()).map(str::to_string),
            registration_state_key: self.state_key(registration_state.as_deref()),
            plate_type: plate_type(row.plate_type.as_deref()),
            fine_amount,
            issue_date_key: date_key(decode_issue_date(row.issue_date.as_deref())),
            violation_key,
            issuing_agency_key: self.agency_key(row.issuing_agency.as_deref()),
            vehicle_expiration_date_key: date_key(decode_expiration_code(
                row.vehicle_expiration_date.as_deref(),
            )),
            violation_precinct_key,
            issuer_precinct_key,
            borough_key: precinct.borough_key,
            time_key: decode_time_opt(row.violation_time.as_deref()).time_key,
            violation_address: violation_address(
                row.house_number.as_deref(),
                row.street_name.as_deref(),
            ),
            is_unregistered_vehicle: is_unregistered_state
                || is_flag_set(row.unregistered_vehicle.as_deref()),
            vehicle_year: parse_code(row.vehicle_year.as_deref())
                .filter(|y| *y != 0)
                .and_then(|y| i32::try_from(y).ok()),
            vehicle_make: vehicle_text(row.vehicle_make.as_deref()),
            vehicle_body_type: vehicle_text(row.vehicle_body_type.as_deref()),
            vehicle_color_code: color_code(row.vehicle_color.as_deref()).to_string(),
        })
    }

    fn member_key(&self, raw: Option<&str>, known: impl Fn(i32) -> bool) -> i32 {
        parse_code(raw)
            .and_then(|v| i32::try_from(v).ok())
            .filter(|k| known(*k))
            .unwrap_or(UNKNOWN_KEY)
    }

    fn state_key(&self, state: Option<&str>) -> String {
        match state {
            Some(s) if s != UNREGISTERED_STATE_CODE && self.lookups.states.contains(s) => s.to_string(),
            _ => UNKNOWN_STATE_KEY.to_string(),
        }
    }

    fn agency_key(&self, raw: Option<&str>) -> String {
        match clean_text(raw).map(str::to_ascii_uppercase) {
            Some(code) if self.lookups.agencies.contains(&code) => code,
            _ => UNKNOWN_AGENCY_KEY.to_string(),
        }
    }
}

fn plate_type(raw: Option<&str>) -> String {
    match clean_text(raw).map(str::to_ascii_uppercase) {
        Some(code) if code != INVALID_PLATE_TYPE => code.chars().take(3).collect(),
        _ => UNKNOWN_PLATE_TYPE.to_string(),
    }
}

fn violation_address(house_number: Option<&str>, street_name: Option<&str>) -> Option<String> {
    let street = clean_text(street_name)?;
    let house = clean_text(house_number).filter(|h| {
        !MISSING_HOUSE_NUMBERS
            .iter()
            .any(|missing| h.eq_ignore_ascii_case(missing))
    });
    let address = match house {
        Some(house) => format!("{house} {street}"),
        None => street.to_string(),
    };
    Some(address.chars().take(255).collect())
}

fn is_flag_set(raw: Option<&str>) -> bool {
    clean_text(raw)
        .map(|v| UNREGISTERED_FLAGS.iter().any(|f| v.eq_ignore_ascii_case(f)))
        .unwrap_or(false)
}

/// Upper-cased and cut to the vehicle dimension's column width, as `DIM_VEHICLE_INSERT` does.
fn vehicle_text(raw: Option<&str>) -> String {
    clean_text(raw)
        .map(|v| v.to_ascii_uppercase().chars().take(VEHICLE_TEXT_WIDTH).collect())
        .unwrap_or_default()
}

fn staged_from_row(row: &PgRow) -> anyhow::Result<StagedViolation> {
    Ok(StagedViolation {
        summons_number: row.try_get("summons_number")?,
        plate_id: row.try_get("plate_id")?,
        registration_state: row.try_get("registration_state")?,
        plate_type: row.try_get("plate_type")?,
        issue_date: row.try_get("issue_date")?,
        violation_code: row.try_get("violation_code")?,
        vehicle_body_type: row.try_get("vehicle_body_type")?,
        vehicle_make: row.try_get("vehicle_make")?,
        issuing_agency: row.try_get("issuing_agency")?,
        vehicle_expiration_date: row.try_get("vehicle_expiration_date")?,
        violation_precinct: row.try_get("violation_precinct")?,
        issuer_precinct: row.try_get("issuer_precinct")?,
        violation_time: row.try_get("violation_time")?,
        house_number: row.try_get("house_number")?,
        street_name: row.try_get("street_name")?,
        vehicle_color: row.try_get("vehicle_color")?,
        unregistered_vehicle: row.try_get("unregistered_vehicle")?,
        vehicle_year: row.try_get("vehicle_year")?,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FactLoad {
    pub staged_rows: u64,
    pub skipped_rows: u64,
    pub candidates: u64,
    pub inserted: u64,
}

pub struct FactHydrator<'a> {
    registry: &'a StatementRegistry,
    batch_size: usize,
}

impl<'a> FactHydrator<'a> {
    pub fn new(registry: &'a StatementRegistry, batch_size: usize) -> Self {
        Self {
            registry,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn hydrate(&self, warehouse: &mut Warehouse, table: Table) -> anyhow::Result<FactLoad> {
        if table != Table::FactParkingViolation {
            bail!("no fact hydrator for {table}");
        }

        let resolver = FactResolver::new(DimensionLookups::load(warehouse).await?);
        warehouse
            .dispatch(self.registry, Table::WorkFact, Action::Truncate)
            .await?;

        let mut load = self.resolve_staged(warehouse, &resolver).await?;
        load.inserted = warehouse.dispatch(self.registry, table, Action::Insert).await?;
        info!(
            staged = load.staged_rows,
            skipped = load.skipped_rows,
            inserted = load.inserted,
            "facts hydrated"
        );
        Ok(load)
    }

    /// Streams staging through a server-side cursor into `work_fact`, one batch at a time.
    async fn resolve_staged(
        &self,
        warehouse: &mut Warehouse,
        resolver: &FactResolver,
    ) -> anyhow::Result<FactLoad> {
        let mut load = FactLoad::default();
        let mut tx = warehouse
            .connection()
            .begin()
            .await
            .context("opening staging read transaction")?;

        let declare = format!(
            "DECLARE {STAGE_CURSOR} NO SCROLL CURSOR FOR SELECT {} FROM {}",
            STAGED_COLUMNS.join(", "),
            Table::StageParkingViolations
        );
        sqlx::query(&declare)
            .execute(&mut *tx)
            .await
            .context("declaring staging cursor")?;

        let fetch = format!("FETCH FORWARD {} FROM {STAGE_CURSOR}", self.batch_size);
        let mut load_seq: i64 = 0;
        loop {
            let rows = sqlx::query(&fetch)
                .fetch_all(&mut *tx)
                .await
                .context("fetching staged violations")?;
            if rows.is_empty() {
                break;
            }

            let mut batch: Vec<(i64, FactCandidate)> = Vec::with_capacity(rows.len());
            for row in &rows {
                load.staged_rows += 1;
                let staged = staged_from_row(row)?;
                match resolver.resolve(&staged) {
                    Some(candidate) => {
                        load_seq += 1;
                        batch.push((load_seq, candidate));
                    }
                    None => {
                        load.skipped_rows += 1;
                        warn!(summons_number = ?staged.summons_number, "skipping violation without a usable summons number");
                    }
                }
            }

            load.candidates += bulk_insert(
                &mut *tx,
                Table::WorkFact,
                &WORK_FACT_COLUMNS,
                &batch,
                |mut b, (seq, c)| {
                    b.push_bind(*seq)
                        .push_bind(c.summons_number)
                        .push_bind(c.plate_id.as_deref())
                        .push_bind(c.registration_state_key.as_str())
                        .push_bind(c.plate_type.as_str())
                        .push_bind(c.fine_amount)
                        .push_bind(c.issue_date_key)
                        .push_bind(c.violation_key)
                        .push_bind(c.issuing_agency_key.as_str())
                        .push_bind(c.vehicle_expiration_date_key)
                        .push_bind(c.violation_precinct_key)
                        .push_bind(c.issuer_precinct_key)
                        .push_bind(c.borough_key)
                        .push_bind(c.time_key)
                        .push_bind(c.violation_address.as_deref())
                        .push_bind(c.is_unregistered_vehicle)
                        .push_bind(c.vehicle_year)
                        .push_bind(c.vehicle_make.as_str())
                        .push_bind(c.vehicle_body_type.as_str())
                        .push_bind(c.vehicle_color_code.as_str());
                },
            )
            .await?;
            debug!(rows = rows.len(), candidates = load.candidates, "fact batch resolved");
        }

        sqlx::query(&format!("CLOSE {STAGE_CURSOR}"))
            .execute(&mut *tx)
            .await
            .context("closing staging cursor")?;
        tx.commit().await.context("committing fact candidates")?;
        Ok(load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvdw_core::keys::EPOCH_DATE_KEY;

    fn lookups() -> DimensionLookups {
        DimensionLookups::default()
            .with_state("NY")
            .with_state("NJ")
            .with_state(UNKNOWN_STATE_KEY)
            .with_violation(
                14,
                ViolationFines {
                    below_96th: Some(115),
                    other: Some(115),
                },
            )
            .with_violation(
                21,
                ViolationFines {
                    below_96th: Some(65),
                    other: Some(45),
                },
            )
            .with_violation(
                99,
                ViolationFines {
                    below_96th: None,
                    other: None,
                },
            )
            .with_precinct(
                1,
                PrecinctRef {
                    is_below_96th: true,
                    borough_key: 1,
                },
            )
            .with_precinct(
                40,
                PrecinctRef {
                    is_below_96th: false,
                    borough_key: 2,
                },
            )
            .with_agency("P")
            .with_agency("T")
    }

    fn mk_row(summons: &str) -> StagedViolation {
        StagedViolation {
            summons_number: Some(summons.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn reference_violation_resolves_every_key() {
        let resolver = FactResolver::new(lookups());
        let row = StagedViolation {
            summons_number: Some("123".into()),
            violation_time: Some("1130A".into()),
            issue_date: Some("2021-01-05".into()),
            vehicle_make: Some("FORD".into()),
            vehicle_body_type: Some("SUBN".into()),
            vehicle_color: Some("BLK".into()),
            violation_precinct: Some("1".into()),
            registration_state: Some("99".into()),
            ..Default::default()
        };
        let fact = resolver.resolve(&row).expect("resolves");
        assert_eq!(fact.summons_number, 123);
        assert_eq!(fact.time_key, 11 * 60 + 30);
        assert_eq!(fact.issue_date_key, 20210105);
        assert_eq!(fact.registration_state_key, "UK");
        assert_eq!(fact.vehicle_make, "FORD");
        assert_eq!(fact.vehicle_body_type, "SUBN");
        assert_eq!(fact.vehicle_color_code, "BK");
        assert_eq!(fact.violation_precinct_key, 1);
        assert_eq!(fact.borough_key, 1);
        assert!(fact.is_unregistered_vehicle);
        assert_eq!(fact.vehicle_expiration_date_key, EPOCH_DATE_KEY);
    }

    #[test]
    fn fine_depends_on_precinct_location() {
        let resolver = FactResolver::new(lookups());
        let mut row = mk_row("1");
        row.violation_code = Some("21".into());

        row.violation_precinct = Some("1".into());
        assert_eq!(resolver.resolve(&row).unwrap().fine_amount, 65);

        row.violation_precinct = Some("40".into());
        assert_eq!(resolver.resolve(&row).unwrap().fine_amount, 45);

        row.violation_code = Some("99".into());
        assert_eq!(resolver.resolve(&row).unwrap().fine_amount, 0);
    }

    #[test]
    fn unknown_codes_fall_back_to_zero_members() {
        let resolver = FactResolver::new(lookups());
        let row = StagedViolation {
            summons_number: Some("5".into()),
            violation_code: Some("77".into()),
            violation_precinct: Some("500".into()),
            issuer_precinct: Some("garbage".into()),
            issuing_agency: Some("Z".into()),
            registration_state: Some("ZZ".into()),
            ..Default::default()
        };
        let fact = resolver.resolve(&row).unwrap();
        assert_eq!(fact.violation_key, UNKNOWN_KEY);
        assert_eq!(fact.violation_precinct_key, UNKNOWN_KEY);
        assert_eq!(fact.issuer_precinct_key, UNKNOWN_KEY);
        assert_eq!(fact.borough_key, UNKNOWN_KEY);
        assert_eq!(fact.issuing_agency_key, UNKNOWN_AGENCY_KEY);
        assert_eq!(fact.registration_state_key, UNKNOWN_STATE_KEY);
        assert_eq!(fact.fine_amount, 0);
        assert_eq!(fact.time_key, 0);
        assert_eq!(fact.vehicle_color_code, "OTH");
        assert_eq!(fact.vehicle_make, "");
    }

    #[test]
    fn known_codes_pass_through() {
        let resolver = FactResolver::new(lookups());
        let row = StagedViolation {
            summons_number: Some("8713942291".into()),
            registration_state: Some(" nj ".into()),
            issuing_agency: Some("t".into()),
            violation_code: Some("14.0".into()),
            issuer_precinct: Some("40".into()),
            plate_type: Some("pass".into()),
            plate_id: Some(" ABC1234 ".into()),
            ..Default::default()
        };
        let fact = resolver.resolve(&row).unwrap();
        assert_eq!(fact.summons_number, 8_713_942_291);
        assert_eq!(fact.registration_state_key, "NJ");
        assert_eq!(fact.issuing_agency_key, "T");
        assert_eq!(fact.violation_key, 14);
        assert_eq!(fact.issuer_precinct_key, 40);
        assert_eq!(fact.plate_type, "PAS");
        assert_eq!(fact.plate_id.as_deref(), Some("ABC1234"));
        assert!(!fact.is_unregistered_vehicle);
    }

    #[test]
    fn plate_type_sentinels() {
        assert_eq!(plate_type(Some("999")), UNKNOWN_PLATE_TYPE);
        assert_eq!(plate_type(None), UNKNOWN_PLATE_TYPE);
        assert_eq!(plate_type(Some("COM")), "COM");
    }

    #[test]
    fn address_omits_missing_house_numbers() {
        assert_eq!(
            violation_address(Some("123"), Some("Main St")).as_deref(),
            Some("123 Main St")
        );
        assert_eq!(violation_address(None, Some("Main St")).as_deref(), Some("Main St"));
        assert_eq!(violation_address(Some("n/a"), Some("Main St")).as_deref(), Some("Main St"));
        assert_eq!(violation_address(Some("  "), Some("Main St")).as_deref(), Some("Main St"));
        assert_eq!(violation_address(Some("12"), None), None);
    }

    #[test]
    fn unregistered_flag_and_vehicle_year() {
        let resolver = FactResolver::new(lookups());
        let mut row = mk_row("9");
        row.unregistered_vehicle = Some("Y".into());
        row.vehicle_year = Some("0".into());
        let fact = resolver.resolve(&row).unwrap();
        assert!(fact.is_unregistered_vehicle);
        assert_eq!(fact.vehicle_year, None);

        row.unregistered_vehicle = Some("0".into());
        row.vehicle_year = Some("2015".into());
        let fact = resolver.resolve(&row).unwrap();
        assert!(!fact.is_unregistered_vehicle);
        assert_eq!(fact.vehicle_year, Some(2015));
    }

    #[test]
    fn overlong_vehicle_text_is_cut_to_column_width() {
        let resolver = FactResolver::new(lookups());
        let mut row = mk_row("10");
        row.vehicle_make = Some(format!(" {} ", "f".repeat(60)));
        row.vehicle_body_type = Some("s".repeat(VEHICLE_TEXT_WIDTH));
        let fact = resolver.resolve(&row).unwrap();
        assert_eq!(fact.vehicle_make, "F".repeat(VEHICLE_TEXT_WIDTH));
        assert_eq!(fact.vehicle_body_type, "S".repeat(VEHICLE_TEXT_WIDTH));
    }

    #[test]
    fn rows_without_summons_are_skipped() {
        let resolver = FactResolver::new(lookups());
        assert!(resolver.resolve(&StagedViolation::default()).is_none());
        assert!(resolver.resolve(&mk_row("not-a-number")).is_none());
    }
}
