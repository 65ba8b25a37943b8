//! Statement text for every warehouse relation.

use pvdw_core::{
    keys::OTHER_COLOR, UNKNOWN_AGENCY_KEY, UNKNOWN_KEY, UNKNOWN_STATE_KEY,
};

pub const STAGE_ISSUINGAGENCY_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS stage_issuingagency
(
    agency_code VARCHAR(255),
    agency_name VARCHAR(255)
)"#;

pub const STAGE_PRECINCT_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS stage_precinct
(
    precinct_code VARCHAR(255),
    borough VARCHAR(255),
    precinct_name VARCHAR(255),
    precinct_address VARCHAR(255),
    flag_below_96th VARCHAR(255)
)"#;

pub const STAGE_REGISTRATIONSTATE_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS stage_registrationstate
(
    geographic_area VARCHAR(255),
    postal_code VARCHAR(255),
    total_resident_population VARCHAR(255)
)"#;

pub const STAGE_VEHICLE_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS stage_vehicle
(
    record_type VARCHAR(255),
    make VARCHAR(255),
    body_type VARCHAR(255),
    registration_class VARCHAR(255)
)"#;

pub const STAGE_VIOLATION_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS stage_violation
(
    violation_code VARCHAR(255),
    violation_description VARCHAR(255),
    fine_amount_96th_st_below VARCHAR(255),
    fine_amount_other VARCHAR(255)
)"#;

pub const STAGE_PARKING_VIOLATIONS_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS stage_parking_violations
(
    summons_number VARCHAR(255),
    plate_id VARCHAR(255),
    registration_state VARCHAR(255),
    plate_type VARCHAR(255),
    issue_date VARCHAR(255),
    violation_code VARCHAR(255),
    vehicle_body_type VARCHAR(255),
    vehicle_make VARCHAR(255),
    issuing_agency VARCHAR(255),
    street_code1 VARCHAR(255),
    street_code2 VARCHAR(255),
    street_code3 VARCHAR(255),
    vehicle_expiration_date VARCHAR(255),
    violation_location VARCHAR(255),
    violation_precinct VARCHAR(255),
    issuer_precinct VARCHAR(255),
    issuer_code VARCHAR(255),
    issuer_command VARCHAR(255),
    issuer_squad VARCHAR(255),
    violation_time VARCHAR(255),
    violation_county VARCHAR(255),
    violation_in_front_of_or_opposite VARCHAR(255),
    house_number VARCHAR(255),
    street_name VARCHAR(255),
    date_first_observed VARCHAR(255),
    law_section VARCHAR(255),
    sub_division VARCHAR(255),
    days_parking_in_effect VARCHAR(255),
    from_hours_in_effect VARCHAR(255),
    to_hours_in_effect VARCHAR(255),
    vehicle_color VARCHAR(255),
    unregistered_vehicle VARCHAR(255),
    vehicle_year VARCHAR(255),
    meter_number VARCHAR(255),
    feet_from_curb VARCHAR(255),
    intersecting_street VARCHAR(255),
    time_first_observed VARCHAR(255),
    violation_legal_code VARCHAR(255),
    violation_description VARCHAR(255),
    violation_post_code VARCHAR(255),
    vehicle_color_standardized VARCHAR(255)
)"#;

pub const DIM_REGISTRATIONSTATE_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS dim_registrationstate
(
    registration_state_key CHAR(2) NOT NULL,
    state_name VARCHAR(255),
    postal_code CHAR(2)
)"#;

pub const DIM_VIOLATION_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS dim_violation
(
    violation_key INT NOT NULL,
    violation_description VARCHAR(255),
    fine_amount_96th_st_below INT,
    fine_amount_other INT
)"#;

pub const DIM_PRECINCT_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS dim_precinct
(
    precinct_key INT NOT NULL,
    precinct_name VARCHAR(255),
    precinct_address VARCHAR(255),
    borough_name VARCHAR(255),
    is_below_96th BOOLEAN NOT NULL DEFAULT FALSE
)"#;

pub const DIM_ISSUINGAGENCY_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS dim_issuingagency
(
    issuing_agency_key VARCHAR(2) NOT NULL,
    agency_name VARCHAR(255)
)"#;

pub const DIM_BOROUGH_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS dim_borough
(
    borough_key INT NOT NULL,
    borough_name VARCHAR(255),
    min_precinct_code INT
)"#;

pub const DIM_VEHICLE_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS dim_vehicle
(
    vehicle_key INT NOT NULL,
    record_type VARCHAR(50) NOT NULL,
    make VARCHAR(50) NOT NULL,
    body_style VARCHAR(50) NOT NULL,
    color_code VARCHAR(3) NOT NULL,
    color_description VARCHAR(50)
)"#;

pub const DIM_TIME_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS dim_time
(
    time_key INT NOT NULL,
    time_code CHAR(4),
    display_time TIMESTAMP,
    hour_number INT,
    minute_number INT,
    am_pm CHAR(2),
    military_time_hour_number INT
)"#;

pub const DIM_DATE_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS dim_date
(
    date_key INT NOT NULL,
    calendar_date DATE,
    year_number INT,
    month_number INT,
    day_number INT,
    quarter_number INT,
    day_of_the_week VARCHAR(10),
    is_weekday BOOLEAN
)"#;

pub const FACT_PARKINGVIOLATION_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS fact_parkingviolation
(
    summons_number BIGINT NOT NULL,
    plate_id VARCHAR(255),
    registration_state_key CHAR(2) NOT NULL,
    plate_type CHAR(3) NOT NULL,
    fine_amount INT NOT NULL,
    issue_date_key INT NOT NULL,
    violation_key INT NOT NULL,
    vehicle_key INT NOT NULL,
    issuing_agency_key VARCHAR(2) NOT NULL,
    vehicle_expiration_date_key INT NOT NULL,
    violation_precinct_key INT NOT NULL,
    issuer_precinct_key INT NOT NULL,
    borough_key INT NOT NULL,
    time_key INT NOT NULL,
    violation_address VARCHAR(255),
    is_unregistered_vehicle BOOLEAN NOT NULL,
    vehicle_year INT
)"#;

pub const WORK_BOROUGH_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS work_borough
(
    borough_key INT NOT NULL,
    borough_name VARCHAR(255) NOT NULL,
    min_precinct_code INT NOT NULL
)"#;

pub const WORK_COLOR_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS work_color
(
    color_code VARCHAR(3) NOT NULL,
    color_description VARCHAR(50) NOT NULL
)"#;

pub const WORK_TIME_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS work_time
(
    time_key INT NOT NULL,
    time_code CHAR(4) NOT NULL,
    display_time TIMESTAMP NOT NULL,
    hour_number INT NOT NULL,
    minute_number INT NOT NULL,
    am_pm CHAR(2) NOT NULL,
    military_time_hour_number INT NOT NULL
)"#;

pub const WORK_DATE_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS work_date
(
    date_key INT NOT NULL,
    calendar_date DATE NOT NULL,
    year_number INT NOT NULL,
    month_number INT NOT NULL,
    day_number INT NOT NULL,
    quarter_number INT NOT NULL,
    day_of_the_week VARCHAR(10) NOT NULL,
    is_weekday BOOLEAN NOT NULL
)"#;

pub const WORK_FACT_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS work_fact
(
    load_seq BIGINT NOT NULL,
    summons_number BIGINT NOT NULL,
    plate_id VARCHAR(255),
    registration_state_key CHAR(2) NOT NULL,
    plate_type CHAR(3) NOT NULL,
    fine_amount INT NOT NULL,
    issue_date_key INT NOT NULL,
    violation_key INT NOT NULL,
    issuing_agency_key VARCHAR(2) NOT NULL,
    vehicle_expiration_date_key INT NOT NULL,
    violation_precinct_key INT NOT NULL,
    issuer_precinct_key INT NOT NULL,
    borough_key INT NOT NULL,
    time_key INT NOT NULL,
    violation_address VARCHAR(255),
    is_unregistered_vehicle BOOLEAN NOT NULL,
    vehicle_year INT,
    vehicle_make VARCHAR(50) NOT NULL,
    vehicle_body_type VARCHAR(50) NOT NULL,
    vehicle_color_code VARCHAR(3) NOT NULL
)"#;

pub const DIM_REGISTRATIONSTATE_INSERT: &str = r#"
INSERT INTO dim_registrationstate (registration_state_key, state_name, postal_code)
SELECT UPPER(TRIM(postal_code)), MIN(TRIM(geographic_area)), UPPER(TRIM(postal_code))
  FROM stage_registrationstate
 WHERE LENGTH(TRIM(postal_code)) = 2
 GROUP BY UPPER(TRIM(postal_code))"#;

pub const DIM_VIOLATION_INSERT: &str = r#"
INSERT INTO dim_violation (violation_key, violation_description, fine_amount_96th_st_below, fine_amount_other)
SELECT CAST(TRIM(violation_code) AS INT),
       MIN(TRIM(violation_description)),
       MAX(CAST(NULLIF(REGEXP_REPLACE(fine_amount_96th_st_below, '[^0-9]', '', 'g'), '') AS INT)),
       MAX(CAST(NULLIF(REGEXP_REPLACE(fine_amount_other, '[^0-9]', '', 'g'), '') AS INT))
  FROM stage_violation
 WHERE TRIM(violation_code) ~ '^[0-9]{1,9}$'
 GROUP BY CAST(TRIM(violation_code) AS INT)"#;

pub const DIM_PRECINCT_INSERT: &str = r#"
INSERT INTO dim_precinct (precinct_key, precinct_name, precinct_address, borough_name, is_below_96th)
SELECT CAST(TRIM(precinct_code) AS INT),
       MIN(TRIM(precinct_name)),
       MIN(TRIM(precinct_address)),
       MIN(TRIM(borough)),
       BOOL_OR(UPPER(TRIM(flag_below_96th)) IN ('Y', 'YES', '1', 'T', 'TRUE'))
  FROM stage_precinct
 WHERE TRIM(precinct_code) ~ '^[0-9]{1,9}$'
 GROUP BY CAST(TRIM(precinct_code) AS INT)"#;

pub const DIM_ISSUINGAGENCY_INSERT: &str = r#"
INSERT INTO dim_issuingagency (issuing_agency_key, agency_name)
SELECT UPPER(TRIM(agency_code)), MIN(TRIM(agency_name))
  FROM stage_issuingagency
 WHERE LENGTH(TRIM(agency_code)) BETWEEN 1 AND 2
 GROUP BY UPPER(TRIM(agency_code))"#;

pub const DIM_BOROUGH_INSERT: &str = r#"
INSERT INTO dim_borough (borough_key, borough_name, min_precinct_code)
SELECT borough_key, borough_name, min_precinct_code
  FROM work_borough"#;

pub const DIM_VEHICLE_INSERT: &str = r#"
INSERT INTO dim_vehicle (vehicle_key, record_type, make, body_style, color_code, color_description)
WITH body_style AS (
    SELECT DISTINCT LEFT(UPPER(TRIM(vehicle_body_type)), 50) AS body_style
      FROM stage_parking_violations
     WHERE NULLIF(TRIM(vehicle_body_type), '') IS NOT NULL
    UNION
    SELECT DISTINCT LEFT(UPPER(TRIM(body_type)), 50)
      FROM stage_vehicle
     WHERE NULLIF(TRIM(body_type), '') IS NOT NULL
),
vehicle_make AS (
    SELECT DISTINCT LEFT(COALESCE(UPPER(TRIM(record_type)), ''), 50) AS record_type,
                    LEFT(UPPER(TRIM(make)), 50) AS make
      FROM stage_vehicle
     WHERE NULLIF(TRIM(make), '') IS NOT NULL
),
candidate AS (
    SELECT vm.record_type, vm.make, bs.body_style, c.color_code, c.color_description
      FROM vehicle_make vm
     CROSS JOIN body_style bs
     CROSS JOIN work_color c
),
fresh AS (
    SELECT cand.*
      FROM candidate cand
      LEFT JOIN dim_vehicle dv
        ON dv.record_type = cand.record_type
       AND dv.make = cand.make
       AND dv.body_style = cand.body_style
       AND dv.color_code = cand.color_code
     WHERE dv.vehicle_key IS NULL
)
SELECT (SELECT COALESCE(MAX(vehicle_key), 0) FROM dim_vehicle)
         + ROW_NUMBER() OVER (ORDER BY make, body_style, color_code, record_type),
       record_type, make, body_style, color_code, color_description
  FROM fresh"#;

pub const DIM_TIME_INSERT: &str = r#"
INSERT INTO dim_time (time_key, time_code, display_time, hour_number, minute_number, am_pm, military_time_hour_number)
SELECT DISTINCT w.time_key, w.time_code, w.display_time, w.hour_number, w.minute_number, w.am_pm,
       w.military_time_hour_number
  FROM work_time w
  LEFT JOIN dim_time d ON d.time_key = w.time_key
 WHERE d.time_key IS NULL"#;

pub const DIM_DATE_INSERT: &str = r#"
INSERT INTO dim_date (date_key, calendar_date, year_number, month_number, day_number, quarter_number,
                      day_of_the_week, is_weekday)
SELECT DISTINCT w.date_key, w.calendar_date, w.year_number, w.month_number, w.day_number, w.quarter_number,
       w.day_of_the_week, w.is_weekday
  FROM work_date w
  LEFT JOIN dim_date d ON d.date_key = w.date_key
 WHERE d.date_key IS NULL"#;

pub const FACT_PARKINGVIOLATION_INSERT: &str = r#"
INSERT INTO fact_parkingviolation (summons_number, plate_id, registration_state_key, plate_type, fine_amount,
                                   issue_date_key, violation_key, vehicle_key, issuing_agency_key,
                                   vehicle_expiration_date_key, violation_precinct_key, issuer_precinct_key,
                                   borough_key, time_key, violation_address, is_unregistered_vehicle, vehicle_year)
SELECT w.summons_number, w.plate_id, w.registration_state_key, w.plate_type, w.fine_amount,
       w.issue_date_key, w.violation_key, COALESCE(v.vehicle_key, 0), w.issuing_agency_key,
       w.vehicle_expiration_date_key, w.violation_precinct_key, w.issuer_precinct_key,
       w.borough_key, w.time_key, w.violation_address, w.is_unregistered_vehicle, w.vehicle_year
  FROM (SELECT DISTINCT ON (summons_number) *
          FROM work_fact
         ORDER BY summons_number, load_seq) w
  LEFT JOIN (SELECT make, body_style, color_code, MIN(vehicle_key) AS vehicle_key
               FROM dim_vehicle
              GROUP BY make, body_style, color_code) v
    ON v.make = w.vehicle_make
   AND v.body_style = w.vehicle_body_type
   AND v.color_code = w.vehicle_color_code
  LEFT JOIN fact_parkingviolation f ON f.summons_number = w.summons_number
 WHERE f.summons_number IS NULL"#;

pub fn zero_member_registrationstate() -> String {
    format!(
        "INSERT INTO dim_registrationstate (registration_state_key, state_name, postal_code) \
         SELECT '{UNKNOWN_STATE_KEY}', 'Unknown', '{UNKNOWN_STATE_KEY}' \
         WHERE NOT EXISTS (SELECT 1 FROM dim_registrationstate WHERE registration_state_key = '{UNKNOWN_STATE_KEY}')"
    )
}

pub fn zero_member_violation() -> String {
    format!(
        "INSERT INTO dim_violation (violation_key, violation_description, fine_amount_96th_st_below, fine_amount_other) \
         SELECT {UNKNOWN_KEY}, 'Unknown', 0, 0 \
         WHERE NOT EXISTS (SELECT 1 FROM dim_violation WHERE violation_key = {UNKNOWN_KEY})"
    )
}

pub fn zero_member_precinct() -> String {
    format!(
        "INSERT INTO dim_precinct (precinct_key, precinct_name, precinct_address, borough_name, is_below_96th) \
         SELECT {UNKNOWN_KEY}, 'Unknown', NULL, NULL, FALSE \
         WHERE NOT EXISTS (SELECT 1 FROM dim_precinct WHERE precinct_key = {UNKNOWN_KEY})"
    )
}

pub fn zero_member_issuingagency() -> String {
    format!(
        "INSERT INTO dim_issuingagency (issuing_agency_key, agency_name) \
         SELECT '{UNKNOWN_AGENCY_KEY}', 'Unknown' \
         WHERE NOT EXISTS (SELECT 1 FROM dim_issuingagency WHERE issuing_agency_key = '{UNKNOWN_AGENCY_KEY}')"
    )
}

pub fn zero_member_borough() -> String {
    format!(
        "INSERT INTO dim_borough (borough_key, borough_name, min_precinct_code) \
         SELECT {UNKNOWN_KEY}, 'Unknown', NULL \
         WHERE NOT EXISTS (SELECT 1 FROM dim_borough WHERE borough_key = {UNKNOWN_KEY})"
    )
}

pub fn zero_member_vehicle() -> String {
    format!(
        "INSERT INTO dim_vehicle (vehicle_key, record_type, make, body_style, color_code, color_description) \
         SELECT {UNKNOWN_KEY}, 'UNKNOWN', 'UNKNOWN', 'UNKNOWN', '{code}', '{description}' \
         WHERE NOT EXISTS (SELECT 1 FROM dim_vehicle WHERE vehicle_key = {UNKNOWN_KEY})",
        code = OTHER_COLOR.code,
        description = OTHER_COLOR.description,
    )
}
