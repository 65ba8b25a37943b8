//! End-to-end runs against a disposable PostgreSQL database.
//!
//! Set `PVDW_TEST_DATABASE_URL`; every relation in that database's catalogue is dropped.

use std::path::Path;

const LONG_MAKE_LEN: usize = 60;

use pvdw_core::{Phase, Table};
use pvdw_hydrate::config::{PipelineConfig, TransportConfig};
use pvdw_hydrate::{create_schema, Orchestrator};
use pvdw_storage::{ObjectStoreCredentials, StatementRegistry, Warehouse, WarehouseConfig};
use sqlx::Row;
use tempfile::tempdir;

fn write_extract(root: &Path, prefix: &str, file: &str, body: &str) {
    let dir = root.join(prefix);
    std::fs::create_dir_all(&dir).expect("extract dir");
    std::fs::write(dir.join(file), body).expect("extract file");
}

fn seed_extracts(root: &Path) {
    write_extract(
        root,
        "issuingagency",
        "agency.csv",
        // The quoted header spans two lines and must not reach COPY.
        "\"agency\ncode\",agency_name\nP,Police Department\nT,Traffic\n",
    );
    write_extract(
        root,
        "precinct",
        "precinct.csv",
        "precinct_code,borough,precinct_name,precinct_address,flag_below_96th\n\
         1,Manhattan,1st Precinct,16 Ericsson Place,Y\n\
         40,Bronx,40th Precinct,257 Alexander Ave,N\n",
    );
    write_extract(
        root,
        "registrationstate",
        "states.csv",
        "geographic_area,postal_code,total_resident_population\n\
         New York,NY,19453561\n\
         New Jersey,NJ,8882190\n",
    );
    write_extract(
        root,
        "vehicle",
        "vehicle.csv",
        &format!(
            "record_type,make,body_type,registration_class\nVEH,FORD,SUBN,PAS\nVEH,{},SUBN,PAS\n",
            "L".repeat(LONG_MAKE_LEN)
        ),
    );
    write_extract(
        root,
        "violation",
        "violation.csv",
        "violation_code,violation_description,fine_amount_96th_st_below,fine_amount_other\n\
         21,NO PARKING-STREET CLEANING,$65,$45\n",
    );
    // Spark-style output: partition folders, a job marker, one object per line.
    write_extract(root, "parking_violations", "_SUCCESS", "");
    write_extract(
        root,
        "parking_violations/issue_year=2021",
        "part-00000.json",
        concat!(
            r#"{"Summons_Number":"123","Violation_Time":"1130A","Issue_Date":"2021-01-05","Vehicle_Make":"FORD","Vehicle_Body_Type":"SUBN","Vehicle_Color":"BLK","Violation_Precinct":"1","Registration_State":"99","Violation_Code":"21","Issuing_Agency":"P"}"#,
            "\n",
            r#"{"Summons_Number":"124","Violation_Time":"0215P","Issue_Date":"2021-01-06","Vehicle_Make":"TOYOT","Vehicle_Body_Type":"4DSD","Vehicle_Color":"WHITE","Violation_Precinct":"40","Registration_State":"NY","Vehicle_Expiration_Date":"88888888","House_Number":"257","Street_Name":"Alexander Ave"}"#,
            "\n",
            r#"{"Summons_Number":"124","Violation_Time":"0300P","Issue_Date":"2021-01-06","Violation_Precinct":"40"}"#,
            "\n",
            r#"{"Summons_Number":"","Violation_Time":"0100A"}"#,
            "\n",
            r#"{"Summons_Number":"125","Violation_Time":"9999","Issue_Date":"garbage","Registration_State":"ZZ","Violation_Code":"77"}"#,
            "\n",
        ),
    );
    write_extract(
        root,
        "parking_violations/issue_year=2021",
        "part-00001.json",
        &format!(
            r#"{{"Summons_Number":"126","Violation_Time":"0800A","Issue_Date":"2021-01-07","Vehicle_Make":"{}","Vehicle_Body_Type":"SUBN","Vehicle_Color":"BLACK","Violation_Precinct":"40"}}"#,
            "l".repeat(LONG_MAKE_LEN)
        ),
    );
}

async fn count(warehouse: &mut Warehouse, table: Table) -> i64 {
    warehouse.count_rows(table).await.expect("count")
}

#[tokio::test]
async fn full_pipeline_is_idempotent_and_orphan_free() {
    let Ok(url) = std::env::var("PVDW_TEST_DATABASE_URL") else {
        eprintln!("PVDW_TEST_DATABASE_URL not set; skipping warehouse test");
        return;
    };

    let dir = tempdir().expect("tempdir");
    let extracts = dir.path().join("extracts");
    seed_extracts(&extracts);

    // The shipped transport, pointed at the fixture tree.
    let mut config = PipelineConfig {
        reports_dir: dir.path().join("reports"),
        fact_batch_size: 2,
        ..PipelineConfig::default()
    };
    let TransportConfig::LocalCopy { root } = &mut config.transport else {
        panic!("default transport should stream local extracts");
    };
    *root = extracts;
    let registry = StatementRegistry::standard();
    let mut warehouse = Warehouse::connect(&WarehouseConfig::from_url(url))
        .await
        .expect("connect");
    create_schema(&mut warehouse, &registry).await.expect("create schema");

    let orchestrator = Orchestrator::new(&config, &registry, &ObjectStoreCredentials::default());
    let all = config.selected_phases(None);

    let first = orchestrator.run(&mut warehouse, &all).await.expect("first run");
    assert_eq!(first.quality_failures().count(), 0, "{:?}", first.quality);
    assert_eq!(first.rows_for(Table::StageIssuingAgency), 2);
    assert_eq!(first.rows_for(Table::StageParkingViolations), 6);
    let facts = first.facts.expect("facts phase ran");
    assert_eq!(facts.skipped_rows, 1);
    assert_eq!(facts.inserted, 4);

    // 2 makes x 2 body styles x 14 colours, plus the sentinel.
    assert_eq!(count(&mut warehouse, Table::DimVehicle).await, 57);
    assert_eq!(count(&mut warehouse, Table::FactParkingViolation).await, 4);

    let rows = warehouse
        .fetch_all(
            r#"
            SELECT f.time_key, f.issue_date_key, f.registration_state_key, f.fine_amount,
                   f.borough_key, f.is_unregistered_vehicle, v.make, v.body_style, v.color_code
              FROM fact_parkingviolation f
              JOIN dim_vehicle v ON v.vehicle_key = f.vehicle_key
             WHERE f.summons_number = 123
            "#,
        )
        .await
        .expect("fact 123");
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.get::<i32, _>("time_key"), 11 * 60 + 30);
    assert_eq!(row.get::<i32, _>("issue_date_key"), 20210105);
    assert_eq!(row.get::<String, _>("registration_state_key"), "UK");
    assert_eq!(row.get::<i32, _>("fine_amount"), 65);
    assert_eq!(row.get::<i32, _>("borough_key"), 1);
    assert!(row.get::<bool, _>("is_unregistered_vehicle"));
    assert_eq!(row.get::<String, _>("make"), "FORD");
    assert_eq!(row.get::<String, _>("body_style"), "SUBN");
    assert_eq!(row.get::<String, _>("color_code"), "BK");

    let rows = warehouse
        .fetch_all(
            "SELECT vehicle_key, fine_amount, borough_key, violation_address, vehicle_expiration_date_key \
             FROM fact_parkingviolation WHERE summons_number = 124",
        )
        .await
        .expect("fact 124");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<i32, _>("vehicle_key"), 0);
    assert_eq!(rows[0].get::<i32, _>("borough_key"), 2);
    assert_eq!(
        rows[0].get::<Option<String>, _>("violation_address").as_deref(),
        Some("257 Alexander Ave")
    );
    assert_eq!(rows[0].get::<i32, _>("vehicle_expiration_date_key"), 19000101);

    // Over-long makes are cut to the column width on both sides of the vehicle join.
    let rows = warehouse
        .fetch_all(
            "SELECT f.vehicle_key, v.make FROM fact_parkingviolation f \
             JOIN dim_vehicle v ON v.vehicle_key = f.vehicle_key WHERE f.summons_number = 126",
        )
        .await
        .expect("fact 126");
    assert_eq!(rows.len(), 1);
    assert_ne!(rows[0].get::<i32, _>("vehicle_key"), 0);
    assert_eq!(rows[0].get::<String, _>("make"), "L".repeat(50));

    let dims = [
        Table::DimRegistrationState,
        Table::DimViolation,
        Table::DimPrecinct,
        Table::DimIssuingAgency,
        Table::DimBorough,
        Table::DimVehicle,
        Table::DimTime,
        Table::DimDate,
    ];
    let mut before = Vec::new();
    for table in dims {
        before.push(count(&mut warehouse, table).await);
    }

    let second = orchestrator.run(&mut warehouse, &all).await.expect("second run");
    assert_eq!(second.quality_failures().count(), 0, "{:?}", second.quality);
    assert_eq!(second.facts.expect("facts phase ran").inserted, 0);
    assert_eq!(second.rows_for(Table::DimVehicle), 0);
    assert_eq!(second.rows_for(Table::DimTime), 0);
    assert_eq!(second.rows_for(Table::DimDate), 0);
    for (table, expected) in dims.into_iter().zip(before) {
        assert_eq!(count(&mut warehouse, table).await, expected, "{table}");
    }
    assert_eq!(count(&mut warehouse, Table::FactParkingViolation).await, 4);

    // A missing dimension member surfaces as a non-fatal alert.
    sqlx::query("DELETE FROM dim_time WHERE time_key = 690")
        .execute(warehouse.connection())
        .await
        .expect("delete time member");
    let checked = orchestrator
        .run(&mut warehouse, &config.selected_phases(Some(&[Phase::Quality][..])))
        .await
        .expect("quality run");
    let failures: Vec<_> = checked.quality_failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].actual_row_count, 1);
    assert!(failures[0].description.contains("dim_time"));

    warehouse.close().await.expect("close");
}
