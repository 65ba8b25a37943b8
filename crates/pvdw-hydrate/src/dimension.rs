//! Dimension hydration: replace-strategy reference dimensions and append-only growing ones.

use std::collections::BTreeMap;

use anyhow::{bail, Context};
use pvdw_core::keys::{
    decode_expiration_code, decode_issue_date, decode_time_opt, epoch_date, rank_boroughs,
    BoroughRank, CalendarDay, TimeOfDay, COLOR_CATALOGUE,
};
use pvdw_core::{parse_code, Action, Table};
use pvdw_storage::{bulk_insert, StatementRegistry, Warehouse};
use sqlx::Row;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionStrategy {
    /// Truncate, reload from staging, re-seed the zero member.
    Replace,
    /// Anti-join new candidates against what is already there.
    Append,
}

pub fn strategy_for(table: Table) -> Option<DimensionStrategy> {
    match table {
        Table::DimRegistrationState
        | Table::DimViolation
        | Table::DimPrecinct
        | Table::DimIssuingAgency
        | Table::DimBorough => Some(DimensionStrategy::Replace),
        Table::DimVehicle | Table::DimTime | Table::DimDate => Some(DimensionStrategy::Append),
        _ => None,
    }
}

pub struct DimensionHydrator<'a> {
    registry: &'a StatementRegistry,
}

impl<'a> DimensionHydrator<'a> {
    pub fn new(registry: &'a StatementRegistry) -> Self {
        Self { registry }
    }

    /// Inserts the zero member if it is missing; returns rows written (0 or 1).
    pub async fn seed_sentinel(&self, warehouse: &mut Warehouse, table: Table) -> anyhow::Result<u64> {
        warehouse.dispatch(self.registry, table, Action::ZeroSk).await
    }

    pub async fn replace(&self, warehouse: &mut Warehouse, table: Table) -> anyhow::Result<u64> {
        if strategy_for(table) != Some(DimensionStrategy::Replace) {
            bail!("{table} is not a replace-strategy dimension");
        }
        warehouse.dispatch(self.registry, table, Action::Truncate).await?;
        if table == Table::DimBorough {
            self.stage_borough_ranks(warehouse).await?;
        }
        let inserted = warehouse.dispatch(self.registry, table, Action::Insert).await?;
        let seeded = warehouse.dispatch(self.registry, table, Action::ZeroSk).await?;
        info!(%table, inserted, seeded, "dimension replaced");
        Ok(inserted + seeded)
    }

    pub async fn append(&self, warehouse: &mut Warehouse, table: Table) -> anyhow::Result<u64> {
        let candidates = match table {
            Table::DimVehicle => self.stage_colors(warehouse).await?,
            Table::DimTime => self.stage_times(warehouse).await?,
            Table::DimDate => self.stage_dates(warehouse).await?,
            other => bail!("{other} is not an append-strategy dimension"),
        };
        let inserted = warehouse.dispatch(self.registry, table, Action::Insert).await?;
        info!(%table, candidates, inserted, "dimension appended");
        Ok(inserted)
    }

    async fn stage_borough_ranks(&self, warehouse: &mut Warehouse) -> anyhow::Result<u64> {
        warehouse
            .dispatch(self.registry, Table::WorkBorough, Action::Truncate)
            .await?;
        let rows = warehouse
            .fetch_all("SELECT DISTINCT precinct_code, borough FROM stage_precinct")
            .await?;

        let mut pairs = Vec::with_capacity(rows.len());
        for row in &rows {
            let code: Option<String> = row.try_get("precinct_code")?;
            let borough: Option<String> = row.try_get("borough")?;
            let (Some(code), Some(borough)) = (parse_code(code.as_deref()), borough) else {
                continue;
            };
            let Ok(code) = i32::try_from(code) else {
                continue;
            };
            pairs.push((code, borough));
        }

        let ranks: Vec<BoroughRank> = rank_boroughs(pairs);
        debug!(boroughs = ranks.len(), "ranked boroughs");
        bulk_insert(
            warehouse.connection(),
            Table::WorkBorough,
            &["borough_key", "borough_name", "min_precinct_code"],
            &ranks,
            |mut b, rank| {
                b.push_bind(rank.borough_key)
                    .push_bind(rank.borough_name.as_str())
                    .push_bind(rank.min_precinct_code);
            },
        )
        .await
        .context("staging borough ranks")
    }

    async fn stage_colors(&self, warehouse: &mut Warehouse) -> anyhow::Result<u64> {
        warehouse
            .dispatch(self.registry, Table::WorkColor, Action::Truncate)
            .await?;
        bulk_insert(
            warehouse.connection(),
            Table::WorkColor,
            &["color_code", "color_description"],
            &COLOR_CATALOGUE,
            |mut b, color| {
                b.push_bind(color.code).push_bind(color.description);
            },
        )
        .await
        .context("staging colour catalogue")
    }

    async fn stage_times(&self, warehouse: &mut Warehouse) -> anyhow::Result<u64> {
        warehouse
            .dispatch(self.registry, Table::WorkTime, Action::Truncate)
            .await?;
        let rows = warehouse
            .fetch_all("SELECT DISTINCT violation_time FROM stage_parking_violations")
            .await?;

        let mut times: BTreeMap<i32, TimeOfDay> = BTreeMap::new();
        for row in &rows {
            let raw: Option<String> = row.try_get("violation_time")?;
            let decoded = decode_time_opt(raw.as_deref());
            times.entry(decoded.time_key).or_insert(decoded);
        }
        let times: Vec<TimeOfDay> = times.into_values().collect();

        bulk_insert(
            warehouse.connection(),
            Table::WorkTime,
            &[
                "time_key",
                "time_code",
                "display_time",
                "hour_number",
                "minute_number",
                "am_pm",
                "military_time_hour_number",
            ],
            &times,
            |mut b, t| {
                b.push_bind(t.time_key)
                    .push_bind(t.time_code.as_str())
                    .push_bind(t.display_time())
                    .push_bind(t.hour_number)
                    .push_bind(t.minute_number)
                    .push_bind(t.am_pm.as_str())
                    .push_bind(t.military_time_hour_number);
            },
        )
        .await
        .context("staging decoded times")
    }

    async fn stage_dates(&self, warehouse: &mut Warehouse) -> anyhow::Result<u64> {
        warehouse
            .dispatch(self.registry, Table::WorkDate, Action::Truncate)
            .await?;

        let mut days: BTreeMap<i32, CalendarDay> = BTreeMap::new();
        let epoch = CalendarDay::from(epoch_date());
        days.insert(epoch.date_key, epoch);

        let issued = warehouse
            .fetch_all("SELECT DISTINCT issue_date FROM stage_parking_violations")
            .await?;
        for row in &issued {
            let raw: Option<String> = row.try_get("issue_date")?;
            let day = CalendarDay::from(decode_issue_date(raw.as_deref()));
            days.entry(day.date_key).or_insert(day);
        }

        let expiring = warehouse
            .fetch_all("SELECT DISTINCT vehicle_expiration_date FROM stage_parking_violations")
            .await?;
        for row in &expiring {
            let raw: Option<String> = row.try_get("vehicle_expiration_date")?;
            let day = CalendarDay::from(decode_expiration_code(raw.as_deref()));
            days.entry(day.date_key).or_insert(day);
        }
        let days: Vec<CalendarDay> = days.into_values().collect();

        bulk_insert(
            warehouse.connection(),
            Table::WorkDate,
            &[
                "date_key",
                "calendar_date",
                "year_number",
                "month_number",
                "day_number",
                "quarter_number",
                "day_of_the_week",
                "is_weekday",
            ],
            &days,
            |mut b, d| {
                b.push_bind(d.date_key)
                    .push_bind(d.calendar_date)
                    .push_bind(d.year_number)
                    .push_bind(d.month_number)
                    .push_bind(d.day_number)
                    .push_bind(d.quarter_number)
                    .push_bind(d.day_of_the_week.as_str())
                    .push_bind(d.is_weekday);
            },
        )
        .await
        .context("staging decoded dates")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategies_cover_every_dimension() {
        for table in Table::ALL {
            let is_dim = table.kind() == pvdw_core::TableKind::Dimension;
            assert_eq!(strategy_for(table).is_some(), is_dim, "{table}");
        }
        assert_eq!(strategy_for(Table::DimBorough), Some(DimensionStrategy::Replace));
        assert_eq!(strategy_for(Table::DimDate), Some(DimensionStrategy::Append));
        assert_eq!(strategy_for(Table::WorkDate), None);
    }
}
