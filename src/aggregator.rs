//! Reduces a set of daily/hourly series across baseline years into one
//! monthly summary (§4.4).

use crate::loaders::series::{AirHourlySlice, ClimateDailySlice, MarineHourlySlice};
use crate::model::{opt_round2, MonthlySummary};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

pub struct Aggregator;

impl Aggregator {
    /// Combine slices (one per baseline year) into a single monthly
    /// summary. Provenance timestamps are not set here — the Summary
    /// Builder stamps them after a successful aggregation (§4.5).
    pub fn aggregate(
        climate: &[ClimateDailySlice],
        air: &[AirHourlySlice],
        marine: Option<&[MarineHourlySlice]>,
    ) -> MonthlySummary {
        let mut summary = MonthlySummary::empty();

        let temperature_pool: Vec<f64> = climate.iter().flat_map(|s| finite(&s.temperature_mean)).collect();
        summary.temperature_c = opt_round2(mean(&temperature_pool));
        summary.temperature_min_c = opt_round2(min_of(&temperature_pool));
        summary.temperature_max_c = opt_round2(max_of(&temperature_pool));

        summary.rainfall_mm = opt_round2(mean_of_per_year_sums(climate));

        let humidity_pool: Vec<f64> = climate.iter().flat_map(|s| finite(&s.humidity_mean)).collect();
        summary.humidity_pct = opt_round2(mean(&humidity_pool));

        let wind_pool: Vec<f64> = climate.iter().flat_map(|s| finite(&s.wind_mean)).collect();
        summary.wind_kph = opt_round2(mean(&wind_pool));

        summary.uv_index = opt_round2(mean_of_daily_maxima(air));

        let pm25_pool: Vec<f64> = air.iter().flat_map(|s| finite(&s.pm25)).collect();
        summary.pm25 = opt_round2(mean(&pm25_pool));

        let aqi_pool: Vec<f64> = air.iter().flat_map(|s| finite(&s.aqi)).collect();
        summary.aqi = opt_round2(mean(&aqi_pool));

        if let Some(marine) = marine {
            let height_pool: Vec<f64> = marine.iter().flat_map(|s| finite(&s.wave_height)).collect();
            let direction_pool: Vec<f64> = marine.iter().flat_map(|s| finite(&s.wave_direction)).collect();
            let period_pool: Vec<f64> = marine.iter().flat_map(|s| finite(&s.wave_period)).collect();
            summary.wave_height_m = opt_round2(mean(&height_pool));
            summary.wave_direction_deg = opt_round2(mean(&direction_pool));
            summary.wave_period_s = opt_round2(mean(&period_pool));
        }

        summary
    }
}

fn finite(values: &[Option<f64>]) -> impl Iterator<Item = f64> + '_ {
    values.iter().filter_map(|v| *v)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn min_of(values: &[f64]) -> Option<f64> {
    values.iter().copied().fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
}

fn max_of(values: &[f64]) -> Option<f64> {
    values.iter().copied().fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
}

/// `rainfallMm` = mean over years of the per-year monthly precipitation sum
/// (finite daily values only); a year with no finite readings contributes
/// nothing to the average, it is not counted as zero (§4.4).
fn mean_of_per_year_sums(climate: &[ClimateDailySlice]) -> Option<f64> {
    let per_year_sums: Vec<f64> = climate
        .iter()
        .filter_map(|s| {
            let values: Vec<f64> = finite(&s.precipitation).collect();
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum())
            }
        })
        .collect();
    mean(&per_year_sums)
}

/// `uvIndex` = mean of per-day maxima across all years (§4.4): for each day
/// present in a slice, take the max of its finite hourly readings, then
/// average those daily maxima across every day in every year.
fn mean_of_daily_maxima(air: &[AirHourlySlice]) -> Option<f64> {
    let mut daily_maxima: Vec<f64> = Vec::new();
    for slice in air {
        let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for (i, date) in slice.dates.iter().enumerate() {
            let Some(value) = slice.uv_index.get(i).copied().flatten() else { continue };
            by_day
                .entry(*date)
                .and_modify(|existing| *existing = existing.max(value))
                .or_insert(value);
        }
        daily_maxima.extend(by_day.into_values());
    }
    mean(&daily_maxima)
}
