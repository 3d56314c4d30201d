//! Manual override loader (§4.9): reads a directory of curated
//! monthly-summary files on first access and serves them as a fallback
//! when no fresh verified snapshot exists.

use crate::model::MonthlySummary;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ManualFile {
    #[serde(rename = "regionId")]
    region_id: String,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    months: Vec<ManualMonthRow>,
}

#[derive(Debug, Deserialize)]
struct ManualMonthRow {
    month: u32,
    #[serde(default)]
    temperature_c: Option<f64>,
    #[serde(default)]
    temperature_min_c: Option<f64>,
    #[serde(default)]
    temperature_max_c: Option<f64>,
    #[serde(default)]
    rainfall_mm: Option<f64>,
    #[serde(default)]
    humidity_pct: Option<f64>,
    #[serde(default)]
    wind_kph: Option<f64>,
    #[serde(default)]
    uv_index: Option<f64>,
    #[serde(default)]
    pm25: Option<f64>,
    #[serde(default)]
    aqi: Option<f64>,
    #[serde(default)]
    wave_height_m: Option<f64>,
    #[serde(default)]
    wave_period_s: Option<f64>,
    #[serde(default)]
    wave_direction_deg: Option<f64>,
}

pub struct ManualOverrideLoader {
    dir: Option<PathBuf>,
    loaded: OnceCell<HashMap<(String, u32), MonthlySummary>>,
}

impl ManualOverrideLoader {
    pub fn new(dir: Option<impl Into<PathBuf>>) -> Self {
        Self { dir: dir.map(Into::into), loaded: OnceCell::new() }
    }

    pub async fn get(&self, region_id: &str, month: u32) -> Option<MonthlySummary> {
        let map = self.loaded.get_or_init(|| async { self.scan() }).await;
        map.get(&(region_id.to_string(), month)).cloned()
    }

    fn scan(&self) -> HashMap<(String, u32), MonthlySummary> {
        let mut map = HashMap::new();
        let Some(dir) = &self.dir else { return map };
        let Ok(read_dir) = std::fs::read_dir(dir) else {
            debug!(?dir, "manual override directory not found, skipping");
            return map;
        };

        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match parse_manual_file(&path) {
                Ok(parsed) => {
                    for ((region_id, month), summary) in parsed {
                        map.insert((region_id, month), summary);
                    }
                }
                Err(err) => {
                    warn!(?path, error = %err, "manual override file failed to parse, skipping");
                }
            }
        }
        map
    }
}

fn parse_manual_file(path: &std::path::Path) -> Result<Vec<((String, u32), MonthlySummary)>, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    let parsed: ManualFile = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
    let loaded_at = parsed.last_updated.unwrap_or_else(Utc::now);

    let mut rows = Vec::new();
    for row in parsed.months {
        let month = row.month;
        let summary = row_to_summary(row, loaded_at);
        if summary.all_numeric_fields_null() {
            continue;
        }
        rows.push(((parsed.region_id.clone(), month), summary));
    }
    Ok(rows)
}

fn row_to_summary(row: ManualMonthRow, loaded_at: DateTime<Utc>) -> MonthlySummary {
    use crate::model::opt_round2;
    let mut summary = MonthlySummary::empty();
    summary.temperature_c = opt_round2(row.temperature_c);
    summary.temperature_min_c = opt_round2(row.temperature_min_c);
    summary.temperature_max_c = opt_round2(row.temperature_max_c);
    summary.rainfall_mm = opt_round2(row.rainfall_mm);
    summary.humidity_pct = opt_round2(row.humidity_pct);
    summary.wind_kph = opt_round2(row.wind_kph);
    summary.uv_index = opt_round2(row.uv_index);
    summary.pm25 = opt_round2(row.pm25);
    summary.aqi = opt_round2(row.aqi);
    summary.wave_height_m = opt_round2(row.wave_height_m);
    summary.wave_period_s = opt_round2(row.wave_period_s);
    summary.wave_direction_deg = opt_round2(row.wave_direction_deg);
    summary.climate_last_updated = Some(loaded_at);
    summary.air_quality_last_updated = Some(loaded_at);
    summary.marine_last_updated = Some(loaded_at);
    summary
}
