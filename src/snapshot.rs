//! Per-region snapshot store: lazy file reads, staleness classification,
//! and atomic upserts with sticky marine coverage (§4.8).

use crate::config::WeatherCoreConfig;
use crate::helpers::atomic_write_json;
use crate::model::{RegionSnapshotFile, SnapshotMonthEntry, SNAPSHOT_SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Why a snapshot month entry is not served as fresh. `None` means fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    BaselineYearsChanged,
    ClimateExpired,
    AirExpired,
    MarineMissing,
    MarineExpired,
}

impl StaleReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StaleReason::BaselineYearsChanged => "baseline-years-changed",
            StaleReason::ClimateExpired => "climate-expired",
            StaleReason::AirExpired => "air-expired",
            StaleReason::MarineMissing => "marine-missing",
            StaleReason::MarineExpired => "marine-expired",
        }
    }
}

pub struct SnapshotStore {
    dir: PathBuf,
    climate_max_age_days: i64,
    air_max_age_days: i64,
    marine_max_age_days: i64,
    /// One lock per store instance is sufficient — writes to different
    /// region files don't actually conflict, but reads-then-writes within
    /// a single resolve should not interleave with each other for the
    /// same region, and file-level locking is more machinery than this
    /// engine needs (§5: last-rename-wins is acceptable here).
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(config: &WeatherCoreConfig) -> Self {
        Self {
            dir: PathBuf::from(&config.snapshot_dir),
            climate_max_age_days: config.snapshot_climate_max_age_days,
            air_max_age_days: config.snapshot_air_max_age_days,
            marine_max_age_days: config.snapshot_marine_max_age_days,
            write_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, region_id: &str) -> PathBuf {
        self.dir.join(format!("{region_id}.json"))
    }

    /// Read the snapshot file for `region_id`. Parse failure, a missing
    /// file, or a non-current schema version all yield an empty snapshot
    /// (§4.8, §6 "schema versions").
    pub fn read(&self, region_id: &str) -> RegionSnapshotFile {
        let path = self.path_for(region_id);
        let Ok(bytes) = std::fs::read(&path) else {
            return RegionSnapshotFile::empty(region_id);
        };
        match serde_json::from_slice::<RegionSnapshotFile>(&bytes) {
            Ok(file) if file.version == SNAPSHOT_SCHEMA_VERSION && file.region_id == region_id => file,
            Ok(_) => {
                warn!(region_id, "snapshot schema version or region mismatch, treating as empty");
                RegionSnapshotFile::empty(region_id)
            }
            Err(err) => {
                debug!(region_id, error = %err, "snapshot file failed to parse, treating as empty");
                RegionSnapshotFile::empty(region_id)
            }
        }
    }

    /// Classify the staleness of `month` within `file` given the currently
    /// configured baseline years and marine preference (§4.8). `None`
    /// means fresh.
    pub fn stale_reason(
        &self,
        file: &RegionSnapshotFile,
        month: u32,
        current_baseline_years: &[i32],
        want_marine: bool,
    ) -> Option<StaleReason> {
        let entry = file.get_month(month)?;

        if entry.baseline_years != current_baseline_years {
            return Some(StaleReason::BaselineYearsChanged);
        }

        let now = Utc::now();
        if let Some(updated) = entry.summary.climate_last_updated {
            if age_in_days(now, updated) > self.climate_max_age_days {
                return Some(StaleReason::ClimateExpired);
            }
        }
        if let Some(updated) = entry.summary.air_quality_last_updated {
            if age_in_days(now, updated) > self.air_max_age_days {
                return Some(StaleReason::AirExpired);
            }
        }

        if want_marine {
            if !entry.includes_marine {
                return Some(StaleReason::MarineMissing);
            }
            if let Some(updated) = entry.summary.marine_last_updated {
                if age_in_days(now, updated) > self.marine_max_age_days {
                    return Some(StaleReason::MarineExpired);
                }
            }
        }

        None
    }

    /// Upsert `entry` into the region's snapshot file and write it back
    /// atomically. An entry that previously carried marine coverage keeps
    /// `includes_marine = true` even if the new entry omits it — the
    /// intentional sticky behavior documented in §9.
    pub async fn upsert(&self, region_id: &str, mut entry: SnapshotMonthEntry) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.read(region_id);

        if let Some(previous) = file.get_month(entry.month) {
            if previous.includes_marine {
                entry.includes_marine = true;
            }
        }

        file.set_month(entry);
        atomic_write_json(&self.path_for(region_id), &file)
    }
}

fn age_in_days(now: DateTime<Utc>, updated: DateTime<Utc>) -> i64 {
    (now - updated).num_days()
}
