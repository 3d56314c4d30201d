//! Region catalog (§3 "Region").
//!
//! A region owns no state beyond its identity and coordinates; it is read
//! from a catalog at startup and never mutated. The catalog itself is a
//! simple immutable map, analogous to how the region/manual-override
//! lookups elsewhere in this engine are built once and held for the
//! lifetime of the process.

use std::collections::HashMap;

/// A single catalog entry: stable identifier, coordinates, coastal flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub is_coastal: bool,
}

/// Immutable catalog of regions, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct RegionCatalog {
    regions: HashMap<String, Region>,
}

impl RegionCatalog {
    pub fn new(regions: Vec<Region>) -> Self {
        Self {
            regions: regions.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    pub fn get(&self, region_id: &str) -> Option<&Region> {
        self.regions.get(region_id)
    }

    /// Sorted region identifiers (`listWeatherRegionIds`, §6).
    pub fn sorted_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.regions.keys().cloned().collect();
        ids.sort();
        ids
    }
}
