//! Content-addressed, atomically-written summary cache (§4.6): an
//! in-memory mirror over on-disk JSON files keyed by `SHA1(keyInput)`.

use crate::helpers::atomic_write_json;
use crate::model::{CacheKey, CachedSummaryEntry, MonthlySummary};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub struct SummaryCache {
    dir: PathBuf,
    memory: RwLock<HashMap<String, MonthlySummary>>,
}

impl SummaryCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), memory: RwLock::new(HashMap::new()) }
    }

    /// Read a summary for `key`, consulting the in-memory mirror first,
    /// then the on-disk file. Any mismatch (wrong `keyInput`, implausible
    /// summary, parse failure) is treated as a miss (§4.6, §7).
    pub async fn get(&self, key: &CacheKey) -> Option<MonthlySummary> {
        let address = key.content_address();
        if let Some(summary) = self.memory.read().await.get(&address) {
            return Some(summary.clone());
        }

        let path = self.path_for(&address);
        let entry = read_entry(&path)?;
        let expected_key_input = key.canonical_json();
        if entry.key_input != expected_key_input {
            warn!(address, "summary cache key mismatch, treating as miss");
            return None;
        }
        if !entry.summary.is_plausible() {
            warn!(address, "summary cache entry failed plausibility check, treating as miss");
            return None;
        }

        self.memory.write().await.insert(address, entry.summary.clone());
        Some(entry.summary)
    }

    /// Write a summary for `key`, atomically replacing the on-disk file and
    /// updating the in-memory mirror (§4.6, §9 "Atomic file writes").
    pub async fn put(&self, key: &CacheKey, summary: &MonthlySummary) -> std::io::Result<()> {
        let address = key.content_address();
        let entry = CachedSummaryEntry {
            key_input: key.canonical_json(),
            summary: summary.clone(),
            stored_at: Utc::now(),
        };
        atomic_write_json(&self.path_for(&address), &entry)?;
        self.memory.write().await.insert(address, summary.clone());
        Ok(())
    }

    fn path_for(&self, address: &str) -> PathBuf {
        self.dir.join(format!("{address}.json"))
    }
}

fn read_entry(path: &Path) -> Option<CachedSummaryEntry> {
    let bytes = std::fs::read(path).ok()?;
    match serde_json::from_slice::<CachedSummaryEntry>(&bytes) {
        Ok(entry) => Some(entry),
        Err(err) => {
            debug!(?path, error = %err, "summary cache file failed to parse, treating as miss");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_summary() -> MonthlySummary {
        let mut s = MonthlySummary::empty();
        s.temperature_c = Some(crate::model::round2(21.0));
        s
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SummaryCache::new(dir.path());
        let key = CacheKey::new("vn-da-nang", 7, false, vec![2022, 2023]);

        cache.put(&key, &sample_summary()).await.unwrap();
        let read_back = cache.get(&key).await.unwrap();
        assert_eq!(read_back, sample_summary());
    }

    #[tokio::test]
    async fn miss_for_unknown_key() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SummaryCache::new(dir.path());
        let key = CacheKey::new("vn-da-nang", 7, false, vec![2022]);
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn corrupted_file_is_treated_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SummaryCache::new(dir.path());
        let key = CacheKey::new("vn-da-nang", 7, false, vec![2022]);
        std::fs::write(cache.path_for(&key.content_address()), b"not json").unwrap();
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn implausible_summary_is_treated_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SummaryCache::new(dir.path());
        let key = CacheKey::new("vn-da-nang", 7, false, vec![2022]);
        let mut bad = sample_summary();
        bad.temperature_c = Some(crate::model::round2(500.0));
        cache.put(&key, &bad).await.unwrap();
        // put() populates the memory mirror directly, so clear it to force a disk read.
        cache.memory.write().await.clear();
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn key_input_mismatch_is_treated_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SummaryCache::new(dir.path());
        let key = CacheKey::new("vn-da-nang", 7, false, vec![2022]);
        let other_key = CacheKey::new("vn-da-nang", 8, false, vec![2022]);
        let entry = CachedSummaryEntry {
            key_input: other_key.canonical_json(),
            summary: sample_summary(),
            stored_at: Utc::now(),
        };
        atomic_write_json(&cache.path_for(&key.content_address()), &entry).unwrap();
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn atomic_replace_readers_never_see_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SummaryCache::new(dir.path());
        let key = CacheKey::new("vn-da-nang", 7, false, vec![2022]);
        cache.put(&key, &sample_summary()).await.unwrap();

        let mut updated = sample_summary();
        updated.temperature_c = Some(crate::model::round2(30.0));
        cache.put(&key, &updated).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(entries.len(), 1, "no leftover tmp files after repeated writes");
    }
}
