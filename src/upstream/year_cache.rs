//! Bounded per-region FIFO cache of parsed yearly payloads (§4.3).
//!
//! Query locality is by region: switching the active region clears the
//! whole cache rather than keeping per-region sub-caches, which is why
//! concurrent region-varying traffic thrashes it by design (§5).

use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::debug;

struct State<T> {
    region_id: Option<String>,
    years: VecDeque<(i32, T)>,
}

pub(crate) struct YearCache<T: Clone> {
    state: Mutex<State<T>>,
    max_entries: usize,
}

impl<T: Clone> YearCache<T> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Mutex::new(State { region_id: None, years: VecDeque::new() }),
            max_entries: max_entries.max(1),
        }
    }

    pub async fn get(&self, region_id: &str, year: i32) -> Option<T> {
        let state = self.state.lock().await;
        if state.region_id.as_deref() != Some(region_id) {
            return None;
        }
        state.years.iter().find(|(y, _)| *y == year).map(|(_, v)| v.clone())
    }

    pub async fn insert(&self, region_id: &str, year: i32, value: T) {
        let mut state = self.state.lock().await;
        if state.region_id.as_deref() != Some(region_id) {
            debug!(region_id, "year cache region changed, clearing cached years");
            state.region_id = Some(region_id.to_string());
            state.years.clear();
        }
        state.years.retain(|(y, _)| *y != year);
        state.years.push_back((year, value));
        while state.years.len() > self.max_entries {
            state.years.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hits_on_same_region_and_year() {
        let cache: YearCache<i32> = YearCache::new(6);
        cache.insert("r1", 2023, 99).await;
        assert_eq!(cache.get("r1", 2023).await, Some(99));
    }

    #[tokio::test]
    async fn misses_on_unseen_year() {
        let cache: YearCache<i32> = YearCache::new(6);
        cache.insert("r1", 2023, 99).await;
        assert_eq!(cache.get("r1", 2022).await, None);
    }

    #[tokio::test]
    async fn switching_region_clears_all_years() {
        let cache: YearCache<i32> = YearCache::new(6);
        cache.insert("r1", 2023, 99).await;
        cache.insert("r2", 2023, 1).await;
        assert_eq!(cache.get("r1", 2023).await, None);
        assert_eq!(cache.get("r2", 2023).await, Some(1));
    }

    #[tokio::test]
    async fn evicts_oldest_entry_past_capacity() {
        let cache: YearCache<i32> = YearCache::new(2);
        cache.insert("r1", 2021, 1).await;
        cache.insert("r1", 2022, 2).await;
        cache.insert("r1", 2023, 3).await;
        assert_eq!(cache.get("r1", 2021).await, None);
        assert_eq!(cache.get("r1", 2022).await, Some(2));
        assert_eq!(cache.get("r1", 2023).await, Some(3));
    }

    #[tokio::test]
    async fn re_inserting_same_year_updates_value_without_growing() {
        let cache: YearCache<i32> = YearCache::new(2);
        cache.insert("r1", 2023, 1).await;
        cache.insert("r1", 2023, 2).await;
        assert_eq!(cache.get("r1", 2023).await, Some(2));
    }
}
