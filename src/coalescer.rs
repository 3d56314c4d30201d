//! Single-flight coalescing of concurrent identical summary builds (§4.7).

use crate::errors::CoreError;
use crate::model::MonthlySummary;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// `CoreError` isn't `Clone` (it wraps non-`Clone` sources like
/// `reqwest::Error`), but `Shared` needs its error type to be — wrap it in
/// an `Arc` before sharing (§4.7 implementation note).
type SharedBuildResult = Result<Arc<MonthlySummary>, Arc<CoreError>>;
type SharedBuild = Shared<BoxFuture<'static, SharedBuildResult>>;

#[derive(Default)]
pub struct SingleFlight {
    inflight: Mutex<HashMap<String, SharedBuild>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `build` for `key`, coalescing concurrent callers with the same
    /// key onto the same in-flight future. The entry is removed once the
    /// build completes, success or failure (§4.7).
    pub async fn run<F>(&self, key: String, build: F) -> Result<Arc<MonthlySummary>, Arc<CoreError>>
    where
        F: Future<Output = Result<MonthlySummary, CoreError>> + Send + 'static,
    {
        let existing = {
            let guard = self.inflight.lock().await;
            guard.get(&key).cloned()
        };

        if let Some(shared) = existing {
            return shared.await;
        }

        let shared: SharedBuild = async move { build.await.map(Arc::new).map_err(Arc::new) }.boxed().shared();

        // Another caller may have raced us into the slot; prefer theirs so
        // everyone really does await the same future. Only the caller that
        // actually inserts the entry owns removing it once the build
        // completes, otherwise a straggler's cleanup can delete a fresh
        // entry a later caller inserted after this build already finished.
        let (to_await, owns_cleanup) = {
            let mut guard = self.inflight.lock().await;
            match guard.entry(key.clone()) {
                Entry::Occupied(existing) => (existing.get().clone(), false),
                Entry::Vacant(slot) => {
                    slot.insert(shared.clone());
                    (shared, true)
                }
            }
        };

        let result = to_await.await;

        if owns_cleanup {
            self.inflight.lock().await.remove(&key);
        }
        result
    }
}
