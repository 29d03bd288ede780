//! Short-lived memo for hosting-API listings.
//!
//! Conversation retrieval and context discovery run concurrently against the
//! same listing; both await one request instead of spending two rate-limit
//! hits. Failed requests are not memoized.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::OnceCell;

use convoreplay_shared::Result;

/// How long a fetched listing is reused.
pub(crate) const LISTING_TTL: Duration = Duration::from_secs(60);

type Slot<T> = Arc<OnceCell<Arc<T>>>;

pub(crate) struct ListingCache<T> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Slot<T>)>>,
}

impl<T> ListingCache<T> {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the listing for `key`, running `fetch` only when no live entry
    /// exists. Concurrent callers for the same key share one fetch.
    pub(crate) async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let slot = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.retain(|_, (created, _)| created.elapsed() < self.ttl);
            let (_, slot) = entries
                .entry(key.to_string())
                .or_insert_with(|| (Instant::now(), Arc::new(OnceCell::new())));
            Arc::clone(slot)
        };

        slot.get_or_try_init(|| async move { fetch().await.map(Arc::new) })
            .await
            .cloned()
    }
}
