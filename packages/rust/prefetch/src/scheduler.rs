//! Priority-ordered, concurrency-bounded context prefetching.
//!
//! One [`Prefetcher`] serves one active conversation. `queue_items` replaces
//! everything and starts a background drain loop that repeatedly picks up to
//! `max_concurrent` pending records, fetches them in parallel, waits for the
//! whole batch to settle and pauses briefly before the next cycle.
//!
//! State lives behind a synchronous mutex that is never held across an
//! `.await`. A generation counter is bumped on every `queue_items`/`clear`;
//! results from a superseded generation are dropped on arrival.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Notify, watch};
use tracing::{debug, info, instrument, warn};

use convoreplay_shared::{ContextItem, PrefetchConfig, ReplayError, Result};

use crate::fetcher::{ContentFetcher, HttpFetcher};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Lifecycle of one queued item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefetchStatus {
    Pending,
    Loading,
    Loaded,
    Error,
}

/// Scheduler bookkeeping for one context item.
#[derive(Debug, Clone, Serialize)]
pub struct PrefetchRecord {
    pub item: ContextItem,
    /// Lowest message position the item applies to; `None` sorts last.
    pub priority: Option<u32>,
    pub status: PrefetchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PrefetchRecord {
    fn new(item: ContextItem) -> Self {
        Self {
            priority: item.first_message(),
            item,
            status: PrefetchStatus::Pending,
            content: None,
            error: None,
        }
    }

    fn sort_key(&self) -> (bool, u32) {
        (self.priority.is_none(), self.priority.unwrap_or(u32::MAX))
    }
}

/// Record counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub total: usize,
    pub pending: usize,
    pub loading: usize,
    pub loaded: usize,
    pub error: usize,
}

// ---------------------------------------------------------------------------
// Loading handles
// ---------------------------------------------------------------------------

type LoadOutcome = Option<std::result::Result<String, String>>;

/// Awaitable view of an in-flight retrieval.
#[derive(Debug, Clone)]
pub struct LoadingHandle {
    rx: watch::Receiver<LoadOutcome>,
}

impl LoadingHandle {
    /// Wait for the retrieval to settle. Fails if it errors or if the queue
    /// it belonged to was replaced or cleared first.
    pub async fn wait(mut self) -> Result<String> {
        let outcome = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ReplayError::Prefetch("retrieval superseded".to_string()))?;

        match outcome.as_ref() {
            Some(Ok(content)) => Ok(content.clone()),
            Some(Err(message)) => Err(ReplayError::Prefetch(message.clone())),
            None => Err(ReplayError::Prefetch("retrieval superseded".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Default)]
struct QueueState {
    generation: u64,
    records: Vec<PrefetchRecord>,
    cache: HashMap<String, String>,
    in_flight: HashMap<String, watch::Sender<LoadOutcome>>,
    /// Records sharing an in-flight url; settled with the primary's outcome.
    followers: HashMap<String, Vec<usize>>,
    draining: bool,
}

impl QueueState {
    fn reset(&mut self) {
        self.generation += 1;
        self.records.clear();
        self.cache.clear();
        // Dropping the senders releases anyone waiting on a handle.
        self.in_flight.clear();
        self.followers.clear();
    }

    /// Claim the next batch. Items that need no fetch are settled in place
    /// and do not count toward the batch.
    fn claim_batch(&mut self, limit: usize) -> Vec<(usize, String)> {
        let mut batch = Vec::new();

        for index in 0..self.records.len() {
            if batch.len() >= limit {
                break;
            }
            let record = &self.records[index];
            if record.status != PrefetchStatus::Pending {
                continue;
            }
            let url = record.item.url.clone();
            let kind = record.item.kind;

            if !kind.is_textual() {
                let record = &mut self.records[index];
                record.status = PrefetchStatus::Error;
                record.error = Some(ReplayError::NotPrefetchable { kind }.to_string());
                continue;
            }

            if let Some(content) = self.cache.get(&url) {
                debug!(%url, "already cached");
                let content = content.clone();
                let record = &mut self.records[index];
                record.status = PrefetchStatus::Loaded;
                record.content = Some(content);
                continue;
            }
            if self.in_flight.contains_key(&url) {
                debug!(%url, "already in flight");
                self.records[index].status = PrefetchStatus::Loading;
                self.followers.entry(url).or_default().push(index);
                continue;
            }

            let (tx, _) = watch::channel(None);
            self.in_flight.insert(url.clone(), tx);
            self.records[index].status = PrefetchStatus::Loading;
            batch.push((index, url));
        }

        batch
    }

    fn settle(&mut self, index: usize, url: &str, outcome: Result<String>) {
        let sender = self.in_flight.remove(url);
        let followers = self.followers.remove(url).unwrap_or_default();

        let published = match outcome {
            Ok(content) => {
                self.cache.insert(url.to_string(), content.clone());
                Ok(content)
            }
            Err(e) => {
                warn!(%url, error = %e, "prefetch failed");
                Err(e.to_string())
            }
        };

        for i in std::iter::once(index).chain(followers) {
            let record = &mut self.records[i];
            match &published {
                Ok(content) => {
                    record.status = PrefetchStatus::Loaded;
                    record.content = Some(content.clone());
                }
                Err(message) => {
                    record.status = PrefetchStatus::Error;
                    record.error = Some(message.clone());
                }
            }
        }

        if let Some(tx) = sender {
            tx.send_replace(Some(published));
        }
    }

    fn status(&self) -> QueueStatus {
        let mut status = QueueStatus {
            total: self.records.len(),
            ..Default::default()
        };
        for record in &self.records {
            match record.status {
                PrefetchStatus::Pending => status.pending += 1,
                PrefetchStatus::Loading => status.loading += 1,
                PrefetchStatus::Loaded => status.loaded += 1,
                PrefetchStatus::Error => status.error += 1,
            }
        }
        status
    }
}

struct Shared {
    fetcher: Arc<dyn ContentFetcher>,
    config: PrefetchConfig,
    state: Mutex<QueueState>,
    idle: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Context prefetch scheduler. Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct Prefetcher {
    shared: Arc<Shared>,
}

impl Prefetcher {
    /// Scheduler fetching over HTTP.
    pub fn new(config: PrefetchConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    /// Scheduler with a custom fetcher.
    pub fn with_fetcher(config: PrefetchConfig, fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self {
            shared: Arc::new(Shared {
                fetcher,
                config,
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
            }),
        }
    }

    /// Replace the queue with `items` and start draining in the background.
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip_all, fields(items = items.len()))]
    pub fn queue_items(&self, items: Vec<ContextItem>) {
        let mut records: Vec<PrefetchRecord> = items.into_iter().map(PrefetchRecord::new).collect();
        records.sort_by_key(PrefetchRecord::sort_key);

        let start_drain = {
            let mut state = self.shared.lock();
            state.reset();
            state.records = records;
            info!(generation = state.generation, "context queued");
            !std::mem::replace(&mut state.draining, true)
        };

        if start_drain {
            tokio::spawn(drain(Arc::clone(&self.shared)));
        }
    }

    pub fn get_cached_content(&self, item: &ContextItem) -> Option<String> {
        self.shared.lock().cache.get(&item.url).cloned()
    }

    pub fn is_cached(&self, item: &ContextItem) -> bool {
        self.shared.lock().cache.contains_key(&item.url)
    }

    /// Handle on the retrieval currently in flight for the item's url.
    pub fn get_loading_promise(&self, item: &ContextItem) -> Option<LoadingHandle> {
        self.shared
            .lock()
            .in_flight
            .get(&item.url)
            .map(|tx| LoadingHandle { rx: tx.subscribe() })
    }

    /// Drop all records, cached content and in-flight bookkeeping.
    pub fn clear(&self) {
        self.shared.lock().reset();
        debug!("prefetch queue cleared");
    }

    pub fn status(&self) -> QueueStatus {
        self.shared.lock().status()
    }

    /// Snapshot of the queue in priority order.
    pub fn records(&self) -> Vec<PrefetchRecord> {
        self.shared.lock().records.clone()
    }

    /// Resolves once the drain loop has no pending work left.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.shared.lock().draining {
                return;
            }
            notified.await;
        }
    }
}

/// Drain loop; at most one runs per scheduler.
async fn drain(shared: Arc<Shared>) {
    let limit = shared.config.max_concurrent.max(1);
    let delay = Duration::from_millis(shared.config.cycle_delay_ms);

    loop {
        let (generation, batch) = {
            let mut state = shared.lock();
            let batch = state.claim_batch(limit);
            if batch.is_empty() {
                state.draining = false;
                drop(state);
                shared.idle.notify_waiters();
                debug!("prefetch queue drained");
                return;
            }
            (state.generation, batch)
        };
        debug!(generation, batch = batch.len(), "prefetch cycle");

        let handles: Vec<_> = batch
            .iter()
            .map(|(_, url)| {
                let fetcher = Arc::clone(&shared.fetcher);
                let url = url.clone();
                tokio::spawn(async move { fetcher.fetch(&url).await })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(ReplayError::Prefetch(format!("fetch task failed: {e}"))),
            };
            outcomes.push(outcome);
        }

        {
            let mut state = shared.lock();
            if state.generation == generation {
                for ((index, url), outcome) in batch.into_iter().zip(outcomes) {
                    state.settle(index, &url, outcome);
                }
            } else {
                debug!(generation, "discarding results from superseded queue");
            }
        }

        tokio::time::sleep(delay).await;
    }
}
