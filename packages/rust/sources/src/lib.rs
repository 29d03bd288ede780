//! Source adapters: retrieve conversation content and enumerate context files.
//!
//! Three adapters exist, consulted in priority order by the
//! [`SourceRegistry`]:
//! - [`GistAdapter`] for gist page and raw URLs
//! - [`RepoAdapter`] for repository tree URLs
//! - [`FileAdapter`] for everything else (the always-matching fallback)

mod file;
mod gist;
mod http;
mod listing;
mod repo;

use async_trait::async_trait;
use tracing::debug;

use convoreplay_shared::{ContextItem, Result, SourceOptions};

pub use file::{FileAdapter, parse_context_map};
pub use gist::{GistAdapter, extract_gist_id, select_conversation_file};
pub use http::{USER_AGENT, build_client};
pub use repo::{RepoAdapter, RepoEntry, TreeLocation, select_conversation_entry};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One kind of conversation source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short name for logs and CLI output.
    fn name(&self) -> &str;

    /// Can this adapter interpret the locator?
    fn handles(&self, locator: &str) -> bool;

    /// Retrieve the raw conversation content. Any failure aborts the load.
    async fn fetch_content(&self, locator: &str) -> Result<String>;

    /// Enumerate context files. Never fails: problems are logged and yield
    /// an empty list.
    async fn discover_context(&self, _locator: &str) -> Vec<ContextItem> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds adapters in priority order; the file adapter is always last.
pub struct SourceRegistry {
    adapters: Vec<Box<dyn SourceAdapter>>,
    fallback: FileAdapter,
}

impl SourceRegistry {
    /// Create a registry with the built-in adapters sharing one HTTP client.
    pub fn new(opts: &SourceOptions) -> Result<Self> {
        let client = build_client(opts)?;
        Ok(Self {
            adapters: vec![
                Box::new(GistAdapter::with_client(client.clone(), opts)),
                Box::new(RepoAdapter::with_client(client.clone(), opts)),
            ],
            fallback: FileAdapter::with_client(client, opts),
        })
    }

    /// Add an adapter ahead of the built-ins.
    pub fn register(&mut self, adapter: Box<dyn SourceAdapter>) {
        self.adapters.insert(0, adapter);
    }

    /// Select the adapter for a locator.
    pub fn select(&self, locator: &str) -> &dyn SourceAdapter {
        let adapter = self
            .adapters
            .iter()
            .map(|a| a.as_ref())
            .find(|a| a.handles(locator))
            .unwrap_or(&self.fallback);
        debug!(adapter = adapter.name(), "source adapter selected");
        adapter
    }
}
