//! Repository directory retrieval (`github.com/<owner>/<repo>/tree/<branch>/<path>`).

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use convoreplay_shared::{
    ContextItem, ContextMeta, ReplayError, Result, SourceOptions, create_context_item,
    validate_context_item,
};

use crate::SourceAdapter;
use crate::http::{build_client, fetch_json, fetch_text};
use crate::listing::{LISTING_TTL, ListingCache};

static TREE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.)?github\.com/([^/]+)/([^/]+)/tree/([^/]+)(?:/(.*?))?/?$")
        .expect("tree url regex")
});

/// Extensions accepted as context files.
const CONTEXT_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".mp4", ".mov", ".md", ".txt", ".js", ".css", ".html",
];

/// Name or path fragments that are never context.
const NOISE_PATTERNS: &[&str] = &[
    "README.md",
    "package.json",
    ".git",
    "node_modules/",
    "LICENSE",
    "CHANGELOG.md",
    "conversation.json",
    "conversation.txt",
];

/// A parsed tree locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLocation {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Directory path inside the repository; empty for the root.
    pub path: String,
}

impl TreeLocation {
    pub fn parse(locator: &str) -> Result<Self> {
        let caps = TREE_URL_RE.captures(locator.trim()).ok_or_else(|| {
            ReplayError::invalid_locator(format!("not a repository tree URL: {locator}"))
        })?;
        let part = |i: usize| caps.get(i).map_or("", |m| m.as_str()).to_string();

        Ok(Self {
            owner: part(1),
            repo: part(2),
            branch: part(3),
            path: part(4),
        })
    }

    fn contents_url(&self, api_base: &str) -> String {
        format!(
            "{api_base}/repos/{}/{}/contents/{}?ref={}",
            self.owner, self.repo, self.path, self.branch
        )
    }
}

impl std::fmt::Display for TreeLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}:/{}", self.owner, self.repo, self.branch, self.path)
    }
}

/// One directory listing entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl RepoEntry {
    fn is_file(&self) -> bool {
        self.kind == "file"
    }
}

/// Conversation file by priority: `conversation.json`, `conversation.txt`,
/// any `.json`, any `.txt`. Directories never match.
pub fn select_conversation_entry(entries: &[RepoEntry]) -> Option<&RepoEntry> {
    let tiers: [&dyn Fn(&str) -> bool; 4] = [
        &|n: &str| n == "conversation.json",
        &|n: &str| n == "conversation.txt",
        &|n: &str| n.ends_with(".json"),
        &|n: &str| n.ends_with(".txt"),
    ];

    tiers.iter().find_map(|matches| {
        entries
            .iter()
            .find(|e| e.is_file() && matches(e.name.as_str()))
    })
}

fn is_context_candidate(entry: &RepoEntry) -> bool {
    if !entry.is_file() {
        return false;
    }
    let lower = entry.name.to_lowercase();
    if !CONTEXT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return false;
    }
    !NOISE_PATTERNS
        .iter()
        .any(|p| entry.name.contains(p) || entry.path.contains(p))
}

pub struct RepoAdapter {
    client: Client,
    api_base: String,
    listings: ListingCache<Vec<RepoEntry>>,
}

impl RepoAdapter {
    pub fn new(opts: &SourceOptions) -> Result<Self> {
        Ok(Self::with_client(build_client(opts)?, opts))
    }

    pub fn with_client(client: Client, opts: &SourceOptions) -> Self {
        Self {
            client,
            api_base: opts.api_base.clone(),
            listings: ListingCache::new(LISTING_TTL),
        }
    }

    async fn list(&self, location: &TreeLocation) -> Result<Arc<Vec<RepoEntry>>> {
        let url = location.contents_url(&self.api_base);
        let entries = self
            .listings
            .get_or_fetch(&url, || fetch_json(&self.client, &url, "Repository"))
            .await?;
        debug!(entries = entries.len(), "directory listed");
        Ok(entries)
    }

    async fn discover(&self, locator: &str) -> Result<Vec<ContextItem>> {
        let location = TreeLocation::parse(locator)?;
        let entries = self.list(&location).await?;
        let conversation = select_conversation_entry(&entries).map(|e| e.path.as_str());

        let mut items = Vec::new();
        for entry in entries.iter().filter(|e| is_context_candidate(e)) {
            if Some(entry.path.as_str()) == conversation {
                continue;
            }
            let Some(download_url) = &entry.download_url else {
                continue;
            };

            let extra = ContextMeta {
                size: entry.size,
                ..Default::default()
            };
            let item = create_context_item(&entry.name, download_url, Some(extra));
            if validate_context_item(&item) {
                items.push(item);
            } else {
                debug!(name = %entry.name, "not a context filename");
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl SourceAdapter for RepoAdapter {
    fn name(&self) -> &str {
        "repository"
    }

    fn handles(&self, locator: &str) -> bool {
        TREE_URL_RE.is_match(locator.trim())
    }

    #[instrument(skip_all, fields(locator = %locator))]
    async fn fetch_content(&self, locator: &str) -> Result<String> {
        let location = TreeLocation::parse(locator)?;
        let entries = self.list(&location).await?;

        let entry = select_conversation_entry(&entries).ok_or_else(|| {
            ReplayError::NoConversationFile {
                location: location.to_string(),
            }
        })?;
        info!(file = %entry.path, "conversation file selected");

        let download_url = entry.download_url.as_deref().ok_or_else(|| {
            ReplayError::malformed(format!("{} has no download_url", entry.path))
        })?;
        fetch_text(&self.client, download_url, "Conversation file").await
    }

    #[instrument(skip_all, fields(locator = %locator))]
    async fn discover_context(&self, locator: &str) -> Vec<ContextItem> {
        match self.discover(locator).await {
            Ok(items) => {
                info!(items = items.len(), "repository context discovered");
                items
            }
            Err(e) => {
                warn!(error = %e, "context discovery failed");
                Vec::new()
            }
        }
    }
}
