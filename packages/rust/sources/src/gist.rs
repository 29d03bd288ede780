//! Gist retrieval through the hosting API.
//!
//! A gist is a flat bag of files. One of them is the conversation, picked by
//! filename heuristics; the rest are context candidates that must follow the
//! `N` / `N-M` naming convention.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use convoreplay_shared::{
    ContextItem, ContextMeta, ReplayError, Result, SourceOptions, create_context_item,
    parse_message_range, validate_context_item,
};

use crate::SourceAdapter;
use crate::http::{build_client, fetch_json, fetch_text};
use crate::listing::{LISTING_TTL, ListingCache};

static GIST_PAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://gist\.github\.com/(?:[\w-]+/)?([0-9a-fA-F]+)/?(?:[?#].*)?$")
        .expect("gist page regex")
});

static GIST_RAW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://gist\.githubusercontent\.com/[\w-]+/([0-9a-fA-F]+)(?:/.*)?$")
        .expect("gist raw regex")
});

/// Filenames that read as a transcript even without "conversation" in them.
static TRANSCRIPT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:chat|transcript|session|dialog(?:ue)?)(?:[-_.][^/]*)?\.(?:json|txt|md|log)$",
    )
    .expect("transcript name regex")
});

/// Extensions a conversation file may have.
const CONVERSATION_EXTENSIONS: &[&str] = &["json", "txt", "md", "log"];

/// Extract the gist id from a page or raw URL.
pub fn extract_gist_id(locator: &str) -> Option<&str> {
    let locator = locator.trim();
    GIST_PAGE_RE
        .captures(locator)
        .or_else(|| GIST_RAW_RE.captures(locator))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GistResponse {
    /// Keyed by filename; the map keeps them in filename order.
    files: BTreeMap<String, GistFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct GistFile {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    raw_url: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    truncated: bool,
}

// ---------------------------------------------------------------------------
// Conversation file selection
// ---------------------------------------------------------------------------

fn has_conversation_extension(name: &str) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(_, ext)| CONVERSATION_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Pick the conversation file, in priority order:
/// 1. name contains "conversation"
/// 2. a transcript-like name (`chat.txt`, `session-2.json`, ...)
/// 3. a conversation extension on a name not starting with a digit
/// 4. the first name outside the context naming convention
///
/// Names are considered in sorted order within each tier.
pub fn select_conversation_file<'a, I>(names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&str> = names.into_iter().collect();
    let tiers: [&dyn Fn(&str) -> bool; 4] = [
        &|n: &str| n.to_lowercase().contains("conversation"),
        &|n: &str| TRANSCRIPT_NAME_RE.is_match(n),
        &|n: &str| has_conversation_extension(n) && !n.starts_with(|c: char| c.is_ascii_digit()),
        &|n: &str| parse_message_range(n).is_empty(),
    ];

    tiers
        .iter()
        .find_map(|matches| names.iter().copied().find(|&n| matches(n)))
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct GistAdapter {
    client: Client,
    api_base: String,
    listings: ListingCache<GistResponse>,
}

impl GistAdapter {
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

    async fn fetch_gist(&self, locator: &str) -> Result<(String, Arc<GistResponse>)> {
        let id = extract_gist_id(locator)
            .ok_or_else(|| ReplayError::invalid_locator(format!("not a gist URL: {locator}")))?;
        let api_url = format!("{}/gists/{id}", self.api_base);
        let gist = self
            .listings
            .get_or_fetch(&api_url, || fetch_json(&self.client, &api_url, "Gist"))
            .await?;
        Ok((id.to_string(), gist))
    }

    async fn discover(&self, locator: &str) -> Result<Vec<ContextItem>> {
        let (_, gist) = self.fetch_gist(locator).await?;
        let conversation = select_conversation_file(gist.files.keys().map(String::as_str));

        let mut items = Vec::new();
        for (name, file) in &gist.files {
            if Some(name.as_str()) == conversation {
                continue;
            }
            let Some(raw_url) = &file.raw_url else {
                debug!(%name, "gist file has no raw url");
                continue;
            };

            let extra = ContextMeta {
                size: file.size,
                ..Default::default()
            };
            let item = create_context_item(name, raw_url, Some(extra));
            if validate_context_item(&item) {
                items.push(item);
            } else {
                debug!(%name, "not a context filename");
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl SourceAdapter for GistAdapter {
    fn name(&self) -> &str {
        "gist"
    }

    fn handles(&self, locator: &str) -> bool {
        extract_gist_id(locator).is_some()
    }

    #[instrument(skip_all, fields(locator = %locator))]
    async fn fetch_content(&self, locator: &str) -> Result<String> {
        let (id, gist) = self.fetch_gist(locator).await?;

        let name = select_conversation_file(gist.files.keys().map(String::as_str))
            .ok_or_else(|| ReplayError::NoConversationFile {
                location: format!("gist {id}"),
            })?;
        info!(file = %name, files = gist.files.len(), "conversation file selected");

        let file = &gist.files[name];
        match (&file.content, file.truncated) {
            (Some(content), false) => Ok(content.clone()),
            _ => {
                let raw_url = file.raw_url.as_deref().ok_or_else(|| {
                    ReplayError::malformed(format!(
                        "gist file {name} has neither content nor raw_url"
                    ))
                })?;
                debug!(%raw_url, "fetching full file content");
                fetch_text(&self.client, raw_url, "Gist file").await
            }
        }
    }

    #[instrument(skip_all, fields(locator = %locator))]
    async fn discover_context(&self, locator: &str) -> Vec<ContextItem> {
        match self.discover(locator).await {
            Ok(items) => {
                info!(items = items.len(), "gist context discovered");
                items
            }
            Err(e) => {
                warn!(error = %e, "context discovery failed");
                Vec::new()
            }
        }
    }
}
