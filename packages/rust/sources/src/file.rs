//! Direct file retrieval: remote URLs, `file://` URLs and bare local paths.
//!
//! Context is only discovered through an explicit context map named by a
//! query parameter on the locator, e.g.
//! `https://host/chat.txt?context=chat.context`. The map lists one
//! `<range>: <url>` pair per line:
//!
//! ```text
//! # screenshots
//! 2: shots/login.png
//! 4-6: https://cdn.example.com/demo.mp4
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use convoreplay_shared::{
    ContextItem, ReplayError, Result, SourceOptions, create_context_item, validate_context_item,
};

use crate::SourceAdapter;
use crate::http::{build_client, fetch_text};

/// Where a file locator points.
#[derive(Debug, Clone, PartialEq)]
enum FileLocation {
    Remote(Url),
    Local(PathBuf),
}

fn resolve_location(locator: &str) -> Result<FileLocation> {
    let locator = locator.trim();
    if locator.is_empty() {
        return Err(ReplayError::invalid_locator("empty locator"));
    }

    match Url::parse(locator) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(FileLocation::Remote(url)),
            "file" => url
                .to_file_path()
                .map(FileLocation::Local)
                .map_err(|()| ReplayError::invalid_locator(format!("not a local path: {url}"))),
            // `C:\chat.txt` parses with a one-letter scheme.
            scheme if scheme.len() == 1 => Ok(FileLocation::Local(PathBuf::from(locator))),
            scheme => Err(ReplayError::invalid_locator(format!(
                "unsupported scheme '{scheme}' in {locator}"
            ))),
        },
        Err(_) => Ok(FileLocation::Local(PathBuf::from(locator))),
    }
}

/// Fetches a single file; the always-matching fallback adapter.
pub struct FileAdapter {
    client: Client,
    context_param: String,
}

impl FileAdapter {
    pub fn new(opts: &SourceOptions) -> Result<Self> {
        Ok(Self::with_client(build_client(opts)?, opts))
    }

    pub fn with_client(client: Client, opts: &SourceOptions) -> Self {
        Self {
            client,
            context_param: opts.context_param.clone(),
        }
    }

    async fn read(&self, location: &FileLocation) -> Result<String> {
        match location {
            FileLocation::Remote(url) => fetch_text(&self.client, url.as_str(), "File").await,
            FileLocation::Local(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ReplayError::io(path, e)),
        }
    }

    /// The context map's URL, when the locator declares one.
    fn context_map_url(&self, locator: &str) -> Result<Option<Url>> {
        let base = match resolve_location(locator)? {
            FileLocation::Remote(url) => url,
            FileLocation::Local(_) => match Url::parse(locator.trim()) {
                Ok(url) if url.scheme() == "file" => url,
                // Bare paths carry no query string.
                _ => return Ok(None),
            },
        };

        let Some((_, value)) = base
            .query_pairs()
            .find(|(key, _)| *key == self.context_param.as_str())
        else {
            return Ok(None);
        };

        base.join(&value)
            .map(Some)
            .map_err(|e| ReplayError::invalid_locator(format!("context map '{value}': {e}")))
    }

    async fn discover(&self, locator: &str) -> Result<Vec<ContextItem>> {
        let Some(map_url) = self.context_map_url(locator)? else {
            debug!("no context map declared");
            return Ok(Vec::new());
        };

        let location = resolve_location(map_url.as_str())?;
        let text = self.read(&location).await?;
        let items = parse_context_map(&text, &map_url);
        info!(%map_url, items = items.len(), "context map loaded");
        Ok(items)
    }
}

#[async_trait]
impl SourceAdapter for FileAdapter {
    fn name(&self) -> &str {
        "file"
    }

    fn handles(&self, _locator: &str) -> bool {
        true
    }

    #[instrument(skip_all, fields(locator = %locator))]
    async fn fetch_content(&self, locator: &str) -> Result<String> {
        let location = resolve_location(locator)?;
        self.read(&location).await
    }

    #[instrument(skip_all, fields(locator = %locator))]
    async fn discover_context(&self, locator: &str) -> Vec<ContextItem> {
        match self.discover(locator).await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "context discovery failed");
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Context map
// ---------------------------------------------------------------------------

/// Extension of the last path segment of a URL, if any.
fn url_extension(url: &Url) -> Option<&str> {
    let segment = url.path_segments()?.next_back()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}

/// Parse a context map. Relative URLs resolve against `base`; invalid lines
/// are skipped.
pub fn parse_context_map(text: &str, base: &Url) -> Vec<ContextItem> {
    let mut items = Vec::new();

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((range, target)) = line.split_once(':') else {
            debug!(line = number + 1, "context map line has no ':'");
            continue;
        };
        let (range, target) = (range.trim(), target.trim());

        let url = match base.join(target) {
            Ok(url) => url,
            Err(e) => {
                debug!(line = number + 1, error = %e, "bad context url");
                continue;
            }
        };

        let filename = match url_extension(&url) {
            Some(ext) => format!("{range}.{ext}"),
            None => range.to_string(),
        };

        let item = create_context_item(&filename, url.as_str(), None);
        if validate_context_item(&item) {
            items.push(item);
        } else {
            debug!(line = number + 1, %range, "invalid context range");
        }
    }

    items
}
