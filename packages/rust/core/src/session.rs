//! One active conversation: locator → adapter → content + context → parse.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument};

use convoreplay_formats::{FormatRegistry, parse_with};
use convoreplay_prefetch::Prefetcher;
use convoreplay_shared::{
    AppConfig, ContextItem, ConversationData, PrefetchConfig, Result, SourceOptions,
    group_context_by_message, sort_context_items, validate_context_item,
};
use convoreplay_sources::SourceRegistry;

/// Result of [`ReplaySession::load`].
#[derive(Debug, Clone, Serialize)]
pub struct LoadedConversation {
    pub data: ConversationData,
    /// Valid context items, ordered by first message position.
    pub context: Vec<ContextItem>,
    /// Name of the adapter that served the locator.
    pub adapter: String,
}

impl LoadedConversation {
    /// Context items keyed by each message position they apply to.
    pub fn context_by_message(&self) -> BTreeMap<u32, Vec<ContextItem>> {
        group_context_by_message(&self.context)
    }
}

/// Owns the adapters, parsers and the prefetch scheduler for a single
/// active conversation.
pub struct ReplaySession {
    sources: SourceRegistry,
    formats: FormatRegistry,
    prefetcher: Prefetcher,
}

impl ReplaySession {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let sources = SourceRegistry::new(&SourceOptions::from(config))?;
        let prefetcher = Prefetcher::new(PrefetchConfig::from(config))?;
        Ok(Self::with_parts(sources, FormatRegistry::new(), prefetcher))
    }

    pub fn with_parts(
        sources: SourceRegistry,
        formats: FormatRegistry,
        prefetcher: Prefetcher,
    ) -> Self {
        Self {
            sources,
            formats,
            prefetcher,
        }
    }

    pub fn prefetcher(&self) -> &Prefetcher {
        &self.prefetcher
    }

    /// Load a conversation.
    ///
    /// Content retrieval and context discovery run concurrently. Retrieval
    /// failures abort the load; discovery never does. Discovered items are
    /// handed to the scheduler, replacing any previous conversation's queue.
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip_all, fields(locator = %locator))]
    pub async fn load(&self, locator: &str) -> Result<LoadedConversation> {
        let start = Instant::now();
        let adapter = self.sources.select(locator);

        let (content, discovered) = tokio::join!(
            adapter.fetch_content(locator),
            adapter.discover_context(locator),
        );
        let content = content?;

        let data = parse_with(&self.formats, &content);

        let discovered_count = discovered.len();
        let mut context: Vec<ContextItem> = discovered
            .into_iter()
            .filter(validate_context_item)
            .collect();
        sort_context_items(&mut context);
        if context.len() < discovered_count {
            debug!(dropped = discovered_count - context.len(), "invalid context items dropped");
        }

        self.prefetcher.queue_items(context.clone());

        info!(
            adapter = adapter.name(),
            format = %data.metadata.format,
            messages = data.messages.len(),
            context = context.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "conversation loaded"
        );

        Ok(LoadedConversation {
            data,
            context,
            adapter: adapter.name().to_string(),
        })
    }

    /// Forget the active conversation's prefetch state.
    pub fn discard(&self) {
        self.prefetcher.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoreplay_shared::{MessageType, ReplayError};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session() -> ReplaySession {
        let mut config = AppConfig::default();
        config.prefetch.cycle_delay_ms = 1;
        ReplaySession::new(&config).unwrap()
    }

    async fn serve(server: &MockServer, route: &str, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn loads_transcript_with_context() {
        let server = MockServer::start().await;
        serve(&server, "/chat.txt", 200, "> show me\n\nhere it is\n\n> thanks").await;
        serve(&server, "/chat.map", 200, "3: shot.png\n2: snippet.rs\nx: nope.md\n").await;
        serve(&server, "/snippet.rs", 200, "fn main() {}").await;

        let session = session();
        let locator = format!("{}/chat.txt?context=chat.map", server.uri());
        let loaded = session.load(&locator).await.unwrap();

        assert_eq!(loaded.adapter, "file");
        assert_eq!(loaded.data.metadata.format, "text");
        let kinds: Vec<MessageType> = loaded.data.messages.iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![MessageType::Human, MessageType::Agent, MessageType::Human]);

        let names: Vec<&str> = loaded.context.iter().map(|c| c.filename.as_str()).collect();
        assert_eq!(names, vec!["2.rs", "3.png"]);
        assert_eq!(loaded.context_by_message()[&3][0].filename, "3.png");

        session.prefetcher().wait_until_idle().await;
        assert_eq!(
            session.prefetcher().get_cached_content(&loaded.context[0]).as_deref(),
            Some("fn main() {}")
        );
        assert!(!session.prefetcher().is_cached(&loaded.context[1]));

        session.discard();
        assert_eq!(session.prefetcher().status().total, 0);
    }

    #[tokio::test]
    async fn retrieval_failure_aborts_load() {
        let server = MockServer::start().await;
        serve(&server, "/gone.txt", 404, "").await;

        let err = session()
            .load(&format!("{}/gone.txt", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplayError::NotFound { .. }));
    }

    #[tokio::test]
    async fn discovery_failure_does_not() {
        let server = MockServer::start().await;
        serve(&server, "/chat.json", 200, r#"{"messages":[{"role":"user","content":"hi"}]}"#).await;
        serve(&server, "/missing.map", 500, "").await;

        let loaded = session()
            .load(&format!("{}/chat.json?context=missing.map", server.uri()))
            .await
            .unwrap();
        assert_eq!(loaded.data.metadata.format, "json-generic");
        assert_eq!(loaded.data.messages.len(), 1);
        assert!(loaded.context.is_empty());
    }
}
