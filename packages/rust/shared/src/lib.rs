//! Shared types, error model, range codec and configuration for convoreplay.
//!
//! This crate is the foundation depended on by all other convoreplay crates.
//! It provides:
//! - [`ReplayError`], the unified error type
//! - Domain types ([`ConversationData`], [`Message`], [`ContextItem`])
//! - The context filename convention ([`parse_message_range`], [`create_context_item`])
//! - Configuration ([`AppConfig`], [`SourceOptions`], [`PrefetchConfig`], config loading)

pub mod config;
pub mod context;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, PrefetchConfig, PrefetchSection, SourceOptions, SourcesConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use context::{
    create_context_item, detect_content_type, get_language_from_extension, get_mime_type,
    group_context_by_message, parse_message_range, sort_context_items, validate_context_item,
};
pub use error::{ReplayError, Result};
pub use types::{
    ContextItem, ContextKind, ContextMeta, ConversationData, ConversationMeta, Message,
    MessageMeta, MessageType, MetaValue, ToolRecordKind, now_timestamp,
};
