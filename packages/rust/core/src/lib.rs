//! Session orchestration for convoreplay.
//!
//! This crate ties together source selection, retrieval, format dispatch and
//! context prefetching into one workflow: [`ReplaySession::load`].

pub mod session;

pub use convoreplay_formats::parse_conversation as parse_content;
pub use session::{LoadedConversation, ReplaySession};
