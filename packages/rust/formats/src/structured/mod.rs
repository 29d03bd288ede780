//! Structured-document parser family.
//!
//! Each schema is a [`StructuredFormat`]: a total `detect` predicate over a
//! parsed [`Value`] plus a `parse` that never fails. The [`FormatRegistry`]
//! consults them in fixed priority order (turn history, flat array) and falls
//! back to the generic parser when none match.

pub mod flat;
pub mod generic;
pub mod history;
pub mod turns;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use convoreplay_shared::ConversationData;

pub use flat::FlatFormat;
pub use generic::GenericFormat;
pub use history::{
    CURRENT_VERSION, CurrentHistory, HistoryFormat, HistoryVersion, LEGACY_VERSION,
    LegacyHistory, VersionRegistry,
};
pub use turns::Turn;

/// One structured schema.
pub trait StructuredFormat: Send + Sync {
    /// Does this document have the schema's shape?
    fn detect(&self, value: &Value) -> bool;

    /// Normalize a document. Only called after `detect` returned true.
    fn parse(&self, value: &Value) -> ConversationData;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Vendor formats in priority order, plus the generic fallback.
pub struct FormatRegistry {
    formats: Vec<Box<dyn StructuredFormat>>,
    fallback: GenericFormat,
}

impl FormatRegistry {
    /// Registry with the built-in formats.
    pub fn new() -> Self {
        Self {
            formats: vec![Box::new(HistoryFormat::new()), Box::new(FlatFormat)],
            fallback: GenericFormat,
        }
    }

    /// Registry whose turn-history format uses a custom version table.
    pub fn with_versions(versions: VersionRegistry) -> Self {
        Self {
            formats: vec![
                Box::new(HistoryFormat::with_registry(versions)),
                Box::new(FlatFormat),
            ],
            fallback: GenericFormat,
        }
    }

    /// Highest-priority format matching the document.
    pub fn detect(&self, value: &Value) -> &dyn StructuredFormat {
        self.formats
            .iter()
            .map(|f| f.as_ref())
            .find(|f| f.detect(value))
            .unwrap_or(&self.fallback)
    }

    pub fn parse(&self, value: &Value) -> ConversationData {
        let format = self.detect(value);
        debug!(format = format.name(), "structured format selected");
        format.parse(value)
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Vendor family recognized by [`analyze`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Vendor {
    TurnHistory,
    FlatArray,
    Generic,
}

/// Shape of the first history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryShape {
    Array,
    Object,
    Other,
    Missing,
}

/// What the dispatcher would see in a document, without parsing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatAnalysis {
    pub vendor: Vendor,
    /// Resolved version tag for turn-history documents.
    pub version: Option<String>,
    pub history_len: usize,
    pub first_entry_shape: EntryShape,
}

/// Describe how a document would be classified.
pub fn analyze(value: &Value) -> FormatAnalysis {
    let history_format = HistoryFormat::new();
    let history = value
        .get("history")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let first_entry_shape = match history.first() {
        None => EntryShape::Missing,
        Some(Value::Array(_)) => EntryShape::Array,
        Some(Value::Object(_)) => EntryShape::Object,
        Some(_) => EntryShape::Other,
    };

    let (vendor, version) = if history_format.detect(value) {
        (
            Vendor::TurnHistory,
            history_format.detect_version(value).map(str::to_string),
        )
    } else if FlatFormat.detect(value) {
        (Vendor::FlatArray, None)
    } else {
        (Vendor::Generic, None)
    };

    FormatAnalysis {
        vendor,
        version,
        history_len: history.len(),
        first_entry_shape,
    }
}
