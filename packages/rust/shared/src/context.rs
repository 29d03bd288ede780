//! Context-file naming convention and classification.
//!
//! A context file's name declares which messages it belongs to:
//! `4.jpg` attaches to message 4, `7-8.mov` to messages 7 and 8. Names
//! without a numeric prefix are not context files.

use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

use crate::types::{ContextItem, ContextKind, ContextMeta};

/// Widest `start-end` span accepted before the pair is treated as invalid.
pub const MAX_RANGE_SPAN: u32 = 1000;

// ---------------------------------------------------------------------------
// Range codec
// ---------------------------------------------------------------------------

/// Parse the message positions encoded in a filename.
///
/// Everything from the first `.` on is ignored. A `start-end` pair yields the
/// inclusive range; otherwise a leading digit run yields a single index.
/// Returns an empty set when no numeric pattern is present.
pub fn parse_message_range(filename: &str) -> BTreeSet<u32> {
    let base = filename.split('.').next().unwrap_or_default();

    if base.contains('-') {
        let mut parts = base.split('-');
        let start = parts.next().and_then(|p| leading_int(p.trim()));
        let end = parts.next().and_then(|p| leading_int(p.trim()));

        if let (Some(start), Some(end)) = (start, end) {
            if start <= end && end - start < MAX_RANGE_SPAN {
                return (start..=end).collect();
            }
        }
    }

    leading_int(base).into_iter().collect()
}

/// Parse the leading decimal digit run of `s`, if any. Runs too large for
/// `u32` saturate to `u32::MAX`.
fn leading_int(s: &str) -> Option<u32> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| i);
    if end == 0 {
        return None;
    }
    Some(s[..end].parse().unwrap_or(u32::MAX))
}

/// Lowercased text after the last `.`; the whole name when there is no dot.
fn extension(filename: &str) -> String {
    filename
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

// ---------------------------------------------------------------------------
// Classification tables
// ---------------------------------------------------------------------------

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "avi", "mov", "wmv", "flv", "m4v"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "aac", "m4a", "flac"];
const CODE_EXTENSIONS: &[&str] = &[
    "js", "ts", "jsx", "tsx", "vue", "py", "java", "cpp", "c", "cs", "php", "rb", "go", "rs",
    "swift", "kt", "scala", "html", "css", "scss", "sass", "less", "json", "xml", "yaml", "yml",
    "toml", "ini", "cfg", "conf", "sh", "bash", "zsh", "fish", "ps1", "bat", "cmd",
];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "txt", "md", "rtf", "odt"];

/// Classify a filename by extension. `ogg` is treated as video.
pub fn detect_content_type(filename: &str) -> ContextKind {
    let ext = extension(filename);
    let ext = ext.as_str();

    if IMAGE_EXTENSIONS.contains(&ext) {
        ContextKind::Image
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        ContextKind::Video
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        ContextKind::Audio
    } else if CODE_EXTENSIONS.contains(&ext) {
        ContextKind::Code
    } else if DOCUMENT_EXTENSIONS.contains(&ext) {
        ContextKind::Document
    } else {
        ContextKind::Other
    }
}

/// Syntax-highlighting language for a filename; `text` when unknown.
pub fn get_language_from_extension(filename: &str) -> &'static str {
    match extension(filename).as_str() {
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "vue" => "vue",
        "py" => "python",
        "java" => "java",
        "cpp" => "cpp",
        "c" => "c",
        "cs" => "csharp",
        "php" => "php",
        "rb" => "ruby",
        "go" => "go",
        "rs" => "rust",
        "swift" => "swift",
        "kt" => "kotlin",
        "scala" => "scala",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "sass" => "sass",
        "less" => "less",
        "json" => "json",
        "xml" => "xml",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "ini" => "ini",
        "sh" | "bash" | "zsh" => "bash",
        "fish" => "fish",
        "ps1" => "powershell",
        "bat" | "cmd" => "batch",
        "sql" => "sql",
        "md" => "markdown",
        _ => "text",
    }
}

/// MIME type for a filename; `application/octet-stream` when unknown.
pub fn get_mime_type(filename: &str) -> &'static str {
    match extension(filename).as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "ogg" => "video/ogg",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "aac" => "audio/aac",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "odt" => "application/vnd.oasis.opendocument.text",
        "rtf" => "application/rtf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "html" => "text/html",
        "css" => "text/css",
        "js" | "jsx" => "text/javascript",
        "ts" | "tsx" => "text/typescript",
        "json" => "application/json",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "toml" => "application/toml",
        "sh" | "bash" | "zsh" => "application/x-sh",
        "py" | "rs" | "go" | "java" | "c" | "cpp" | "cs" | "rb" | "php" | "swift" | "kt"
        | "scala" | "vue" | "scss" | "sass" | "less" | "ini" | "cfg" | "conf" | "fish" | "ps1"
        | "bat" | "cmd" | "sql" => "text/plain",
        _ => "application/octet-stream",
    }
}

// ---------------------------------------------------------------------------
// ContextItem construction
// ---------------------------------------------------------------------------

/// Build a context item from a filename and its retrieval url.
///
/// The result is not guaranteed valid; run it through
/// [`validate_context_item`] before surfacing it.
pub fn create_context_item(filename: &str, url: &str, extra: Option<ContextMeta>) -> ContextItem {
    let kind = detect_content_type(filename);

    let base = ContextMeta {
        mime_type: Some(get_mime_type(filename).to_string()),
        language: (kind == ContextKind::Code)
            .then(|| get_language_from_extension(filename).to_string()),
        ..Default::default()
    };

    ContextItem {
        id: format!("{filename}-{}", Uuid::now_v7().simple()),
        kind,
        url: url.to_string(),
        filename: filename.to_string(),
        message_range: parse_message_range(filename),
        metadata: match extra {
            Some(extra) => base.merge(extra),
            None => base,
        },
    }
}

/// The sole gate before a context item is surfaced.
pub fn validate_context_item(item: &ContextItem) -> bool {
    !item.id.is_empty()
        && !item.url.is_empty()
        && !item.filename.is_empty()
        && !item.message_range.is_empty()
        && item.message_range.iter().all(|&n| n > 0)
}

/// Stable sort by earliest message position; items without a range go last.
pub fn sort_context_items(items: &mut [ContextItem]) {
    items.sort_by_key(|item| item.first_message().unwrap_or(u32::MAX));
}

/// Index items by every message position they apply to.
pub fn group_context_by_message(items: &[ContextItem]) -> BTreeMap<u32, Vec<ContextItem>> {
    let mut map: BTreeMap<u32, Vec<ContextItem>> = BTreeMap::new();
    for item in items {
        for &position in &item.message_range {
            map.entry(position).or_default().push(item.clone());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(filename: &str) -> Vec<u32> {
        parse_message_range(filename).into_iter().collect()
    }

    #[test]
    fn single_index() {
        assert_eq!(range("4.jpg"), vec![4]);
        assert_eq!(range("12.md"), vec![12]);
        assert_eq!(range("3"), vec![3]);
    }

    #[test]
    fn inclusive_range() {
        assert_eq!(range("7-8.mov"), vec![7, 8]);
        assert_eq!(range("1-3.png"), vec![1, 2, 3]);
        assert_eq!(range("5-5.txt"), vec![5]);
    }

    #[test]
    fn descriptive_suffix_falls_back_to_leading_index() {
        assert_eq!(range("10-code.js"), vec![10]);
        assert_eq!(range("6screenshot.png"), vec![6]);
    }

    #[test]
    fn reversed_range_falls_back_to_start() {
        assert_eq!(range("8-7.mov"), vec![8]);
    }

    #[test]
    fn oversized_span_is_not_expanded() {
        assert_eq!(range("1-4000000000.png"), vec![1]);
    }

    #[test]
    fn oversized_index_saturates() {
        assert_eq!(range("99999999999.png"), vec![u32::MAX]);
        assert_eq!(range("99999999999-3.png"), vec![u32::MAX]);
        let item = create_context_item("99999999999.png", "https://example.com/x.png", None);
        assert!(validate_context_item(&item));
    }

    #[test]
    fn non_convention_names_are_empty() {
        assert!(range("notes.md").is_empty());
        assert!(range("README.md").is_empty());
        assert!(range("conversation.json").is_empty());
        assert!(range("-3.png").is_empty());
        assert!(range("").is_empty());
    }

    #[test]
    fn only_first_dot_segment_counts() {
        assert_eq!(range("2.backup.txt"), vec![2]);
    }

    #[test]
    fn content_type_detection() {
        assert_eq!(detect_content_type("4.JPG"), ContextKind::Image);
        assert_eq!(detect_content_type("7-8.mov"), ContextKind::Video);
        assert_eq!(detect_content_type("clip.ogg"), ContextKind::Video);
        assert_eq!(detect_content_type("voice.flac"), ContextKind::Audio);
        assert_eq!(detect_content_type("6.js"), ContextKind::Code);
        assert_eq!(detect_content_type("2.md"), ContextKind::Document);
        assert_eq!(detect_content_type("archive.zip"), ContextKind::Other);
        assert_eq!(detect_content_type("Makefile"), ContextKind::Other);
    }

    #[test]
    fn language_and_mime_fallbacks() {
        assert_eq!(get_language_from_extension("main.rs"), "rust");
        assert_eq!(get_language_from_extension("run.zsh"), "bash");
        assert_eq!(get_language_from_extension("data.bin"), "text");
        assert_eq!(get_mime_type("4.png"), "image/png");
        assert_eq!(get_mime_type("blob.xyz"), "application/octet-stream");
    }

    #[test]
    fn create_sets_language_only_for_code() {
        let code = create_context_item("6.js", "https://example.com/6.js", None);
        assert_eq!(code.kind, ContextKind::Code);
        assert_eq!(code.metadata.language.as_deref(), Some("javascript"));
        assert_eq!(code.metadata.mime_type.as_deref(), Some("text/javascript"));

        let doc = create_context_item("2.md", "https://example.com/2.md", None);
        assert_eq!(doc.kind, ContextKind::Document);
        assert!(doc.metadata.language.is_none());
    }

    #[test]
    fn create_merges_extra_metadata() {
        let item = create_context_item(
            "4.jpg",
            "https://example.com/4.jpg",
            Some(ContextMeta {
                size: Some(2048),
                ..Default::default()
            }),
        );
        assert_eq!(item.metadata.size, Some(2048));
        assert_eq!(item.metadata.mime_type.as_deref(), Some("image/jpeg"));
        assert!(item.id.starts_with("4.jpg-"));
    }

    #[test]
    fn ids_are_unique() {
        let a = create_context_item("1.png", "u", None);
        let b = create_context_item("1.png", "u", None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn validation_gate() {
        let valid = create_context_item("4.jpg", "https://example.com/4.jpg", None);
        assert!(validate_context_item(&valid));

        let no_range = create_context_item("notes.md", "https://example.com/notes.md", None);
        assert!(!validate_context_item(&no_range));

        let zero = create_context_item("0.png", "https://example.com/0.png", None);
        assert!(!validate_context_item(&zero));

        let mut no_url = valid.clone();
        no_url.url.clear();
        assert!(!validate_context_item(&no_url));
    }

    #[test]
    fn sorting_is_stable_by_first_message() {
        let mut items = vec![
            create_context_item("3.png", "a", None),
            create_context_item("1-2.png", "b", None),
            create_context_item("notes.md", "c", None),
            create_context_item("3.md", "d", None),
        ];
        sort_context_items(&mut items);
        let urls: Vec<&str> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["b", "a", "d", "c"]);
    }

    #[test]
    fn grouping_by_message() {
        let items = vec![
            create_context_item("1-2.png", "a", None),
            create_context_item("2.md", "b", None),
        ];
        let groups = group_context_by_message(&items);
        assert_eq!(groups[&1].len(), 1);
        assert_eq!(groups[&2].len(), 2);
        assert!(!groups.contains_key(&3));
    }
}
