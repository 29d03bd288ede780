//! Background prefetching of context-item content.
//!
//! Only textual items (documents and code) are fetched; binary media is
//! rendered from its url and is recorded as not prefetchable.

mod fetcher;
mod scheduler;

pub use fetcher::{ContentFetcher, HttpFetcher};
pub use scheduler::{LoadingHandle, PrefetchRecord, PrefetchStatus, Prefetcher, QueueStatus};
