//! Source retrieval: HTTP fetching plus the two extraction strategies.
//!
//! - [`parser`] - RSS/Atom/JSON Feed entries via the `feed-rs` crate
//! - [`scrape`] - heuristic article blocks from plain HTML pages
//! - [`fetcher`] - HTTP client with pacing, User-Agent rotation and size limits
//!
//! Both strategies emit [`RawItem`]s. Nothing here cleans or classifies text;
//! that happens in [`crate::ingest`].

mod fetcher;
mod parser;
mod scrape;

pub use fetcher::{FetchError, FetchSettings, Fetcher};
pub use parser::parse_feed;
pub use scrape::scrape_page;

/// One item as found at a source, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    pub title: String,
    pub summary: String,
    /// Fuller body when the source provides one
    pub body: Option<String>,
    pub link: String,
    pub image_url: Option<String>,
    pub author: Option<String>,
    /// Timestamp exactly as the source wrote it
    pub published: Option<String>,
    /// Display name of the producing source (`SourceConfig::name`, not its
    /// id). Source filters and per-source stats are keyed by this value.
    pub source_name: String,
    /// Endpoint the item was fetched from
    pub base_url: String,
}
