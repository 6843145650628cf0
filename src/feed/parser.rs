use feed_rs::model::Entry;
use feed_rs::parser::{self, ParseFeedError};

use super::RawItem;
use crate::config::SourceConfig;
use crate::util::resolve_url;

/// Parses an RSS, Atom or JSON Feed document into at most `max_items` raw items.
///
/// The cap counts raw entries in document order. Entries with neither a
/// title nor a link are then dropped, so fewer than `max_items` may come back.
pub fn parse_feed(
    bytes: &[u8],
    source: &SourceConfig,
    max_items: usize,
) -> Result<Vec<RawItem>, ParseFeedError> {
    let feed = parser::parse(bytes)?;
    let total = feed.entries.len();

    let items: Vec<RawItem> = feed
        .entries
        .into_iter()
        .take(max_items)
        .filter_map(|entry| entry_to_item(entry, source))
        .collect();

    tracing::debug!(
        source = %source.name,
        entries = total,
        kept = items.len(),
        "Parsed feed"
    );
    Ok(items)
}

fn entry_to_item(entry: Entry, source: &SourceConfig) -> Option<RawItem> {
    let title = entry.title.map(|t| t.content).unwrap_or_default();
    let link = entry
        .links
        .first()
        .map(|l| resolve_url(&l.href, &source.url).unwrap_or_else(|| l.href.clone()))
        .unwrap_or_default();

    if title.trim().is_empty() && link.trim().is_empty() {
        return None;
    }

    let image_url = entry.media.iter().find_map(|m| {
        m.content
            .iter()
            .find_map(|c| c.url.as_ref().map(|u| u.to_string()))
            .or_else(|| m.thumbnails.first().map(|t| t.image.uri.clone()))
    });

    Some(RawItem {
        title,
        summary: entry.summary.map(|s| s.content).unwrap_or_default(),
        body: entry.content.and_then(|c| c.body),
        link,
        image_url,
        author: entry.authors.into_iter().next().map(|p| p.name),
        published: entry.published.or(entry.updated).map(|dt| dt.to_rfc3339()),
        source_name: source.name.clone(),
        base_url: source.url.clone(),
    })
}
