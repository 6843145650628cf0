//! Heuristic article extraction from plain HTML pages.
//!
//! Uses simple string scanning rather than a DOM. Tag and attribute names
//! are matched on an ASCII-lowercased copy of the page so byte offsets line
//! up with the original text, and values are read from the original to
//! preserve case.

use once_cell::sync::Lazy;
use regex::Regex;

use super::RawItem;
use crate::config::SourceConfig;
use crate::util::{resolve_url, strip_markup};

/// Class fragments that mark a `<div>` as an article container.
const CONTAINER_CLASS_HINTS: [&str; 4] = ["post", "article", "news", "item"];

static HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<h[1-4](?:\s[^>]*)?>(.*?)</h[1-4]\s*>").expect("heading pattern")
});
static PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p\s*>").expect("paragraph pattern"));

/// Extracts up to `max_items` article-like blocks from an HTML page.
///
/// Containers are `<article>` elements, or when the page has none, `<div>`s
/// whose class mentions post, article, news or item. Containers nested in an
/// already selected one are skipped. The cap counts containers in page
/// order; a block without a title or a resolvable link is then dropped, and
/// a page with no usable blocks yields an empty list.
pub fn scrape_page(html: &str, source: &SourceConfig, max_items: usize) -> Vec<RawItem> {
    let lower = html.to_ascii_lowercase();

    let mut containers = select_elements(html, &lower, "article", |_| true);
    if containers.is_empty() {
        containers = select_elements(html, &lower, "div", is_article_div);
    }
    let candidates = containers.len();

    let items: Vec<RawItem> = containers
        .into_iter()
        .take(max_items)
        .filter_map(|block| block_to_item(block, source))
        .collect();

    tracing::debug!(
        source = %source.name,
        candidates,
        kept = items.len(),
        "Scraped page"
    );
    items
}

fn is_article_div(open_tag: &str) -> bool {
    attr_value(open_tag, "class")
        .map(|class| {
            let class = class.to_ascii_lowercase();
            CONTAINER_CLASS_HINTS.iter().any(|hint| class.contains(hint))
        })
        .unwrap_or(false)
}

fn block_to_item(block: &str, source: &SourceConfig) -> Option<RawItem> {
    let heading = HEADING.captures(block)?;
    let heading_html = heading.get(1).map(|m| m.as_str()).unwrap_or_default();
    let title = strip_markup(heading_html);
    if title.is_empty() {
        return None;
    }

    // Heading anchor first; placeholders like "#" fall through to the block.
    let link = first_resolved_link(heading_html, &source.url)
        .or_else(|| first_resolved_link(block, &source.url))?;

    let summary = PARAGRAPH
        .captures(block)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
        .or_else(|| description_div(block))
        .unwrap_or_default();

    let image_url = first_tag_attr(block, "img", "src")
        .and_then(|src| resolve_url(src, &source.url));

    let published = first_tag_attr(block, "time", "datetime")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned);

    Some(RawItem {
        title,
        summary,
        body: None,
        link,
        image_url,
        author: None,
        published,
        source_name: source.name.clone(),
        base_url: source.url.clone(),
    })
}

/// Inner HTML of the first `<div>` whose class contains "desc".
fn description_div(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    select_elements(html, &lower, "div", |tag| {
        attr_value(tag, "class")
            .map(|c| c.to_ascii_lowercase().contains("desc"))
            .unwrap_or(false)
    })
    .into_iter()
    .next()
    .map(str::to_owned)
}

// ============================================================================
// Tag scanning
// ============================================================================

/// Finds the position of the next `<name` opening tag at or after `from`.
fn find_open(lower: &str, name: &str, from: usize) -> Option<usize> {
    let needle = format!("<{name}");
    let mut pos = from;
    while let Some(rel) = lower.get(pos..)?.find(&needle) {
        let start = pos + rel;
        let after = start + needle.len();
        match lower.as_bytes().get(after) {
            Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => return Some(start),
            None => return None,
            _ => pos = after,
        }
    }
    None
}

/// Returns the byte range of the element's inner content and the offset just
/// past its closing tag. Unclosed elements run to the end of the document.
fn element_bounds(lower: &str, name: &str, open_end: usize) -> (usize, usize, usize) {
    let close_needle = format!("</{name}");
    let mut depth = 1usize;
    let mut pos = open_end;

    loop {
        let next_close = lower.get(pos..).and_then(|s| s.find(&close_needle)).map(|r| pos + r);
        let Some(close) = next_close else {
            return (open_end, lower.len(), lower.len());
        };

        match find_open(lower, name, pos) {
            Some(open) if open < close => {
                depth += 1;
                pos = open + name.len() + 1;
            }
            _ => {
                depth -= 1;
                let close_end = lower[close..]
                    .find('>')
                    .map(|r| close + r + 1)
                    .unwrap_or(lower.len());
                if depth == 0 {
                    return (open_end, close, close_end);
                }
                pos = close_end;
            }
        }
    }
}

/// Collects the inner HTML of every `<name>` element whose opening tag
/// satisfies `accept`, skipping candidates that sit inside an element
/// already collected.
fn select_elements<'a>(
    html: &'a str,
    lower: &str,
    name: &str,
    accept: impl Fn(&str) -> bool,
) -> Vec<&'a str> {
    let mut selected = Vec::new();
    let mut covered_until = 0;
    let mut search_from = 0;

    while let Some(start) = find_open(lower, name, search_from) {
        let Some(open_end) = lower[start..].find('>').map(|r| start + r + 1) else {
            break;
        };
        search_from = open_end;

        if start < covered_until {
            continue;
        }
        if !accept(&html[start..open_end]) {
            continue;
        }

        let (inner_start, inner_end, end) = element_bounds(lower, name, open_end);
        selected.push(&html[inner_start..inner_end]);
        covered_until = end;
    }

    selected
}

/// Value of `attr` on the first `<tag>` in `html` that carries it.
fn first_tag_attr<'a>(html: &'a str, tag: &str, attr: &str) -> Option<&'a str> {
    let lower = html.to_ascii_lowercase();
    let mut from = 0;
    while let Some(start) = find_open(&lower, tag, from) {
        let end = lower[start..].find('>').map(|r| start + r + 1)?;
        if let Some(value) = attr_value(&html[start..end], attr) {
            return Some(value);
        }
        from = end;
    }
    None
}

/// First `<a href>` in `html` that resolves to a web URL.
fn first_resolved_link(html: &str, base: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let mut from = 0;
    while let Some(start) = find_open(&lower, "a", from) {
        let end = lower[start..].find('>').map(|r| start + r + 1)?;
        if let Some(link) = attr_value(&html[start..end], "href").and_then(|h| resolve_url(h, base)) {
            return Some(link);
        }
        from = end;
    }
    None
}

/// Extracts an attribute value from a single tag, case-preserving.
///
/// The attribute name must follow whitespace, so `src` does not match
/// `data-src`. Quoted and bare values are both accepted.
fn attr_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let lower = tag.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut from = 0;

    while let Some(rel) = lower.get(from..)?.find(name) {
        let start = from + rel;
        from = start + name.len();

        let preceded = start > 0 && bytes[start - 1].is_ascii_whitespace();
        let rest = lower[from..].trim_start();
        if !preceded || !rest.starts_with('=') {
            continue;
        }

        let value_start = tag.len() - rest.len() + 1;
        let value = tag[value_start..].trim_start();
        let offset = tag.len() - value.len();
        return match *value.as_bytes().first()? {
            q @ (b'"' | b'\'') => {
                let end = value[1..].find(q as char)?;
                Some(&tag[offset + 1..offset + 1 + end])
            }
            _ => {
                let end = value
                    .find(|c: char| c.is_ascii_whitespace() || c == '>')
                    .unwrap_or(value.len());
                Some(&value[..end]).filter(|v| !v.is_empty() && *v != "/")
            }
        };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchMode;
    use pretty_assertions::assert_eq;

    fn source() -> SourceConfig {
        SourceConfig::new(
            "blog",
            "Vendor Blog",
            "https://vendor.example.com/security/",
            FetchMode::PageScrape,
        )
    }

    #[test]
    fn test_article_elements_with_relative_links() {
        let html = r#"<html><body>
<article class="card">
  <h2><a href="/posts/one">Patch Tuesday roundup</a></h2>
  <img src="img/one.png">
  <time datetime="2024-02-13T18:00:00Z">Feb 13</time>
  <p>Microsoft fixed <b>73</b> flaws.</p>
</article>
<article>
  <h3>Second headline</h3>
  <a href="https://other.example.net/two">read more</a>
  <div class="description">Summary from a description block</div>
</article>
</body></html>"#;

        let items = scrape_page(html, &source(), 20);
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].title, "Patch Tuesday roundup");
        assert_eq!(items[0].link, "https://vendor.example.com/posts/one");
        assert_eq!(
            items[0].image_url.as_deref(),
            Some("https://vendor.example.com/security/img/one.png")
        );
        assert_eq!(items[0].published.as_deref(), Some("2024-02-13T18:00:00Z"));
        assert!(items[0].summary.contains("Microsoft fixed"));
        assert_eq!(items[0].source_name, "Vendor Blog");

        assert_eq!(items[1].title, "Second headline");
        assert_eq!(items[1].link, "https://other.example.net/two");
        assert_eq!(items[1].summary, "Summary from a description block");
        assert_eq!(items[1].image_url, None);
    }

    #[test]
    fn test_div_fallback_by_class() {
        let html = r#"
<div class="sidebar"><h2><a href="/ads">Sponsored</a></h2></div>
<div class="News-Item">
  <h4><a href="/n/1">Botnet takedown</a></h4>
  <p>Police seized servers.</p>
</div>"#;
        let items = scrape_page(html, &source(), 20);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Botnet takedown");
        assert_eq!(items[0].link, "https://vendor.example.com/n/1");
    }

    #[test]
    fn test_nested_candidates_skipped() {
        let html = r#"
<div class="post-list">
  <h1><a href="/all">All posts</a></h1>
  <div class="post"><h2><a href="/p/1">Inner one</a></h2></div>
  <div class="post"><h2><a href="/p/2">Inner two</a></h2></div>
</div>
<div class="post"><h2><a href="/p/3">Outer</a></h2></div>"#;
        let items = scrape_page(html, &source(), 20);
        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["All posts", "Outer"]);
    }

    #[test]
    fn test_blocks_without_title_or_link_skipped() {
        let html = r#"
<article><p>No heading here</p><a href="/x">x</a></article>
<article><h2>Heading but no link</h2></article>
<article><h2><a href="javascript:void(0)">Script link</a></h2></article>
<article><h2><a href="/ok">Kept</a></h2></article>"#;
        let items = scrape_page(html, &source(), 20);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Kept");
    }

    #[test]
    fn test_cap_and_empty_page() {
        let block = r#"<article><h2><a href="/a">T</a></h2></article>"#;
        let html = block.repeat(5);
        assert_eq!(scrape_page(&html, &source(), 3).len(), 3);

        // Unusable containers still count towards the cap
        let html = r#"
<article><p>No heading</p></article>
<article><h2><a href="/t0">T0</a></h2></article>
<article><h2><a href="/t1">T1</a></h2></article>
<article><h2><a href="/t2">T2</a></h2></article>"#;
        let titles: Vec<_> = scrape_page(html, &source(), 2)
            .into_iter()
            .map(|i| i.title)
            .collect();
        assert_eq!(titles, vec!["T0"]);

        assert!(scrape_page("<html><body>Nothing</body></html>", &source(), 20).is_empty());
        assert!(scrape_page("", &source(), 20).is_empty());
    }

    #[test]
    fn test_placeholder_heading_anchor_falls_back_to_block_link() {
        let html = r##"<article>
  <h2><a href="#">Router firmware backdoor</a></h2>
  <p>Details inside.</p>
  <a href="/posts/router-backdoor">Read more</a>
</article>"##;
        let items = scrape_page(html, &source(), 20);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "https://vendor.example.com/posts/router-backdoor");
    }

    #[test]
    fn test_data_src_not_mistaken_for_src() {
        let html = r#"<article><h2><a href="/a">T</a></h2><img data-src="/lazy.png" src="/real.png"></article>"#;
        let items = scrape_page(html, &source(), 20);
        assert_eq!(
            items[0].image_url.as_deref(),
            Some("https://vendor.example.com/real.png")
        );
    }

    #[test]
    fn test_attr_value_forms() {
        assert_eq!(attr_value(r#"<a href="/x">"#, "href"), Some("/x"));
        assert_eq!(attr_value("<a href='/y'>", "href"), Some("/y"));
        assert_eq!(attr_value("<a href=/z>", "href"), Some("/z"));
        assert_eq!(attr_value(r#"<a HREF = "/w">"#, "href"), Some("/w"));
        assert_eq!(attr_value("<a title=x>", "href"), None);
    }

    #[test]
    fn test_tag_prefix_not_confused() {
        // <articles> and <divider> are not containers
        let html = r#"<articles><h2><a href="/a">No</a></h2></articles>
<divider class="post"><h2><a href="/b">No</a></h2></divider>"#;
        assert!(scrape_page(html, &source(), 20).is_empty());
    }
}
