use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

use crate::analysis::ThreatAnalyzer;
use crate::feed::RawItem;
use crate::storage::NewArticle;
use crate::util::{strip_control_chars, strip_markup};

/// Why a raw item could not become an article.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("item has no title")]
    MissingTitle,
    #[error("item has no url")]
    MissingUrl,
}

/// A cleaned item that has not been classified yet.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftArticle {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub image_url: Option<String>,
    pub author: Option<String>,
    pub source_name: String,
    pub published_at: DateTime<Utc>,
}

impl DraftArticle {
    /// Runs the analyzer over the draft and produces a storable record.
    pub fn classify(self, analyzer: &ThreatAnalyzer) -> NewArticle {
        let analysis = analyzer.analyze(&self.title, &self.content);
        NewArticle {
            url: self.url,
            title: self.title,
            summary: self.summary,
            content: self.content,
            image_url: self.image_url,
            author: self.author,
            source_name: self.source_name,
            published_at: self.published_at,
            threat_level: analysis.level,
            confidence: analysis.confidence,
            tags: analysis.tags,
            iocs: analysis.iocs,
        }
    }
}

fn clean_line(s: &str) -> String {
    strip_control_chars(s.trim()).trim().to_owned()
}

fn clean_optional(s: Option<&str>) -> Option<String> {
    s.map(clean_line).filter(|s| !s.is_empty())
}

/// Cleans a raw item into a draft.
///
/// Text fields are trimmed and stripped of control characters; title,
/// summary and body additionally lose their markup. `content` is the
/// cleaned body when it has any text, otherwise the cleaned summary.
/// `published_at` falls back to `now` when the source gave no usable
/// timestamp.
///
/// # Errors
///
/// [`NormalizeError::MissingTitle`] or [`NormalizeError::MissingUrl`] when
/// either is empty after cleaning.
pub fn normalize(raw: &RawItem, now: DateTime<Utc>) -> Result<DraftArticle, NormalizeError> {
    let title = strip_markup(&raw.title);
    if title.is_empty() {
        return Err(NormalizeError::MissingTitle);
    }

    let url = clean_line(&raw.link);
    if url.is_empty() {
        return Err(NormalizeError::MissingUrl);
    }

    let summary = strip_markup(&raw.summary);
    let content = raw
        .body
        .as_deref()
        .map(strip_markup)
        .filter(|body| !body.is_empty())
        .unwrap_or_else(|| summary.clone());

    let published_at = raw
        .published
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or(now);

    Ok(DraftArticle {
        url,
        title,
        summary,
        content,
        image_url: clean_optional(raw.image_url.as_deref()),
        author: clean_optional(raw.author.as_deref()),
        source_name: clean_line(&raw.source_name),
        published_at,
    })
}

/// Parses the timestamp shapes sources commonly emit.
///
/// Accepts RFC 3339, RFC 2822, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD`. Zone-less
/// forms are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_rfc2822(s))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}
