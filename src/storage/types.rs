use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::analysis::ThreatLevel;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("The database is locked by another threatwire process. Close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A JSON column could not be encoded or decoded
    #[error("Stored value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Articles
// ============================================================================

/// A classified article as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub image_url: Option<String>,
    pub author: Option<String>,
    pub source_name: String,
    pub published_at: DateTime<Utc>,
    /// Set once when the row is first written
    pub ingested_at: DateTime<Utc>,
    pub threat_level: ThreatLevel,
    pub confidence: f64,
    pub tags: Vec<String>,
    pub iocs: Vec<String>,
    pub views: i64,
    pub bookmarked: bool,
}

/// A finished record ready to be written. The store assigns `id` and
/// `ingested_at`; `views` and `bookmarked` start at their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub image_url: Option<String>,
    pub author: Option<String>,
    pub source_name: String,
    pub published_at: DateTime<Utc>,
    pub threat_level: ThreatLevel,
    pub confidence: f64,
    pub tags: Vec<String>,
    pub iocs: Vec<String>,
}

/// Column list matching [`ArticleDbRow`].
pub(crate) const ARTICLE_COLUMNS: &str = "id, url, title, summary, content, image_url, author, \
     source_name, published_at, ingested_at, threat_level, confidence, tags, iocs, views, bookmarked";

/// Internal row type for Article queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleDbRow {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub image_url: Option<String>,
    pub author: Option<String>,
    pub source_name: String,
    pub published_at: i64,
    pub ingested_at: i64,
    pub threat_level: String,
    pub confidence: f64,
    pub tags: String,
    pub iocs: String,
    pub views: i64,
    pub bookmarked: bool,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self) -> Result<Article, DatabaseError> {
        Ok(Article {
            id: self.id,
            url: self.url,
            title: self.title,
            summary: self.summary,
            content: self.content,
            image_url: self.image_url,
            author: self.author,
            source_name: self.source_name,
            published_at: from_unix(self.published_at),
            ingested_at: from_unix(self.ingested_at),
            threat_level: serde_json::from_value(serde_json::Value::String(self.threat_level))?,
            confidence: self.confidence,
            tags: serde_json::from_str(&self.tags)?,
            iocs: serde_json::from_str(&self.iocs)?,
            views: self.views,
            bookmarked: self.bookmarked,
        })
    }
}

pub(crate) fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

// ============================================================================
// Queries
// ============================================================================

/// Criteria for [`Database::query_articles`](super::Database::query_articles).
///
/// Categories combine with AND. Within `keywords` any one match suffices;
/// `threat_levels` and `sources` are set membership. Empty lists and `None`
/// mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleFilter {
    pub keywords: Vec<String>,
    pub threat_levels: Vec<ThreatLevel>,
    pub sources: Vec<String>,
    /// Inclusive lower bound on `published_at`
    pub date_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `published_at`
    pub date_to: Option<DateTime<Utc>>,
    pub has_iocs: Option<bool>,
}

/// One page of query results plus pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticlePage {
    pub items: Vec<Article>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Aggregate counts over the whole store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total: u64,
    /// Always carries all four levels
    pub by_level: BTreeMap<ThreatLevel, u64>,
    pub by_source: BTreeMap<String, u64>,
    pub with_iocs: u64,
    pub computed_at: DateTime<Utc>,
}
