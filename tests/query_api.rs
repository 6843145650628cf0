//! Integration tests for the read side: filtered pagination, stats and
//! per-article state, driven through the public storage API.

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;

use threatwire::analysis::ThreatLevel;
use threatwire::storage::{ArticleFilter, Database, NewArticle};

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn article(n: usize, title: &str, level: ThreatLevel, source: &str) -> NewArticle {
    NewArticle {
        url: format!("https://news.example.com/{n}"),
        title: title.to_string(),
        summary: format!("Summary for {title}"),
        content: String::new(),
        image_url: None,
        author: None,
        source_name: source.to_string(),
        published_at: base_time() + Duration::hours(n as i64),
        threat_level: level,
        confidence: 0.5,
        tags: Vec::new(),
        iocs: Vec::new(),
    }
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_pages_cover_every_article_once() {
    let db = test_db().await;
    let batch: Vec<_> = (0..45)
        .map(|n| article(n, &format!("Item {n}"), ThreatLevel::Low, "Feed"))
        .collect();
    assert_eq!(db.insert_articles(&batch).await.unwrap(), 45);

    let filter = ArticleFilter::default();
    let first = db.query_articles(&filter, 1, 20).await.unwrap();
    assert_eq!(first.total, 45);
    assert_eq!(first.pages, 3);
    assert_eq!(first.items.len(), 20);
    assert!(first.has_next);
    assert!(!first.has_prev);
    // Newest first
    assert_eq!(first.items[0].title, "Item 44");

    let last = db.query_articles(&filter, 3, 20).await.unwrap();
    assert_eq!(last.items.len(), 5);
    assert!(!last.has_next);
    assert!(last.has_prev);
    assert_eq!(last.items[4].title, "Item 0");

    let beyond = db.query_articles(&filter, 4, 20).await.unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 45);

    let mut seen = Vec::new();
    for page in 1..=3 {
        let p = db.query_articles(&filter, page, 20).await.unwrap();
        seen.extend(p.items.into_iter().map(|a| a.id));
    }
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 45);
}

// ============================================================================
// Filtering
// ============================================================================

#[tokio::test]
async fn test_keyword_and_level_filters_combine() {
    let db = test_db().await;
    db.insert_articles(&[
        article(1, "Ransomware hits hospital", ThreatLevel::Critical, "A"),
        article(2, "Ransomware gang arrested", ThreatLevel::High, "A"),
        article(3, "Ransomware awareness week", ThreatLevel::Medium, "B"),
        article(4, "Phishing wave", ThreatLevel::High, "B"),
    ])
    .await
    .unwrap();

    let filter = ArticleFilter {
        keywords: vec!["ransomware".into()],
        threat_levels: vec![ThreatLevel::High, ThreatLevel::Critical],
        ..Default::default()
    };
    let page = db.query_articles(&filter, 1, 20).await.unwrap();
    let titles: Vec<_> = page.items.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["Ransomware gang arrested", "Ransomware hits hospital"]);
    assert!(page.items.iter().all(|a| a.threat_level != ThreatLevel::Medium));
}

#[tokio::test]
async fn test_source_and_date_window() {
    let db = test_db().await;
    let mut other = article(6, "Other source", ThreatLevel::Low, "Beta");
    other.published_at = base_time() + Duration::hours(5);
    db.insert_articles(&[
        article(1, "Early", ThreatLevel::Low, "Alpha"),
        article(5, "Middle", ThreatLevel::Low, "Alpha"),
        article(9, "Late", ThreatLevel::Low, "Alpha"),
        other,
    ])
    .await
    .unwrap();

    let filter = ArticleFilter {
        sources: vec!["Alpha".into()],
        date_from: Some(base_time() + Duration::hours(5)),
        date_to: Some(base_time() + Duration::hours(9)),
        ..Default::default()
    };
    let page = db.query_articles(&filter, 1, 20).await.unwrap();
    let titles: Vec<_> = page.items.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["Late", "Middle"]);
}

#[tokio::test]
async fn test_ioc_presence_filter() {
    let db = test_db().await;
    let mut with_ioc = article(1, "Indicators published", ThreatLevel::High, "A");
    with_ioc.iocs = vec!["ip:198.51.100.7".into()];
    db.insert_articles(&[with_ioc, article(2, "Opinion piece", ThreatLevel::Low, "A")])
        .await
        .unwrap();

    let only = |has| ArticleFilter {
        has_iocs: Some(has),
        ..Default::default()
    };
    let page = db.query_articles(&only(true), 1, 20).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].iocs, vec!["ip:198.51.100.7".to_string()]);

    let page = db.query_articles(&only(false), 1, 20).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].title, "Opinion piece");
}

// ============================================================================
// Deduplication and per-article state
// ============================================================================

#[tokio::test]
async fn test_duplicate_url_keeps_first_version() {
    let db = test_db().await;
    db.insert_articles(&[article(1, "First title", ThreatLevel::Low, "A")])
        .await
        .unwrap();

    let mut again = article(1, "Second title", ThreatLevel::Critical, "A");
    again.summary = "changed".into();
    assert_eq!(db.insert_articles(&[again]).await.unwrap(), 0);

    let stored = db
        .get_article_by_url("https://news.example.com/1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.title, "First title");
    assert_eq!(stored.threat_level, ThreatLevel::Low);
}

#[tokio::test]
async fn test_views_and_bookmarks() {
    let db = test_db().await;
    db.insert_articles(&[article(1, "Tracked", ThreatLevel::Low, "A")])
        .await
        .unwrap();
    let id = db
        .get_article_by_url("https://news.example.com/1")
        .await
        .unwrap()
        .unwrap()
        .id;

    assert!(db.record_view(id).await.unwrap());
    assert!(db.record_view(id).await.unwrap());
    assert_eq!(db.toggle_bookmark(id).await.unwrap(), Some(true));

    let stored = db.get_article(id).await.unwrap().unwrap();
    assert_eq!(stored.views, 2);
    assert!(stored.bookmarked);

    assert!(!db.record_view(id + 100).await.unwrap());
    assert_eq!(db.toggle_bookmark(id + 100).await.unwrap(), None);
}

// ============================================================================
// Stats
// ============================================================================

#[tokio::test]
async fn test_stats_totals_match_queries() {
    let db = test_db().await;
    let mut flagged = article(3, "Flagged", ThreatLevel::Critical, "Beta");
    flagged.iocs = vec!["cve:CVE-2024-1111".into()];
    db.insert_articles(&[
        article(1, "One", ThreatLevel::High, "Alpha"),
        article(2, "Two", ThreatLevel::High, "Alpha"),
        flagged,
    ])
    .await
    .unwrap();

    let stats = db.stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.with_iocs, 1);
    assert_eq!(stats.by_level[&ThreatLevel::High], 2);
    assert_eq!(stats.by_level[&ThreatLevel::Critical], 1);
    assert_eq!(stats.by_level[&ThreatLevel::Low], 0);
    assert_eq!(stats.by_source["Alpha"], 2);
    assert_eq!(stats.by_source["Beta"], 1);

    let all = db
        .query_articles(&ArticleFilter::default(), 1, 20)
        .await
        .unwrap();
    assert_eq!(all.total, stats.total);
    assert_eq!(stats.by_level.values().sum::<u64>(), stats.total);
}
