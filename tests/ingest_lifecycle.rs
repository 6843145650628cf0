//! Integration tests for the ingestion pipeline: fetch, normalize, classify, persist.
//!
//! Sources are served by wiremock and each test gets its own in-memory
//! SQLite database. Pacing delays are disabled.

use std::sync::Arc;

use threatwire::analysis::{ThreatAnalyzer, ThreatLevel};
use threatwire::app::App;
use threatwire::config::{Config, FetchMode, SourceConfig};
use threatwire::feed::{FetchSettings, Fetcher};
use threatwire::ingest::{Ingestor, Trigger};
use threatwire::storage::{ArticleFilter, Database};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECURITY_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Security Feed</title>
  <item>
    <title>Critical zero-day RCE actively exploited in the wild</title>
    <link>https://sec.example.com/zero-day</link>
    <description>&lt;p&gt;Attackers at 203.0.113.9 exploit CVE-2024-21412.&lt;/p&gt;</description>
    <pubDate>Tue, 13 Feb 2024 18:00:00 GMT</pubDate>
  </item>
  <item>
    <title>Phishing campaign impersonates banks</title>
    <link>https://sec.example.com/phishing</link>
    <description>Emails link to login.bank-secure.example.net</description>
  </item>
  <item>
    <title>Vendor ships security update</title>
    <link>https://sec.example.com/update</link>
    <description>Routine fixes</description>
    <pubDate>not a date</pubDate>
  </item>
</channel></rss>"#;

const BLOG_HTML: &str = r#"<html><body>
<div class="post-card">
  <h3><a href="/blog/ransomware-report">Ransomware report Q1</a></h3>
  <img src="/img/q1.png">
  <time datetime="2024-04-02">April 2</time>
  <p>LockBit affiliates remain active.</p>
</div>
<div class="post-card"><p>Card without a heading</p></div>
</body></html>"#;

async fn mount(server: &MockServer, route: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(template)
        .mount(server)
        .await;
}

fn ingestor(db: &Database, sources: Vec<SourceConfig>) -> Ingestor {
    let fetcher = Fetcher::new(FetchSettings::default().without_delays()).unwrap();
    Ingestor::new(db.clone(), fetcher, Arc::new(ThreatAnalyzer::default()), sources)
}

// ============================================================================
// Ingestion
// ============================================================================

#[tokio::test]
async fn test_ingest_classifies_and_stores_items() {
    let server = MockServer::start().await;
    mount(&server, "/feed", ResponseTemplate::new(200).set_body_string(SECURITY_RSS)).await;

    let db = Database::open(":memory:").await.unwrap();
    let sources = vec![SourceConfig::new(
        "sec",
        "Security Feed",
        &format!("{}/feed", server.uri()),
        FetchMode::Feed,
    )];
    let inserted = ingestor(&db, sources).ingest().await.unwrap();
    assert_eq!(inserted, 3);

    let zero_day = db
        .get_article_by_url("https://sec.example.com/zero-day")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(zero_day.threat_level, ThreatLevel::Critical);
    assert!(zero_day.confidence > 0.0);
    assert!(zero_day.tags.contains(&"vulnerability".to_string()));
    assert!(zero_day.iocs.contains(&"ip:203.0.113.9".to_string()));
    assert!(zero_day.iocs.contains(&"cve:CVE-2024-21412".to_string()));
    assert_eq!(zero_day.summary, "Attackers at 203.0.113.9 exploit CVE-2024-21412.");
    assert_eq!(zero_day.content, zero_day.summary);
    assert_eq!(zero_day.source_name, "Security Feed");
    assert_eq!(zero_day.published_at.to_rfc3339(), "2024-02-13T18:00:00+00:00");

    let phishing = db
        .get_article_by_url("https://sec.example.com/phishing")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(phishing.threat_level, ThreatLevel::High);
    assert!(phishing
        .iocs
        .contains(&"domain:login.bank-secure.example.net".to_string()));

    // Missing and unparseable dates fall back to the ingestion time
    let update = db
        .get_article_by_url("https://sec.example.com/update")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.threat_level, ThreatLevel::Medium);
    let drift = (update.ingested_at - update.published_at).num_seconds().abs();
    assert!(drift <= 5, "published_at should be the run time, drift {drift}s");
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let server = MockServer::start().await;
    mount(&server, "/feed", ResponseTemplate::new(200).set_body_string(SECURITY_RSS)).await;

    let db = Database::open(":memory:").await.unwrap();
    let sources = vec![SourceConfig::new(
        "sec",
        "Security Feed",
        &format!("{}/feed", server.uri()),
        FetchMode::Feed,
    )];
    let ingestor = ingestor(&db, sources);

    assert_eq!(ingestor.ingest().await.unwrap(), 3);
    let before = db
        .get_article_by_url("https://sec.example.com/zero-day")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(ingestor.ingest().await.unwrap(), 0);
    assert_eq!(db.article_count().await.unwrap(), 3);

    let after = db
        .get_article_by_url("https://sec.example.com/zero-day")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.ingested_at, before.ingested_at);
    assert_eq!(after.id, before.id);
}

#[tokio::test]
async fn test_failing_source_does_not_block_others() {
    let server = MockServer::start().await;
    mount(&server, "/down", ResponseTemplate::new(500)).await;
    mount(&server, "/garbage", ResponseTemplate::new(200).set_body_string("<<<>>>")).await;
    mount(&server, "/feed", ResponseTemplate::new(200).set_body_string(SECURITY_RSS)).await;
    mount(&server, "/blog/", ResponseTemplate::new(200).set_body_string(BLOG_HTML)).await;

    let db = Database::open(":memory:").await.unwrap();
    let sources = vec![
        SourceConfig::new("down", "Down", &format!("{}/down", server.uri()), FetchMode::Feed),
        SourceConfig::new("junk", "Junk", &format!("{}/garbage", server.uri()), FetchMode::Feed),
        SourceConfig::new("sec", "Security Feed", &format!("{}/feed", server.uri()), FetchMode::Feed),
        SourceConfig::new("blog", "Vendor Blog", &format!("{}/blog/", server.uri()), FetchMode::PageScrape),
    ];

    let inserted = ingestor(&db, sources).ingest().await.unwrap();
    assert_eq!(inserted, 4);

    let stats = db.stats().await.unwrap();
    assert_eq!(stats.by_source.get("Security Feed"), Some(&3));
    assert_eq!(stats.by_source.get("Vendor Blog"), Some(&1));
    assert!(!stats.by_source.contains_key("Down"));

    let blog = db
        .get_article_by_url(&format!("{}/blog/ransomware-report", server.uri()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(blog.threat_level, ThreatLevel::Critical);
    assert_eq!(blog.image_url, Some(format!("{}/img/q1.png", server.uri())));
    assert_eq!(blog.published_at.to_rfc3339(), "2024-04-02T00:00:00+00:00");
    assert_eq!(blog.summary, "LockBit affiliates remain active.");
}

#[tokio::test]
async fn test_all_sources_failing_inserts_nothing() {
    let server = MockServer::start().await;
    mount(&server, "/down", ResponseTemplate::new(503)).await;

    let db = Database::open(":memory:").await.unwrap();
    let sources = vec![SourceConfig::new(
        "down",
        "Down",
        &format!("{}/down", server.uri()),
        FetchMode::Feed,
    )];
    assert_eq!(ingestor(&db, sources).ingest().await.unwrap(), 0);
    assert_eq!(db.article_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_disabled_sources_are_not_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SECURITY_RSS))
        .expect(0)
        .mount(&server)
        .await;

    let db = Database::open(":memory:").await.unwrap();
    let mut source = SourceConfig::new("off", "Off", &server.uri(), FetchMode::Feed);
    source.enabled = false;
    assert_eq!(ingestor(&db, vec![source]).ingest().await.unwrap(), 0);
}

// ============================================================================
// App facade
// ============================================================================

fn app_config(server: &MockServer) -> Config {
    Config {
        sources: vec![SourceConfig::new(
            "sec",
            "Security Feed",
            &format!("{}/feed", server.uri()),
            FetchMode::Feed,
        )],
        min_delay_ms: 0,
        max_delay_ms: 0,
        source_pause_ms: 0,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_app_trigger_then_query() {
    let server = MockServer::start().await;
    mount(&server, "/feed", ResponseTemplate::new(200).set_body_string(SECURITY_RSS)).await;

    let config = app_config(&server);
    let mut app = App::open(&config, ":memory:").await.unwrap();

    assert_eq!(app.trigger_ingest(), Trigger::Queued);
    let report = app.ingest_handle().wait_for_runs(1).await.unwrap();
    assert_eq!(report.inserted, Some(3));

    let filter = ArticleFilter {
        threat_levels: vec![ThreatLevel::Critical],
        ..Default::default()
    };
    let page = app.query(&filter, 1, 20).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].url, "https://sec.example.com/zero-day");

    let stats = app.stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.with_iocs, 2);

    app.shutdown().await;
    assert_eq!(app.trigger_ingest(), Trigger::Stopped);
}

#[tokio::test]
async fn test_app_classify_uses_configured_taxonomy() {
    let server = MockServer::start().await;
    let mut config = app_config(&server);
    config.taxonomy.critical = vec!["wormable".into()];

    let mut app = App::open(&config, ":memory:").await.unwrap();
    let analysis = app.classify("Wormable bug in SMB stack");
    assert_eq!(analysis.level, ThreatLevel::Critical);

    let analysis = app.classify("Nothing to report");
    assert_eq!(analysis.level, ThreatLevel::Low);
    assert_eq!(analysis.confidence, 0.3);
    app.shutdown().await;
}
