use std::sync::Arc;

use chrono::Utc;

use super::normalize::normalize;
use super::IngestError;
use crate::analysis::ThreatAnalyzer;
use crate::config::SourceConfig;
use crate::feed::Fetcher;
use crate::storage::{Database, NewArticle};

/// One full fetch → normalize → classify → persist pass over every source.
#[derive(Clone)]
pub struct Ingestor {
    db: Database,
    fetcher: Fetcher,
    analyzer: Arc<ThreatAnalyzer>,
    sources: Arc<Vec<SourceConfig>>,
}

impl Ingestor {
    pub fn new(
        db: Database,
        fetcher: Fetcher,
        analyzer: Arc<ThreatAnalyzer>,
        sources: Vec<SourceConfig>,
    ) -> Self {
        Self {
            db,
            fetcher,
            analyzer,
            sources: Arc::new(sources),
        }
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    /// Runs one ingestion cycle and returns how many articles were new.
    ///
    /// Sources that fail to fetch and items that fail to normalize are
    /// logged and skipped. Everything that survives is written in a single
    /// batch; if that write fails, nothing from this run is stored.
    ///
    /// # Errors
    ///
    /// [`IngestError::Persistence`] when the batch write fails.
    pub async fn ingest(&self) -> Result<usize, IngestError> {
        let started = std::time::Instant::now();
        let raw_items = self.fetcher.fetch_all(&self.sources).await;
        let fetched = raw_items.len();

        let now = Utc::now();
        let mut rejected = 0usize;
        let records: Vec<NewArticle> = raw_items
            .iter()
            .filter_map(|raw| match normalize(raw, now) {
                Ok(draft) => Some(draft.classify(&self.analyzer)),
                Err(e) => {
                    rejected += 1;
                    tracing::debug!(
                        source = %raw.source_name,
                        link = %raw.link,
                        error = %e,
                        "Item rejected during normalization"
                    );
                    None
                }
            })
            .collect();

        let inserted = self.db.insert_articles(&records).await?;

        if fetched == 0 {
            tracing::warn!("Ingestion found no items; every source failed or was empty");
        }
        tracing::info!(
            fetched,
            rejected,
            classified = records.len(),
            inserted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ingestion run complete"
        );
        Ok(inserted)
    }
}
