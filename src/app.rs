//! Boundary facade tying configuration, storage, fetching and analysis together.
//!
//! A transport layer (HTTP handlers, the CLI) talks only to [`App`]. Every
//! type it returns implements `serde::Serialize`.

use std::sync::Arc;
use thiserror::Error;

use crate::analysis::{Analysis, AnalyzerError, ThreatAnalyzer};
use crate::config::Config;
use crate::feed::{FetchError, FetchSettings, Fetcher};
use crate::ingest::{IngestError, IngestHandle, IngestReport, IngestWorker, Ingestor, Trigger};
use crate::storage::{ArticleFilter, ArticlePage, Database, DatabaseError, StatsSnapshot};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] FetchError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub struct App {
    db: Database,
    analyzer: Arc<ThreatAnalyzer>,
    ingestor: Ingestor,
    worker: IngestHandle,
}

impl App {
    /// Opens the database at `db_path` and assembles the application.
    pub async fn open(config: &Config, db_path: &str) -> Result<Self, AppError> {
        let db = Database::open(db_path).await?;
        Self::new(db, config)
    }

    /// Assembles the application around an already open database and starts
    /// the background ingest worker. Must be called inside a Tokio runtime.
    pub fn new(db: Database, config: &Config) -> Result<Self, AppError> {
        let analyzer = Arc::new(ThreatAnalyzer::new(&config.taxonomy)?);
        Self::with_fetcher(db, config, analyzer, FetchSettings::from_config(config))
    }

    /// Like [`App::new`] with explicit fetch settings.
    pub fn with_fetcher(
        db: Database,
        config: &Config,
        analyzer: Arc<ThreatAnalyzer>,
        settings: FetchSettings,
    ) -> Result<Self, AppError> {
        let fetcher = Fetcher::new(settings)?;
        let sources = config.enabled_sources().cloned().collect();
        let ingestor = Ingestor::new(db.clone(), fetcher, Arc::clone(&analyzer), sources);
        let worker = IngestWorker::spawn(ingestor.clone(), config.refresh_interval());

        tracing::info!(
            sources = ingestor.sources().len(),
            refresh_minutes = config.refresh_interval_minutes,
            "Application ready"
        );
        Ok(Self {
            db,
            analyzer,
            ingestor,
            worker,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Runs one full fetch, classify and persist cycle and waits for it.
    pub async fn ingest(&self) -> Result<usize, IngestError> {
        self.ingestor.ingest().await
    }

    /// Asks the background worker for a run and returns immediately.
    pub fn trigger_ingest(&self) -> Trigger {
        let outcome = self.worker.trigger();
        tracing::debug!(?outcome, "Ingest requested");
        outcome
    }

    pub fn ingest_status(&self) -> IngestReport {
        self.worker.last_report()
    }

    pub fn ingest_handle(&self) -> &IngestHandle {
        &self.worker
    }

    pub async fn query(
        &self,
        filter: &ArticleFilter,
        page: u32,
        per_page: u32,
    ) -> Result<ArticlePage, DatabaseError> {
        self.db.query_articles(filter, page, per_page).await
    }

    pub async fn stats(&self) -> Result<StatsSnapshot, DatabaseError> {
        self.db.stats().await
    }

    /// Analyzes free text with the configured taxonomy. Nothing is stored.
    pub fn classify(&self, text: &str) -> Analysis {
        self.analyzer.classify(text)
    }

    /// Stops the background worker.
    pub async fn shutdown(&mut self) {
        self.worker.shutdown().await;
    }
}
