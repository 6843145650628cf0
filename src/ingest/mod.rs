//! The ingestion pipeline.
//!
//! - [`normalize`] - raw item cleanup into a [`DraftArticle`]
//! - [`coordinator`] - [`Ingestor`], one fetch → classify → persist pass
//! - [`worker`] - background task that runs the ingestor on demand or on a schedule

pub mod coordinator;
pub mod normalize;
pub mod worker;

use thiserror::Error;

use crate::storage::DatabaseError;

pub use coordinator::Ingestor;
pub use normalize::{normalize, parse_timestamp, DraftArticle, NormalizeError};
pub use worker::{IngestHandle, IngestReport, IngestWorker, Trigger};

#[derive(Debug, Error)]
pub enum IngestError {
    /// The classified batch could not be written; nothing from the run was kept.
    #[error("failed to persist ingested articles: {0}")]
    Persistence(#[from] DatabaseError),
}
