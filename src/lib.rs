//! Security news ingestion with keyword-tier threat classification.
//!
//! Sources (feeds or plain pages) are fetched politely, cleaned, scored for
//! severity, mined for indicators of compromise and topic tags, and stored
//! in SQLite deduplicated by URL. [`app::App`] is the entry point for
//! callers; the modules below can also be used on their own.

pub mod analysis;
pub mod app;
pub mod config;
pub mod feed;
pub mod ingest;
pub mod storage;
pub mod util;
