//! SQLite persistence for classified articles.
//!
//! [`Database`] wraps an `sqlx` pool. Writes are batched and deduplicated on
//! the article URL; queries and stats read consistent snapshots while a
//! batch may be in flight.

mod articles;
mod schema;
mod search;
mod stats;
mod types;

pub use schema::{Database, IN_MEMORY};
pub use search::{DEFAULT_PER_PAGE, MAX_PER_PAGE};
pub use types::{Article, ArticleFilter, ArticlePage, DatabaseError, NewArticle, StatsSnapshot};
