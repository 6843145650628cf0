use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{Article, ArticleDbRow, DatabaseError, NewArticle, ARTICLE_COLUMNS};

/// 12 bound columns * 50 rows stays well under SQLite's 999 parameter limit.
const BATCH_SIZE: usize = 50;

impl Database {
    // ========================================================================
    // Article Writes
    // ========================================================================

    /// Persists a batch of classified articles, returning how many were new.
    ///
    /// The whole batch runs in one transaction. Rows whose `url` already
    /// exists (in the store or earlier in the same batch) are skipped with
    /// `ON CONFLICT(url) DO NOTHING`, so the stored copy is never overwritten.
    /// Every new row gets the same `ingested_at`. Any error rolls the batch
    /// back.
    pub async fn insert_articles(&self, articles: &[NewArticle]) -> Result<usize, DatabaseError> {
        if articles.is_empty() {
            return Ok(0);
        }

        let encoded = articles
            .iter()
            .map(|a| Ok((serde_json::to_string(&a.tags)?, serde_json::to_string(&a.iocs)?)))
            .collect::<Result<Vec<_>, serde_json::Error>>()?;

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;
        let mut inserted: u64 = 0;

        for (chunk, json) in articles.chunks(BATCH_SIZE).zip(encoded.chunks(BATCH_SIZE)) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO articles (url, title, summary, content, image_url, author, \
                 source_name, published_at, ingested_at, threat_level, confidence, tags, iocs) ",
            );

            builder.push_values(chunk.iter().zip(json), |mut b, (article, (tags, iocs))| {
                b.push_bind(&article.url)
                    .push_bind(&article.title)
                    .push_bind(&article.summary)
                    .push_bind(&article.content)
                    .push_bind(&article.image_url)
                    .push_bind(&article.author)
                    .push_bind(&article.source_name)
                    .push_bind(article.published_at.timestamp())
                    .push_bind(now)
                    .push_bind(article.threat_level.as_str())
                    .push_bind(article.confidence.clamp(0.0, 1.0))
                    .push_bind(tags)
                    .push_bind(iocs);
            });
            builder.push(" ON CONFLICT(url) DO NOTHING");

            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;
            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        tracing::debug!(
            submitted = articles.len(),
            inserted = inserted,
            "Article batch written"
        );
        Ok(inserted as usize)
    }

    // ========================================================================
    // Article Lookups
    // ========================================================================

    pub async fn get_article(&self, id: i64) -> Result<Option<Article>, DatabaseError> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?");
        let row: Option<ArticleDbRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ArticleDbRow::into_article).transpose()
    }

    pub async fn get_article_by_url(&self, url: &str) -> Result<Option<Article>, DatabaseError> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE url = ?");
        let row: Option<ArticleDbRow> = sqlx::query_as(&sql)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ArticleDbRow::into_article).transpose()
    }

    /// Number of stored articles. Cheap enough to serve as a health probe.
    pub async fn article_count(&self) -> Result<u64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    // ========================================================================
    // Article Mutations
    // ========================================================================

    /// Increments the view counter, returning whether the article exists.
    pub async fn record_view(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE articles SET views = views + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Sets the bookmark flag, returning whether the article exists.
    pub async fn set_bookmarked(&self, id: i64, bookmarked: bool) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE articles SET bookmarked = ? WHERE id = ?")
            .bind(bookmarked)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically flips the bookmark flag and returns the new value, or
    /// `None` when no article has that id.
    pub async fn toggle_bookmark(&self, id: i64) -> Result<Option<bool>, DatabaseError> {
        let row: Option<(bool,)> = sqlx::query_as(
            "UPDATE articles SET bookmarked = NOT bookmarked WHERE id = ? RETURNING bookmarked",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(b,)| b))
    }
}
