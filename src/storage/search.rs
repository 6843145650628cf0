use sqlx::{QueryBuilder, Sqlite};

use super::schema::Database;
use super::types::{ArticleDbRow, ArticleFilter, ArticlePage, DatabaseError, ARTICLE_COLUMNS};

// ============================================================================
// Query Limit Constants
// ============================================================================

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Escapes `LIKE` wildcards so a keyword only ever matches literally.
fn like_pattern(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len() + 2);
    escaped.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Appends `WHERE ...` for `filter`, or nothing when it has no constraints.
fn push_filter<'a>(builder: &mut QueryBuilder<'a, Sqlite>, filter: &'a ArticleFilter) {
    let mut first = true;
    let mut clause = |builder: &mut QueryBuilder<'a, Sqlite>| {
        builder.push(if first { " WHERE " } else { " AND " });
        first = false;
    };

    let keywords: Vec<&str> = filter
        .keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if !keywords.is_empty() {
        clause(builder);
        builder.push("(");
        for (i, keyword) in keywords.into_iter().enumerate() {
            if i > 0 {
                builder.push(" OR ");
            }
            let pattern = like_pattern(keyword);
            builder.push("title LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" ESCAPE '\\' OR summary LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" ESCAPE '\\' OR content LIKE ");
            builder.push_bind(pattern);
            builder.push(" ESCAPE '\\'");
        }
        builder.push(")");
    }

    if !filter.threat_levels.is_empty() {
        clause(builder);
        builder.push("threat_level IN (");
        let mut levels = builder.separated(", ");
        for level in &filter.threat_levels {
            levels.push_bind(level.as_str());
        }
        levels.push_unseparated(")");
    }

    if !filter.sources.is_empty() {
        clause(builder);
        builder.push("source_name IN (");
        let mut sources = builder.separated(", ");
        for source in &filter.sources {
            sources.push_bind(source.as_str());
        }
        sources.push_unseparated(")");
    }

    if let Some(from) = filter.date_from {
        clause(builder);
        builder.push("published_at >= ");
        builder.push_bind(from.timestamp());
    }

    if let Some(to) = filter.date_to {
        clause(builder);
        builder.push("published_at <= ");
        builder.push_bind(to.timestamp());
    }

    match filter.has_iocs {
        Some(true) => {
            clause(builder);
            builder.push("iocs != '[]'");
        }
        Some(false) => {
            clause(builder);
            builder.push("iocs = '[]'");
        }
        None => {}
    }
}

impl Database {
    /// Returns one page of articles matching `filter`, newest first.
    ///
    /// `page` is 1-based (0 is treated as 1) and `per_page` is clamped to
    /// `1..=100`. Ties on `published_at` are broken by ascending id so pages
    /// are stable. The count and the page are read in one transaction so
    /// `total` always agrees with `items`.
    pub async fn query_articles(
        &self,
        filter: &ArticleFilter,
        page: u32,
        per_page: u32,
    ) -> Result<ArticlePage, DatabaseError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        let offset = i64::from(page - 1) * i64::from(per_page);

        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let mut count_query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM articles");
        push_filter(&mut count_query, filter);
        let (total,): (i64,) = count_query.build_query_as().fetch_one(&mut *tx).await?;

        let mut page_query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {ARTICLE_COLUMNS} FROM articles"));
        push_filter(&mut page_query, filter);
        page_query.push(" ORDER BY published_at DESC, id ASC LIMIT ");
        page_query.push_bind(i64::from(per_page));
        page_query.push(" OFFSET ");
        page_query.push_bind(offset);
        let rows: Vec<ArticleDbRow> = page_query.build_query_as().fetch_all(&mut *tx).await?;

        tx.commit().await?;

        let items = rows
            .into_iter()
            .map(ArticleDbRow::into_article)
            .collect::<Result<Vec<_>, _>>()?;

        let total = total.max(0) as u64;
        let pages = total.div_ceil(u64::from(per_page)) as u32;

        tracing::debug!(total, page, per_page, returned = items.len(), "Article query");
        Ok(ArticlePage {
            items,
            total,
            page,
            per_page,
            pages,
            has_next: page < pages,
            has_prev: page > 1,
        })
    }
}
