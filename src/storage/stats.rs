use std::collections::BTreeMap;

use super::schema::Database;
use super::types::{DatabaseError, StatsSnapshot};
use crate::analysis::ThreatLevel;

impl Database {
    /// Computes aggregate counts over every stored article.
    ///
    /// All four threat levels are always present in `by_level`, with zero for
    /// levels that have no articles. Nothing is cached.
    pub async fn stats(&self) -> Result<StatsSnapshot, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let (total, with_iocs): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN iocs != '[]' THEN 1 ELSE 0 END), 0) FROM articles",
        )
        .fetch_one(&mut *tx)
        .await?;

        let level_rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT threat_level, COUNT(*) FROM articles GROUP BY threat_level")
                .fetch_all(&mut *tx)
                .await?;

        let source_rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT source_name, COUNT(*) FROM articles GROUP BY source_name")
                .fetch_all(&mut *tx)
                .await?;

        tx.commit().await?;

        let mut by_level: BTreeMap<ThreatLevel, u64> =
            ThreatLevel::ALL.iter().map(|level| (*level, 0)).collect();
        for (level, count) in level_rows {
            match level.parse::<ThreatLevel>() {
                Ok(level) => {
                    by_level.insert(level, count as u64);
                }
                Err(e) => tracing::warn!(error = %e, "Skipping unknown threat level in stats"),
            }
        }

        Ok(StatsSnapshot {
            total: total as u64,
            by_level,
            by_source: source_rows
                .into_iter()
                .map(|(source, count)| (source, count as u64))
                .collect(),
            with_iocs: with_iocs as u64,
            computed_at: chrono::Utc::now(),
        })
    }
}
