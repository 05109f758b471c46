use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;

use scout_core::ClassificationOutcome;

/// Durable store registry + snapshot ledger, backed by a single
/// file-backed SQLite database. One write-transaction per store ties a
/// registry upsert to its ledger append.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn open(database_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1) // one orchestrator thread writes here, no lock contention
            .connect_with(options)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await.ok();
        sqlx::query("PRAGMA foreign_keys=ON;").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout=10000;").execute(&pool).await?;

        info!(database_path, "connected to sqlite");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await?;
        info!("migrations complete");
        Ok(())
    }

    /// Insert any URLs not already present, with defaults
    /// `(is_valid=true, is_automoto=NULL, counts=0)`. Returns how many were
    /// newly inserted.
    pub async fn seed_new(&self, urls: &[String]) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let mut inserted = 0usize;
        let mut tx = self.pool.begin().await?;
        for url in urls {
            let result = sqlx::query(
                "INSERT INTO scraped_stores (url, is_valid, created_at, updated_at)
                 VALUES (?, 1, ?, ?)
                 ON CONFLICT(url) DO NOTHING",
            )
            .bind(url)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Known store URLs ordered by `updated_at` ascending (least-recently
    /// scraped first), optionally truncated to `limit`.
    pub async fn list_to_scrape(&self, limit: Option<u64>) -> Result<Vec<String>> {
        let rows = if let Some(limit) = limit {
            sqlx::query("SELECT url FROM scraped_stores ORDER BY updated_at ASC LIMIT ?")
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query("SELECT url FROM scraped_stores ORDER BY updated_at ASC")
                .fetch_all(&self.pool)
                .await?
        };
        Ok(rows.into_iter().map(|r| r.get::<String, _>(0)).collect())
    }

    /// Whether the registry is empty, or its newest `updated_at` predates
    /// `now - staleness_days` (the orchestrator's re-ingest freshness check).
    pub async fn is_stale(&self, staleness_days: i64) -> Result<bool> {
        let row = sqlx::query("SELECT MAX(updated_at) FROM scraped_stores")
            .fetch_one(&self.pool)
            .await?;
        let newest: Option<String> = row.get(0);
        let Some(newest) = newest else {
            return Ok(true); // empty registry
        };
        let newest: DateTime<Utc> = DateTime::parse_from_rfc3339(&newest)?.with_timezone(&Utc);
        Ok(Utc::now() - newest > chrono::Duration::days(staleness_days))
    }

    pub async fn store_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM scraped_stores")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get(0))
    }

    /// Persist a store visit's outcome: registry upsert always happens;
    /// a ledger row is appended only for a valid visit (per DESIGN.md's
    /// decision on the "snapshot on failed visit" open question — an
    /// invalid visit preserves the last-known counts and is not a new
    /// data point). Both writes happen in one transaction.
    pub async fn record_outcome(&self, url: &str, outcome: &ClassificationOutcome) -> Result<()> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();
        let mut tx = self.pool.begin().await?;

        if !outcome.is_valid {
            sqlx::query(
                "UPDATE scraped_stores SET is_valid = 0, updated_at = ? WHERE url = ?",
            )
            .bind(&now_str)
            .bind(url)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(());
        }

        let total = outcome.total();
        sqlx::query(
            "UPDATE scraped_stores
             SET is_valid = 1, is_automoto = ?, new_vehicle_count = ?, used_vehicle_count = ?,
                 test_vehicle_count = ?, total_vehicle_count = ?, updated_at = ?
             WHERE url = ?",
        )
        .bind(outcome.is_automoto)
        .bind(outcome.new)
        .bind(outcome.used)
        .bind(outcome.test)
        .bind(total)
        .bind(&now_str)
        .bind(url)
        .execute(&mut *tx)
        .await?;

        let prev = sqlx::query(
            "SELECT active_new, active_used, active_test, active_total
             FROM store_snapshots WHERE url = ? ORDER BY scraped_at DESC LIMIT 1",
        )
        .bind(url)
        .fetch_optional(&mut *tx)
        .await?;

        let (delta_new, delta_used, delta_test, delta_total) = match prev {
            Some(row) => {
                let p_new: i64 = row.get(0);
                let p_used: i64 = row.get(1);
                let p_test: i64 = row.get(2);
                let p_total: i64 = row.get(3);
                (
                    outcome.new - p_new,
                    outcome.used - p_used,
                    outcome.test - p_test,
                    total - p_total,
                )
            }
            None => (0, 0, 0, 0),
        };

        sqlx::query(
            "INSERT INTO store_snapshots
             (url, scraped_at, active_new, active_used, active_test, active_total,
              delta_new, delta_used, delta_test, delta_total)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(url)
        .bind(&now_str)
        .bind(outcome.new)
        .bind(outcome.used)
        .bind(outcome.test)
        .bind(total)
        .bind(delta_new)
        .bind(delta_used)
        .bind(delta_test)
        .bind(delta_total)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Basic-mode persistence: record only `is_valid` and `is_automoto`,
    /// leaving vehicle counts untouched and appending no ledger row.
    /// Basic mode never collects a flag count, so writing zeros through
    /// the normal `record_outcome` path would overwrite a store's
    /// last-known counts and fabricate a bogus delta against them the
    /// next time a count-producing mode runs.
    pub async fn record_classification_only(
        &self,
        url: &str,
        is_valid: bool,
        is_automoto: Option<bool>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        match is_automoto {
            // A valid visit: both flags are known, write both.
            Some(automoto) => {
                sqlx::query(
                    "UPDATE scraped_stores SET is_valid = ?, is_automoto = ?, updated_at = ? WHERE url = ?",
                )
                .bind(is_valid)
                .bind(automoto)
                .bind(&now)
                .bind(url)
                .execute(&self.pool)
                .await?;
            }
            // An invalid/unreachable visit: category could not be
            // determined, so leave the existing is_automoto as-is rather
            // than overwriting it with NULL.
            None => {
                sqlx::query("UPDATE scraped_stores SET is_valid = ?, updated_at = ? WHERE url = ?")
                    .bind(is_valid)
                    .bind(&now)
                    .bind(url)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::ClassificationOutcome;

    async fn fresh_storage() -> Storage {
        let storage = Storage::open(":memory:").await.unwrap();
        storage.run_migrations().await.unwrap();
        storage
    }

    #[tokio::test]
    async fn seed_new_is_idempotent() {
        let storage = fresh_storage().await;
        let urls = vec!["https://example.hr/trgovina/a".to_string()];
        assert_eq!(storage.seed_new(&urls).await.unwrap(), 1);
        assert_eq!(storage.seed_new(&urls).await.unwrap(), 0);
        assert_eq!(storage.store_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn first_snapshot_has_zero_deltas() {
        let storage = fresh_storage().await;
        let url = "https://example.hr/trgovina/a".to_string();
        storage.seed_new(&[url.clone()]).await.unwrap();

        let outcome = ClassificationOutcome {
            is_valid: true,
            is_automoto: true,
            new: 5,
            used: 3,
            test: 0,
        };
        storage.record_outcome(&url, &outcome).await.unwrap();

        let row = sqlx::query(
            "SELECT delta_new, delta_used, delta_test, delta_total, active_total
             FROM store_snapshots WHERE url = ?",
        )
        .bind(&url)
        .fetch_one(storage.pool())
        .await
        .unwrap();
        assert_eq!(row.get::<i64, _>(0), 0);
        assert_eq!(row.get::<i64, _>(1), 0);
        assert_eq!(row.get::<i64, _>(2), 0);
        assert_eq!(row.get::<i64, _>(3), 0);
        assert_eq!(row.get::<i64, _>(4), 8);
    }

    #[tokio::test]
    async fn second_snapshot_deltas_against_prior() {
        let storage = fresh_storage().await;
        let url = "https://example.hr/trgovina/a".to_string();
        storage.seed_new(&[url.clone()]).await.unwrap();

        storage
            .record_outcome(
                &url,
                &ClassificationOutcome { is_valid: true, is_automoto: true, new: 12, used: 0, test: 0 },
            )
            .await
            .unwrap();
        storage
            .record_outcome(
                &url,
                &ClassificationOutcome { is_valid: true, is_automoto: true, new: 9, used: 0, test: 0 },
            )
            .await
            .unwrap();

        let row = sqlx::query(
            "SELECT delta_new, active_new FROM store_snapshots WHERE url = ? ORDER BY scraped_at DESC LIMIT 1",
        )
        .bind(&url)
        .fetch_one(storage.pool())
        .await
        .unwrap();
        assert_eq!(row.get::<i64, _>(0), -3);
        assert_eq!(row.get::<i64, _>(1), 9);
    }

    #[tokio::test]
    async fn invalid_visit_preserves_counts_and_skips_snapshot() {
        let storage = fresh_storage().await;
        let url = "https://example.hr/trgovina/d".to_string();
        storage.seed_new(&[url.clone()]).await.unwrap();
        storage
            .record_outcome(
                &url,
                &ClassificationOutcome { is_valid: true, is_automoto: true, new: 5, used: 3, test: 0 },
            )
            .await
            .unwrap();

        storage.record_outcome(&url, &ClassificationOutcome::unreachable()).await.unwrap();

        let row = sqlx::query(
            "SELECT is_valid, new_vehicle_count, used_vehicle_count FROM scraped_stores WHERE url = ?",
        )
        .bind(&url)
        .fetch_one(storage.pool())
        .await
        .unwrap();
        assert_eq!(row.get::<i64, _>(0), 0);
        assert_eq!(row.get::<i64, _>(1), 5);
        assert_eq!(row.get::<i64, _>(2), 3);

        let count: i64 = sqlx::query("SELECT COUNT(*) FROM store_snapshots WHERE url = ?")
            .bind(&url)
            .fetch_one(storage.pool())
            .await
            .unwrap()
            .get(0);
        assert_eq!(count, 1); // only the first (valid) visit appended a row
    }

    #[tokio::test]
    async fn classification_only_leaves_counts_and_ledger_untouched() {
        let storage = fresh_storage().await;
        let url = "https://example.hr/trgovina/f".to_string();
        storage.seed_new(&[url.clone()]).await.unwrap();
        storage
            .record_outcome(
                &url,
                &ClassificationOutcome { is_valid: true, is_automoto: true, new: 7, used: 2, test: 0 },
            )
            .await
            .unwrap();

        storage.record_classification_only(&url, true, Some(true)).await.unwrap();

        let row = sqlx::query(
            "SELECT new_vehicle_count, used_vehicle_count FROM scraped_stores WHERE url = ?",
        )
        .bind(&url)
        .fetch_one(storage.pool())
        .await
        .unwrap();
        assert_eq!(row.get::<i64, _>(0), 7);
        assert_eq!(row.get::<i64, _>(1), 2);

        let count: i64 = sqlx::query("SELECT COUNT(*) FROM store_snapshots WHERE url = ?")
            .bind(&url)
            .fetch_one(storage.pool())
            .await
            .unwrap()
            .get(0);
        assert_eq!(count, 1); // basic-mode re-visit appended no new row
    }

    #[tokio::test]
    async fn total_always_equals_sum_of_parts() {
        let storage = fresh_storage().await;
        let url = "https://example.hr/trgovina/e".to_string();
        storage.seed_new(&[url.clone()]).await.unwrap();
        storage
            .record_outcome(
                &url,
                &ClassificationOutcome { is_valid: true, is_automoto: true, new: 4, used: 6, test: 1 },
            )
            .await
            .unwrap();

        let row = sqlx::query(
            "SELECT new_vehicle_count, used_vehicle_count, test_vehicle_count, total_vehicle_count
             FROM scraped_stores WHERE url = ?",
        )
        .bind(&url)
        .fetch_one(storage.pool())
        .await
        .unwrap();
        let (n, u, t, total): (i64, i64, i64, i64) = (row.get(0), row.get(1), row.get(2), row.get(3));
        assert_eq!(total, n + u + t);
    }
}
