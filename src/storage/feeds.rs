use super::schema::Database;
use super::types::{feed_from_row, DatabaseError, Feed, FeedRow};

const FEED_COLUMNS: &str = "id, name, url, owner, last_refreshed_at, created_at, updated_at";

impl Database {
    // ========================================================================
    // Feed Registry
    // ========================================================================

    /// Register a feed, returning its id.
    ///
    /// Re-registering an existing URL keeps the original row (and its refresh
    /// bookkeeping) and only refreshes the display name.
    pub async fn insert_feed(&self, name: &str, url: &str, owner: &str) -> Result<i64, DatabaseError> {
        let now = chrono::Utc::now().timestamp_millis();
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feeds (name, url, owner, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                name = excluded.name,
                updated_at = excluded.updated_at
            RETURNING id
        "#,
        )
        .bind(name)
        .bind(url)
        .bind(owner)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(feed_id = id, url = %url, "Feed registered");
        Ok(id)
    }

    /// All registered feeds in insertion order
    pub async fn get_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let rows: Vec<FeedRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(feed_from_row).collect())
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"))
                .bind(feed_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(feed_from_row))
    }

    // ========================================================================
    // Refresh Rotation
    // ========================================================================

    /// Return the feed that has waited longest for a refresh.
    ///
    /// Feeds that were never refreshed come first; ties are broken by id, which
    /// follows insertion order. `Ok(None)` means the registry is empty.
    pub async fn select_least_recently_refreshed_feed(&self) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedRow> = sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds \
             ORDER BY last_refreshed_at ASC NULLS FIRST, id ASC \
             LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(feed_from_row))
    }

    /// Stamp a refresh attempt on a feed.
    ///
    /// `at` is epoch milliseconds. The stamp is written before the feed is fetched,
    /// so a feed that keeps failing still rotates to the back of the queue.
    pub async fn mark_feed_refreshed(&self, feed_id: i64, at: i64) -> Result<(), DatabaseError> {
        let result =
            sqlx::query("UPDATE feeds SET last_refreshed_at = ?, updated_at = ? WHERE id = ?")
                .bind(at)
                .bind(at)
                .bind(feed_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::FeedNotFound(feed_id));
        }
        Ok(())
    }
}
