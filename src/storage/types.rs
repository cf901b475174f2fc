use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("Another gator process appears to be using the database. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// The feed row targeted by an update does not exist
    #[error("Feed {0} not found")]
    FeedNotFound(i64),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface as lock contention.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("database is locked")
        || lower.contains("database table is locked")
        || lower.contains("sqlite_busy")
        || lower.contains("sqlite_locked")
        || lower.contains("unable to open database file")
}

// ============================================================================
// Helper Types
// ============================================================================

/// Row type for feed queries
pub(crate) type FeedRow = (i64, String, String, String, Option<i64>, i64, i64);

pub(crate) fn feed_from_row(row: FeedRow) -> Feed {
    let (id, name, url, owner, last_refreshed_at, created_at, updated_at) = row;
    Feed {
        id,
        name,
        url,
        owner,
        last_refreshed_at,
        created_at,
        updated_at,
    }
}

/// Outcome of [`Database::insert_post_if_absent`](super::Database::insert_post_if_absent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written
    Inserted,
    /// A post with the same URL was already stored; nothing was written
    AlreadyExists,
}

/// A post ready to be stored, built by the ingestion pipeline from one feed entry
#[derive(Debug, Clone)]
pub struct NewPost {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub description: String,
    /// Publication time in epoch milliseconds
    pub published_at: i64,
    pub feed_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

// ============================================================================
// Data Structures
// ============================================================================

/// Feed data from database
///
/// Timestamps are Unix epoch milliseconds. `last_refreshed_at` is `None` until the
/// scheduler picks the feed for the first time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    /// Name of the user that registered the feed
    pub owner: String,
    pub last_refreshed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Post data from database
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: i64,
    pub feed_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
}
