use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use super::fetcher::{FeedClient, FetchError};
use super::parser::FeedItem;
use crate::storage::{Database, DatabaseError, Feed, InsertOutcome, NewPost};

/// RFC 1123 with a numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`
pub const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// [`PUB_DATE_FORMAT`] after the weekday prefix
const PUB_DATE_BODY_FORMAT: &str = "%d %b %Y %H:%M:%S %z";

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Errors that end a refresh cycle early.
///
/// None of these are fatal to the scheduler; posts committed before the error
/// stay committed.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Could not read the feed registry
    #[error("Failed to select next feed: {0}")]
    Select(#[source] DatabaseError),

    /// Could not stamp the selected feed; nothing was fetched
    #[error("Failed to mark feed {feed_id} as refreshed: {source}")]
    Stamp {
        feed_id: i64,
        #[source]
        source: DatabaseError,
    },

    /// The feed could not be fetched or parsed; nothing was ingested
    #[error("Failed to fetch feed: {0}")]
    Fetch(#[source] FetchError),

    /// An entry's publish date is not RFC 1123 with a numeric zone; later entries were skipped
    #[error("Entry {index} has an unparsable publish date {value:?}: {source}")]
    EntryDate {
        index: usize,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// Storing an entry failed; later entries were skipped
    #[error("Failed to store entry {index}: {source}")]
    Insert {
        index: usize,
        #[source]
        source: DatabaseError,
    },
}

/// Identity of the feed a cycle worked on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRef {
    pub id: i64,
    pub name: String,
    pub url: String,
}

impl From<&Feed> for FeedRef {
    fn from(feed: &Feed) -> Self {
        Self {
            id: feed.id,
            name: feed.name.clone(),
            url: feed.url.clone(),
        }
    }
}

/// Record of one refresh cycle, suitable for logging and metrics.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    /// Feed the cycle worked on; `None` when the registry was empty or unreadable
    pub feed: Option<FeedRef>,
    /// Entries the fetched document contained
    pub entries: usize,
    /// Posts newly written this cycle
    pub inserted: usize,
    /// Entries whose URL was already stored
    pub duplicates: usize,
    pub error: Option<CycleError>,
}

impl CycleOutcome {
    /// True when there was no feed to refresh.
    pub fn is_idle(&self) -> bool {
        self.feed.is_none() && self.error.is_none()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn failed(mut self, error: CycleError) -> Self {
        self.error = Some(error);
        self
    }
}

/// Runs refresh cycles against one database and one HTTP client.
#[derive(Clone)]
pub struct Ingestor {
    db: Database,
    client: FeedClient,
}

impl Ingestor {
    pub fn new(db: Database, client: FeedClient) -> Self {
        Self { db, client }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run one select → stamp → fetch → ingest cycle.
    ///
    /// Never returns an error directly: every failure is carried in
    /// [`CycleOutcome::error`] so the caller can keep going.
    ///
    /// # Ordering
    ///
    /// The feed is stamped before it is fetched, so a slow or failing feed
    /// still moves to the back of the rotation. Entries are processed in
    /// document order; a bad publish date or a storage failure stops the
    /// remaining entries, but posts already inserted stay committed.
    pub async fn run_one_cycle(&self) -> CycleOutcome {
        let outcome = CycleOutcome::default();

        let feed = match self.db.select_least_recently_refreshed_feed().await {
            Ok(Some(feed)) => feed,
            Ok(None) => return outcome,
            Err(e) => return outcome.failed(CycleError::Select(e)),
        };

        let span = tracing::info_span!("refresh", feed_id = feed.id, url = %feed.url);
        self.refresh(feed, outcome).instrument(span).await
    }

    async fn refresh(&self, feed: Feed, mut outcome: CycleOutcome) -> CycleOutcome {
        outcome.feed = Some(FeedRef::from(&feed));

        let now = Utc::now().timestamp_millis();
        if let Err(source) = self.db.mark_feed_refreshed(feed.id, now).await {
            return outcome.failed(CycleError::Stamp {
                feed_id: feed.id,
                source,
            });
        }

        let doc = match self.client.fetch(&feed.url).await {
            Ok(doc) => doc,
            Err(e) => return outcome.failed(CycleError::Fetch(e)),
        };
        outcome.entries = doc.items.len();
        tracing::debug!(title = %doc.title, entries = outcome.entries, "Feed fetched");

        for (index, item) in doc.items.iter().enumerate() {
            let post = match build_post(feed.id, item) {
                Ok(post) => post,
                Err(source) => {
                    return outcome.failed(CycleError::EntryDate {
                        index,
                        value: item.pub_date.clone(),
                        source,
                    });
                }
            };

            match self.db.insert_post_if_absent(&post).await {
                Ok(InsertOutcome::Inserted) => outcome.inserted += 1,
                Ok(InsertOutcome::AlreadyExists) => {
                    tracing::trace!(url = %post.url, "Post already stored");
                    outcome.duplicates += 1;
                }
                Err(source) => return outcome.failed(CycleError::Insert { index, source }),
            }
        }

        outcome
    }
}

/// Parse a feed-supplied publish date.
///
/// The weekday must be a valid abbreviation (any case) but is not checked
/// against the date.
pub fn parse_pub_date(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let parsed = match value.split_once(", ") {
        Some((day, rest)) if WEEKDAYS.iter().any(|w| w.eq_ignore_ascii_case(day)) => {
            DateTime::parse_from_str(rest, PUB_DATE_BODY_FORMAT)
        }
        // Malformed prefix: the full layout reports the error
        _ => DateTime::parse_from_str(value, PUB_DATE_FORMAT),
    };
    parsed.map(|dt| dt.with_timezone(&Utc))
}

fn build_post(feed_id: i64, item: &FeedItem) -> Result<NewPost, chrono::ParseError> {
    let published = parse_pub_date(&item.pub_date)?;
    let now = Utc::now().timestamp_millis();
    Ok(NewPost {
        id: Uuid::new_v4(),
        title: item.title.clone(),
        url: item.link.clone(),
        description: item.description.clone(),
        published_at: published.timestamp_millis(),
        feed_id,
        created_at: now,
        updated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GO_REFERENCE_DATE: &str = "Mon, 02 Jan 2006 15:04:05 -0700";

    fn rss(items: &[(&str, &str)]) -> String {
        let body: String = items
            .iter()
            .map(|(link, date)| {
                format!(
                    "<item><title>Post {link}</title><link>{link}</link>\
                     <description>About {link}</description><pubDate>{date}</pubDate></item>"
                )
            })
            .collect();
        format!("<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>T</title>{body}</channel></rss>")
    }

    async fn serve(server: &MockServer, route: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    async fn setup() -> (Ingestor, MockServer) {
        let db = Database::open(":memory:").await.unwrap();
        let client = FeedClient::new(Duration::from_secs(5)).unwrap();
        (Ingestor::new(db, client), MockServer::start().await)
    }

    #[test]
    fn test_parse_pub_date_reference_layout() {
        let parsed = parse_pub_date(GO_REFERENCE_DATE).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap());
    }

    #[test]
    fn test_parse_pub_date_rejects_other_layouts() {
        assert!(parse_pub_date("2006-01-02T15:04:05Z").is_err());
        assert!(parse_pub_date("Mon, 02 Jan 2006 15:04:05 GMT").is_err());
        assert!(parse_pub_date("").is_err());
        assert!(parse_pub_date("Xyz, 02 Jan 2006 15:04:05 -0700").is_err());
        assert!(parse_pub_date("02 Jan 2006 15:04:05 -0700").is_err());
    }

    #[test]
    fn test_parse_pub_date_ignores_mismatched_weekday() {
        // 2006-01-02 was a Monday
        let parsed = parse_pub_date("Tue, 02 Jan 2006 15:04:05 -0700").unwrap();
        assert_eq!(parsed, parse_pub_date(GO_REFERENCE_DATE).unwrap());
        assert!(parse_pub_date("sun, 02 Jan 2006 15:04:05 -0700").is_ok());
    }

    #[tokio::test]
    async fn test_wrong_weekday_entry_is_ingested() {
        let (ingestor, server) = setup().await;
        serve(
            &server,
            "/feed",
            rss(&[
                ("https://x/1", "Tue, 02 Jan 2006 15:04:05 -0700"),
                ("https://x/2", GO_REFERENCE_DATE),
            ]),
        )
        .await;
        let db = ingestor.database().clone();
        db.insert_feed("Feed", &format!("{}/feed", server.uri()), "u")
            .await
            .unwrap();

        let outcome = ingestor.run_one_cycle().await;

        assert!(outcome.is_success(), "{:?}", outcome.error);
        assert_eq!(outcome.inserted, 2);
        assert_eq!(db.count_posts().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_registry_is_idle_success() {
        let (ingestor, _server) = setup().await;
        let outcome = ingestor.run_one_cycle().await;
        assert!(outcome.is_idle());
        assert!(outcome.is_success());
        assert_eq!(outcome.inserted, 0);
    }

    #[tokio::test]
    async fn test_duplicate_url_within_document_stored_once() {
        let (ingestor, server) = setup().await;
        serve(
            &server,
            "/feed",
            rss(&[("a", GO_REFERENCE_DATE), ("a", GO_REFERENCE_DATE)]),
        )
        .await;
        let db = ingestor.database().clone();
        let feed_id = db
            .insert_feed("Feed", &format!("{}/feed", server.uri()), "u")
            .await
            .unwrap();

        let outcome = ingestor.run_one_cycle().await;

        assert!(outcome.is_success(), "{:?}", outcome.error);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.duplicates, 1);
        let posts = db.get_posts_for_feed(feed_id).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].url, "a");
        assert_eq!(posts[0].title, "Post a");
        assert_eq!(posts[0].description, "About a");
        assert_eq!(
            posts[0].published_at,
            parse_pub_date(GO_REFERENCE_DATE).unwrap().timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_second_cycle_on_unchanged_feed_inserts_nothing() {
        let (ingestor, server) = setup().await;
        serve(
            &server,
            "/feed",
            rss(&[
                ("https://x/1", GO_REFERENCE_DATE),
                ("https://x/2", "Tue, 03 Jan 2006 10:00:00 +0000"),
            ]),
        )
        .await;
        let db = ingestor.database().clone();
        db.insert_feed("Feed", &format!("{}/feed", server.uri()), "u")
            .await
            .unwrap();

        let first = ingestor.run_one_cycle().await;
        let second = ingestor.run_one_cycle().await;

        assert_eq!(first.inserted, 2);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(db.count_posts().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_bad_date_keeps_earlier_posts_and_skips_rest() {
        let (ingestor, server) = setup().await;
        serve(
            &server,
            "/feed",
            rss(&[
                ("https://x/1", GO_REFERENCE_DATE),
                ("https://x/2", GO_REFERENCE_DATE),
                ("https://x/3", GO_REFERENCE_DATE),
                ("https://x/4", "yesterday-ish"),
                ("https://x/5", GO_REFERENCE_DATE),
            ]),
        )
        .await;
        let db = ingestor.database().clone();
        db.insert_feed("Feed", &format!("{}/feed", server.uri()), "u")
            .await
            .unwrap();

        let outcome = ingestor.run_one_cycle().await;

        assert_eq!(outcome.inserted, 3);
        assert_eq!(outcome.entries, 5);
        match outcome.error {
            Some(CycleError::EntryDate { index, ref value, .. }) => {
                assert_eq!(index, 3);
                assert_eq!(value, "yesterday-ish");
            }
            ref other => panic!("expected EntryDate error, got {other:?}"),
        }
        assert_eq!(db.count_posts().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_fetch_failure_still_stamps_feed() {
        let (ingestor, server) = setup().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let db = ingestor.database().clone();
        let feed_id = db
            .insert_feed("Broken", &format!("{}/feed", server.uri()), "u")
            .await
            .unwrap();

        let outcome = ingestor.run_one_cycle().await;

        assert!(matches!(
            outcome.error,
            Some(CycleError::Fetch(FetchError::HttpStatus(500)))
        ));
        assert_eq!(outcome.feed.as_ref().map(|f| f.id), Some(feed_id));
        assert_eq!(outcome.inserted, 0);
        let feed = db.get_feed(feed_id).await.unwrap().unwrap();
        assert!(feed.last_refreshed_at.is_some());
    }

    #[tokio::test]
    async fn test_failing_feed_does_not_starve_others() {
        let (ingestor, server) = setup().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        serve(&server, "/ok", rss(&[("https://x/ok", GO_REFERENCE_DATE)])).await;

        let db = ingestor.database().clone();
        let broken = db
            .insert_feed("Broken", &format!("{}/broken", server.uri()), "u")
            .await
            .unwrap();
        let ok = db
            .insert_feed("Ok", &format!("{}/ok", server.uri()), "u")
            .await
            .unwrap();

        let first = ingestor.run_one_cycle().await;
        let second = ingestor.run_one_cycle().await;

        assert_eq!(first.feed.map(|f| f.id), Some(broken));
        assert!(first.error.is_some());
        assert_eq!(second.feed.map(|f| f.id), Some(ok));
        assert_eq!(second.inserted, 1);
    }

    #[tokio::test]
    async fn test_stamp_failure_aborts_before_fetch() {
        let (ingestor, server) = setup().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss(&[])))
            .expect(0)
            .mount(&server)
            .await;
        let db = ingestor.database().clone();
        let feed_id = db
            .insert_feed("Feed", &format!("{}/feed", server.uri()), "u")
            .await
            .unwrap();

        // Reject every stamp at the storage layer
        sqlx::query(
            "CREATE TRIGGER reject_stamp BEFORE UPDATE OF last_refreshed_at ON feeds \
             BEGIN SELECT RAISE(ABORT, 'stamp rejected'); END",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let outcome = ingestor.run_one_cycle().await;
        assert!(matches!(
            outcome.error,
            Some(CycleError::Stamp { feed_id: id, .. }) if id == feed_id
        ));
    }

    #[tokio::test]
    async fn test_closed_database_reported_as_select_error() {
        let (ingestor, _server) = setup().await;
        ingestor.database().close().await;

        let outcome = ingestor.run_one_cycle().await;
        assert!(matches!(outcome.error, Some(CycleError::Select(_))));
        assert!(!outcome.is_idle());
    }
}
