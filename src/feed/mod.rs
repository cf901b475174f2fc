//! Feed retrieval and ingestion.
//!
//! - [`parser`] turns an RSS 2.0 or RSS 1.0 (RDF) body into a [`FeedDocument`]
//! - [`fetcher`] issues one GET per feed with a bounded body and timeout
//! - [`ingest`] runs a single select → stamp → fetch → store cycle
//!
//! # Example
//!
//! ```ignore
//! let ingestor = Ingestor::new(db, FeedClient::new(Duration::from_secs(30))?);
//! let outcome = ingestor.run_one_cycle().await;
//! ```

mod fetcher;
mod ingest;
mod parser;

pub use fetcher::{FeedClient, FetchError, CLIENT_LABEL};
pub use ingest::{parse_pub_date, CycleError, CycleOutcome, FeedRef, Ingestor, PUB_DATE_FORMAT};
pub use parser::{parse_feed, FeedDocument, FeedItem, ParseError};
