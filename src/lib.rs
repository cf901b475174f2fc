//! Periodic RSS aggregation into SQLite.
//!
//! A [`scheduler::Scheduler`] drives [`feed::Ingestor`] cycles at a fixed
//! cadence. Each cycle refreshes the feed that has waited longest and stores
//! every entry whose URL has not been seen before.

pub mod config;
pub mod feed;
pub mod scheduler;
pub mod storage;
pub mod util;
