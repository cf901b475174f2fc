//! Utility functions shared across the crate.
//!
//! - **Text normalisation**: HTML entity decoding and control-character stripping
//!   for feed-supplied titles and descriptions
//! - **Durations**: parsing of `1m0s`-style interval strings
//! - **URL validation**: scheme and host checks for feed registration

mod duration;
mod text;
mod url_validator;

pub use duration::{parse_duration, DurationError};
pub use text::{normalize_text, strip_control_chars};
pub use url_validator::{validate_feed_url, UrlValidationError};
