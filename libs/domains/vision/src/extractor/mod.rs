//! Incremental record extraction from provider token streams.

mod object;
mod ranking;
mod sanitize;

pub use object::ObjectExtractor;
pub use ranking::RankingExtractor;
pub use sanitize::{DEFAULT_MIN_CONFIDENCE, ItemSanitizer};
