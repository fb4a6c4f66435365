//! Stundenplan Core Library
//!
//! This library ingests a school timetable published as an ICS feed,
//! normalizes it into lesson records, classifies each lesson (exam,
//! cancelled, moved, room change) and answers time-relative queries
//! from a periodically refreshed cache.

pub mod cache;
pub mod classify;
pub mod error;
pub mod feed;
pub mod queries;
pub mod subjects;
pub mod types;

// Re-export core types and error handling
pub use classify::{Classified, Classifier};
pub use error::{Error, Result};
pub use feed::FeedNormalizer;
pub use types::*;

/// Commonly used items
pub mod prelude {
    pub use crate::{cache::*, classify::*, feed::*, queries::*, subjects::*, types::*};
}
