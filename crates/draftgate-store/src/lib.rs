//! Storage layer: atomic document persistence and the append-only result journal.

mod documents;
mod error;
mod journal;
mod summary;

pub use documents::{load_document, save_document};
pub use error::StoreError;
pub use journal::{FailureReason, Journal, JournalEntry};
pub use summary::{JournalSummary, summarize};
