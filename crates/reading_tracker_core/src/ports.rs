//! crates/reading_tracker_core/src/ports.rs
//!
//! Defines the repository contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete store. Every listing goes through a `Query`;
//! translating it to the store's native predicate language is the adapter's job.

use crate::domain::{Book, Recording, UserBook};
use crate::query::{Query, QueryError};
use crate::values::{BookId, RecordingId, UserBookId, ValueError};
use async_trait::async_trait;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The closed set of failure kinds surfaced by the core.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// Malformed input: a value object or a query that failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),
    /// A store-level unique key was violated.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl From<ValueError> for PortError {
    fn from(e: ValueError) -> Self {
        PortError::Validation(e.to_string())
    }
}

impl From<QueryError> for PortError {
    fn from(e: QueryError) -> Self {
        PortError::Validation(e.to_string())
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Repository Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait BookRepository: Send + Sync {
    async fn find_by_id(&self, id: BookId) -> PortResult<Option<Book>>;

    async fn find(&self, query: &Query) -> PortResult<Vec<Book>>;
}

#[async_trait]
pub trait UserBookRepository: Send + Sync {
    async fn find_by_id(&self, id: UserBookId) -> PortResult<Option<UserBook>>;

    async fn find(&self, query: &Query) -> PortResult<Vec<UserBook>>;

    /// Inserts or replaces the row with `user_book.id`.
    async fn save(&self, user_book: &UserBook) -> PortResult<()>;

    /// Fails with `NotFound` when no row was deleted.
    async fn delete(&self, id: UserBookId) -> PortResult<()>;
}

#[async_trait]
pub trait RecordingRepository: Send + Sync {
    async fn find_by_id(&self, id: RecordingId) -> PortResult<Option<Recording>>;

    async fn find(&self, query: &Query) -> PortResult<Vec<Recording>>;

    /// The complete log of one `UserBook`, oldest day first.
    async fn find_all_by_user_book(&self, user_book_id: UserBookId) -> PortResult<Vec<Recording>>;

    /// Inserts or replaces the row with `recording.id`.
    async fn save(&self, recording: &Recording) -> PortResult<()>;

    /// Persists the first recording of a day and returns the stored row.
    ///
    /// Stores that keep one row per (user book, date) fold `recording` into a row
    /// another call wrote for the same day in the meantime, adding its pages and
    /// minutes and replacing the notes when it has some. The returned row then
    /// carries the other id. Stores without that constraint just save.
    async fn insert_day(&self, recording: &Recording) -> PortResult<Recording> {
        self.save(recording).await?;
        Ok(recording.clone())
    }

    /// Fails with `NotFound` when no row was deleted.
    async fn delete(&self, id: RecordingId) -> PortResult<()>;

    /// Removes every recording of `user_book_id`, returning how many were deleted.
    async fn delete_by_user_book(&self, user_book_id: UserBookId) -> PortResult<u64>;
}
