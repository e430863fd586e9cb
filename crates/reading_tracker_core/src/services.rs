//! crates/reading_tracker_core/src/services.rs
//!
//! The use cases of the tracker, written against the repository ports only.
//!
//! `record_reading` is the aggregation engine: it merges a logged session into
//! the day's recording and keeps the `UserBook` progress summary in step.
//! Calls are not serialized against each other, and the `UserBook` write and the
//! `Recording` write are two independent store operations.

use crate::domain::{Book, Recording, UserBook};
use crate::ports::{
    BookRepository, PortError, PortResult, RecordingRepository, UserBookRepository,
};
use crate::query::{Filter, FilterOperator, Query, SortOrder};
use crate::values::{BookId, MinuteCount, Notes, PageCount, ReadingDate, UserBookId, UserId};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A fully validated reading session, as handed over by the request layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingSession {
    pub date: ReadingDate,
    pub pages: PageCount,
    pub minutes: MinuteCount,
    pub notes: Option<Notes>,
}

/// What a call to [`ReadingService::record_reading`] persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub user_book: UserBook,
    pub recording: Recording,
    /// `false` when the session was merged into an existing recording for the day.
    pub new_day: bool,
    /// `true` only on the call that moved the `UserBook` to `COMPLETED`.
    pub completed_now: bool,
}

#[derive(Clone)]
pub struct ReadingService {
    books: Arc<dyn BookRepository>,
    user_books: Arc<dyn UserBookRepository>,
    recordings: Arc<dyn RecordingRepository>,
}

impl ReadingService {
    pub fn new(
        books: Arc<dyn BookRepository>,
        user_books: Arc<dyn UserBookRepository>,
        recordings: Arc<dyn RecordingRepository>,
    ) -> Self {
        Self {
            books,
            user_books,
            recordings,
        }
    }

    async fn load_user_book(&self, id: UserBookId) -> PortResult<UserBook> {
        self.user_books
            .find_by_id(id)
            .await?
            .ok_or_else(|| PortError::NotFound(format!("UserBook {} not found", id)))
    }

    async fn load_book(&self, id: BookId) -> PortResult<Book> {
        self.books
            .find_by_id(id)
            .await?
            .ok_or_else(|| PortError::NotFound(format!("Book {} not found", id)))
    }

    //=====================================================================================
    // Aggregation Engine
    //=====================================================================================

    /// Logs a reading session for `user_book_id`.
    ///
    /// Sessions on a day that already has a recording are merged into it; the
    /// `UserBook` summary receives this session's deltas and is completed once its
    /// current page reaches the book's page count. Two writes are made, the
    /// `UserBook` first. When the store folds a new day into a recording written
    /// concurrently for that day, the summary is rebuilt from the recording log
    /// and saved again. Store errors are returned unchanged and nothing is retried.
    pub async fn record_reading(
        &self,
        user_book_id: UserBookId,
        session: ReadingSession,
    ) -> PortResult<RecordOutcome> {
        let mut user_book = self.load_user_book(user_book_id).await?;
        let book = self.load_book(user_book.book_id).await?;

        let same_day = Query::new()
            .filter(Filter::new("userBookId", FilterOperator::Equals, user_book_id.to_string()))
            .filter(Filter::new("date", FilterOperator::Equals, session.date.to_string()))
            .sort_by("createdAt", SortOrder::Asc)
            .paginate(2, 1);
        let mut existing = self.recordings.find(&same_day).await?;
        if existing.len() > 1 {
            warn!(
                "UserBook {} has {} recordings on {}; merging into the oldest",
                user_book_id,
                existing.len(),
                session.date
            );
        }

        let now = Utc::now();
        let (recording, new_day) = match existing.drain(..).next() {
            Some(mut recording) => {
                recording.merge(session.pages, session.minutes, session.notes, now);
                (recording, false)
            }
            None => {
                let recording = Recording::new(
                    user_book_id,
                    session.date,
                    session.pages,
                    session.minutes,
                    session.notes,
                    now,
                );
                (recording, true)
            }
        };

        user_book.apply_session(session.date, session.pages, session.minutes, new_day, now);
        let mut completed_now = user_book.complete_if_reached(book.page_count, session.date);
        if completed_now {
            info!(
                "UserBook {} completed on {} at page {}/{}",
                user_book_id,
                session.date,
                user_book.current_page,
                book.page_count.get()
            );
        }

        self.user_books.save(&user_book).await?;
        let (recording, new_day) = if new_day {
            let stored = self.recordings.insert_day(&recording).await?;
            if stored.id == recording.id {
                (stored, true)
            } else {
                warn!(
                    "Another session opened {} for UserBook {} first; folded into recording {}",
                    session.date, user_book_id, stored.id
                );
                let log = self.recordings.find_all_by_user_book(user_book_id).await?;
                completed_now |= user_book.rederive(&log, book.page_count, now);
                self.user_books.save(&user_book).await?;
                (stored, false)
            }
        } else {
            self.recordings.save(&recording).await?;
            (recording, false)
        };
        debug!(
            "Recorded {} pages / {} minutes for UserBook {} on {} (new day: {})",
            session.pages.get(),
            session.minutes.get(),
            user_book_id,
            session.date,
            new_day
        );

        Ok(RecordOutcome {
            user_book,
            recording,
            new_day,
            completed_now,
        })
    }

    /// Rebuilds the progress summary of `user_book_id` from its recording log.
    ///
    /// Idempotent; use it to repair a `UserBook` after a partially applied
    /// `record_reading`. Completion is never reverted.
    pub async fn reconcile_progress(&self, user_book_id: UserBookId) -> PortResult<UserBook> {
        let mut user_book = self.load_user_book(user_book_id).await?;
        let book = self.load_book(user_book.book_id).await?;
        let log = self.recordings.find_all_by_user_book(user_book_id).await?;

        let completed_now = user_book.rederive(&log, book.page_count, Utc::now());
        self.user_books.save(&user_book).await?;
        info!(
            "Reconciled UserBook {} from {} recordings (completed now: {})",
            user_book_id,
            log.len(),
            completed_now
        );
        Ok(user_book)
    }

    //=====================================================================================
    // Tracking Lifecycle
    //=====================================================================================

    pub async fn start_tracking(&self, user_id: UserId, book_id: BookId) -> PortResult<UserBook> {
        let book = self.load_book(book_id).await?;
        let user_book = UserBook::start(user_id, book.id, Utc::now());
        self.user_books.save(&user_book).await?;
        info!("User {} started tracking book {} as {}", user_id, book_id, user_book.id);
        Ok(user_book)
    }

    /// Deletes a `UserBook` after explicitly deleting all of its recordings.
    pub async fn stop_tracking(&self, user_book_id: UserBookId) -> PortResult<()> {
        self.load_user_book(user_book_id).await?;
        let removed = self.recordings.delete_by_user_book(user_book_id).await?;
        self.user_books.delete(user_book_id).await?;
        info!("Stopped tracking {} ({} recordings removed)", user_book_id, removed);
        Ok(())
    }

    //=====================================================================================
    // Reads
    //=====================================================================================

    pub async fn get_user_book(&self, user_book_id: UserBookId) -> PortResult<UserBook> {
        self.load_user_book(user_book_id).await
    }

    /// Loads `user_book_id` on behalf of `user_id`, failing with `Unauthorized` when
    /// it is tracked by another user.
    pub async fn owned_user_book(
        &self,
        user_id: UserId,
        user_book_id: UserBookId,
    ) -> PortResult<UserBook> {
        let user_book = self.load_user_book(user_book_id).await?;
        if user_book.user_id != user_id {
            warn!("User {} asked for UserBook {} of another user", user_id, user_book_id);
            return Err(PortError::Unauthorized);
        }
        Ok(user_book)
    }

    pub async fn list_books(&self, query: &Query) -> PortResult<Vec<Book>> {
        self.books.find(query).await
    }

    /// Lists the user books of `user_id` matching `query`.
    pub async fn list_user_books(&self, user_id: UserId, query: Query) -> PortResult<Vec<UserBook>> {
        let query = query.scoped_to("userId", user_id.to_string());
        self.user_books.find(&query).await
    }

    /// Lists the recordings of one user book matching `query`.
    pub async fn list_recordings(
        &self,
        user_book_id: UserBookId,
        query: Query,
    ) -> PortResult<Vec<Recording>> {
        self.load_user_book(user_book_id).await?;
        let query = query.scoped_to("userBookId", user_book_id.to_string());
        self.recordings.find(&query).await
    }
}
