//! crates/reading_tracker_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.
//!
//! `UserBook` and `Recording` are separate aggregates joined only by
//! `Recording::user_book_id`; a `UserBook` never owns its recordings in memory.

use crate::values::{
    BookId, Isbn, MinuteCount, Notes, PageCount, ReadingDate, RecordingId, Title, UserBookId,
    UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

//=========================================================================================
// Book
//=========================================================================================

/// A book in the catalogue. Read-only from the tracker's perspective.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: BookId,
    pub title: Title,
    pub author: Option<String>,
    pub description: Option<String>,
    pub page_count: PageCount,
    pub isbn10: Option<Isbn>,
    pub isbn13: Option<Isbn>,
    pub cover_url: Option<String>,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//=========================================================================================
// ReadingStatus
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadingStatus {
    InProgress,
    Completed,
}

impl ReadingStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::InProgress => "IN_PROGRESS",
            ReadingStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known reading status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown reading status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ReadingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(ReadingStatus::InProgress),
            "COMPLETED" => Ok(ReadingStatus::Completed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

//=========================================================================================
// UserBook
//=========================================================================================

/// One user's tracking of one book, holding the denormalized progress summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBook {
    pub id: UserBookId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub reading_status: ReadingStatus,
    pub current_page: u32,
    pub start_date: Option<ReadingDate>,
    pub completed_date: Option<ReadingDate>,
    pub total_minutes: u32,
    pub total_days: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserBook {
    /// Begins tracking `book_id` for `user_id` with an empty progress summary.
    pub fn start(user_id: UserId, book_id: BookId, now: DateTime<Utc>) -> Self {
        Self {
            id: UserBookId::new(),
            user_id,
            book_id,
            reading_status: ReadingStatus::InProgress,
            current_page: 0,
            start_date: None,
            completed_date: None,
            total_minutes: 0,
            total_days: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.reading_status == ReadingStatus::Completed
    }

    /// Adds one logged session's deltas to the summary.
    ///
    /// `pages` and `minutes` are the amounts from this call only, never a merged
    /// day total.
    pub fn apply_session(
        &mut self,
        date: ReadingDate,
        pages: PageCount,
        minutes: MinuteCount,
        is_new_day: bool,
        now: DateTime<Utc>,
    ) {
        self.current_page = self.current_page.saturating_add(pages.get());
        self.total_minutes = self.total_minutes.saturating_add(minutes.get());
        if is_new_day {
            self.total_days += 1;
        }
        self.start_date = Some(match self.start_date {
            Some(start) => start.min(date),
            None => date,
        });
        self.updated_at = now;
    }

    /// Marks the book completed once `current_page` reaches the book's page count.
    ///
    /// Returns `true` only on the call that performs the transition. A completed
    /// `UserBook` is never moved back to `IN_PROGRESS`.
    pub fn complete_if_reached(&mut self, page_count: PageCount, date: ReadingDate) -> bool {
        if self.is_completed() || self.current_page < page_count.get() {
            return false;
        }
        self.reading_status = ReadingStatus::Completed;
        self.completed_date = Some(date);
        true
    }

    /// Recomputes the summary from the full recording log of this `UserBook`.
    ///
    /// Completion is re-evaluated but never reverted; when it is reached here the
    /// completed date is the day on which cumulative pages first hit `page_count`.
    /// Returns `true` if this call completed the book.
    pub fn rederive(
        &mut self,
        recordings: &[Recording],
        page_count: PageCount,
        now: DateTime<Utc>,
    ) -> bool {
        let mut per_day: BTreeMap<ReadingDate, (u32, u32)> = BTreeMap::new();
        for recording in recordings.iter().filter(|r| r.user_book_id == self.id) {
            let entry = per_day.entry(recording.date).or_default();
            entry.0 = entry.0.saturating_add(recording.pages);
            entry.1 = entry.1.saturating_add(recording.minutes);
        }

        self.current_page = 0;
        self.total_minutes = 0;
        self.total_days = per_day.len() as u32;
        self.start_date = per_day.keys().next().copied();

        let mut reached_on = None;
        for (date, (pages, minutes)) in &per_day {
            self.current_page = self.current_page.saturating_add(*pages);
            self.total_minutes = self.total_minutes.saturating_add(*minutes);
            if reached_on.is_none() && self.current_page >= page_count.get() {
                reached_on = Some(*date);
            }
        }
        self.updated_at = now;

        match reached_on {
            Some(date) => self.complete_if_reached(page_count, date),
            None => false,
        }
    }
}

//=========================================================================================
// Recording
//=========================================================================================

/// One calendar day's logged reading for a `UserBook`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub id: RecordingId,
    pub user_book_id: UserBookId,
    pub date: ReadingDate,
    pub pages: u32,
    pub minutes: u32,
    pub notes: Option<Notes>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recording {
    pub fn new(
        user_book_id: UserBookId,
        date: ReadingDate,
        pages: PageCount,
        minutes: MinuteCount,
        notes: Option<Notes>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordingId::new(),
            user_book_id,
            date,
            pages: pages.get(),
            minutes: minutes.get(),
            notes,
            created_at: now,
            updated_at: now,
        }
    }

    /// Folds another session on the same day into this recording.
    ///
    /// Pages and minutes are summed. Incoming notes replace the stored ones;
    /// without incoming notes the stored ones are kept.
    pub fn merge(
        &mut self,
        pages: PageCount,
        minutes: MinuteCount,
        notes: Option<Notes>,
        now: DateTime<Utc>,
    ) {
        self.pages = self.pages.saturating_add(pages.get());
        self.minutes = self.minutes.saturating_add(minutes.get());
        if notes.is_some() {
            self.notes = notes;
        }
        self.updated_at = now;
    }
}
