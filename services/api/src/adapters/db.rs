//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the repository ports from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Listings are compiled by `SqlSelect`; this module only binds and runs them.

use crate::adapters::sql_query::SqlSelect;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reading_tracker_core::domain::{Book, ReadingStatus, Recording, UserBook};
use reading_tracker_core::ports::{
    BookRepository, PortError, PortResult, RecordingRepository, UserBookRepository,
};
use reading_tracker_core::query::{Query, QueryPlan, Queryable, Scalar};
use reading_tracker_core::values::{
    BookId, Isbn, Notes, PageCount, ReadingDate, RecordingId, Title, UserBookId, UserId,
};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const BOOK_COLUMNS: &str = "id, title, author, description, page_count, isbn10, isbn13, \
     cover_url, owner_id, created_at, updated_at";
const USER_BOOK_COLUMNS: &str = "id, user_id, book_id, reading_status, current_page, \
     start_date, completed_date, total_minutes, total_days, created_at, updated_at";
const RECORDING_COLUMNS: &str =
    "id, user_book_id, \"date\", pages, minutes, notes, created_at, updated_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements every repository port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Runs `query` against `table`, decoding rows as `R`.
    async fn select<E, R>(&self, query: &Query, table: &str, columns: &str) -> PortResult<Vec<R>>
    where
        E: Queryable,
        R: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let plan = QueryPlan::for_entity::<E>(query)?;
        let select = SqlSelect::translate(&plan);
        let sql = select.to_sql(columns, table);

        let mut statement = sqlx::query_as::<_, R>(&sql);
        for value in select.binds {
            statement = match value {
                Scalar::Id(v) => statement.bind(v),
                Scalar::Text(v) => statement.bind(v),
                Scalar::Integer(v) => statement.bind(v),
                Scalar::Date(v) => statement.bind(v),
                Scalar::Timestamp(v) => statement.bind(v),
            };
        }
        statement.fetch_all(&self.pool).await.map_err(store_error)
    }
}

/// Maps a `sqlx` failure to a port error, surfacing unique-key violations as conflicts.
fn store_error(e: sqlx::Error) -> PortError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PortError::Conflict(db.message().to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn corrupt(table: &str, id: Uuid, detail: impl std::fmt::Display) -> PortError {
    PortError::Unexpected(format!("Corrupt {} row {}: {}", table, id, detail))
}

fn to_count(table: &str, id: Uuid, value: i32) -> PortResult<u32> {
    u32::try_from(value).map_err(|_| corrupt(table, id, format!("negative count {}", value)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct BookRecord {
    id: Uuid,
    title: String,
    author: Option<String>,
    description: Option<String>,
    page_count: i32,
    isbn10: Option<String>,
    isbn13: Option<String>,
    cover_url: Option<String>,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl BookRecord {
    fn to_domain(self) -> PortResult<Book> {
        let id = self.id;
        let isbn = |raw: Option<String>| {
            raw.map(|s| Isbn::parse(&s))
                .transpose()
                .map_err(|e| corrupt("books", id, e))
        };
        Ok(Book {
            id: BookId::from_uuid(self.id),
            title: Title::new(&self.title).map_err(|e| corrupt("books", id, e))?,
            author: self.author,
            description: self.description,
            page_count: PageCount::new(i64::from(self.page_count))
                .map_err(|e| corrupt("books", id, e))?,
            isbn10: isbn(self.isbn10)?,
            isbn13: isbn(self.isbn13)?,
            cover_url: self.cover_url,
            owner_id: UserId::from_uuid(self.owner_id),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct UserBookRecord {
    id: Uuid,
    user_id: Uuid,
    book_id: Uuid,
    reading_status: String,
    current_page: i32,
    start_date: Option<NaiveDate>,
    completed_date: Option<NaiveDate>,
    total_minutes: i32,
    total_days: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl UserBookRecord {
    fn to_domain(self) -> PortResult<UserBook> {
        let id = self.id;
        Ok(UserBook {
            id: UserBookId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            book_id: BookId::from_uuid(self.book_id),
            reading_status: self
                .reading_status
                .parse::<ReadingStatus>()
                .map_err(|e| corrupt("user_books", id, e))?,
            current_page: to_count("user_books", id, self.current_page)?,
            start_date: self.start_date.map(ReadingDate::from_date),
            completed_date: self.completed_date.map(ReadingDate::from_date),
            total_minutes: to_count("user_books", id, self.total_minutes)?,
            total_days: to_count("user_books", id, self.total_days)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct RecordingRecord {
    id: Uuid,
    user_book_id: Uuid,
    date: NaiveDate,
    pages: i32,
    minutes: i32,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl RecordingRecord {
    fn to_domain(self) -> PortResult<Recording> {
        let id = self.id;
        let notes = match self.notes {
            Some(raw) => Notes::parse(&raw).map_err(|e| corrupt("recordings", id, e))?,
            None => None,
        };
        Ok(Recording {
            id: RecordingId::from_uuid(self.id),
            user_book_id: UserBookId::from_uuid(self.user_book_id),
            date: ReadingDate::from_date(self.date),
            pages: to_count("recordings", id, self.pages)?,
            minutes: to_count("recordings", id, self.minutes)?,
            notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn to_db_count(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

//=========================================================================================
// Repository Trait Implementations
//=========================================================================================

#[async_trait]
impl BookRepository for DbAdapter {
    async fn find_by_id(&self, id: BookId) -> PortResult<Option<Book>> {
        let sql = format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS);
        let record = sqlx::query_as::<_, BookRecord>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        record.map(BookRecord::to_domain).transpose()
    }

    async fn find(&self, query: &Query) -> PortResult<Vec<Book>> {
        self.select::<Book, BookRecord>(query, "books", BOOK_COLUMNS)
            .await?
            .into_iter()
            .map(BookRecord::to_domain)
            .collect()
    }
}

#[async_trait]
impl UserBookRepository for DbAdapter {
    async fn find_by_id(&self, id: UserBookId) -> PortResult<Option<UserBook>> {
        let sql = format!("SELECT {} FROM user_books WHERE id = $1", USER_BOOK_COLUMNS);
        let record = sqlx::query_as::<_, UserBookRecord>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        record.map(UserBookRecord::to_domain).transpose()
    }

    async fn find(&self, query: &Query) -> PortResult<Vec<UserBook>> {
        self.select::<UserBook, UserBookRecord>(query, "user_books", USER_BOOK_COLUMNS)
            .await?
            .into_iter()
            .map(UserBookRecord::to_domain)
            .collect()
    }

    async fn save(&self, user_book: &UserBook) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO user_books (id, user_id, book_id, reading_status, current_page, \
             start_date, completed_date, total_minutes, total_days, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (id) DO UPDATE SET \
             reading_status = EXCLUDED.reading_status, \
             current_page = EXCLUDED.current_page, \
             start_date = EXCLUDED.start_date, \
             completed_date = EXCLUDED.completed_date, \
             total_minutes = EXCLUDED.total_minutes, \
             total_days = EXCLUDED.total_days, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(user_book.id.as_uuid())
        .bind(user_book.user_id.as_uuid())
        .bind(user_book.book_id.as_uuid())
        .bind(user_book.reading_status.as_str())
        .bind(to_db_count(user_book.current_page))
        .bind(user_book.start_date.map(|d| d.as_date()))
        .bind(user_book.completed_date.map(|d| d.as_date()))
        .bind(to_db_count(user_book.total_minutes))
        .bind(to_db_count(user_book.total_days))
        .bind(user_book.created_at)
        .bind(user_book.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn delete(&self, id: UserBookId) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM user_books WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("UserBook {} not found", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordingRepository for DbAdapter {
    async fn find_by_id(&self, id: RecordingId) -> PortResult<Option<Recording>> {
        let sql = format!("SELECT {} FROM recordings WHERE id = $1", RECORDING_COLUMNS);
        let record = sqlx::query_as::<_, RecordingRecord>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        record.map(RecordingRecord::to_domain).transpose()
    }

    async fn find(&self, query: &Query) -> PortResult<Vec<Recording>> {
        self.select::<Recording, RecordingRecord>(query, "recordings", RECORDING_COLUMNS)
            .await?
            .into_iter()
            .map(RecordingRecord::to_domain)
            .collect()
    }

    async fn find_all_by_user_book(&self, user_book_id: UserBookId) -> PortResult<Vec<Recording>> {
        let sql = format!(
            "SELECT {} FROM recordings WHERE user_book_id = $1 ORDER BY \"date\" ASC, created_at ASC",
            RECORDING_COLUMNS
        );
        let records = sqlx::query_as::<_, RecordingRecord>(&sql)
            .bind(user_book_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        records.into_iter().map(RecordingRecord::to_domain).collect()
    }

    async fn save(&self, recording: &Recording) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO recordings (id, user_book_id, \"date\", pages, minutes, notes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO UPDATE SET \
             pages = EXCLUDED.pages, \
             minutes = EXCLUDED.minutes, \
             notes = EXCLUDED.notes, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(recording.id.as_uuid())
        .bind(recording.user_book_id.as_uuid())
        .bind(recording.date.as_date())
        .bind(to_db_count(recording.pages))
        .bind(to_db_count(recording.minutes))
        .bind(recording.notes.as_ref().map(|n| n.as_str().to_string()))
        .bind(recording.created_at)
        .bind(recording.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn insert_day(&self, recording: &Recording) -> PortResult<Recording> {
        let sql = format!(
            "INSERT INTO recordings (id, user_book_id, \"date\", pages, minutes, notes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (user_book_id, \"date\") DO UPDATE SET \
             pages = recordings.pages + EXCLUDED.pages, \
             minutes = recordings.minutes + EXCLUDED.minutes, \
             notes = COALESCE(EXCLUDED.notes, recordings.notes), \
             updated_at = EXCLUDED.updated_at \
             RETURNING {}",
            RECORDING_COLUMNS
        );
        let record = sqlx::query_as::<_, RecordingRecord>(&sql)
            .bind(recording.id.as_uuid())
            .bind(recording.user_book_id.as_uuid())
            .bind(recording.date.as_date())
            .bind(to_db_count(recording.pages))
            .bind(to_db_count(recording.minutes))
            .bind(recording.notes.as_ref().map(|n| n.as_str().to_string()))
            .bind(recording.created_at)
            .bind(recording.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;
        record.to_domain()
    }

    async fn delete(&self, id: RecordingId) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM recordings WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Recording {} not found", id)));
        }
        Ok(())
    }

    async fn delete_by_user_book(&self, user_book_id: UserBookId) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM recordings WHERE user_book_id = $1")
            .bind(user_book_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected())
    }
}
