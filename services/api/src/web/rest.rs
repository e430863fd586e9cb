//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Handlers only turn request payloads into value objects and call the
//! `ReadingService`; every rule lives in the core.

use crate::error::port_error_response;
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, NaiveDate, Utc};
use reading_tracker_core::{
    domain::{Book, Recording, UserBook},
    ports::PortError,
    query::{Connective, Filter, FilterOperator, Query, SortOrder},
    services::{ReadingSession, RecordOutcome},
    values::{BookId, MinuteCount, Notes, PageCount, ReadingDate, UserBookId, UserId, ValueError},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

type HandlerError = (StatusCode, String);

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        start_tracking_handler,
        get_user_book_handler,
        stop_tracking_handler,
        record_reading_handler,
        reconcile_handler,
        search_books_handler,
        search_user_books_handler,
        search_recordings_handler,
    ),
    components(
        schemas(
            StartTrackingRequest,
            RecordReadingRequest,
            Query,
            Filter,
            FilterOperator,
            Connective,
            SortOrder,
            BookResponse,
            UserBookResponse,
            RecordingResponse,
            RecordReadingResponse,
        )
    ),
    tags(
        (name = "Reading Tracker API", description = "Track books, log reading sessions and query progress.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartTrackingRequest {
    pub book_id: Uuid,
}

/// A reading session as sent by the client. `date` is `YYYY-MM-DD` or an RFC 3339
/// timestamp, which is reduced to its UTC calendar date.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordReadingRequest {
    pub date: String,
    pub pages: i64,
    pub minutes: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl RecordReadingRequest {
    fn into_session(self) -> Result<ReadingSession, ValueError> {
        let notes = match self.notes.as_deref() {
            Some(raw) => Notes::parse(raw)?,
            None => None,
        };
        Ok(ReadingSession {
            date: self.date.parse::<ReadingDate>()?,
            pages: PageCount::new(self.pages)?,
            minutes: MinuteCount::new(self.minutes)?,
            notes,
        })
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookResponse {
    id: Uuid,
    title: String,
    author: Option<String>,
    description: Option<String>,
    page_count: u32,
    isbn10: Option<String>,
    isbn13: Option<String>,
    cover_url: Option<String>,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        Self {
            id: book.id.as_uuid(),
            title: book.title.as_str().to_string(),
            author: book.author,
            description: book.description,
            page_count: book.page_count.get(),
            isbn10: book.isbn10.map(|i| i.as_str().to_string()),
            isbn13: book.isbn13.map(|i| i.as_str().to_string()),
            cover_url: book.cover_url,
            owner_id: book.owner_id.as_uuid(),
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserBookResponse {
    id: Uuid,
    user_id: Uuid,
    book_id: Uuid,
    /// `IN_PROGRESS` or `COMPLETED`.
    reading_status: String,
    current_page: u32,
    start_date: Option<NaiveDate>,
    completed_date: Option<NaiveDate>,
    total_minutes: u32,
    total_days: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserBook> for UserBookResponse {
    fn from(ub: UserBook) -> Self {
        Self {
            id: ub.id.as_uuid(),
            user_id: ub.user_id.as_uuid(),
            book_id: ub.book_id.as_uuid(),
            reading_status: ub.reading_status.to_string(),
            current_page: ub.current_page,
            start_date: ub.start_date.map(|d| d.as_date()),
            completed_date: ub.completed_date.map(|d| d.as_date()),
            total_minutes: ub.total_minutes,
            total_days: ub.total_days,
            created_at: ub.created_at,
            updated_at: ub.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordingResponse {
    id: Uuid,
    user_book_id: Uuid,
    date: NaiveDate,
    pages: u32,
    minutes: u32,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Recording> for RecordingResponse {
    fn from(r: Recording) -> Self {
        Self {
            id: r.id.as_uuid(),
            user_book_id: r.user_book_id.as_uuid(),
            date: r.date.as_date(),
            pages: r.pages,
            minutes: r.minutes,
            notes: r.notes.map(Notes::into_inner),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordReadingResponse {
    user_book: UserBookResponse,
    recording: RecordingResponse,
    new_day: bool,
    completed_now: bool,
}

impl From<RecordOutcome> for RecordReadingResponse {
    fn from(outcome: RecordOutcome) -> Self {
        Self {
            user_book: outcome.user_book.into(),
            recording: outcome.recording.into(),
            new_day: outcome.new_day,
            completed_now: outcome.completed_now,
        }
    }
}

/// Parses the `{id}` path segment and checks the caller tracks that book.
async fn owned_user_book(
    app_state: &AppState,
    user_id: UserId,
    raw_id: &str,
) -> Result<UserBook, HandlerError> {
    let id = raw_id
        .parse::<UserBookId>()
        .map_err(|e| port_error_response(PortError::from(e)))?;
    app_state
        .service
        .owned_user_book(user_id, id)
        .await
        .map_err(port_error_response)
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Start tracking a book for the calling user.
#[utoipa::path(
    post,
    path = "/user-books",
    request_body = StartTrackingRequest,
    responses(
        (status = 201, description = "Tracking started", body = UserBookResponse),
        (status = 404, description = "Book not found"),
        (status = 409, description = "The book is already tracked by this user")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn start_tracking_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    Json(req): Json<StartTrackingRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let user_book = app_state
        .service
        .start_tracking(user_id, BookId::from_uuid(req.book_id))
        .await
        .map_err(port_error_response)?;
    Ok((StatusCode::CREATED, Json(UserBookResponse::from(user_book))))
}

/// Fetch one tracked book with its progress summary.
#[utoipa::path(
    get,
    path = "/user-books/{id}",
    responses(
        (status = 200, description = "The user book", body = UserBookResponse),
        (status = 401, description = "The user book belongs to another user"),
        (status = 404, description = "User book not found")
    ),
    params(
        ("id" = Uuid, Path, description = "The user book ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn get_user_book_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<UserBookResponse>, HandlerError> {
    let user_book = owned_user_book(&app_state, user_id, &id).await?;
    Ok(Json(user_book.into()))
}

/// Stop tracking a book, deleting all of its recordings.
#[utoipa::path(
    delete,
    path = "/user-books/{id}",
    responses(
        (status = 204, description = "Tracking stopped"),
        (status = 401, description = "The user book belongs to another user"),
        (status = 404, description = "User book not found")
    ),
    params(
        ("id" = Uuid, Path, description = "The user book ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn stop_tracking_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<StatusCode, HandlerError> {
    let id = owned_user_book(&app_state, user_id, &id).await?.id;
    app_state
        .service
        .stop_tracking(id)
        .await
        .map_err(port_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Log a reading session. Sessions on the same day are merged.
#[utoipa::path(
    post,
    path = "/user-books/{id}/recordings",
    request_body = RecordReadingRequest,
    responses(
        (status = 200, description = "Session recorded", body = RecordReadingResponse),
        (status = 400, description = "Invalid session values"),
        (status = 401, description = "The user book belongs to another user"),
        (status = 404, description = "User book or book not found"),
        (status = 409, description = "A concurrent session for the same day won the race")
    ),
    params(
        ("id" = Uuid, Path, description = "The user book ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn record_reading_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
    Json(req): Json<RecordReadingRequest>,
) -> Result<Json<RecordReadingResponse>, HandlerError> {
    let id = owned_user_book(&app_state, user_id, &id).await?.id;
    let session = req
        .into_session()
        .map_err(|e| port_error_response(e.into()))?;
    let outcome = app_state
        .service
        .record_reading(id, session)
        .await
        .map_err(port_error_response)?;
    Ok(Json(outcome.into()))
}

/// Rebuild a user book's progress summary from its recording log.
#[utoipa::path(
    post,
    path = "/user-books/{id}/reconcile",
    responses(
        (status = 200, description = "Summary rebuilt", body = UserBookResponse),
        (status = 401, description = "The user book belongs to another user"),
        (status = 404, description = "User book or book not found")
    ),
    params(
        ("id" = Uuid, Path, description = "The user book ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn reconcile_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<UserBookResponse>, HandlerError> {
    let id = owned_user_book(&app_state, user_id, &id).await?.id;
    let user_book = app_state
        .service
        .reconcile_progress(id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(user_book.into()))
}

/// Search the book catalogue.
#[utoipa::path(
    post,
    path = "/books/search",
    request_body = Query,
    responses(
        (status = 200, description = "Matching books", body = Vec<BookResponse>),
        (status = 400, description = "Invalid query")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn search_books_handler(
    State(app_state): State<Arc<AppState>>,
    Json(query): Json<Query>,
) -> Result<Json<Vec<BookResponse>>, HandlerError> {
    let books = app_state
        .service
        .list_books(&query)
        .await
        .map_err(port_error_response)?;
    Ok(Json(books.into_iter().map(Into::into).collect()))
}

/// Search the calling user's tracked books.
#[utoipa::path(
    post,
    path = "/user-books/search",
    request_body = Query,
    responses(
        (status = 200, description = "Matching user books", body = Vec<UserBookResponse>),
        (status = 400, description = "Invalid query")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn search_user_books_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    Json(query): Json<Query>,
) -> Result<Json<Vec<UserBookResponse>>, HandlerError> {
    let user_books = app_state
        .service
        .list_user_books(user_id, query)
        .await
        .map_err(port_error_response)?;
    Ok(Json(user_books.into_iter().map(Into::into).collect()))
}

/// Search the recordings of one tracked book.
#[utoipa::path(
    post,
    path = "/user-books/{id}/recordings/search",
    request_body = Query,
    responses(
        (status = 200, description = "Matching recordings", body = Vec<RecordingResponse>),
        (status = 400, description = "Invalid query"),
        (status = 401, description = "The user book belongs to another user"),
        (status = 404, description = "User book not found")
    ),
    params(
        ("id" = Uuid, Path, description = "The user book ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn search_recordings_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
    Json(query): Json<Query>,
) -> Result<Json<Vec<RecordingResponse>>, HandlerError> {
    let id = owned_user_book(&app_state, user_id, &id).await?.id;
    let recordings = app_state
        .service
        .list_recordings(id, query)
        .await
        .map_err(port_error_response)?;
    Ok(Json(recordings.into_iter().map(Into::into).collect()))
}
