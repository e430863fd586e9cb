pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use middleware::require_user;
use rest::{
    get_user_book_handler, reconcile_handler, record_reading_handler, search_books_handler,
    search_recordings_handler, search_user_books_handler, start_tracking_handler,
    stop_tracking_handler,
};
use state::AppState;
use std::sync::Arc;

/// Builds the REST router. Every route requires the `x-user-id` header.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/books/search", post(search_books_handler))
        .route("/user-books", post(start_tracking_handler))
        .route("/user-books/search", post(search_user_books_handler))
        .route(
            "/user-books/{id}",
            get(get_user_book_handler).delete(stop_tracking_handler),
        )
        .route("/user-books/{id}/recordings", post(record_reading_handler))
        .route(
            "/user-books/{id}/recordings/search",
            post(search_recordings_handler),
        )
        .route("/user-books/{id}/reconcile", post(reconcile_handler))
        .layer(axum_middleware::from_fn(require_user))
        .with_state(state)
}
