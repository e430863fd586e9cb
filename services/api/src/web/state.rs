//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use reading_tracker_core::services::ReadingService;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: ReadingService,
}
