//! Runs the tracker against a real PostgreSQL through `DbAdapter`.
//!
//! Needs `DATABASE_URL` pointing at a scratch database:
//! `cargo test -p api --test postgres_store -- --ignored`

use api_lib::adapters::DbAdapter;
use chrono::Utc;
use reading_tracker_core::{
    BookId, Filter, FilterOperator, MinuteCount, Notes, PageCount, PortError, Query,
    ReadingService, ReadingSession, ReadingStatus, Recording, RecordingId, RecordingRepository,
    SortOrder, UserBookRepository, UserId,
};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

async fn setup(page_count: i32) -> (Arc<DbAdapter>, ReadingService, BookId) {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres tests");
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .unwrap();
    let adapter = Arc::new(DbAdapter::new(pool.clone()));
    adapter.run_migrations().await.unwrap();

    let book_id = BookId::new();
    sqlx::query(
        "INSERT INTO books (id, title, author, page_count, owner_id, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $6)",
    )
    .bind(book_id.as_uuid())
    .bind("The Dispossessed")
    .bind("Ursula K. Le Guin")
    .bind(page_count)
    .bind(UserId::new().as_uuid())
    .bind(Utc::now())
    .execute(&pool)
    .await
    .unwrap();

    let service = ReadingService::new(adapter.clone(), adapter.clone(), adapter.clone());
    (adapter, service, book_id)
}

fn session(date: &str, pages: i64, minutes: i64, notes: Option<&str>) -> ReadingSession {
    ReadingSession {
        date: date.parse().unwrap(),
        pages: PageCount::new(pages).unwrap(),
        minutes: MinuteCount::new(minutes).unwrap(),
        notes: notes.and_then(|n| Notes::parse(n).unwrap()),
    }
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn end_to_end_merge_and_completion_on_postgres() {
    let (adapter, service, book_id) = setup(200).await;
    let ub = service.start_tracking(UserId::new(), book_id).await.unwrap();

    let first = service
        .record_reading(ub.id, session("2024-01-01", 150, 60, None))
        .await
        .unwrap();
    assert!(first.new_day);
    assert_eq!(first.user_book.current_page, 150);
    assert_eq!(first.user_book.reading_status, ReadingStatus::InProgress);

    let second = service
        .record_reading(ub.id, session("2024-01-01", 60, 30, Some("done")))
        .await
        .unwrap();
    assert!(!second.new_day);
    assert!(second.completed_now);
    assert_eq!(second.recording.id, first.recording.id);

    let stored = service.get_user_book(ub.id).await.unwrap();
    assert_eq!(stored.current_page, 210);
    assert_eq!(stored.total_days, 1);
    assert_eq!(stored.reading_status, ReadingStatus::Completed);
    assert_eq!(stored.completed_date, Some("2024-01-01".parse().unwrap()));

    let log = adapter.find_all_by_user_book(ub.id).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!((log[0].pages, log[0].minutes), (210, 90));
    assert_eq!(log[0].notes.as_ref().map(Notes::as_str), Some("done"));
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn filtered_searches_run_on_postgres() {
    let (_adapter, service, book_id) = setup(500).await;
    let user = UserId::new();
    let ub = service.start_tracking(user, book_id).await.unwrap();
    for (date, pages) in [("2024-02-01", 10), ("2024-02-02", 20), ("2024-02-03", 30)] {
        service
            .record_reading(ub.id, session(date, pages, 15, Some("Chapter 50%")))
            .await
            .unwrap();
    }

    let between = Query::new()
        .filter(Filter::new(
            "date",
            FilterOperator::Between,
            json!(["2024-02-02", "2024-02-03"]),
        ))
        .filter(Filter::new("notes", FilterOperator::EndsWith, "50%"))
        .sort_by("date", SortOrder::Asc);
    let found = service.list_recordings(ub.id, between).await.unwrap();
    assert_eq!(found.iter().map(|r| r.pages).collect::<Vec<_>>(), vec![20, 30]);

    let paged = Query::new()
        .filter(Filter::new("pages", FilterOperator::In, json!([10, 20, 30])))
        .sort_by("pages", SortOrder::Desc)
        .paginate(1, 2);
    let page_two = service.list_recordings(ub.id, paged).await.unwrap();
    assert_eq!(page_two.iter().map(|r| r.pages).collect::<Vec<_>>(), vec![20]);

    let mine = Query::new()
        .filter(Filter::new("readingStatus", FilterOperator::Equals, "IN_PROGRESS"))
        .filter(Filter::new("completedDate", FilterOperator::Equals, serde_json::Value::Null));
    let listed = service.list_user_books(user, mine).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].current_page, 60);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn unique_violations_surface_as_conflicts() {
    let (adapter, service, book_id) = setup(300).await;
    let ub = service.start_tracking(UserId::new(), book_id).await.unwrap();

    let err = service
        .start_tracking(ub.user_id, book_id)
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Conflict(_)));

    service
        .record_reading(ub.id, session("2024-03-01", 5, 5, None))
        .await
        .unwrap();
    let twin = Recording::new(
        ub.id,
        "2024-03-01".parse().unwrap(),
        PageCount::new(5).unwrap(),
        MinuteCount::new(5).unwrap(),
        None,
        Utc::now(),
    );
    let err = RecordingRepository::save(adapter.as_ref(), &twin)
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Conflict(_)));
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn insert_day_folds_into_the_existing_row() {
    let (adapter, service, book_id) = setup(300).await;
    let ub = service.start_tracking(UserId::new(), book_id).await.unwrap();
    let opened = service
        .record_reading(ub.id, session("2024-04-01", 5, 10, Some("first")))
        .await
        .unwrap();

    let late = Recording::new(
        ub.id,
        "2024-04-01".parse().unwrap(),
        PageCount::new(7).unwrap(),
        MinuteCount::new(3).unwrap(),
        None,
        Utc::now(),
    );
    let folded = adapter.insert_day(&late).await.unwrap();
    assert_eq!(folded.id, opened.recording.id);
    assert_eq!((folded.pages, folded.minutes), (12, 13));
    assert_eq!(folded.notes.as_ref().map(Notes::as_str), Some("first"));

    let fresh = Recording::new(
        ub.id,
        "2024-04-02".parse().unwrap(),
        PageCount::new(1).unwrap(),
        MinuteCount::new(1).unwrap(),
        None,
        Utc::now(),
    );
    assert_eq!(adapter.insert_day(&fresh).await.unwrap().id, fresh.id);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn recordings_load_and_delete_by_id_on_postgres() {
    let (adapter, service, book_id) = setup(300).await;
    let ub = service.start_tracking(UserId::new(), book_id).await.unwrap();
    let outcome = service
        .record_reading(ub.id, session("2024-05-01", 5, 5, None))
        .await
        .unwrap();
    let id = outcome.recording.id;

    let loaded = RecordingRepository::find_by_id(adapter.as_ref(), id)
        .await
        .unwrap();
    assert_eq!(loaded.map(|r| r.pages), Some(5));

    RecordingRepository::delete(adapter.as_ref(), id).await.unwrap();
    assert!(matches!(
        RecordingRepository::delete(adapter.as_ref(), id).await,
        Err(PortError::NotFound(_))
    ));
    assert!(matches!(
        RecordingRepository::delete(adapter.as_ref(), RecordingId::new()).await,
        Err(PortError::NotFound(_))
    ));

    service.stop_tracking(ub.id).await.unwrap();
    assert!(UserBookRepository::find_by_id(adapter.as_ref(), ub.id)
        .await
        .unwrap()
        .is_none());
}
