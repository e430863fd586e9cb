use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use proptest::prelude::*;

use reading_tracker_core::{
    values::Title, Book, BookId, MemoryStore, MinuteCount, PageCount, ReadingDate, ReadingService,
    ReadingSession, ReadingStatus, RecordingRepository, UserId,
};

#[derive(Debug, Clone)]
struct Session {
    day: u8,
    pages: u16,
    minutes: u16,
}

fn session_strategy() -> impl Strategy<Value = Session> {
    (0u8..10, 1u16..80, 1u16..120).prop_map(|(day, pages, minutes)| Session {
        day,
        pages,
        minutes,
    })
}

fn date_for(day: u8) -> ReadingDate {
    let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    ReadingDate::from_date(base + Duration::days(i64::from(day)))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn summary_matches_the_recording_log(
        sessions in prop::collection::vec(session_strategy(), 1..40),
        page_count in 50i64..600,
    ) {
        runtime().block_on(async {
            let store = Arc::new(MemoryStore::new());
            let service = ReadingService::new(store.clone(), store.clone(), store.clone());
            let now = Utc::now();
            let book = Book {
                id: BookId::new(),
                title: Title::new("Invariant Reading").unwrap(),
                author: None,
                description: None,
                page_count: PageCount::new(page_count).unwrap(),
                isbn10: None,
                isbn13: None,
                cover_url: None,
                owner_id: UserId::new(),
                created_at: now,
                updated_at: now,
            };
            let book_id = book.id;
            store.insert_book(book).await;
            let ub = service.start_tracking(UserId::new(), book_id).await.unwrap();

            let mut expected_days: BTreeMap<u8, (u32, u32)> = BTreeMap::new();
            let mut completed_on = None;
            let mut running = 0u32;
            for s in &sessions {
                service
                    .record_reading(ub.id, ReadingSession {
                        date: date_for(s.day),
                        pages: PageCount::new(i64::from(s.pages)).unwrap(),
                        minutes: MinuteCount::new(i64::from(s.minutes)).unwrap(),
                        notes: None,
                    })
                    .await
                    .unwrap();
                let entry = expected_days.entry(s.day).or_default();
                entry.0 += u32::from(s.pages);
                entry.1 += u32::from(s.minutes);
                running += u32::from(s.pages);
                if completed_on.is_none() && running >= page_count as u32 {
                    completed_on = Some(date_for(s.day));
                }
            }

            let summary = service.get_user_book(ub.id).await.unwrap();
            let log = store.find_all_by_user_book(ub.id).await.unwrap();

            // One row per distinct day, and totalDays counts exactly those days.
            let distinct: BTreeSet<ReadingDate> = log.iter().map(|r| r.date).collect();
            prop_assert_eq!(log.len(), distinct.len());
            prop_assert_eq!(summary.total_days as usize, distinct.len());
            prop_assert_eq!(distinct.len(), expected_days.len());

            for r in &log {
                let day = expected_days
                    .iter()
                    .find(|(d, _)| date_for(**d) == r.date)
                    .map(|(_, totals)| *totals);
                prop_assert_eq!(day, Some((r.pages, r.minutes)));
            }

            prop_assert_eq!(summary.current_page, running);
            prop_assert_eq!(
                summary.total_minutes,
                expected_days.values().map(|(_, m)| m).sum::<u32>()
            );
            prop_assert_eq!(summary.completed_date, completed_on);
            prop_assert_eq!(
                summary.reading_status == ReadingStatus::Completed,
                completed_on.is_some()
            );

            // Re-deriving a consistent summary changes nothing.
            let reconciled = service.reconcile_progress(ub.id).await.unwrap();
            prop_assert_eq!(reconciled.current_page, summary.current_page);
            prop_assert_eq!(reconciled.total_minutes, summary.total_minutes);
            prop_assert_eq!(reconciled.total_days, summary.total_days);
            prop_assert_eq!(reconciled.reading_status, summary.reading_status);
            Ok(())
        })?;
    }
}
