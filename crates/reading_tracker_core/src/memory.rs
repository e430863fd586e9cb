//! crates/reading_tracker_core/src/memory.rs
//!
//! An in-process store that implements every repository port, and the
//! translation of a `QueryPlan` into in-memory predicates and orderings.
//!
//! The store deliberately has no uniqueness on `(user_book_id, date)` for
//! recordings: concurrent sessions for the same day can both create a row, exactly
//! as the aggregation engine allows. `(user_id, book_id)` is unique for user books.

use crate::domain::{Book, Recording, UserBook};
use crate::ports::{
    BookRepository, PortError, PortResult, RecordingRepository, UserBookRepository,
};
use crate::query::{Comparison, Condition, Connective, Query, QueryPlan, Queryable, Scalar, SortOrder, TextMatch};
use crate::values::{BookId, RecordingId, UserBookId};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use tokio::sync::RwLock;

//=========================================================================================
// Query Translation
//=========================================================================================

/// A `QueryPlan` translated into Rust predicates over `Queryable` rows.
///
/// Pure: the same plan always selects, orders and pages rows the same way.
#[derive(Debug, Clone)]
pub struct MemorySelection {
    plan: QueryPlan,
}

impl MemorySelection {
    pub fn translate(plan: QueryPlan) -> Self {
        Self { plan }
    }

    pub fn matches<E: Queryable>(&self, row: &E) -> bool {
        if !self.plan.scope.iter().all(|c| evaluate(c, row)) {
            return false;
        }
        if self.plan.conditions.is_empty() {
            return true;
        }
        match self.plan.connective {
            Connective::And => self.plan.conditions.iter().all(|c| evaluate(c, row)),
            Connective::Or => self.plan.conditions.iter().any(|c| evaluate(c, row)),
        }
    }

    /// Orders by the sort field, nulls last in ascending order, then by id.
    pub fn compare<E: Queryable>(&self, a: &E, b: &E) -> Ordering {
        let name = self.plan.sort_field.name;
        let by_field = match (a.field_value(name), b.field_value(name)) {
            (Some(x), Some(y)) => x.compare(&y).unwrap_or(Ordering::Equal),
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        let ordering = by_field.then_with(|| a.id_value().cmp(&b.id_value()));
        match self.plan.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }

    /// Filters, sorts and pages `rows`.
    pub fn apply<'a, E, I>(&self, rows: I) -> Vec<E>
    where
        E: Queryable + Clone + 'a,
        I: IntoIterator<Item = &'a E>,
    {
        let mut selected: Vec<&E> = rows.into_iter().filter(|r| self.matches(*r)).collect();
        selected.sort_by(|a, b| self.compare(*a, *b));
        selected
            .into_iter()
            .skip(self.plan.offset as usize)
            .take(self.plan.limit as usize)
            .cloned()
            .collect()
    }
}

fn evaluate<E: Queryable>(condition: &Condition, row: &E) -> bool {
    match condition {
        Condition::Compare { field, op, value } => {
            let Some(ordering) = row.field_value(field.name).and_then(|v| v.compare(value)) else {
                return false;
            };
            match op {
                Comparison::Eq => ordering == Ordering::Equal,
                Comparison::Ne => ordering != Ordering::Equal,
                Comparison::Lt => ordering == Ordering::Less,
                Comparison::Le => ordering != Ordering::Greater,
                Comparison::Gt => ordering == Ordering::Greater,
                Comparison::Ge => ordering != Ordering::Less,
            }
        }
        Condition::AnyOf {
            field,
            negated,
            values,
        } => match row.field_value(field.name) {
            Some(v) => {
                let hit = values
                    .iter()
                    .any(|candidate| v.compare(candidate) == Some(Ordering::Equal));
                hit != *negated
            }
            None => false,
        },
        Condition::Matches {
            field,
            mode,
            needle,
        } => match row.field_value(field.name) {
            Some(Scalar::Text(haystack)) => {
                let haystack = haystack.to_lowercase();
                let needle = needle.to_lowercase();
                match mode {
                    TextMatch::Contains => haystack.contains(&needle),
                    TextMatch::StartsWith => haystack.starts_with(&needle),
                    TextMatch::EndsWith => haystack.ends_with(&needle),
                }
            }
            _ => false,
        },
        Condition::Between {
            field,
            lower,
            upper,
        } => match row.field_value(field.name) {
            Some(v) => {
                matches!(v.compare(lower), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(v.compare(upper), Some(Ordering::Less | Ordering::Equal))
            }
            None => false,
        },
        Condition::IsNull { field, negated } => row.field_value(field.name).is_none() != *negated,
    }
}

fn select<'a, E, I>(query: &Query, rows: I) -> PortResult<Vec<E>>
where
    E: Queryable + Clone + 'a,
    I: IntoIterator<Item = &'a E>,
{
    let plan = QueryPlan::for_entity::<E>(query)?;
    Ok(MemorySelection::translate(plan).apply(rows))
}

//=========================================================================================
// The Store
//=========================================================================================

#[derive(Default)]
pub struct MemoryStore {
    books: RwLock<HashMap<BookId, Book>>,
    user_books: RwLock<HashMap<UserBookId, UserBook>>,
    recordings: RwLock<HashMap<RecordingId, Recording>>,
    fail_recording_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Books are read-only through the ports; this seeds the catalogue.
    pub async fn insert_book(&self, book: Book) {
        self.books.write().await.insert(book.id, book);
    }

    /// Makes every subsequent recording save fail until switched off again.
    pub fn fail_recording_saves(&self, fail: bool) {
        self.fail_recording_saves.store(fail, AtomicOrdering::SeqCst);
    }
}

#[async_trait]
impl BookRepository for MemoryStore {
    async fn find_by_id(&self, id: BookId) -> PortResult<Option<Book>> {
        Ok(self.books.read().await.get(&id).cloned())
    }

    async fn find(&self, query: &Query) -> PortResult<Vec<Book>> {
        select(query, self.books.read().await.values())
    }
}

#[async_trait]
impl UserBookRepository for MemoryStore {
    async fn find_by_id(&self, id: UserBookId) -> PortResult<Option<UserBook>> {
        Ok(self.user_books.read().await.get(&id).cloned())
    }

    async fn find(&self, query: &Query) -> PortResult<Vec<UserBook>> {
        select(query, self.user_books.read().await.values())
    }

    async fn save(&self, user_book: &UserBook) -> PortResult<()> {
        let mut rows = self.user_books.write().await;
        let duplicate = rows.values().any(|existing| {
            existing.id != user_book.id
                && existing.user_id == user_book.user_id
                && existing.book_id == user_book.book_id
        });
        if duplicate {
            return Err(PortError::Conflict(format!(
                "User {} already tracks book {}",
                user_book.user_id, user_book.book_id
            )));
        }
        rows.insert(user_book.id, user_book.clone());
        Ok(())
    }

    async fn delete(&self, id: UserBookId) -> PortResult<()> {
        match self.user_books.write().await.remove(&id) {
            Some(_) => Ok(()),
            None => Err(PortError::NotFound(format!("UserBook {} not found", id))),
        }
    }
}

#[async_trait]
impl RecordingRepository for MemoryStore {
    async fn find_by_id(&self, id: RecordingId) -> PortResult<Option<Recording>> {
        Ok(self.recordings.read().await.get(&id).cloned())
    }

    async fn find(&self, query: &Query) -> PortResult<Vec<Recording>> {
        select(query, self.recordings.read().await.values())
    }

    async fn find_all_by_user_book(&self, user_book_id: UserBookId) -> PortResult<Vec<Recording>> {
        let mut log: Vec<Recording> = self
            .recordings
            .read()
            .await
            .values()
            .filter(|r| r.user_book_id == user_book_id)
            .cloned()
            .collect();
        log.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.created_at.cmp(&b.created_at)));
        Ok(log)
    }

    async fn save(&self, recording: &Recording) -> PortResult<()> {
        if self.fail_recording_saves.load(AtomicOrdering::SeqCst) {
            return Err(PortError::Unexpected(format!(
                "Write of recording {} failed",
                recording.id
            )));
        }
        self.recordings
            .write()
            .await
            .insert(recording.id, recording.clone());
        Ok(())
    }

    async fn delete(&self, id: RecordingId) -> PortResult<()> {
        match self.recordings.write().await.remove(&id) {
            Some(_) => Ok(()),
            None => Err(PortError::NotFound(format!("Recording {} not found", id))),
        }
    }

    async fn delete_by_user_book(&self, user_book_id: UserBookId) -> PortResult<u64> {
        let mut rows = self.recordings.write().await;
        let before = rows.len();
        rows.retain(|_, r| r.user_book_id != user_book_id);
        Ok((before - rows.len()) as u64)
    }
}
