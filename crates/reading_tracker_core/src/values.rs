//! crates/reading_tracker_core/src/values.rs
//!
//! Self-validating value objects. Every constructor rejects malformed input, so
//! code holding one of these types never has to re-check its bounds.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Errors raised while constructing a value object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("{kind} is not a well-formed UUID: '{value}'")]
    MalformedId { kind: &'static str, value: String },
    #[error("page count {0} is outside the range [1, 3000]")]
    PageCountOutOfRange(i64),
    #[error("minute count {0} is outside the range [1, 1440]")]
    MinuteCountOutOfRange(i64),
    #[error("'{0}' is not a calendar date (expected YYYY-MM-DD)")]
    MalformedDate(String),
    #[error("notes exceed 2000 characters")]
    NotesTooLong,
    #[error("title must be between 1 and 255 characters")]
    InvalidTitle,
    #[error("'{0}' is not a valid ISBN-10 or ISBN-13")]
    InvalidIsbn(String),
}

//=========================================================================================
// Identifiers
//=========================================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl FromStr for $name {
            type Err = ValueError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| ValueError::MalformedId {
                        kind: $label,
                        value: s.to_string(),
                    })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifies a user of the tracker.
    UserId,
    "user id"
);
uuid_id!(
    /// Identifies a book in the catalogue.
    BookId,
    "book id"
);
uuid_id!(
    /// Identifies one user's tracking of one book.
    UserBookId,
    "user book id"
);
uuid_id!(RecordingId, "recording id");

//=========================================================================================
// Counts
//=========================================================================================

/// Number of pages read in a single session, or a book's total page count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PageCount(u32);

impl PageCount {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 3000;

    pub fn new(value: i64) -> Result<Self, ValueError> {
        if value < i64::from(Self::MIN) || value > i64::from(Self::MAX) {
            return Err(ValueError::PageCountOutOfRange(value));
        }
        Ok(Self(value as u32))
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Minutes spent in a single session. Capped at one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MinuteCount(u32);

impl MinuteCount {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 24 * 60;

    pub fn new(value: i64) -> Result<Self, ValueError> {
        if value < i64::from(Self::MIN) || value > i64::from(Self::MAX) {
            return Err(ValueError::MinuteCountOutOfRange(value));
        }
        Ok(Self(value as u32))
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

//=========================================================================================
// ReadingDate
//=========================================================================================

/// The day-granularity key recordings are merged on.
///
/// All conversions from a point in time go through [`ReadingDate::from_timestamp`],
/// which truncates to the UTC calendar date. Two sessions logged on the same UTC
/// day therefore always share a key, whatever their time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ReadingDate(NaiveDate);

impl ReadingDate {
    pub const fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self(at.date_naive())
    }

    pub const fn as_date(&self) -> NaiveDate {
        self.0
    }
}

impl FromStr for ReadingDate {
    type Err = ValueError;

    /// Accepts `YYYY-MM-DD`, or an RFC 3339 timestamp which is normalised to its
    /// UTC calendar date.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Self(date));
        }
        DateTime::parse_from_rfc3339(s)
            .map(|at| Self::from_timestamp(at.with_timezone(&Utc)))
            .map_err(|_| ValueError::MalformedDate(s.to_string()))
    }
}

impl fmt::Display for ReadingDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

//=========================================================================================
// Text values
//=========================================================================================

/// Free-form notes attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Notes(String);

impl Notes {
    pub const MAX_CHARS: usize = 2000;

    /// Blank input yields `Ok(None)`: an empty note is the same as no note.
    pub fn parse(raw: &str) -> Result<Option<Self>, ValueError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if trimmed.chars().count() > Self::MAX_CHARS {
            return Err(ValueError::NotesTooLong);
        }
        Ok(Some(Self(trimmed.to_string())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// A book title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Title(String);

impl Title {
    pub const MAX_CHARS: usize = 255;

    pub fn new(raw: &str) -> Result<Self, ValueError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().count() > Self::MAX_CHARS {
            return Err(ValueError::InvalidTitle);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An ISBN-10 or ISBN-13, stored as bare digits (ISBN-10 may end in `X`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Isbn(String);

impl Isbn {
    pub fn parse(raw: &str) -> Result<Self, ValueError> {
        let compact: String = raw
            .chars()
            .filter(|c| !matches!(c, '-' | ' '))
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let valid = match compact.len() {
            10 => isbn10_checksum_ok(&compact),
            13 => isbn13_checksum_ok(&compact),
            _ => false,
        };
        if !valid {
            return Err(ValueError::InvalidIsbn(raw.to_string()));
        }
        Ok(Self(compact))
    }

    pub fn is_isbn13(&self) -> bool {
        self.0.len() == 13
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn isbn10_checksum_ok(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in digits.chars().enumerate() {
        let value = match (i, c) {
            (9, 'X') => 10,
            (_, d) => match d.to_digit(10) {
                Some(v) => v,
                None => return false,
            },
        };
        sum += value * (10 - i as u32);
    }
    sum % 11 == 0
}

fn isbn13_checksum_ok(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in digits.chars().enumerate() {
        let Some(v) = c.to_digit(10) else {
            return false;
        };
        sum += if i % 2 == 0 { v } else { v * 3 };
    }
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ids_parse_and_compare_by_value() {
        let raw = "4f1c2a7e-9d1b-4b8e-8a53-2d0c0a5f6e11";
        let a: UserBookId = raw.parse().unwrap();
        let b: UserBookId = raw.parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), raw);
    }

    #[test]
    fn malformed_id_is_rejected() {
        let err = "not-a-uuid".parse::<BookId>().unwrap_err();
        assert!(matches!(err, ValueError::MalformedId { kind: "book id", .. }));
    }

    #[test]
    fn page_count_bounds() {
        assert!(PageCount::new(0).is_err());
        assert_eq!(PageCount::new(1).unwrap().get(), 1);
        assert_eq!(PageCount::new(3000).unwrap().get(), 3000);
        assert_eq!(
            PageCount::new(3001).unwrap_err(),
            ValueError::PageCountOutOfRange(3001)
        );
    }

    #[test]
    fn minute_count_bounds() {
        assert!(MinuteCount::new(-5).is_err());
        assert!(MinuteCount::new(1440).is_ok());
        assert!(MinuteCount::new(1441).is_err());
    }

    #[test]
    fn timestamps_on_the_same_utc_day_share_a_key() {
        let morning = Utc.with_ymd_and_hms(2024, 1, 1, 6, 15, 0).unwrap();
        let night = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap();
        assert_eq!(
            ReadingDate::from_timestamp(morning),
            ReadingDate::from_timestamp(night)
        );

        let next = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert_ne!(
            ReadingDate::from_timestamp(night),
            ReadingDate::from_timestamp(next)
        );
    }

    #[test]
    fn reading_date_parses_plain_dates_and_timestamps() {
        let plain: ReadingDate = "2024-01-01".parse().unwrap();
        let stamped: ReadingDate = "2024-01-01T18:30:00Z".parse().unwrap();
        assert_eq!(plain, stamped);

        // 23:30 at UTC-05:00 is already the next day in UTC.
        let offset: ReadingDate = "2024-01-01T23:30:00-05:00".parse().unwrap();
        assert_eq!(offset.to_string(), "2024-01-02");

        assert!("01/02/2024".parse::<ReadingDate>().is_err());
    }

    #[test]
    fn blank_notes_are_absent() {
        assert_eq!(Notes::parse("   ").unwrap(), None);
        assert_eq!(Notes::parse(" ch. 3 ").unwrap().unwrap().as_str(), "ch. 3");
        assert_eq!(
            Notes::parse(&"x".repeat(Notes::MAX_CHARS + 1)).unwrap_err(),
            ValueError::NotesTooLong
        );
    }

    #[test]
    fn isbn_checksums() {
        assert!(Isbn::parse("0-306-40615-2").is_ok());
        assert!(Isbn::parse("080442957X").is_ok());
        assert!(Isbn::parse("978-0-306-40615-7").unwrap().is_isbn13());
        assert!(Isbn::parse("978-0-306-40615-8").is_err());
        assert!(Isbn::parse("12345").is_err());
    }

    #[test]
    fn title_rejects_blank() {
        assert!(Title::new("  ").is_err());
        assert_eq!(Title::new(" Dune ").unwrap().as_str(), "Dune");
    }
}
