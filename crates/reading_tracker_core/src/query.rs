//! crates/reading_tracker_core/src/query.rs
//!
//! A persistence-agnostic description of selection, sort order and pagination,
//! and its validation into a typed [`QueryPlan`].
//!
//! A `Query` is what callers send: field names are plain strings and filter values
//! are raw JSON. `QueryPlan::build` checks every field against the entity's
//! allowlist, coerces every value to the field's type and rejects malformed
//! operator/value combinations. Store adapters only ever translate a `QueryPlan`,
//! so they never see an unknown field or an ill-shaped value.

use crate::domain::{Book, ReadingStatus, Recording, UserBook};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;
pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_SORT_FIELD: &str = "createdAt";

/// Errors raised while turning a `Query` into a `QueryPlan`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("unknown filter operator '{0}'")]
    UnknownOperator(String),
    #[error("operator {operator} cannot be applied to field '{field}'")]
    UnsupportedOperator {
        field: String,
        operator: FilterOperator,
    },
    #[error("invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("BETWEEN on field '{field}' requires exactly two values [lower, upper]")]
    MalformedBetween { field: String },
    #[error("{operator} on field '{field}' requires a non-empty array")]
    EmptyList {
        field: String,
        operator: FilterOperator,
    },
    #[error("invalid pagination: {0}")]
    InvalidPagination(String),
}

//=========================================================================================
// The Query Description
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    In,
    NotIn,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Contains,
    StartsWith,
    EndsWith,
    Between,
}

impl FilterOperator {
    pub const fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "EQUALS",
            FilterOperator::NotEquals => "NOT_EQUALS",
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT_IN",
            FilterOperator::LessThan => "LESS_THAN",
            FilterOperator::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            FilterOperator::GreaterThan => "GREATER_THAN",
            FilterOperator::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
            FilterOperator::Contains => "CONTAINS",
            FilterOperator::StartsWith => "STARTS_WITH",
            FilterOperator::EndsWith => "ENDS_WITH",
            FilterOperator::Between => "BETWEEN",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s {
            "EQUALS" => FilterOperator::Equals,
            "NOT_EQUALS" => FilterOperator::NotEquals,
            "IN" => FilterOperator::In,
            "NOT_IN" => FilterOperator::NotIn,
            "LESS_THAN" => FilterOperator::LessThan,
            "LESS_THAN_OR_EQUAL" => FilterOperator::LessThanOrEqual,
            "GREATER_THAN" => FilterOperator::GreaterThan,
            "GREATER_THAN_OR_EQUAL" => FilterOperator::GreaterThanOrEqual,
            "CONTAINS" => FilterOperator::Contains,
            "STARTS_WITH" => FilterOperator::StartsWith,
            "ENDS_WITH" => FilterOperator::EndsWith,
            "BETWEEN" => FilterOperator::Between,
            other => return Err(QueryError::UnknownOperator(other.to_string())),
        };
        Ok(op)
    }
}

/// How the filters of one query are combined. There is no nested grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "UPPERCASE")]
pub enum Connective {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[serde(alias = "ASC")]
    Asc,
    #[default]
    #[serde(alias = "DESC")]
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

fn default_sort_field() -> String {
    DEFAULT_SORT_FIELD.to_string()
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

fn default_page() -> u64 {
    DEFAULT_PAGE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub connective: Connective,
    #[serde(default = "default_sort_field")]
    pub sort_field: String,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default = "default_page")]
    pub page: u64,
    /// Conditions that are always ANDed with the filter group, whatever its
    /// connective. Set by services to confine a listing; never deserialized.
    #[serde(skip)]
    pub scope: Vec<Filter>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            connective: Connective::default(),
            sort_field: default_sort_field(),
            sort_order: SortOrder::default(),
            limit: DEFAULT_LIMIT,
            page: DEFAULT_PAGE,
            scope: Vec::new(),
        }
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn connective(mut self, connective: Connective) -> Self {
        self.connective = connective;
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_field = field.into();
        self.sort_order = order;
        self
    }

    pub fn paginate(mut self, limit: u64, page: u64) -> Self {
        self.limit = limit;
        self.page = page;
        self
    }

    /// Confines the query to rows where `field` equals `value`.
    pub fn scoped_to(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.scope
            .push(Filter::new(field, FilterOperator::Equals, value));
        self
    }
}

//=========================================================================================
// Field Allowlists
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Id,
    Text,
    Integer,
    Date,
    Timestamp,
    Status,
}

/// One queryable attribute of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
        }
    }
}

/// An entity that can be selected through a `Query`.
pub trait Queryable {
    /// The fixed set of fields filters and sorting may refer to.
    const FIELDS: &'static [FieldSpec];

    /// The current value of an allowlisted field; `None` when it is null.
    fn field_value(&self, field: &str) -> Option<Scalar>;

    fn id_value(&self) -> Uuid;
}

/// A typed filter value, already coerced to its field's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Id(Uuid),
    Text(String),
    Integer(i64),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl Scalar {
    /// Orders two scalars of the same variant; `None` across variants.
    pub fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Id(a), Scalar::Id(b)) => Some(a.cmp(b)),
            (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
            (Scalar::Integer(a), Scalar::Integer(b)) => Some(a.cmp(b)),
            (Scalar::Date(a), Scalar::Date(b)) => Some(a.cmp(b)),
            (Scalar::Timestamp(a), Scalar::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl Queryable for Book {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("id", FieldKind::Id),
        FieldSpec::required("title", FieldKind::Text),
        FieldSpec::optional("author", FieldKind::Text),
        FieldSpec::optional("description", FieldKind::Text),
        FieldSpec::required("pageCount", FieldKind::Integer),
        FieldSpec::optional("isbn10", FieldKind::Text),
        FieldSpec::optional("isbn13", FieldKind::Text),
        FieldSpec::required("ownerId", FieldKind::Id),
        FieldSpec::required("createdAt", FieldKind::Timestamp),
        FieldSpec::required("updatedAt", FieldKind::Timestamp),
    ];

    fn field_value(&self, field: &str) -> Option<Scalar> {
        match field {
            "id" => Some(Scalar::Id(self.id.as_uuid())),
            "title" => Some(Scalar::Text(self.title.as_str().to_string())),
            "author" => self.author.clone().map(Scalar::Text),
            "description" => self.description.clone().map(Scalar::Text),
            "pageCount" => Some(Scalar::Integer(i64::from(self.page_count.get()))),
            "isbn10" => self.isbn10.as_ref().map(|i| Scalar::Text(i.as_str().to_string())),
            "isbn13" => self.isbn13.as_ref().map(|i| Scalar::Text(i.as_str().to_string())),
            "ownerId" => Some(Scalar::Id(self.owner_id.as_uuid())),
            "createdAt" => Some(Scalar::Timestamp(self.created_at)),
            "updatedAt" => Some(Scalar::Timestamp(self.updated_at)),
            _ => None,
        }
    }

    fn id_value(&self) -> Uuid {
        self.id.as_uuid()
    }
}

impl Queryable for UserBook {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("id", FieldKind::Id),
        FieldSpec::required("userId", FieldKind::Id),
        FieldSpec::required("bookId", FieldKind::Id),
        FieldSpec::required("readingStatus", FieldKind::Status),
        FieldSpec::required("currentPage", FieldKind::Integer),
        FieldSpec::optional("startDate", FieldKind::Date),
        FieldSpec::optional("completedDate", FieldKind::Date),
        FieldSpec::required("totalMinutes", FieldKind::Integer),
        FieldSpec::required("totalDays", FieldKind::Integer),
        FieldSpec::required("createdAt", FieldKind::Timestamp),
        FieldSpec::required("updatedAt", FieldKind::Timestamp),
    ];

    fn field_value(&self, field: &str) -> Option<Scalar> {
        match field {
            "id" => Some(Scalar::Id(self.id.as_uuid())),
            "userId" => Some(Scalar::Id(self.user_id.as_uuid())),
            "bookId" => Some(Scalar::Id(self.book_id.as_uuid())),
            "readingStatus" => Some(Scalar::Text(self.reading_status.as_str().to_string())),
            "currentPage" => Some(Scalar::Integer(i64::from(self.current_page))),
            "startDate" => self.start_date.map(|d| Scalar::Date(d.as_date())),
            "completedDate" => self.completed_date.map(|d| Scalar::Date(d.as_date())),
            "totalMinutes" => Some(Scalar::Integer(i64::from(self.total_minutes))),
            "totalDays" => Some(Scalar::Integer(i64::from(self.total_days))),
            "createdAt" => Some(Scalar::Timestamp(self.created_at)),
            "updatedAt" => Some(Scalar::Timestamp(self.updated_at)),
            _ => None,
        }
    }

    fn id_value(&self) -> Uuid {
        self.id.as_uuid()
    }
}

impl Queryable for Recording {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("id", FieldKind::Id),
        FieldSpec::required("userBookId", FieldKind::Id),
        FieldSpec::required("date", FieldKind::Date),
        FieldSpec::required("pages", FieldKind::Integer),
        FieldSpec::required("minutes", FieldKind::Integer),
        FieldSpec::optional("notes", FieldKind::Text),
        FieldSpec::required("createdAt", FieldKind::Timestamp),
        FieldSpec::required("updatedAt", FieldKind::Timestamp),
    ];

    fn field_value(&self, field: &str) -> Option<Scalar> {
        match field {
            "id" => Some(Scalar::Id(self.id.as_uuid())),
            "userBookId" => Some(Scalar::Id(self.user_book_id.as_uuid())),
            "date" => Some(Scalar::Date(self.date.as_date())),
            "pages" => Some(Scalar::Integer(i64::from(self.pages))),
            "minutes" => Some(Scalar::Integer(i64::from(self.minutes))),
            "notes" => self.notes.as_ref().map(|n| Scalar::Text(n.as_str().to_string())),
            "createdAt" => Some(Scalar::Timestamp(self.created_at)),
            "updatedAt" => Some(Scalar::Timestamp(self.updated_at)),
            _ => None,
        }
    }

    fn id_value(&self) -> Uuid {
        self.id.as_uuid()
    }
}

//=========================================================================================
// The Validated Plan
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    Contains,
    StartsWith,
    EndsWith,
}

/// One validated, typed filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        field: FieldSpec,
        op: Comparison,
        value: Scalar,
    },
    /// `IN` when `negated` is false, `NOT IN` otherwise.
    AnyOf {
        field: FieldSpec,
        negated: bool,
        values: Vec<Scalar>,
    },
    /// Case-insensitive substring, prefix or suffix match.
    Matches {
        field: FieldSpec,
        mode: TextMatch,
        needle: String,
    },
    /// Inclusive on both ends.
    Between {
        field: FieldSpec,
        lower: Scalar,
        upper: Scalar,
    },
    IsNull {
        field: FieldSpec,
        negated: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// Always ANDed, and ANDed with the filter group.
    pub scope: Vec<Condition>,
    pub conditions: Vec<Condition>,
    pub connective: Connective,
    pub sort_field: FieldSpec,
    pub sort_order: SortOrder,
    pub offset: u64,
    pub limit: u64,
}

impl QueryPlan {
    /// Validates `query` against the allowlist of `E`.
    pub fn for_entity<E: Queryable>(query: &Query) -> Result<Self, QueryError> {
        Self::build(query, E::FIELDS)
    }

    pub fn build(query: &Query, fields: &'static [FieldSpec]) -> Result<Self, QueryError> {
        if query.limit == 0 || query.limit > MAX_LIMIT {
            return Err(QueryError::InvalidPagination(format!(
                "limit must be between 1 and {MAX_LIMIT}, got {}",
                query.limit
            )));
        }
        if query.page == 0 {
            return Err(QueryError::InvalidPagination(
                "page must be at least 1".to_string(),
            ));
        }
        let offset = (query.page - 1).checked_mul(query.limit).ok_or_else(|| {
            QueryError::InvalidPagination(format!("page {} is out of range", query.page))
        })?;

        let scope = query
            .scope
            .iter()
            .map(|f| plan_filter(f, fields))
            .collect::<Result<Vec<_>, _>>()?;
        let conditions = query
            .filters
            .iter()
            .map(|f| plan_filter(f, fields))
            .collect::<Result<Vec<_>, _>>()?;
        let sort_field = lookup(fields, &query.sort_field)?;

        Ok(Self {
            scope,
            conditions,
            connective: query.connective,
            sort_field,
            sort_order: query.sort_order,
            offset,
            limit: query.limit,
        })
    }
}

fn lookup(fields: &[FieldSpec], name: &str) -> Result<FieldSpec, QueryError> {
    fields
        .iter()
        .find(|f| f.name == name)
        .copied()
        .ok_or_else(|| QueryError::UnknownField(name.to_string()))
}

fn plan_filter(filter: &Filter, fields: &[FieldSpec]) -> Result<Condition, QueryError> {
    let field = lookup(fields, &filter.field)?;
    let unsupported = || QueryError::UnsupportedOperator {
        field: field.name.to_string(),
        operator: filter.operator,
    };
    let orderable = !matches!(field.kind, FieldKind::Id | FieldKind::Status);

    match filter.operator {
        FilterOperator::Equals | FilterOperator::NotEquals => {
            let negated = filter.operator == FilterOperator::NotEquals;
            if filter.value.is_null() {
                if !field.nullable {
                    return Err(invalid(&field, "null is only allowed on optional fields"));
                }
                return Ok(Condition::IsNull { field, negated });
            }
            let op = if negated { Comparison::Ne } else { Comparison::Eq };
            Ok(Condition::Compare {
                value: coerce(&field, &filter.value)?,
                field,
                op,
            })
        }
        FilterOperator::In | FilterOperator::NotIn => {
            let items = match &filter.value {
                Value::Array(items) => items,
                _ => return Err(invalid(&field, "expected an array")),
            };
            if items.is_empty() {
                return Err(QueryError::EmptyList {
                    field: field.name.to_string(),
                    operator: filter.operator,
                });
            }
            let values = items
                .iter()
                .map(|v| coerce(&field, v))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Condition::AnyOf {
                field,
                negated: filter.operator == FilterOperator::NotIn,
                values,
            })
        }
        FilterOperator::LessThan
        | FilterOperator::LessThanOrEqual
        | FilterOperator::GreaterThan
        | FilterOperator::GreaterThanOrEqual => {
            if !orderable {
                return Err(unsupported());
            }
            let op = match filter.operator {
                FilterOperator::LessThan => Comparison::Lt,
                FilterOperator::LessThanOrEqual => Comparison::Le,
                FilterOperator::GreaterThan => Comparison::Gt,
                _ => Comparison::Ge,
            };
            Ok(Condition::Compare {
                value: coerce(&field, &filter.value)?,
                field,
                op,
            })
        }
        FilterOperator::Contains | FilterOperator::StartsWith | FilterOperator::EndsWith => {
            if field.kind != FieldKind::Text {
                return Err(unsupported());
            }
            let needle = match &filter.value {
                Value::String(s) => s.clone(),
                _ => return Err(invalid(&field, "expected a string")),
            };
            let mode = match filter.operator {
                FilterOperator::Contains => TextMatch::Contains,
                FilterOperator::StartsWith => TextMatch::StartsWith,
                _ => TextMatch::EndsWith,
            };
            Ok(Condition::Matches {
                field,
                mode,
                needle,
            })
        }
        FilterOperator::Between => {
            if !orderable {
                return Err(unsupported());
            }
            let (lower, upper) = match &filter.value {
                Value::Array(items) if items.len() == 2 => {
                    (coerce(&field, &items[0])?, coerce(&field, &items[1])?)
                }
                _ => {
                    return Err(QueryError::MalformedBetween {
                        field: field.name.to_string(),
                    })
                }
            };
            if lower.compare(&upper) == Some(Ordering::Greater) {
                return Err(invalid(&field, "BETWEEN lower bound exceeds upper bound"));
            }
            Ok(Condition::Between {
                field,
                lower,
                upper,
            })
        }
    }
}

fn invalid(field: &FieldSpec, reason: impl Into<String>) -> QueryError {
    QueryError::InvalidValue {
        field: field.name.to_string(),
        reason: reason.into(),
    }
}

/// Converts a raw JSON value to the scalar type of `field`.
fn coerce(field: &FieldSpec, value: &Value) -> Result<Scalar, QueryError> {
    match (field.kind, value) {
        (FieldKind::Id, Value::String(s)) => Uuid::parse_str(s)
            .map(Scalar::Id)
            .map_err(|_| invalid(field, format!("'{s}' is not a UUID"))),
        (FieldKind::Text, Value::String(s)) => Ok(Scalar::Text(s.clone())),
        (FieldKind::Status, Value::String(s)) => s
            .parse::<ReadingStatus>()
            .map(|status| Scalar::Text(status.as_str().to_string()))
            .map_err(|e| invalid(field, e.to_string())),
        (FieldKind::Integer, Value::Number(n)) => n
            .as_i64()
            .map(Scalar::Integer)
            .ok_or_else(|| invalid(field, format!("{n} is not an integer"))),
        (FieldKind::Date, Value::String(s)) => s
            .parse::<crate::values::ReadingDate>()
            .map(|d| Scalar::Date(d.as_date()))
            .map_err(|e| invalid(field, e.to_string())),
        (FieldKind::Timestamp, Value::String(s)) => parse_timestamp(s)
            .map(Scalar::Timestamp)
            .ok_or_else(|| invalid(field, format!("'{s}' is not an RFC 3339 timestamp or date"))),
        (kind, other) => Err(invalid(
            field,
            format!("{other} does not match field type {kind:?}"),
        )),
    }
}

/// RFC 3339, or a bare `YYYY-MM-DD` meaning midnight UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}
