//! services/api/src/adapters/sql_query.rs
//!
//! Translates a validated `QueryPlan` into PostgreSQL: a `WHERE` predicate with
//! `$n` placeholders, its bind values, an `ORDER BY` clause, `LIMIT` and `OFFSET`.
//!
//! This is the only place that knows PostgreSQL's predicate syntax. It is pure and
//! performs no I/O: the same plan always produces the same SQL and binds.

use reading_tracker_core::query::{
    Comparison, Condition, Connective, FieldSpec, QueryPlan, Scalar, SortOrder, TextMatch,
};

/// The PostgreSQL rendering of a `QueryPlan`.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlSelect {
    /// `None` when the plan has no conditions at all.
    pub predicate: Option<String>,
    pub binds: Vec<Scalar>,
    pub order_by: String,
    pub offset: i64,
    pub limit: i64,
}

impl SqlSelect {
    pub fn translate(plan: &QueryPlan) -> Self {
        let mut writer = Writer::default();

        let mut clauses: Vec<String> = plan
            .scope
            .iter()
            .map(|c| writer.condition(c))
            .collect();
        if !plan.conditions.is_empty() {
            let joiner = match plan.connective {
                Connective::And => " AND ",
                Connective::Or => " OR ",
            };
            let group: Vec<String> = plan
                .conditions
                .iter()
                .map(|c| writer.condition(c))
                .collect();
            clauses.push(format!("({})", group.join(joiner)));
        }
        let predicate = (!clauses.is_empty()).then(|| clauses.join(" AND "));

        let direction = match plan.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let order_by = format!(
            "{} {direction}, \"id\" {direction}",
            column(&plan.sort_field)
        );

        Self {
            predicate,
            binds: writer.binds,
            order_by,
            offset: i64::try_from(plan.offset).unwrap_or(i64::MAX),
            limit: i64::try_from(plan.limit).unwrap_or(i64::MAX),
        }
    }

    /// Renders the complete statement for `columns` of `table`.
    pub fn to_sql(&self, columns: &str, table: &str) -> String {
        let mut sql = format!("SELECT {columns} FROM {table}");
        if let Some(predicate) = &self.predicate {
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }
        sql.push_str(&format!(
            " ORDER BY {} LIMIT {} OFFSET {}",
            self.order_by, self.limit, self.offset
        ));
        sql
    }
}

#[derive(Default)]
struct Writer {
    binds: Vec<Scalar>,
}

impl Writer {
    fn bind(&mut self, value: Scalar) -> String {
        self.binds.push(value);
        format!("${}", self.binds.len())
    }

    fn condition(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::Compare { field, op, value } => {
                let op = match op {
                    Comparison::Eq => "=",
                    Comparison::Ne => "<>",
                    Comparison::Lt => "<",
                    Comparison::Le => "<=",
                    Comparison::Gt => ">",
                    Comparison::Ge => ">=",
                };
                format!("{} {op} {}", column(field), self.bind(value.clone()))
            }
            Condition::AnyOf {
                field,
                negated,
                values,
            } => {
                let placeholders: Vec<String> =
                    values.iter().map(|v| self.bind(v.clone())).collect();
                let keyword = if *negated { "NOT IN" } else { "IN" };
                format!("{} {keyword} ({})", column(field), placeholders.join(", "))
            }
            Condition::Matches {
                field,
                mode,
                needle,
            } => {
                let escaped = escape_like(needle);
                let pattern = match mode {
                    TextMatch::Contains => format!("%{escaped}%"),
                    TextMatch::StartsWith => format!("{escaped}%"),
                    TextMatch::EndsWith => format!("%{escaped}"),
                };
                format!("{} ILIKE {}", column(field), self.bind(Scalar::Text(pattern)))
            }
            Condition::Between {
                field,
                lower,
                upper,
            } => {
                let lower = self.bind(lower.clone());
                let upper = self.bind(upper.clone());
                format!("{} BETWEEN {lower} AND {upper}", column(field))
            }
            Condition::IsNull { field, negated } => {
                let keyword = if *negated { "IS NOT NULL" } else { "IS NULL" };
                format!("{} {keyword}", column(field))
            }
        }
    }
}

/// Maps an allowlisted camelCase field name to its quoted snake_case column.
fn column(field: &FieldSpec) -> String {
    let mut name = String::with_capacity(field.name.len() + 4);
    for c in field.name.chars() {
        if c.is_ascii_uppercase() {
            name.push('_');
            name.push(c.to_ascii_lowercase());
        } else {
            name.push(c);
        }
    }
    format!("\"{name}\"")
}

/// Escapes the `LIKE` wildcards so user text is matched literally.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use reading_tracker_core::query::{Filter, FilterOperator, Query};
    use reading_tracker_core::{Book, Recording, UserBook};
    use serde_json::json;

    fn translate<E: reading_tracker_core::query::Queryable>(query: &Query) -> SqlSelect {
        SqlSelect::translate(&QueryPlan::for_entity::<E>(query).unwrap())
    }

    #[test]
    fn status_filter_with_paging_is_deterministic() {
        let query = Query::new()
            .filter(Filter::new("readingStatus", FilterOperator::Equals, "COMPLETED"))
            .paginate(5, 2);
        let first = translate::<UserBook>(&query);
        assert_eq!(first, translate::<UserBook>(&query));
        assert_eq!(first.predicate.as_deref(), Some("(\"reading_status\" = $1)"));
        assert_eq!(first.binds, vec![Scalar::Text("COMPLETED".to_string())]);
        assert_eq!(first.offset, 5);
        assert_eq!(first.limit, 5);
        assert_eq!(first.order_by, "\"created_at\" DESC, \"id\" DESC");
    }

    #[test]
    fn connective_joins_filters_and_scope_is_always_anded() {
        let query = Query::new()
            .filter(Filter::new("pages", FilterOperator::GreaterThan, 10))
            .filter(Filter::new("notes", FilterOperator::Equals, serde_json::Value::Null))
            .connective(Connective::Or)
            .scoped_to("userBookId", "0b7c2f3e-4a6f-4f3a-9d0e-3c1b2a4d5e6f")
            .sort_by("date", SortOrder::Asc);
        let select = translate::<Recording>(&query);
        assert_eq!(
            select.predicate.as_deref(),
            Some("\"user_book_id\" = $1 AND (\"pages\" > $2 OR \"notes\" IS NULL)")
        );
        assert_eq!(select.binds.len(), 2);
        assert_eq!(select.order_by, "\"date\" ASC, \"id\" ASC");
    }

    #[test]
    fn between_in_and_text_operators() {
        let query = Query::new()
            .filter(Filter::new("date", FilterOperator::Between, json!(["2024-01-01", "2024-01-31"])))
            .filter(Filter::new("minutes", FilterOperator::NotIn, json!([5, 10])))
            .filter(Filter::new("notes", FilterOperator::StartsWith, "50%_off"));
        let select = translate::<Recording>(&query);
        assert_eq!(
            select.predicate.as_deref(),
            Some(
                "(\"date\" BETWEEN $1 AND $2 AND \"minutes\" NOT IN ($3, $4) AND \"notes\" ILIKE $5)"
            )
        );
        assert_eq!(select.binds[4], Scalar::Text("50\\%\\_off%".to_string()));
    }

    #[test]
    fn empty_plan_has_no_predicate() {
        let select = translate::<Book>(&Query::new());
        assert_eq!(select.predicate, None);
        assert_eq!(
            select.to_sql("id, title", "books"),
            "SELECT id, title FROM books ORDER BY \"created_at\" DESC, \"id\" DESC LIMIT 10 OFFSET 0"
        );
    }

    #[test]
    fn camel_case_fields_map_to_snake_case_columns() {
        let query = Query::new()
            .filter(Filter::new("pageCount", FilterOperator::GreaterThanOrEqual, 300))
            .filter(Filter::new("isbn13", FilterOperator::Contains, "978"));
        let select = translate::<Book>(&query);
        assert_eq!(
            select.predicate.as_deref(),
            Some("(\"page_count\" >= $1 AND \"isbn13\" ILIKE $2)")
        );
    }
}
