//! Storage query description.
//!
//! The export pipeline builds a [`RecordQuery`] from an
//! [`ExchangeContext`](super::ExchangeContext) and hands it to the store.
//! Stores that keep records in memory can evaluate it with
//! [`RecordQuery::execute`]; others translate it to their own query language.

use super::{ExchangeRecord, Paging};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Case-insensitive equality on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    /// Field export name.
    pub field: String,
    /// Expected value.
    pub value: String,
}

impl FieldFilter {
    /// Creates an equality filter.
    #[must_use]
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    fn matches(&self, record: &ExchangeRecord) -> bool {
        record
            .get(&self.field)
            .is_some_and(|v| v.eq_ignore_ascii_case(&self.value))
    }
}

/// Case-insensitive substring search across a fixed field set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSearch {
    /// Search text.
    pub text: String,
    /// Fields searched; a match in any of them is enough.
    pub fields: Vec<String>,
}

impl TextSearch {
    fn matches(&self, record: &ExchangeRecord) -> bool {
        let needle = self.text.to_lowercase();
        self.fields.iter().any(|field| {
            record
                .get(field)
                .is_some_and(|v| v.to_lowercase().contains(&needle))
        })
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKey {
    /// Sort by a field's value.
    Field {
        /// Field export name.
        name: String,
        /// Descending when true.
        descending: bool,
    },
    /// Creation time, ascending.
    CreatedAt,
    /// Natural key, ascending.
    NaturalKey,
}

/// Predicate, order and window for a store query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordQuery {
    /// Equality filters, all of which must match.
    pub filters: Vec<FieldFilter>,
    /// Optional text search.
    pub search: Option<TextSearch>,
    /// Sort keys, most significant first.
    pub order: Vec<OrderKey>,
    /// Result window; `None` returns everything.
    pub window: Option<Paging>,
}

/// A stored record offered to [`RecordQuery::execute`].
#[derive(Debug, Clone)]
pub struct QueryCandidate {
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// The record's natural key.
    pub natural_key: String,
    /// The record in exchange shape.
    pub record: ExchangeRecord,
}

impl RecordQuery {
    /// Creates a query that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality filter.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(FieldFilter::new(field, value));
        self
    }

    /// Sets the text search.
    #[must_use]
    pub fn search(mut self, text: impl Into<String>, fields: Vec<String>) -> Self {
        self.search = Some(TextSearch {
            text: text.into(),
            fields,
        });
        self
    }

    /// Appends a sort key.
    #[must_use]
    pub fn order_by(mut self, key: OrderKey) -> Self {
        self.order.push(key);
        self
    }

    /// Sets the result window.
    #[must_use]
    pub const fn window(mut self, paging: Option<Paging>) -> Self {
        self.window = paging;
        self
    }

    /// Returns whether a record satisfies the predicate.
    #[must_use]
    pub fn matches(&self, record: &ExchangeRecord) -> bool {
        self.filters.iter().all(|f| f.matches(record))
            && self.search.as_ref().is_none_or(|s| s.matches(record))
    }

    /// Filters, sorts and windows candidates in memory.
    #[must_use]
    pub fn execute(&self, candidates: Vec<QueryCandidate>) -> Vec<ExchangeRecord> {
        let mut matched: Vec<QueryCandidate> = candidates
            .into_iter()
            .filter(|c| self.matches(&c.record))
            .collect();

        matched.sort_by(|a, b| self.compare(a, b));

        let (skip, take) = self
            .window
            .map_or((0, usize::MAX), |w| (w.skip, w.take));

        matched
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|c| c.record)
            .collect()
    }

    fn compare(&self, a: &QueryCandidate, b: &QueryCandidate) -> Ordering {
        for key in &self.order {
            let ordering = match key {
                OrderKey::Field { name, descending } => {
                    let ord = compare_values(a.record.get(name), b.record.get(name));
                    if *descending { ord.reverse() } else { ord }
                },
                OrderKey::CreatedAt => a.created_at.cmp(&b.created_at),
                OrderKey::NaturalKey => a
                    .natural_key
                    .to_lowercase()
                    .cmp(&b.natural_key.to_lowercase()),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Numeric when both sides parse as numbers, otherwise case-insensitive text.
/// Absent values sort first.
fn compare_values(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a.parse::<f64>(), b.parse::<f64>()) {
            (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_lowercase().cmp(&b.to_lowercase()),
        },
    }
}
