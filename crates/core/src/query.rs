//! Composable row predicates and object-scoped queries
//!
//! Every query the master issues is scoped to a single object id. A query is
//! a conjunction of [`RowPredicate`]s, an ordering and an optional window.
//! Storage backends evaluate queries with [`RowQuery::matches`] and
//! [`RowQuery::finish`], or translate them into their own query language.

use crate::row::{Axis, Row};
use crate::timestamp::Timestamp;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Extra row filter supplied by a concrete master
pub type RowFilter = Arc<dyn Fn(&Row) -> bool + Send + Sync>;

/// Extra tie-break ordering supplied by a concrete master
pub type RowComparator = Arc<dyn Fn(&Row, &Row) -> Ordering + Send + Sync>;

/// A single condition on a row
#[derive(Clone)]
pub enum RowPredicate {
    /// Interval on `axis` contains `instant`: `from <= instant AND to > instant`
    OpenAt {
        /// Axis to test
        axis: Axis,
        /// Instant that must fall inside the interval
        instant: Timestamp,
    },
    /// Interval on `axis` overlaps the closed range `[from, to]`
    ///
    /// Union of "starts inside the range" (`from <= X_from <= to`) and "was
    /// already open before the range and ends after its start"
    /// (`X_from < from AND X_to > from`). A missing bound is unbounded.
    Overlaps {
        /// Axis to test
        axis: Axis,
        /// Lower bound, inclusive
        from: Option<Timestamp>,
        /// Upper bound, inclusive
        to: Option<Timestamp>,
    },
    /// Interval on `axis` intersects the half-open range `[from, to)`
    Intersects {
        /// Axis to test
        axis: Axis,
        /// Lower bound, inclusive
        from: Timestamp,
        /// Upper bound, exclusive
        to: Timestamp,
    },
    /// Interval on `axis` is still open
    Unclosed(Axis),
    /// Interval on `axis` ends exactly at `instant`
    EndsAt {
        /// Axis to test
        axis: Axis,
        /// Required end instant
        instant: Timestamp,
    },
    /// Arbitrary filter
    Filter(RowFilter),
}

impl RowPredicate {
    /// Evaluate against a row
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            RowPredicate::OpenAt { axis, instant } => row.is_open_at(*axis, *instant),
            RowPredicate::Overlaps { axis, from, to } => {
                let (x_from, x_to) = row.interval(*axis);
                let starts_inside =
                    from.map_or(true, |f| x_from >= f) && to.map_or(true, |t| x_from <= t);
                let open_before = match from {
                    Some(f) => x_from < *f && x_to > *f,
                    None => false,
                };
                starts_inside || open_before
            }
            RowPredicate::Intersects { axis, from, to } => {
                let (x_from, x_to) = row.interval(*axis);
                x_from < *to && x_to > *from
            }
            RowPredicate::Unclosed(axis) => row.interval(*axis).1.is_open_ended(),
            RowPredicate::EndsAt { axis, instant } => row.interval(*axis).1 == *instant,
            RowPredicate::Filter(f) => f(row),
        }
    }
}

impl fmt::Debug for RowPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowPredicate::OpenAt { axis, instant } => write!(f, "OpenAt({}, {})", axis, instant),
            RowPredicate::Overlaps { axis, from, to } => {
                write!(f, "Overlaps({}, {:?}, {:?})", axis, from, to)
            }
            RowPredicate::Intersects { axis, from, to } => {
                write!(f, "Intersects({}, {}, {})", axis, from, to)
            }
            RowPredicate::Unclosed(axis) => write!(f, "Unclosed({})", axis),
            RowPredicate::EndsAt { axis, instant } => write!(f, "EndsAt({}, {})", axis, instant),
            RowPredicate::Filter(_) => f.write_str("Filter(..)"),
        }
    }
}

/// Result ordering
#[derive(Clone, Default)]
pub enum RowOrder {
    /// `version_from DESC, correction_from DESC`, then the extra comparator,
    /// then `row_id DESC`
    #[default]
    NewestFirst,
    /// Newest first with an extra tie-break before `row_id`
    NewestFirstThen(RowComparator),
    /// `version_from ASC, row_id ASC`
    OldestFirst,
}

impl RowOrder {
    /// Compare two rows
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        match self {
            RowOrder::NewestFirst => newest_first(a, b).then_with(|| b.row_id.cmp(&a.row_id)),
            RowOrder::NewestFirstThen(extra) => newest_first(a, b)
                .then_with(|| extra(a, b))
                .then_with(|| b.row_id.cmp(&a.row_id)),
            RowOrder::OldestFirst => a
                .version_from
                .cmp(&b.version_from)
                .then_with(|| a.row_id.cmp(&b.row_id)),
        }
    }
}

fn newest_first(a: &Row, b: &Row) -> Ordering {
    b.version_from
        .cmp(&a.version_from)
        .then_with(|| b.correction_from.cmp(&a.correction_from))
}

impl fmt::Debug for RowOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowOrder::NewestFirst => f.write_str("NewestFirst"),
            RowOrder::NewestFirstThen(_) => f.write_str("NewestFirstThen(..)"),
            RowOrder::OldestFirst => f.write_str("OldestFirst"),
        }
    }
}

/// Query over the rows of one object
#[derive(Debug, Clone)]
pub struct RowQuery {
    object_id: i64,
    predicates: Vec<RowPredicate>,
    order: RowOrder,
    window: Option<(usize, usize)>,
}

impl RowQuery {
    /// All rows of an object, newest first
    pub fn for_object(object_id: i64) -> Self {
        RowQuery {
            object_id,
            predicates: Vec::new(),
            order: RowOrder::NewestFirst,
            window: None,
        }
    }

    /// Add a condition
    pub fn with(mut self, predicate: RowPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Add a condition if present
    pub fn with_opt(self, predicate: Option<RowPredicate>) -> Self {
        match predicate {
            Some(p) => self.with(p),
            None => self,
        }
    }

    /// Set the ordering
    pub fn ordered(mut self, order: RowOrder) -> Self {
        self.order = order;
        self
    }

    /// Restrict to `limit` rows starting at `offset`
    pub fn windowed(mut self, offset: usize, limit: usize) -> Self {
        self.window = Some((offset, limit));
        self
    }

    /// Object the query is scoped to
    pub fn object_id(&self) -> i64 {
        self.object_id
    }

    /// Conditions, all of which must hold
    pub fn predicates(&self) -> &[RowPredicate] {
        &self.predicates
    }

    /// Ordering
    pub fn order(&self) -> &RowOrder {
        &self.order
    }

    /// `(offset, limit)`, if windowed
    pub fn window(&self) -> Option<(usize, usize)> {
        self.window
    }

    /// True if the row is in scope and satisfies every condition
    pub fn matches(&self, row: &Row) -> bool {
        row.object_id == self.object_id && self.predicates.iter().all(|p| p.matches(row))
    }

    /// Sort matched rows and apply the window
    pub fn finish(&self, mut rows: Vec<Row>) -> Vec<Row> {
        rows.sort_by(|a, b| self.order.compare(a, b));
        match self.window {
            Some((offset, limit)) => rows.into_iter().skip(offset).take(limit).collect(),
            None => rows,
        }
    }

    /// Filter, sort and window in one pass over candidate rows
    pub fn evaluate<'a>(&self, candidates: impl IntoIterator<Item = &'a Row>) -> Vec<Row> {
        let matched = candidates
            .into_iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();
        self.finish(matched)
    }
}
