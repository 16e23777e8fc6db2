//! Description of the table a master stores its rows in

use docmaster_core::{Row, RowComparator, RowFilter, RowOrder, RowPredicate};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Table name plus the optional extras a concrete master adds to its queries
///
/// The extra predicate is applied to point-in-time resolution and history;
/// the extra ordering breaks ties in history before `row_id`.
#[derive(Clone)]
pub struct TableLayout {
    name: String,
    extra_predicate: Option<RowFilter>,
    extra_ordering: Option<RowComparator>,
}

impl TableLayout {
    /// Table with no extras
    pub fn new(name: impl Into<String>) -> Self {
        TableLayout {
            name: name.into(),
            extra_predicate: None,
            extra_ordering: None,
        }
    }

    /// Restrict every resolution and history query
    pub fn with_extra_predicate(
        mut self,
        filter: impl Fn(&Row) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.extra_predicate = Some(Arc::new(filter));
        self
    }

    /// Add a history tie-break
    pub fn with_extra_ordering(
        mut self,
        cmp: impl Fn(&Row, &Row) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        self.extra_ordering = Some(Arc::new(cmp));
        self
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn extra_predicate(&self) -> Option<RowPredicate> {
        self.extra_predicate.clone().map(RowPredicate::Filter)
    }

    pub(crate) fn history_order(&self) -> RowOrder {
        match &self.extra_ordering {
            Some(cmp) => RowOrder::NewestFirstThen(Arc::clone(cmp)),
            None => RowOrder::NewestFirst,
        }
    }
}

impl fmt::Debug for TableLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableLayout")
            .field("name", &self.name)
            .field("extra_predicate", &self.extra_predicate.is_some())
            .field("extra_ordering", &self.extra_ordering.is_some())
            .finish()
    }
}
