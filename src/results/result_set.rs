use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::row::{Row, index_columns};
use crate::types::SqlValue;

/// A fully materialized query result.
///
/// Rows are kept in the order the server returned them. Nothing here refers back to
/// the connection, so a result set can outlive the adapter that produced it.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<Row>,
    #[serde(skip)]
    column_names: Option<Arc<Vec<String>>>,
    #[serde(skip)]
    column_index: Option<Arc<HashMap<String, usize>>>,
}

impl ResultSet {
    /// Create an empty result set with the given columns and room for `capacity` rows.
    #[must_use]
    pub fn with_columns(column_names: Vec<String>, capacity: usize) -> ResultSet {
        let mut result_set = ResultSet {
            results: Vec::with_capacity(capacity),
            column_names: None,
            column_index: None,
        };
        result_set.set_column_names(Arc::new(column_names));
        result_set
    }

    /// Set the column names for this result set (to be shared by all rows)
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_index = Some(Arc::new(index_columns(&column_names)));
        self.column_names = Some(column_names);
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn get_column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Append a row; values must line up with the column names.
    ///
    /// Rows added before any column names were set are dropped, since they could not
    /// be looked up by name.
    pub fn add_row_values(&mut self, values: Vec<SqlValue>) {
        if let (Some(names), Some(index)) = (&self.column_names, &self.column_index) {
            self.results
                .push(Row::with_index(names.clone(), index.clone(), values));
        }
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}
