use std::collections::HashMap;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::types::SqlValue;

/// A single row of a result set.
///
/// Column names and the name-to-index lookup are shared by every row of the same
/// result set; values are kept in the order the server returned the columns.
#[derive(Debug, Clone)]
pub struct Row {
    /// The column names for this row (shared across all rows in a result set)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row, aligned with `column_names`
    pub values: Vec<SqlValue>,
    column_index: Arc<HashMap<String, usize>>,
}

impl Row {
    /// Create a standalone row, building its own column lookup.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        let column_index = Arc::new(index_columns(&column_names));
        Self {
            column_names,
            values,
            column_index,
        }
    }

    pub(crate) fn with_index(
        column_names: Arc<Vec<String>>,
        column_index: Arc<HashMap<String, usize>>,
        values: Vec<SqlValue>,
    ) -> Self {
        Self {
            column_names,
            values,
            column_index,
        }
    }

    /// Get the index of a column by name
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        self.column_index.get(column_name).copied()
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&SqlValue> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Iterate `(column, value)` pairs in server order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.column_names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

// Duplicate column names keep their first position, matching `get` on the server's row.
pub(crate) fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    let mut index = HashMap::with_capacity(column_names.len());
    for (i, name) in column_names.iter().enumerate() {
        index.entry(name.clone()).or_insert(i);
    }
    index
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        Row::new(
            Arc::new(vec!["relname".into(), "size".into(), "relname".into()]),
            vec![
                SqlValue::Text("accounts".into()),
                SqlValue::Int(8192),
                SqlValue::Text("shadowed".into()),
            ],
        )
    }

    #[test]
    fn lookup_by_name_and_index() {
        let r = row();
        assert_eq!(r.get("size"), Some(&SqlValue::Int(8192)));
        assert_eq!(r.get("missing"), None);
        assert_eq!(r.get_by_index(0).and_then(SqlValue::as_text), Some("accounts"));
    }

    #[test]
    fn duplicate_columns_resolve_to_first() {
        assert_eq!(row().get("relname").and_then(SqlValue::as_text), Some("accounts"));
    }

    #[test]
    fn serializes_in_server_order() {
        let r = Row::new(
            Arc::new(vec!["z".into(), "a".into()]),
            vec![SqlValue::Int(1), SqlValue::Null],
        );
        assert_eq!(serde_json::to_string(&r).unwrap(), r#"{"z":1,"a":null}"#);
    }
}
