//! Raw results as returned by the backing store
use std::sync::Arc;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::{
    policy::ConsistencyLevel,
    value::{FromValue, Value, ValueError},
};

/// One row of a [`ResultSet`]
///
/// Rows from the same result share the column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Read the value at `index` as `T`
    pub fn get<T: FromValue>(&self, index: usize) -> Result<T, ValueError> {
        let value = self.value(index).ok_or(ValueError::IndexOutOfBounds {
            index,
            len: self.len(),
        })?;
        T::from_value(value)
    }

    /// Read the value of the column called `name` as `T`
    pub fn get_by_name<T: FromValue>(&self, name: &str) -> Result<T, ValueError> {
        let index = self
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| ValueError::UnknownColumn { name: name.into() })?;
        self.get(index)
    }

    /// Column name to value, in column order
    pub fn to_map(&self) -> IndexMap<String, Value> {
        self.columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Metadata describing how the store executed a statement
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionInfo {
    /// Consistency level the coordinator achieved
    pub consistency_level: Option<ConsistencyLevel>,
    /// Set when query tracing was requested for the statement
    pub tracing_id: Option<Uuid>,
}

/// The unprocessed response to one statement
///
/// A result set is not `Clone`: it is handed to exactly one consumer, typically a transformer.
#[derive(Debug, PartialEq)]
pub struct ResultSet {
    columns: Arc<[String]>,
    rows: Vec<Row>,
    info: ExecutionInfo,
}

impl ResultSet {
    /// A result with no columns and no rows, as returned for most writes
    pub fn empty() -> Self {
        Self {
            columns: Arc::from(Vec::new()),
            rows: Vec::new(),
            info: ExecutionInfo::default(),
        }
    }

    pub fn builder<I, S>(columns: I) -> ResultSetBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ResultSetBuilder {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Attach the execution metadata reported by the store
    pub fn with_info(mut self, info: ExecutionInfo) -> Self {
        self.info = info;
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn info(&self) -> &ExecutionInfo {
        &self.info
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// Builder for [`ResultSet`], used by driver implementations
#[derive(Debug)]
pub struct ResultSetBuilder {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ResultSetBuilder {
    /// Append a row; values are matched to columns by position
    pub fn row<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.rows.push(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> ResultSet {
        let columns: Arc<[String]> = Arc::from(self.columns);
        let rows = self
            .rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&columns), values))
            .collect();
        ResultSet {
            columns,
            rows,
            info: ExecutionInfo::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn users() -> ResultSet {
        ResultSet::builder(["id", "name"])
            .row([Value::from(1), Value::from("ada")])
            .row([Value::from(2), Value::Null])
            .build()
    }

    #[test]
    fn positional_and_named_access() {
        let rs = users();
        assert_eq!(rs.len(), 2);
        let row = &rs.rows()[0];
        assert_eq!(row.get::<i32>(0), Ok(1));
        assert_eq!(row.get_by_name::<String>("name"), Ok("ada".to_string()));
        assert_eq!(
            row.get::<i32>(5),
            Err(ValueError::IndexOutOfBounds { index: 5, len: 2 })
        );
        assert_eq!(
            row.get_by_name::<i32>("email"),
            Err(ValueError::UnknownColumn {
                name: "email".into()
            })
        );
        assert_eq!(rs.rows()[1].get::<Option<String>>(1), Ok(None));
    }

    #[test]
    fn map_keeps_column_order() {
        let row = users().into_rows().remove(0);
        let map = row.to_map();
        let keys: Vec<_> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, ["id", "name"]);
        assert_eq!(map["name"], Value::from("ada"));
    }
}
