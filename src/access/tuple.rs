use crate::access::{DataType, Value};
use std::ops::Deref;

/// A column as seen by expressions: a position in the row and its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Layout of the rows an execution feeds to its expressions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnLayout {
    columns: Vec<Column>,
}

impl ColumnLayout {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Layout with generated column names (`c0`, `c1`, ...)
    pub fn from_types(types: &[DataType]) -> Self {
        Self {
            columns: types
                .iter()
                .enumerate()
                .map(|(i, data_type)| Column::new(format!("c{}", i), *data_type))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn data_type(&self, index: usize) -> Option<DataType> {
        self.columns.get(index).map(|c| c.data_type)
    }
}

/// An owned row handed to expressions by the tuple-iteration engine.
///
/// Rows use the same [`Value`] layout as parameter bindings so compiled
/// expressions can load columns the same way they load parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

}

impl Deref for Row {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        &self.values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}
