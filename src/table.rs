//! In-memory table: an ordered list of named, typed columns of equal length.

use crate::error::{CoreError, CoreResult};
use chrono::NaiveDateTime;
use serde_json::Value;

/// Timestamp layout used when columns are handed to the renderer.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Timestamp(Vec<NaiveDateTime>),
    Text(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Timestamp(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Column::Float(_) => "float64",
            Column::Int(_) => "int64",
            Column::Timestamp(_) => "datetime",
            Column::Text(_) => "text",
        }
    }

    /// Numeric view of the column; `None` for timestamps and text.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            Column::Float(v) => Some(v.clone()),
            Column::Int(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Column::Timestamp(_) | Column::Text(_) => None,
        }
    }

    /// True when the cell at `row` holds no value (NaN floats, empty text).
    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            Column::Float(v) => v[row].is_nan(),
            Column::Text(v) => v[row].is_empty(),
            Column::Int(_) | Column::Timestamp(_) => false,
        }
    }

    pub fn fill_missing(&mut self, value: f64) {
        if let Column::Float(v) = self {
            for x in v.iter_mut().filter(|x| x.is_nan()) {
                *x = value;
            }
        }
    }

    fn retain(&mut self, keep: &[bool]) {
        fn filter<T: Clone>(v: &mut Vec<T>, keep: &[bool]) {
            let mut it = keep.iter();
            v.retain(|_| *it.next().unwrap_or(&true));
        }
        match self {
            Column::Float(v) => filter(v, keep),
            Column::Int(v) => filter(v, keep),
            Column::Timestamp(v) => filter(v, keep),
            Column::Text(v) => filter(v, keep),
        }
    }

    /// Append the rows of `other`; both columns must share a type. Integer
    /// columns widen to float when the incoming rows are float.
    pub fn extend(&mut self, name: &str, other: Column) -> CoreResult<()> {
        if let (Column::Int(a), Column::Float(_)) = (&*self, &other) {
            let widened = a.iter().map(|&x| x as f64).collect();
            *self = Column::Float(widened);
        }
        match (self, other) {
            (Column::Float(a), Column::Float(b)) => a.extend(b),
            (Column::Float(a), Column::Int(b)) => a.extend(b.into_iter().map(|x| x as f64)),
            (Column::Int(a), Column::Int(b)) => a.extend(b),
            (Column::Timestamp(a), Column::Timestamp(b)) => a.extend(b),
            (Column::Text(a), Column::Text(b)) => a.extend(b),
            (this, _) => {
                return Err(CoreError::TypeMismatch {
                    column: name.to_string(),
                    expected: this.type_name(),
                });
            }
        }
        Ok(())
    }

    /// JSON array of the cells; NaN becomes `null`.
    pub fn to_json(&self) -> Value {
        let cells: Vec<Value> = match self {
            Column::Float(v) => v
                .iter()
                .map(|x| serde_json::Number::from_f64(*x).map_or(Value::Null, Value::Number))
                .collect(),
            Column::Int(v) => v.iter().map(|x| Value::from(*x)).collect(),
            Column::Timestamp(v) => v
                .iter()
                .map(|t| Value::String(t.format(TIMESTAMP_FORMAT).to_string()))
                .collect(),
            Column::Text(v) => v.iter().map(|s| Value::String(s.clone())).collect(),
        };
        Value::Array(cells)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(name, column)` pairs; later duplicates overwrite earlier ones.
    #[cfg(test)]
    pub fn from_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, Column)>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for (name, column) in columns {
            table.insert(name, column);
        }
        table
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn num_columns(&self) -> usize {
        self.names.len()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.position(name).map(|i| &self.columns[i])
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Insert a column, replacing an existing column of the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, column: Column) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => self.columns[i] = column,
            None => {
                self.names.push(name);
                self.columns.push(column);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    /// Project onto `names`, in the given order.
    pub fn select(&self, names: &[String]) -> CoreResult<Table> {
        let mut out = Table::new();
        for name in names {
            let column = self
                .column(name)
                .ok_or_else(|| CoreError::ColumnNotFound(name.clone()))?;
            out.insert(name.clone(), column.clone());
        }
        Ok(out)
    }

    /// Keep rows whose flag in `keep` is true.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        for column in &mut self.columns {
            column.retain(keep);
        }
    }

    /// Append the rows of `other`, which must carry the same column names.
    pub fn append(&mut self, other: Table) -> CoreResult<()> {
        if self.names.is_empty() {
            *self = other;
            return Ok(());
        }
        if self.names != other.names {
            return Err(CoreError::TypeMismatch {
                column: other.names.join(","),
                expected: "the same header as the previous session",
            });
        }
        for ((name, column), incoming) in self.names.iter().zip(self.columns.iter_mut()).zip(other.columns) {
            column.extend(name, incoming)?;
        }
        Ok(())
    }

    pub fn fill_missing(&mut self, value: f64) {
        for column in &mut self.columns {
            column.fill_missing(value);
        }
    }
}
