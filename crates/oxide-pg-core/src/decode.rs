//! Result rows and positional decoding.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::schema::Model;
use crate::types::{FromPgValue, PgValue};

/// The outcome of one statement: its rows and the affected-row count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub rows: Vec<Vec<PgValue>>,
    pub rows_affected: u64,
}

impl ResultSet {
    /// Creates a result set from rows.
    #[must_use]
    pub fn from_rows(rows: Vec<Vec<PgValue>>) -> Self {
        Self {
            rows_affected: rows.len() as u64,
            rows,
        }
    }

    /// Creates a row-less result set.
    #[must_use]
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows: Vec::new(),
            rows_affected,
        }
    }
}

/// Reads the values of one row left to right.
#[derive(Debug)]
pub struct RowReader {
    values: std::vec::IntoIter<PgValue>,
    position: usize,
}

impl RowReader {
    /// Creates a reader over the values of a row.
    #[must_use]
    pub fn new(values: Vec<PgValue>) -> Self {
        Self {
            values: values.into_iter(),
            position: 0,
        }
    }

    /// Takes the next raw value.
    ///
    /// # Errors
    ///
    /// Fails when the row has no more columns.
    pub fn next_value(&mut self) -> Result<PgValue> {
        let value = self.values.next().ok_or_else(|| {
            Error::conversion(format!("row has only {} column(s)", self.position))
        })?;
        self.position += 1;
        Ok(value)
    }

    /// Takes and converts the next value.
    ///
    /// # Errors
    ///
    /// Fails when the row is exhausted or the value does not convert.
    pub fn read<T: FromPgValue>(&mut self) -> Result<T> {
        let position = self.position;
        T::from_pg_value(self.next_value()?)
            .map_err(|e| Error::conversion(format!("column #{position}: {e}")))
    }

    /// Skips `count` values.
    ///
    /// # Errors
    ///
    /// Fails when fewer than `count` values remain.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            self.next_value()?;
        }
        Ok(())
    }

    /// Returns the number of values already read.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Returns the number of values left.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

/// Reads a model preceded by its null-indicator column.
///
/// The indicator is false or NULL for the unmatched side of a LEFT JOIN;
/// its columns are then skipped and `None` is returned.
///
/// # Errors
///
/// Fails when the indicator is not boolean or the model does not decode.
pub fn read_nullable<M: Model>(row: &mut RowReader) -> Result<Option<M>> {
    let present = match row.next_value()? {
        PgValue::Bool(b) => b,
        PgValue::Null => false,
        other => {
            return Err(Error::conversion(format!(
                "null indicator must be boolean, got {}",
                other.variant_name()
            )))
        }
    };
    if present {
        M::from_row(row).map(Some)
    } else {
        row.skip(M::table()?.columns.len())?;
        Ok(None)
    }
}

/// A row of an explicit field-list projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<PgValue>,
}

impl Row {
    /// Creates a row.
    #[must_use]
    pub const fn new(values: Vec<PgValue>) -> Self {
        Self { values }
    }

    /// Converts the value at `index`.
    ///
    /// # Errors
    ///
    /// Fails when the index is out of range or the value does not convert.
    pub fn get<T: FromPgValue>(&self, index: usize) -> Result<T> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| Error::conversion(format!("row has no column #{index}")))?;
        T::from_pg_value(value.clone())
    }

    /// Returns the raw values.
    #[must_use]
    pub fn values(&self) -> &[PgValue] {
        &self.values
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the row is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One named entry of a [`ShapedRow`].
#[derive(Debug, Clone, PartialEq)]
pub enum ShapedValue {
    /// A scalar value.
    Scalar(PgValue),
    /// The columns of a nested model, or `None` when its indicator was
    /// false.
    Model(Option<Vec<PgValue>>),
}

/// A row of a composite-shape projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapedRow {
    entries: HashMap<Arc<str>, ShapedValue>,
}

impl ShapedRow {
    pub(crate) fn insert(&mut self, name: Arc<str>, value: ShapedValue) {
        self.entries.insert(name, value);
    }

    /// Converts the scalar entry `name`.
    ///
    /// # Errors
    ///
    /// Fails when the entry is missing, is a model, or does not convert.
    pub fn get<T: FromPgValue>(&self, name: &str) -> Result<T> {
        match self.entries.get(name) {
            Some(ShapedValue::Scalar(value)) => T::from_pg_value(value.clone()),
            Some(ShapedValue::Model(_)) => Err(Error::conversion(format!(
                "`{name}` is a model entry; use `model`"
            ))),
            None => Err(Error::conversion(format!("shape has no entry `{name}`"))),
        }
    }

    /// Decodes the nested model entry `name`.
    ///
    /// # Errors
    ///
    /// Fails when the entry is missing, is a scalar, or does not decode.
    pub fn model<M: Model>(&self, name: &str) -> Result<Option<M>> {
        match self.entries.get(name) {
            Some(ShapedValue::Model(Some(values))) => {
                M::from_row(&mut RowReader::new(values.clone())).map(Some)
            }
            Some(ShapedValue::Model(None)) => Ok(None),
            Some(ShapedValue::Scalar(_)) => Err(Error::conversion(format!(
                "`{name}` is a scalar entry; use `get`"
            ))),
            None => Err(Error::conversion(format!("shape has no entry `{name}`"))),
        }
    }

    /// Returns whether the shape has an entry called `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}
