//! Row codec: flat numeric buffers <-> typed rows
//!
//! External callers hand over plain `f64` buffers. The codec maps column `j`
//! to an integer or floating [`Scalar`] according to the column type at the
//! same position of the [`Format`], and back again.
//!
//! [`DataObject`] is the owned row table built on top of the codec.

use crate::format::Format;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::Arc;

/// A row element: integer or floating, interpreted through the schema
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Integer-typed column value
    Int(i64),
    /// Floating-typed column value
    Float(f64),
}

impl Scalar {
    /// Value as floating point
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    /// Value as integer (floating values truncate toward zero)
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Int(v) => v,
            Self::Float(v) => v as i64,
        }
    }
}

impl Default for Scalar {
    fn default() -> Self {
        Self::Int(0)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// Fixed-width row of scalars, one per schema column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row(Box<[Scalar]>);

impl Row {
    /// Number of columns
    #[must_use]
    pub fn width(&self) -> usize {
        self.0.len()
    }

    /// Values as a slice
    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.0
    }
}

impl Deref for Row {
    type Target = [Scalar];

    fn deref(&self) -> &[Scalar] {
        &self.0
    }
}

impl From<Vec<Scalar>> for Row {
    fn from(values: Vec<Scalar>) -> Self {
        Self(values.into_boxed_slice())
    }
}

/// Stateless converter between `f64` buffers and typed rows
pub struct RowCodec {
    _private: (),
}

impl RowCodec {
    /// Convert one flat row into a typed [`Row`]
    ///
    /// # Errors
    ///
    /// Returns error if the buffer width differs from the schema or an
    /// integer column receives a non-finite value
    pub fn encode(format: &Format, values: &[f64]) -> Result<Row> {
        if values.len() != format.len() {
            return Err(Error::LengthMismatch {
                what: "row columns",
                expected: format.len(),
                actual: values.len(),
            });
        }

        let mut row = Vec::with_capacity(values.len());
        for (column, (spec, &value)) in format.columns().iter().zip(values).enumerate() {
            if spec.column_type().is_integral() {
                if !value.is_finite() {
                    tracing::warn!(column, value, "non-finite value in integer column");
                    return Err(Error::InvalidInput(format!(
                        "column {column} ('{}') is {} but got {value}",
                        spec.name(),
                        spec.column_type()
                    )));
                }
                #[allow(clippy::cast_possible_truncation)]
                row.push(Scalar::Int(value as i64));
            } else {
                row.push(Scalar::Float(value));
            }
        }
        Ok(Row::from(row))
    }

    /// Convert a typed row back to a flat buffer
    ///
    /// # Errors
    ///
    /// Returns error if the row width differs from the schema
    pub fn decode(format: &Format, row: &[Scalar]) -> Result<Vec<f64>> {
        let mut out = vec![0.0; format.len()];
        Self::decode_into(format, row, &mut out)?;
        Ok(out)
    }

    /// Convert a typed row into a caller-provided buffer
    ///
    /// # Errors
    ///
    /// Returns error if the row or the output buffer width differs from the schema
    pub fn decode_into(format: &Format, row: &[Scalar], out: &mut [f64]) -> Result<()> {
        if row.len() != format.len() {
            return Err(Error::LengthMismatch {
                what: "row columns",
                expected: format.len(),
                actual: row.len(),
            });
        }
        if out.len() != format.len() {
            return Err(Error::LengthMismatch {
                what: "output buffer",
                expected: format.len(),
                actual: out.len(),
            });
        }
        for ((spec, value), slot) in format.columns().iter().zip(row).zip(out.iter_mut()) {
            *slot = if spec.column_type().is_integral() {
                #[allow(clippy::cast_precision_loss)]
                let v = value.as_i64() as f64;
                v
            } else {
                value.as_f64()
            };
        }
        Ok(())
    }
}

/// Owned table of rows sharing one schema
#[derive(Debug, Clone)]
pub struct DataObject {
    format: Arc<Format>,
    rows: Vec<Row>,
}

impl DataObject {
    /// Create an empty table for `format`
    #[must_use]
    pub const fn new(format: Arc<Format>) -> Self {
        Self {
            format,
            rows: Vec::new(),
        }
    }

    /// Build a table from a row-major flat buffer
    ///
    /// # Errors
    ///
    /// Returns error if `values.len() != num_rows * num_columns`, if
    /// `num_columns` differs from the schema, or if a value cannot be encoded
    pub fn from_flat(
        format: Arc<Format>,
        values: &[f64],
        num_rows: usize,
        num_columns: usize,
    ) -> Result<Self> {
        if num_columns != format.len() {
            return Err(Error::LengthMismatch {
                what: "table columns",
                expected: format.len(),
                actual: num_columns,
            });
        }
        if values.len() != num_rows * num_columns {
            return Err(Error::LengthMismatch {
                what: "flat buffer",
                expected: num_rows * num_columns,
                actual: values.len(),
            });
        }

        let mut data = Self::new(format);
        data.rows.reserve(num_rows);
        if num_columns > 0 {
            for chunk in values.chunks_exact(num_columns) {
                data.push_values(chunk)?;
            }
        }
        Ok(data)
    }

    /// Encode and append one row
    ///
    /// # Errors
    ///
    /// Returns error if the row cannot be encoded with this table's schema
    pub fn push_values(&mut self, values: &[f64]) -> Result<()> {
        let row = RowCodec::encode(&self.format, values)?;
        self.rows.push(row);
        Ok(())
    }

    /// Schema shared by all rows
    #[must_use]
    pub fn format(&self) -> &Arc<Format> {
        &self.format
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of columns
    #[must_use]
    pub fn width(&self) -> usize {
        self.format.len()
    }

    /// Row at `index`
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// All rows
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Decoded values of the row at `index`
    ///
    /// # Errors
    ///
    /// Returns error if `index` is out of range
    pub fn row_values(&self, index: usize) -> Result<Vec<f64>> {
        let row = self.row(index).ok_or_else(|| {
            Error::InvalidInput(format!("row {index} out of range ({} rows)", self.len()))
        })?;
        RowCodec::decode(&self.format, row)
    }

    /// Whole table as a row-major flat buffer
    ///
    /// # Errors
    ///
    /// Returns error if a stored row no longer matches the schema
    pub fn to_flat(&self) -> Result<Vec<f64>> {
        let width = self.width();
        let mut out = vec![0.0; self.len() * width];
        if width > 0 {
            for (row, chunk) in self.rows.iter().zip(out.chunks_exact_mut(width)) {
                RowCodec::decode_into(&self.format, row, chunk)?;
            }
        }
        Ok(out)
    }

    /// Overwrite one column with `values`, one per row
    ///
    /// # Errors
    ///
    /// Returns error if the column does not exist, `values.len()` differs
    /// from the row count, or a value cannot be encoded for the column
    pub fn set_column_values(&mut self, column: usize, values: &[f64]) -> Result<()> {
        let spec = self
            .format
            .nth(column)
            .ok_or_else(|| Error::UnknownColumn(column.to_string()))?;
        if values.len() != self.rows.len() {
            return Err(Error::LengthMismatch {
                what: "column values",
                expected: self.rows.len(),
                actual: values.len(),
            });
        }

        let integral = spec.column_type().is_integral();
        if integral && values.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "non-finite value for integer column {column}"
            )));
        }
        for (row, &value) in self.rows.iter_mut().zip(values) {
            #[allow(clippy::cast_possible_truncation)]
            let scalar = if integral {
                Scalar::Int(value as i64)
            } else {
                Scalar::Float(value)
            };
            row.0[column] = scalar;
        }
        Ok(())
    }
}
