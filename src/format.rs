//! Column schema (format) for rows fed to the detector
//!
//! A [`Format`] is an ordered list of typed columns. It decides how each
//! position of a flat numeric row is interpreted: `Continuous` columns hold
//! floating values, every other type holds integers.
//!
//! The schema is built once and then shared read-only (typically behind an
//! `Arc`) by the row codec and the detector.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Integer counts or categories
    Discrete,
    /// Real-valued measurements
    Continuous,
    /// Interned string values
    Symbol,
    /// Timestamps (integer seconds)
    Time,
    /// 0/1 flags
    Binary,
}

impl ColumnType {
    /// Map a legacy integer type code to a column type
    ///
    /// Codes: 0 = Discrete, 1 = Continuous, 2 = Symbol, 3 = Time, 4 = Binary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnhandledColumnType`] for any other code
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Self::Discrete),
            1 => Ok(Self::Continuous),
            2 => Ok(Self::Symbol),
            3 => Ok(Self::Time),
            4 => Ok(Self::Binary),
            other => Err(Error::UnhandledColumnType(format!("type code {other}"))),
        }
    }

    /// Legacy integer type code
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Discrete => 0,
            Self::Continuous => 1,
            Self::Symbol => 2,
            Self::Time => 3,
            Self::Binary => 4,
        }
    }

    /// True when values of this column are stored as integers
    #[must_use]
    pub const fn is_integral(self) -> bool {
        !matches!(self, Self::Continuous)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discrete => "discrete",
            Self::Continuous => "continuous",
            Self::Symbol => "symbol",
            Self::Time => "time",
            Self::Binary => "binary",
        };
        f.write_str(name)
    }
}

impl FromStr for ColumnType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discrete" | "discr" => Ok(Self::Discrete),
            "continuous" | "cont" => Ok(Self::Continuous),
            "symbol" => Ok(Self::Symbol),
            "time" | "datetime" => Ok(Self::Time),
            "binary" => Ok(Self::Binary),
            other => Err(Error::UnhandledColumnType(other.to_string())),
        }
    }
}

/// One column of a [`Format`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    name: String,
    column_type: ColumnType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    symbols: Vec<String>,
}

impl ColumnSpec {
    /// Create a column with the given name and type
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            symbols: Vec::new(),
        }
    }

    /// Column name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column type
    #[must_use]
    pub const fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Number of interned symbols (always zero for non-symbol columns)
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }
}

/// Ordered, indexable column schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    columns: Vec<ColumnSpec>,
}

impl Format {
    /// Create an empty format
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a format from `(name, type)` pairs
    #[must_use]
    pub fn from_columns<S: Into<String>>(columns: impl IntoIterator<Item = (S, ColumnType)>) -> Self {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, column_type)| ColumnSpec::new(name, column_type))
                .collect(),
        }
    }

    /// Append a column, returning its index
    pub fn add_column(&mut self, name: impl Into<String>, column_type: ColumnType) -> usize {
        self.columns.push(ColumnSpec::new(name, column_type));
        self.columns.len() - 1
    }

    /// Builder-style variant of [`Format::add_column`]
    #[must_use]
    pub fn with_column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.add_column(name, column_type);
        self
    }

    /// Number of columns
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True if the format has no columns
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column at position `n`
    #[must_use]
    pub fn nth(&self, n: usize) -> Option<&ColumnSpec> {
        self.columns.get(n)
    }

    /// All columns in order
    #[must_use]
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Column names in order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(ColumnSpec::name)
    }

    /// Position of the column called `name`
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownColumn`] if no column has that name
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    /// Intern `symbol` in a symbol column and return its integer value
    ///
    /// # Errors
    ///
    /// Returns error if the column does not exist or is not a symbol column
    pub fn intern(&mut self, column: usize, symbol: &str) -> Result<i64> {
        let spec = self.symbol_column_mut(column)?;
        let id = match spec.symbols.iter().position(|s| s == symbol) {
            Some(id) => id,
            None => {
                spec.symbols.push(symbol.to_string());
                spec.symbols.len() - 1
            }
        };
        i64::try_from(id).map_err(|_| Error::InvalidInput("symbol table overflow".to_string()))
    }

    /// Human-readable representation of `value` in column `column`
    ///
    /// Symbol columns return the interned string; unknown symbol ids and
    /// all other column types fall back to the numeric value.
    ///
    /// # Errors
    ///
    /// Returns error if the column does not exist
    pub fn represent(&self, column: usize, value: f64) -> Result<String> {
        let spec = self.nth(column).ok_or_else(|| Error::UnknownColumn(column.to_string()))?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let text = match spec.column_type {
            ColumnType::Symbol if value >= 0.0 => spec
                .symbols
                .get(value as usize)
                .cloned()
                .unwrap_or_else(|| format!("{value}")),
            ColumnType::Continuous => format!("{value}"),
            _ => format!("{}", value as i64),
        };
        Ok(text)
    }

    fn symbol_column_mut(&mut self, column: usize) -> Result<&mut ColumnSpec> {
        let spec = self
            .columns
            .get_mut(column)
            .ok_or_else(|| Error::UnknownColumn(column.to_string()))?;
        if spec.column_type != ColumnType::Symbol {
            return Err(Error::InvalidInput(format!(
                "column '{}' is {}, not symbol",
                spec.name, spec.column_type
            )));
        }
        Ok(spec)
    }
}
