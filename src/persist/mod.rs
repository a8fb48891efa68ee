//! Model persistence protocol
//!
//! Two dual, recursive interfaces walk the detector's component tree:
//!
//! ```text
//! root
//! ├── "AnomalyDetector"   detector configuration + partition directory
//! ├── 0                   component 0 (micro-model state)
//! │   ├── 0               partition 0 statistics
//! │   └── 1               partition 1 statistics
//! └── 1                   component 1
//!     └── 0
//! ```
//!
//! The consumer (detector or micro-model) is responsible for calling the
//! importer with exactly the keys and nesting it used when exporting; the
//! protocol performs no schema negotiation.
//!
//! Child handles borrow their parent, so a child must be dropped before the
//! parent node can be written or read again. A nested handle can never
//! outlive the call that created it.
//!
//! # Example
//!
//! ```rust
//! use trueno_isc::persist::{JsonDocument, Key, ModelExporter, ModelImporter};
//!
//! # fn main() -> trueno_isc::Result<()> {
//! let mut doc = JsonDocument::new();
//! {
//!     let mut root = doc.exporter();
//!     root.add_int("version", 1)?;
//!     let mut child = root.create_child(Key::Index(0))?;
//!     child.add_double_array("sum", &[1.0, 2.5])?;
//! }
//!
//! let importer = doc.importer();
//! let child = importer.get_child(Key::Index(0))?;
//! let mut sum = [0.0; 2];
//! child.get_double_array("sum", &mut sum)?;
//! assert_eq!(sum, [1.0, 2.5]);
//! # Ok(())
//! # }
//! ```

mod json;

pub use json::{JsonDocument, JsonExporter, JsonImporter};

use crate::Result;
use std::fmt;

/// Child node key: named section or component ordinal
///
/// Both forms address the same kind of node. Backends that only support
/// string keys store `Index(n)` as the decimal string of `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key<'a> {
    /// Named child (e.g. `"AnomalyDetector"`)
    Name(&'a str),
    /// Ordinal child (component or partition index)
    Index(usize),
}

impl fmt::Display for Key<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl<'a> From<&'a str> for Key<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl From<usize> for Key<'_> {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Write side of the persistence protocol
pub trait ModelExporter {
    /// Store an integer scalar
    ///
    /// # Errors
    ///
    /// Returns error if `key` already exists in this node
    fn add_int(&mut self, key: &str, value: i64) -> Result<()>;

    /// Store a single-precision scalar
    ///
    /// # Errors
    ///
    /// Returns error if `key` already exists or the value is not finite
    fn add_float(&mut self, key: &str, value: f32) -> Result<()>;

    /// Store a double-precision scalar
    ///
    /// # Errors
    ///
    /// Returns error if `key` already exists or the value is not finite
    fn add_double(&mut self, key: &str, value: f64) -> Result<()>;

    /// Store a fixed-length integer array
    ///
    /// # Errors
    ///
    /// Returns error if `key` already exists in this node
    fn add_int_array(&mut self, key: &str, values: &[i64]) -> Result<()>;

    /// Store a fixed-length single-precision array
    ///
    /// # Errors
    ///
    /// Returns error if `key` already exists or a value is not finite
    fn add_float_array(&mut self, key: &str, values: &[f32]) -> Result<()>;

    /// Store a fixed-length double-precision array
    ///
    /// # Errors
    ///
    /// Returns error if `key` already exists or a value is not finite
    fn add_double_array(&mut self, key: &str, values: &[f64]) -> Result<()>;

    /// Create a nested node under `key` and return an exporter scoped to it
    ///
    /// The returned handle mutably borrows `self`; drop it to release the
    /// child before touching the parent again.
    ///
    /// # Errors
    ///
    /// Returns error if `key` already exists in this node
    fn create_child(&mut self, key: Key<'_>) -> Result<Box<dyn ModelExporter + '_>>;
}

/// Read side of the persistence protocol
pub trait ModelImporter {
    /// Read an integer scalar
    ///
    /// # Errors
    ///
    /// Returns error if `key` is missing or not an integer
    fn get_int(&self, key: &str) -> Result<i64>;

    /// Read a single-precision scalar
    ///
    /// # Errors
    ///
    /// Returns error if `key` is missing or not a number
    fn get_float(&self, key: &str) -> Result<f32>;

    /// Read a double-precision scalar
    ///
    /// # Errors
    ///
    /// Returns error if `key` is missing or not a number
    fn get_double(&self, key: &str) -> Result<f64>;

    /// Fill `out` from an integer array stored under `key`
    ///
    /// # Errors
    ///
    /// Returns error if `key` is missing, not an integer array, or its
    /// length differs from `out.len()`
    fn get_int_array(&self, key: &str, out: &mut [i64]) -> Result<()>;

    /// Fill `out` from a single-precision array stored under `key`
    ///
    /// # Errors
    ///
    /// Returns error if `key` is missing, not a numeric array, or its
    /// length differs from `out.len()`
    fn get_float_array(&self, key: &str, out: &mut [f32]) -> Result<()>;

    /// Fill `out` from a double-precision array stored under `key`
    ///
    /// # Errors
    ///
    /// Returns error if `key` is missing, not a numeric array, or its
    /// length differs from `out.len()`
    fn get_double_array(&self, key: &str, out: &mut [f64]) -> Result<()>;

    /// Length of the array stored under `key`
    ///
    /// # Errors
    ///
    /// Returns error if `key` is missing or not an array
    fn array_len(&self, key: &str) -> Result<usize>;

    /// Open the nested node under `key`
    ///
    /// # Errors
    ///
    /// Returns error if the child is missing or not a node
    fn get_child(&self, key: Key<'_>) -> Result<Box<dyn ModelImporter + '_>>;
}

/// State that can be written to and restored from a model document
pub trait PersistentModel {
    /// Write this object's state into `exporter`
    ///
    /// # Errors
    ///
    /// Returns error if the exporter rejects a value
    fn export_state(&self, exporter: &mut dyn ModelExporter) -> Result<()>;

    /// Restore this object's state from `importer`
    ///
    /// # Errors
    ///
    /// Returns error if an expected entry is missing or malformed
    fn import_state(&mut self, importer: &dyn ModelImporter) -> Result<()>;
}
