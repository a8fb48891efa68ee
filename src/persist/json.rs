//! JSON document backend for the persistence protocol.
//!
//! Documents are plain `serde_json` objects. Integer keys are stored as
//! their decimal string, and every error carries the slash-separated path
//! of the entry that failed.

use super::{Key, ModelExporter, ModelImporter};
use crate::{Error, Result};
use serde_json::{Map, Number, Value};
use std::path::Path;

/// Owned model document
///
/// Hands out an exporter or importer for its root node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonDocument {
    root: Map<String, Value>,
}

impl JsonDocument {
    /// Create an empty document
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a document from JSON text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid JSON or its root is not an object
    pub fn parse(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Wrap an existing JSON value
    ///
    /// # Errors
    ///
    /// Returns error if the value is not an object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            _ => Err(Error::TypeMismatch {
                path: "/".to_string(),
                expected: "object",
            }),
        }
    }

    /// Read a document from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Write the document to a file as pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Pretty-printed JSON text
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }

    /// Root object as a JSON value
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }

    /// True if nothing has been exported yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Exporter scoped to the root node
    pub fn exporter(&mut self) -> JsonExporter<'_> {
        JsonExporter {
            node: &mut self.root,
            path: String::new(),
        }
    }

    /// Importer scoped to the root node
    #[must_use]
    pub fn importer(&self) -> JsonImporter<'_> {
        JsonImporter {
            node: &self.root,
            path: String::new(),
        }
    }
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}/{key}")
    }
}

fn finite_number(path: &str, value: f64) -> Result<Value> {
    Number::from_f64(value).map(Value::Number).ok_or_else(|| {
        Error::InvalidInput(format!("cannot export non-finite value {value} at {path}"))
    })
}

/// Exporter writing into one JSON object node
#[derive(Debug)]
pub struct JsonExporter<'a> {
    node: &'a mut Map<String, Value>,
    path: String,
}

impl JsonExporter<'_> {
    fn insert(&mut self, key: &str, value: Value) -> Result<()> {
        if self.node.contains_key(key) {
            return Err(Error::DuplicateKey {
                path: join_path(&self.path, key),
            });
        }
        self.node.insert(key.to_string(), value);
        Ok(())
    }

    fn insert_doubles(&mut self, key: &str, values: impl Iterator<Item = f64>) -> Result<()> {
        let path = join_path(&self.path, key);
        let array = values
            .map(|v| finite_number(&path, v))
            .collect::<Result<Vec<_>>>()?;
        self.insert(key, Value::Array(array))
    }
}

impl ModelExporter for JsonExporter<'_> {
    fn add_int(&mut self, key: &str, value: i64) -> Result<()> {
        self.insert(key, Value::from(value))
    }

    fn add_float(&mut self, key: &str, value: f32) -> Result<()> {
        self.add_double(key, f64::from(value))
    }

    fn add_double(&mut self, key: &str, value: f64) -> Result<()> {
        let number = finite_number(&join_path(&self.path, key), value)?;
        self.insert(key, number)
    }

    fn add_int_array(&mut self, key: &str, values: &[i64]) -> Result<()> {
        self.insert(key, Value::Array(values.iter().copied().map(Value::from).collect()))
    }

    fn add_float_array(&mut self, key: &str, values: &[f32]) -> Result<()> {
        self.insert_doubles(key, values.iter().copied().map(f64::from))
    }

    fn add_double_array(&mut self, key: &str, values: &[f64]) -> Result<()> {
        self.insert_doubles(key, values.iter().copied())
    }

    fn create_child(&mut self, key: Key<'_>) -> Result<Box<dyn ModelExporter + '_>> {
        let name = key.to_string();
        let path = join_path(&self.path, &name);
        if self.node.contains_key(&name) {
            return Err(Error::DuplicateKey { path });
        }

        let slot = self
            .node
            .entry(name)
            .or_insert_with(|| Value::Object(Map::new()));
        match slot {
            Value::Object(child) => Ok(Box::new(JsonExporter { node: child, path })),
            _ => Err(Error::TypeMismatch {
                path,
                expected: "object",
            }),
        }
    }
}

/// Importer reading from one JSON object node
#[derive(Debug, Clone)]
pub struct JsonImporter<'a> {
    node: &'a Map<String, Value>,
    path: String,
}

impl JsonImporter<'_> {
    fn lookup(&self, key: &str) -> Result<&Value> {
        self.node.get(key).ok_or_else(|| Error::MissingKey {
            path: join_path(&self.path, key),
        })
    }

    fn mismatch(&self, key: &str, expected: &'static str) -> Error {
        Error::TypeMismatch {
            path: join_path(&self.path, key),
            expected,
        }
    }

    fn array(&self, key: &str, len: usize) -> Result<&[Value]> {
        let array = self
            .lookup(key)?
            .as_array()
            .ok_or_else(|| self.mismatch(key, "array"))?;
        if array.len() != len {
            return Err(Error::ArrayLengthMismatch {
                path: join_path(&self.path, key),
                expected: len,
                actual: array.len(),
            });
        }
        Ok(array)
    }

    fn doubles(&self, key: &str, len: usize) -> Result<impl Iterator<Item = Result<f64>> + '_> {
        let array = self.array(key, len)?;
        let path = join_path(&self.path, key);
        Ok(array.iter().map(move |v| {
            v.as_f64().ok_or_else(|| Error::TypeMismatch {
                path: path.clone(),
                expected: "number array",
            })
        }))
    }
}

impl ModelImporter for JsonImporter<'_> {
    fn get_int(&self, key: &str) -> Result<i64> {
        self.lookup(key)?
            .as_i64()
            .ok_or_else(|| self.mismatch(key, "integer"))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn get_float(&self, key: &str) -> Result<f32> {
        self.get_double(key).map(|v| v as f32)
    }

    fn get_double(&self, key: &str) -> Result<f64> {
        self.lookup(key)?
            .as_f64()
            .ok_or_else(|| self.mismatch(key, "number"))
    }

    fn get_int_array(&self, key: &str, out: &mut [i64]) -> Result<()> {
        let array = self.array(key, out.len())?;
        for (slot, value) in out.iter_mut().zip(array) {
            *slot = value
                .as_i64()
                .ok_or_else(|| self.mismatch(key, "integer array"))?;
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn get_float_array(&self, key: &str, out: &mut [f32]) -> Result<()> {
        let values = self.doubles(key, out.len())?;
        for (slot, value) in out.iter_mut().zip(values) {
            *slot = value? as f32;
        }
        Ok(())
    }

    fn get_double_array(&self, key: &str, out: &mut [f64]) -> Result<()> {
        let values = self.doubles(key, out.len())?;
        for (slot, value) in out.iter_mut().zip(values) {
            *slot = value?;
        }
        Ok(())
    }

    fn array_len(&self, key: &str) -> Result<usize> {
        self.lookup(key)?
            .as_array()
            .map(Vec::len)
            .ok_or_else(|| self.mismatch(key, "array"))
    }

    fn get_child(&self, key: Key<'_>) -> Result<Box<dyn ModelImporter + '_>> {
        let name = key.to_string();
        let child = self
            .lookup(&name)?
            .as_object()
            .ok_or_else(|| self.mismatch(&name, "object"))?;
        Ok(Box::new(JsonImporter {
            node: child,
            path: join_path(&self.path, &name),
        }))
    }
}
