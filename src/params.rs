//! Per-request parameter store.
//!
//! [`Params`] is an ordered, typed key-value bag filled in by the parser
//! chain and read by every later stage. Keys are kept sorted, which gives a
//! single canonical byte serialization ([`Params::canonical_bytes`]) no matter
//! in which order the parsers ran or the query string listed them. That
//! serialization feeds both the cache key and the ETag.

use crate::error::ParamError;
use std::collections::BTreeMap;
use std::fmt;

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
        }
    }

    /// Unambiguous encoding: one tag byte, then a length-prefixed or
    /// fixed-width payload.
    fn write_canonical(&self, out: &mut Vec<u8>) {
        match self {
            Value::Str(s) => {
                out.push(b's');
                write_len_prefixed(out, s.as_bytes());
            }
            Value::Int(i) => {
                out.push(b'i');
                out.extend_from_slice(&i.to_le_bytes());
            }
            Value::Float(f) => {
                out.push(b'f');
                // -0.0 and 0.0 compare equal and must hash equal
                let f = if *f == 0.0 { 0.0 } else { *f };
                out.extend_from_slice(&f.to_bits().to_le_bytes());
            }
            Value::Bool(b) => {
                out.push(b'b');
                out.push(u8::from(*b));
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

fn write_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(bytes);
}

/// Ordered parameter store. See the [module docs](self).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key. Each key has a single owner, so writing a key twice is an
    /// error rather than an overwrite.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> Result<(), ParamError> {
        if self.values.contains_key(key) {
            return Err(ParamError::Duplicate(key.to_string()));
        }
        self.values.insert(key.to_string(), value.into());
        Ok(())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Result<&Value, ParamError> {
        self.values
            .get(key)
            .ok_or_else(|| ParamError::Missing(key.to_string()))
    }

    pub fn get_str(&self, key: &str) -> Result<&str, ParamError> {
        match self.get(key)? {
            Value::Str(s) => Ok(s),
            _ => Err(wrong_type(key, "string")),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<i64, ParamError> {
        match self.get(key)? {
            Value::Int(i) => Ok(*i),
            _ => Err(wrong_type(key, "integer")),
        }
    }

    pub fn get_float(&self, key: &str) -> Result<f64, ParamError> {
        match self.get(key)? {
            Value::Float(f) => Ok(*f),
            _ => Err(wrong_type(key, "float")),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, ParamError> {
        match self.get(key)? {
            Value::Bool(b) => Ok(*b),
            _ => Err(wrong_type(key, "boolean")),
        }
    }

    /// Like [`get_str`](Self::get_str) but absent keys are `Ok(None)`.
    pub fn opt_str(&self, key: &str) -> Result<Option<&str>, ParamError> {
        if !self.has(key) {
            return Ok(None);
        }
        self.get_str(key).map(Some)
    }

    pub fn opt_int(&self, key: &str) -> Result<Option<i64>, ParamError> {
        if !self.has(key) {
            return Ok(None);
        }
        self.get_int(key).map(Some)
    }

    pub fn opt_float(&self, key: &str) -> Result<Option<f64>, ParamError> {
        if !self.has(key) {
            return Ok(None);
        }
        self.get_float(key).map(Some)
    }

    pub fn opt_bool(&self, key: &str) -> Result<Option<bool>, ParamError> {
        if !self.has(key) {
            return Ok(None);
        }
        self.get_bool(key).map(Some)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Canonical serialization: entry count, then every `(key, value)` pair in
    /// sorted key order, keys length-prefixed, values tagged.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.values.len() * 24);
        out.extend_from_slice(&(self.values.len() as u64).to_le_bytes());
        for (key, value) in &self.values {
            write_len_prefixed(&mut out, key.as_bytes());
            value.write_canonical(&mut out);
        }
        out
    }
}

fn wrong_type(key: &str, expected: &'static str) -> ParamError {
    ParamError::WrongType {
        key: key.to_string(),
        expected,
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        f.write_str("}")
    }
}
