//! Operator attributes and attribute schemas.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single attribute value attached to a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Str(String),
    Ints(Vec<i64>),
}

impl AttrValue {
    pub fn kind(&self) -> AttrKind {
        match self {
            AttrValue::Int(_) => AttrKind::Int,
            AttrValue::Float(_) => AttrKind::Float,
            AttrValue::Str(_) => AttrKind::Str,
            AttrValue::Ints(_) => AttrKind::Ints,
        }
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self {
        AttrValue::Ints(v)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v:?}"),
            AttrValue::Str(v) => write!(f, "{v:?}"),
            AttrValue::Ints(v) => write!(f, "{v:?}"),
        }
    }
}

/// The kind of value an attribute slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKind {
    Int,
    Float,
    Str,
    Ints,
}

/// One entry of an operator's attribute schema.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrSpec {
    pub name: String,
    pub kind: AttrKind,
    /// `None` marks the attribute as required.
    pub default: Option<AttrValue>,
}

impl AttrSpec {
    /// An attribute every call must supply.
    pub fn required(name: &str, kind: AttrKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            default: None,
        }
    }

    /// An attribute that falls back to `default` when omitted.
    pub fn optional(name: &str, default: impl Into<AttrValue>) -> Self {
        let default = default.into();
        Self {
            name: name.to_string(),
            kind: default.kind(),
            default: Some(default),
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Attribute map of a call, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attrs(BTreeMap<String, AttrValue>);

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<AttrValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn require(&self, key: &str) -> Result<&AttrValue> {
        self.get(key)
            .ok_or_else(|| Error::InvalidAttribute(format!("Missing attribute: {key}")))
    }

    /// Get an integer attribute.
    pub fn int(&self, key: &str) -> Result<i64> {
        match self.require(key)? {
            AttrValue::Int(v) => Ok(*v),
            _ => Err(Error::InvalidAttribute(format!(
                "Attribute {key} is not an int"
            ))),
        }
    }

    /// Get a float attribute.
    pub fn float(&self, key: &str) -> Result<f64> {
        match self.require(key)? {
            AttrValue::Float(v) => Ok(*v),
            _ => Err(Error::InvalidAttribute(format!(
                "Attribute {key} is not a float"
            ))),
        }
    }

    /// Get a string attribute.
    pub fn str(&self, key: &str) -> Result<&str> {
        match self.require(key)? {
            AttrValue::Str(v) => Ok(v),
            _ => Err(Error::InvalidAttribute(format!(
                "Attribute {key} is not a string"
            ))),
        }
    }

    /// Get an integer-list attribute.
    pub fn ints(&self, key: &str) -> Result<&[i64]> {
        match self.require(key)? {
            AttrValue::Ints(v) => Ok(v),
            _ => Err(Error::InvalidAttribute(format!(
                "Attribute {key} is not an int list"
            ))),
        }
    }

    /// Check these attributes against `schema`, filling in defaults.
    ///
    /// Unknown keys, missing required attributes, and values of the wrong
    /// kind are rejected.
    pub fn resolve(&self, operator: &str, schema: &[AttrSpec]) -> Result<Attrs> {
        for key in self.0.keys() {
            if !schema.iter().any(|spec| &spec.name == key) {
                return Err(Error::InvalidAttribute(format!(
                    "Operator '{operator}' has no attribute '{key}'"
                )));
            }
        }

        let mut resolved = Attrs::new();
        for spec in schema {
            let value = match (self.get(&spec.name), &spec.default) {
                (Some(value), _) => value.clone(),
                (None, Some(default)) => default.clone(),
                (None, None) => {
                    return Err(Error::InvalidAttribute(format!(
                        "Operator '{operator}' requires attribute '{}'",
                        spec.name
                    )));
                }
            };
            if value.kind() != spec.kind {
                return Err(Error::InvalidAttribute(format!(
                    "Attribute '{}' of operator '{operator}' expects {:?}, got {:?}",
                    spec.name,
                    spec.kind,
                    value.kind()
                )));
            }
            resolved.0.insert(spec.name.clone(), value);
        }
        Ok(resolved)
    }
}

impl fmt::Display for Attrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}
