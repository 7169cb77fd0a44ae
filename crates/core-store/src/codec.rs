//! Record codec: dot-path field lists and their nested JSON form
//!
//! Records are written as a flat list of `(path, value)` pairs where the path
//! uses `.` to address nested objects (`command.name`). The store nests these
//! pairs into one JSON object per entry; readers get the nested object back
//! and can flatten it again.

use crate::error::Result;
use serde_json::{Map, Value};

/// Ordered list of dot-path fields
///
/// Order matters: when two paths collide, the later one wins once nested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: Vec<(String, Value)>,
}

impl Fields {
    /// Create an empty field list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field
    pub fn add(&mut self, path: impl Into<String>, value: impl Into<Value>) {
        self.entries.push((path.into(), value.into()));
    }

    /// Builder form of [`Fields::add`]
    pub fn with(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add(path, value);
        self
    }

    /// Replace the value of an existing path, or append it
    pub fn set(&mut self, path: impl Into<String>, value: impl Into<Value>) {
        let path = path.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(p, _)| *p == path) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((path, value)),
        }
    }

    /// Look up the last value written for a path
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.entries
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, v)| v)
    }

    /// Append every field of `other` after the current ones
    pub fn extend(&mut self, other: Fields) {
        self.entries.extend(other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(p, v)| (p.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<P: Into<String>, V: Into<Value>> FromIterator<(P, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (P, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (path, value) in iter {
            fields.add(path, value);
        }
        fields
    }
}

/// Anything that can be appended to the log
pub trait Record {
    /// Identity of the record within one log; later appends with the same
    /// key supersede earlier ones
    fn key(&self) -> String;

    /// Flat field list written as the entry's data
    fn to_fields(&self) -> Fields;
}

/// Anything that can be read back from a stored data object
pub trait FromFields: Sized {
    fn from_fields(data: &Map<String, Value>) -> Result<Self>;
}

/// Insert `value` at a dot path, creating intermediate objects
///
/// Intermediate segments that hold a non-object value are replaced.
pub fn insert_path(map: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = map;

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }

        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(inner) = slot else {
            return;
        };
        current = inner;
    }
}

/// Nest a flat field list into one JSON object
pub fn nest(fields: &Fields) -> Map<String, Value> {
    let mut map = Map::new();
    for (path, value) in fields.iter() {
        insert_path(&mut map, path, value.clone());
    }
    map
}

/// Flatten a nested JSON object back into dot-path fields
///
/// Arrays and scalars are leaves; empty objects produce no field.
pub fn flatten(map: &Map<String, Value>) -> Fields {
    let mut fields = Fields::new();
    flatten_into(&mut fields, None, map);
    fields
}

fn flatten_into(fields: &mut Fields, prefix: Option<&str>, map: &Map<String, Value>) {
    for (name, value) in map {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, name),
            None => name.clone(),
        };
        match value {
            Value::Object(inner) => flatten_into(fields, Some(&path), inner),
            leaf => fields.add(path, leaf.clone()),
        }
    }
}
