//! Snapshot cursors over the latest entry of each key

use crate::codec::{flatten, Fields, FromFields, Record};
use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::vec;

/// Latest stored state of one key
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: String,
    pub data: Map<String, Value>,
    pub processed: bool,
}

impl StoredRecord {
    /// Decode the stored data into a typed record
    pub fn decode<T: FromFields>(&self) -> Result<T> {
        T::from_fields(&self.data).map_err(|e| Error::decode(&self.key, e))
    }

    /// Read a top-level or dotted field from the stored data
    pub fn field(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = self.data.get(segments.next()?)?;
        segments.try_fold(first, |value, segment| value.get(segment))
    }
}

/// Stored records re-append verbatim, which is how they get marked processed
impl Record for StoredRecord {
    fn key(&self) -> String {
        self.key.clone()
    }

    fn to_fields(&self) -> Fields {
        flatten(&self.data)
    }
}

/// Forward-only iterator over a snapshot taken when the cursor was created
///
/// Appends made after the snapshot are not visible through it.
#[derive(Debug)]
pub struct Cursor {
    items: vec::IntoIter<StoredRecord>,
}

impl Cursor {
    pub fn new(items: Vec<StoredRecord>) -> Self {
        Self {
            items: items.into_iter(),
        }
    }

    /// Decode every remaining record, stopping at the first failure
    pub fn decode_all<T: FromFields>(self) -> Result<Vec<T>> {
        self.map(|record| record.decode()).collect()
    }

    /// Nested data objects of every remaining record
    pub fn into_data(self) -> Vec<Map<String, Value>> {
        self.map(|record| record.data).collect()
    }
}

impl Iterator for Cursor {
    type Item = StoredRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl ExactSizeIterator for Cursor {}
