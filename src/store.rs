//! Flat, address-keyed stores.
//!
//! [`FlatSource`] is the read contract the resolver walks. [`FlatMap`] is the
//! canonical store written by the flattener: rendered address → scalar, with
//! deterministic output order. Other backings live in [`adapters`].
pub mod adapters;

use std::collections::HashMap;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::ordered::OrderedStore;
use crate::path::AddressPath;
use crate::scalar::Scalar;

pub use adapters::{ArraySource, NestedSource, ScalarSource, SetSource};

// ------------------------------- Contract --------------------------------- //

pub trait FlatSource {
    /// Scalar stored at `path`, if any.
    fn get(&self, path: &AddressPath) -> Result<Option<Scalar>, StoreError>;

    /// Element count of the collection at `path`. `None` means no collection
    /// is there at all; `Some(0)` means declared but empty.
    fn count(&self, path: &AddressPath) -> Result<Option<usize>, StoreError>;

    /// Total number of stored entries, when the backing knows it. Counts
    /// larger than this cannot describe stored elements and are rejected
    /// before anything is walked.
    fn len_hint(&self) -> Option<usize> {
        None
    }

    /// The string elements of an unordered collection, in index order.
    /// Non-string and missing elements are skipped.
    fn string_set(&self, path: &AddressPath) -> Result<IndexSet<String>, StoreError> {
        let mut out = IndexSet::new();
        let Some(n) = backed_count(self, path)? else { return Ok(out) };
        for i in 0..n {
            if let Some(Scalar::String(s)) = self.get(&path.index(i))? {
                out.insert(s);
            }
        }
        Ok(out)
    }
}

impl<S: FlatSource + ?Sized> FlatSource for &S {
    fn get(&self, path: &AddressPath) -> Result<Option<Scalar>, StoreError> {
        (**self).get(path)
    }

    fn count(&self, path: &AddressPath) -> Result<Option<usize>, StoreError> {
        (**self).count(path)
    }

    fn len_hint(&self) -> Option<usize> {
        (**self).len_hint()
    }
}

/// Element count at `path`, refused when it exceeds what the store holds.
pub fn backed_count<S: FlatSource + ?Sized>(source: &S, path: &AddressPath) -> Result<Option<usize>, StoreError> {
    let count = source.count(path)?;
    if let (Some(n), Some(entries)) = (count, source.len_hint()) {
        if n > entries {
            return Err(StoreError::UnbackedCount { path: path.to_string(), count: n, entries });
        }
    }
    Ok(count)
}

/// Interpret a stored scalar as an element count.
pub(crate) fn count_from_scalar(path: &AddressPath, value: Option<&Scalar>) -> Result<Option<usize>, StoreError> {
    match value {
        None => Ok(None),
        Some(Scalar::Int(n)) if *n >= 0 => Ok(Some(*n as usize)),
        Some(other) => Err(StoreError::BadCount { path: path.to_string(), found: other.to_string() }),
    }
}

// -------------------------------- FlatMap --------------------------------- //

/// Rendered address → scalar, iterated in write order.
#[derive(Clone, Default)]
pub struct FlatMap {
    index: HashMap<String, i64>,
    entries: OrderedStore<Scalar>,
}

impl FlatMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write under a rendered key. Rewriting a key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Scalar>) {
        let key = key.into();
        let value = value.into();
        match self.index.get(&key) {
            Some(order) => {
                self.entries.insert(key, *order, value);
            }
            None => {
                let order = self.entries.insert_after_all(key.clone(), value);
                self.index.insert(key, order);
            }
        }
    }

    pub fn set(&mut self, path: &AddressPath, value: impl Into<Scalar>) {
        self.insert(path.to_string(), value);
    }

    pub fn set_count(&mut self, path: &AddressPath, n: usize) {
        self.insert(path.count_key(), Scalar::Int(n as i64));
    }

    pub fn get_raw(&self, key: &str) -> Option<&Scalar> {
        let order = self.index.get(key)?;
        self.entries.get(key, *order)
    }

    /// Entries in output order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.entries.iter().map(|(k, _, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(k, _)| k)
    }

    /// Merge another fragment behind this one. Keys present in both take the
    /// incoming value at their existing position.
    pub fn append(&mut self, other: FlatMap) {
        for (key, _, value) in other.entries {
            self.insert(key, value);
        }
    }

    /// Merge another fragment ahead of this one. Keys present in both keep
    /// their current value.
    pub fn prepend(&mut self, other: FlatMap) {
        let mut head = OrderedStore::new();
        for (key, _, value) in other.entries {
            if !self.index.contains_key(&key) {
                head.insert_after_all(key, value);
            }
        }
        self.entries.prepend(head);
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index = self.entries.iter().map(|(k, o, _)| (k.to_string(), o)).collect();
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.iter().map(|(k, v)| (k.to_string(), v.to_json())).collect())
    }
}

impl FlatSource for FlatMap {
    fn get(&self, path: &AddressPath) -> Result<Option<Scalar>, StoreError> {
        Ok(self.get_raw(&path.to_string()).cloned())
    }

    fn count(&self, path: &AddressPath) -> Result<Option<usize>, StoreError> {
        count_from_scalar(path, self.get_raw(&path.count_key()))
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.len())
    }
}

/// Content equality; output order is not compared.
impl PartialEq for FlatMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get_raw(k) == Some(v))
    }
}

impl fmt::Debug for FlatMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for FlatMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut out = FlatMap::new();
        for (k, v) in iter {
            out.insert(k, v);
        }
        out
    }
}

impl Serialize for FlatMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, &v.to_json())?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FlatMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FlatMapVisitor;

        impl<'de> Visitor<'de> for FlatMapVisitor {
            type Value = FlatMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of address keys to scalar values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FlatMap, A::Error> {
                let mut raw = IndexMap::<String, Value>::new();
                while let Some((k, v)) = access.next_entry::<String, Value>()? {
                    raw.insert(k, v);
                }
                let mut out = FlatMap::new();
                for (k, v) in raw {
                    let scalar = Scalar::from_json(&v).ok_or_else(|| {
                        de::Error::custom(format!("`{k}` holds a non-scalar value"))
                    })?;
                    out.insert(k, scalar);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(FlatMapVisitor)
    }
}

// ------------------------------- Tests ------------------------------------ //
