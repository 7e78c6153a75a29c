//! Non-canonical backings behind the [`FlatSource`] contract.
//!
//! Each adapter exposes an already-decoded value as if it were a flat store
//! rooted at the empty path.
use indexmap::IndexSet;
use serde_json::Value;

use super::FlatSource;
use crate::error::StoreError;
use crate::path::{AddressPath, Segment};
use crate::scalar::Scalar;

/// A single decoded value.
#[derive(Clone, Debug, Default)]
pub struct ScalarSource {
    value: Option<Scalar>,
}

impl ScalarSource {
    pub fn new(value: impl Into<Scalar>) -> Self {
        Self { value: Some(value.into()) }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl FlatSource for ScalarSource {
    fn get(&self, path: &AddressPath) -> Result<Option<Scalar>, StoreError> {
        Ok(if path.is_root() { self.value.clone() } else { None })
    }

    fn count(&self, _path: &AddressPath) -> Result<Option<usize>, StoreError> {
        Ok(None)
    }
}

/// Root-level reads shared by the array and set adapters: a lone element
/// answers for the whole collection, more than one is ambiguous.
fn element_read(path: &AddressPath, items: &[Scalar]) -> Result<Option<Scalar>, StoreError> {
    match path.segments() {
        [] => match items {
            [] => Ok(None),
            [only] => Ok(Some(only.clone())),
            _ => Err(StoreError::AmbiguousRoot { path: path.to_string(), len: items.len() }),
        },
        [Segment::Index(i)] => Ok(items.get(*i).cloned()),
        _ => Ok(None),
    }
}

/// A homogeneous, ordered array of scalars.
#[derive(Clone, Debug, Default)]
pub struct ArraySource {
    items: Vec<Scalar>,
}

impl ArraySource {
    pub fn new<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Scalar>,
    {
        Self { items: items.into_iter().map(Into::into).collect() }
    }
}

impl FlatSource for ArraySource {
    fn get(&self, path: &AddressPath) -> Result<Option<Scalar>, StoreError> {
        element_read(path, &self.items)
    }

    fn count(&self, path: &AddressPath) -> Result<Option<usize>, StoreError> {
        Ok(if path.is_root() { Some(self.items.len()) } else { None })
    }
}

/// An unordered set of scalars. Elements are indexed in sorted order so the
/// same set always yields the same addresses.
#[derive(Clone, Debug, Default)]
pub struct SetSource {
    items: Vec<Scalar>,
}

impl SetSource {
    pub fn new<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Scalar>,
    {
        let unique: IndexSet<Scalar> = items.into_iter().map(Into::into).collect();
        let mut items: Vec<Scalar> = unique.into_iter().collect();
        items.sort();
        Self { items }
    }
}

impl FlatSource for SetSource {
    fn get(&self, path: &AddressPath) -> Result<Option<Scalar>, StoreError> {
        element_read(path, &self.items)
    }

    fn count(&self, path: &AddressPath) -> Result<Option<usize>, StoreError> {
        Ok(if path.is_root() { Some(self.items.len()) } else { None })
    }
}

/// A nested key/value tree shaped like the address space: named segments
/// select object members, index segments select array elements, and arrays
/// report their length as the count.
#[derive(Clone, Debug)]
pub struct NestedSource<'a> {
    root: &'a Value,
}

impl<'a> NestedSource<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    fn lookup(&self, path: &AddressPath) -> Option<&'a Value> {
        let mut cur = self.root;
        for seg in path.segments() {
            cur = match (seg, cur) {
                (Segment::Field(name), Value::Object(members)) => members.get(name)?,
                (Segment::Index(i), Value::Array(xs)) => xs.get(*i)?,
                _ => return None,
            };
        }
        Some(cur)
    }
}

impl FlatSource for NestedSource<'_> {
    fn get(&self, path: &AddressPath) -> Result<Option<Scalar>, StoreError> {
        match self.lookup(path) {
            Some(Value::Array(xs)) if path.is_root() && xs.len() > 1 => {
                Err(StoreError::AmbiguousRoot { path: path.to_string(), len: xs.len() })
            }
            Some(leaf) => Ok(Scalar::from_json(leaf)),
            None => Ok(None),
        }
    }

    fn count(&self, path: &AddressPath) -> Result<Option<usize>, StoreError> {
        Ok(match self.lookup(path) {
            Some(Value::Array(xs)) => Some(xs.len()),
            _ => None,
        })
    }
}
