//! Per-type marshal/unmarshal contract.
//!
//! Any type that is [`Described`] and round-trips through serde gets
//! [`FlatModel`] for free: flat-store conversion goes through its
//! synthesized schema, wire conversion through serde_json.
//!
//! Wire properties a type does not model are kept by embedding an
//! [`UnknownFields`] bucket with `#[serde(flatten)]`; it is re-emitted
//! next to the modeled properties on encode.
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MapError, SchemaError};
use crate::flatten::{flatten_value_with, FlattenOptions};
use crate::path_de::{from_slice_with_path, from_value_with_path};
use crate::resolve::resolve_value;
use crate::schema::{schema_of, Described, Schema};
use crate::store::{FlatMap, FlatSource};

pub trait FlatModel: Described + Serialize + DeserializeOwned + 'static {
    fn schema() -> Result<Arc<Schema>, SchemaError> {
        schema_of::<Self>()
    }

    fn to_flat(&self) -> Result<FlatMap, MapError> {
        self.to_flat_with(FlattenOptions::default())
    }

    fn to_flat_with(&self, options: FlattenOptions) -> Result<FlatMap, MapError> {
        let schema = Self::schema()?;
        let value = serde_json::to_value(self).map_err(MapError::Encode)?;
        Ok(flatten_value_with(&schema, &value, options)?)
    }

    fn from_flat<S: FlatSource + ?Sized>(source: &S) -> Result<Self, MapError> {
        let schema = Self::schema()?;
        let value = resolve_value(&schema, source)?
            .or_else(|| schema.zero_value())
            .unwrap_or(Value::Null);
        Ok(from_value_with_path(value)?)
    }

    fn to_wire(&self) -> Result<Vec<u8>, MapError> {
        serde_json::to_vec(self).map_err(MapError::Encode)
    }

    fn from_wire(bytes: &[u8]) -> Result<Self, MapError> {
        Ok(from_slice_with_path(bytes)?)
    }
}

impl<T> FlatModel for T where T: Described + Serialize + DeserializeOwned + 'static {}

// ---------------------------- Unknown fields ------------------------------ //

/// Wire properties not claimed by any modeled field, in arrival order.
///
/// Only decoding fills the bucket, so it never holds a modeled property
/// name and re-encoding cannot shadow a modeled value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnknownFields(IndexMap<String, Value>);

impl UnknownFields {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ------------------------------- Tests ------------------------------------ //
