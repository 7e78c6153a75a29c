//! Bidirectional mapping between typed values and a flat, path-addressed
//! key/value store.
//!
//! A [`Schema`] is synthesized once per type from its [`Described`]
//! descriptor. [`resolve_value`] rebuilds a value from any [`FlatSource`];
//! [`flatten_value`] writes a value into a [`FlatMap`]. Typed callers go
//! through [`FlatModel`].
pub mod path;
pub mod ordered;
pub mod scalar;
pub mod error;
pub mod store;
pub mod schema;
pub mod resolve;
pub mod flatten;
pub mod path_de;
pub mod model;
pub mod remote;
pub mod orchestrator;
pub mod jq_exec;
pub mod cli;

pub use error::{ApiError, DecodeError, FlattenError, MapError, ResolveError, SchemaError, SetupError, StoreError};
pub use flatten::{flatten_value, flatten_value_with, FlattenOptions};
pub use model::{FlatModel, UnknownFields};
pub use path::AddressPath;
pub use resolve::resolve_value;
pub use scalar::{Scalar, ScalarKind};
pub use schema::{schema_of, Described, Discriminator, ObjectDesc, PolyDesc, Schema, TypeDesc};
pub use store::{FlatMap, FlatSource};
