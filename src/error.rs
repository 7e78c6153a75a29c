//! Error types, one per layer.
use crate::scalar::ScalarKind;

/// Raised while turning a type descriptor into a schema. These describe a
/// broken type definition, not bad data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("{at}: type `{ty}` has no flat-store representation")]
    Unsupported { at: String, ty: String },
    #[error("{at}: collection of collections needs object elements")]
    NestedCollection { at: String },
    #[error("{at}: discriminator value `{value}` selects both `{first}` and `{second}`")]
    AmbiguousVariant { at: String, value: String, first: String, second: String },
    #[error("{at}: polymorphic type `{ty}` declares no variants")]
    EmptyPolymorphic { at: String, ty: String },
    #[error("{at}: `{ty}` must be an object to be embedded or used as a variant")]
    NotAnObject { at: String, ty: String },
    #[error("{at}: field name `{field}` is declared twice")]
    DuplicateField { at: String, field: String },
    #[error("{at}: map element object declares reserved field `key`")]
    MapKeyCollision { at: String },
    #[error("{at}: type nesting exceeds {limit} levels (recursive type?)")]
    TooDeep { at: String, limit: usize },
    #[error("{at}: `{name}` is not a usable address segment (empty, dotted, `#` or all digits)")]
    BadName { at: String, name: String },
    #[error("{at}: variant `{variant}` redeclares field `{field}` with a different shape")]
    ConflictingVariantField { at: String, field: String, variant: String },
    #[error("{at}: embedded field `{field}` has no address of its own to alias")]
    EmbeddedAlias { at: String, field: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("`{path}`: collection of {len} elements has no single value; index it first")]
    AmbiguousRoot { path: String, len: usize },
    #[error("`{path}`: element count must be a non-negative integer, found `{found}`")]
    BadCount { path: String, found: String },
    #[error("`{path}`: count {count} exceeds the {entries} entries in the store")]
    UnbackedCount { path: String, count: usize, entries: usize },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("`{path}`: expected {expected}, found {found} `{value}`")]
    TypeMismatch { path: String, expected: ScalarKind, found: ScalarKind, value: String },
    #[error("`{path}`: map entry has no string key")]
    MissingMapKey { path: String },
    #[error("`{path}`: {count} elements exceed the maximum of {max}")]
    TooManyItems { path: String, count: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FlattenError {
    #[error("`{path}`: expected {expected}, found {found}")]
    TypeMismatch { path: String, expected: String, found: String },
    #[error("`{path}`: required value is missing")]
    MissingRequired { path: String },
    #[error("`{path}`: {count} elements exceed the maximum of {max}")]
    TooManyItems { path: String, count: usize, max: usize },
}

/// Typed decode failure with the JSON path it happened at.
#[derive(Debug, thiserror::Error)]
#[error("at JSON path {path} → {source}")]
pub struct DecodeError {
    pub path: String,
    #[source]
    pub source: serde_json::Error,
}

/// Everything a per-type marshal/unmarshal call can fail with.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("resolve: {0}")]
    Resolve(#[from] ResolveError),
    #[error("flatten: {0}")]
    Flatten(#[from] FlattenError),
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),
    #[error("encode: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Failures talking to the remote configuration API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{method} {path}: expected status {expected}, got {status}")]
    UnexpectedStatus { method: String, path: String, expected: u16, status: u16, body: String },
    #[error("{method} {path}: {message}")]
    Transport { method: String, path: String, message: String },
    #[error("{kind} has no id and cannot be {action}")]
    MissingId { kind: &'static str, action: &'static str },
    #[error(transparent)]
    Map(#[from] MapError),
}

/// A per-kind setup step that did not complete. The kind stays unstarted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SetupError {
    #[error("manager for `{kind}`: {message}")]
    Manager { kind: String, message: String },
    #[error("webhook for `{kind}`: {message}")]
    Webhook { kind: String, message: String },
}
