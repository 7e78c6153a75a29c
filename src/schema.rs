//! Declarative shape of a type as seen by the flat store.
//!
//! A [`Schema`] is synthesized once per type (see [`synth`]) from the type's
//! [`describe::TypeDesc`] and is immutable afterwards. Field lists keep
//! declaration order, which is also the order the flattener writes in.
pub mod describe;
pub mod synth;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::path::is_field_segment;
use crate::scalar::ScalarKind;

pub use describe::{Described, Discriminator, FieldDesc, ObjectDesc, PolyDesc, TypeDesc, VariantDesc};
pub use synth::{schema_of, synthesize};

/// Reserved member holding a map entry's key.
pub const MAP_KEY_FIELD: &str = "key";
/// Member holding a map entry's value when the value is not object-shaped.
pub const MAP_VALUES_FIELD: &str = "values";

// -------------------------------- Model ----------------------------------- //

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schema {
    Scalar { scalar: ScalarKind },
    List(CollectionSchema),
    Set(CollectionSchema),
    Map(MapSchema),
    Object(ObjectSchema),
    Polymorphic(PolySchema),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub elem: Box<Schema>,
    #[serde(default)]
    pub min_items: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    /// Wire name of the single field an element wrapper was collapsed from.
    /// Elements are stored unwrapped and re-wrapped on resolve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapper: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapSchema {
    pub elem: Box<Schema>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Address segment in the flat store.
    pub name: String,
    /// Property name in the wire / JSON form.
    pub wire_name: String,
    pub schema: Schema,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
    /// Legacy address names, tried in order after `name`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Embedded field this one was promoted from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_from: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscriminatorSchema {
    pub name: String,
    pub wire_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariantSchema {
    pub name: String,
    /// Discriminator values selecting this variant.
    pub values: Vec<String>,
    /// Address segment used instead of the field name when this variant is
    /// stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
    pub schema: ObjectSchema,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolySchema {
    pub name: String,
    pub discriminator: DiscriminatorSchema,
    pub variants: Vec<VariantSchema>,
    /// Structural fallback when no variant's discriminator matches.
    pub base: ObjectSchema,
}

// ------------------------------- Helpers ---------------------------------- //

impl Schema {
    pub fn scalar(kind: ScalarKind) -> Self {
        Schema::Scalar { scalar: kind }
    }

    pub fn list(elem: Schema) -> Self {
        Schema::List(CollectionSchema::of(elem))
    }

    pub fn set(elem: Schema) -> Self {
        Schema::Set(CollectionSchema::of(elem))
    }

    pub fn map(elem: Schema) -> Self {
        Schema::Map(MapSchema { elem: Box::new(elem) })
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Schema::List(_) | Schema::Set(_) | Schema::Map(_))
    }

    /// Objects and polymorphic values occupy an address block of their own
    /// members rather than a single leaf.
    pub fn is_object_like(&self) -> bool {
        matches!(self, Schema::Object(_) | Schema::Polymorphic(_))
    }

    pub fn element(&self) -> Option<&Schema> {
        match self {
            Schema::List(c) | Schema::Set(c) => Some(&c.elem),
            Schema::Map(m) => Some(&m.elem),
            _ => None,
        }
    }

    /// Value a required field takes when nothing is stored for it.
    /// Polymorphic values have no zero: no variant can be chosen.
    pub fn zero_value(&self) -> Option<Value> {
        match self {
            Schema::Scalar { scalar } => Some(scalar.zero().to_json()),
            Schema::List(_) | Schema::Set(_) => Some(Value::Array(Vec::new())),
            Schema::Map(_) => Some(Value::Object(Map::new())),
            Schema::Object(obj) => Some(Value::Object(obj.zero_members())),
            Schema::Polymorphic(_) => None,
        }
    }
}

impl CollectionSchema {
    pub fn of(elem: Schema) -> Self {
        Self { elem: Box::new(elem), min_items: 0, max_items: None, wrapper: None }
    }
}

impl ObjectSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), fields: Vec::new() }
    }

    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub(crate) fn zero_members(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for f in self.fields.iter().filter(|f| !f.optional) {
            if let Some(zero) = f.schema.zero_value() {
                out.insert(f.wire_name.clone(), zero);
            }
        }
        out
    }
}

impl FieldSchema {
    /// Field whose flat and wire names coincide.
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        let name = name.into();
        Self {
            wire_name: name.clone(),
            name,
            schema,
            optional: false,
            computed: false,
            aliases: Vec::new(),
            promoted_from: None,
        }
    }

    pub fn wire(mut self, wire_name: impl Into<String>) -> Self {
        self.wire_name = wire_name.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

impl PolySchema {
    /// Variant accepting `value` as its discriminator.
    pub fn variant_for(&self, value: &str) -> Option<&VariantSchema> {
        self.variants.iter().find(|v| v.values.iter().any(|x| x == value))
    }
}

// ------------------------------ Validation -------------------------------- //

impl Schema {
    /// Check what resolve and flatten rely on: every field name, alias,
    /// variant segment and discriminator is a usable address segment, names
    /// are unique per object, and the collection and polymorphic rules the
    /// synthesizer enforces also hold. Schemas read from JSON must pass this
    /// before use.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let at = match self {
            Schema::Object(o) => o.name.as_str(),
            Schema::Polymorphic(p) => p.name.as_str(),
            _ => "$",
        };
        validate_schema(self, at)
    }
}

fn check_name(name: &str, at: &str) -> Result<(), SchemaError> {
    if is_field_segment(name) {
        Ok(())
    } else {
        Err(SchemaError::BadName { at: at.to_string(), name: name.to_string() })
    }
}

fn validate_schema(schema: &Schema, at: &str) -> Result<(), SchemaError> {
    match schema {
        Schema::Scalar { .. } => Ok(()),
        Schema::List(c) | Schema::Set(c) => validate_element(&c.elem, at),
        Schema::Map(m) => {
            validate_element(&m.elem, at)?;
            if map_key_collides(&m.elem) {
                return Err(SchemaError::MapKeyCollision { at: at.to_string() });
            }
            Ok(())
        }
        Schema::Object(obj) => validate_object(obj, at),
        Schema::Polymorphic(poly) => validate_poly(poly, at),
    }
}

fn validate_element(elem: &Schema, at: &str) -> Result<(), SchemaError> {
    let at = format!("{at}[]");
    if elem.element().is_some_and(|inner| !inner.is_object_like()) {
        return Err(SchemaError::NestedCollection { at });
    }
    validate_schema(elem, &at)
}

fn validate_object(obj: &ObjectSchema, at: &str) -> Result<(), SchemaError> {
    for f in &obj.fields {
        let at_f = format!("{at}.{}", f.name);
        check_name(&f.name, at)?;
        for alias in &f.aliases {
            check_name(alias, &at_f)?;
        }
        validate_schema(&f.schema, &at_f)?;
    }
    check_unique(obj, at)
}

fn validate_poly(poly: &PolySchema, at: &str) -> Result<(), SchemaError> {
    if poly.variants.is_empty() {
        return Err(SchemaError::EmptyPolymorphic { at: at.to_string(), ty: poly.name.clone() });
    }
    check_name(&poly.discriminator.name, at)?;
    let mut claimed: HashMap<&str, &str> = HashMap::new();
    for v in &poly.variants {
        let at_v = format!("{at}<{}>", v.name);
        for value in &v.values {
            if let Some(first) = claimed.insert(value.as_str(), v.name.as_str()) {
                return Err(SchemaError::AmbiguousVariant {
                    at: at.to_string(),
                    value: value.clone(),
                    first: first.to_string(),
                    second: v.name.clone(),
                });
            }
        }
        if let Some(segment) = &v.segment {
            check_name(segment, &at_v)?;
        }
        validate_object(&v.schema, &at_v)?;
    }
    validate_object(&poly.base, &format!("{at}<base>"))
}

/// Flat and wire names must each be unique within one object.
pub(crate) fn check_unique(obj: &ObjectSchema, at: &str) -> Result<(), SchemaError> {
    let mut names = HashSet::new();
    let mut wire = HashSet::new();
    for f in &obj.fields {
        if !names.insert(f.name.as_str()) {
            return Err(SchemaError::DuplicateField { at: at.to_string(), field: f.name.clone() });
        }
        if !wire.insert(f.wire_name.as_str()) {
            return Err(SchemaError::DuplicateField { at: at.to_string(), field: f.wire_name.clone() });
        }
    }
    Ok(())
}

/// An object-like map element must leave the `key` member to the map.
pub(crate) fn map_key_collides(elem: &Schema) -> bool {
    match elem {
        Schema::Object(obj) => obj.field(MAP_KEY_FIELD).is_some(),
        Schema::Polymorphic(poly) => {
            poly.base.field(MAP_KEY_FIELD).is_some()
                || poly.variants.iter().any(|v| v.schema.field(MAP_KEY_FIELD).is_some())
        }
        _ => false,
    }
}
