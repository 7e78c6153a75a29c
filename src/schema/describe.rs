//! Structural type descriptors.
//!
//! Types opt into the flat store by implementing [`Described`]. Containers
//! and primitives are covered here; structs and discriminated unions build
//! their descriptor with [`ObjectDesc`] and [`PolyDesc`]:
//!
//! ```
//! use flatmap_bridge::schema::{Described, ObjectDesc, TypeDesc};
//!
//! struct Rule { name: String, tags: Option<Vec<String>> }
//!
//! impl Described for Rule {
//!     fn describe() -> TypeDesc {
//!         ObjectDesc::new("Rule")
//!             .field::<String>("name", "name")
//!             .field::<Option<Vec<String>>>("tags", "tags")
//!             .into()
//!     }
//! }
//! ```
//!
//! Field descriptors hold `fn() -> TypeDesc` rather than the descriptor
//! itself, so describing a self-referential type terminates; the
//! synthesizer decides how deep to follow.
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};

use crate::scalar::ScalarKind;

pub trait Described {
    fn describe() -> TypeDesc;
}

#[derive(Clone, Debug)]
pub enum TypeDesc {
    Scalar(ScalarKind),
    Optional(Box<TypeDesc>),
    List(Box<TypeDesc>),
    Set(Box<TypeDesc>),
    /// String-keyed map.
    Map(Box<TypeDesc>),
    Object(ObjectDesc),
    Polymorphic(PolyDesc),
    /// A type with no flat representation; synthesis rejects it.
    Unsupported(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldRole {
    Plain,
    /// Members are promoted into the parent's own address space.
    Embedded,
}

#[derive(Clone, Debug)]
pub struct FieldDesc {
    pub name: &'static str,
    pub wire_name: &'static str,
    pub ty: fn() -> TypeDesc,
    pub role: FieldRole,
    pub computed: bool,
    pub aliases: Vec<&'static str>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct ObjectDesc {
    pub name: &'static str,
    pub fields: Vec<FieldDesc>,
}

#[derive(Clone, Debug)]
pub struct Discriminator {
    pub name: &'static str,
    pub wire_name: &'static str,
}

#[derive(Clone, Debug)]
pub struct VariantDesc {
    pub name: &'static str,
    pub values: Vec<&'static str>,
    pub segment: Option<&'static str>,
    pub ty: fn() -> TypeDesc,
}

#[derive(Clone, Debug)]
pub struct PolyDesc {
    pub name: &'static str,
    pub discriminator: Discriminator,
    pub variants: Vec<VariantDesc>,
    pub base: Option<fn() -> TypeDesc>,
}

// ------------------------------- Builders --------------------------------- //

impl ObjectDesc {
    pub fn new(name: &'static str) -> Self {
        Self { name, fields: Vec::new() }
    }

    fn push<T: Described>(mut self, name: &'static str, wire_name: &'static str, role: FieldRole) -> Self {
        self.fields.push(FieldDesc {
            name,
            wire_name,
            ty: T::describe,
            role,
            computed: false,
            aliases: Vec::new(),
            min_items: None,
            max_items: None,
        });
        self
    }

    /// A field stored at `name` in the flat store and `wire_name` on the wire.
    pub fn field<T: Described>(self, name: &'static str, wire_name: &'static str) -> Self {
        self.push::<T>(name, wire_name, FieldRole::Plain)
    }

    /// An embedded struct whose fields are spliced into this one. The Rust
    /// field must be `#[serde(flatten)]` so the wire form matches.
    pub fn embed<T: Described>(self, name: &'static str) -> Self {
        self.push::<T>(name, name, FieldRole::Embedded)
    }

    fn last_field(&mut self) -> &mut FieldDesc {
        self.fields
            .last_mut()
            .expect("field modifier used before any field was declared")
    }

    /// Legacy address for the last declared field. An embedded field has no
    /// address of its own, so aliasing one fails synthesis with
    /// `SchemaError::EmbeddedAlias`.
    pub fn alias(mut self, alias: &'static str) -> Self {
        self.last_field().aliases.push(alias);
        self
    }

    /// Mark the last declared field as computed by the remote side.
    pub fn computed(mut self) -> Self {
        self.last_field().computed = true;
        self
    }

    pub fn min_items(mut self, n: usize) -> Self {
        self.last_field().min_items = Some(n);
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.last_field().max_items = Some(n);
        self
    }
}

impl From<ObjectDesc> for TypeDesc {
    fn from(desc: ObjectDesc) -> Self {
        TypeDesc::Object(desc)
    }
}

impl Discriminator {
    pub fn new(name: &'static str, wire_name: &'static str) -> Self {
        Self { name, wire_name }
    }
}

impl PolyDesc {
    pub fn new(name: &'static str, discriminator: Discriminator) -> Self {
        Self { name, discriminator, variants: Vec::new(), base: None }
    }

    /// A variant selected when the discriminator holds one of `values`.
    pub fn variant<T: Described>(mut self, name: &'static str, values: &[&'static str]) -> Self {
        self.variants.push(VariantDesc { name, values: values.to_vec(), segment: None, ty: T::describe });
        self
    }

    /// Variant-specific address segment for the last declared variant.
    pub fn segment(mut self, segment: &'static str) -> Self {
        self.variants
            .last_mut()
            .expect("segment() used before any variant was declared")
            .segment = Some(segment);
        self
    }

    /// Shared base shape used when no variant matches.
    pub fn base<T: Described>(mut self) -> Self {
        self.base = Some(T::describe);
        self
    }
}

impl From<PolyDesc> for TypeDesc {
    fn from(desc: PolyDesc) -> Self {
        TypeDesc::Polymorphic(desc)
    }
}

// ---------------------------- Standard types ------------------------------ //

macro_rules! described_scalar {
    ($kind:ident: $($ty:ty),+) => {
        $(
            impl Described for $ty {
                fn describe() -> TypeDesc {
                    TypeDesc::Scalar(ScalarKind::$kind)
                }
            }
        )+
    };
}

described_scalar!(String: String);
described_scalar!(Bool: bool);
described_scalar!(Int: i8, i16, i32, i64, u8, u16, u32, u64, isize, usize);
described_scalar!(Float: f32, f64);

impl<T: Described> Described for Option<T> {
    fn describe() -> TypeDesc {
        TypeDesc::Optional(Box::new(T::describe()))
    }
}

impl<T: Described> Described for Box<T> {
    fn describe() -> TypeDesc {
        T::describe()
    }
}

impl<T: Described> Described for Vec<T> {
    fn describe() -> TypeDesc {
        TypeDesc::List(Box::new(T::describe()))
    }
}

impl<T: Described> Described for BTreeSet<T> {
    fn describe() -> TypeDesc {
        TypeDesc::Set(Box::new(T::describe()))
    }
}

impl<T: Described, S> Described for HashSet<T, S> {
    fn describe() -> TypeDesc {
        TypeDesc::Set(Box::new(T::describe()))
    }
}

impl<T: Described, S> Described for IndexSet<T, S> {
    fn describe() -> TypeDesc {
        TypeDesc::Set(Box::new(T::describe()))
    }
}

impl<T: Described> Described for BTreeMap<String, T> {
    fn describe() -> TypeDesc {
        TypeDesc::Map(Box::new(T::describe()))
    }
}

impl<T: Described, S> Described for HashMap<String, T, S> {
    fn describe() -> TypeDesc {
        TypeDesc::Map(Box::new(T::describe()))
    }
}

impl<T: Described, S> Described for IndexMap<String, T, S> {
    fn describe() -> TypeDesc {
        TypeDesc::Map(Box::new(T::describe()))
    }
}

impl Described for serde_json::Value {
    fn describe() -> TypeDesc {
        TypeDesc::Unsupported("serde_json::Value")
    }
}

impl Described for () {
    fn describe() -> TypeDesc {
        TypeDesc::Unsupported("()")
    }
}
