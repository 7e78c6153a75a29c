//! JSON value → flat store, driven by a schema.
//!
//! Lists keep their element order. Sets and maps have no order of their own,
//! so each one is written in a canonical order (maps by key, sets by the
//! element's JSON text); flattening equal values always yields equal stores.
use serde_json::{Map, Value};

use crate::error::FlattenError;
use crate::path::AddressPath;
use crate::scalar::{json_type_name, Scalar};
use crate::schema::{CollectionSchema, MapSchema, ObjectSchema, PolySchema, Schema, VariantSchema, MAP_KEY_FIELD, MAP_VALUES_FIELD};
use crate::store::FlatMap;

#[derive(Clone, Copy, Debug, Default)]
pub struct FlattenOptions {
    /// Leave out fields the remote side computes.
    pub omit_computed: bool,
}

pub fn flatten_value(schema: &Schema, value: &Value) -> Result<FlatMap, FlattenError> {
    flatten_value_with(schema, value, FlattenOptions::default())
}

pub fn flatten_value_with(schema: &Schema, value: &Value, options: FlattenOptions) -> Result<FlatMap, FlattenError> {
    let mut store = FlatMap::new();
    Flattener::new(&mut store, options).flatten(schema, value, &AddressPath::root(), false)?;
    Ok(store)
}

fn mismatch(path: &AddressPath, expected: impl Into<String>, found: &Value) -> FlattenError {
    FlattenError::TypeMismatch {
        path: path.to_string(),
        expected: expected.into(),
        found: json_type_name(found).to_string(),
    }
}

pub struct Flattener<'a> {
    store: &'a mut FlatMap,
    options: FlattenOptions,
}

impl<'a> Flattener<'a> {
    pub fn new(store: &'a mut FlatMap, options: FlattenOptions) -> Self {
        Self { store, options }
    }

    /// Write `value` at `path`. `sliced` marks a collection element, whose
    /// members go directly under `path`. Null writes nothing.
    pub fn flatten(&mut self, schema: &Schema, value: &Value, path: &AddressPath, sliced: bool) -> Result<(), FlattenError> {
        if value.is_null() {
            return Ok(());
        }
        match schema {
            Schema::Scalar { scalar } => {
                let s = Scalar::from_json_as(value, *scalar).ok_or_else(|| mismatch(path, scalar.to_string(), value))?;
                self.store.set(path, s);
                Ok(())
            }
            Schema::List(c) => {
                let Value::Array(xs) = value else { return Err(mismatch(path, "array", value)) };
                self.elements(c, xs.iter().collect(), path)
            }
            Schema::Set(c) => {
                let Value::Array(xs) = value else { return Err(mismatch(path, "array", value)) };
                let mut keyed: Vec<(String, &Value)> = xs.iter().map(|x| (x.to_string(), x)).collect();
                keyed.sort_by(|a, b| a.0.cmp(&b.0));
                tracing::trace!(at = %path, len = keyed.len(), "set elements ordered");
                self.elements(c, keyed.into_iter().map(|(_, x)| x).collect(), path)
            }
            Schema::Map(m) => {
                let Value::Object(members) = value else { return Err(mismatch(path, "object", value)) };
                self.map(m, members, path)
            }
            Schema::Object(obj) => {
                let Value::Object(members) = value else { return Err(mismatch(path, "object", value)) };
                let base = self.open_block(path, sliced);
                self.members(obj, members, &base)
            }
            Schema::Polymorphic(poly) => {
                let Value::Object(members) = value else { return Err(mismatch(path, "object", value)) };
                let shape = match variant_of(poly, members) {
                    Some(variant) => &variant.schema,
                    None => {
                        tracing::debug!(ty = %poly.name, at = %path, "no variant matched, writing base shape");
                        &poly.base
                    }
                };
                let base = self.open_block(path, sliced);
                self.members(shape, members, &base)
            }
        }
    }

    /// Members of a nested object live in the block `<path>.0`, marked by a
    /// count of one. Elements and the root need no block.
    fn open_block(&mut self, path: &AddressPath, sliced: bool) -> AddressPath {
        if sliced || path.is_root() {
            path.clone()
        } else {
            self.store.set_count(path, 1);
            path.index(0)
        }
    }

    fn elements(&mut self, c: &CollectionSchema, xs: Vec<&Value>, path: &AddressPath) -> Result<(), FlattenError> {
        if let Some(max) = c.max_items {
            if xs.len() > max {
                return Err(FlattenError::TooManyItems { path: path.to_string(), count: xs.len(), max });
            }
        }
        self.store.set_count(path, xs.len());
        for (i, x) in xs.into_iter().enumerate() {
            let at = path.index(i);
            let elem = match &c.wrapper {
                Some(wire) => match x {
                    Value::Object(m) => m.get(wire).unwrap_or(&Value::Null),
                    other => return Err(mismatch(&at, format!("object with `{wire}`"), other)),
                },
                None => x,
            };
            self.flatten(&c.elem, elem, &at, true)?;
        }
        Ok(())
    }

    fn map(&mut self, m: &MapSchema, members: &Map<String, Value>, path: &AddressPath) -> Result<(), FlattenError> {
        let mut entries: Vec<(&String, &Value)> = members.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        self.store.set_count(path, entries.len());
        for (i, (key, value)) in entries.into_iter().enumerate() {
            let entry = path.index(i);
            self.store.set(&entry.append(MAP_KEY_FIELD), key.as_str());
            if m.elem.is_object_like() {
                self.flatten(&m.elem, value, &entry, true)?;
            } else {
                self.flatten(&m.elem, value, &entry.append(MAP_VALUES_FIELD), false)?;
            }
        }
        Ok(())
    }

    fn members(&mut self, obj: &ObjectSchema, members: &Map<String, Value>, base: &AddressPath) -> Result<(), FlattenError> {
        for field in &obj.fields {
            if field.computed && self.options.omit_computed {
                continue;
            }
            let mut at = base.append(&field.name);
            let value = match members.get(&field.wire_name) {
                None | Some(Value::Null) if !field.optional => {
                    return Err(FlattenError::MissingRequired { path: at.to_string() });
                }
                None | Some(Value::Null) => continue,
                Some(v) => v,
            };
            if let (Schema::Polymorphic(poly), Value::Object(m)) = (&field.schema, value) {
                if let Some(seg) = variant_of(poly, m).and_then(|v| v.segment.as_deref()) {
                    at = at.with_last_replaced(seg);
                }
            }
            self.flatten(&field.schema, value, &at, false)?;
        }
        Ok(())
    }
}

/// Variant selected by the discriminator held in `members`.
fn variant_of<'p>(poly: &'p PolySchema, members: &Map<String, Value>) -> Option<&'p VariantSchema> {
    let tag = members.get(&poly.discriminator.wire_name)?.as_str()?;
    poly.variant_for(tag)
}

// ------------------------------- Tests ------------------------------------ //
