//! Flat store → JSON value, driven by a schema.
//!
//! The output is the wire-shaped JSON value (members keyed by wire names)
//! that serde then decodes into the domain type. Absence is never an error:
//! it surfaces as `None` and, for required fields, as the field's zero
//! value. A stored value of the wrong kind is an error.
use serde_json::{Map, Value};

use crate::error::ResolveError;
use crate::path::AddressPath;
use crate::scalar::{Scalar, ScalarKind};
use crate::schema::{CollectionSchema, FieldSchema, MapSchema, ObjectSchema, PolySchema, Schema, MAP_KEY_FIELD, MAP_VALUES_FIELD};
use crate::store::{backed_count, FlatSource};

/// Resolve the value rooted at the empty path.
pub fn resolve_value<S: FlatSource + ?Sized>(schema: &Schema, source: &S) -> Result<Option<Value>, ResolveError> {
    Resolver::new(source).resolve(schema, &AddressPath::root(), false)
}

// ------------------------------ Candidates -------------------------------- //

/// One address a field may live at. `only` restricts a polymorphic field to
/// the variant that owns the address.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Candidate {
    pub path: AddressPath,
    pub only: Option<usize>,
}

/// Addresses of `field` under `parent`, in the order they are tried:
/// the primary name, then variant-specific segments, then legacy aliases.
pub(crate) fn candidates(field: &FieldSchema, parent: &AddressPath) -> Vec<Candidate> {
    let primary = parent.append(&field.name);
    let mut out = vec![Candidate { path: primary.clone(), only: None }];
    if let Schema::Polymorphic(poly) = &field.schema {
        for (i, v) in poly.variants.iter().enumerate() {
            if let Some(seg) = &v.segment {
                out.push(Candidate { path: primary.with_last_replaced(seg), only: Some(i) });
            }
        }
    }
    for alias in &field.aliases {
        out.push(Candidate { path: primary.with_last_replaced(alias), only: None });
    }
    out
}

// ------------------------------- Resolver --------------------------------- //

pub struct Resolver<'s, S: ?Sized> {
    source: &'s S,
}

impl<'s, S: FlatSource + ?Sized> Resolver<'s, S> {
    pub fn new(source: &'s S) -> Self {
        Self { source }
    }

    /// `sliced` is true when `path` addresses a collection element: the
    /// element's members sit directly under it and no presence probe is
    /// needed.
    pub fn resolve(&self, schema: &Schema, path: &AddressPath, sliced: bool) -> Result<Option<Value>, ResolveError> {
        match schema {
            Schema::Scalar { scalar } => self.scalar(*scalar, path),
            Schema::List(c) | Schema::Set(c) => self.collection(c, path),
            Schema::Map(m) => self.map(m, path),
            Schema::Object(obj) => self.object(obj, path, sliced),
            Schema::Polymorphic(poly) => {
                self.polymorphic(poly, &[Candidate { path: path.clone(), only: None }], sliced)
            }
        }
    }

    fn scalar(&self, kind: ScalarKind, path: &AddressPath) -> Result<Option<Value>, ResolveError> {
        match self.source.get(path)? {
            None => Ok(None),
            Some(found) if found.kind() == kind => Ok(Some(found.to_json())),
            Some(found) => Err(ResolveError::TypeMismatch {
                path: path.to_string(),
                expected: kind,
                found: found.kind(),
                value: found.to_string(),
            }),
        }
    }

    fn collection(&self, c: &CollectionSchema, path: &AddressPath) -> Result<Option<Value>, ResolveError> {
        let Some(n) = backed_count(self.source, path)? else { return Ok(None) };
        if let Some(max) = c.max_items {
            if n > max {
                return Err(ResolveError::TooManyItems { path: path.to_string(), count: n, max });
            }
        }
        let mut out = Vec::new();
        for i in 0..n {
            let elem = self
                .resolve(&c.elem, &path.index(i), true)?
                .or_else(|| c.elem.zero_value())
                .unwrap_or(Value::Null);
            out.push(match &c.wrapper {
                Some(wire) => Value::Object(Map::from_iter([(wire.clone(), elem)])),
                None => elem,
            });
        }
        Ok(Some(Value::Array(out)))
    }

    fn map(&self, m: &MapSchema, path: &AddressPath) -> Result<Option<Value>, ResolveError> {
        let Some(n) = backed_count(self.source, path)? else { return Ok(None) };
        let mut out = Map::new();
        for i in 0..n {
            let entry = path.index(i);
            let key = match self.source.get(&entry.append(MAP_KEY_FIELD))? {
                Some(Scalar::String(k)) => k,
                _ => return Err(ResolveError::MissingMapKey { path: entry.to_string() }),
            };
            let value = if m.elem.is_object_like() {
                self.resolve(&m.elem, &entry, true)?
            } else {
                self.resolve(&m.elem, &entry.append(MAP_VALUES_FIELD), false)?
            };
            out.insert(key, value.or_else(|| m.elem.zero_value()).unwrap_or(Value::Null));
        }
        Ok(Some(Value::Object(out)))
    }

    /// Where an object's members live: directly under an element or the
    /// root, otherwise in the single-element block `<path>.0`.
    fn block(path: &AddressPath, sliced: bool) -> AddressPath {
        if sliced || path.is_root() { path.clone() } else { path.index(0) }
    }

    fn object(&self, obj: &ObjectSchema, path: &AddressPath, sliced: bool) -> Result<Option<Value>, ResolveError> {
        if !sliced && !path.is_root() {
            // an object is present as a whole or not at all
            match self.source.count(path)? {
                None | Some(0) => return Ok(None),
                Some(_) => {}
            }
        }
        let members = self.members(obj, &Self::block(path, sliced))?;
        Ok(Some(Value::Object(members)))
    }

    fn members(&self, obj: &ObjectSchema, base: &AddressPath) -> Result<Map<String, Value>, ResolveError> {
        let mut out = Map::new();
        for field in &obj.fields {
            match self.field(field, base)? {
                Some(v) => {
                    out.insert(field.wire_name.clone(), v);
                }
                None if !field.optional => {
                    if let Some(zero) = field.schema.zero_value() {
                        out.insert(field.wire_name.clone(), zero);
                    }
                }
                None => {}
            }
        }
        Ok(out)
    }

    fn field(&self, field: &FieldSchema, parent: &AddressPath) -> Result<Option<Value>, ResolveError> {
        let cands = candidates(field, parent);
        if let Schema::Polymorphic(poly) = &field.schema {
            return self.polymorphic(poly, &cands, false);
        }
        for (i, cand) in cands.iter().enumerate() {
            if let Some(v) = self.resolve(&field.schema, &cand.path, false)? {
                if i > 0 {
                    tracing::debug!(field = %field.name, at = %cand.path, "resolved through alias address");
                }
                return Ok(Some(v));
            }
        }
        Ok(None)
    }

    fn polymorphic(&self, poly: &PolySchema, cands: &[Candidate], sliced: bool) -> Result<Option<Value>, ResolveError> {
        // 1) discriminator match, candidate by candidate
        for cand in cands {
            let at = Self::block(&cand.path, sliced);
            let tag_path = at.append(&poly.discriminator.name);
            let tag = match self.source.get(&tag_path)? {
                None => continue,
                Some(Scalar::String(tag)) => tag,
                Some(other) => {
                    return Err(ResolveError::TypeMismatch {
                        path: tag_path.to_string(),
                        expected: ScalarKind::String,
                        found: other.kind(),
                        value: other.to_string(),
                    });
                }
            };
            let matched = poly
                .variants
                .iter()
                .enumerate()
                .filter(|(i, _)| cand.only.is_none_or(|only| only == *i))
                .find(|(_, v)| v.values.iter().any(|x| *x == tag));
            if let Some((_, variant)) = matched {
                tracing::trace!(variant = %variant.name, at = %at, "discriminator matched");
                return Ok(Some(Value::Object(self.members(&variant.schema, &at)?)));
            }
        }

        // 2) structural fallback on the generic addresses
        for cand in cands.iter().filter(|c| c.only.is_none()) {
            if self.block_present(poly, &cand.path, sliced)? {
                tracing::debug!(ty = %poly.name, at = %cand.path, "no variant matched, resolving base shape");
                let at = Self::block(&cand.path, sliced);
                return Ok(Some(Value::Object(self.members(&poly.base, &at)?)));
            }
        }
        Ok(None)
    }

    fn block_present(&self, poly: &PolySchema, path: &AddressPath, sliced: bool) -> Result<bool, ResolveError> {
        if sliced || path.is_root() {
            return Ok(true);
        }
        if self.source.count(path)?.is_some_and(|n| n > 0) {
            return Ok(true);
        }
        let tag_path = path.index(0).append(&poly.discriminator.name);
        Ok(self.source.get(&tag_path)?.is_some())
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::schema::describe::{Described, Discriminator, ObjectDesc, PolyDesc, TypeDesc};
    use crate::schema::synthesize;
    use crate::store::{ArraySource, FlatMap, NestedSource};
    use serde_json::json;

    struct Click;
    impl Described for Click {
        fn describe() -> TypeDesc {
            ObjectDesc::new("Click").field::<i64>("x", "x").field::<i64>("y", "y").into()
        }
    }

    struct Tap;
    impl Described for Tap {
        fn describe() -> TypeDesc {
            ObjectDesc::new("Tap").field::<i64>("duration", "duration").into()
        }
    }

    struct Event;
    impl Described for Event {
        fn describe() -> TypeDesc {
            PolyDesc::new("Event", Discriminator::new("type", "type"))
                .variant::<Click>("Click", &["click"])
                .variant::<Tap>("Tap", &["tap"])
                .segment("tap_event")
                .into()
        }
    }

    struct Screen;
    impl Described for Screen {
        fn describe() -> TypeDesc {
            ObjectDesc::new("Screen")
                .field::<Option<Event>>("event", "event")
                .alias("legacy_event")
                .into()
        }
    }

    fn doc_schema() -> Schema {
        Schema::Object(
            ObjectSchema::new("Doc")
                .with_field(FieldSchema::new("name", Schema::scalar(ScalarKind::String)))
                .with_field(FieldSchema::new("tags", Schema::list(Schema::scalar(ScalarKind::String))).optional()),
        )
    }

    fn store(v: serde_json::Value) -> FlatMap {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn scalar_and_list_fields() {
        let s = store(json!({"name": "x", "tags.#": 2, "tags.0": "a", "tags.1": "b"}));
        let v = resolve_value(&doc_schema(), &s).unwrap();
        assert_eq!(v, Some(json!({"name": "x", "tags": ["a", "b"]})));
    }

    #[test]
    fn empty_store_resolves_to_defaults_without_errors() {
        let v = resolve_value(&doc_schema(), &FlatMap::new()).unwrap();
        assert_eq!(v, Some(json!({"name": ""})));
        let screen = synthesize(&Screen::describe()).unwrap();
        assert_eq!(resolve_value(&screen, &FlatMap::new()).unwrap(), Some(json!({})));
    }

    #[test]
    fn wrong_scalar_kind_is_an_error() {
        let s = store(json!({"name": 7}));
        let err = resolve_value(&doc_schema(), &s).unwrap_err();
        assert!(matches!(err, ResolveError::TypeMismatch { expected: ScalarKind::String, found: ScalarKind::Int, .. }));
    }

    #[test]
    fn nested_objects_are_all_or_nothing() {
        let inner = ObjectSchema::new("Spec").with_field(FieldSchema::new("size", Schema::scalar(ScalarKind::Int)));
        let schema = Schema::Object(
            ObjectSchema::new("Doc")
                .with_field(FieldSchema::new("spec", Schema::Object(inner.clone())).optional())
                .with_field(FieldSchema::new("required_spec", Schema::Object(inner)).wire("requiredSpec")),
        );
        // members without the block marker do not make the object present
        let s = store(json!({"spec.0.size": 3}));
        assert_eq!(resolve_value(&schema, &s).unwrap(), Some(json!({"requiredSpec": {"size": 0}})));

        let s = store(json!({"spec.#": 1, "spec.0.size": 3}));
        assert_eq!(
            resolve_value(&schema, &s).unwrap(),
            Some(json!({"spec": {"size": 3}, "requiredSpec": {"size": 0}}))
        );
    }

    #[test]
    fn polymorphic_field_selects_variant_by_discriminator() {
        let schema = synthesize(&Screen::describe()).unwrap();
        let s = store(json!({"event.0.type": "tap", "event.0.duration": 5}));
        assert_eq!(resolve_value(&schema, &s).unwrap(), Some(json!({"event": {"type": "tap", "duration": 5}})));
    }

    #[test]
    fn polymorphic_dispatch_ignores_insertion_order() {
        let schema = synthesize(&Screen::describe()).unwrap();
        let entries = [
            ("event.#", json!(1)),
            ("event.0.type", json!("click")),
            ("event.0.x", json!(1)),
            ("event.0.y", json!(2)),
        ];
        let expected = json!({"event": {"type": "click", "x": 1, "y": 2}});
        for rot in 0..entries.len() {
            let mut rotated = entries.to_vec();
            rotated.rotate_left(rot);
            let mut obj = serde_json::Map::new();
            for (k, v) in rotated {
                obj.insert(k.to_string(), v);
            }
            let s = store(serde_json::Value::Object(obj));
            assert_eq!(resolve_value(&schema, &s).unwrap(), Some(expected.clone()));
        }
    }

    #[test]
    fn variant_segments_and_aliases_are_tried_after_the_primary_name() {
        let schema = synthesize(&Screen::describe()).unwrap();

        let s = store(json!({"tap_event.#": 1, "tap_event.0.type": "tap", "tap_event.0.duration": 9}));
        assert_eq!(resolve_value(&schema, &s).unwrap(), Some(json!({"event": {"type": "tap", "duration": 9}})));

        // a variant segment only ever yields its own variant
        let s = store(json!({"tap_event.0.type": "click", "tap_event.0.x": 1}));
        assert_eq!(resolve_value(&schema, &s).unwrap(), Some(json!({})));

        let s = store(json!({"legacy_event.0.type": "click", "legacy_event.0.x": 4}));
        assert_eq!(resolve_value(&schema, &s).unwrap(), Some(json!({"event": {"type": "click", "x": 4}})));

        // primary wins over alias
        let s = store(json!({
            "event.0.type": "tap", "event.0.duration": 1,
            "legacy_event.0.type": "click", "legacy_event.0.x": 4
        }));
        assert_eq!(resolve_value(&schema, &s).unwrap(), Some(json!({"event": {"type": "tap", "duration": 1}})));
    }

    #[test]
    fn unmatched_discriminator_falls_back_to_base_shape() {
        let schema = synthesize(&Screen::describe()).unwrap();
        let s = store(json!({"event.#": 1, "event.0.type": "swipe", "event.0.x": 3, "event.0.duration": 4}));
        // the base merges every variant's fields, so nothing stored is lost
        assert_eq!(
            resolve_value(&schema, &s).unwrap(),
            Some(json!({"event": {"type": "swipe", "x": 3, "duration": 4}}))
        );

        let s = store(json!({"legacy_event.#": 1, "legacy_event.0.type": "swipe"}));
        assert_eq!(resolve_value(&schema, &s).unwrap(), Some(json!({"event": {"type": "swipe"}})));
    }

    #[test]
    fn legacy_aliases_resolve_plain_fields() {
        let inner = ObjectSchema::new("Spec").with_field(FieldSchema::new("size", Schema::scalar(ScalarKind::Int)));
        let schema = Schema::Object(
            ObjectSchema::new("Rule")
                .with_field(FieldSchema::new("rule_name", Schema::scalar(ScalarKind::String)).wire("ruleName").alias("name"))
                .with_field(
                    FieldSchema::new("tags", Schema::list(Schema::scalar(ScalarKind::String)))
                        .optional()
                        .alias("labels"),
                )
                .with_field(FieldSchema::new("spec", Schema::Object(inner)).optional().alias("old_spec")),
        );
        let s = store(json!({"name": "legacy", "labels.#": 1, "labels.0": "a", "old_spec.#": 1, "old_spec.0.size": 2}));
        assert_eq!(
            resolve_value(&schema, &s).unwrap(),
            Some(json!({"ruleName": "legacy", "tags": ["a"], "spec": {"size": 2}}))
        );

        // primary name wins, even when it holds an empty list
        let s = store(json!({"rule_name": "current", "name": "legacy", "tags.#": 0, "labels.#": 1, "labels.0": "a"}));
        assert_eq!(resolve_value(&schema, &s).unwrap(), Some(json!({"ruleName": "current", "tags": []})));
    }

    #[test]
    fn counts_the_store_cannot_back_are_errors() {
        let list = Schema::list(Schema::scalar(ScalarKind::String));
        let s = store(json!({"#": 5_000_000}));
        assert!(matches!(
            resolve_value(&list, &s),
            Err(ResolveError::Store(StoreError::UnbackedCount { count: 5_000_000, entries: 1, .. }))
        ));
        let map = Schema::map(Schema::scalar(ScalarKind::Int));
        assert!(matches!(resolve_value(&map, &s), Err(ResolveError::Store(StoreError::UnbackedCount { .. }))));

        // holes inside a backed count take the element's zero value
        let s = store(json!({"#": 2, "1": "b"}));
        assert_eq!(resolve_value(&list, &s).unwrap(), Some(json!(["", "b"])));
    }

    #[test]
    fn lists_of_polymorphic_elements_dispatch_per_element() {
        let schema = synthesize(&<Vec<Event>>::describe()).unwrap();
        let tree = json!([{"type": "tap", "duration": 2}, {"type": "click", "x": 1, "y": 1}]);
        let v = resolve_value(&schema, &NestedSource::new(&tree)).unwrap();
        assert_eq!(v, Some(tree));
    }

    #[test]
    fn maps_read_keys_and_values() {
        let schema = Schema::map(Schema::scalar(ScalarKind::Int));
        let s = store(json!({"#": 2, "0.key": "b", "0.values": 2, "1.key": "a", "1.values": 1}));
        assert_eq!(resolve_value(&schema, &s).unwrap(), Some(json!({"b": 2, "a": 1})));

        let s = store(json!({"#": 1, "0.values": 2}));
        assert!(matches!(resolve_value(&schema, &s), Err(ResolveError::MissingMapKey { .. })));
    }

    #[test]
    fn max_items_is_enforced() {
        let mut c = CollectionSchema::of(Schema::scalar(ScalarKind::String));
        c.max_items = Some(1);
        let s = ArraySource::new(["a", "b"]);
        assert!(matches!(
            resolve_value(&Schema::List(c), &s),
            Err(ResolveError::TooManyItems { count: 2, max: 1, .. })
        ));
    }

    #[test]
    fn ambiguous_root_reads_surface_store_errors() {
        let s = ArraySource::new(["a", "b"]);
        let err = resolve_value(&Schema::scalar(ScalarKind::String), &s).unwrap_err();
        assert!(matches!(err, ResolveError::Store(StoreError::AmbiguousRoot { .. })));
        let list = resolve_value(&Schema::list(Schema::scalar(ScalarKind::String)), &s).unwrap();
        assert_eq!(list, Some(json!(["a", "b"])));
    }
}
