//! Schema synthesis from type descriptors.
//!
//! Policy applied on the way (not incidental):
//! - `Option<T>` makes a field optional; it does not add a level.
//! - A list/set element that is an object holding exactly one required
//!   object field is collapsed to that inner object, keeping addresses
//!   shallow. The wrapper's wire name is remembered on the collection.
//! - Embedded fields are spliced into the parent in declaration order.
//! - Variant fields are all optional: only one variant is populated.
//!
//! Any shape that cannot be represented fails the whole synthesis.
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;

use super::describe::{Described, FieldRole, ObjectDesc, PolyDesc, TypeDesc};
use super::{
    CollectionSchema, DiscriminatorSchema, FieldSchema, MapSchema, ObjectSchema, PolySchema, Schema,
    VariantSchema, check_unique, map_key_collides,
};
use crate::error::SchemaError;
use crate::scalar::ScalarKind;

const MAX_DEPTH: usize = 64;

// --------------------------------- Cache ---------------------------------- //

static SCHEMAS: Lazy<RwLock<HashMap<TypeId, Arc<Schema>>>> = Lazy::new(Default::default);

/// Schema of `T`, synthesized on first use and shared afterwards.
pub fn schema_of<T: Described + 'static>() -> Result<Arc<Schema>, SchemaError> {
    let id = TypeId::of::<T>();
    if let Some(hit) = SCHEMAS.read().unwrap_or_else(PoisonError::into_inner).get(&id) {
        return Ok(hit.clone());
    }
    let schema = Arc::new(synthesize(&T::describe())?);
    tracing::debug!(ty = std::any::type_name::<T>(), "synthesized schema");
    let mut cache = SCHEMAS.write().unwrap_or_else(PoisonError::into_inner);
    // a racing thread may have won; keep the first so every caller shares it
    Ok(cache.entry(id).or_insert(schema).clone())
}

// -------------------------------- Synth ----------------------------------- //

/// Schema for a descriptor. The result has passed [`Schema::validate`].
pub fn synthesize(desc: &TypeDesc) -> Result<Schema, SchemaError> {
    let at = match desc {
        TypeDesc::Object(o) => o.name,
        TypeDesc::Polymorphic(p) => p.name,
        _ => "$",
    };
    let schema = Synth::default().schema(desc, at)?;
    schema.validate()?;
    Ok(schema)
}

#[derive(Default)]
struct Synth {
    depth: usize,
}

impl Synth {
    fn schema(&mut self, desc: &TypeDesc, at: &str) -> Result<Schema, SchemaError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(SchemaError::TooDeep { at: at.to_string(), limit: MAX_DEPTH });
        }
        let out = match desc {
            TypeDesc::Scalar(kind) => Ok(Schema::scalar(*kind)),
            // optionality belongs to the field; elsewhere it is transparent
            TypeDesc::Optional(inner) => self.schema(inner, at),
            TypeDesc::List(elem) => self.collection(elem, at).map(Schema::List),
            TypeDesc::Set(elem) => self.collection(elem, at).map(Schema::Set),
            TypeDesc::Map(elem) => self.map(elem, at).map(Schema::Map),
            TypeDesc::Object(obj) => self.object(obj, at).map(Schema::Object),
            TypeDesc::Polymorphic(poly) => self.poly(poly, at).map(Schema::Polymorphic),
            TypeDesc::Unsupported(ty) => Err(SchemaError::Unsupported { at: at.to_string(), ty: ty.to_string() }),
        };
        self.depth -= 1;
        out
    }

    fn element(&mut self, elem: &TypeDesc, at: &str) -> Result<Schema, SchemaError> {
        let at = format!("{at}[]");
        let schema = self.schema(elem, &at)?;
        if let Some(inner) = schema.element() {
            if !inner.is_object_like() {
                return Err(SchemaError::NestedCollection { at });
            }
        }
        Ok(schema)
    }

    fn collection(&mut self, elem: &TypeDesc, at: &str) -> Result<CollectionSchema, SchemaError> {
        let elem = self.element(elem, at)?;
        let (elem, wrapper) = unwrap_single_object(elem);
        let mut out = CollectionSchema::of(elem);
        out.wrapper = wrapper;
        Ok(out)
    }

    fn map(&mut self, elem: &TypeDesc, at: &str) -> Result<MapSchema, SchemaError> {
        let elem = self.element(elem, at)?;
        if map_key_collides(&elem) {
            return Err(SchemaError::MapKeyCollision { at: at.to_string() });
        }
        Ok(MapSchema { elem: Box::new(elem) })
    }

    fn object(&mut self, desc: &ObjectDesc, at: &str) -> Result<ObjectSchema, SchemaError> {
        let mut out = ObjectSchema::new(desc.name);
        for f in &desc.fields {
            let at_f = format!("{at}.{}", f.name);
            let (optional, ty) = match (f.ty)() {
                TypeDesc::Optional(inner) => (true, *inner),
                other => (false, other),
            };
            match f.role {
                FieldRole::Embedded => {
                    if !f.aliases.is_empty() {
                        return Err(SchemaError::EmbeddedAlias { at: at_f, field: f.name.to_string() });
                    }
                    let TypeDesc::Object(inner) = &ty else {
                        return Err(SchemaError::NotAnObject { at: at_f, ty: type_label(&ty) });
                    };
                    self.depth += 1;
                    if self.depth > MAX_DEPTH {
                        return Err(SchemaError::TooDeep { at: at_f, limit: MAX_DEPTH });
                    }
                    let promoted = self.object(inner, &at_f);
                    self.depth -= 1;
                    for mut g in promoted?.fields {
                        g.optional |= optional;
                        g.promoted_from.get_or_insert_with(|| f.name.to_string());
                        out.fields.push(g);
                    }
                }
                FieldRole::Plain => {
                    let mut schema = self.schema(&ty, &at_f)?;
                    if let Schema::List(c) | Schema::Set(c) = &mut schema {
                        c.min_items = f.min_items.unwrap_or(c.min_items);
                        c.max_items = f.max_items.or(c.max_items);
                    }
                    out.fields.push(FieldSchema {
                        name: f.name.to_string(),
                        wire_name: f.wire_name.to_string(),
                        schema,
                        optional: optional || f.computed,
                        computed: f.computed,
                        aliases: f.aliases.iter().map(|a| a.to_string()).collect(),
                        promoted_from: None,
                    });
                }
            }
        }
        check_unique(&out, at)?;
        Ok(out)
    }

    fn variant_object(&mut self, ty: TypeDesc, at: &str) -> Result<ObjectSchema, SchemaError> {
        let TypeDesc::Object(obj) = &ty else {
            return Err(SchemaError::NotAnObject { at: at.to_string(), ty: type_label(&ty) });
        };
        self.depth += 1;
        let out = self.object(obj, at);
        self.depth -= 1;
        let mut out = out?;
        for f in &mut out.fields {
            f.optional = true;
        }
        Ok(out)
    }

    fn poly(&mut self, desc: &PolyDesc, at: &str) -> Result<PolySchema, SchemaError> {
        if desc.variants.is_empty() {
            return Err(SchemaError::EmptyPolymorphic { at: at.to_string(), ty: desc.name.to_string() });
        }
        let discriminator = DiscriminatorSchema {
            name: desc.discriminator.name.to_string(),
            wire_name: desc.discriminator.wire_name.to_string(),
        };

        let mut claimed: HashMap<&str, &str> = HashMap::new();
        let mut variants = Vec::with_capacity(desc.variants.len());
        for v in &desc.variants {
            for value in &v.values {
                if let Some(first) = claimed.insert(*value, v.name) {
                    return Err(SchemaError::AmbiguousVariant {
                        at: at.to_string(),
                        value: value.to_string(),
                        first: first.to_string(),
                        second: v.name.to_string(),
                    });
                }
            }
            let mut schema = self.variant_object((v.ty)(), &format!("{at}<{}>", v.name))?;
            with_discriminator(&mut schema, &discriminator);
            variants.push(VariantSchema {
                name: v.name.to_string(),
                values: v.values.iter().map(|x| x.to_string()).collect(),
                segment: v.segment.map(str::to_string),
                schema,
            });
        }

        let mut base = match desc.base {
            Some(base) => self.variant_object(base(), &format!("{at}<base>"))?,
            None => merged_fields(desc.name, &variants, &discriminator, at)?,
        };
        with_discriminator(&mut base, &discriminator);

        Ok(PolySchema { name: desc.name.to_string(), discriminator, variants, base })
    }
}

// ------------------------------- Helpers ---------------------------------- //

/// `[{ rule: {..} }]` → `[{..}]` when the wrapper holds nothing else.
fn unwrap_single_object(elem: Schema) -> (Schema, Option<String>) {
    if let Schema::Object(wrapper) = &elem {
        if let [only] = wrapper.fields.as_slice() {
            if let Schema::Object(inner) = &only.schema {
                if !only.optional && only.promoted_from.is_none() {
                    return (Schema::Object(inner.clone()), Some(only.wire_name.clone()));
                }
            }
        }
    }
    (elem, None)
}

fn with_discriminator(schema: &mut ObjectSchema, disc: &DiscriminatorSchema) {
    if schema.field(&disc.name).is_some() {
        return;
    }
    let field = FieldSchema::new(disc.name.clone(), Schema::scalar(ScalarKind::String))
        .wire(disc.wire_name.clone())
        .optional();
    schema.fields.insert(0, field);
}

/// Every variant's fields, all optional, in declaration order. A field named
/// by several variants must mean the same thing in each.
fn merged_fields(
    name: &str,
    variants: &[VariantSchema],
    disc: &DiscriminatorSchema,
    at: &str,
) -> Result<ObjectSchema, SchemaError> {
    let mut out = ObjectSchema::new(format!("{name}Base"));
    for v in variants {
        for f in v.schema.fields.iter().filter(|f| f.name != disc.name) {
            match out.field(&f.name) {
                None => out.fields.push(f.clone()),
                Some(seen) if seen.wire_name == f.wire_name && seen.schema == f.schema => {}
                Some(_) => {
                    return Err(SchemaError::ConflictingVariantField {
                        at: at.to_string(),
                        field: f.name.clone(),
                        variant: v.name.clone(),
                    });
                }
            }
        }
    }
    check_unique(&out, at)?;
    Ok(out)
}

fn type_label(ty: &TypeDesc) -> String {
    match ty {
        TypeDesc::Scalar(kind) => kind.to_string(),
        TypeDesc::Optional(inner) => format!("Option<{}>", type_label(inner)),
        TypeDesc::List(inner) => format!("list<{}>", type_label(inner)),
        TypeDesc::Set(inner) => format!("set<{}>", type_label(inner)),
        TypeDesc::Map(inner) => format!("map<{}>", type_label(inner)),
        TypeDesc::Object(o) => o.name.to_string(),
        TypeDesc::Polymorphic(p) => p.name.to_string(),
        TypeDesc::Unsupported(ty) => ty.to_string(),
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::schema::describe::{Discriminator, ObjectDesc, PolyDesc};

    struct Meta;
    impl Described for Meta {
        fn describe() -> TypeDesc {
            ObjectDesc::new("Meta")
                .field::<String>("owner", "owner")
                .field::<Option<i64>>("revision", "revision")
                .into()
        }
    }

    struct Condition;
    impl Described for Condition {
        fn describe() -> TypeDesc {
            ObjectDesc::new("Condition").field::<String>("value", "value").into()
        }
    }

    struct ConditionWrapper;
    impl Described for ConditionWrapper {
        fn describe() -> TypeDesc {
            ObjectDesc::new("ConditionWrapper").field::<Condition>("condition", "condition").into()
        }
    }

    struct Rule;
    impl Described for Rule {
        fn describe() -> TypeDesc {
            ObjectDesc::new("Rule")
                .field::<String>("rule_name", "ruleName")
                .alias("name")
                .embed::<Meta>("meta")
                .field::<Vec<ConditionWrapper>>("conditions", "conditions")
                .max_items(4)
                .field::<Option<BTreeMap<String, String>>>("labels", "labels")
                .field::<String>("status", "status")
                .computed()
                .into()
        }
    }

    struct Click;
    impl Described for Click {
        fn describe() -> TypeDesc {
            ObjectDesc::new("Click").field::<i64>("x", "x").field::<i64>("y", "y").into()
        }
    }

    struct Tap;
    impl Described for Tap {
        fn describe() -> TypeDesc {
            ObjectDesc::new("Tap").field::<i64>("x", "x").field::<i64>("duration", "duration").into()
        }
    }

    struct Event;
    impl Described for Event {
        fn describe() -> TypeDesc {
            PolyDesc::new("Event", Discriminator::new("type", "type"))
                .variant::<Click>("Click", &["click"])
                .variant::<Tap>("Tap", &["tap", "press"])
                .segment("tap_event")
                .into()
        }
    }

    fn object(schema: &Schema) -> &ObjectSchema {
        match schema {
            Schema::Object(o) => o,
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn object_fields_keep_declaration_order_with_promotion_spliced_in() {
        let schema = synthesize(&Rule::describe()).unwrap();
        let obj = object(&schema);
        let names: Vec<_> = obj.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["rule_name", "owner", "revision", "conditions", "labels", "status"]);

        let owner = obj.field("owner").unwrap();
        assert_eq!(owner.promoted_from.as_deref(), Some("meta"));
        assert!(!owner.optional);
        assert!(obj.field("revision").unwrap().optional);

        let rule_name = obj.field("rule_name").unwrap();
        assert_eq!(rule_name.wire_name, "ruleName");
        assert_eq!(rule_name.aliases, ["name"]);

        let status = obj.field("status").unwrap();
        assert!(status.computed && status.optional);
        assert!(matches!(obj.field("labels").unwrap().schema, Schema::Map(_)));
    }

    #[test]
    fn single_object_wrappers_are_collapsed_in_lists() {
        let schema = synthesize(&Rule::describe()).unwrap();
        let Schema::List(list) = &object(&schema).field("conditions").unwrap().schema else {
            panic!("conditions should be a list");
        };
        assert_eq!(list.wrapper.as_deref(), Some("condition"));
        assert_eq!(list.max_items, Some(4));
        assert_eq!(object(&list.elem).name, "Condition");
    }

    #[test]
    fn polymorphic_variants_are_optional_and_carry_the_discriminator() {
        let Schema::Polymorphic(poly) = synthesize(&Event::describe()).unwrap() else {
            panic!("expected polymorphic");
        };
        assert_eq!(poly.variants.len(), 2);
        let tap = &poly.variants[1];
        assert_eq!(tap.segment.as_deref(), Some("tap_event"));
        assert_eq!(tap.schema.fields[0].name, "type");
        assert!(tap.schema.fields.iter().all(|f| f.optional));
        assert_eq!(poly.variant_for("press").map(|v| v.name.as_str()), Some("Tap"));

        // no explicit base: every variant's fields, first declaration wins
        let base: Vec<_> = poly.base.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(base, ["type", "x", "y", "duration"]);
        assert!(poly.base.fields.iter().all(|f| f.optional));
    }

    #[test]
    fn variants_disagreeing_on_a_field_cannot_share_a_base() {
        struct Swipe;
        impl Described for Swipe {
            fn describe() -> TypeDesc {
                ObjectDesc::new("Swipe").field::<String>("x", "x").into()
            }
        }
        struct Gesture;
        impl Described for Gesture {
            fn describe() -> TypeDesc {
                PolyDesc::new("Gesture", Discriminator::new("type", "type"))
                    .variant::<Click>("Click", &["click"])
                    .variant::<Swipe>("Swipe", &["swipe"])
                    .into()
            }
        }
        let err = synthesize(&Gesture::describe()).unwrap_err();
        assert!(matches!(err, SchemaError::ConflictingVariantField { ref field, ref variant, .. } if field == "x" && variant == "Swipe"));
    }

    #[test]
    fn aliases_on_embedded_fields_are_rejected() {
        struct Aliased;
        impl Described for Aliased {
            fn describe() -> TypeDesc {
                ObjectDesc::new("Aliased").embed::<Meta>("meta").alias("old_meta").into()
            }
        }
        assert!(matches!(synthesize(&Aliased::describe()), Err(SchemaError::EmbeddedAlias { ref field, .. }) if field == "meta"));
    }

    #[test]
    fn descriptor_names_must_be_address_segments() {
        struct Dotted;
        impl Described for Dotted {
            fn describe() -> TypeDesc {
                ObjectDesc::new("Dotted").field::<String>("a.b", "ab").into()
            }
        }
        assert!(matches!(synthesize(&Dotted::describe()), Err(SchemaError::BadName { ref name, .. }) if name == "a.b"));
    }

    #[test]
    fn ambiguous_discriminators_fail_fast() {
        struct Clash;
        impl Described for Clash {
            fn describe() -> TypeDesc {
                PolyDesc::new("Clash", Discriminator::new("type", "type"))
                    .variant::<Click>("A", &["same"])
                    .variant::<Tap>("B", &["other", "same"])
                    .into()
            }
        }
        let err = synthesize(&Clash::describe()).unwrap_err();
        assert!(matches!(err, SchemaError::AmbiguousVariant { ref value, .. } if value == "same"));
    }

    #[test]
    fn unrepresentable_shapes_fail_fast() {
        assert!(matches!(
            synthesize(&<Vec<Vec<String>>>::describe()),
            Err(SchemaError::NestedCollection { .. })
        ));
        assert!(synthesize(&<Vec<Vec<Condition>>>::describe()).is_ok());

        struct Loose;
        impl Described for Loose {
            fn describe() -> TypeDesc {
                ObjectDesc::new("Loose").field::<serde_json::Value>("blob", "blob").into()
            }
        }
        assert!(matches!(synthesize(&Loose::describe()), Err(SchemaError::Unsupported { .. })));

        struct KeyedEntry;
        impl Described for KeyedEntry {
            fn describe() -> TypeDesc {
                ObjectDesc::new("KeyedEntry").field::<String>("key", "key").into()
            }
        }
        assert!(matches!(
            synthesize(&<BTreeMap<String, KeyedEntry>>::describe()),
            Err(SchemaError::MapKeyCollision { .. })
        ));

        struct Twice;
        impl Described for Twice {
            fn describe() -> TypeDesc {
                ObjectDesc::new("Twice").field::<String>("owner", "owner").embed::<Meta>("meta").into()
            }
        }
        assert!(matches!(synthesize(&Twice::describe()), Err(SchemaError::DuplicateField { .. })));

        struct BadEmbed;
        impl Described for BadEmbed {
            fn describe() -> TypeDesc {
                ObjectDesc::new("BadEmbed").embed::<String>("inner").into()
            }
        }
        assert!(matches!(synthesize(&BadEmbed::describe()), Err(SchemaError::NotAnObject { .. })));
    }

    #[test]
    fn recursive_types_hit_the_depth_limit() {
        struct Node;
        impl Described for Node {
            fn describe() -> TypeDesc {
                ObjectDesc::new("Node").field::<Option<Box<Node>>>("next", "next").into()
            }
        }
        assert!(matches!(synthesize(&Node::describe()), Err(SchemaError::TooDeep { .. })));
    }

    #[test]
    fn cache_hands_out_the_same_schema() {
        let a = schema_of::<Rule>().unwrap();
        let b = schema_of::<Rule>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
