//! Model refinement: turns extracted raw types into the index-bound model
//! that validation and generation consume.
//!
//! Refinement never fails. A reference that does not resolve stays `None`
//! with its name preserved; validation turns that into a diagnostic, and
//! generation is gated on a clean validation pass.

use std::collections::BTreeMap;

use crate::model::{
    CodecRef, CollectionSpec, CtorParam, CtorSpec, DocContext, ElemDesc, PolyMode, PolySpec,
    RawDoc, RawMember, RawPoly, RawType, ResolvedKind, Scalar, SchemaMember, SchemaType, TagType,
    TypeRef, Variant, DEFAULT_COUNT_TYPE, DEFAULT_TAG_TYPE,
};

/// Refines every extracted type against the document-wide declaration
/// tables. Returns the shared context (type/enum/union registries) and the
/// refined types in declaration order.
pub fn refine_doc(doc: &RawDoc, extracted: &[RawType]) -> (DocContext, Vec<SchemaType>) {
    let mut ctx = DocContext {
        module: doc.module.clone(),
        ..DocContext::default()
    };
    for ty in extracted {
        register_types(ty, &mut ctx);
    }
    for e in &doc.enums {
        ctx.enums.insert(e.name.clone(), e.clone());
    }
    for dc in &doc.default_codecs {
        ctx.default_codecs
            .entry(dc.target.clone())
            .or_insert_with(|| dc.codec.clone());
    }

    let mut types: Vec<SchemaType> = extracted
        .iter()
        .map(|raw| refine_type(raw, &mut ctx))
        .collect();

    ctx.release_table = propagate_release(&mut types, &ctx);
    (ctx, types)
}

fn register_types(ty: &RawType, ctx: &mut DocContext) {
    ctx.schema_types
        .entry(ty.name.clone())
        .or_insert_with(|| ty.ptr.clone());
    for nested in &ty.nested {
        register_types(nested, ctx);
    }
}

fn refine_type(raw: &RawType, ctx: &mut DocContext) -> SchemaType {
    let index_of: BTreeMap<&str, usize> = raw
        .members
        .iter()
        .enumerate()
        .map(|(i, m)| (m.name.as_str(), i))
        .collect();

    let mut members: Vec<SchemaMember> = raw
        .members
        .iter()
        .enumerate()
        .map(|(position, m)| refine_member(m, position, &raw.members, ctx))
        .collect();

    resolve_references(&mut members, &index_of);

    let ctor = select_ctor(raw, &members);

    let nested = raw
        .nested
        .iter()
        .map(|n| refine_type(n, ctx))
        .collect::<Vec<_>>();

    SchemaType {
        name: raw.name.clone(),
        namespace: ctx.module.clone(),
        is_value: raw.is_value,
        has_schema_base: raw.has_schema_base,
        members,
        nested,
        ctor,
        needs_release: false, // settled by propagate_release
        has_release: raw.has_release,
        ptr: raw.ptr.clone(),
    }
}

fn refine_member(
    raw: &RawMember,
    position: usize,
    all: &[RawMember],
    ctx: &mut DocContext,
) -> SchemaMember {
    let polymorphic = poly_spec(raw, all, ctx);
    let kind = resolve_kind(&raw.ty, polymorphic.as_ref(), ctx);

    let collection = collection_spec(raw, &kind, polymorphic.as_ref(), ctx);

    // Register the polymorphic union under the member's declared element or
    // value type name. First declaration wins; validation compares later
    // declarations against it.
    if let Some(spec) = &polymorphic {
        if let Some(union_name) = union_name_for(raw) {
            ctx.unions
                .entry(union_name)
                .or_insert_with(|| spec.clone());
        }
    }

    let codec = member_codec(raw, ctx);

    SchemaMember {
        name: raw.name.clone(),
        ty: raw.ty.clone(),
        kind,
        collection,
        polymorphic,
        codec,
        readonly: raw.readonly,
        init_only: raw.init_only,
        position,
        count_source_for: None,
        discriminator_for: None,
        ptr: raw.ptr.clone(),
    }
}

/// The declared type name a polymorphic member's union is registered under:
/// the element type for collections, the member type otherwise.
fn union_name_for(raw: &RawMember) -> Option<String> {
    match &raw.ty {
        TypeRef::Vec(inner) => match inner.as_ref() {
            TypeRef::Named(n) => Some(n.clone()),
            _ => None,
        },
        TypeRef::Named(n) => Some(n.clone()),
        _ => None,
    }
}

fn resolve_kind(ty: &TypeRef, poly: Option<&PolySpec>, ctx: &DocContext) -> ResolvedKind {
    match ty {
        TypeRef::Scalar(s) => ResolvedKind::Scalar(*s),
        TypeRef::Text => ResolvedKind::Text,
        TypeRef::Vec(_) => ResolvedKind::Collection,
        TypeRef::Pooled => ResolvedKind::Pooled,
        TypeRef::Named(n) => {
            if let Some(e) = ctx.enums.get(n) {
                ResolvedKind::Enum {
                    name: n.clone(),
                    repr: e.repr,
                }
            } else if ctx.is_schema_type(n) {
                ResolvedKind::Schema(n.clone())
            } else if poly.is_some_and(|p| !p.variants.is_empty()) {
                ResolvedKind::Union(n.clone())
            } else {
                ResolvedKind::Unknown(n.clone())
            }
        }
    }
}

fn collection_spec(
    raw: &RawMember,
    kind: &ResolvedKind,
    poly: Option<&PolySpec>,
    ctx: &DocContext,
) -> Option<CollectionSpec> {
    let is_collection = matches!(kind, ResolvedKind::Collection | ResolvedKind::Pooled);
    if !is_collection && raw.collection.is_none() {
        return None;
    }

    let config = raw.collection.clone().unwrap_or_default();

    let elem_ty = match &raw.ty {
        TypeRef::Vec(inner) => (**inner).clone(),
        // Pooled buffers are byte collections with leased backing storage.
        TypeRef::Pooled => TypeRef::Scalar(Scalar::U8),
        // Collection config on a non-collection; validation flags it, the
        // degenerate element descriptor keeps the model total.
        other => other.clone(),
    };
    let elem_kind = resolve_kind(&elem_ty, poly, ctx);

    // A tag property without an explicit mode implies one shared tag for
    // the whole sequence.
    let mode = match config.mode {
        Some(m) => m,
        None if config.tag_property.is_some() => PolyMode::SingleSharedTag,
        None => PolyMode::None,
    };

    let count_width = match (&config.fixed_count, &config.count_ref, config.unbounded) {
        (None, None, false) => config.count_type.unwrap_or(DEFAULT_COUNT_TYPE).width(),
        _ => 0,
    };

    Some(CollectionSpec {
        elem: ElemDesc {
            ty: elem_ty,
            kind: elem_kind,
        },
        raw: config,
        count_ref_index: None,
        mode,
        tag_property_index: None,
        count_width,
    })
}

/// Builds the polymorphic spec when anything establishes polymorphism:
/// a `polymorphic` block, variants, or a collection tag configuration.
fn poly_spec(raw: &RawMember, all: &[RawMember], ctx: &DocContext) -> Option<PolySpec> {
    let attr = raw.polymorphic.as_ref();
    let coll = raw.collection.as_ref();

    let has_variants = attr.is_some_and(|p| !p.variants.is_empty());
    let has_collection_mode = coll.is_some_and(|c| {
        c.mode.is_some_and(|m| m != PolyMode::None) || c.tag_property.is_some()
    });
    if attr.is_none() && !has_variants && !has_collection_mode {
        return None;
    }

    let empty = RawPoly {
        tag_property: None,
        tag_type: None,
        variants: Vec::new(),
    };
    let attr = attr.unwrap_or(&empty);

    let tag_property = attr
        .tag_property
        .clone()
        .or_else(|| coll.and_then(|c| c.tag_property.clone()));

    let declared_tag_type = attr
        .tag_type
        .clone()
        .or_else(|| coll.and_then(|c| c.tag_type.clone()));

    let tag_type = resolve_tag_type(declared_tag_type, tag_property.as_deref(), all, ctx);
    let tag_width = tag_type.repr().width();

    Some(PolySpec {
        tag_property,
        tag_property_index: None,
        tag_type,
        tag_width,
        variants: attr
            .variants
            .iter()
            .map(|v| Variant {
                tag: v.tag,
                ty_name: v.ty_name.clone(),
            })
            .collect(),
    })
}

/// Tag representation precedence: declared > the bound sibling member's
/// scalar type > the 4-byte signed default.
fn resolve_tag_type(
    declared: Option<TagType>,
    tag_property: Option<&str>,
    all: &[RawMember],
    ctx: &DocContext,
) -> TagType {
    if let Some(tt) = declared {
        // Substitute the declared repr for enum tags.
        return match tt {
            TagType::Enum { name, .. } => {
                let repr = ctx
                    .enums
                    .get(&name)
                    .map(|e| e.repr)
                    .unwrap_or(DEFAULT_TAG_TYPE);
                TagType::Enum { name, repr }
            }
            scalar => scalar,
        };
    }
    if let Some(prop) = tag_property {
        if let Some(member) = all.iter().find(|m| m.name == prop) {
            match &member.ty {
                TypeRef::Scalar(s) => return TagType::Scalar(*s),
                TypeRef::Named(n) => {
                    if let Some(e) = ctx.enums.get(n) {
                        return TagType::Enum {
                            name: n.clone(),
                            repr: e.repr,
                        };
                    }
                }
                _ => {}
            }
        }
    }
    TagType::Scalar(DEFAULT_TAG_TYPE)
}

/// Second pass: name -> index bindings plus back-links on the targets.
fn resolve_references(members: &mut [SchemaMember], index_of: &BTreeMap<&str, usize>) {
    for i in 0..members.len() {
        if let Some(count_ref) = members[i]
            .collection
            .as_ref()
            .and_then(|c| c.raw.count_ref.clone())
        {
            if let Some(&target) = index_of.get(count_ref.as_str()) {
                if let Some(c) = members[i].collection.as_mut() {
                    c.count_ref_index = Some(target);
                }
                members[target].count_source_for = Some(i);
            }
        }

        if let Some(tag_prop) = members[i]
            .polymorphic
            .as_ref()
            .and_then(|p| p.tag_property.clone())
        {
            if let Some(&target) = index_of.get(tag_prop.as_str()) {
                if let Some(p) = members[i].polymorphic.as_mut() {
                    p.tag_property_index = Some(target);
                }
                if let Some(c) = members[i].collection.as_mut() {
                    c.tag_property_index = Some(target);
                }
                members[target].discriminator_for = Some(i);
            }
        }
    }
}

/// Constructor selection, spec order: any immutable member forces a
/// synthesized constructor over all members in declaration order; otherwise
/// the best host-declared constructor (arity equal to the member count,
/// every parameter matching a member by case-insensitive name and exact
/// declared type) is reused; otherwise synthesize.
fn select_ctor(raw: &RawType, members: &[SchemaMember]) -> CtorSpec {
    let full_params = || {
        members
            .iter()
            .map(|m| CtorParam {
                name: m.name.clone(),
                ty_name: m.ty.display_name(),
            })
            .collect::<Vec<_>>()
    };

    let any_immutable = members.iter().any(SchemaMember::immutable);
    if !any_immutable {
        for ctor in &raw.ctors {
            if ctor.params.len() != members.len() {
                continue;
            }
            let all_match = ctor.params.iter().all(|p| {
                members.iter().any(|m| {
                    m.name.eq_ignore_ascii_case(&p.name) && m.ty.display_name() == p.ty_name
                })
            });
            if all_match {
                return CtorSpec {
                    params: ctor
                        .params
                        .iter()
                        .map(|p| CtorParam {
                            name: p.name.clone(),
                            ty_name: p.ty_name.clone(),
                        })
                        .collect(),
                    synthesize: false,
                    needs_default: raw.needs_default,
                };
            }
        }
    }

    CtorSpec {
        params: full_params(),
        synthesize: true,
        needs_default: raw.needs_default,
    }
}

/// Transitive pooled-buffer ownership: a type needs a release routine when
/// it owns a pooled buffer directly, or owns (possibly inside a collection
/// or union) a schema type that does. Returns the settled per-type table.
fn propagate_release(types: &mut [SchemaType], ctx: &DocContext) -> BTreeMap<String, bool> {
    let mut needs: BTreeMap<String, bool> = BTreeMap::new();
    fn seed(ty: &SchemaType, needs: &mut BTreeMap<String, bool>) {
        let direct = ty
            .members
            .iter()
            .any(|m| matches!(m.kind, ResolvedKind::Pooled));
        needs.insert(ty.name.clone(), direct);
        for n in &ty.nested {
            seed(n, needs);
        }
    }
    for ty in types.iter() {
        seed(ty, &mut needs);
    }

    // Fixpoint over the (finite, closed) type graph.
    loop {
        let mut changed = false;
        let snapshot = needs.clone();
        let mut visit = |ty: &SchemaType, needs: &mut BTreeMap<String, bool>| {
            if needs.get(&ty.name).copied().unwrap_or(false) {
                return false;
            }
            let inherited = ty.members.iter().any(|m| member_target_types(m, ctx)
                .iter()
                .any(|t| snapshot.get(t).copied().unwrap_or(false)));
            if inherited {
                needs.insert(ty.name.clone(), true);
                return true;
            }
            false
        };
        fn walk(
            ty: &SchemaType,
            needs: &mut BTreeMap<String, bool>,
            visit: &mut impl FnMut(&SchemaType, &mut BTreeMap<String, bool>) -> bool,
            changed: &mut bool,
        ) {
            if visit(ty, needs) {
                *changed = true;
            }
            for n in &ty.nested {
                walk(n, needs, visit, changed);
            }
        }
        for ty in types.iter() {
            walk(ty, &mut needs, &mut visit, &mut changed);
        }
        if !changed {
            break;
        }
    }

    fn apply(ty: &mut SchemaType, needs: &BTreeMap<String, bool>) {
        ty.needs_release = needs.get(&ty.name).copied().unwrap_or(false);
        for n in &mut ty.nested {
            apply(n, needs);
        }
    }
    for ty in types.iter_mut() {
        apply(ty, &needs);
    }
    needs
}

/// Schema type names a member's value can own.
fn member_target_types(m: &SchemaMember, ctx: &DocContext) -> Vec<String> {
    let mut out = Vec::new();
    let mut push_kind = |kind: &ResolvedKind| match kind {
        ResolvedKind::Schema(n) => out.push(n.clone()),
        ResolvedKind::Union(n) => {
            if let Some(spec) = ctx.unions.get(n) {
                out.extend(spec.variants.iter().map(|v| v.ty_name.clone()));
            }
        }
        _ => {}
    };
    push_kind(&m.kind);
    if let Some(c) = &m.collection {
        push_kind(&c.elem.kind);
    }
    out
}

fn member_codec(raw: &RawMember, ctx: &DocContext) -> Option<CodecRef> {
    if let Some(path) = &raw.codec {
        return Some(CodecRef { path: path.clone() });
    }
    // Document-level default codecs match the member's whole declared type;
    // a codec always takes over the member entirely.
    ctx.default_codecs
        .get(&raw.ty.display_name())
        .map(|path| CodecRef { path: path.clone() })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wirec_contracts::WIRE_SCHEMA_VERSION;

    use crate::extract::extract_doc;
    use crate::model::{CountStrategy, Scalar};
    use crate::schema_ast::parse_schema_json;

    use super::*;

    fn refined(doc: serde_json::Value) -> (DocContext, Vec<SchemaType>) {
        let bytes = serde_json::to_vec(&doc).expect("encode doc");
        let raw = parse_schema_json(&bytes).expect("parse doc");
        let extracted = extract_doc(&raw).expect("extract");
        refine_doc(&raw, &extracted)
    }

    fn doc(types: serde_json::Value) -> serde_json::Value {
        json!({
            "schema_version": WIRE_SCHEMA_VERSION,
            "module": "net",
            "types": types,
        })
    }

    #[test]
    fn count_reference_binds_index_and_back_link() {
        let (_, types) = refined(doc(json!([
            {
                "name": "Pack",
                "members": [
                    {"name": "count", "type": "u16"},
                    {"name": "items", "type": "vec<u32>", "collection": {"count_ref": "count"}},
                ],
            },
        ])));
        let pack = &types[0];
        let coll = pack.members[1].collection.as_ref().expect("collection");
        assert_eq!(coll.count_ref_index, Some(0));
        assert_eq!(coll.strategy(), CountStrategy::Reference(0));
        assert_eq!(pack.members[0].count_source_for, Some(1));
    }

    #[test]
    fn unresolved_count_reference_stays_none() {
        let (_, types) = refined(doc(json!([
            {
                "name": "Pack",
                "members": [
                    {"name": "items", "type": "vec<u32>", "collection": {"count_ref": "missing"}},
                ],
            },
        ])));
        let coll = types[0].members[0].collection.as_ref().expect("collection");
        assert_eq!(coll.count_ref_index, None);
    }

    #[test]
    fn tag_property_without_mode_infers_shared_tag() {
        let (_, types) = refined(doc(json!([
            {"name": "A", "members": []},
            {
                "name": "Pack",
                "members": [
                    {"name": "kind", "type": "u8"},
                    {
                        "name": "items",
                        "type": "vec<Entity>",
                        "collection": {"tag_property": "kind"},
                        "polymorphic": {"variants": [{"tag": 1, "type": "A"}]},
                    },
                ],
            },
        ])));
        let m = &types[1].members[1];
        let coll = m.collection.as_ref().expect("collection");
        assert_eq!(coll.mode, PolyMode::SingleSharedTag);
        assert_eq!(coll.tag_property_index, Some(0));
        assert_eq!(types[1].members[0].discriminator_for, Some(1));
        // Tag representation comes from the bound sibling.
        let poly = m.polymorphic.as_ref().expect("poly");
        assert_eq!(poly.tag_type, TagType::Scalar(Scalar::U8));
        assert_eq!(poly.tag_width, 1);
    }

    #[test]
    fn tag_type_defaults_to_i32_when_nothing_fixes_it() {
        let (_, types) = refined(doc(json!([
            {"name": "A", "members": []},
            {
                "name": "Holder",
                "members": [
                    {
                        "name": "entity",
                        "type": "Entity",
                        "polymorphic": {"variants": [{"tag": 1, "type": "A"}]},
                    },
                ],
            },
        ])));
        let poly = types[1].members[0].polymorphic.as_ref().expect("poly");
        assert_eq!(poly.tag_type, TagType::Scalar(Scalar::I32));
        assert_eq!(poly.tag_width, 4);
    }

    #[test]
    fn immutable_member_forces_synthesized_ctor_over_all_members() {
        let (_, types) = refined(doc(json!([
            {
                "name": "T",
                "ctors": [{"params": [{"name": "a", "type": "u8"}, {"name": "b", "type": "string"}]}],
                "members": [
                    {"name": "a", "type": "u8", "readonly": true},
                    {"name": "b", "type": "string"},
                ],
            },
        ])));
        let ctor = &types[0].ctor;
        assert!(ctor.synthesize);
        assert_eq!(ctor.params.len(), 2);
        assert_eq!(ctor.params[0].name, "a");
    }

    #[test]
    fn matching_host_ctor_is_reused_case_insensitively() {
        let (_, types) = refined(doc(json!([
            {
                "name": "T",
                "ctors": [{"params": [{"name": "A", "type": "u8"}, {"name": "B", "type": "string"}]}],
                "members": [
                    {"name": "a", "type": "u8"},
                    {"name": "b", "type": "string"},
                ],
            },
        ])));
        assert!(!types[0].ctor.synthesize);
    }

    #[test]
    fn arity_mismatch_falls_back_to_synthesis() {
        let (_, types) = refined(doc(json!([
            {
                "name": "T",
                "ctors": [{"params": [{"name": "a", "type": "u8"}]}],
                "members": [
                    {"name": "a", "type": "u8"},
                    {"name": "b", "type": "string"},
                ],
            },
        ])));
        assert!(types[0].ctor.synthesize);
    }

    #[test]
    fn pooled_ownership_propagates_transitively() {
        let (_, types) = refined(doc(json!([
            {"name": "Leaf", "members": [{"name": "data", "type": "pooled"}]},
            {"name": "Mid", "members": [{"name": "leaf", "type": "Leaf"}]},
            {"name": "Top", "members": [{"name": "mids", "type": "vec<Mid>"}]},
            {"name": "Clean", "members": [{"name": "x", "type": "u32"}]},
        ])));
        assert!(types[0].needs_release);
        assert!(types[1].needs_release);
        assert!(types[2].needs_release);
        assert!(!types[3].needs_release);
    }

    #[test]
    fn default_codec_applies_unless_member_overrides() {
        let (_, types) = refined(json!({
            "schema_version": WIRE_SCHEMA_VERSION,
            "module": "net",
            "default_codecs": [{"type": "Blob", "codec": "crate::codecs::BlobCodec"}],
            "types": [
                {"name": "Blob", "members": []},
                {
                    "name": "T",
                    "members": [
                        {"name": "a", "type": "Blob"},
                        {"name": "b", "type": "Blob", "codec": "crate::codecs::Other"},
                        {"name": "c", "type": "u8"},
                    ],
                },
            ],
        }));
        let t = &types[1];
        assert_eq!(
            t.members[0].codec.as_ref().map(|c| c.path.as_str()),
            Some("crate::codecs::BlobCodec")
        );
        assert_eq!(
            t.members[1].codec.as_ref().map(|c| c.path.as_str()),
            Some("crate::codecs::Other")
        );
        assert!(t.members[2].codec.is_none());
    }
}
