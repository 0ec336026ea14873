//! Structural validation of refined types.
//!
//! Every rule is a pure function over one refined type (plus the read-only
//! document context); rules are independent and order-insensitive, and each
//! finding is local to one member or one type. An error here blocks
//! generation for the offending type only.

use std::collections::BTreeMap;

use crate::diagnostics::{Diagnostic, Stage};
use crate::model::{
    CollectionSpec, DocContext, PolyMode, PolySpec, ResolvedKind, Scalar, SchemaMember,
    SchemaType, TypeRef,
};

type Rule = fn(&DocContext, &SchemaType) -> Vec<Diagnostic>;

const RULES: &[Rule] = &[
    rule_duplicate_member_names,
    rule_unknown_member_types,
    rule_collection_config_on_non_collection,
    rule_conflicting_count_strategies,
    rule_fixed_count_positive,
    rule_count_reference,
    rule_count_type_integer,
    rule_unbounded_shared_tag,
    rule_nested_collection_element,
    rule_pooled_constraints,
    rule_polymorphic_context,
    rule_variants_present,
    rule_variant_tags,
    rule_variant_tag_range,
    rule_variant_types,
    rule_tag_property,
    rule_tag_type_integer,
    rule_union_consistency,
    rule_codec_exclusivity,
    rule_single_reference_role,
];

/// Runs every rule over every type (nested types included) plus the
/// document-scope rules.
pub fn validate_doc(ctx: &DocContext, types: &[SchemaType]) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    out.extend(rule_duplicate_type_names(ctx, types));
    out.extend(rule_enum_values(ctx));
    for ty in types {
        validate_type(ctx, ty, &mut out);
    }
    out
}

fn validate_type(ctx: &DocContext, ty: &SchemaType, out: &mut Vec<Diagnostic>) {
    for rule in RULES {
        out.extend(rule(ctx, ty));
    }
    for nested in &ty.nested {
        validate_type(ctx, nested, out);
    }
}

fn err(code: &str, message: String, ptr: &str) -> Diagnostic {
    Diagnostic::error(code, Stage::Validate, message).at(ptr)
}

// ---------------------------------------------------------------------------
// Document-scope rules
// ---------------------------------------------------------------------------

fn rule_duplicate_type_names(ctx: &DocContext, types: &[SchemaType]) -> Vec<Diagnostic> {
    let mut seen: BTreeMap<&str, u32> = BTreeMap::new();
    fn count<'a>(ty: &'a SchemaType, seen: &mut BTreeMap<&'a str, u32>) {
        *seen.entry(ty.name.as_str()).or_insert(0) += 1;
        for n in &ty.nested {
            count(n, seen);
        }
    }
    let mut out = Vec::new();
    for ty in types {
        count(ty, &mut seen);
    }
    for name in ctx.enums.keys() {
        *seen.entry(name.as_str()).or_insert(0) += 1;
    }
    for name in ctx.unions.keys() {
        // A union shares the namespace of generated types; colliding with a
        // declared type or enum is a conflict, union-vs-union reuse is not.
        if seen.contains_key(name.as_str()) {
            *seen.entry(name.as_str()).or_insert(0) += 1;
        }
    }
    fn report(ty: &SchemaType, seen: &BTreeMap<&str, u32>, out: &mut Vec<Diagnostic>) {
        if seen.get(ty.name.as_str()).copied().unwrap_or(0) > 1 {
            out.push(err(
                "WIREC-TYPE-0002",
                format!("type name {:?} is declared more than once", ty.name),
                &ty.ptr,
            ));
        }
        for n in &ty.nested {
            report(n, seen, out);
        }
    }
    for ty in types {
        report(ty, &seen, &mut out);
    }
    out
}

fn rule_enum_values(ctx: &DocContext) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for e in ctx.enums.values() {
        let mut seen: BTreeMap<i64, &str> = BTreeMap::new();
        for v in &e.values {
            if let Some(first) = seen.insert(v.value, v.name.as_str()) {
                out.push(
                    err(
                        "WIREC-ENUM-0001",
                        format!(
                            "enum {:?} declares value {} twice ({} and {})",
                            e.name, v.value, first, v.name
                        ),
                        &e.ptr,
                    )
                    .with("value", v.value),
                );
            }
            if !scalar_fits(e.repr, v.value) {
                out.push(
                    err(
                        "WIREC-ENUM-0002",
                        format!(
                            "enum {:?} value {} ({}) does not fit its {} representation",
                            e.name,
                            v.name,
                            v.value,
                            e.repr.name()
                        ),
                        &e.ptr,
                    )
                    .with("value", v.value),
                );
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Type-scope rules
// ---------------------------------------------------------------------------

fn rule_duplicate_member_names(_ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    let mut out = Vec::new();
    for m in &ty.members {
        if let Some(&first) = seen.get(m.name.as_str()) {
            out.push(
                err(
                    "WIREC-TYPE-0001",
                    format!(
                        "member name {:?} collides with member {} of the same flattened type (derived members may not override by name)",
                        m.name, first
                    ),
                    &m.ptr,
                )
                .with("first_position", first as i64),
            );
        } else {
            seen.insert(m.name.as_str(), m.position);
        }
    }
    out
}

fn rule_unknown_member_types(_ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for m in &ty.members {
        // A custom codec owns its member's type; an undeclared name there is
        // an application type the codec understands.
        if m.codec.is_some() {
            continue;
        }
        if let ResolvedKind::Unknown(name) = &m.kind {
            out.push(err(
                "WIREC-TYPE-0003",
                format!(
                    "member {:?} has type {:?}, which is not a declared type, enum, or polymorphic union",
                    m.name, name
                ),
                &m.ptr,
            ));
        }
        if let Some(c) = &m.collection {
            if let ResolvedKind::Unknown(name) = &c.elem.kind {
                out.push(err(
                    "WIREC-TYPE-0003",
                    format!(
                        "collection {:?} has element type {:?}, which is not a declared type, enum, or polymorphic union",
                        m.name, name
                    ),
                    &m.ptr,
                ));
            }
        }
    }
    out
}

fn rule_collection_config_on_non_collection(_ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    collect_members(ty, |m| {
        let configured = m.collection.as_ref().is_some_and(|c| c.raw != Default::default());
        let is_collection = matches!(m.kind, ResolvedKind::Collection | ResolvedKind::Pooled);
        if configured && !is_collection {
            Some(err(
                "WIREC-COLL-0005",
                format!(
                    "member {:?} carries collection configuration but its type {:?} is not a collection",
                    m.name,
                    m.ty.display_name()
                ),
                &m.ptr,
            ))
        } else {
            None
        }
    })
}

fn rule_conflicting_count_strategies(_ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    collect_members(ty, |m| {
        let c = m.collection.as_ref()?;
        let exclusive = [
            c.raw.fixed_count.is_some(),
            c.raw.count_ref.is_some(),
            c.raw.unbounded,
            c.raw.count_type.is_some(),
        ];
        let configured = exclusive.iter().filter(|&&set| set).count();
        if configured > 1 {
            Some(
                err(
                    "WIREC-COLL-0004",
                    format!(
                        "collection {:?} configures more than one count strategy (exactly one of fixed_count, count_ref, unbounded, count_type may be set)",
                        m.name
                    ),
                    &m.ptr,
                )
                .with("configured", configured as i64),
            )
        } else {
            None
        }
    })
}

fn rule_fixed_count_positive(_ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    collect_members(ty, |m| {
        let c = m.collection.as_ref()?;
        let n = c.raw.fixed_count?;
        if n <= 0 {
            Some(
                err(
                    "WIREC-COLL-0006",
                    format!("collection {:?} declares fixed_count {n}, which must be positive", m.name),
                    &m.ptr,
                )
                .with("fixed_count", n),
            )
        } else {
            None
        }
    })
}

fn rule_count_reference(_ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for m in &ty.members {
        let Some(c) = &m.collection else { continue };
        let Some(name) = &c.raw.count_ref else { continue };
        match c.count_ref_index {
            None => out.push(err(
                "WIREC-COLL-0001",
                format!(
                    "collection {:?} references count member {:?}, which does not exist",
                    m.name, name
                ),
                &m.ptr,
            )),
            Some(target) => {
                let target_member = &ty.members[target];
                if target >= m.position {
                    out.push(err(
                        "WIREC-COLL-0003",
                        format!(
                            "count member {:?} must be declared before the collection {:?} that references it (decode reads it first)",
                            name, m.name
                        ),
                        &m.ptr,
                    ));
                }
                let ok_repr = match &target_member.kind {
                    ResolvedKind::Scalar(s) => s.is_integer(),
                    _ => false,
                };
                if !ok_repr {
                    out.push(err(
                        "WIREC-COLL-0002",
                        format!(
                            "count member {:?} has type {:?}; a count reference must be a fixed-width integer",
                            name,
                            target_member.ty.display_name()
                        ),
                        &m.ptr,
                    ));
                }
            }
        }
    }
    out
}

fn rule_count_type_integer(_ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    collect_members(ty, |m| {
        let c = m.collection.as_ref()?;
        let count_type = c.raw.count_type?;
        if !count_type.is_integer() {
            Some(err(
                "WIREC-COLL-0008",
                format!(
                    "collection {:?} declares count_type {}, which is not an integer",
                    m.name,
                    count_type.name()
                ),
                &m.ptr,
            ))
        } else {
            None
        }
    })
}

/// An unbounded sequence has no count to pair a single shared tag with; the
/// combination has no defined layout and is rejected outright.
fn rule_unbounded_shared_tag(_ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    collect_members(ty, |m| {
        let c = m.collection.as_ref()?;
        if c.raw.unbounded && c.mode == PolyMode::SingleSharedTag {
            Some(err(
                "WIREC-COLL-0007",
                format!(
                    "collection {:?} combines unbounded with a shared tag; this combination is not supported",
                    m.name
                ),
                &m.ptr,
            ))
        } else {
            None
        }
    })
}

fn rule_nested_collection_element(_ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    collect_members(ty, |m| {
        let c = m.collection.as_ref()?;
        if matches!(c.elem.ty, TypeRef::Vec(_) | TypeRef::Pooled) {
            Some(err(
                "WIREC-COLL-0009",
                format!(
                    "collection {:?} nests collection elements ({}); wrap the inner collection in a schema type instead",
                    m.name,
                    c.elem.ty.display_name()
                ),
                &m.ptr,
            ))
        } else {
            None
        }
    })
}

fn rule_pooled_constraints(_ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for m in &ty.members {
        if !matches!(m.kind, ResolvedKind::Pooled) {
            continue;
        }
        if m.polymorphic.is_some() {
            out.push(err(
                "WIREC-POOL-0001",
                format!("pooled buffer {:?} cannot be polymorphic", m.name),
                &m.ptr,
            ));
        }
        if m.collection.as_ref().is_some_and(|c| c.raw.unbounded) {
            out.push(err(
                "WIREC-POOL-0002",
                format!(
                    "pooled buffer {:?} combines pooled storage with unbounded; this combination is not supported",
                    m.name
                ),
                &m.ptr,
            ));
        }
    }
    out
}

/// Polymorphic configuration is meaningful on an undeclared union type or a
/// collection of one, with a polymorphic mode in the collection case.
fn rule_polymorphic_context(_ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    collect_members(ty, |m| {
        let poly = m.polymorphic.as_ref()?;
        match &m.kind {
            ResolvedKind::Union(_) => None,
            ResolvedKind::Collection => {
                let c = m.collection.as_ref()?;
                if c.mode == PolyMode::None && !poly.variants.is_empty() {
                    Some(err(
                        "WIREC-POLY-0008",
                        format!(
                            "collection {:?} declares variants without a polymorphic mode; set mode or tag_property",
                            m.name
                        ),
                        &m.ptr,
                    ))
                } else if !matches!(c.elem.kind, ResolvedKind::Union(_)) {
                    Some(err(
                        "WIREC-POLY-0008",
                        format!(
                            "collection {:?} is polymorphic but its element type {:?} is not an undeclared union name",
                            m.name,
                            c.elem.ty.display_name()
                        ),
                        &m.ptr,
                    ))
                } else {
                    None
                }
            }
            ResolvedKind::Schema(name) => Some(err(
                "WIREC-POLY-0008",
                format!(
                    "member {:?} is polymorphic but {:?} is a declared type; a polymorphic member's type names the generated union and must not be declared",
                    m.name, name
                ),
                &m.ptr,
            )),
            _ => Some(err(
                "WIREC-POLY-0008",
                format!(
                    "member {:?} of type {:?} cannot be polymorphic",
                    m.name,
                    m.ty.display_name()
                ),
                &m.ptr,
            )),
        }
    })
}

/// Anything that establishes polymorphism (a tag property, a mode) needs an
/// actual variant table to dispatch over.
fn rule_variants_present(_ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    collect_members(ty, |m| {
        let poly = m.polymorphic.as_ref()?;
        if poly.variants.is_empty() {
            Some(err(
                "WIREC-POLY-0007",
                format!(
                    "member {:?} establishes polymorphism but declares no variants",
                    m.name
                ),
                &m.ptr,
            ))
        } else {
            None
        }
    })
}

fn rule_variant_tags(_ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for m in &ty.members {
        let Some(poly) = &m.polymorphic else { continue };
        let mut seen: BTreeMap<i64, &str> = BTreeMap::new();
        for v in &poly.variants {
            if v.tag == 0 {
                out.push(err(
                    "WIREC-POLY-0006",
                    format!(
                        "member {:?} assigns tag 0 to variant {:?}; tag 0 is reserved for the not-set case",
                        m.name, v.ty_name
                    ),
                    &m.ptr,
                ));
            }
            if let Some(first) = seen.insert(v.tag, v.ty_name.as_str()) {
                out.push(
                    err(
                        "WIREC-POLY-0004",
                        format!(
                            "member {:?} assigns tag {} to both {:?} and {:?}",
                            m.name, v.tag, first, v.ty_name
                        ),
                        &m.ptr,
                    )
                    .with("tag", v.tag),
                );
            }
        }
    }
    out
}

/// Tags must be encodable in the declared representation, and when the tag
/// type is a declared enum, every tag must be one of its values.
fn rule_variant_tag_range(ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for m in &ty.members {
        let Some(poly) = &m.polymorphic else { continue };
        let repr = poly.tag_type.repr();
        for v in &poly.variants {
            if !scalar_fits(repr, v.tag) {
                out.push(
                    err(
                        "WIREC-POLY-0011",
                        format!(
                            "member {:?} tag {} does not fit its {} representation",
                            m.name,
                            v.tag,
                            repr.name()
                        ),
                        &m.ptr,
                    )
                    .with("tag", v.tag),
                );
            }
            if let crate::model::TagType::Enum { name, .. } = &poly.tag_type {
                let declared = ctx
                    .enums
                    .get(name)
                    .is_some_and(|e| e.values.iter().any(|ev| ev.value == v.tag));
                if !declared {
                    out.push(err(
                        "WIREC-POLY-0011",
                        format!(
                            "member {:?} tag {} is not a declared value of enum {:?}",
                            m.name, v.tag, name
                        ),
                        &m.ptr,
                    ));
                }
            }
        }
    }
    out
}

fn rule_variant_types(ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for m in &ty.members {
        let Some(poly) = &m.polymorphic else { continue };
        for v in &poly.variants {
            if !ctx.is_schema_type(&v.ty_name) {
                out.push(err(
                    "WIREC-POLY-0005",
                    format!(
                        "member {:?} variant tag {} names {:?}, which is not a declared schema type",
                        m.name, v.tag, v.ty_name
                    ),
                    &m.ptr,
                ));
            }
        }
    }
    out
}

fn rule_tag_property(ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for m in &ty.members {
        let Some(poly) = &m.polymorphic else { continue };
        let Some(name) = &poly.tag_property else { continue };
        match poly.tag_property_index {
            None => out.push(err(
                "WIREC-POLY-0001",
                format!(
                    "member {:?} references tag member {:?}, which does not exist",
                    m.name, name
                ),
                &m.ptr,
            )),
            Some(target) => {
                let target_member = &ty.members[target];
                if target >= m.position {
                    out.push(err(
                        "WIREC-POLY-0002",
                        format!(
                            "tag member {:?} must be declared before the member {:?} that references it (decode reads it first)",
                            name, m.name
                        ),
                        &m.ptr,
                    ));
                }
                let target_repr = match &target_member.kind {
                    ResolvedKind::Scalar(s) => Some(*s),
                    ResolvedKind::Enum { repr, .. } => Some(*repr),
                    _ => None,
                };
                if target_repr != Some(poly.tag_type.repr()) {
                    out.push(err(
                        "WIREC-POLY-0003",
                        format!(
                            "tag member {:?} has type {:?} but the tag travels as {}; the representations must agree",
                            name,
                            target_member.ty.display_name(),
                            poly.tag_type.repr().name()
                        ),
                        &m.ptr,
                    ));
                }
                // A scalar-position union is optional; its not-set case
                // puts 0 in the tag slot, so an enum-typed slot must be
                // able to hold 0.
                if matches!(m.kind, ResolvedKind::Union(_)) {
                    if let ResolvedKind::Enum { name: enum_name, .. } = &target_member.kind {
                        let has_zero = ctx
                            .enums
                            .get(enum_name)
                            .is_some_and(|e| e.values.iter().any(|v| v.value == 0));
                        if !has_zero {
                            out.push(err(
                                "WIREC-POLY-0012",
                                format!(
                                    "tag member {:?} has enum type {:?}, which declares no zero value for the not-set case of {:?}",
                                    name, enum_name, m.name
                                ),
                                &m.ptr,
                            ));
                        }
                    }
                }
            }
        }
    }
    out
}

fn rule_tag_type_integer(_ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    collect_members(ty, |m| {
        let poly = m.polymorphic.as_ref()?;
        if !poly.tag_type.repr().is_integer() {
            Some(err(
                "WIREC-POLY-0009",
                format!(
                    "member {:?} declares tag representation {}, which is not an integer",
                    m.name,
                    poly.tag_type.repr().name()
                ),
                &m.ptr,
            ))
        } else {
            None
        }
    })
}

/// Two members naming the same union must agree on its variant table; the
/// union is generated once.
fn rule_union_consistency(ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for m in &ty.members {
        let Some(poly) = &m.polymorphic else { continue };
        if poly.variants.is_empty() {
            continue;
        }
        let union_name = match (&m.kind, m.collection.as_ref().map(|c| &c.elem.kind)) {
            (ResolvedKind::Union(n), _) => n.clone(),
            (_, Some(ResolvedKind::Union(n))) => n.clone(),
            _ => continue,
        };
        if let Some(canonical) = ctx.unions.get(&union_name) {
            if !same_variants(canonical, poly) {
                out.push(err(
                    "WIREC-POLY-0010",
                    format!(
                        "member {:?} declares union {:?} with a variant table that differs from its first declaration",
                        m.name, union_name
                    ),
                    &m.ptr,
                ));
            }
        }
    }
    out
}

fn same_variants(a: &PolySpec, b: &PolySpec) -> bool {
    a.variants == b.variants && a.tag_type.repr() == b.tag_type.repr()
}

/// A custom codec takes over all three operations for the member; explicit
/// collection or polymorphic configuration on the same member would be
/// silently dead, so it is rejected.
fn rule_codec_exclusivity(_ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    collect_members(ty, |m| {
        if m.codec.is_none() {
            return None;
        }
        let has_coll_config = m
            .collection
            .as_ref()
            .is_some_and(|c: &CollectionSpec| c.raw != Default::default());
        if has_coll_config || m.polymorphic.is_some() {
            Some(err(
                "WIREC-CODEC-0001",
                format!(
                    "member {:?} delegates to a custom codec; collection/polymorphic configuration on it would be ignored",
                    m.name
                ),
                &m.ptr,
            ))
        } else {
            None
        }
    })
}

/// A member's slot can stand in for one external value only: carrying both
/// a collection count and a discriminator would need two different wire
/// values in one slot.
fn rule_single_reference_role(_ctx: &DocContext, ty: &SchemaType) -> Vec<Diagnostic> {
    collect_members(ty, |m| {
        if m.count_source_for.is_some() && m.discriminator_for.is_some() {
            Some(err(
                "WIREC-TYPE-0004",
                format!(
                    "member {:?} is referenced both as a count source and as a discriminator",
                    m.name
                ),
                &m.ptr,
            ))
        } else {
            None
        }
    })
}

fn collect_members(
    ty: &SchemaType,
    f: impl Fn(&SchemaMember) -> Option<Diagnostic>,
) -> Vec<Diagnostic> {
    ty.members.iter().filter_map(f).collect()
}

fn scalar_fits(s: Scalar, v: i64) -> bool {
    match s {
        Scalar::U8 => u8::try_from(v).is_ok(),
        Scalar::I8 => i8::try_from(v).is_ok(),
        Scalar::U16 => u16::try_from(v).is_ok(),
        Scalar::I16 => i16::try_from(v).is_ok(),
        Scalar::U32 => u32::try_from(v).is_ok(),
        Scalar::I32 => i32::try_from(v).is_ok(),
        Scalar::U64 => v >= 0,
        Scalar::I64 => true,
        Scalar::F32 | Scalar::F64 | Scalar::Bool => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wirec_contracts::WIRE_SCHEMA_VERSION;

    use crate::extract::extract_doc;
    use crate::refine::refine_doc;
    use crate::schema_ast::parse_schema_json;

    use super::*;

    fn diags(doc: serde_json::Value) -> Vec<Diagnostic> {
        let bytes = serde_json::to_vec(&doc).expect("encode doc");
        let raw = parse_schema_json(&bytes).expect("parse doc");
        let extracted = extract_doc(&raw).expect("extract");
        let (ctx, types) = refine_doc(&raw, &extracted);
        validate_doc(&ctx, &types)
    }

    fn doc(types: serde_json::Value) -> serde_json::Value {
        json!({
            "schema_version": WIRE_SCHEMA_VERSION,
            "module": "net",
            "types": types,
        })
    }

    fn codes(diags: &[Diagnostic]) -> Vec<&str> {
        diags.iter().map(|d| d.code.as_str()).collect()
    }

    #[test]
    fn clean_document_validates() {
        let out = diags(doc(json!([
            {
                "name": "Login",
                "members": [
                    {"name": "user", "type": "string"},
                    {"name": "attempts", "type": "u16"},
                    {"name": "ids", "type": "vec<u32>"},
                ],
            },
        ])));
        assert!(out.is_empty(), "unexpected diags: {out:?}");
    }

    #[test]
    fn unresolved_count_ref_is_reported() {
        let out = diags(doc(json!([
            {
                "name": "T",
                "members": [
                    {"name": "items", "type": "vec<u32>", "collection": {"count_ref": "missing"}},
                ],
            },
        ])));
        assert_eq!(codes(&out), ["WIREC-COLL-0001"]);
    }

    #[test]
    fn count_ref_declared_after_collection_is_an_ordering_violation() {
        let out = diags(doc(json!([
            {
                "name": "T",
                "members": [
                    {"name": "items", "type": "vec<u32>", "collection": {"count_ref": "count"}},
                    {"name": "count", "type": "u16"},
                ],
            },
        ])));
        assert_eq!(codes(&out), ["WIREC-COLL-0003"]);
    }

    #[test]
    fn count_ref_must_be_an_integer_member() {
        let out = diags(doc(json!([
            {
                "name": "T",
                "members": [
                    {"name": "count", "type": "f32"},
                    {"name": "items", "type": "vec<u32>", "collection": {"count_ref": "count"}},
                ],
            },
        ])));
        assert_eq!(codes(&out), ["WIREC-COLL-0002"]);
    }

    #[test]
    fn conflicting_count_strategies_are_rejected() {
        let out = diags(doc(json!([
            {
                "name": "T",
                "members": [
                    {
                        "name": "items",
                        "type": "vec<u32>",
                        "collection": {"fixed_count": 4, "count_type": "u16"},
                    },
                ],
            },
        ])));
        assert_eq!(codes(&out), ["WIREC-COLL-0004"]);
    }

    #[test]
    fn duplicate_variant_tags_are_rejected() {
        let out = diags(doc(json!([
            {"name": "A", "members": []},
            {"name": "B", "members": []},
            {
                "name": "T",
                "members": [
                    {
                        "name": "entity",
                        "type": "Entity",
                        "polymorphic": {"variants": [
                            {"tag": 1, "type": "A"},
                            {"tag": 1, "type": "B"},
                        ]},
                    },
                ],
            },
        ])));
        assert_eq!(codes(&out), ["WIREC-POLY-0004"]);
    }

    #[test]
    fn variant_tag_zero_is_reserved() {
        let out = diags(doc(json!([
            {"name": "A", "members": []},
            {
                "name": "T",
                "members": [
                    {
                        "name": "entity",
                        "type": "Entity",
                        "polymorphic": {"variants": [{"tag": 0, "type": "A"}]},
                    },
                ],
            },
        ])));
        assert_eq!(codes(&out), ["WIREC-POLY-0006"]);
    }

    #[test]
    fn variant_type_must_be_declared() {
        let out = diags(doc(json!([
            {
                "name": "T",
                "members": [
                    {
                        "name": "entity",
                        "type": "Entity",
                        "polymorphic": {"variants": [{"tag": 1, "type": "Ghost"}]},
                    },
                ],
            },
        ])));
        assert_eq!(codes(&out), ["WIREC-POLY-0005"]);
    }

    #[test]
    fn tag_property_must_exist_and_precede_and_match_width() {
        let out = diags(doc(json!([
            {"name": "A", "members": []},
            {
                "name": "T",
                "members": [
                    {
                        "name": "entity",
                        "type": "Entity",
                        "polymorphic": {
                            "tag_property": "kind",
                            "tag_type": "u8",
                            "variants": [{"tag": 1, "type": "A"}],
                        },
                    },
                    {"name": "kind", "type": "u16"},
                ],
            },
        ])));
        // Declared after the referencing member and of the wrong width.
        let mut got = codes(&out);
        got.sort();
        assert_eq!(got, ["WIREC-POLY-0002", "WIREC-POLY-0003"]);
    }

    #[test]
    fn unbounded_shared_tag_combination_is_rejected() {
        let out = diags(doc(json!([
            {"name": "A", "members": []},
            {
                "name": "T",
                "members": [
                    {
                        "name": "items",
                        "type": "vec<Entity>",
                        "collection": {"unbounded": true, "mode": "shared_tag", "tag_type": "u8"},
                        "polymorphic": {"variants": [{"tag": 1, "type": "A"}]},
                    },
                ],
            },
        ])));
        assert!(
            codes(&out).contains(&"WIREC-COLL-0007"),
            "missing WIREC-COLL-0007 in {out:?}"
        );
    }

    #[test]
    fn pooled_unbounded_combination_is_rejected() {
        let out = diags(doc(json!([
            {
                "name": "T",
                "members": [
                    {"name": "data", "type": "pooled", "collection": {"unbounded": true}},
                ],
            },
        ])));
        assert_eq!(codes(&out), ["WIREC-POOL-0002"]);
    }

    #[test]
    fn polymorphic_on_declared_type_is_invalid_context() {
        let out = diags(doc(json!([
            {"name": "A", "members": []},
            {
                "name": "T",
                "members": [
                    {
                        "name": "entity",
                        "type": "A",
                        "polymorphic": {"variants": [{"tag": 1, "type": "A"}]},
                    },
                ],
            },
        ])));
        assert_eq!(codes(&out), ["WIREC-POLY-0008"]);
    }

    #[test]
    fn tag_property_without_variants_is_reported() {
        let out = diags(doc(json!([
            {
                "name": "T",
                "members": [
                    {"name": "kind", "type": "u8"},
                    {
                        "name": "items",
                        "type": "vec<u32>",
                        "collection": {"tag_property": "kind"},
                    },
                ],
            },
        ])));
        assert!(
            codes(&out).contains(&"WIREC-POLY-0007"),
            "missing WIREC-POLY-0007 in {out:?}"
        );
    }

    #[test]
    fn codec_with_collection_config_is_rejected() {
        let out = diags(doc(json!([
            {
                "name": "T",
                "members": [
                    {
                        "name": "blob",
                        "type": "vec<u8>",
                        "codec": "crate::codecs::BlobCodec",
                        "collection": {"count_type": "u16"},
                    },
                ],
            },
        ])));
        assert_eq!(codes(&out), ["WIREC-CODEC-0001"]);
    }

    #[test]
    fn duplicate_member_names_across_base_chain_are_rejected() {
        let out = diags(doc(json!([
            {"name": "Base", "members": [{"name": "id", "type": "u32"}]},
            {
                "name": "Derived",
                "base": "Base",
                "members": [{"name": "id", "type": "u32"}],
            },
        ])));
        assert_eq!(codes(&out), ["WIREC-TYPE-0001"]);
    }

    #[test]
    fn oversized_tag_for_its_representation_is_rejected() {
        let out = diags(doc(json!([
            {"name": "A", "members": []},
            {
                "name": "T",
                "members": [
                    {
                        "name": "entity",
                        "type": "Entity",
                        "polymorphic": {"tag_type": "u8", "variants": [{"tag": 300, "type": "A"}]},
                    },
                ],
            },
        ])));
        assert_eq!(codes(&out), ["WIREC-POLY-0011"]);
    }

    #[test]
    fn enum_value_must_fit_its_repr() {
        let out = diags(json!({
            "schema_version": WIRE_SCHEMA_VERSION,
            "module": "net",
            "enums": [{"name": "Kind", "repr": "u8", "values": [
                {"name": "Big", "value": 900},
            ]}],
            "types": [],
        }));
        assert_eq!(codes(&out), ["WIREC-ENUM-0002"]);
    }

    #[test]
    fn a_member_cannot_be_count_source_and_discriminator_at_once() {
        let out = diags(doc(json!([
            {"name": "A", "members": []},
            {
                "name": "T",
                "members": [
                    {"name": "slot", "type": "u8"},
                    {
                        "name": "items",
                        "type": "vec<Entity>",
                        "collection": {"count_ref": "slot", "tag_property": "slot"},
                        "polymorphic": {"variants": [{"tag": 1, "type": "A"}]},
                    },
                ],
            },
        ])));
        assert!(
            codes(&out).contains(&"WIREC-TYPE-0004"),
            "missing WIREC-TYPE-0004 in {out:?}"
        );
    }

    #[test]
    fn nested_collection_elements_are_rejected() {
        let out = diags(doc(json!([
            {
                "name": "T",
                "members": [
                    {"name": "grid", "type": "vec<vec<u8>>"},
                ],
            },
        ])));
        assert_eq!(codes(&out), ["WIREC-COLL-0009"]);
    }
}
