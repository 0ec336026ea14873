//! Schema document front-end.
//!
//! Documents are JSON (`*.wire.json`), pinned by `schema_version`. Parsing
//! is a hand-rolled walk over `serde_json::Value` so every failure carries
//! a JSON pointer into the document. Unknown fields are rejected: a typo'd
//! configuration key must not silently change a wire layout.

use std::collections::BTreeMap;
use std::fmt::Display;

use serde_json::{Map, Value};
use wirec_contracts::WIRE_SCHEMA_VERSIONS_SUPPORTED;

use crate::model::{
    DefaultCodec, EnumDecl, EnumValue, PolyMode, RawCollection, RawCtor, RawCtorParam, RawDoc,
    RawMember, RawPoly, RawTypeDecl, RawVariant, Scalar, TagType, TypeRef,
};
use crate::names;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaAstError {
    pub message: String,
    pub ptr: String,
}

impl Display for SchemaAstError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ptr.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} (at {})", self.message, self.ptr)
        }
    }
}

fn err(message: impl Into<String>, ptr: impl Into<String>) -> SchemaAstError {
    SchemaAstError {
        message: message.into(),
        ptr: ptr.into(),
    }
}

pub fn parse_schema_json(bytes: &[u8]) -> Result<RawDoc, SchemaAstError> {
    let root: Value = serde_json::from_slice(bytes)
        .map_err(|e| err(format!("document must be JSON: {e}"), ""))?;
    parse_schema_value(&root)
}

fn parse_schema_value(root: &Value) -> Result<RawDoc, SchemaAstError> {
    let root_obj = root
        .as_object()
        .ok_or_else(|| err("document root must be an object", ""))?;
    check_known_keys(
        root_obj,
        "",
        &["schema_version", "module", "types", "enums", "default_codecs"],
    )?;

    let schema_version = get_required_string(root_obj, "", "schema_version")?;
    if !WIRE_SCHEMA_VERSIONS_SUPPORTED.contains(&schema_version.as_str()) {
        return Err(err(
            format!(
                "unsupported schema_version {schema_version:?} (supported: {})",
                WIRE_SCHEMA_VERSIONS_SUPPORTED.join(", ")
            ),
            "/schema_version",
        ));
    }

    let module = get_required_string(root_obj, "", "module")?;
    names::validate_module_name(&module).map_err(|message| err(message, "/module"))?;

    let mut enums = Vec::new();
    if let Some(enums_v) = root_obj.get("enums") {
        let enums_a = enums_v
            .as_array()
            .ok_or_else(|| err("enums must be an array", "/enums"))?;
        for (eidx, e) in enums_a.iter().enumerate() {
            enums.push(parse_enum_decl(e, &format!("/enums/{eidx}"))?);
        }
    }

    let types_v = root_obj
        .get("types")
        .ok_or_else(|| err("missing required field: types", ""))?;
    let types_a = types_v
        .as_array()
        .ok_or_else(|| err("types must be an array", "/types"))?;
    let mut types = Vec::new();
    for (tidx, t) in types_a.iter().enumerate() {
        types.push(parse_type_decl(t, &format!("/types/{tidx}"))?);
    }

    let mut default_codecs = Vec::new();
    if let Some(dc_v) = root_obj.get("default_codecs") {
        let dc_a = dc_v
            .as_array()
            .ok_or_else(|| err("default_codecs must be an array", "/default_codecs"))?;
        for (didx, d) in dc_a.iter().enumerate() {
            let dptr = format!("/default_codecs/{didx}");
            let dobj = d
                .as_object()
                .ok_or_else(|| err("default_codecs entry must be an object", dptr.as_str()))?;
            check_known_keys(dobj, &dptr, &["type", "codec"])?;
            default_codecs.push(DefaultCodec {
                target: get_required_string(dobj, &dptr, "type")?,
                codec: get_required_string(dobj, &dptr, "codec")?,
            });
        }
    }

    Ok(RawDoc {
        module,
        types,
        enums,
        default_codecs,
    })
}

fn parse_enum_decl(v: &Value, ptr: &str) -> Result<EnumDecl, SchemaAstError> {
    let obj = v
        .as_object()
        .ok_or_else(|| err("enum decl must be an object", ptr))?;
    check_known_keys(obj, ptr, &["name", "repr", "values"])?;

    let name = get_required_string(obj, ptr, "name")?;
    names::validate_type_name(&name).map_err(|message| err(message, format!("{ptr}/name")))?;

    let repr_name = get_optional_string(obj, ptr, "repr")?.unwrap_or_else(|| "i32".to_string());
    let repr = Scalar::parse_named(&repr_name)
        .filter(|s| s.is_integer())
        .ok_or_else(|| {
            err(
                format!("enum repr must be an integer scalar, got {repr_name:?}"),
                format!("{ptr}/repr"),
            )
        })?;

    let values_v = obj
        .get("values")
        .ok_or_else(|| err("missing required field: values", ptr))?;
    let values_a = values_v
        .as_array()
        .ok_or_else(|| err("values must be an array", format!("{ptr}/values")))?;
    let mut values = Vec::new();
    for (vidx, entry) in values_a.iter().enumerate() {
        let vptr = format!("{ptr}/values/{vidx}");
        let vobj = entry
            .as_object()
            .ok_or_else(|| err("enum value must be an object", vptr.as_str()))?;
        check_known_keys(vobj, &vptr, &["name", "value"])?;
        let vname = get_required_string(vobj, &vptr, "name")?;
        names::validate_type_name(&vname)
            .map_err(|message| err(message, format!("{vptr}/name")))?;
        let value = get_required_i64(vobj, &vptr, "value")?;
        values.push(EnumValue { name: vname, value });
    }

    Ok(EnumDecl {
        name,
        repr,
        values,
        ptr: ptr.to_string(),
    })
}

fn parse_type_decl(v: &Value, ptr: &str) -> Result<RawTypeDecl, SchemaAstError> {
    let obj = v
        .as_object()
        .ok_or_else(|| err("type decl must be an object", ptr))?;
    check_known_keys(
        obj,
        ptr,
        &[
            "name",
            "base",
            "kind",
            "members",
            "nested",
            "ctors",
            "has_release",
            "needs_default",
        ],
    )?;

    let name = get_required_string(obj, ptr, "name")?;
    names::validate_type_name(&name).map_err(|message| err(message, format!("{ptr}/name")))?;

    let base = get_optional_string(obj, ptr, "base")?;

    let is_value = match get_optional_string(obj, ptr, "kind")?.as_deref() {
        None | Some("struct") => false,
        Some("value") => true,
        Some(other) => {
            return Err(err(
                format!("type kind must be \"struct\" or \"value\", got {other:?}"),
                format!("{ptr}/kind"),
            ))
        }
    };

    let members_v = obj
        .get("members")
        .ok_or_else(|| err("missing required field: members", ptr))?;
    let members_a = members_v
        .as_array()
        .ok_or_else(|| err("members must be an array", format!("{ptr}/members")))?;
    let mut members = Vec::new();
    for (midx, m) in members_a.iter().enumerate() {
        members.push(parse_member(m, &format!("{ptr}/members/{midx}"))?);
    }

    let mut nested = Vec::new();
    if let Some(nested_v) = obj.get("nested") {
        let nested_a = nested_v
            .as_array()
            .ok_or_else(|| err("nested must be an array", format!("{ptr}/nested")))?;
        for (nidx, n) in nested_a.iter().enumerate() {
            nested.push(parse_type_decl(n, &format!("{ptr}/nested/{nidx}"))?);
        }
    }

    let mut ctors = Vec::new();
    if let Some(ctors_v) = obj.get("ctors") {
        let ctors_a = ctors_v
            .as_array()
            .ok_or_else(|| err("ctors must be an array", format!("{ptr}/ctors")))?;
        for (cidx, c) in ctors_a.iter().enumerate() {
            ctors.push(parse_ctor(c, &format!("{ptr}/ctors/{cidx}"))?);
        }
    }

    Ok(RawTypeDecl {
        name,
        base,
        is_value,
        members,
        nested,
        ctors,
        has_release: get_optional_bool(obj, ptr, "has_release")?,
        needs_default: get_optional_bool(obj, ptr, "needs_default")?,
        ptr: ptr.to_string(),
    })
}

fn parse_ctor(v: &Value, ptr: &str) -> Result<RawCtor, SchemaAstError> {
    let obj = v
        .as_object()
        .ok_or_else(|| err("ctor must be an object", ptr))?;
    check_known_keys(obj, ptr, &["params"])?;
    let params_v = obj
        .get("params")
        .ok_or_else(|| err("missing required field: params", ptr))?;
    let params_a = params_v
        .as_array()
        .ok_or_else(|| err("params must be an array", format!("{ptr}/params")))?;
    let mut params = Vec::new();
    for (pidx, p) in params_a.iter().enumerate() {
        let pptr = format!("{ptr}/params/{pidx}");
        let pobj = p
            .as_object()
            .ok_or_else(|| err("param must be an object", pptr.as_str()))?;
        check_known_keys(pobj, &pptr, &["name", "type"])?;
        params.push(RawCtorParam {
            name: get_required_string(pobj, &pptr, "name")?,
            ty_name: get_required_string(pobj, &pptr, "type")?,
        });
    }
    Ok(RawCtor { params })
}

fn parse_member(v: &Value, ptr: &str) -> Result<RawMember, SchemaAstError> {
    let obj = v
        .as_object()
        .ok_or_else(|| err("member must be an object", ptr))?;
    check_known_keys(
        obj,
        ptr,
        &[
            "name",
            "type",
            "collection",
            "polymorphic",
            "codec",
            "readonly",
            "init_only",
            "ignored",
        ],
    )?;

    let name = get_required_string(obj, ptr, "name")?;
    names::validate_member_name(&name).map_err(|message| err(message, format!("{ptr}/name")))?;

    let ty_name = get_required_string(obj, ptr, "type")?;
    let ty = parse_type_ref(&ty_name, &format!("{ptr}/type"))?;

    let collection = match obj.get("collection") {
        Some(c) => Some(parse_collection(c, &format!("{ptr}/collection"))?),
        None => None,
    };
    let polymorphic = match obj.get("polymorphic") {
        Some(p) => Some(parse_poly(p, &format!("{ptr}/polymorphic"))?),
        None => None,
    };

    Ok(RawMember {
        name,
        ty,
        collection,
        polymorphic,
        codec: get_optional_string(obj, ptr, "codec")?,
        readonly: get_optional_bool(obj, ptr, "readonly")?,
        init_only: get_optional_bool(obj, ptr, "init_only")?,
        ignored: get_optional_bool(obj, ptr, "ignored")?,
        ptr: ptr.to_string(),
    })
}

/// Member type syntax: a scalar name, `string`, `pooled`, `vec<T>`, or a
/// declared type name.
fn parse_type_ref(s: &str, ptr: &str) -> Result<TypeRef, SchemaAstError> {
    let s = s.trim();
    if let Some(scalar) = Scalar::parse_named(s) {
        return Ok(TypeRef::Scalar(scalar));
    }
    if s == "string" {
        return Ok(TypeRef::Text);
    }
    if s == "pooled" {
        return Ok(TypeRef::Pooled);
    }
    if let Some(inner) = s.strip_prefix("vec<") {
        let inner = inner
            .strip_suffix('>')
            .ok_or_else(|| err(format!("unterminated vec<...> in {s:?}"), ptr))?;
        if inner.trim().is_empty() {
            return Err(err("vec<> needs an element type", ptr));
        }
        return Ok(TypeRef::Vec(Box::new(parse_type_ref(inner, ptr)?)));
    }
    names::validate_type_name(s).map_err(|message| err(message, ptr))?;
    Ok(TypeRef::Named(s.to_string()))
}

fn parse_collection(v: &Value, ptr: &str) -> Result<RawCollection, SchemaAstError> {
    let obj = v
        .as_object()
        .ok_or_else(|| err("collection config must be an object", ptr))?;
    check_known_keys(
        obj,
        ptr,
        &[
            "count_type",
            "fixed_count",
            "count_ref",
            "unbounded",
            "mode",
            "tag_property",
            "tag_type",
        ],
    )?;

    let count_type = match get_optional_string(obj, ptr, "count_type")? {
        Some(name) => Some(Scalar::parse_named(&name).ok_or_else(|| {
            err(
                format!("unknown count_type {name:?}"),
                format!("{ptr}/count_type"),
            )
        })?),
        None => None,
    };

    let fixed_count = match obj.get("fixed_count") {
        Some(v) => Some(v.as_i64().ok_or_else(|| {
            err(
                "fixed_count must be an integer",
                format!("{ptr}/fixed_count"),
            )
        })?),
        None => None,
    };

    let mode = match get_optional_string(obj, ptr, "mode")?.as_deref() {
        None => None,
        Some("none") => Some(PolyMode::None),
        Some("shared_tag") => Some(PolyMode::SingleSharedTag),
        Some("per_element_tag") => Some(PolyMode::PerElementTag),
        Some(other) => {
            return Err(err(
                format!(
                    "mode must be \"none\", \"shared_tag\" or \"per_element_tag\", got {other:?}"
                ),
                format!("{ptr}/mode"),
            ))
        }
    };

    let tag_type = match get_optional_string(obj, ptr, "tag_type")? {
        Some(name) => Some(parse_tag_type(&name, &format!("{ptr}/tag_type"))?),
        None => None,
    };

    Ok(RawCollection {
        count_type,
        fixed_count,
        count_ref: get_optional_string(obj, ptr, "count_ref")?,
        unbounded: get_optional_bool(obj, ptr, "unbounded")?,
        mode,
        tag_property: get_optional_string(obj, ptr, "tag_property")?,
        tag_type,
    })
}

fn parse_poly(v: &Value, ptr: &str) -> Result<RawPoly, SchemaAstError> {
    let obj = v
        .as_object()
        .ok_or_else(|| err("polymorphic config must be an object", ptr))?;
    check_known_keys(obj, ptr, &["tag_property", "tag_type", "variants"])?;

    let tag_type = match get_optional_string(obj, ptr, "tag_type")? {
        Some(name) => Some(parse_tag_type(&name, &format!("{ptr}/tag_type"))?),
        None => None,
    };

    let mut variants = Vec::new();
    if let Some(variants_v) = obj.get("variants") {
        let variants_a = variants_v
            .as_array()
            .ok_or_else(|| err("variants must be an array", format!("{ptr}/variants")))?;
        for (vidx, entry) in variants_a.iter().enumerate() {
            let vptr = format!("{ptr}/variants/{vidx}");
            let vobj = entry
                .as_object()
                .ok_or_else(|| err("variant must be an object", vptr.as_str()))?;
            check_known_keys(vobj, &vptr, &["tag", "type"])?;
            variants.push(RawVariant {
                tag: get_required_i64(vobj, &vptr, "tag")?,
                ty_name: get_required_string(vobj, &vptr, "type")?,
            });
        }
    }

    Ok(RawPoly {
        tag_property: get_optional_string(obj, ptr, "tag_property")?,
        tag_type,
        variants,
    })
}

/// Tag type syntax: an integer scalar name, or `enum:Name` for a declared
/// enum (the tag then travels as that enum's repr).
fn parse_tag_type(s: &str, ptr: &str) -> Result<TagType, SchemaAstError> {
    if let Some(enum_name) = s.strip_prefix("enum:") {
        names::validate_type_name(enum_name).map_err(|message| err(message, ptr))?;
        return Ok(TagType::Enum {
            name: enum_name.to_string(),
            // Placeholder repr; refinement substitutes the declared one.
            repr: Scalar::I32,
        });
    }
    let scalar = Scalar::parse_named(s)
        .ok_or_else(|| err(format!("unknown tag_type {s:?}"), ptr))?;
    Ok(TagType::Scalar(scalar))
}

// ---------------------------------------------------------------------------
// Object helpers
// ---------------------------------------------------------------------------

fn check_known_keys(
    obj: &Map<String, Value>,
    ptr: &str,
    known: &[&str],
) -> Result<(), SchemaAstError> {
    for key in obj.keys() {
        if !known.contains(&key.as_str()) {
            return Err(err(
                format!("unknown field {key:?} (known: {})", known.join(", ")),
                format!("{ptr}/{key}"),
            ));
        }
    }
    Ok(())
}

fn get_required_string(
    obj: &Map<String, Value>,
    ptr: &str,
    key: &str,
) -> Result<String, SchemaAstError> {
    let v = obj
        .get(key)
        .ok_or_else(|| err(format!("missing required field: {key}"), ptr))?;
    v.as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| err(format!("{key} must be a string"), format!("{ptr}/{key}")))
}

fn get_optional_string(
    obj: &Map<String, Value>,
    ptr: &str,
    key: &str,
) -> Result<Option<String>, SchemaAstError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| err(format!("{key} must be a string"), format!("{ptr}/{key}"))),
    }
}

fn get_optional_bool(
    obj: &Map<String, Value>,
    ptr: &str,
    key: &str,
) -> Result<bool, SchemaAstError> {
    match obj.get(key) {
        None => Ok(false),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| err(format!("{key} must be a bool"), format!("{ptr}/{key}"))),
    }
}

fn get_required_i64(
    obj: &Map<String, Value>,
    ptr: &str,
    key: &str,
) -> Result<i64, SchemaAstError> {
    let v = obj
        .get(key)
        .ok_or_else(|| err(format!("missing required field: {key}"), ptr))?;
    v.as_i64()
        .ok_or_else(|| err(format!("{key} must be an integer"), format!("{ptr}/{key}")))
}

/// Canonical bytes for fingerprinting: the document re-serialized with
/// sorted keys, so formatting differences do not change the fingerprint.
pub fn canonical_bytes(bytes: &[u8]) -> Result<Vec<u8>, SchemaAstError> {
    let root: Value = serde_json::from_slice(bytes)
        .map_err(|e| err(format!("document must be JSON: {e}"), ""))?;
    let canon = sort_value(root);
    serde_json::to_vec(&canon).map_err(|e| err(format!("re-serialization failed: {e}"), ""))
}

fn sort_value(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map.into_iter().collect();
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k, sort_value(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_value).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wirec_contracts::WIRE_SCHEMA_VERSION;

    use super::*;

    fn doc(types: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "schema_version": WIRE_SCHEMA_VERSION,
            "module": "net",
            "types": types,
        }))
        .expect("encode doc")
    }

    #[test]
    fn parses_a_minimal_type() {
        let bytes = doc(json!([{
            "name": "Ping",
            "members": [{"name": "seq", "type": "u32"}],
        }]));
        let parsed = parse_schema_json(&bytes).expect("parse");
        assert_eq!(parsed.module, "net");
        assert_eq!(parsed.types.len(), 1);
        let m = &parsed.types[0].members[0];
        assert_eq!(m.name, "seq");
        assert_eq!(m.ty, TypeRef::Scalar(Scalar::U32));
    }

    #[test]
    fn rejects_unknown_member_fields() {
        let bytes = doc(json!([{
            "name": "Ping",
            "members": [{"name": "seq", "type": "u32", "cuont_ref": "n"}],
        }]));
        let e = parse_schema_json(&bytes).expect_err("unknown field");
        assert!(e.message.contains("cuont_ref"), "message: {}", e.message);
        assert_eq!(e.ptr, "/types/0/members/0/cuont_ref");
    }

    #[test]
    fn rejects_unsupported_schema_version() {
        let bytes = serde_json::to_vec(&json!({
            "schema_version": "wirec.schema@9.9.9",
            "module": "net",
            "types": [],
        }))
        .expect("encode doc");
        let e = parse_schema_json(&bytes).expect_err("bad version");
        assert_eq!(e.ptr, "/schema_version");
    }

    #[test]
    fn parses_vec_type_syntax_recursively() {
        let ty = parse_type_ref("vec<vec<u8>>", "/t").expect("parse");
        assert_eq!(
            ty,
            TypeRef::Vec(Box::new(TypeRef::Vec(Box::new(TypeRef::Scalar(
                Scalar::U8
            )))))
        );
        assert!(parse_type_ref("vec<u8", "/t").is_err());
        assert!(parse_type_ref("vec<>", "/t").is_err());
    }

    #[test]
    fn parses_collection_and_polymorphic_config() {
        let bytes = doc(json!([{
            "name": "Pack",
            "members": [
                {"name": "count", "type": "u16"},
                {
                    "name": "items",
                    "type": "vec<Item>",
                    "collection": {
                        "count_ref": "count",
                        "mode": "per_element_tag",
                        "tag_type": "u8",
                    },
                    "polymorphic": {
                        "variants": [
                            {"tag": 1, "type": "ItemA"},
                            {"tag": 2, "type": "ItemB"},
                        ],
                    },
                },
            ],
        }]));
        let parsed = parse_schema_json(&bytes).expect("parse");
        let m = &parsed.types[0].members[1];
        let coll = m.collection.as_ref().expect("collection config");
        assert_eq!(coll.count_ref.as_deref(), Some("count"));
        assert_eq!(coll.mode, Some(PolyMode::PerElementTag));
        assert_eq!(coll.tag_type, Some(TagType::Scalar(Scalar::U8)));
        let poly = m.polymorphic.as_ref().expect("poly config");
        assert_eq!(poly.variants.len(), 2);
        assert_eq!(poly.variants[1].tag, 2);
    }

    #[test]
    fn enum_repr_must_be_integer() {
        let bytes = serde_json::to_vec(&json!({
            "schema_version": WIRE_SCHEMA_VERSION,
            "module": "net",
            "enums": [{"name": "Kind", "repr": "f32", "values": []}],
            "types": [],
        }))
        .expect("encode doc");
        let e = parse_schema_json(&bytes).expect_err("f32 repr");
        assert_eq!(e.ptr, "/enums/0/repr");
    }

    #[test]
    fn canonical_bytes_ignore_key_order() {
        let a = br#"{"module":"m","schema_version":"s","types":[]}"#;
        let b = br#"{"types":[],"schema_version":"s","module":"m"}"#;
        assert_eq!(
            canonical_bytes(a).expect("canon"),
            canonical_bytes(b).expect("canon")
        );
    }
}
