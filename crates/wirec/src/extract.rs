//! Schema extraction: flattens each declared type's base chain into one
//! ordered member list, base-first, each level in declaration order.
//!
//! No cross-member resolution happens here; count and tag references stay
//! opaque names for refinement. The one failure extraction can produce is
//! a base chain that cannot terminate (unknown base or a cycle), because
//! the walk itself needs it.

use std::collections::BTreeMap;

use crate::model::{RawDoc, RawMember, RawType, RawTypeDecl};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractError {
    pub message: String,
    pub ptr: String,
}

/// Extracts every top-level type of the document.
pub fn extract_doc(doc: &RawDoc) -> Result<Vec<RawType>, ExtractError> {
    let mut by_name = BTreeMap::new();
    collect_decls(&doc.types, &mut by_name);

    doc.types
        .iter()
        .map(|decl| extract_type(decl, &by_name))
        .collect()
}

fn collect_decls<'a>(
    decls: &'a [RawTypeDecl],
    by_name: &mut BTreeMap<String, &'a RawTypeDecl>,
) {
    for decl in decls {
        // First declaration wins; duplicates are reported by validation.
        by_name.entry(decl.name.clone()).or_insert(decl);
        collect_decls(&decl.nested, by_name);
    }
}

fn extract_type(
    decl: &RawTypeDecl,
    by_name: &BTreeMap<String, &RawTypeDecl>,
) -> Result<RawType, ExtractError> {
    let members = flatten_members(decl, by_name)?;

    let nested = decl
        .nested
        .iter()
        .map(|n| extract_type(n, by_name))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RawType {
        name: decl.name.clone(),
        is_value: decl.is_value,
        has_schema_base: decl.base.is_some(),
        members,
        nested,
        ctors: decl.ctors.clone(),
        has_release: decl.has_release,
        needs_default: decl.needs_default,
        ptr: decl.ptr.clone(),
    })
}

fn flatten_members(
    decl: &RawTypeDecl,
    by_name: &BTreeMap<String, &RawTypeDecl>,
) -> Result<Vec<RawMember>, ExtractError> {
    // Walk to the chain root, recording the path derived-first.
    let mut chain: Vec<&RawTypeDecl> = vec![decl];
    let mut cursor = decl;
    while let Some(base_name) = &cursor.base {
        let base = by_name.get(base_name.as_str()).ok_or_else(|| ExtractError {
            message: format!(
                "type {:?} names unknown base type {:?}",
                cursor.name, base_name
            ),
            ptr: format!("{}/base", cursor.ptr),
        })?;
        if chain.iter().any(|seen| seen.name == base.name) {
            return Err(ExtractError {
                message: format!("base chain of {:?} forms a cycle at {:?}", decl.name, base.name),
                ptr: format!("{}/base", cursor.ptr),
            });
        }
        chain.push(base);
        cursor = base;
    }

    // Base-first concatenation; `ignored` members carry no wire presence
    // and are dropped here.
    let mut members = Vec::new();
    for level in chain.iter().rev() {
        members.extend(level.members.iter().filter(|m| !m.ignored).cloned());
    }
    Ok(members)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wirec_contracts::WIRE_SCHEMA_VERSION;

    use crate::schema_ast::parse_schema_json;

    use super::*;

    fn parse(types: serde_json::Value) -> RawDoc {
        let bytes = serde_json::to_vec(&json!({
            "schema_version": WIRE_SCHEMA_VERSION,
            "module": "net",
            "types": types,
        }))
        .expect("encode doc");
        parse_schema_json(&bytes).expect("parse doc")
    }

    #[test]
    fn base_members_come_first_in_declaration_order() {
        let doc = parse(json!([
            {
                "name": "Derived",
                "base": "Base",
                "members": [
                    {"name": "c", "type": "u8"},
                    {"name": "d", "type": "u8"},
                ],
            },
            {
                "name": "Base",
                "members": [
                    {"name": "a", "type": "u8"},
                    {"name": "b", "type": "u8"},
                ],
            },
        ]));
        let extracted = extract_doc(&doc).expect("extract");
        let derived = &extracted[0];
        assert!(derived.has_schema_base);
        let names: Vec<&str> = derived.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
    }

    #[test]
    fn three_level_chains_flatten_root_first() {
        let doc = parse(json!([
            {"name": "A", "members": [{"name": "a", "type": "u8"}]},
            {"name": "B", "base": "A", "members": [{"name": "b", "type": "u8"}]},
            {"name": "C", "base": "B", "members": [{"name": "c", "type": "u8"}]},
        ]));
        let extracted = extract_doc(&doc).expect("extract");
        let c = &extracted[2];
        let names: Vec<&str> = c.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn ignored_members_are_dropped() {
        let doc = parse(json!([
            {
                "name": "T",
                "members": [
                    {"name": "kept", "type": "u8"},
                    {"name": "skipped", "type": "u8", "ignored": true},
                ],
            },
        ]));
        let extracted = extract_doc(&doc).expect("extract");
        assert_eq!(extracted[0].members.len(), 1);
        assert_eq!(extracted[0].members[0].name, "kept");
    }

    #[test]
    fn base_cycle_is_an_error_with_a_pointer() {
        let doc = parse(json!([
            {"name": "A", "base": "B", "members": []},
            {"name": "B", "base": "A", "members": []},
        ]));
        let e = extract_doc(&doc).expect_err("cycle");
        assert!(e.message.contains("cycle"), "message: {}", e.message);
        assert!(e.ptr.ends_with("/base"));
    }

    #[test]
    fn unknown_base_is_an_error() {
        let doc = parse(json!([
            {"name": "A", "base": "Missing", "members": []},
        ]));
        let e = extract_doc(&doc).expect_err("unknown base");
        assert!(e.message.contains("Missing"));
    }

    #[test]
    fn nested_types_are_extracted_recursively() {
        let doc = parse(json!([
            {
                "name": "Outer",
                "members": [{"name": "x", "type": "u8"}],
                "nested": [
                    {"name": "Inner", "members": [{"name": "y", "type": "u16"}]},
                ],
            },
        ]));
        let extracted = extract_doc(&doc).expect("extract");
        assert_eq!(extracted[0].nested.len(), 1);
        assert_eq!(extracted[0].nested[0].name, "Inner");
    }
}
