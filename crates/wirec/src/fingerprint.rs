use crate::compile::{CompileErrorKind, CompilerError};
use crate::schema_ast;

/// Stable fingerprint of a schema document, independent of key order and
/// whitespace. Stamped into the generated header so regeneration from an
/// unchanged document produces an identical file.
pub(crate) fn document_fingerprint(bytes: &[u8]) -> Result<String, CompilerError> {
    let canon = schema_ast::canonical_bytes(bytes)
        .map_err(|e| CompilerError::new(CompileErrorKind::Parse, e.to_string()))?;
    let hash = blake3::hash(&canon);
    Ok(hash.to_hex().as_str()[..16].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_across_formatting() {
        let a = br#"{"module":"m","schema_version":"s","types":[]}"#;
        let b = b"{\n  \"types\": [],\n  \"module\": \"m\",\n  \"schema_version\": \"s\"\n}";
        assert_eq!(
            document_fingerprint(a).expect("fingerprint"),
            document_fingerprint(b).expect("fingerprint")
        );
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let a = br#"{"module":"m","schema_version":"s","types":[]}"#;
        let b = br#"{"module":"n","schema_version":"s","types":[]}"#;
        assert_ne!(
            document_fingerprint(a).expect("fingerprint"),
            document_fingerprint(b).expect("fingerprint")
        );
    }

    #[test]
    fn fingerprint_is_sixteen_hex_chars() {
        let fp = document_fingerprint(br#"{"a":1}"#).expect("fingerprint");
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
