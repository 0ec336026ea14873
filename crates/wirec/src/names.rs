//! Identifier validation and casing helpers for document names and
//! generated Rust identifiers.

pub fn validate_module_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("module name must not be empty".to_string());
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('_');
    if !(first.is_ascii_lowercase() || first == '_') {
        return Err(format!(
            "invalid module name start (must be [a-z_]): {name:?}"
        ));
    }
    for c in chars {
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
            return Err(format!(
                "invalid module name char (allowed [a-z0-9_]): {name:?}"
            ));
        }
    }
    Ok(())
}

pub fn validate_type_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("type name must be non-empty".to_string());
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('_');
    if !first.is_ascii_alphabetic() {
        return Err(format!(
            "invalid type name start (must be [A-Za-z]): {name:?}"
        ));
    }
    for c in chars {
        if !(c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!(
                "invalid type name char (allowed [A-Za-z0-9_]): {name:?}"
            ));
        }
    }
    Ok(())
}

pub fn validate_member_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("member name must be non-empty".to_string());
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('_');
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(format!(
            "invalid member name start (must be [A-Za-z_]): {name:?}"
        ));
    }
    for c in chars {
        if !(c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!(
                "invalid member name char (allowed [A-Za-z0-9_]): {name:?}"
            ));
        }
    }
    Ok(())
}

/// Rust keywords that cannot be used as raw field names; generated code
/// prefixes them instead of failing.
const KEYWORDS: &[&str] = &[
    "as", "break", "const", "continue", "crate", "dyn", "else", "enum", "extern", "false", "fn",
    "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref",
    "return", "self", "static", "struct", "super", "trait", "true", "type", "unsafe", "use",
    "where", "while",
];

/// Member name as written -> generated field identifier (snake_case).
pub fn field_ident(name: &str) -> String {
    let snake = to_snake_case(name);
    if KEYWORDS.contains(&snake.as_str()) {
        format!("{snake}_")
    } else {
        snake
    }
}

/// Type name as written -> generated type identifier (PascalCase kept).
pub fn type_ident(name: &str) -> String {
    name.to_string()
}

pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            out.push(c);
        }
    }
    out
}

/// Sanitizes a Rust path (`crate::codecs::VarInt`) into an identifier
/// usable as a registry entry name.
pub fn path_ident(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}
