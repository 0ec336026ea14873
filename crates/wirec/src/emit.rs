//! Rust source emission.
//!
//! One document becomes one generated module: enum declarations, the
//! polymorphic unions, one struct + `Codec` impl per schema type, and the
//! custom-codec instance table. Per-type fragments are self-contained so
//! the batch driver can produce them in parallel and concatenate in
//! declaration order.
//!
//! The per-member logic here only dispatches on the strategy chosen by
//! `plan`; the strategy-specific arms for the three operations live in
//! `emit_size`, `emit_encode` and `emit_decode`.

use crate::compile::{CompileErrorKind, CompilerError};
use crate::model::{
    DocContext, EnumDecl, PolySpec, ResolvedKind, Scalar, SchemaMember, SchemaType, TypeRef,
};
use crate::names;

pub(crate) struct Emitter<'a> {
    pub(crate) ctx: &'a DocContext,
    pub(crate) out: String,
    pub(crate) indent: usize,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(ctx: &'a DocContext) -> Self {
        Self {
            ctx,
            out: String::new(),
            indent: 0,
        }
    }

    pub(crate) fn line(&mut self, s: impl AsRef<str>) {
        let s = s.as_ref();
        if s.is_empty() {
            self.out.push('\n');
            return;
        }
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    pub(crate) fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Writes `header {` and indents until the matching `close`.
    pub(crate) fn open(&mut self, header: impl AsRef<str>) {
        self.line(format!("{} {{", header.as_ref()));
        self.indent += 1;
    }

    pub(crate) fn close(&mut self) {
        self.indent -= 1;
        self.line("}");
    }

    pub(crate) fn close_with(&mut self, suffix: &str) {
        self.indent -= 1;
        self.line(format!("}}{suffix}"));
    }

    pub(crate) fn err(&self, message: String) -> CompilerError {
        CompilerError::new(CompileErrorKind::Internal, message)
    }
}

// ---------------------------------------------------------------------------
// Module assembly
// ---------------------------------------------------------------------------

/// Emits the module prelude: generated header, imports, enum declarations
/// and polymorphic unions. Type fragments (from `emit_type`) are appended
/// after this, then `emit_codecs_mod`.
pub(crate) fn emit_prelude(ctx: &DocContext, fingerprint: &str, types: &[SchemaType]) -> String {
    let mut e = Emitter::new(ctx);
    e.line(format!(
        "// @generated by wirec {} for schema module `{}` (fingerprint b3:{fingerprint}).",
        env!("CARGO_PKG_VERSION"),
        ctx.module
    ));
    e.line("// Regenerate from the schema document instead of editing.");
    e.blank();

    let uses_pooled = any_member(types, |m| matches!(m.kind, ResolvedKind::Pooled));
    let uses_codecs = any_member(types, |m| m.codec.is_some());
    let mut imports = vec!["Codec", "DecodeError", "EncodeError"];
    if uses_codecs {
        imports.push("FieldCodec");
    }
    if uses_pooled {
        imports.push("PooledBuf");
    }
    imports.push("Reader");
    imports.push("Writer");
    e.line(format!("use wirec_rt::{{{}}};", imports.join(", ")));
    e.blank();

    for decl in ctx.enums.values() {
        emit_enum_decl(&mut e, decl);
        e.blank();
    }

    for (name, spec) in &ctx.unions {
        emit_union_decl(&mut e, name, spec);
        e.blank();
    }

    e.out
}

fn any_member(types: &[SchemaType], f: impl Fn(&SchemaMember) -> bool + Copy) -> bool {
    fn walk(ty: &SchemaType, f: impl Fn(&SchemaMember) -> bool + Copy) -> bool {
        ty.members.iter().any(f) || ty.nested.iter().any(|n| walk(n, f))
    }
    types.iter().any(|t| walk(t, f))
}

fn emit_enum_decl(e: &mut Emitter<'_>, decl: &EnumDecl) {
    let name = names::type_ident(&decl.name);
    e.line("#[derive(Debug, Clone, Copy, PartialEq, Eq)]");
    e.open(format!("pub enum {name}"));
    for v in &decl.values {
        e.line(format!("{} = {},", v.name, v.value));
    }
    e.close();
    if let Some(first) = decl.values.first() {
        e.blank();
        e.open(format!("impl Default for {name}"));
        e.open("fn default() -> Self");
        e.line(format!("{name}::{}", first.name));
        e.close();
        e.close();
    }
    e.blank();
    e.open(format!("impl {name}"));
    e.open("fn from_wire(value: i64) -> Result<Self, DecodeError>");
    e.open("match value");
    for v in &decl.values {
        e.line(format!("{} => Ok({name}::{}),", v.value, v.name));
    }
    e.line(format!(
        "other => Err(DecodeError::UnknownEnumValue {{ name: {:?}, value: other }}),",
        decl.name
    ));
    e.close();
    e.close();
    e.close();
}

fn emit_union_decl(e: &mut Emitter<'_>, name: &str, spec: &PolySpec) {
    e.line("#[derive(Debug, Clone, PartialEq)]");
    e.open(format!("pub enum {}", names::type_ident(name)));
    for v in &spec.variants {
        let variant = names::type_ident(&v.ty_name);
        e.line(format!("{variant}({variant}),"));
    }
    e.close();
}

// ---------------------------------------------------------------------------
// Per-type fragment
// ---------------------------------------------------------------------------

/// Emits the full fragment for one schema type and, recursively, its
/// nested types. Fragments are independent of each other.
pub(crate) fn emit_type(ctx: &DocContext, ty: &SchemaType) -> Result<String, CompilerError> {
    let mut e = Emitter::new(ctx);
    emit_one_type(&mut e, ty)?;
    for nested in &ty.nested {
        e.blank();
        let fragment = emit_type(ctx, nested)?;
        e.out.push_str(&fragment);
    }
    Ok(e.out)
}

fn emit_one_type(e: &mut Emitter<'_>, ty: &SchemaType) -> Result<(), CompilerError> {
    emit_struct(e, ty)?;
    e.blank();
    emit_inherent_impl(e, ty)?;
    e.blank();
    e.open(format!("impl Codec for {}", names::type_ident(&ty.name)));
    e.emit_size_fn(ty)?;
    e.blank();
    e.emit_encode_fn(ty)?;
    e.blank();
    e.emit_decode_fn(ty)?;
    e.close();
    Ok(())
}

fn emit_struct(e: &mut Emitter<'_>, ty: &SchemaType) -> Result<(), CompilerError> {
    let mut derives = vec!["Debug", "Clone", "PartialEq"];
    let any_immutable = ty.members.iter().any(SchemaMember::immutable);
    if ty.ctor.needs_default || !any_immutable {
        derives.push("Default");
    }
    e.line(format!("#[derive({})]", derives.join(", ")));
    e.open(format!("pub struct {}", names::type_ident(&ty.name)));
    for m in &ty.members {
        let vis = if m.immutable() { "" } else { "pub " };
        let fty = field_ty(e, m)?;
        e.line(format!("{vis}{}: {fty},", names::field_ident(&m.name)));
    }
    e.close();
    Ok(())
}

fn emit_inherent_impl(e: &mut Emitter<'_>, ty: &SchemaType) -> Result<(), CompilerError> {
    e.open(format!("impl {}", names::type_ident(&ty.name)));

    // The constructor contract: synthesized over all members, or the
    // host-declared signature refinement matched. Decode always routes
    // through it.
    let mut params = Vec::new();
    for p in &ty.ctor.params {
        let member = member_by_ctor_name(ty, &p.name).ok_or_else(|| {
            e.err(format!(
                "constructor parameter {:?} has no matching member in {:?}",
                p.name, ty.name
            ))
        })?;
        params.push(format!(
            "{}: {}",
            names::field_ident(&member.name),
            field_ty(e, member)?
        ));
    }
    e.open(format!("pub fn new({}) -> Self", params.join(", ")));
    let fields = ty
        .ctor
        .params
        .iter()
        .filter_map(|p| member_by_ctor_name(ty, &p.name))
        .map(|m| names::field_ident(&m.name))
        .collect::<Vec<_>>()
        .join(", ");
    e.line(format!("Self {{ {fields} }}"));
    e.close();

    for m in ty.members.iter().filter(|m| m.immutable()) {
        e.blank();
        emit_accessor(e, m)?;
    }

    if ty.needs_release && !ty.has_release {
        e.blank();
        emit_release(e, ty);
    }

    e.close();
    Ok(())
}

pub(crate) fn member_by_ctor_name<'t>(ty: &'t SchemaType, name: &str) -> Option<&'t SchemaMember> {
    ty.members
        .iter()
        .find(|m| m.name.eq_ignore_ascii_case(name))
}

fn emit_accessor(e: &mut Emitter<'_>, m: &SchemaMember) -> Result<(), CompilerError> {
    let field = names::field_ident(&m.name);
    let ty = field_ty(e, m)?;
    if matches!(m.kind, ResolvedKind::Scalar(_) | ResolvedKind::Enum { .. }) {
        e.open(format!("pub fn {field}(&self) -> {ty}"));
        e.line(format!("self.{field}"));
    } else {
        e.open(format!("pub fn {field}(&self) -> &{ty}"));
        e.line(format!("&self.{field}"));
    }
    e.close();
    Ok(())
}

/// Teardown for pooled storage: releases this type's own buffers and
/// recurses into every owned value that can hold one.
fn emit_release(e: &mut Emitter<'_>, ty: &SchemaType) {
    e.line("/// Returns this value's pooled buffers (and those of everything");
    e.line("/// it owns) to the pool. Buffers are also released on drop.");
    e.open("pub fn release(&mut self)");
    for m in &ty.members {
        let field = names::field_ident(&m.name);
        match &m.kind {
            ResolvedKind::Pooled => e.line(format!("self.{field}.release();")),
            ResolvedKind::Schema(name) if type_needs_release(e.ctx, name) => {
                e.line(format!("self.{field}.release();"));
            }
            ResolvedKind::Union(name) => {
                let releasing: Vec<_> = e
                    .ctx
                    .unions
                    .get(name)
                    .map(|spec| {
                        spec.variants
                            .iter()
                            .filter(|v| type_needs_release(e.ctx, &v.ty_name))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                if !releasing.is_empty() {
                    e.open(format!("if let Some(value) = &mut self.{field}"));
                    e.open("match value");
                    for v in &releasing {
                        e.line(format!(
                            "{}::{}(v) => v.release(),",
                            names::type_ident(name),
                            names::type_ident(&v.ty_name)
                        ));
                    }
                    e.line("_ => {}");
                    e.close();
                    e.close();
                }
            }
            ResolvedKind::Collection => {
                if let Some(c) = &m.collection {
                    match &c.elem.kind {
                        ResolvedKind::Schema(name) if type_needs_release(e.ctx, name) => {
                            e.open(format!("for item in &mut self.{field}"));
                            e.line("item.release();");
                            e.close();
                        }
                        ResolvedKind::Union(name) => {
                            let union = names::type_ident(name);
                            let releasing: Vec<_> = e
                                .ctx
                                .unions
                                .get(name)
                                .map(|spec| {
                                    spec.variants
                                        .iter()
                                        .filter(|v| type_needs_release(e.ctx, &v.ty_name))
                                        .cloned()
                                        .collect()
                                })
                                .unwrap_or_default();
                            if !releasing.is_empty() {
                                e.open(format!("for item in &mut self.{field}"));
                                e.open("match item");
                                for v in &releasing {
                                    e.line(format!(
                                        "{union}::{}(v) => v.release(),",
                                        names::type_ident(&v.ty_name)
                                    ));
                                }
                                e.line("_ => {}");
                                e.close();
                                e.close();
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    e.close();
}

/// Whether a referenced schema type carries a release routine, per the
/// refinement fixpoint.
fn type_needs_release(ctx: &DocContext, name: &str) -> bool {
    ctx.release_table.get(name).copied().unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Custom codec table
// ---------------------------------------------------------------------------

/// The process-wide codec instance table: one lazily-initialized static per
/// distinct codec identity, shared by every generated call site. Entries
/// are created once and never replaced.
pub(crate) fn emit_codecs_mod(ctx: &DocContext, types: &[SchemaType]) -> String {
    let mut paths = std::collections::BTreeSet::new();
    fn collect(ty: &SchemaType, paths: &mut std::collections::BTreeSet<String>) {
        for m in &ty.members {
            if let Some(c) = &m.codec {
                paths.insert(c.path.clone());
            }
        }
        for n in &ty.nested {
            collect(n, paths);
        }
    }
    for ty in types {
        collect(ty, &mut paths);
    }
    if paths.is_empty() {
        return String::new();
    }

    let mut e = Emitter::new(ctx);
    e.blank();
    e.open("mod codecs");
    e.line("use std::sync::OnceLock;");
    e.blank();
    e.line("use super::*;");
    for path in &paths {
        let ident = names::path_ident(path);
        e.blank();
        e.open(format!("pub(super) fn {ident}() -> &'static {path}"));
        e.line(format!("static INSTANCE: OnceLock<{path}> = OnceLock::new();"));
        e.line(format!("INSTANCE.get_or_init({path}::default)"));
        e.close();
    }
    e.close();
    e.out
}

// ---------------------------------------------------------------------------
// Type mapping helpers shared by the three operation emitters
// ---------------------------------------------------------------------------

pub(crate) fn field_ty(e: &Emitter<'_>, m: &SchemaMember) -> Result<String, CompilerError> {
    match &m.kind {
        ResolvedKind::Scalar(s) => Ok(s.rust_ty().to_string()),
        ResolvedKind::Text => Ok("String".to_string()),
        ResolvedKind::Enum { name, .. } => Ok(names::type_ident(name)),
        ResolvedKind::Schema(name) => Ok(names::type_ident(name)),
        ResolvedKind::Union(name) => Ok(format!("Option<{}>", names::type_ident(name))),
        ResolvedKind::Pooled => Ok("PooledBuf".to_string()),
        ResolvedKind::Collection => {
            let c = m.collection.as_ref().ok_or_else(|| {
                e.err(format!("collection member {:?} lost its spec", m.name))
            })?;
            Ok(format!("Vec<{}>", elem_rust_ty(&c.elem.kind, &c.elem.ty)))
        }
        // Only reachable for custom-codec members: the declared name is an
        // application type the codec understands.
        ResolvedKind::Unknown(name) => Ok(names::type_ident(name)),
    }
}

pub(crate) fn elem_rust_ty(kind: &ResolvedKind, ty: &TypeRef) -> String {
    match kind {
        ResolvedKind::Scalar(s) => s.rust_ty().to_string(),
        ResolvedKind::Text => "String".to_string(),
        ResolvedKind::Enum { name, .. }
        | ResolvedKind::Schema(name)
        | ResolvedKind::Union(name)
        | ResolvedKind::Unknown(name) => names::type_ident(name),
        _ => ty.display_name(),
    }
}

pub(crate) fn put_method(s: Scalar) -> &'static str {
    match s {
        Scalar::U8 => "put_u8",
        Scalar::I8 => "put_i8",
        Scalar::U16 => "put_u16",
        Scalar::I16 => "put_i16",
        Scalar::U32 => "put_u32",
        Scalar::I32 => "put_i32",
        Scalar::U64 => "put_u64",
        Scalar::I64 => "put_i64",
        Scalar::F32 => "put_f32",
        Scalar::F64 => "put_f64",
        Scalar::Bool => "put_bool",
    }
}

pub(crate) fn take_method(s: Scalar) -> &'static str {
    match s {
        Scalar::U8 => "take_u8",
        Scalar::I8 => "take_i8",
        Scalar::U16 => "take_u16",
        Scalar::I16 => "take_i16",
        Scalar::U32 => "take_u32",
        Scalar::I32 => "take_i32",
        Scalar::U64 => "take_u64",
        Scalar::I64 => "take_i64",
        Scalar::F32 => "take_f32",
        Scalar::F64 => "take_f64",
        Scalar::Bool => "take_bool",
    }
}

pub(crate) fn put_count_method(s: Scalar) -> &'static str {
    match s {
        Scalar::U8 => "put_count_u8",
        Scalar::I8 => "put_count_i8",
        Scalar::U16 => "put_count_u16",
        Scalar::I16 => "put_count_i16",
        Scalar::U32 => "put_count_u32",
        Scalar::I32 => "put_count_i32",
        Scalar::U64 => "put_count_u64",
        Scalar::I64 => "put_count_i64",
        // Non-integer count types are validated out before generation.
        Scalar::F32 | Scalar::F64 | Scalar::Bool => "put_count_i32",
    }
}

pub(crate) fn take_count_method(s: Scalar) -> &'static str {
    match s {
        Scalar::U8 => "take_count_u8",
        Scalar::I8 => "take_count_i8",
        Scalar::U16 => "take_count_u16",
        Scalar::I16 => "take_count_i16",
        Scalar::U32 => "take_count_u32",
        Scalar::I32 => "take_count_i32",
        Scalar::U64 => "take_count_u64",
        Scalar::I64 => "take_count_i64",
        Scalar::F32 | Scalar::F64 | Scalar::Bool => "take_count_i32",
    }
}
