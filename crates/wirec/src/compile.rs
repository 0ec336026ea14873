//! The batch driver: parse -> extract -> refine -> validate -> generate.
//!
//! Types are independent once refined. Validation errors under one type's
//! document pointer skip that type's generation only; an unexpected failure
//! while emitting one type is captured as a generator-error diagnostic and
//! the remaining types still generate. Fragment generation runs on a
//! parallel map (the model is immutable by then) and results are stitched
//! back in declaration order.

use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;

use crate::diagnostics::{Diagnostic, Report, Severity, Stage};
use crate::emit;
use crate::extract;
use crate::fingerprint;
use crate::model::SchemaType;
use crate::refine;
use crate::schema_ast;
use crate::validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    Parse,
    Internal,
}

#[derive(Debug, Clone)]
pub struct CompilerError {
    pub kind: CompileErrorKind,
    pub message: String,
}

impl CompilerError {
    pub fn new(kind: CompileErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for CompilerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CompilerError {}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Parallel per-type fragment generation. Off for deterministic
    /// single-thread debugging; the output is identical either way.
    pub parallel: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self { parallel: true }
    }
}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub module: String,
    pub fingerprint: String,
    /// The generated module source. Only complete when `report.ok`; with
    /// failed types in the batch it holds the surviving fragments, mirroring
    /// the per-type independence of generation (callers gate on `report.ok`
    /// before writing artifacts).
    pub source: String,
    pub report: Report,
    pub types_generated: usize,
    pub types_skipped: usize,
}

/// Runs the pipeline without emitting anything: schema-authoring-time
/// validation.
pub fn check_document(bytes: &[u8]) -> Result<Report, CompilerError> {
    let doc = schema_ast::parse_schema_json(bytes)
        .map_err(|e| CompilerError::new(CompileErrorKind::Parse, e.to_string()))?;
    let extracted = extract::extract_doc(&doc)
        .map_err(|e| CompilerError::new(CompileErrorKind::Parse, format!("{} (at {})", e.message, e.ptr)))?;
    let (ctx, types) = refine::refine_doc(&doc, &extracted);
    let diagnostics = validate::validate_doc(&ctx, &types);
    Ok(Report::ok().with_diagnostics(diagnostics))
}

pub fn compile_document(
    bytes: &[u8],
    options: &CompileOptions,
) -> Result<CompileOutput, CompilerError> {
    let doc = schema_ast::parse_schema_json(bytes)
        .map_err(|e| CompilerError::new(CompileErrorKind::Parse, e.to_string()))?;
    let extracted = extract::extract_doc(&doc)
        .map_err(|e| CompilerError::new(CompileErrorKind::Parse, format!("{} (at {})", e.message, e.ptr)))?;
    let (ctx, types) = refine::refine_doc(&doc, &extracted);
    let mut diagnostics = validate::validate_doc(&ctx, &types);
    let fp = fingerprint::document_fingerprint(bytes)?;

    let gate = Report::ok().with_diagnostics(diagnostics.clone());
    let eligible: Vec<&SchemaType> = types.iter().filter(|t| gate.type_ok(&t.ptr)).collect();

    let generate_one = |ty: &SchemaType| -> Result<String, Diagnostic> {
        let result = catch_unwind(AssertUnwindSafe(|| emit::emit_type(&ctx, ty)));
        match result {
            Ok(Ok(source)) => Ok(source),
            Ok(Err(e)) => Err(generator_error(ty, &e.message)),
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                Err(generator_error(ty, &detail))
            }
        }
    };

    let results: Vec<Result<String, Diagnostic>> = if options.parallel {
        eligible.par_iter().map(|ty| generate_one(ty)).collect()
    } else {
        eligible.iter().map(|ty| generate_one(ty)).collect()
    };

    let mut fragments = Vec::new();
    let mut generated_types: Vec<&SchemaType> = Vec::new();
    for (ty, result) in eligible.iter().zip(results) {
        match result {
            Ok(fragment) => {
                fragments.push(fragment);
                generated_types.push(*ty);
            }
            Err(diag) => diagnostics.push(diag),
        }
    }

    let owned: Vec<SchemaType> = generated_types.iter().map(|t| (*t).clone()).collect();
    let mut source = emit::emit_prelude(&ctx, &fp, &owned);
    for (i, fragment) in fragments.iter().enumerate() {
        if i > 0 {
            source.push('\n');
        }
        source.push_str(fragment);
    }
    source.push_str(&emit::emit_codecs_mod(&ctx, &owned));

    let types_generated = owned.len();
    let types_skipped = types.len() - types_generated;
    Ok(CompileOutput {
        module: ctx.module,
        fingerprint: fp,
        source,
        report: Report::ok().with_diagnostics(diagnostics),
        types_generated,
        types_skipped,
    })
}

fn generator_error(ty: &SchemaType, detail: &str) -> Diagnostic {
    Diagnostic {
        code: "WIREC-GEN-0001".to_string(),
        severity: Severity::Error,
        stage: Stage::Codegen,
        message: format!("internal error generating type {:?}: {detail}", ty.name),
        ptr: Some(ty.ptr.clone()),
        data: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wirec_contracts::WIRE_SCHEMA_VERSION;

    use super::*;

    fn compile(doc: serde_json::Value) -> CompileOutput {
        let bytes = serde_json::to_vec(&doc).expect("encode doc");
        compile_document(&bytes, &CompileOptions::default()).expect("compile")
    }

    fn doc(types: serde_json::Value) -> serde_json::Value {
        json!({
            "schema_version": WIRE_SCHEMA_VERSION,
            "module": "net",
            "types": types,
        })
    }

    #[test]
    fn clean_document_generates_all_types() {
        let out = compile(doc(json!([
            {"name": "Ping", "members": [{"name": "seq", "type": "u32"}]},
            {"name": "Pong", "members": [{"name": "seq", "type": "u32"}]},
        ])));
        assert!(out.report.ok, "diags: {:?}", out.report.diagnostics);
        assert_eq!(out.types_generated, 2);
        assert_eq!(out.types_skipped, 0);
        assert!(out.source.contains("pub struct Ping"));
        assert!(out.source.contains("pub struct Pong"));
        assert!(out.source.contains("impl Codec for Ping"));
    }

    #[test]
    fn a_failing_type_does_not_block_its_siblings() {
        let out = compile(doc(json!([
            {
                "name": "Broken",
                "members": [
                    {"name": "items", "type": "vec<u32>", "collection": {"count_ref": "missing"}},
                ],
            },
            {"name": "Fine", "members": [{"name": "seq", "type": "u32"}]},
        ])));
        assert!(!out.report.ok);
        assert_eq!(out.types_generated, 1);
        assert_eq!(out.types_skipped, 1);
        assert!(!out.source.contains("pub struct Broken"));
        assert!(out.source.contains("pub struct Fine"));
    }

    #[test]
    fn parse_failures_are_compiler_errors_not_reports() {
        let err = compile_document(b"not json", &CompileOptions::default())
            .expect_err("parse failure");
        assert_eq!(err.kind, CompileErrorKind::Parse);
    }

    #[test]
    fn header_carries_module_and_fingerprint() {
        let out = compile(doc(json!([
            {"name": "Ping", "members": [{"name": "seq", "type": "u32"}]},
        ])));
        let first_line = out.source.lines().next().expect("header line");
        assert!(first_line.contains("`net`"), "header: {first_line}");
        assert!(
            first_line.contains(&out.fingerprint),
            "header: {first_line}"
        );
    }

    #[test]
    fn sequential_and_parallel_generation_agree() {
        let d = doc(json!([
            {"name": "A", "members": [{"name": "x", "type": "u8"}]},
            {"name": "B", "members": [{"name": "y", "type": "string"}]},
            {"name": "C", "members": [{"name": "z", "type": "vec<u16>"}]},
        ]));
        let bytes = serde_json::to_vec(&d).expect("encode doc");
        let par = compile_document(&bytes, &CompileOptions { parallel: true }).expect("parallel");
        let seq = compile_document(&bytes, &CompileOptions { parallel: false }).expect("sequential");
        assert_eq!(par.source, seq.source);
    }

    #[test]
    fn check_document_reports_without_generating() {
        let bytes = serde_json::to_vec(&doc(json!([
            {
                "name": "T",
                "members": [
                    {"name": "items", "type": "vec<u32>", "collection": {"count_ref": "missing"}},
                ],
            },
        ])))
        .expect("encode doc");
        let report = check_document(&bytes).expect("check");
        assert!(!report.ok);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].code, "WIREC-COLL-0001");
    }
}
