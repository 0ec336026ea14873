use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use wirec_contracts::WIREC_DIAG_SCHEMA_VERSION;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parse,
    Extract,
    Refine,
    Validate,
    Codegen,
}

/// One finding about a schema document, located by JSON pointer into the
/// document (`/types/3/members/1`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ptr: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

impl Diagnostic {
    pub fn error(code: &str, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            severity: Severity::Error,
            stage,
            message: message.into(),
            ptr: None,
            data: BTreeMap::new(),
        }
    }

    pub fn at(mut self, ptr: impl Into<String>) -> Self {
        self.ptr = Some(ptr.into());
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub schema_version: String,
    pub ok: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn ok() -> Self {
        Self {
            schema_version: WIREC_DIAG_SCHEMA_VERSION.to_string(),
            ok: true,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(mut self, mut diagnostics: Vec<Diagnostic>) -> Self {
        diagnostics.sort_by(|a, b| {
            let ap = a.ptr.as_deref().unwrap_or("");
            let bp = b.ptr.as_deref().unwrap_or("");
            ap.cmp(bp)
                .then_with(|| a.code.cmp(&b.code))
                .then_with(|| a.message.cmp(&b.message))
        });
        self.ok = diagnostics.iter().all(|d| d.severity != Severity::Error);
        self.diagnostics = diagnostics;
        self
    }

    /// True when no error-severity diagnostic points into `ptr` or below.
    pub fn type_ok(&self, ptr: &str) -> bool {
        !self.diagnostics.iter().any(|d| {
            d.severity == Severity::Error
                && d.ptr
                    .as_deref()
                    .is_some_and(|p| p == ptr || p.starts_with(&format!("{ptr}/")))
        })
    }
}
