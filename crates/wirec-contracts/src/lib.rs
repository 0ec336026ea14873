//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings
//! that appear in machine-readable I/O: schema documents, diagnostic reports,
//! and CLI tool reports.

pub const WIRE_SCHEMA_VERSION: &str = "wirec.schema@0.1.0";
pub const WIRE_SCHEMA_VERSIONS_SUPPORTED: &[&str] = &["wirec.schema@0.1.0"];

pub const WIREC_DIAG_SCHEMA_VERSION: &str = "wirec.diag@0.1.0";
pub const WIREC_REPORT_SCHEMA_VERSION: &str = "wirec.report@0.1.0";
