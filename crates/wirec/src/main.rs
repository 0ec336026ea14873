use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use wirec::compile::{self, CompileOptions};
use wirec::diagnostics::{Diagnostic, Severity};
use wirec_contracts::WIREC_REPORT_SCHEMA_VERSION;

#[derive(Parser)]
#[command(name = "wirec")]
#[command(about = "Wire schema compiler (schema JSON -> Rust codecs).", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Validate a schema document without generating code.
    Check {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        report_json: bool,
    },
    /// Generate the Rust codec module for a schema document.
    Generate {
        #[arg(long)]
        input: PathBuf,
        /// Output path; defaults to the input with an `.rs` extension.
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        report_json: bool,
        /// Generate type fragments one at a time instead of in parallel.
        #[arg(long)]
        sequential: bool,
    },
}

#[derive(Debug, Serialize)]
struct WirecToolReport {
    schema_version: &'static str,
    command: &'static str,
    ok: bool,
    r#in: String,
    diagnostics_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    diagnostics: Vec<Diagnostic>,
    exit_code: u8,
}

fn main() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Check { input, report_json } => run_check(&input, report_json),
        Cmd::Generate {
            input,
            out,
            report_json,
            sequential,
        } => run_generate(&input, out, report_json, sequential),
    }
}

fn run_check(input: &Path, report_json: bool) -> Result<std::process::ExitCode> {
    let bytes = std::fs::read(input).with_context(|| format!("read {}", input.display()))?;
    let report = compile::check_document(&bytes)
        .map_err(|e| anyhow::anyhow!("{}: {}", input.display(), e.message))?;
    let exit_code = u8::from(!report.ok);
    emit_report(
        "check",
        input,
        report.ok,
        &report.diagnostics,
        report_json,
        exit_code,
    )?;
    Ok(std::process::ExitCode::from(exit_code))
}

fn run_generate(
    input: &Path,
    out: Option<PathBuf>,
    report_json: bool,
    sequential: bool,
) -> Result<std::process::ExitCode> {
    let bytes = std::fs::read(input).with_context(|| format!("read {}", input.display()))?;
    let options = CompileOptions {
        parallel: !sequential,
    };
    let output = compile::compile_document(&bytes, &options)
        .map_err(|e| anyhow::anyhow!("{}: {}", input.display(), e.message))?;

    let exit_code = u8::from(!output.report.ok);
    if output.report.ok {
        let out_path = out.unwrap_or_else(|| default_out_path(input));
        std::fs::write(&out_path, output.source.as_bytes())
            .with_context(|| format!("write {}", out_path.display()))?;
        if !report_json {
            eprintln!(
                "generated {} ({} types) -> {}",
                output.module,
                output.types_generated,
                out_path.display()
            );
        }
    }
    emit_report(
        "generate",
        input,
        output.report.ok,
        &output.report.diagnostics,
        report_json,
        exit_code,
    )?;
    Ok(std::process::ExitCode::from(exit_code))
}

/// `net.wire.json` -> `net.rs` next to it.
fn default_out_path(input: &Path) -> PathBuf {
    let stem = input
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.trim_end_matches(".wire.json").trim_end_matches(".json"))
        .unwrap_or("generated");
    input.with_file_name(format!("{stem}.rs"))
}

fn emit_report(
    command: &'static str,
    input: &Path,
    ok: bool,
    diagnostics: &[Diagnostic],
    report_json: bool,
    exit_code: u8,
) -> Result<()> {
    if report_json {
        let report = WirecToolReport {
            schema_version: WIREC_REPORT_SCHEMA_VERSION,
            command,
            ok,
            r#in: input.display().to_string(),
            diagnostics_count: diagnostics.len(),
            diagnostics: diagnostics.to_vec(),
            exit_code,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for d in diagnostics {
            let sev = match d.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Info => "info",
            };
            match &d.ptr {
                Some(ptr) => eprintln!("{sev}[{}] {} (at {ptr})", d.code, d.message),
                None => eprintln!("{sev}[{}] {}", d.code, d.message),
            }
        }
        if !ok {
            eprintln!("{command} failed with {} diagnostic(s)", diagnostics.len());
        }
    }
    Ok(())
}
