pub mod compile;
pub mod diagnostics;
pub mod extract;
pub mod model;
pub mod names;
pub mod plan;
pub mod refine;
pub mod schema_ast;
pub mod validate;

mod emit;
mod emit_decode;
mod emit_encode;
mod emit_size;
mod fingerprint;
