//! Parsing, semantic analysis, and lowering of a query string into IR.
//! The heavy lifting (validation rules + lowering) lives in [`crate::ir::builder`];
//! this module is the public seam and the shared error taxonomy.
pub mod error;
pub mod parameters;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ir::{builder, FieldValue, IrQuery};
use crate::schema::Schema;

pub use error::FrontendError;
pub use parameters::check_parameters;

/// Parses, validates, and lowers `query_text` against `schema`.
pub fn compile_to_ir(schema: &Schema, query_text: &str) -> Result<IrQuery, FrontendError> {
    builder::lower(schema, query_text)
}

/// As [`compile_to_ir`], additionally checking that every `$variable` the
/// query references has a correspondingly typed entry in `parameters`.
pub fn compile_to_ir_with_parameters(
    schema: &Schema,
    query_text: &str,
    parameters: &BTreeMap<Arc<str>, FieldValue>,
) -> Result<IrQuery, FrontendError> {
    let ir = compile_to_ir(schema, query_text)?;
    check_parameters(schema, &ir, parameters)?;
    Ok(ir)
}
