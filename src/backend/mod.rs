//! Backend dispatcher: turns normalized IR into a target query. The MATCH
//! backend (§4.5) is the one this crate implements in full; the others are
//! summarized (§4.6) and reject the features they don't support.
pub mod cypher;
pub mod error;
pub mod gremlin;
pub mod match_backend;
pub mod relational;

use std::sync::Arc;

use crate::ir::{ty::Type, IrQuery};
use crate::schema::Schema;

pub use error::BackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Match,
    Relational,
    Gremlin,
    Cypher,
}

/// One column of the compiled query's projected output: its `@output` name,
/// and the scalar type of the field it was projected from.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub name: Arc<str>,
    pub value_type: Type,
}

/// What a backend produces from a single compile call: the rendered query
/// (or, for backends that build queries programmatically, its textual
/// equivalent) plus the shape of the rows it returns.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub query_text: String,
    pub outputs: Vec<OutputColumn>,
}

pub fn emit(backend: Backend, schema: &Schema, ir: &IrQuery) -> Result<CompiledQuery, BackendError> {
    match backend {
        Backend::Match => match_backend::emit(schema, ir),
        Backend::Relational => relational::emit(schema, ir),
        Backend::Gremlin => gremlin::emit(schema, ir),
        Backend::Cypher => cypher::emit(schema, ir),
    }
}

pub(crate) fn output_columns(ir: &IrQuery) -> Vec<OutputColumn> {
    ir.metadata
        .outputs
        .iter()
        .map(|o| OutputColumn { name: o.out_name.clone(), value_type: o.value_type.clone() })
        .collect()
}
