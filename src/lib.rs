//! Compiles a GraphQL-syntax query, annotated with `@output`/`@filter`/
//! `@tag`/`@optional`/`@fold`/`@recurse`/`@output_source`, against a schema,
//! into a target-dialect query. Pure compiler: no execution, no connection
//! management, no schema introspection from a live database.
//!
//! The pipeline is schema -> parse+validate -> IR -> rewrites -> backend,
//! mirroring the module layout below.
pub mod backend;
pub mod frontend;
pub mod graphql_query;
pub mod ir;
pub mod rewrites;
pub mod schema;
mod util;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use backend::{Backend, CompiledQuery};
pub use frontend::FrontendError;
pub use ir::FieldValue;
pub use schema::Schema;

/// The top-level error taxonomy: one `#[from]` arm per pipeline
/// stage, so a caller can match on which stage rejected the query without
/// needing to know that stage's internals.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("{0}")]
    Frontend(#[from] FrontendError),

    #[error("{0}")]
    Backend(#[from] backend::BackendError),
}

/// Compiles `query` against `schema` into the target `backend`'s dialect.
///
/// `parameters` supplies the values referenced by the query's `$name`
/// filter operands; every such reference must resolve to an entry here with
/// a value parseable as the referenced field's scalar type, or compilation
/// fails with a [`FrontendError::FilterArgumentError`].
///
/// `compile` is a pure function of its arguments: it performs no I/O and
/// holds no state between calls. `schema` is only ever read, so concurrent
/// calls against the same `Schema` value are safe.
pub fn compile(
    schema: &Schema,
    query: &str,
    backend: Backend,
    parameters: &BTreeMap<Arc<str>, FieldValue>,
) -> Result<CompiledQuery, CompileError> {
    let ir = frontend::compile_to_ir_with_parameters(schema, query, parameters)?;
    let ir = rewrites::normalize(ir, schema);
    Ok(backend::emit(backend, schema, &ir)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANIMAL_SCHEMA: &str = r#"
schema { query: RootSchemaQuery }
directive @filter(op_name: String!, value: [String!]) repeatable on FIELD | INLINE_FRAGMENT
directive @tag(tag_name: String!) on FIELD
directive @output(out_name: String!) on FIELD
directive @optional on FIELD
directive @recurse(depth: Int!) on FIELD
directive @fold on FIELD
directive @output_source on FIELD

type RootSchemaQuery {
  Animal: Animal
}

type Animal {
  name: String
  net_worth: Int
  out_Animal_ParentOf: Animal
  in_Animal_ParentOf: Animal
}
"#;

    fn schema() -> Schema {
        Schema::parse(ANIMAL_SCHEMA).expect("valid schema")
    }

    #[test]
    fn compiles_a_simple_query_to_match() {
        let schema = schema();
        let compiled = compile(
            &schema,
            r#"{ Animal { name @output(out_name: "n") } }"#,
            Backend::Match,
            &BTreeMap::new(),
        )
        .unwrap();
        assert!(compiled.query_text.contains("Animal___1.name AS `n`"));
        assert_eq!(compiled.outputs.len(), 1);
        assert_eq!(compiled.outputs[0].name.as_ref(), "n");
    }

    #[test]
    fn reports_a_missing_parameter_before_reaching_the_backend() {
        let schema = schema();
        let err = compile(
            &schema,
            r#"{ Animal { name @filter(op_name: "=", value: ["$x"]) @output(out_name: "n") } }"#,
            Backend::Match,
            &BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Frontend(_)));
    }

    #[test]
    fn rejects_folds_on_the_relational_backend() {
        let schema = schema();
        let err = compile(
            &schema,
            r#"{ Animal { out_Animal_ParentOf @fold { _x_count @output(out_name: "n") } } }"#,
            Backend::Relational,
            &BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Backend(_)));
    }
}
