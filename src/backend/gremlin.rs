//! Gremlin-style traversal-string backend: emits a chain of
//! `.out('edge')`/`.in('edge')` steps the way an actual Gremlin traversal
//! would, with `.has(...)` predicates and a final `.project(...)` step for
//! the requested outputs. Output completeness is *not* guaranteed here --
//! a documented contract difference from the MATCH backend, since a plain
//! traversal chain cannot express the MATCH backend's `UNIONALL`-based
//! disjointness guarantees for compound optionals.
use std::sync::Arc;

use crate::backend::{output_columns, BackendError, CompiledQuery};
use crate::ir::{Expression, FilterOp, IrBlock, IrQuery};
use crate::schema::{Direction, Schema};

const BACKEND_NAME: &str = "gremlin";

pub fn emit(schema: &Schema, ir: &IrQuery) -> Result<CompiledQuery, BackendError> {
    let mut chain = String::from("g.V()");
    let mut pending_edge: Option<(Arc<str>, Direction)> = None;
    let mut current_alias: Option<Arc<str>> = None;
    let mut alias_counts: std::collections::BTreeMap<Arc<str>, u32> = Default::default();
    let mut construct_result: Option<&Vec<(Arc<str>, Expression)>> = None;
    let mut in_fold = false;

    for block in &ir.blocks {
        match block {
            IrBlock::QueryRoot(label) => {
                chain.push_str(&format!(".hasLabel('{label}')"));
            }
            IrBlock::Traverse { edge_name, direction, .. } => {
                pending_edge = Some((edge_name.clone(), *direction));
            }
            IrBlock::Recurse { edge_name, direction, depth } => {
                let verb = gremlin_verb(*direction);
                chain.push_str(&format!(".repeat({verb}('{edge_name}')).times({depth}).emit()"));
            }
            IrBlock::MarkLocation(location) => {
                if let Some((edge_name, direction)) = pending_edge.take() {
                    let verb = gremlin_verb(direction);
                    chain.push_str(&format!(".{verb}('{edge_name}')"));
                }
                let type_name = ir.metadata.location_types.get(location).cloned().unwrap_or_else(|| {
                    Arc::from(schema.query_type_name())
                });
                let count = alias_counts.entry(type_name.clone()).or_insert(0);
                *count += 1;
                let alias: Arc<str> = Arc::from(format!("{type_name}___{count}"));
                chain.push_str(&format!(".as('{alias}')"));
                current_alias = Some(alias);
            }
            IrBlock::Filter(expr) => {
                chain.push_str(&render_predicate(expr));
            }
            IrBlock::Fold { edge_name, direction, .. } => {
                in_fold = true;
                let verb = gremlin_verb(*direction);
                chain.push_str(&format!(".local({verb}('{edge_name}').fold())"));
            }
            IrBlock::Unfold => in_fold = false,
            IrBlock::ConstructResult(outputs) => construct_result = Some(outputs),
            _ => {}
        }
    }
    let _ = in_fold;

    let outputs = construct_result
        .ok_or_else(|| BackendError::InternalAssertionError("IR has no ConstructResult block".into()))?;

    let default_alias = current_alias.as_deref().unwrap_or("$matched");
    let projections: Vec<String> = outputs
        .iter()
        .map(|(name, expr)| format!("'{name}': {}", render_operand(default_alias, expr)))
        .collect();
    chain.push_str(&format!(".project({})", projections.join(", ")));

    Ok(CompiledQuery { query_text: chain, outputs: output_columns(ir) })
}

fn gremlin_verb(direction: Direction) -> &'static str {
    match direction {
        Direction::Out => "out",
        Direction::In => "in",
    }
}

fn render_predicate(expr: &Expression) -> String {
    match expr {
        Expression::And(parts) => parts.iter().map(render_predicate).collect::<Vec<_>>().join(""),
        Expression::Binary { op, left, right } => {
            let crate::ir::Expression::LocalField { field_name } = left.as_ref() else {
                return String::new();
            };
            let predicate = match op {
                FilterOp::Equals => format!("eq({})", render_operand("_", &right[0])),
                FilterOp::NotEquals => format!("neq({})", render_operand("_", &right[0])),
                FilterOp::LessThan => format!("lt({})", render_operand("_", &right[0])),
                FilterOp::LessThanOrEqual => format!("lte({})", render_operand("_", &right[0])),
                FilterOp::GreaterThan => format!("gt({})", render_operand("_", &right[0])),
                FilterOp::GreaterThanOrEqual => format!("gte({})", render_operand("_", &right[0])),
                FilterOp::Between => format!(
                    "between({}, {})",
                    render_operand("_", &right[0]),
                    render_operand("_", &right[1])
                ),
                FilterOp::InCollection => format!("within({})", render_operand("_", &right[0])),
                FilterOp::NotInCollection => format!("without({})", render_operand("_", &right[0])),
                _ => format!("/* unsupported operator {op:?} */"),
            };
            format!(".has('{field_name}', P.{predicate})")
        }
        _ => String::new(),
    }
}

fn render_operand(alias: &str, expr: &Expression) -> String {
    match expr {
        Expression::Literal(value) => format!("{value}"),
        Expression::Variable(name) => format!("${name}"),
        Expression::LocalField { field_name } => format!("{alias}.{field_name}"),
        Expression::ContextField { field_name, .. } => format!("values('{field_name}')"),
        Expression::FoldCount { .. } => "count(local)".to_string(),
        _ => format!("{expr:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::compile_to_ir;
    use crate::rewrites::normalize;

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
}
"#;

    fn schema() -> Schema {
        Schema::parse(ANIMAL_SCHEMA).expect("valid schema")
    }

    #[test]
    fn emits_a_label_filter_and_a_traversal_step() {
        let schema = schema();
        let ir = compile_to_ir(
            &schema,
            r#"{ Animal { out_Animal_ParentOf { name @output(out_name: "n") } } }"#,
        )
        .unwrap();
        let ir = normalize(ir, &schema);
        let compiled = emit(&schema, &ir).unwrap();
        assert!(compiled.query_text.starts_with("g.V().hasLabel('Animal')"));
        assert!(compiled.query_text.contains(".out('out_Animal_ParentOf')"));
    }

    #[test]
    fn emits_a_has_predicate_for_an_equality_filter() {
        let schema = schema();
        let ir = compile_to_ir(
            &schema,
            r#"{ Animal { name @filter(op_name: "=", value: ["$x"]) @output(out_name: "n") } }"#,
        )
        .unwrap();
        let ir = normalize(ir, &schema);
        let compiled = emit(&schema, &ir).unwrap();
        assert!(compiled.query_text.contains(".has('name', P.eq($x))"));
    }

    #[test]
    fn emits_a_bounded_repeat_for_recurse() {
        let schema = schema();
        let ir = compile_to_ir(
            &schema,
            r#"{ Animal { out_Animal_ParentOf @recurse(depth: 3) { name @output(out_name: "n") } } }"#,
        )
        .unwrap();
        let ir = normalize(ir, &schema);
        let compiled = emit(&schema, &ir).unwrap();
        assert!(compiled.query_text.contains(".repeat(out('out_Animal_ParentOf')).times(3).emit()"));
    }
}
