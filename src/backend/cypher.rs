//! Cypher-style pattern backend: emits `MATCH (alias:Label)
//! -[:EDGE]->(alias)` patterns, with `@recurse(depth: n)` compiling to a
//! variable-length relationship (`-[:EDGE*0..n]->`) since Cypher supports
//! that natively, and `@optional` compiling to `OPTIONAL MATCH` rather than
//! the MATCH backend's `UNIONALL` expansion -- Cypher's optional-match
//! semantics already guarantee the same disjointness the compound-optional
//! pass exists to simulate for the OrientDB dialect. Filter values are
//! always emitted as named placeholders (`$name`); the inline-parameter mode
//! which this backend also allows is summarized but not implemented (see DESIGN.md).
use std::sync::Arc;

use crate::backend::{output_columns, BackendError, CompiledQuery};
use crate::ir::{Expression, FilterOp, IrBlock, IrQuery};
use crate::schema::{Direction, Schema};

pub fn emit(schema: &Schema, ir: &IrQuery) -> Result<CompiledQuery, BackendError> {
    let mut pattern = String::new();
    let mut wheres: Vec<String> = Vec::new();
    let mut pending_edge: Option<(Arc<str>, Direction, bool, Option<u32>)> = None;
    let mut current_alias: Option<Arc<str>> = None;
    let mut alias_counts: std::collections::BTreeMap<Arc<str>, u32> = Default::default();
    let mut construct_result: Option<&Vec<(Arc<str>, Expression)>> = None;

    for block in &ir.blocks {
        match block {
            IrBlock::QueryRoot(_) => {}
            IrBlock::Traverse { edge_name, direction, optional, .. } => {
                pending_edge = Some((edge_name.clone(), *direction, optional.is_some(), None));
            }
            IrBlock::Recurse { edge_name, direction, depth } => {
                pending_edge = Some((edge_name.clone(), *direction, false, Some(*depth)));
            }
            IrBlock::MarkLocation(location) => {
                let type_name = ir
                    .metadata
                    .location_types
                    .get(location)
                    .ok_or_else(|| {
                        BackendError::InternalAssertionError(format!(
                            "location {location} has no recorded static type"
                        ))
                    })?
                    .clone();
                let count = alias_counts.entry(type_name.clone()).or_insert(0);
                *count += 1;
                let alias: Arc<str> = Arc::from(format!("{type_name}___{count}"));

                if let Some((edge_name, direction, optional, depth)) = pending_edge.take() {
                    if optional {
                        pattern.push_str("\nOPTIONAL MATCH ");
                        if let Some(parent) = &current_alias {
                            pattern.push('(');
                            pattern.push_str(parent);
                            pattern.push(')');
                        }
                    }
                    let rel = match depth {
                        Some(d) => format!("*0..{d}"),
                        None => String::new(),
                    };
                    match direction {
                        Direction::Out => {
                            pattern.push_str(&format!("-[:{edge_name}{rel}]->({alias}:{type_name})"))
                        }
                        Direction::In => {
                            pattern.push_str(&format!("<-[:{edge_name}{rel}]-({alias}:{type_name})"))
                        }
                    }
                } else {
                    pattern.push_str(&format!("MATCH ({alias}:{type_name})"));
                }
                current_alias = Some(alias);
            }
            IrBlock::Filter(expr) => {
                if let Some(alias) = &current_alias {
                    wheres.push(render_predicate(alias, expr));
                }
            }
            IrBlock::ConstructResult(outputs) => construct_result = Some(outputs),
            _ => {}
        }
    }
    let _ = schema;

    let outputs = construct_result
        .ok_or_else(|| BackendError::InternalAssertionError("IR has no ConstructResult block".into()))?;

    let default_alias = current_alias.as_deref().unwrap_or("n");
    let projections: Vec<String> = outputs
        .iter()
        .map(|(name, expr)| format!("{} AS {name}", render_operand(default_alias, expr)))
        .collect();

    let mut text = pattern;
    if !wheres.is_empty() {
        text.push_str(&format!("\nWHERE {}", wheres.join(" AND ")));
    }
    text.push_str(&format!("\nRETURN {}", projections.join(", ")));

    Ok(CompiledQuery { query_text: text, outputs: output_columns(ir) })
}

fn render_predicate(alias: &str, expr: &Expression) -> String {
    match expr {
        Expression::And(parts) => {
            parts.iter().map(|p| format!("({})", render_predicate(alias, p))).collect::<Vec<_>>().join(" AND ")
        }
        Expression::Binary { op, left, right } => {
            let field = render_operand(alias, left);
            match op {
                FilterOp::Equals => format!("{field} = {}", render_operand(alias, &right[0])),
                FilterOp::NotEquals => format!("{field} <> {}", render_operand(alias, &right[0])),
                FilterOp::LessThan => format!("{field} < {}", render_operand(alias, &right[0])),
                FilterOp::LessThanOrEqual => format!("{field} <= {}", render_operand(alias, &right[0])),
                FilterOp::GreaterThan => format!("{field} > {}", render_operand(alias, &right[0])),
                FilterOp::GreaterThanOrEqual => format!("{field} >= {}", render_operand(alias, &right[0])),
                FilterOp::Between => format!(
                    "{field} >= {} AND {field} <= {}",
                    render_operand(alias, &right[0]),
                    render_operand(alias, &right[1])
                ),
                FilterOp::InCollection => format!("{field} IN {}", render_operand(alias, &right[0])),
                FilterOp::NotInCollection => format!("NOT {field} IN {}", render_operand(alias, &right[0])),
                FilterOp::HasSubstring => format!("{field} CONTAINS {}", render_operand(alias, &right[0])),
                FilterOp::StartsWith => format!("{field} STARTS WITH {}", render_operand(alias, &right[0])),
                FilterOp::EndsWith => format!("{field} ENDS WITH {}", render_operand(alias, &right[0])),
                _ => format!("{field} /* unsupported operator {op:?} */"),
            }
        }
        other => render_operand(alias, other),
    }
}

fn render_operand(alias: &str, expr: &Expression) -> String {
    match expr {
        Expression::Literal(value) => format!("{value}"),
        Expression::Variable(name) => format!("${name}"),
        Expression::LocalField { field_name } => format!("{alias}.{field_name}"),
        Expression::ContextField { field_name, .. } => format!("{alias}.{field_name}"),
        Expression::FoldCount { .. } => "size(collect(*))".to_string(),
        other => format!("{other:?}"),
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
  out_Animal_ParentOf: Animal
}
"#;

    fn schema() -> Schema {
        Schema::parse(ANIMAL_SCHEMA).expect("valid schema")
    }

    #[test]
    fn emits_a_match_pattern_with_a_relationship_hop() {
        let schema = schema();
        let ir = compile_to_ir(
            &schema,
            r#"{ Animal { out_Animal_ParentOf { name @output(out_name: "n") } } }"#,
        )
        .unwrap();
        let ir = normalize(ir, &schema);
        let compiled = emit(&schema, &ir).unwrap();
        assert!(compiled.query_text.contains("MATCH (Animal___1:Animal)"));
        assert!(compiled.query_text.contains("-[:out_Animal_ParentOf]->(Animal___2:Animal)"));
        assert!(compiled.query_text.contains("RETURN Animal___2.name AS n"));
    }

    #[test]
    fn emits_a_variable_length_relationship_for_recurse() {
        let schema = schema();
        let ir = compile_to_ir(
            &schema,
            r#"{ Animal { out_Animal_ParentOf @recurse(depth: 3) { name @output(out_name: "n") } } }"#,
        )
        .unwrap();
        let ir = normalize(ir, &schema);
        let compiled = emit(&schema, &ir).unwrap();
        assert!(compiled.query_text.contains("-[:out_Animal_ParentOf*0..3]->"));
    }

    #[test]
    fn emits_optional_match_for_a_simple_optional() {
        let schema = schema();
        let ir = compile_to_ir(
            &schema,
            r#"{ Animal { out_Animal_ParentOf @optional { name @output(out_name: "n") } } }"#,
        )
        .unwrap();
        let ir = normalize(ir, &schema);
        let compiled = emit(&schema, &ir).unwrap();
        assert!(compiled.query_text.contains("OPTIONAL MATCH (Animal___1)"));
    }
}
