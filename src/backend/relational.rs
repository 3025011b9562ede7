//! Relational builder backend: traversals become joins,
//! filters become a `WHERE` clause, and folds/`_x_count`/`@recurse` are
//! rejected outright since this backend has no aggregating-subquery or
//! bounded-recursion story (unlike the MATCH backend's fold subqueries and
//! native `{while: ...}` recursion).
//!
//! Primary keys are not part of the GraphQL schema model, so by convention a
//! vertex type is joinable only if it declares a scalar field named `id`;
//! a traversal landing on a type without one is rejected the same way an
//! unsupported fold is, since neither side of the join could otherwise be
//! built.
use std::sync::Arc;

use crate::backend::{output_columns, BackendError, CompiledQuery};
use crate::ir::{Expression, FilterOp, IrBlock, IrQuery};
use crate::schema::{Direction, Schema, FieldKind};

const BACKEND_NAME: &str = "relational";

struct Join {
    table: Arc<str>,
    alias: Arc<str>,
    on: Option<(Arc<str>, Arc<str>, Arc<str>)>, // (left_alias, left_col, right_col)
}

pub fn emit(schema: &Schema, ir: &IrQuery) -> Result<CompiledQuery, BackendError> {
    for block in &ir.blocks {
        match block {
            IrBlock::Fold { start_location, .. } => {
                return Err(BackendError::NotSupportedByBackend {
                    backend: BACKEND_NAME,
                    feature: "folds and _x_count".to_string(),
                    location: start_location.to_string(),
                })
            }
            IrBlock::Recurse { .. } => {
                return Err(BackendError::NotSupportedByBackend {
                    backend: BACKEND_NAME,
                    feature: "@recurse".to_string(),
                    location: "<recurse>".to_string(),
                })
            }
            _ => {}
        }
    }

    let mut joins: Vec<Join> = Vec::new();
    let mut alias_counts: std::collections::BTreeMap<Arc<str>, u32> = Default::default();
    let mut wheres: Vec<String> = Vec::new();
    let mut pending_edge: Option<(Arc<str>, Direction)> = None;
    let mut construct_result: Option<&Vec<(Arc<str>, Expression)>> = None;
    let mut current_alias: Option<Arc<str>> = None;

    for block in &ir.blocks {
        match block {
            IrBlock::QueryRoot(_) => {}
            IrBlock::Traverse { edge_name, direction, .. } => {
                pending_edge = Some((edge_name.clone(), *direction));
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
                if !has_primary_key(schema, &type_name) {
                    return Err(BackendError::NotSupportedByBackend {
                        backend: BACKEND_NAME,
                        feature: format!("type {type_name} has no primary key (`id` field)"),
                        location: location.to_string(),
                    });
                }

                let count = alias_counts.entry(type_name.clone()).or_insert(0);
                *count += 1;
                let alias: Arc<str> = Arc::from(format!("{type_name}___{count}"));

                let on = match (pending_edge.take(), &current_alias) {
                    (Some((edge_name, _direction)), Some(parent_alias)) => {
                        Some((parent_alias.clone(), edge_name, Arc::from("id")))
                    }
                    _ => None,
                };

                joins.push(Join { table: type_name, alias: alias.clone(), on });
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

    let outputs = construct_result
        .ok_or_else(|| BackendError::InternalAssertionError("IR has no ConstructResult block".into()))?;

    let default_alias = joins.first().map(|j| j.alias.as_ref()).unwrap_or("?");
    let projection: Vec<String> = outputs
        .iter()
        .map(|(name, expr)| format!("{} AS {name}", render_operand(default_alias, expr)))
        .collect();

    let mut from_clause = String::new();
    for (i, join) in joins.iter().enumerate() {
        if i == 0 {
            from_clause.push_str(&format!("{} AS {}", join.table, join.alias));
        } else {
            from_clause.push_str(&format!("\nJOIN {} AS {}", join.table, join.alias));
            if let Some((left_alias, left_col, right_col)) = &join.on {
                from_clause.push_str(&format!(
                    " ON {left_alias}.{left_col} = {}.{right_col}",
                    join.alias
                ));
            }
        }
    }

    let mut text = format!("SELECT {}\nFROM {from_clause}", projection.join(", "));
    if !wheres.is_empty() {
        text.push_str(&format!("\nWHERE {}", wheres.join(" AND ")));
    }

    Ok(CompiledQuery { query_text: text, outputs: output_columns(ir) })
}

fn has_primary_key(schema: &Schema, type_name: &str) -> bool {
    matches!(schema.resolve_field(type_name, "id"), Some(FieldKind::Property { .. }))
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
                    "{field} BETWEEN {} AND {}",
                    render_operand(alias, &right[0]),
                    render_operand(alias, &right[1])
                ),
                FilterOp::InCollection => format!("{field} IN {}", render_operand(alias, &right[0])),
                FilterOp::NotInCollection => format!("{field} NOT IN {}", render_operand(alias, &right[0])),
                _ => format!("{field} /* unsupported operator {op:?} */"),
            }
        }
        other => render_operand(alias, other),
    }
}

fn render_operand(alias: &str, expr: &Expression) -> String {
    match expr {
        crate::ir::Expression::Literal(value) => format!("{value}"),
        crate::ir::Expression::Variable(name) => format!(":{name}"),
        crate::ir::Expression::LocalField { field_name } => format!("{alias}.{field_name}"),
        crate::ir::Expression::ContextField { field_name, .. } => format!("{alias}.{field_name}"),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::compile_to_ir;
    use crate::rewrites::normalize;

    const KEYED_SCHEMA: &str = r#"
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
  id: String
  name: String
  out_Animal_ParentOf: Animal
}
"#;

    const UNKEYED_SCHEMA: &str = r#"
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
}
"#;

    #[test]
    fn emits_a_join_per_traversal_when_every_type_has_a_primary_key() {
        let schema = Schema::parse(KEYED_SCHEMA).expect("valid schema");
        let ir = compile_to_ir(
            &schema,
            r#"{ Animal { out_Animal_ParentOf { name @output(out_name: "n") } } }"#,
        )
        .unwrap();
        let ir = normalize(ir, &schema);
        let compiled = emit(&schema, &ir).unwrap();
        assert!(compiled.query_text.contains("JOIN Animal AS Animal___2"));
        assert!(compiled.query_text.contains("ON Animal___1.out_Animal_ParentOf = Animal___2.id"));
    }

    #[test]
    fn rejects_a_type_with_no_primary_key() {
        let schema = Schema::parse(UNKEYED_SCHEMA).expect("valid schema");
        let ir = compile_to_ir(&schema, r#"{ Animal { name @output(out_name: "n") } }"#).unwrap();
        let ir = normalize(ir, &schema);
        let err = emit(&schema, &ir).unwrap_err();
        assert!(matches!(err, BackendError::NotSupportedByBackend { .. }));
    }

    #[test]
    fn rejects_folds() {
        let schema = Schema::parse(KEYED_SCHEMA).expect("valid schema");
        let ir = compile_to_ir(
            &schema,
            r#"{ Animal { out_Animal_ParentOf @fold { _x_count @output(out_name: "n") } } }"#,
        )
        .unwrap();
        let ir = normalize(ir, &schema);
        let err = emit(&schema, &ir).unwrap_err();
        assert!(matches!(
            err,
            BackendError::NotSupportedByBackend { feature, .. } if feature.contains("fold")
        ));
    }
}
