//! Validates that every `$variable` a lowered query references has a
//! matching entry in the caller-supplied parameter map, and that its value
//! is parseable as the scalar type of the field it filters. This runs after
//! lowering, once the IR's `Filter` blocks already know which field each
//! operand belongs to; the builder itself never sees parameter values.
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::frontend::error::{FilterArgumentError, FrontendError};
use crate::ir::ty::Type;
use crate::ir::value::{parse_date, parse_datetime, parse_decimal};
use crate::ir::{Expression, FieldValue, IrBlock, IrQuery};
use crate::schema::{FieldKind, Schema};

pub fn check_parameters(
    schema: &Schema,
    ir: &IrQuery,
    parameters: &BTreeMap<Arc<str>, FieldValue>,
) -> Result<(), FrontendError> {
    let mut current_type: Option<Arc<str>> = None;

    for block in &ir.blocks {
        match block {
            IrBlock::QueryRoot(label) => current_type = Some(label.clone()),
            IrBlock::MarkLocation(location) => {
                current_type = ir.metadata.location_types.get(location).cloned();
            }
            IrBlock::CoerceType(target) => current_type = Some(target.clone()),
            IrBlock::Filter(expr) => {
                if let Some(type_name) = &current_type {
                    check_expression(schema, type_name, expr, parameters)?;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn check_expression(
    schema: &Schema,
    current_type: &str,
    expr: &Expression,
    parameters: &BTreeMap<Arc<str>, FieldValue>,
) -> Result<(), FrontendError> {
    match expr {
        Expression::And(parts) => {
            for part in parts {
                check_expression(schema, current_type, part, parameters)?;
            }
            Ok(())
        }
        Expression::Binary { left, right, .. } => {
            let Expression::LocalField { field_name } = left.as_ref() else { return Ok(()) };
            let Some(FieldKind::Property { value_type }) =
                schema.resolve_field(current_type, field_name)
            else {
                return Ok(());
            };
            for operand in right {
                if let Expression::Variable(name) = operand {
                    check_variable(name, field_name, &value_type, parameters)?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_variable(
    name: &Arc<str>,
    field_name: &Arc<str>,
    value_type: &Type,
    parameters: &BTreeMap<Arc<str>, FieldValue>,
) -> Result<(), FrontendError> {
    let value = parameters
        .get(name)
        .ok_or_else(|| FilterArgumentError::MissingParameter(name.to_string(), field_name.to_string()))?;

    validate_scalar(value, value_type).map_err(|reason| {
        FilterArgumentError::UnparseableValue(field_name.to_string(), value_type.to_string(), reason).into()
    })
}

/// Whether `value` is an acceptable reading for a field of type `value_type`.
/// Lists are checked element-wise (the `in_collection`/`not_in_collection`
/// parameter case: the field itself is scalar, but the supplied value is a
/// list of same-scalar values).
fn validate_scalar(value: &FieldValue, value_type: &Type) -> Result<(), String> {
    let base = value_type.base_named_type();
    match (base, value) {
        (_, FieldValue::Null) => Ok(()),
        ("Int", FieldValue::Int64(_) | FieldValue::Uint64(_)) => Ok(()),
        ("Float", FieldValue::Float64(_) | FieldValue::Int64(_) | FieldValue::Uint64(_)) => Ok(()),
        ("String" | "ID", FieldValue::String(_)) => Ok(()),
        ("Boolean", FieldValue::Boolean(_)) => Ok(()),
        ("Date", FieldValue::Date(_)) => Ok(()),
        ("Date", FieldValue::String(s)) => parse_date(s).map(|_| ()).map_err(|e| e.to_string()),
        ("DateTime", FieldValue::DateTime(_)) => Ok(()),
        ("DateTime", FieldValue::String(s)) => parse_datetime(s).map(|_| ()).map_err(|e| e.to_string()),
        ("Decimal", FieldValue::Decimal(_)) => Ok(()),
        ("Decimal", FieldValue::String(s)) => parse_decimal(s).map(|_| ()).map_err(|e| e.to_string()),
        (_, FieldValue::List(items)) => items.iter().try_for_each(|item| validate_scalar(item, value_type)),
        (base, value) => Err(format!("expected a {base} value, found {value}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::compile_to_ir;

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
}
"#;

    fn schema() -> Schema {
        Schema::parse(ANIMAL_SCHEMA).expect("valid schema")
    }

    #[test]
    fn accepts_a_correctly_typed_parameter() {
        let schema = schema();
        let ir = compile_to_ir(
            &schema,
            r#"{ Animal { name @filter(op_name: "=", value: ["$x"]) @output(out_name: "n") } }"#,
        )
        .unwrap();
        let params = BTreeMap::from([(Arc::from("x"), FieldValue::String("Hedwig".to_string()))]);
        assert!(check_parameters(&schema, &ir, &params).is_ok());
    }

    #[test]
    fn rejects_a_missing_parameter() {
        let schema = schema();
        let ir = compile_to_ir(
            &schema,
            r#"{ Animal { name @filter(op_name: "=", value: ["$x"]) @output(out_name: "n") } }"#,
        )
        .unwrap();
        let params = BTreeMap::new();
        let err = check_parameters(&schema, &ir, &params).unwrap_err();
        assert!(matches!(
            err,
            FrontendError::FilterArgumentError(FilterArgumentError::MissingParameter(..))
        ));
    }

    #[test]
    fn rejects_a_parameter_of_the_wrong_scalar() {
        let schema = schema();
        let ir = compile_to_ir(
            &schema,
            r#"{ Animal { net_worth @filter(op_name: ">", value: ["$x"]) @output(out_name: "n") } }"#,
        )
        .unwrap();
        let params = BTreeMap::from([(Arc::from("x"), FieldValue::String("not a number".to_string()))]);
        let err = check_parameters(&schema, &ir, &params).unwrap_err();
        assert!(matches!(
            err,
            FrontendError::FilterArgumentError(FilterArgumentError::UnparseableValue(..))
        ));
    }
}
