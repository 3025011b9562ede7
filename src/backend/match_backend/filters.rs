//! Filter emission templates: each `FilterOp` has a fixed
//! rendering, keyed by operator name. Field references resolve through a
//! [`RenderContext`] so a filter can read from its own step (`LocalField`),
//! a tagged field bound earlier in the query (`Tag`), or an arbitrary
//! `ContextField`/`FoldCount` location -- all three ultimately resolve to
//! `<alias>.<field>` once the caller tells us which alias a location maps to.
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ir::{Expression, FilterOp, Location};

/// What a filter expression needs in order to turn its `Location`-valued and
/// tag-valued operands into concrete step-qualified field references.
pub struct RenderContext<'a> {
    pub local_alias: &'a str,
    pub tag_lookup: &'a BTreeMap<Arc<str>, (Location, Arc<str>)>,
    pub resolve_location: &'a dyn Fn(&Location) -> String,
}

pub fn render(ctx: &RenderContext<'_>, expr: &Expression) -> String {
    match expr {
        Expression::And(parts) => {
            parts.iter().map(|p| format!("({})", render(ctx, p))).collect::<Vec<_>>().join(" AND ")
        }
        Expression::IsNull(inner) => format!("{} IS NULL", render_operand(ctx, inner)),
        Expression::Ternary { condition, if_true, if_false } => format!(
            "(IF({}, {}, {}))",
            render(ctx, condition),
            render_operand(ctx, if_true),
            render_operand(ctx, if_false)
        ),
        Expression::Binary { op, left, right } => render_binary(ctx, *op, left, right),
        other => render_operand(ctx, other),
    }
}

fn render_binary(ctx: &RenderContext<'_>, op: FilterOp, left: &Expression, right: &[Expression]) -> String {
    let field = render_operand(ctx, left);
    match op {
        FilterOp::Equals => format!("{field} = {}", render_operand(ctx, &right[0])),
        FilterOp::NotEquals => format!("{field} <> {}", render_operand(ctx, &right[0])),
        FilterOp::LessThan => format!("{field} < {}", render_operand(ctx, &right[0])),
        FilterOp::LessThanOrEqual => format!("{field} <= {}", render_operand(ctx, &right[0])),
        FilterOp::GreaterThan => format!("{field} > {}", render_operand(ctx, &right[0])),
        FilterOp::GreaterThanOrEqual => format!("{field} >= {}", render_operand(ctx, &right[0])),
        FilterOp::Between => format!(
            "{field} BETWEEN {} AND {}",
            render_operand(ctx, &right[0]),
            render_operand(ctx, &right[1])
        ),
        FilterOp::InCollection => format!("{field} IN {}", render_operand(ctx, &right[0])),
        FilterOp::NotInCollection => format!("{field} NOT IN {}", render_operand(ctx, &right[0])),
        FilterOp::Contains => format!("{field} CONTAINS {}", render_operand(ctx, &right[0])),
        FilterOp::NotContains => format!("NOT ({field} CONTAINS {})", render_operand(ctx, &right[0])),
        FilterOp::Intersects => {
            format!("{field}.intersect({}).size() > 0", render_operand(ctx, &right[0]))
        }
        FilterOp::HasSubstring => format!("{field} LIKE {}", like_operand(ctx, &right[0], "%{}%")),
        FilterOp::StartsWith => format!("{field} LIKE {}", like_operand(ctx, &right[0], "{}%")),
        FilterOp::EndsWith => format!("{field} LIKE {}", like_operand(ctx, &right[0], "%{}")),
        FilterOp::HasEdgeDegree => {
            let degree = render_operand(ctx, &right[0]);
            if degree == "0" {
                format!("({field} IS null OR {field}.size() = 0)")
            } else {
                format!("{field}.size() = {degree}")
            }
        }
        FilterOp::IsNull => format!("{field} IS NULL"),
        FilterOp::IsNotNull => format!("{field} IS NOT NULL"),
        FilterOp::NameOrAlias => {
            let value = render_operand(ctx, &right[0]);
            format!("({}.name = {value} OR {}.alias CONTAINS {value})", ctx.local_alias, ctx.local_alias)
        }
    }
}

/// Renders a `LIKE` pattern when the operand is a literal (so the wildcard
/// can be baked into the pattern text); falls back to the dialect's string
/// concatenation when the operand is a bind parameter or tag, since its
/// value isn't known until execution.
fn like_operand(ctx: &RenderContext<'_>, operand: &Expression, pattern: &str) -> String {
    match operand {
        Expression::Literal(value) => format!("\"{}\"", pattern.replace("{}", &value.to_string())),
        other => {
            let rendered = render_operand(ctx, other);
            pattern.replace("{}", &format!("\" + {rendered} + \"")).replacen("\"\" + ", "", 1)
        }
    }
}

fn render_operand(ctx: &RenderContext<'_>, expr: &Expression) -> String {
    match expr {
        Expression::Literal(value) => render_literal(value),
        Expression::Variable(name) => format!(":{name}"),
        Expression::Tag(name) => match ctx.tag_lookup.get(name) {
            Some((location, field_name)) => format!("{}.{field_name}", (ctx.resolve_location)(location)),
            None => format!(":{name}"),
        },
        Expression::LocalField { field_name } => format!("{}.{field_name}", ctx.local_alias),
        Expression::ContextField { location, field_name } => {
            format!("{}.{field_name}", (ctx.resolve_location)(location))
        }
        Expression::FoldCount { fold_location } => format!("{}.size()", (ctx.resolve_location)(fold_location)),
        Expression::List(items) => {
            let rendered: Vec<_> = items.iter().map(|i| render_operand(ctx, i)).collect();
            format!("[{}]", rendered.join(", "))
        }
        Expression::IsNull(_) | Expression::Binary { .. } | Expression::Ternary { .. } | Expression::And(_) => {
            format!("({})", render(ctx, expr))
        }
    }
}

fn render_literal(value: &crate::ir::FieldValue) -> String {
    use crate::ir::FieldValue;
    match value {
        FieldValue::String(_) | FieldValue::Date(_) | FieldValue::DateTime(_) | FieldValue::Decimal(_) => {
            format!("\"{value}\"")
        }
        FieldValue::Enum(_) => value.to_string(),
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FieldValue;

    fn ctx<'a>(alias: &'a str, tags: &'a BTreeMap<Arc<str>, (Location, Arc<str>)>) -> RenderContext<'a> {
        RenderContext { local_alias: alias, tag_lookup: tags, resolve_location: &|_| alias.to_string() }
    }

    #[test]
    fn renders_equals_with_bind_parameter() {
        let tags = BTreeMap::new();
        let expr = Expression::Binary {
            op: FilterOp::Equals,
            left: Box::new(Expression::LocalField { field_name: Arc::from("name") }),
            right: vec![Expression::Variable(Arc::from("x"))],
        };
        assert_eq!(render(&ctx("Animal___1", &tags), &expr), "Animal___1.name = :x");
    }

    #[test]
    fn renders_between_with_native_operator() {
        let tags = BTreeMap::new();
        let expr = Expression::Binary {
            op: FilterOp::Between,
            left: Box::new(Expression::LocalField { field_name: Arc::from("net_worth") }),
            right: vec![
                Expression::Literal(FieldValue::Int64(10)),
                Expression::Literal(FieldValue::Int64(20)),
            ],
        };
        assert_eq!(render(&ctx("Animal___1", &tags), &expr), "Animal___1.net_worth BETWEEN 10 AND 20");
    }

    #[test]
    fn renders_has_edge_degree_zero_as_null_or_empty() {
        let tags = BTreeMap::new();
        let expr = Expression::Binary {
            op: FilterOp::HasEdgeDegree,
            left: Box::new(Expression::LocalField { field_name: Arc::from("out_Animal_ParentOf") }),
            right: vec![Expression::Literal(FieldValue::Int64(0))],
        };
        assert_eq!(
            render(&ctx("Animal___1", &tags), &expr),
            "(Animal___1.out_Animal_ParentOf IS null OR Animal___1.out_Animal_ParentOf.size() = 0)"
        );
    }

    #[test]
    fn renders_conjunction_of_two_filters() {
        let tags = BTreeMap::new();
        let expr = Expression::And(vec![
            Expression::Binary {
                op: FilterOp::GreaterThan,
                left: Box::new(Expression::LocalField { field_name: Arc::from("net_worth") }),
                right: vec![Expression::Variable(Arc::from("lo"))],
            },
            Expression::Binary {
                op: FilterOp::LessThan,
                left: Box::new(Expression::LocalField { field_name: Arc::from("net_worth") }),
                right: vec![Expression::Variable(Arc::from("hi"))],
            },
        ]);
        assert_eq!(
            render(&ctx("Animal___1", &tags), &expr),
            "(Animal___1.net_worth > :lo) AND (Animal___1.net_worth < :hi)"
        );
    }

    #[test]
    fn renders_tag_reference_through_its_binding_location() {
        let mut tags = BTreeMap::new();
        tags.insert(Arc::from("parent_wealth"), (Location::root(), Arc::from("net_worth")));
        let context = RenderContext {
            local_alias: "Animal___2",
            tag_lookup: &tags,
            resolve_location: &|loc| if loc == &Location::root() { "Animal___1".to_string() } else { "?".to_string() },
        };
        let expr = Expression::Binary {
            op: FilterOp::GreaterThan,
            left: Box::new(Expression::LocalField { field_name: Arc::from("net_worth") }),
            right: vec![Expression::Tag(Arc::from("parent_wealth"))],
        };
        assert_eq!(render(&context, &expr), "Animal___2.net_worth > Animal___1.net_worth");
    }
}
