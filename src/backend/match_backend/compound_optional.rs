//! Compound-optional expansion: a compound optional can't stay
//! inline in a single MATCH pattern, because the database cannot continue a
//! traversal past a step that didn't match. For `n` compound optionals this
//! module enumerates all `2^n` subsets, materializing the optional's
//! traversal for members of the subset and asserting the corresponding edge
//! is absent for everyone else, so the branches are pairwise disjoint and
//! jointly exhaustive.
use std::sync::Arc;

use crate::ir::{Expression, FieldValue, FilterOp, IrBlock, IrQuery, Location, OptionalKind};
use crate::schema::Direction;

struct Group {
    traverse_index: usize,
    /// Index of the `EndOptional` block that closes this group (inclusive).
    end_index: usize,
    parent_location: Location,
    edge_name: Arc<str>,
    /// The location the group's subtree is rooted at; used to recognize
    /// outputs that must be null-projected when this group is elided.
    subtree_location: Location,
}

/// Returns one `IrQuery` per subset of the query's compound optionals, in
/// `0..2^n` bitmask order, so branch order is deterministic across calls.
/// A query with no compound optionals returns a single, unmodified variant.
pub fn expand(ir: &IrQuery) -> Vec<IrQuery> {
    let groups = find_groups(ir);
    if groups.is_empty() {
        return vec![ir.clone()];
    }

    let n = groups.len();
    (0u32..(1 << n)).map(|mask| build_variant(ir, &groups, mask)).collect()
}

fn find_groups(ir: &IrQuery) -> Vec<Group> {
    let mut groups = Vec::new();
    let mut stack: Vec<usize> = Vec::new();

    for (i, block) in ir.blocks.iter().enumerate() {
        match block {
            IrBlock::Traverse { optional: Some(_), .. } => stack.push(i),
            IrBlock::Backtrack(parent_location) => {
                let Some(start) = stack.pop() else { continue };
                let IrBlock::Traverse { optional: Some(OptionalKind::Compound), edge_name, .. } =
                    &ir.blocks[start]
                else {
                    continue;
                };
                let subtree_location = ir.blocks[start + 1..]
                    .iter()
                    .find_map(|b| match b {
                        IrBlock::MarkLocation(loc) => Some(loc.clone()),
                        _ => None,
                    })
                    .expect("an optional Traverse is always followed by a MarkLocation");
                let end_index = if matches!(ir.blocks.get(i + 1), Some(IrBlock::EndOptional)) {
                    i + 1
                } else {
                    i
                };
                groups.push(Group {
                    traverse_index: start,
                    end_index,
                    parent_location: parent_location.clone(),
                    edge_name: edge_name.clone(),
                    subtree_location,
                });
            }
            _ => {}
        }
    }

    groups.sort_by_key(|g| g.traverse_index);
    groups
}

fn build_variant(ir: &IrQuery, groups: &[Group], mask: u32) -> IrQuery {
    let elided: Vec<&Group> =
        groups.iter().enumerate().filter(|(i, _)| mask & (1 << i) == 0).map(|(_, g)| g).collect();

    let mut blocks = Vec::with_capacity(ir.blocks.len());
    let mut skip_until: Option<usize> = None;
    for (i, block) in ir.blocks.iter().enumerate() {
        if let Some(end) = skip_until {
            if i <= end {
                if i == end {
                    skip_until = None;
                }
                continue;
            }
        }
        if let Some(group) = elided.iter().find(|g| g.traverse_index == i) {
            skip_until = Some(group.end_index);
            continue;
        }
        blocks.push(block.clone());
    }

    for group in &elided {
        let disjointness = IrBlock::Filter(Expression::Binary {
            op: FilterOp::HasEdgeDegree,
            left: Box::new(Expression::ContextField {
                location: group.parent_location.clone(),
                field_name: group.edge_name.clone(),
            }),
            right: vec![Expression::Literal(FieldValue::Int64(0))],
        });
        let insert_at = blocks
            .iter()
            .position(|b| matches!(b, IrBlock::GlobalOperationsStart | IrBlock::ConstructResult(_)))
            .unwrap_or(blocks.len());
        blocks.insert(insert_at, disjointness);
    }

    if let Some(IrBlock::ConstructResult(outputs)) = blocks.last_mut() {
        for (_, expr) in outputs.iter_mut() {
            if let Some(location) = expression_location(expr) {
                if elided.iter().any(|g| location_within(location, &g.subtree_location)) {
                    *expr = Expression::Literal(FieldValue::Null);
                }
            }
        }
    }

    IrQuery { blocks, metadata: ir.metadata.clone() }
}

fn expression_location(expr: &Expression) -> Option<&Location> {
    match expr {
        Expression::ContextField { location, .. } => Some(location),
        Expression::FoldCount { fold_location } => Some(fold_location),
        _ => None,
    }
}

fn location_within(location: &Location, subtree_root: &Location) -> bool {
    location.path.len() >= subtree_root.path.len() && location.path[..subtree_root.path.len()] == subtree_root.path[..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{OutputInfo, QueryMetadata};
    use crate::ir::ty::Type;

    fn compound_optional_ir() -> IrQuery {
        let root = Location::root();
        let outer = root.child(Arc::from("in_Animal_ParentOf"), Direction::In, 0);
        let inner = outer.child(Arc::from("in_Animal_ParentOf"), Direction::In, 0);

        IrQuery {
            blocks: vec![
                IrBlock::QueryRoot(Arc::from("Animal")),
                IrBlock::MarkLocation(root.clone()),
                IrBlock::Traverse {
                    edge_name: Arc::from("in_Animal_ParentOf"),
                    direction: Direction::In,
                    optional: Some(OptionalKind::Compound),
                    within_optional_scope: false,
                },
                IrBlock::MarkLocation(outer.clone()),
                IrBlock::Traverse {
                    edge_name: Arc::from("in_Animal_ParentOf"),
                    direction: Direction::In,
                    optional: None,
                    within_optional_scope: true,
                },
                IrBlock::MarkLocation(inner.clone()),
                IrBlock::Backtrack(root.clone()),
                IrBlock::EndOptional,
                IrBlock::ConstructResult(vec![(
                    Arc::from("grandparent_name"),
                    Expression::ContextField { location: inner.clone(), field_name: Arc::from("name") },
                )]),
            ],
            metadata: QueryMetadata {
                outputs: vec![OutputInfo {
                    out_name: Arc::from("grandparent_name"),
                    location: inner,
                    field_name: Arc::from("name"),
                    value_type: Type::new_named_type("String", true),
                    inside_fold: None,
                }],
                ..Default::default()
            },
        }
    }

    #[test]
    fn a_single_compound_optional_produces_two_branches() {
        let variants = expand(&compound_optional_ir());
        assert_eq!(variants.len(), 2);
    }

    #[test]
    fn the_elided_branch_nulls_the_nested_output_and_adds_a_disjointness_filter() {
        let variants = expand(&compound_optional_ir());
        let elided = &variants[0];
        assert!(elided.blocks.iter().any(|b| matches!(
            b,
            IrBlock::Filter(Expression::Binary { op: FilterOp::HasEdgeDegree, .. })
        )));
        assert!(!elided.blocks.iter().any(|b| matches!(b, IrBlock::Traverse { .. })));
        match elided.blocks.last() {
            Some(IrBlock::ConstructResult(outputs)) => {
                assert!(matches!(outputs[0].1, Expression::Literal(FieldValue::Null)))
            }
            other => panic!("expected ConstructResult, got {other:?}"),
        }
    }

    #[test]
    fn the_materialized_branch_keeps_both_traversals() {
        let variants = expand(&compound_optional_ir());
        let materialized = &variants[1];
        let traverse_count =
            materialized.blocks.iter().filter(|b| matches!(b, IrBlock::Traverse { .. })).count();
        assert_eq!(traverse_count, 2);
    }
}
