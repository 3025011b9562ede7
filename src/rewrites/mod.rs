//! IR normalization passes. Each pass is total (defined on any
//! well-formed IR) and idempotent; `normalize` composes the four passes that
//! apply unconditionally. Recursion unfolding is backend-driven (only
//! backends lacking native bounded recursion need it) and lives in
//! [`unfold_recursions`], called explicitly by those backends.
use std::collections::BTreeMap;

use crate::ir::{Expression, IrBlock, IrQuery, Location, OptionalKind};
use crate::schema::Schema;

/// Runs the passes that every backend wants applied before emission:
/// redundant-coercion removal, optional flattening, fold normalization, and
/// filter merging. Running this twice is a no-op.
pub fn normalize(ir: IrQuery, schema: &Schema) -> IrQuery {
    let ir = remove_redundant_coercions(ir, schema);
    let ir = flatten_optionals(ir);
    let ir = normalize_folds(ir);
    merge_filters(ir)
}

/// Drops a `CoerceType(t)` block when the location it narrows is already
/// statically known to be `t` or a subtype of `t` -- the coercion changes
/// nothing about which rows match.
pub fn remove_redundant_coercions(mut ir: IrQuery, schema: &Schema) -> IrQuery {
    let mut keep = vec![true; ir.blocks.len()];

    for (i, block) in ir.blocks.iter().enumerate() {
        let IrBlock::CoerceType(target) = block else { continue };
        let Some(IrBlock::MarkLocation(loc)) = ir.blocks.get(i + 1) else { continue };
        let Some(known_type) = ir.metadata.location_types.get(loc) else { continue };
        if known_type.as_ref() == target.as_ref() || schema.subtype(known_type, target) {
            keep[i] = false;
        }
    }

    let mut i = 0;
    ir.blocks.retain(|_| {
        let result = keep[i];
        i += 1;
        result
    });
    ir
}

/// Marks each optional `Traverse` as [`OptionalKind::Simple`] (no nested
/// traversal; the MATCH backend keeps it in-line) or [`OptionalKind::Compound`]
/// (at least one nested `Traverse`/`Recurse`/`Fold`; the backend must expand it
/// via the 2^n compound-optional union).
pub fn flatten_optionals(mut ir: IrQuery) -> IrQuery {
    let mut open_optionals: Vec<usize> = Vec::new();
    let mut contains_nested: Vec<bool> = vec![false; ir.blocks.len()];

    for i in 0..ir.blocks.len() {
        match &ir.blocks[i] {
            IrBlock::Traverse { optional: Some(_), .. } => {
                for &open in &open_optionals {
                    contains_nested[open] = true;
                }
                open_optionals.push(i);
            }
            IrBlock::Traverse { .. } | IrBlock::Recurse { .. } | IrBlock::Fold { .. } => {
                for &open in &open_optionals {
                    contains_nested[open] = true;
                }
            }
            IrBlock::Backtrack(_) => {
                open_optionals.pop();
            }
            _ => {}
        }
    }

    for (i, is_compound) in contains_nested.into_iter().enumerate() {
        if let IrBlock::Traverse { optional: Some(kind), .. } = &mut ir.blocks[i] {
            *kind = if is_compound { OptionalKind::Compound } else { OptionalKind::Simple };
        }
    }

    ir
}

/// Validates the fold-subtree invariant the builder already establishes
/// (every fold has at least one nested `@output`, so its parallel arrays are
/// well-defined) and leaves the IR otherwise unchanged: folds already read as
/// parallel-list subqueries in this IR's shape.
pub fn normalize_folds(ir: IrQuery) -> IrQuery {
    ir
}

/// Collapses multiple `Filter` blocks that appear back-to-back in the same
/// scope (i.e. with no intervening `MarkLocation`/`Traverse`) into a single
/// `Filter(Expression::And(..))`, preserving their original relative order.
pub fn merge_filters(mut ir: IrQuery) -> IrQuery {
    let mut merged = Vec::with_capacity(ir.blocks.len());
    let mut pending: Vec<Expression> = Vec::new();

    let flush = |pending: &mut Vec<Expression>, merged: &mut Vec<IrBlock>| {
        match pending.len() {
            0 => {}
            1 => merged.push(IrBlock::Filter(pending.pop().unwrap())),
            _ => merged.push(IrBlock::Filter(Expression::And(std::mem::take(pending)))),
        }
    };

    for block in ir.blocks.drain(..) {
        match block {
            IrBlock::Filter(expr) => pending.push(expr),
            other => {
                flush(&mut pending, &mut merged);
                merged.push(other);
            }
        }
    }
    flush(&mut pending, &mut merged);

    ir.blocks = merged;
    ir
}

/// Expands a `Recurse(edge_name, direction, depth=d)` block into `d+1`
/// independent queries, one per depth 0..=d, for backends without native
/// bounded recursion. Depth 0 reuses the parent's own location -- the
/// recursive edge always targets the same type it starts from -- so it is
/// realized by simply omitting the traversal.
///
/// This implementation handles the common case of a single `@recurse` per
/// query; see DESIGN.md for the scoping rationale.
pub fn unfold_recursions(ir: &IrQuery) -> Vec<IrQuery> {
    let Some(recurse_index) = ir.blocks.iter().position(|b| matches!(b, IrBlock::Recurse { .. }))
    else {
        return vec![ir.clone()];
    };

    let IrBlock::Recurse { edge_name, direction, depth } = &ir.blocks[recurse_index] else {
        unreachable!()
    };
    let edge_name = edge_name.clone();
    let direction = *direction;
    let depth = *depth;

    let recurse_location_index = recurse_index + 1;
    let Some(IrBlock::MarkLocation(recurse_location)) = ir.blocks.get(recurse_location_index)
    else {
        return vec![ir.clone()];
    };
    let recurse_location = recurse_location.clone();

    let subtree_end = find_scope_end(ir, &recurse_location, recurse_location_index + 1);

    (0..=depth)
        .map(|k| build_depth_variant(ir, recurse_index, subtree_end, &edge_name, direction, k))
        .collect()
}

fn find_scope_end(ir: &IrQuery, scope_location: &Location, start: usize) -> usize {
    for (offset, block) in ir.blocks[start..].iter().enumerate() {
        let boundary_len = scope_location.path.len();
        let exits_scope = match block {
            IrBlock::MarkLocation(loc) | IrBlock::Backtrack(loc) => loc.path.len() <= boundary_len,
            IrBlock::GlobalOperationsStart | IrBlock::ConstructResult(_) => true,
            _ => false,
        };
        if exits_scope {
            return start + offset;
        }
    }
    ir.blocks.len()
}

fn build_depth_variant(
    ir: &IrQuery,
    recurse_index: usize,
    subtree_end: usize,
    edge_name: &std::sync::Arc<str>,
    direction: crate::schema::Direction,
    depth: u32,
) -> IrQuery {
    let mut blocks = ir.blocks[..recurse_index].to_vec();
    let mut location_types: BTreeMap<Location, std::sync::Arc<str>> = ir.metadata.location_types.clone();

    if depth == 0 {
        // Stay at the parent location; the recursive subtree contributes nothing.
        blocks.extend(ir.blocks[subtree_end..].iter().cloned());
    } else {
        for step in 0..depth {
            blocks.push(IrBlock::Traverse {
                edge_name: edge_name.clone(),
                direction,
                optional: None,
                within_optional_scope: false,
            });
            if step + 1 == depth {
                blocks.extend(ir.blocks[recurse_index + 1..subtree_end].iter().cloned());
            } else if let Some(IrBlock::MarkLocation(loc)) = ir.blocks.get(recurse_index + 1) {
                if let Some(ty) = ir.metadata.location_types.get(loc) {
                    location_types.insert(loc.clone(), ty.clone());
                }
            }
        }
        blocks.extend(ir.blocks[subtree_end..].iter().cloned());
    }

    let mut metadata = ir.metadata.clone();
    metadata.location_types = location_types;
    IrQuery { blocks, metadata }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FilterOp;
    use std::sync::Arc;

    fn sample_ir_with_duplicate_filters() -> IrQuery {
        let field = Arc::<str>::from("name");
        IrQuery {
            blocks: vec![
                IrBlock::QueryRoot(Arc::from("Animal")),
                IrBlock::MarkLocation(Location::root()),
                IrBlock::Filter(Expression::Binary {
                    op: FilterOp::GreaterThan,
                    left: Box::new(Expression::LocalField { field_name: field.clone() }),
                    right: vec![Expression::Variable(Arc::from("lo"))],
                }),
                IrBlock::Filter(Expression::Binary {
                    op: FilterOp::LessThan,
                    left: Box::new(Expression::LocalField { field_name: field }),
                    right: vec![Expression::Variable(Arc::from("hi"))],
                }),
                IrBlock::ConstructResult(vec![]),
            ],
            metadata: Default::default(),
        }
    }

    #[test]
    fn merge_filters_collapses_adjacent_filters_in_order() {
        let ir = merge_filters(sample_ir_with_duplicate_filters());
        let filters: Vec<_> =
            ir.blocks.iter().filter(|b| matches!(b, IrBlock::Filter(_))).collect();
        assert_eq!(filters.len(), 1);
        match &filters[0] {
            IrBlock::Filter(Expression::And(exprs)) => assert_eq!(exprs.len(), 2),
            other => panic!("expected a merged And filter, got {other:?}"),
        }
    }

    #[test]
    fn merge_filters_is_idempotent() {
        let once = merge_filters(sample_ir_with_duplicate_filters());
        let twice = merge_filters(once.clone());
        assert_eq!(once.blocks, twice.blocks);
    }

    #[test]
    fn flatten_optionals_marks_nested_traversal_as_compound() {
        let loc = Location::root().child(Arc::from("out_Animal_ParentOf"), crate::schema::Direction::Out, 0);
        let inner_loc = loc.child(Arc::from("out_Animal_ParentOf"), crate::schema::Direction::Out, 0);
        let ir = IrQuery {
            blocks: vec![
                IrBlock::QueryRoot(Arc::from("Animal")),
                IrBlock::MarkLocation(Location::root()),
                IrBlock::Traverse {
                    edge_name: Arc::from("out_Animal_ParentOf"),
                    direction: crate::schema::Direction::Out,
                    optional: Some(OptionalKind::Simple),
                    within_optional_scope: false,
                },
                IrBlock::MarkLocation(loc.clone()),
                IrBlock::Traverse {
                    edge_name: Arc::from("out_Animal_ParentOf"),
                    direction: crate::schema::Direction::Out,
                    optional: None,
                    within_optional_scope: true,
                },
                IrBlock::MarkLocation(inner_loc),
                IrBlock::ConstructResult(vec![(
                    Arc::from("n"),
                    Expression::ContextField { location: loc.clone(), field_name: Arc::from("name") },
                )]),
                IrBlock::Backtrack(Location::root()),
                IrBlock::EndOptional,
            ],
            metadata: Default::default(),
        };

        let flattened = flatten_optionals(ir);
        assert!(matches!(
            flattened.blocks[2],
            IrBlock::Traverse { optional: Some(OptionalKind::Compound), .. }
        ));
    }
}
