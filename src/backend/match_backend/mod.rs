//! MATCH backend: emits a graph-pattern SQL query, in an
//! OrientDB-flavored MATCH dialect, chaining `{class, as, where}` pattern
//! steps through `.out('edge')`/`.in('edge')` hops. This is the backend the
//! rest of the compiler is built around; the others (§4.6) are summarized.
pub mod compound_optional;
pub mod filters;
pub mod type_info;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::{output_columns, BackendError, CompiledQuery};
use crate::ir::{Expression, IrBlock, IrQuery, Location};
use crate::schema::{Direction, Schema};

use filters::RenderContext;

pub fn emit(schema: &Schema, ir: &IrQuery) -> Result<CompiledQuery, BackendError> {
    let variants = compound_optional::expand(ir);
    let mut rendered = Vec::with_capacity(variants.len());
    for variant in &variants {
        rendered.push(render_variant(schema, variant)?);
    }

    let query_text = if rendered.len() == 1 {
        rendered.into_iter().next().unwrap()
    } else {
        rendered.join("\nUNIONALL\n")
    };

    Ok(CompiledQuery { query_text, outputs: output_columns(ir) })
}

/// One pattern step: `{class: C, as: alias, where: ...}`, plus the edge (if
/// any) that connects it to the step before it.
struct Step {
    alias: Arc<str>,
    class: Arc<str>,
    wheres: Vec<Expression>,
    incoming_edge: Option<IncomingEdge>,
}

struct IncomingEdge {
    edge_name: Arc<str>,
    direction: Direction,
    optional: bool,
    recurse_depth: Option<u32>,
}

/// A `@fold` subtree, rendered as its own aggregating subquery and referred
/// to from the outer projection by `fold_alias`.
struct FoldSubquery {
    fold_alias: Arc<str>,
    /// Alias and class of the step the fold hangs off of, so the subquery's
    /// pattern can start from the same row the outer query already bound.
    parent_alias: Arc<str>,
    parent_class: Arc<str>,
    steps: Vec<Step>,
}

struct Emitter {
    steps: Vec<Step>,
    alias_of: BTreeMap<Location, Arc<str>>,
    alias_counts: BTreeMap<Arc<str>, u32>,
    folds: Vec<FoldSubquery>,
    tag_lookup: BTreeMap<Arc<str>, (Location, Arc<str>)>,
}

fn render_variant(schema: &Schema, ir: &IrQuery) -> Result<String, BackendError> {
    let tag_lookup = ir
        .metadata
        .tags
        .iter()
        .map(|t| (t.tag_name.clone(), (t.location.clone(), t.field_name.clone())))
        .collect();

    let mut emitter = Emitter {
        steps: Vec::new(),
        alias_of: BTreeMap::new(),
        alias_counts: BTreeMap::new(),
        folds: Vec::new(),
        tag_lookup,
    };

    let mut global_filters: Vec<Expression> = Vec::new();
    let mut in_global_scope = false;
    let mut pending_edge: Option<IncomingEdge> = None;
    let mut pending_coercion: Option<Arc<str>> = None;
    let mut construct_result: Option<&Vec<(Arc<str>, Expression)>> = None;

    let mut i = 0;
    while i < ir.blocks.len() {
        match &ir.blocks[i] {
            IrBlock::QueryRoot(_) => {}
            IrBlock::Traverse { edge_name, direction, optional, .. } => {
                pending_edge = Some(IncomingEdge {
                    edge_name: edge_name.clone(),
                    direction: *direction,
                    optional: optional.is_some(),
                    recurse_depth: None,
                });
            }
            IrBlock::Recurse { edge_name, direction, depth } => {
                pending_edge = Some(IncomingEdge {
                    edge_name: edge_name.clone(),
                    direction: *direction,
                    optional: false,
                    recurse_depth: Some(*depth),
                });
            }
            IrBlock::CoerceType(target) => pending_coercion = Some(target.clone()),
            IrBlock::MarkLocation(location) => {
                let known_type = ir
                    .metadata
                    .location_types
                    .get(location)
                    .ok_or_else(|| {
                        BackendError::InternalAssertionError(format!(
                            "location {location} has no recorded static type"
                        ))
                    })?
                    .clone();
                let class = type_info::choose_class(schema, &known_type, pending_coercion.as_deref());
                pending_coercion = None;

                let alias = emitter.fresh_alias(&class);
                emitter.alias_of.insert(location.clone(), alias.clone());
                emitter.steps.push(Step {
                    alias,
                    class,
                    wheres: Vec::new(),
                    incoming_edge: pending_edge.take(),
                });
            }
            IrBlock::Filter(expr) => {
                if in_global_scope {
                    global_filters.push(expr.clone());
                } else if let Some(step) = emitter.steps.last_mut() {
                    step.wheres.push(expr.clone());
                }
            }
            IrBlock::Fold { start_location, edge_name, direction } => {
                let parent_step = emitter.steps.last().ok_or_else(|| {
                    BackendError::InternalAssertionError(format!(
                        "fold at {start_location} has no enclosing pattern step"
                    ))
                })?;
                let parent_alias = parent_step.alias.clone();
                let parent_class = parent_step.class.clone();

                let fold_alias: Arc<str> = Arc::from(format!("fold_{}", emitter.folds.len() + 1));
                let (fold_steps, consumed) = render_fold_subtree(
                    ir,
                    i,
                    start_location,
                    edge_name,
                    *direction,
                    &fold_alias,
                )?;
                emitter.alias_of.insert(start_location.clone(), fold_alias.clone());
                emitter.folds.push(FoldSubquery {
                    fold_alias,
                    parent_alias,
                    parent_class,
                    steps: fold_steps,
                });
                i = consumed;
                continue;
            }
            IrBlock::Unfold | IrBlock::Backtrack(_) | IrBlock::EndOptional | IrBlock::OutputSource => {}
            IrBlock::GlobalOperationsStart => in_global_scope = true,
            IrBlock::ConstructResult(outputs) => construct_result = Some(outputs),
        }
        i += 1;
    }

    let outputs = construct_result
        .ok_or_else(|| BackendError::InternalAssertionError("IR has no ConstructResult block".into()))?;

    Ok(emitter.render(outputs, &global_filters))
}

/// Renders a fold's subtree as its own isolated step chain, starting a fresh
/// alias/location namespace rooted at `start_location`. The root step is
/// bound to `fold_alias` itself, so leaf field references inside the fold
/// (`fold_N.field_name`) and the fold's own subquery projection agree on the
/// same row. Returns the rendered steps and the index just past the fold's
/// matching `Unfold`.
fn render_fold_subtree(
    ir: &IrQuery,
    fold_block_index: usize,
    start_location: &Location,
    edge_name: &Arc<str>,
    direction: Direction,
    fold_alias: &Arc<str>,
) -> Result<(Vec<Step>, usize), BackendError> {
    let known_type = ir.metadata.location_types.get(start_location).ok_or_else(|| {
        BackendError::InternalAssertionError(format!("fold root {start_location} has no static type"))
    })?;

    let mut steps = vec![Step {
        alias: fold_alias.clone(),
        class: Arc::from(known_type.as_ref()),
        wheres: Vec::new(),
        incoming_edge: Some(IncomingEdge {
            edge_name: edge_name.clone(),
            direction,
            optional: false,
            recurse_depth: None,
        }),
    }];

    let mut depth = 0usize;
    let mut i = fold_block_index + 1;
    while i < ir.blocks.len() {
        match &ir.blocks[i] {
            IrBlock::Fold { .. } | IrBlock::Traverse { .. } => depth += 1,
            IrBlock::Filter(expr) => {
                if let Some(step) = steps.last_mut() {
                    step.wheres.push(expr.clone());
                }
            }
            IrBlock::Unfold if depth == 0 => return Ok((steps, i + 1)),
            IrBlock::Unfold => depth -= 1,
            _ => {}
        }
        i += 1;
    }

    Err(BackendError::InternalAssertionError(format!(
        "Fold at {start_location} is missing its matching Unfold"
    )))
}

impl Emitter {
    fn fresh_alias(&mut self, class: &Arc<str>) -> Arc<str> {
        let count = self.alias_counts.entry(class.clone()).or_insert(0);
        *count += 1;
        Arc::from(format!("{class}___{count}"))
    }

    fn resolve_location(&self, location: &Location) -> String {
        self.alias_of
            .get(location)
            .map(|a| a.to_string())
            .unwrap_or_else(|| format!("<unresolved:{location}>"))
    }

    /// Renders a chain of steps as `{class, as, where}.verb('edge'){...}...`,
    /// the same template the main pattern and each fold's own pattern use.
    fn render_pattern(&self, steps: &[&Step]) -> String {
        let mut pattern = String::new();
        for (i, step) in steps.iter().enumerate() {
            if i > 0 {
                if let Some(edge) = &step.incoming_edge {
                    let verb = match edge.direction {
                        Direction::Out => "out",
                        Direction::In => "in",
                    };
                    pattern.push('.');
                    pattern.push_str(verb);
                    pattern.push_str("('");
                    pattern.push_str(&edge.edge_name);
                    pattern.push_str("')");
                    if let Some(depth) = edge.recurse_depth {
                        pattern.push_str(&format!("{{while: ($depth < {depth})}}"));
                    } else if edge.optional {
                        pattern.push_str("{optional: true}");
                    }
                }
            }
            pattern.push_str("{class: ");
            pattern.push_str(&step.class);
            pattern.push_str(", as: ");
            pattern.push_str(&step.alias);
            if !step.wheres.is_empty() {
                let ctx = RenderContext {
                    local_alias: &step.alias,
                    tag_lookup: &self.tag_lookup,
                    resolve_location: &|loc| self.resolve_location(loc),
                };
                let predicate = step
                    .wheres
                    .iter()
                    .map(|w| filters::render(&ctx, w))
                    .collect::<Vec<_>>()
                    .join(" AND ");
                pattern.push_str(", where: (");
                pattern.push_str(&predicate);
                pattern.push(')');
            }
            pattern.push('}');
        }
        pattern
    }

    /// Renders a fold as its own correlated subquery: a pattern starting from
    /// the fold's parent row and chaining through the fold's edge (and any
    /// filters on the folded steps), returning the matched rows under the
    /// fold's alias so outer references like `fold_1.field_name` and
    /// `fold_1.size()` read as array projections over that row set.
    fn render_fold(&self, fold: &FoldSubquery) -> String {
        let anchor = Step {
            alias: fold.parent_alias.clone(),
            class: fold.parent_class.clone(),
            wheres: Vec::new(),
            incoming_edge: None,
        };
        let mut chain: Vec<&Step> = vec![&anchor];
        chain.extend(fold.steps.iter());
        let pattern = self.render_pattern(&chain);
        format!(
            "  LET {} = (SELECT FROM (MATCH {pattern} RETURN {}))\n",
            fold.fold_alias, fold.fold_alias
        )
    }

    fn render(&self, outputs: &[(Arc<str>, Expression)], global_filters: &[Expression]) -> String {
        let steps: Vec<&Step> = self.steps.iter().collect();
        let pattern = self.render_pattern(&steps);

        let mut projection = Vec::with_capacity(outputs.len());
        for (name, expr) in outputs {
            let default_alias =
                self.steps.first().map(|s| s.alias.as_ref()).unwrap_or("$matched");
            let ctx = RenderContext {
                local_alias: default_alias,
                tag_lookup: &self.tag_lookup,
                resolve_location: &|loc| self.resolve_location(loc),
            };
            projection.push(format!("{} AS `{name}`", filters::render(&ctx, expr)));
        }

        let mut text = format!("SELECT {}\nFROM (\n  MATCH {pattern}\n", projection.join(", "));
        for fold in &self.folds {
            text.push_str(&self.render_fold(fold));
        }
        if !global_filters.is_empty() {
            let ctx = RenderContext {
                local_alias: self.steps.first().map(|s| s.alias.as_ref()).unwrap_or("$matched"),
                tag_lookup: &self.tag_lookup,
                resolve_location: &|loc| self.resolve_location(loc),
            };
            let predicate = global_filters
                .iter()
                .map(|f| filters::render(&ctx, f))
                .collect::<Vec<_>>()
                .join(" AND ");
            text.push_str(&format!("  WHERE {predicate}\n"));
        }
        text.push_str("  RETURN $matches\n)");
        text
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
  in_Animal_ParentOf: Animal
}
"#;

    fn schema() -> Schema {
        Schema::parse(ANIMAL_SCHEMA).expect("valid schema")
    }

    #[test]
    fn simple_output_emits_projection_over_one_class() {
        let schema = schema();
        let ir = compile_to_ir(&schema, r#"{ Animal { name @output(out_name: "n") } }"#).unwrap();
        let ir = normalize(ir, &schema);
        let compiled = emit(&schema, &ir).unwrap();
        assert!(compiled.query_text.contains("{class: Animal, as: Animal___1}"));
        assert!(compiled.query_text.contains("Animal___1.name AS `n`"));
    }

    #[test]
    fn parameterized_filter_binds_a_named_placeholder() {
        let schema = schema();
        let ir = compile_to_ir(
            &schema,
            r#"{ Animal { name @filter(op_name: "=", value: ["$x"]) @output(out_name: "n") } }"#,
        )
        .unwrap();
        let ir = normalize(ir, &schema);
        let compiled = emit(&schema, &ir).unwrap();
        assert!(compiled.query_text.contains("where: (Animal___1.name = :x)"));
    }

    #[test]
    fn tagged_cross_scope_filter_references_the_parent_alias() {
        let schema = schema();
        let query = r#"{
            Animal {
                net_worth @tag(tag_name: "parent_wealth")
                out_Animal_ParentOf {
                    net_worth @filter(op_name: ">", value: ["%parent_wealth"]) @output(out_name: "child_worth")
                }
            }
        }"#;
        let ir = compile_to_ir(&schema, query).unwrap();
        let ir = normalize(ir, &schema);
        let compiled = emit(&schema, &ir).unwrap();
        assert!(compiled.query_text.contains("Animal___2.net_worth > Animal___1.net_worth"));
    }

    #[test]
    fn fold_with_count_renders_a_fold_subquery_and_size_projection() {
        let schema = schema();
        let query = r#"{
            Animal {
                out_Animal_ParentOf @fold {
                    _x_count @output(out_name: "n_children")
                }
            }
        }"#;
        let ir = compile_to_ir(&schema, query).unwrap();
        let ir = normalize(ir, &schema);
        let compiled = emit(&schema, &ir).unwrap();
        assert!(compiled
            .query_text
            .contains("LET fold_1 = (SELECT FROM (MATCH {class: Animal, as: Animal___1}.out('Animal_ParentOf'){class: Animal, as: fold_1} RETURN fold_1))"));
        assert!(compiled.query_text.contains("fold_1.size() AS `n_children`"));
    }

    #[test]
    fn fold_with_filter_and_output_renders_the_filter_and_a_real_field_projection() {
        let schema = schema();
        let query = r#"{
            Animal {
                out_Animal_ParentOf @fold {
                    name @filter(op_name: "=", value: ["$parent_name"]) @output(out_name: "parent_names")
                }
            }
        }"#;
        let ir = compile_to_ir(&schema, query).unwrap();
        let ir = normalize(ir, &schema);
        let compiled = emit(&schema, &ir).unwrap();
        assert!(compiled.query_text.contains("where: (fold_1.name = :parent_name)"));
        assert!(compiled.query_text.contains("fold_1.name AS `parent_names`"));
    }
}
