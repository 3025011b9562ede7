//! Lowers a parsed, schema-unaware [`Query`] into the linear IR, performing
//! semantic analysis (eleven validation rules) as it goes: the
//! builder resolves every field against the schema and rejects the query at
//! the first rule violation it reaches, recording the rest only as far as
//! the traversal got.
use std::{collections::BTreeSet, sync::Arc};

use smallvec::SmallVec;

use crate::frontend::error::{DirectiveError, FilterArgumentError, FrontendError, TypeError};
use crate::graphql_query::{
    directives::OperatorArgument,
    query::{parse_document, FieldNode, Query},
};
use crate::ir::{
    ty::Type, Expression, FilterOp, IrBlock, IrQuery, Location, OptionalKind, OutputInfo,
    QueryMetadata, TagInfo,
};
use crate::schema::{Direction, FieldKind, Schema};

const COUNT_PSEUDO_FIELD: &str = "_x_count";
/// The record-metadata field a type coercion's own `@filter`s are lowered
/// against, since the coercion itself (not any one property) is what they
/// constrain. Backends that expose a record's class/type name under this
/// name (the MATCH backend's OrientDB dialect does, via `@class`) render it
/// directly; others inherit the same dot-access rendering as any other field.
const COERCION_CLASS_FIELD: &str = "@class";

struct Builder<'s> {
    schema: &'s Schema,
    blocks: Vec<IrBlock>,
    metadata: QueryMetadata,
    global_filters: Vec<Expression>,
    all_tag_names: BTreeSet<Arc<str>>,
    bound_tags: BTreeSet<Arc<str>>,
    output_names: BTreeSet<Arc<str>>,
    tag_names_seen: BTreeSet<Arc<str>>,
    visit_counters: std::collections::HashMap<Vec<(Arc<str>, Direction)>, u32>,
    saw_output_source: bool,
}

/// Lowers `query_text` against `schema`, producing IR ready for the rewrite
/// passes. This is the compiler's frontend entry point.
pub fn lower(schema: &Schema, query_text: &str) -> Result<IrQuery, FrontendError> {
    let query = parse_document(query_text)?;
    lower_parsed(schema, &query)
}

pub fn lower_parsed(schema: &Schema, query: &Query) -> Result<IrQuery, FrontendError> {
    let mut builder = Builder {
        schema,
        blocks: Vec::new(),
        metadata: QueryMetadata::default(),
        global_filters: Vec::new(),
        all_tag_names: collect_all_tag_names(&query.root_field),
        bound_tags: BTreeSet::new(),
        output_names: BTreeSet::new(),
        tag_names_seen: BTreeSet::new(),
        visit_counters: Default::default(),
        saw_output_source: false,
    };

    let root = &query.root_field;
    let root_type: Arc<str> = match schema.resolve_field(schema.query_type_name(), root.name.as_ref())
    {
        Some(FieldKind::Vertex { target_type, .. }) => target_type,
        Some(FieldKind::Property { .. }) | None => {
            return Err(TypeError::NonExistentField(
                schema.query_type_name().to_owned(),
                root.name.to_string(),
            )
            .into())
        }
    };

    builder.blocks.push(IrBlock::QueryRoot(root_type.clone()));
    let root_location = Location::root();
    builder.blocks.push(IrBlock::MarkLocation(root_location.clone()));
    builder.metadata.location_types.insert(root_location.clone(), root_type.clone());

    builder.lower_scope(&root_type, root_location, &root.connections, false, None)?;

    if !builder.global_filters.is_empty() {
        builder.blocks.push(IrBlock::GlobalOperationsStart);
        for filter in std::mem::take(&mut builder.global_filters) {
            builder.blocks.push(IrBlock::Filter(filter));
        }
    }

    let outputs = builder
        .metadata
        .outputs
        .iter()
        .map(|o| {
            let expr = match &o.inside_fold {
                Some(fold_location) if o.field_name.as_ref() == COUNT_PSEUDO_FIELD => {
                    Expression::FoldCount { fold_location: fold_location.clone() }
                }
                _ => Expression::ContextField {
                    location: o.location.clone(),
                    field_name: o.field_name.clone(),
                },
            };
            (o.out_name.clone(), expr)
        })
        .collect();
    builder.blocks.push(IrBlock::ConstructResult(outputs));

    Ok(IrQuery { blocks: builder.blocks, metadata: builder.metadata })
}

fn collect_all_tag_names(node: &FieldNode) -> BTreeSet<Arc<str>> {
    let mut names = BTreeSet::new();
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        if let Some(tag) = &n.directives.tag {
            names.insert(tag.tag_name.clone());
        }
        stack.extend(n.connections.iter());
    }
    names
}

impl<'s> Builder<'s> {
    fn next_visit_counter(&mut self, location: &Location) -> u32 {
        let counter = self.visit_counters.entry(location.path.clone()).or_insert(0);
        let value = *counter;
        *counter += 1;
        value
    }

    fn lower_scope(
        &mut self,
        parent_type: &str,
        location: Location,
        fields: &[FieldNode],
        within_optional: bool,
        within_fold: Option<Location>,
    ) -> Result<(), FrontendError> {
        // Rule 4 (partial): tags defined by property fields in this very scope
        // are visible to filters elsewhere in the same scope regardless of order.
        for field in fields {
            if Schema::is_vertex_field(field.name.as_ref()) {
                continue;
            }
            if let Some(tag) = &field.directives.tag {
                self.bound_tags.insert(tag.tag_name.clone());
            }
        }

        let mut seen_vertex_field = false;
        for field in fields {
            let is_count_pseudo_field = field.name.as_ref() == COUNT_PSEUDO_FIELD;
            let is_vertex =
                !is_count_pseudo_field && Schema::is_vertex_field(field.name.as_ref());

            self.lower_coercion_filters(field)?;

            if is_vertex {
                seen_vertex_field = true;
                self.lower_vertex_field(parent_type, &location, field, within_optional, within_fold.clone())?;
            } else {
                if seen_vertex_field {
                    return Err(TypeError::PropertyFieldAfterVertexField(field.name.to_string()).into());
                }
                self.lower_property_field(
                    parent_type,
                    &location,
                    field,
                    is_count_pseudo_field,
                    within_fold.clone(),
                )?;
            }
        }

        Ok(())
    }

    /// `@filter`s attached directly to the inline fragment a field was
    /// coerced by apply to the coercion itself rather than to any one
    /// property, so they're lowered against the coerced record's own
    /// class/type name (`@class`, the same record-metadata field the MATCH
    /// backend's type coercions already key off of) instead of a field value.
    fn lower_coercion_filters(&mut self, field: &FieldNode) -> Result<(), FrontendError> {
        if field.coercion_filters.is_empty() {
            return Ok(());
        }
        let field_name: Arc<str> = Arc::from(COERCION_CLASS_FIELD);
        let value_type = Type::new_named_type("String", false);
        for filter in &field.coercion_filters {
            let expr = self.lower_filter(&field_name, &value_type, filter)?;
            let is_global = filter
                .arguments
                .iter()
                .any(|a| matches!(a, OperatorArgument::TagRef(t) if self.is_fold_bound_tag(t)));
            if is_global {
                self.global_filters.push(expr);
            } else {
                self.blocks.push(IrBlock::Filter(expr));
            }
        }
        Ok(())
    }

    fn lower_property_field(
        &mut self,
        parent_type: &str,
        location: &Location,
        field: &FieldNode,
        is_count_pseudo_field: bool,
        within_fold: Option<Location>,
    ) -> Result<(), FrontendError> {
        if is_count_pseudo_field && within_fold.is_none() {
            return Err(DirectiveError::CountReferencedOutsideFold(field.name.to_string()).into());
        }

        let value_type = if is_count_pseudo_field {
            Type::new_named_type("Int", false)
        } else {
            match self.schema.resolve_field(parent_type, field.name.as_ref()) {
                Some(FieldKind::Property { value_type }) => value_type,
                Some(FieldKind::Vertex { .. }) => {
                    return Err(TypeError::NonExistentField(
                        parent_type.to_owned(),
                        field.name.to_string(),
                    )
                    .into())
                }
                None => {
                    return Err(TypeError::NonExistentField(
                        parent_type.to_owned(),
                        field.name.to_string(),
                    )
                    .into())
                }
            }
        };

        if let Some(tag) = &field.directives.tag {
            if !self.tag_names_seen.insert(tag.tag_name.clone()) {
                return Err(DirectiveError::DuplicateTagName(tag.tag_name.to_string()).into());
            }
            self.metadata.tags.push(TagInfo {
                tag_name: tag.tag_name.clone(),
                location: location.clone(),
                field_name: field.name.clone(),
            });
        }

        if let Some(output) = &field.directives.output {
            if !self.output_names.insert(output.out_name.clone()) {
                return Err(DirectiveError::DuplicateOutputName(output.out_name.to_string()).into());
            }
            self.metadata.outputs.push(OutputInfo {
                out_name: output.out_name.clone(),
                location: location.clone(),
                field_name: field.name.clone(),
                value_type: value_type.clone(),
                inside_fold: within_fold.clone(),
            });
        }

        for filter in &field.directives.filter {
            let expr = self.lower_filter(&field.name, &value_type, filter)?;
            let is_global = is_count_pseudo_field
                || filter.arguments.iter().any(|a| matches!(a, OperatorArgument::TagRef(t) if self.is_fold_bound_tag(t)));
            if is_global {
                self.global_filters.push(expr);
            } else {
                self.blocks.push(IrBlock::Filter(expr));
            }
        }

        Ok(())
    }

    /// `@recurse`'s target type must be reachable from the enclosing type: a
    /// recursive edge only makes sense if repeating it can ever land back on
    /// a type compatible with where it started. For a union target, at least
    /// one of the union's member types must satisfy this.
    fn recurse_target_reachable(&self, parent_type: &str, target_type: &str) -> bool {
        let related = |candidate: &str| {
            self.schema.subtype(parent_type, candidate) || self.schema.subtype(candidate, parent_type)
        };
        match self.schema.union_members(target_type) {
            Some(mut members) => members.any(related),
            None => related(target_type),
        }
    }

    fn is_fold_bound_tag(&self, tag_name: &str) -> bool {
        self.metadata
            .tags
            .iter()
            .any(|t| t.tag_name.as_ref() == tag_name && self.metadata.fold_locations.iter().any(|f| t.location.path.starts_with(&f.path)))
    }

    fn lower_filter(
        &mut self,
        field_name: &Arc<str>,
        value_type: &Type,
        filter: &crate::graphql_query::directives::FilterDirective,
    ) -> Result<Expression, FrontendError> {
        let op = FilterOp::from_name(filter.op_name.as_ref()).ok_or_else(|| {
            FilterArgumentError::UnrecognizedOperator(
                filter.op_name.to_string(),
                field_name.to_string(),
            )
        })?;

        if filter.arguments.len() != op.arity() {
            return Err(FilterArgumentError::ArgumentCountMismatch(
                filter.op_name.to_string(),
                field_name.to_string(),
                op.arity(),
                filter.arguments.len(),
            )
            .into());
        }

        match op {
            FilterOp::LessThan
            | FilterOp::LessThanOrEqual
            | FilterOp::GreaterThan
            | FilterOp::GreaterThanOrEqual
            | FilterOp::Between => {
                if !value_type.is_orderable() {
                    return Err(FilterArgumentError::OperatorRequiresOrderableType(
                        filter.op_name.to_string(),
                        field_name.to_string(),
                        value_type.to_string(),
                    )
                    .into());
                }
            }
            FilterOp::InCollection | FilterOp::NotInCollection => {
                if value_type.is_list() {
                    return Err(FilterArgumentError::OperatorScalarMismatch(
                        filter.op_name.to_string(),
                        field_name.to_string(),
                        value_type.to_string(),
                    )
                    .into());
                }
            }
            FilterOp::Contains | FilterOp::NotContains | FilterOp::Intersects => {
                if !value_type.is_list() {
                    return Err(FilterArgumentError::OperatorScalarMismatch(
                        filter.op_name.to_string(),
                        field_name.to_string(),
                        value_type.to_string(),
                    )
                    .into());
                }
            }
            FilterOp::HasSubstring
            | FilterOp::StartsWith
            | FilterOp::EndsWith
            | FilterOp::NameOrAlias => {
                if value_type.base_named_type() != "String" {
                    return Err(FilterArgumentError::OperatorScalarMismatch(
                        filter.op_name.to_string(),
                        field_name.to_string(),
                        value_type.to_string(),
                    )
                    .into());
                }
            }
            FilterOp::HasEdgeDegree
            | FilterOp::Equals
            | FilterOp::NotEquals
            | FilterOp::IsNull
            | FilterOp::IsNotNull => {}
        }

        let operands: SmallVec<[Expression; 2]> = filter
            .arguments
            .iter()
            .map(|arg| self.lower_operator_argument(field_name, arg))
            .collect::<Result<_, _>>()?;

        Ok(Expression::Binary {
            op,
            left: Box::new(Expression::LocalField { field_name: field_name.clone() }),
            right: operands.into_vec(),
        })
    }

    fn lower_operator_argument(
        &mut self,
        field_name: &Arc<str>,
        argument: &OperatorArgument,
    ) -> Result<Expression, FrontendError> {
        match argument {
            OperatorArgument::VariableRef(name) => Ok(Expression::Variable(name.clone())),
            OperatorArgument::TagRef(name) => {
                if !self.all_tag_names.contains(name.as_ref()) {
                    return Err(
                        DirectiveError::UndefinedTagInFilter(field_name.to_string(), name.to_string())
                            .into(),
                    );
                }
                if !self.bound_tags.contains(name.as_ref()) {
                    return Err(DirectiveError::TagReferencedBeforeBound(
                        field_name.to_string(),
                        name.to_string(),
                    )
                    .into());
                }
                Ok(Expression::Tag(name.clone()))
            }
        }
    }

    fn lower_vertex_field(
        &mut self,
        parent_type: &str,
        parent_location: &Location,
        field: &FieldNode,
        within_optional: bool,
        within_fold: Option<Location>,
    ) -> Result<(), FrontendError> {
        let (target_type, direction) = match self.schema.resolve_field(parent_type, field.name.as_ref())
        {
            Some(FieldKind::Vertex { target_type, direction, .. }) => (target_type, direction),
            _ => {
                return Err(TypeError::NonExistentField(
                    parent_type.to_owned(),
                    field.name.to_string(),
                )
                .into())
            }
        };

        let directives = &field.directives;
        let is_fold = directives.fold.is_some();
        let is_recurse = directives.recurse.is_some();
        let is_optional = directives.optional.is_some();

        if is_optional && within_fold.is_some() {
            return Err(DirectiveError::OptionalInsideFold(field.name.to_string()).into());
        }
        if is_fold && within_fold.is_some() {
            return Err(DirectiveError::FoldInsideFold(field.name.to_string()).into());
        }
        if is_recurse && within_fold.is_some() {
            return Err(DirectiveError::RecurseInsideFold(field.name.to_string()).into());
        }
        if is_optional && is_recurse {
            return Err(DirectiveError::OptionalAndRecurseOnSameField(field.name.to_string()).into());
        }
        if directives.output_source.is_some() {
            if self.saw_output_source {
                return Err(DirectiveError::DuplicateOutputSource(field.name.to_string()).into());
            }
            if within_fold.is_some() || within_optional {
                return Err(
                    DirectiveError::OutputSourceInsideFoldOrOptional(field.name.to_string()).into()
                );
            }
            self.saw_output_source = true;
        }

        let resolved_target = field.coerced_to.as_deref().unwrap_or(target_type.as_ref());
        if let Some(coerced) = &field.coerced_to {
            if coerced.as_ref() != target_type.as_ref()
                && !self.schema.type_coercion_valid(target_type.as_ref(), coerced)
            {
                return Err(TypeError::InvalidTypeCoercion(
                    target_type.to_string(),
                    coerced.to_string(),
                )
                .into());
            }
        }

        let visit_counter = {
            let mut path = parent_location.path.clone();
            path.push((field.name.clone(), direction));
            self.next_visit_counter(&Location { path, visit_counter: 0 })
        };
        let child_location = parent_location.child(field.name.clone(), direction, visit_counter);

        if is_fold {
            self.blocks.push(IrBlock::Fold {
                start_location: child_location.clone(),
                edge_name: field.name.clone(),
                direction,
            });
            self.metadata.fold_locations.insert(child_location.clone());
        } else if let Some(recurse) = &directives.recurse {
            if recurse.depth < 1 {
                return Err(DirectiveError::RecurseDepthMustBePositive(
                    field.name.to_string(),
                    recurse.depth,
                )
                .into());
            }
            if !self.recurse_target_reachable(parent_type, target_type.as_ref()) {
                return Err(DirectiveError::RecurseTargetUnreachable(
                    field.name.to_string(),
                    target_type.to_string(),
                )
                .into());
            }
            self.metadata.recurse_depths.insert(child_location.clone(), recurse.depth);
            self.blocks.push(IrBlock::Recurse {
                edge_name: field.name.clone(),
                direction,
                depth: recurse.depth,
            });
        } else {
            let optional = if is_optional { Some(OptionalKind::Simple) } else { None };
            self.blocks.push(IrBlock::Traverse {
                edge_name: field.name.clone(),
                direction,
                optional,
                within_optional_scope: within_optional,
            });
        }

        if field.coerced_to.is_some() && resolved_target != target_type.as_ref() {
            self.blocks.push(IrBlock::CoerceType(Arc::from(resolved_target)));
        }

        self.blocks.push(IrBlock::MarkLocation(child_location.clone()));
        self.metadata.location_types.insert(child_location.clone(), Arc::from(resolved_target));

        if directives.output_source.is_some() {
            self.blocks.push(IrBlock::OutputSource);
        }

        let child_within_fold = if is_fold { Some(child_location.clone()) } else { within_fold };
        let has_output_before =
            self.metadata.outputs.iter().filter(|o| o.inside_fold.as_ref() == Some(&child_location)).count();

        self.lower_scope(
            resolved_target,
            child_location.clone(),
            &field.connections,
            within_optional || is_optional,
            child_within_fold,
        )?;

        if is_fold {
            let has_output_after = self
                .metadata
                .outputs
                .iter()
                .filter(|o| o.inside_fold.as_ref() == Some(&child_location))
                .count();
            if has_output_before == has_output_after {
                return Err(DirectiveError::FoldWithoutOutput(field.name.to_string()).into());
            }
            self.blocks.push(IrBlock::Unfold);
        } else if is_optional {
            self.blocks.push(IrBlock::Backtrack(parent_location.clone()));
            self.blocks.push(IrBlock::EndOptional);
        }

        Ok(())
    }
}
