//! The raw (schema-unaware) parsed query: a tree of field selections, each
//! carrying the directives parsed off of it. Building this tree is purely
//! syntactic; resolving it against a schema happens in `frontend`.
#![allow(dead_code)]

use std::{convert::TryFrom, sync::Arc};

use async_graphql_parser::{
    types::{DocumentOperations, ExecutableDocument, Field, OperationType, Selection},
    parse_query, Pos, Positioned,
};
use serde::{Deserialize, Serialize};

use super::{
    directives::{DirectiveGroup, FilterDirective},
    error::ParseError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldNode {
    pub position: Pos,
    pub name: Arc<str>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coerced_to: Option<Arc<str>>,

    /// `@filter`s declared directly on the inline fragment this field was
    /// coerced by, if this is the first field of that fragment's selection
    /// set. Carried on only the first child so the fragment's filters are
    /// lowered exactly once per fragment rather than once per sibling field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coercion_filters: Vec<FilterDirective>,

    pub directives: DirectiveGroup,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<FieldNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub root_field: FieldNode,
}

pub fn parse_document(query: &str) -> Result<Query, ParseError> {
    let document = parse_query(query)?;

    let operation = match &document.operations {
        DocumentOperations::Single(op) => op,
        DocumentOperations::Multiple(ops) => {
            if ops.len() != 1 {
                let pos = ops.values().next().map(|op| op.pos).unwrap_or_default();
                return Err(ParseError::MultipleOperationsInDocument(pos));
            }
            ops.values().next().unwrap()
        }
    };

    if operation.node.ty != OperationType::Query {
        return Err(ParseError::DocumentNotAQuery(operation.pos));
    }
    if !operation.node.variable_definitions.is_empty() {
        return Err(ParseError::VariableDefinitionInRootQuery(operation.pos));
    }
    if !document.fragments.is_empty() {
        return Err(ParseError::DocumentContainsNonInlineFragments(operation.pos));
    }

    let root_items = &operation.node.selection_set.node.items;
    if root_items.len() != 1 {
        return Err(ParseError::MultipleQueryRoots(operation.pos));
    }

    let root_field = match &root_items[0].node {
        Selection::Field(f) => parse_field(f)?,
        _ => return Err(ParseError::MultipleQueryRoots(root_items[0].pos)),
    };

    Ok(Query { root_field })
}

fn parse_field(field: &Positioned<Field>) -> Result<FieldNode, ParseError> {
    let name: Arc<str> = Arc::from(field.node.name.node.as_str());
    let directives = DirectiveGroup::parse(&field.node.directives)?;

    let mut connections = Vec::with_capacity(field.node.selection_set.node.items.len());
    for item in &field.node.selection_set.node.items {
        match &item.node {
            Selection::Field(child) => connections.push(parse_field(child)?),
            Selection::InlineFragment(fragment) => {
                let coerced_to = fragment
                    .node
                    .type_condition
                    .as_ref()
                    .map(|t| Arc::from(t.node.on.node.as_str()));
                let fragment_filters = parse_inline_fragment_directives(&fragment.node.directives)?;
                for (index, inner) in fragment.node.selection_set.node.items.iter().enumerate() {
                    match &inner.node {
                        Selection::Field(child) => {
                            let mut parsed = parse_field(child)?;
                            parsed.coerced_to = coerced_to.clone();
                            if index == 0 {
                                parsed.coercion_filters = fragment_filters.clone();
                            }
                            connections.push(parsed);
                        }
                        _ => {
                            return Err(ParseError::DocumentContainsNonInlineFragments(item.pos))
                        }
                    }
                }
            }
            Selection::FragmentSpread(_) => {
                return Err(ParseError::DocumentContainsNonInlineFragments(item.pos))
            }
        }
    }

    Ok(FieldNode {
        position: field.pos,
        name,
        coerced_to: None,
        coercion_filters: Vec::new(),
        directives,
        connections,
    })
}

/// Parses the directives on an inline fragment (a type coercion). Only
/// `@filter` is legal there per the directive applicability table; anything
/// else found directly on `... on Type` is rejected rather than silently
/// dropped.
fn parse_inline_fragment_directives(
    directives: &[Positioned<async_graphql_parser::types::Directive>],
) -> Result<Vec<FilterDirective>, ParseError> {
    let group = DirectiveGroup::parse(directives)?;
    if group.output.is_some()
        || group.tag.is_some()
        || group.optional.is_some()
        || group.fold.is_some()
        || group.recurse.is_some()
        || group.output_source.is_some()
    {
        let (name, pos) = directives
            .iter()
            .find(|d| d.node.name.node.as_str() != "filter")
            .map(|d| (d.node.name.node.to_string(), d.pos))
            .unwrap_or_default();
        return Err(ParseError::DirectiveNotAllowedOnInlineFragment(name, pos));
    }
    Ok(group.filter)
}

impl TryFrom<&str> for Query {
    type Error = ParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        parse_document(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_output_query() {
        let query = parse_document(r#"{ Animal { name @output(out_name: "n") } }"#).unwrap();
        assert_eq!(query.root_field.name.as_ref(), "Animal");
        assert_eq!(query.root_field.connections.len(), 1);
        assert_eq!(query.root_field.connections[0].name.as_ref(), "name");
        assert!(query.root_field.connections[0].directives.output.is_some());
    }

    #[test]
    fn rejects_multiple_roots() {
        let err =
            parse_document(r#"{ Animal { name } Plant { name } }"#).unwrap_err();
        assert!(matches!(err, ParseError::MultipleQueryRoots(_)));
    }

    #[test]
    fn records_inline_fragment_coercion() {
        let query = parse_document(
            r#"{ Entity { ... on Animal { name @output(out_name: "n") } } }"#,
        )
        .unwrap();
        assert_eq!(
            query.root_field.connections[0].coerced_to.as_deref(),
            Some("Animal")
        );
    }

    #[test]
    fn parses_filter_directly_on_inline_fragment() {
        let query = parse_document(
            r#"{ Entity {
                ... on Animal @filter(op_name: "=", value: ["$kind"]) {
                    name @output(out_name: "n")
                }
            } }"#,
        )
        .unwrap();
        let coerced = &query.root_field.connections[0];
        assert_eq!(coerced.coerced_to.as_deref(), Some("Animal"));
        assert_eq!(coerced.coercion_filters.len(), 1);
        assert_eq!(coerced.coercion_filters[0].op_name.as_ref(), "=");
    }

    #[test]
    fn inline_fragment_filter_attaches_only_to_first_sibling() {
        let query = parse_document(
            r#"{ Entity {
                ... on Animal @filter(op_name: "=", value: ["$kind"]) {
                    name @output(out_name: "n")
                    net_worth @output(out_name: "w")
                }
            } }"#,
        )
        .unwrap();
        assert_eq!(query.root_field.connections[0].coercion_filters.len(), 1);
        assert!(query.root_field.connections[1].coercion_filters.is_empty());
    }

    #[test]
    fn rejects_non_filter_directive_on_inline_fragment() {
        let err = parse_document(
            r#"{ Entity {
                ... on Animal @output(out_name: "n") {
                    name
                }
            } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::DirectiveNotAllowedOnInlineFragment(_, _)));
    }
}
