//! The linear, block-structured intermediate representation: the
//! `IrBlock` sequence the frontend lowers a typed query into, the
//! `Location` values that let blocks refer back to earlier scopes, and
//! the `Expression` trees that appear inside filters and outputs.
#![allow(dead_code)]

pub mod builder;
pub mod ty;
pub mod value;

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::schema::Direction;

pub use value::FieldValue;

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}

/// A value-typed handle identifying a scope: the path of vertex-field steps
/// taken from the query root, plus a visit counter disambiguating a path
/// entered more than once (e.g. through a `@fold` or `@recurse`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Location {
    pub path: Vec<(Arc<str>, Direction)>,
    pub visit_counter: u32,
}

impl Location {
    pub fn root() -> Self {
        Location { path: Vec::new(), visit_counter: 0 }
    }

    pub fn child(&self, edge_name: Arc<str>, direction: Direction, visit_counter: u32) -> Self {
        let mut path = self.path.clone();
        path.push((edge_name, direction));
        Location { path, visit_counter }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for (edge, direction) in &self.path {
            write!(f, "/{direction}_{edge}")?;
        }
        if self.visit_counter > 0 {
            write!(f, "#{}", self.visit_counter)?;
        }
        Ok(())
    }
}

/// A binary comparison or collection operator usable inside a `Filter` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOp {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Between,
    InCollection,
    NotInCollection,
    Contains,
    NotContains,
    Intersects,
    HasSubstring,
    StartsWith,
    EndsWith,
    HasEdgeDegree,
    IsNull,
    IsNotNull,
    NameOrAlias,
}

impl FilterOp {
    pub fn from_name(name: &str) -> Option<FilterOp> {
        Some(match name {
            "=" => FilterOp::Equals,
            "!=" => FilterOp::NotEquals,
            "<" => FilterOp::LessThan,
            "<=" => FilterOp::LessThanOrEqual,
            ">" => FilterOp::GreaterThan,
            ">=" => FilterOp::GreaterThanOrEqual,
            "between" => FilterOp::Between,
            "in_collection" => FilterOp::InCollection,
            "not_in_collection" => FilterOp::NotInCollection,
            "contains" => FilterOp::Contains,
            "not_contains" => FilterOp::NotContains,
            "intersects" => FilterOp::Intersects,
            "has_substring" => FilterOp::HasSubstring,
            "starts_with" => FilterOp::StartsWith,
            "ends_with" => FilterOp::EndsWith,
            "has_edge_degree" => FilterOp::HasEdgeDegree,
            "is_null" => FilterOp::IsNull,
            "is_not_null" => FilterOp::IsNotNull,
            "name_or_alias" => FilterOp::NameOrAlias,
            _ => return None,
        })
    }

    /// Number of `Argument` operands this operator's template expects, not
    /// counting the field being filtered.
    pub fn arity(self) -> usize {
        match self {
            FilterOp::IsNull | FilterOp::IsNotNull => 0,
            FilterOp::Between => 2,
            _ => 1,
        }
    }
}

/// A value- or field-producing expression, as used inside `Filter` predicates
/// and `ConstructResult` output projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Literal(FieldValue),
    Variable(Arc<str>),
    Tag(Arc<str>),
    LocalField { field_name: Arc<str> },
    ContextField { location: Location, field_name: Arc<str> },
    FoldCount { fold_location: Location },
    List(Vec<Expression>),
    IsNull(Box<Expression>),
    Binary { op: FilterOp, left: Box<Expression>, right: Vec<Expression> },
    Ternary { condition: Box<Expression>, if_true: Box<Expression>, if_false: Box<Expression> },
    /// A conjunction of predicates, in evaluation order. Produced by the
    /// filter-merging rewrite pass when multiple `Filter` blocks on the same
    /// field collapse into one.
    And(Vec<Expression>),
}

/// One entry of the output table: a `@output`-annotated field, recorded by
/// the IR builder and consumed by `ConstructResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputInfo {
    pub out_name: Arc<str>,
    pub location: Location,
    pub field_name: Arc<str>,
    pub value_type: ty::Type,
    pub inside_fold: Option<Location>,
}

/// A tag binding: the name the tag is known by, the location at which the
/// tagged field's value is recorded, and the tagged field's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagInfo {
    pub tag_name: Arc<str>,
    pub location: Location,
    pub field_name: Arc<str>,
}

/// Whether a `Traverse`/`Fold`'s scope was entered through an optional edge,
/// and if so whether it is *simple* (no nested traversals, stays inline) or
/// *compound* (contains nested traversals, participates in 2^n expansion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionalKind {
    Simple,
    Compound,
}

/// One block of the linear IR. The set is closed: backends must handle
/// every variant, and adding one is an intentional breaking change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrBlock {
    QueryRoot(Arc<str>),
    Traverse {
        edge_name: Arc<str>,
        direction: Direction,
        optional: Option<OptionalKind>,
        within_optional_scope: bool,
    },
    Recurse {
        edge_name: Arc<str>,
        direction: Direction,
        depth: u32,
    },
    Filter(Expression),
    MarkLocation(Location),
    Backtrack(Location),
    Fold {
        start_location: Location,
        edge_name: Arc<str>,
        direction: Direction,
    },
    Unfold,
    CoerceType(Arc<str>),
    ConstructResult(Vec<(Arc<str>, Expression)>),
    GlobalOperationsStart,
    EndOptional,
    OutputSource,
}

/// Per-location bookkeeping the builder accumulates alongside the flat
/// `IrBlock` sequence: every location's static type, and the tags, outputs,
/// and folds rooted at it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub location_types: std::collections::BTreeMap<Location, Arc<str>>,
    pub tags: Vec<TagInfo>,
    pub outputs: Vec<OutputInfo>,
    pub fold_locations: std::collections::BTreeSet<Location>,
    pub recurse_depths: std::collections::BTreeMap<Location, u32>,
    pub output_source: Option<Location>,
}

/// The result of lowering: the flat block sequence plus its metadata table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrQuery {
    pub blocks: Vec<IrBlock>,
    pub metadata: QueryMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_display_builds_a_readable_path() {
        let root = Location::root();
        let child = root.child(Arc::from("out_Animal_ParentOf"), Direction::Out, 0);
        assert_eq!(child.to_string(), "$/out_out_Animal_ParentOf");

        let revisited = root.child(Arc::from("out_Animal_ParentOf"), Direction::Out, 1);
        assert_eq!(revisited.to_string(), "$/out_out_Animal_ParentOf#1");
        assert_ne!(child, revisited);
    }

    #[test]
    fn filter_op_arity_matches_each_operators_signature() {
        assert_eq!(FilterOp::from_name("between").unwrap().arity(), 2);
        assert_eq!(FilterOp::from_name("is_null").unwrap().arity(), 0);
        assert_eq!(FilterOp::from_name("=").unwrap().arity(), 1);
        assert!(FilterOp::from_name("nonexistent_op").is_none());
    }
}
