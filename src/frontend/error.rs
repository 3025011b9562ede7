//! The error kinds produced while validating and lowering a parsed query:
//! `TypeError`, `DirectiveError`, and `FilterArgumentError` fold into
//! [`FrontendError`] alongside parse failures.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graphql_query::error::ParseError;

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, thiserror::Error)]
pub enum FrontendError {
    #[error("query failed to parse: {0}")]
    ParseError(#[from] ParseError),

    #[error("{0}")]
    TypeError(#[from] TypeError),

    #[error("{0}")]
    DirectiveError(#[from] DirectiveError),

    #[error("{0}")]
    FilterArgumentError(#[from] FilterArgumentError),

    #[error("multiple fields are output under the same name: {0:?}")]
    MultipleOutputsWithSameName(DuplicatedNamesConflict),

    #[error("multiple fields have @tag directives with the same name: {0:?}")]
    MultipleTagsWithSameName(DuplicatedNamesConflict),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DuplicatedNamesConflict {
    pub duplicates: BTreeMap<String, Vec<(String, String)>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, thiserror::Error)]
pub enum TypeError {
    #[error("field {1} does not exist on type {0}")]
    NonExistentField(String, String),

    #[error("type {0} does not exist in the schema")]
    NonExistentType(String),

    #[error(
        "attempted to coerce type {0} into type {1}, but {1} is not one of {0}'s subtypes"
    )]
    InvalidTypeCoercion(String, String),

    #[error("property fields must precede vertex fields within a scope; {0} appears after a vertex field")]
    PropertyFieldAfterVertexField(String),

    #[error("exactly one root selection is required; found {0}")]
    NotExactlyOneRootSelection(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, thiserror::Error)]
pub enum DirectiveError {
    #[error("@output out_name {0:?} is not unique across the query")]
    DuplicateOutputName(String),

    #[error("@tag tag_name {0:?} is not unique across the query")]
    DuplicateTagName(String),

    #[error("filter on field {0} references undefined tag %{1}")]
    UndefinedTagInFilter(String, String),

    #[error("@tag on field {0} is referenced by filter on field {1} before the tag is bound")]
    TagReferencedBeforeBound(String, String),

    #[error("@optional may not nest inside @fold (field {0})")]
    OptionalInsideFold(String),

    #[error("@fold may not nest inside @fold (field {0})")]
    FoldInsideFold(String),

    #[error("@recurse may not nest inside @fold (field {0})")]
    RecurseInsideFold(String),

    #[error("@optional and @recurse may not both appear on field {0}")]
    OptionalAndRecurseOnSameField(String),

    #[error("@recurse(depth: {1}) on field {0} must have depth >= 1")]
    RecurseDepthMustBePositive(String, u32),

    #[error("@recurse target type {1} is not reachable from field {0}'s enclosing type")]
    RecurseTargetUnreachable(String, String),

    #[error("@output_source may appear at most once per query; found a second instance on {0}")]
    DuplicateOutputSource(String),

    #[error("@output_source on field {0} may not appear inside @fold or @optional")]
    OutputSourceInsideFoldOrOptional(String),

    #[error("@fold on field {0} requires at least one @output in its subtree")]
    FoldWithoutOutput(String),

    #[error("_x_count referenced on field {0} outside of a @fold scope or a fold-bound tag filter")]
    CountReferencedOutsideFold(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, thiserror::Error)]
pub enum FilterArgumentError {
    #[error("filter on field {1} references parameter ${0}, which was not supplied")]
    MissingParameter(String, String),

    #[error("unrecognized filter operator {0:?} on field {1}")]
    UnrecognizedOperator(String, String),

    #[error("filter operator {0:?} on field {1} expects {2} argument(s), found {3}")]
    ArgumentCountMismatch(String, String, usize, usize),

    #[error("filter operator {0:?} on field {1} is not valid for scalar type {2}")]
    OperatorScalarMismatch(String, String, String),

    #[error("filter operator {0:?} on field {1} requires an orderable (non-nullable) type, found {2}")]
    OperatorRequiresOrderableType(String, String, String),

    #[error("value for filter on field {0} is not parseable as {1}: {2}")]
    UnparseableValue(String, String, String),
}
