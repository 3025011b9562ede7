//! Errors produced while parsing a query's directives and shape, before any
//! schema-aware semantic analysis has happened.
use async_graphql_parser::Pos;
use serde::{ser::Error as SerError, Deserialize, Serialize, Serializer};

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, thiserror::Error)]
pub enum ParseError {
    #[error("directive {0} is missing required argument {1}")]
    MissingRequiredDirectiveArgument(String, String, Pos),

    #[error("directive {0} received unrecognized argument {1}")]
    UnrecognizedDirectiveArgument(String, String, Pos),

    #[error("directive {0} received duplicated argument {1}")]
    DuplicatedDirectiveArgument(String, String, Pos),

    #[error("directive {0} received a value of the wrong type for argument {1}")]
    InappropriateTypeForDirectiveArgument(String, String, Pos),

    #[error(
        "value argument of @filter(op_name: \"{0}\") is a string instead of a list; \
        did you mean value: [\"{1}\"]?"
    )]
    FilterExpectsListNotString(String, String, Pos),

    #[error("document contains non-inline fragments, which are not supported")]
    DocumentContainsNonInlineFragments(Pos),

    #[error("document contains multiple operations, which is not supported")]
    MultipleOperationsInDocument(Pos),

    #[error("document is not a query operation")]
    DocumentNotAQuery(Pos),

    #[error(
        "document contains multiple root selections; exactly one root selection is required"
    )]
    MultipleQueryRoots(Pos),

    #[error("query variable definitions are not supported; variables are implicit")]
    VariableDefinitionInRootQuery(Pos),

    #[error("unrecognized filter operator: {0}")]
    UnsupportedFilterOperator(String, Pos),

    #[error("filter operator {0} expects {1} argument(s), found {2}")]
    FilterArgumentCountMismatch(String, usize, usize, Pos),

    #[error("filter argument {0:?} must start with '$' or '%' and be followed by an identifier")]
    InvalidFilterOperandName(String, Pos),

    #[error("output name {0:?} contains invalid characters: {1:?}")]
    InvalidOutputName(String, Vec<char>, Pos),

    #[error("tag name {0:?} contains invalid characters: {1:?}")]
    InvalidTagName(String, Vec<char>, Pos),

    #[error("directive {0} is applied more than once on the same field, which is not supported")]
    DuplicatedDirective(String, Pos),

    #[error("directive @{0} is not allowed on an inline fragment; only @filter is")]
    DirectiveNotAllowedOnInlineFragment(String, Pos),

    #[serde(skip_deserializing, serialize_with = "fail_serialize_invalid_graphql_error")]
    #[error("{0}")]
    InvalidGraphQL(async_graphql_parser::Error),

    #[error("{0}")]
    OtherError(String, Pos),
}

fn fail_serialize_invalid_graphql_error<S: Serializer>(
    _: &async_graphql_parser::Error,
    _: S,
) -> Result<S::Ok, S::Error> {
    Err(S::Error::custom("cannot serialize InvalidGraphQL error variant"))
}

impl From<async_graphql_parser::Error> for ParseError {
    fn from(e: async_graphql_parser::Error) -> Self {
        Self::InvalidGraphQL(e)
    }
}
