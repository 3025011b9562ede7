use serde::{Deserialize, Serialize};

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum InvalidSchemaError {
    #[error("failed to parse the schema document: {0}")]
    ParseError(String),

    #[error("no `schema { query: ... }` definition was found")]
    MissingSchemaDefinition,

    #[error("the declared query type {0:?} was never defined")]
    UndefinedQueryType(String),

    #[error("duplicate type or interface definition: {0}")]
    DuplicateTypeOrInterfaceDefinition(String),

    #[error("duplicate field definition {0}.{1}")]
    DuplicateFieldDefinition(String, String),

    #[error("type or field name {0} uses the reserved \"__\" prefix")]
    ReservedTypeName(String),

    #[error("field name {0}.{1} uses the reserved \"__\" prefix")]
    ReservedFieldName(String, String),

    #[error("property field {0}.{1} (type {2}) may not take arguments: {3:?}")]
    PropertyFieldWithParameters(String, String, String, Vec<String>),

    #[error("the root query type {0} may not have scalar field {1} (type {2})")]
    PropertyFieldOnRootQueryType(String, String, String),

    #[error("edge {0}.{1} (type {2}) may not point back to the root query type")]
    EdgePointsToRootQueryType(String, String, String),

    #[error("edge {0}.{1} (type {2}) has an invalid nested-list type")]
    InvalidEdgeType(String, String, String),

    #[error("edge {0}.{1} names field {2} with direction prefix \"{3}_\" that doesn't match its declared direction")]
    EdgeDirectionPrefixMismatch(String, String, String, String),

    #[error("default value for {0}.{1}({2}: {3}) is invalid: {4}")]
    InvalidDefaultValueForFieldParameter(String, String, String, String, String),

    #[error("type {0} implements {1}, which is not an interface")]
    ImplementingNonInterface(String, String),

    #[error("type {0} implements {1}, which is not defined in the schema")]
    ImplementingNonExistentType(String, String),

    #[error("type {0} implements {1} but not {2}, a transitive interface of {1}")]
    MissingTransitiveInterfaceImplementation(String, String, String),

    #[error("type {0} does not implement required field {2} ({3}) from interface {1}")]
    MissingRequiredField(String, String, String, String),

    #[error("field {0} on type {1} narrows the type of the same field on interface {2}: {3} vs {4}")]
    InvalidTypeWideningOfInheritedField(String, String, String, String, String),

    #[error("field {0}.{1} is missing parameters {3:?} required by interface {2}")]
    InheritedFieldMissingParameters(String, String, String, Vec<String>),

    #[error("field {0}.{1} has unexpected parameters {3:?} not present on interface {2}")]
    InheritedFieldUnexpectedParameters(String, String, String, Vec<String>),

    #[error("field parameter {0}.{1}({3}) narrows the type required by interface {2}: {3} vs {4}")]
    InvalidTypeNarrowingOfInheritedFieldParameter(String, String, String, String, String, String),

    #[error("fields {0}.{1} ({2}) have ambiguous origins among interfaces {3:?}")]
    AmbiguousFieldOrigin(String, String, String, Vec<String>),

    #[error("circular `implements` relationship among types: {0:?}")]
    CircularImplementsRelationships(Vec<String>),

    #[error("union type {0} names non-existent member type {1}")]
    UnionReferencesUndefinedMember(String, String),

    #[error("union type {0} names member {1}, which is not an object type")]
    UnionReferencesNonObjectMember(String, String),

    #[error(
        "type-equivalence hint for {0} points at union {1}, but that union's members {2:?} \
        are not exactly the transitive concrete subclasses of {0}: expected {3:?}"
    )]
    InconsistentEquivalentUnionHint(String, String, Vec<String>, Vec<String>),

    #[error("multiple type-equivalence hints name union {0} as equivalent to object type {1} and object type {2}")]
    AmbiguousEquivalentUnionHint(String, String, String),

    #[error("custom scalar {0} is not one of the scalars this compiler understands (Date, DateTime, Decimal)")]
    UnsupportedCustomScalar(String),

    #[error("type {0} is a {1}, which is outside this compiler's scope (only object, interface, union, and scalar types are supported)")]
    UnsupportedTypeKind(String, &'static str),

    #[error("schema failed multiple validation checks: {0:?}")]
    Multiple(Vec<InvalidSchemaError>),
}

impl From<Vec<InvalidSchemaError>> for InvalidSchemaError {
    fn from(mut errors: Vec<InvalidSchemaError>) -> Self {
        if errors.len() == 1 {
            errors.pop().expect("len was checked to be 1")
        } else {
            InvalidSchemaError::Multiple(errors)
        }
    }
}
