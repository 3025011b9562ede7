use core::fmt::{self, Formatter};
use std::fmt::Display;

use async_graphql_parser::types::{
    BaseType::{self, List, Named},
    Type as GQLType,
};
use async_graphql_value::Name;
use serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer};

/// A backing-storage-independent, immutable representation of a GraphQL type,
/// e.g. `String`, `String!`, or `[Animal!]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    ty: GQLType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InnerType<'a> {
    NameOfType(&'a str),
    ListInnerType(Type),
}

impl Type {
    /// Parses a type from its GraphQL textual representation, e.g. `"[String!]!"`.
    pub fn new(ty: &str) -> Option<Type> {
        Some(Type { ty: GQLType::new(ty)? })
    }

    pub fn new_named_type(base_type_name: &str, nullable: bool) -> Type {
        Type { ty: GQLType { base: BaseType::Named(Name::new(base_type_name)), nullable } }
    }

    pub fn new_list_type(inner_type: Type, nullable: bool) -> Type {
        Type { ty: GQLType { base: BaseType::List(Box::new(inner_type.ty)), nullable } }
    }

    pub fn with_nullability(&self, nullable: bool) -> Type {
        Type { ty: GQLType { base: self.ty.base.clone(), nullable } }
    }

    pub fn is_nullable(&self) -> bool {
        self.ty.nullable
    }

    pub fn is_list(&self) -> bool {
        matches!(self.ty.base, BaseType::List(_))
    }

    pub fn as_list(&self) -> Option<Type> {
        match &self.ty.base {
            List(inner) => Some(Type { ty: (**inner).clone() }),
            Named(_) => None,
        }
    }

    pub fn value(&self) -> InnerType<'_> {
        match &self.ty.base {
            Named(n) => InnerType::NameOfType(n),
            List(ty) => InnerType::ListInnerType(Type { ty: (**ty).clone() }),
        }
    }

    /// The innermost named type, stripping any number of list wrappers.
    pub fn base_named_type(&self) -> &str {
        let mut value = &self.ty.base;
        while let BaseType::List(l) = value {
            value = &l.base;
        }

        match value {
            Named(n) => n,
            List(_) => unreachable!("while loop should not have stopped on a list"),
        }
    }

    /// Whether this type is legal for use with an ordering operator (`<`, `<=`, `>`, `>=`):
    /// non-nullable at the top level, recursively.
    pub fn is_orderable(&self) -> bool {
        !self.ty.nullable
            && match &self.ty.base {
                Named(_) => true,
                List(inner) => Type { ty: (**inner).clone() }.is_orderable(),
            }
    }

    /// Equal ignoring the top-level nullability wrapper (but not nested nullability).
    pub fn equal_ignoring_nullability(&self, other: &Type) -> bool {
        self.ty.base == other.ty.base
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.ty)
    }
}

impl Serialize for Type {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.ty.to_string())
    }
}

impl<'de> Deserialize<'de> for Type {
    fn deserialize<D>(deserializer: D) -> Result<Type, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TypeDeserializer;

        impl<'de> Visitor<'de> for TypeDeserializer {
            type Value = Type;

            fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
                formatter.write_str("GraphQL type")
            }

            fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Type::new(s).ok_or_else(|| serde::de::Error::custom("not a valid GraphQL type"))
            }
        }

        deserializer.deserialize_str(TypeDeserializer)
    }
}

pub(crate) fn from_type(ty: &GQLType) -> Type {
    Type { ty: ty.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display() {
        let ty = Type::new("[String!]!").unwrap();
        assert_eq!(ty.to_string(), "[String!]!");
    }

    #[test]
    fn base_named_type_strips_lists() {
        let ty = Type::new("[[Int!]]!").unwrap();
        assert_eq!(ty.base_named_type(), "Int");
    }

    #[test]
    fn orderable_requires_non_null_at_every_level() {
        assert!(Type::new("Int!").unwrap().is_orderable());
        assert!(!Type::new("Int").unwrap().is_orderable());
        assert!(Type::new("[Int!]!").unwrap().is_orderable());
        assert!(!Type::new("[Int!]").unwrap().is_orderable());
    }
}
