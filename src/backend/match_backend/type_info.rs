//! The type-information optimization pass: chooses, for each
//! pattern step, between the statically known type and a pending coercion,
//! picking whichever has the narrower concrete-subtype count -- fewer
//! concrete subtypes means a smaller candidate set for the database to scan
//! when that step is the pattern's starting class. Never changes which
//! paths match, only which class name anchors the step.
//!
//! This schema model carries no index metadata, so the heuristic stops at
//! concrete-subtype count; it does not additionally weigh whether either
//! candidate's indexes cover the filters at this location (see DESIGN.md).
use std::sync::Arc;

use crate::schema::Schema;

/// Picks the class to expose in a step's `class:` clause.
///
/// `known_type` is the type already established for this location by the
/// traversal that reached it; `pending_coercion`, if present, is a
/// `CoerceType` the IR applies at this same location. Ties are broken by
/// schema declaration order so the choice is deterministic across runs.
pub fn choose_class(schema: &Schema, known_type: &str, pending_coercion: Option<&str>) -> Arc<str> {
    let Some(candidate) = pending_coercion else { return Arc::from(known_type) };
    if candidate == known_type {
        return Arc::from(known_type);
    }

    let known_count = schema.concrete_subtypes(known_type).len();
    let candidate_count = schema.concrete_subtypes(candidate).len();

    match known_count.cmp(&candidate_count) {
        std::cmp::Ordering::Less => Arc::from(known_type),
        std::cmp::Ordering::Greater => Arc::from(candidate),
        std::cmp::Ordering::Equal => {
            if schema.declaration_order(known_type) <= schema.declaration_order(candidate) {
                Arc::from(known_type)
            } else {
                Arc::from(candidate)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
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

interface Entity {
  name: String
}

type Animal implements Entity {
  name: String
  out_Animal_ParentOf: Animal
}

type Plant implements Entity {
  name: String
}
"#;

    fn schema() -> Schema {
        Schema::parse(SCHEMA).expect("valid schema")
    }

    #[test]
    fn narrower_coercion_wins() {
        let schema = schema();
        let chosen = choose_class(&schema, "Entity", Some("Animal"));
        assert_eq!(chosen.as_ref(), "Animal");
    }

    #[test]
    fn no_coercion_keeps_known_type() {
        let schema = schema();
        let chosen = choose_class(&schema, "Animal", None);
        assert_eq!(chosen.as_ref(), "Animal");
    }

    #[test]
    fn identical_coercion_is_a_no_op() {
        let schema = schema();
        let chosen = choose_class(&schema, "Animal", Some("Animal"));
        assert_eq!(chosen.as_ref(), "Animal");
    }
}
