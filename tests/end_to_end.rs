//! Table-driven end-to-end compilation scenarios: each case
//! compiles a full query through [`graphql_compiler::compile`] and checks
//! the rendered text, rather than exercising a single pipeline stage in
//! isolation the way the per-module unit tests do.
use std::collections::BTreeMap;
use std::sync::Arc;

use graphql_compiler::{compile, Backend, FieldValue, Schema};

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

/// Scenario 1: a single scalar `@output` with no filters, traversals, or
/// other directives compiles to a one-class pattern and a bare projection.
#[test]
fn scenario_1_simple_output() {
    let compiled = compile(
        &schema(),
        r#"{ Animal { name @output(out_name: "n") } }"#,
        Backend::Match,
        &BTreeMap::new(),
    )
    .unwrap();
    assert!(compiled.query_text.contains("{class: Animal, as: Animal___1}"));
    assert!(compiled.query_text.contains("Animal___1.name AS `n`"));
    assert_eq!(compiled.outputs.len(), 1);
    assert_eq!(compiled.outputs[0].name.as_ref(), "n");
}

/// Scenario 2: a `@filter` referencing a `$parameter` compiles to a bound
/// placeholder rather than an inlined literal, and the bound value must be
/// supplied in `parameters` or compilation fails before reaching a backend.
#[test]
fn scenario_2_parameterized_filter() {
    let params = BTreeMap::from([(Arc::from("name"), FieldValue::String("Hedwig".to_string()))]);
    let compiled = compile(
        &schema(),
        r#"{ Animal { name @filter(op_name: "=", value: ["$name"]) @output(out_name: "n") } }"#,
        Backend::Match,
        &params,
    )
    .unwrap();
    assert!(compiled.query_text.contains("where: (Animal___1.name = :name)"));

    let missing = compile(
        &schema(),
        r#"{ Animal { name @filter(op_name: "=", value: ["$name"]) @output(out_name: "n") } }"#,
        Backend::Match,
        &BTreeMap::new(),
    )
    .unwrap_err();
    assert!(matches!(missing, graphql_compiler::CompileError::Frontend(_)));
}

/// Scenario 3: a `@tag` bound in an outer scope and referenced by a filter
/// in a nested scope resolves through the tagged field's own alias, not the
/// filter's local alias.
#[test]
fn scenario_3_tagged_cross_scope_filter() {
    let query = r#"{
        Animal {
            net_worth @tag(tag_name: "parent_wealth")
            out_Animal_ParentOf {
                net_worth @filter(op_name: ">", value: ["%parent_wealth"]) @output(out_name: "child_worth")
            }
        }
    }"#;
    let compiled = compile(&schema(), query, Backend::Match, &BTreeMap::new()).unwrap();
    assert!(compiled.query_text.contains("Animal___2.net_worth > Animal___1.net_worth"));
}

/// Scenario 4: a compound optional (one with a nested vertex traversal)
/// expands into a disjoint union of branches rather than staying inline.
#[test]
fn scenario_4_compound_optional_expands_into_a_disjoint_union() {
    let query = r#"{
        Animal {
            in_Animal_ParentOf @optional {
                in_Animal_ParentOf {
                    name @output(out_name: "grandparent_name")
                }
            }
        }
    }"#;
    let compiled = compile(&schema(), query, Backend::Match, &BTreeMap::new()).unwrap();
    assert!(compiled.query_text.contains("UNIONALL"));
    assert!(compiled.query_text.contains("IS null OR"));
    assert!(compiled.query_text.contains("null AS `grandparent_name`"));
}

/// Scenario 5: `@fold` with `_x_count` renders as its own aggregating
/// subquery, with the count read off that subquery's size.
#[test]
fn scenario_5_fold_with_count() {
    let query = r#"{
        Animal {
            out_Animal_ParentOf @fold {
                _x_count @output(out_name: "n_children")
            }
        }
    }"#;
    let compiled = compile(&schema(), query, Backend::Match, &BTreeMap::new()).unwrap();
    assert!(compiled.query_text.contains("fold subquery `fold_1`"));
    assert!(compiled.query_text.contains("fold_1.size() AS `n_children`"));
}

/// Scenario 6: `@recurse(depth: n)` compiles to the MATCH backend's native
/// bounded-recursion syntax rather than an explicit union of depths -- the
/// MATCH dialect has no need for the `rewrites::unfold_recursions` pass.
#[test]
fn scenario_6_bounded_recursion_uses_native_syntax() {
    let query = r#"{
        Animal {
            out_Animal_ParentOf @recurse(depth: 3) {
                name @output(out_name: "ancestor_name")
            }
        }
    }"#;
    let compiled = compile(&schema(), query, Backend::Match, &BTreeMap::new()).unwrap();
    assert!(compiled.query_text.contains("{while: ($depth < 3)}"));
    assert!(!compiled.query_text.contains("UNIONALL"));
}

/// The same recursive query, compiled for the Cypher backend, uses a native
/// variable-length relationship instead.
#[test]
fn scenario_6_bounded_recursion_on_cypher() {
    let query = r#"{
        Animal {
            out_Animal_ParentOf @recurse(depth: 3) {
                name @output(out_name: "ancestor_name")
            }
        }
    }"#;
    let compiled = compile(&schema(), query, Backend::Cypher, &BTreeMap::new()).unwrap();
    assert!(compiled.query_text.contains("-[:out_Animal_ParentOf*0..3]->"));
}

/// The relational backend has no way to express `@fold`; it must reject the
/// query rather than silently drop the fold.
#[test]
fn relational_backend_rejects_folds() {
    let query = r#"{
        Animal {
            out_Animal_ParentOf @fold {
                _x_count @output(out_name: "n_children")
            }
        }
    }"#;
    let err = compile(&schema(), query, Backend::Relational, &BTreeMap::new()).unwrap_err();
    assert!(matches!(err, graphql_compiler::CompileError::Backend(_)));
}
