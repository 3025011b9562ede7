//! Parsing for the seven directives recognized on fields and inline type
//! coercions: `@output`, `@filter`, `@tag`, `@optional`, `@fold`, `@recurse`,
//! `@output_source`.
use std::{collections::HashSet, convert::TryFrom, sync::Arc};

use async_graphql_parser::{types::Directive, Positioned};
use async_graphql_value::Value;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::error::ParseError;

/// An operand of a `@filter` directive's `value` list: either a reference to
/// a query parameter (`$name`) or to a value bound elsewhere by `@tag` (`%name`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorArgument {
    VariableRef(Arc<str>),
    TagRef(Arc<str>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDirective {
    pub op_name: Arc<str>,
    pub arguments: SmallVec<[OperatorArgument; 2]>,
}

impl TryFrom<&Positioned<Directive>> for FilterDirective {
    type Error = ParseError;

    fn try_from(value: &Positioned<Directive>) -> Result<Self, Self::Error> {
        reject_unrecognized_arguments("@filter", value, &["op_name", "value"])?;

        let op_argument = value.node.get_argument("op_name").ok_or_else(|| {
            ParseError::MissingRequiredDirectiveArgument(
                "@filter".to_owned(),
                "op_name".to_owned(),
                value.pos,
            )
        })?;
        let op_name: Arc<str> = match &op_argument.node {
            Value::String(s) => Arc::from(s.as_str()),
            _ => {
                return Err(ParseError::InappropriateTypeForDirectiveArgument(
                    "@filter".to_owned(),
                    "op_name".to_owned(),
                    op_argument.pos,
                ))
            }
        };

        let value_argument = value.node.get_argument("value");
        let arguments: SmallVec<[OperatorArgument; 2]> = match value_argument {
            None => SmallVec::new(),
            Some(value_argument) => {
                let list = match &value_argument.node {
                    Value::List(list) => list,
                    Value::String(s) => {
                        return Err(ParseError::FilterExpectsListNotString(
                            op_name.to_string(),
                            s.to_owned(),
                            value_argument.pos,
                        ))
                    }
                    _ => {
                        return Err(ParseError::InappropriateTypeForDirectiveArgument(
                            "@filter".to_owned(),
                            "value".to_owned(),
                            value_argument.pos,
                        ))
                    }
                };

                list.iter()
                    .map(|v| parse_operator_argument(v, value_argument.pos))
                    .collect::<Result<_, _>>()?
            }
        };

        Ok(FilterDirective { op_name, arguments })
    }
}

fn parse_operator_argument(
    value: &Value,
    pos: async_graphql_parser::Pos,
) -> Result<OperatorArgument, ParseError> {
    let s = match value {
        Value::String(s) => s,
        _ => {
            return Err(ParseError::InappropriateTypeForDirectiveArgument(
                "@filter".to_owned(),
                "value".to_owned(),
                pos,
            ))
        }
    };

    let (prefix, name) = if s.starts_with('$') || s.starts_with('%') {
        s.split_at(1)
    } else {
        return Err(ParseError::InvalidFilterOperandName(s.to_owned(), pos));
    };

    let valid_name = !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_name {
        return Err(ParseError::InvalidFilterOperandName(s.to_owned(), pos));
    }

    match prefix {
        "$" => Ok(OperatorArgument::VariableRef(Arc::from(name))),
        "%" => Ok(OperatorArgument::TagRef(Arc::from(name))),
        _ => unreachable!(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDirective {
    pub out_name: Arc<str>,
}

impl TryFrom<&Positioned<Directive>> for OutputDirective {
    type Error = ParseError;

    fn try_from(value: &Positioned<Directive>) -> Result<Self, Self::Error> {
        reject_unrecognized_arguments("@output", value, &["out_name"])?;

        let arg = value.node.get_argument("out_name").ok_or_else(|| {
            ParseError::MissingRequiredDirectiveArgument(
                "@output".to_owned(),
                "out_name".to_owned(),
                value.pos,
            )
        })?;
        let out_name: Arc<str> = match &arg.node {
            Value::String(s) => Arc::from(s.as_str()),
            _ => {
                return Err(ParseError::InappropriateTypeForDirectiveArgument(
                    "@output".to_owned(),
                    "out_name".to_owned(),
                    arg.pos,
                ))
            }
        };

        ensure_name_is_valid(out_name.as_ref())
            .map_err(|invalid_chars| ParseError::InvalidOutputName(out_name.to_string(), invalid_chars, arg.pos))?;

        Ok(Self { out_name })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDirective {
    pub tag_name: Arc<str>,
}

impl TryFrom<&Positioned<Directive>> for TagDirective {
    type Error = ParseError;

    fn try_from(value: &Positioned<Directive>) -> Result<Self, Self::Error> {
        reject_unrecognized_arguments("@tag", value, &["tag_name"])?;

        let arg = value.node.get_argument("tag_name").ok_or_else(|| {
            ParseError::MissingRequiredDirectiveArgument(
                "@tag".to_owned(),
                "tag_name".to_owned(),
                value.pos,
            )
        })?;
        let tag_name: Arc<str> = match &arg.node {
            Value::String(s) => Arc::from(s.as_str()),
            _ => {
                return Err(ParseError::InappropriateTypeForDirectiveArgument(
                    "@tag".to_owned(),
                    "tag_name".to_owned(),
                    arg.pos,
                ))
            }
        };

        ensure_name_is_valid(tag_name.as_ref())
            .map_err(|invalid_chars| ParseError::InvalidTagName(tag_name.to_string(), invalid_chars, arg.pos))?;

        Ok(Self { tag_name })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalDirective;

impl TryFrom<&Positioned<Directive>> for OptionalDirective {
    type Error = ParseError;

    fn try_from(value: &Positioned<Directive>) -> Result<Self, Self::Error> {
        reject_unrecognized_arguments("@optional", value, &[])?;
        Ok(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldDirective;

impl TryFrom<&Positioned<Directive>> for FoldDirective {
    type Error = ParseError;

    fn try_from(value: &Positioned<Directive>) -> Result<Self, Self::Error> {
        reject_unrecognized_arguments("@fold", value, &[])?;
        Ok(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSourceDirective;

impl TryFrom<&Positioned<Directive>> for OutputSourceDirective {
    type Error = ParseError;

    fn try_from(value: &Positioned<Directive>) -> Result<Self, Self::Error> {
        reject_unrecognized_arguments("@output_source", value, &[])?;
        Ok(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurseDirective {
    pub depth: u32,
}

impl TryFrom<&Positioned<Directive>> for RecurseDirective {
    type Error = ParseError;

    fn try_from(value: &Positioned<Directive>) -> Result<Self, Self::Error> {
        reject_unrecognized_arguments("@recurse", value, &["depth"])?;

        let arg = value.node.get_argument("depth").ok_or_else(|| {
            ParseError::MissingRequiredDirectiveArgument(
                "@recurse".to_owned(),
                "depth".to_owned(),
                value.pos,
            )
        })?;
        let depth = match &arg.node {
            Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()).ok_or_else(|| {
                ParseError::InappropriateTypeForDirectiveArgument(
                    "@recurse".to_owned(),
                    "depth".to_owned(),
                    arg.pos,
                )
            })?,
            _ => {
                return Err(ParseError::InappropriateTypeForDirectiveArgument(
                    "@recurse".to_owned(),
                    "depth".to_owned(),
                    arg.pos,
                ))
            }
        };

        Ok(Self { depth })
    }
}

fn reject_unrecognized_arguments(
    directive_name: &str,
    value: &Positioned<Directive>,
    recognized: &[&str],
) -> Result<(), ParseError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for (arg_name, _) in &value.node.arguments {
        let name = arg_name.node.as_str();
        if !recognized.contains(&name) {
            return Err(ParseError::UnrecognizedDirectiveArgument(
                directive_name.to_owned(),
                name.to_owned(),
                arg_name.pos,
            ));
        }
        if !seen.insert(name) {
            return Err(ParseError::DuplicatedDirectiveArgument(
                directive_name.to_owned(),
                name.to_owned(),
                arg_name.pos,
            ));
        }
    }
    Ok(())
}

fn ensure_name_is_valid(name: &str) -> Result<(), Vec<char>> {
    let mut invalid_char_iter =
        name.chars().filter(|c| !c.is_ascii_alphanumeric() && *c != '_').peekable();
    if invalid_char_iter.peek().is_some() {
        let mut seen_chars: HashSet<char> = Default::default();
        let mut invalid_chars: Vec<_> = Default::default();
        for c in invalid_char_iter {
            if seen_chars.insert(c) {
                invalid_chars.push(c);
            }
        }
        return Err(invalid_chars);
    }

    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return Err(vec![name.chars().next().unwrap()]);
    }

    Ok(())
}

/// The directives attached to a single field or inline fragment selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveGroup {
    pub filter: Vec<FilterDirective>,
    pub output: Option<OutputDirective>,
    pub tag: Option<TagDirective>,
    pub optional: Option<OptionalDirective>,
    pub fold: Option<FoldDirective>,
    pub recurse: Option<RecurseDirective>,
    pub output_source: Option<OutputSourceDirective>,
}

impl DirectiveGroup {
    pub fn parse(directives: &[Positioned<Directive>]) -> Result<Self, ParseError> {
        let mut group = DirectiveGroup::default();
        let mut seen: HashSet<&str> = HashSet::new();

        for directive in directives {
            let name = directive.node.name.node.as_str();
            let singleton_already_seen = !matches!(name, "filter") && !seen.insert(name);
            if singleton_already_seen {
                return Err(ParseError::DuplicatedDirective(name.to_owned(), directive.pos));
            }

            match name {
                "filter" => group.filter.push(FilterDirective::try_from(directive)?),
                "output" => group.output = Some(OutputDirective::try_from(directive)?),
                "tag" => group.tag = Some(TagDirective::try_from(directive)?),
                "optional" => group.optional = Some(OptionalDirective::try_from(directive)?),
                "fold" => group.fold = Some(FoldDirective::try_from(directive)?),
                "recurse" => group.recurse = Some(RecurseDirective::try_from(directive)?),
                "output_source" => {
                    group.output_source = Some(OutputSourceDirective::try_from(directive)?)
                }
                other => {
                    return Err(ParseError::OtherError(
                        format!("unrecognized directive @{other}"),
                        directive.pos,
                    ))
                }
            }
        }

        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use async_graphql_parser::parse_query;

    use super::*;

    fn first_field_directives(query: &str) -> Vec<Positioned<Directive>> {
        let doc = parse_query(query).unwrap();
        let async_graphql_parser::types::ExecutableDocument { operations, .. } = doc;
        let (_, op) = operations.iter().next().unwrap();
        let selection = op.node.selection_set.node.items.first().unwrap();
        match &selection.node {
            async_graphql_parser::types::Selection::Field(f) => f.node.directives.clone(),
            _ => panic!("expected a field selection"),
        }
    }

    #[test]
    fn parses_filter_directive_with_variable_and_tag_operands() {
        let directives = first_field_directives(
            r#"{ root { value @filter(op_name: "between", value: ["$lo", "%hi"]) } }"#,
        );
        let parsed = FilterDirective::try_from(&directives[0]).unwrap();
        assert_eq!(parsed.op_name.as_ref(), "between");
        assert_eq!(
            parsed.arguments.to_vec(),
            vec![
                OperatorArgument::VariableRef(Arc::from("lo")),
                OperatorArgument::TagRef(Arc::from("hi")),
            ]
        );
    }

    #[test]
    fn rejects_bad_output_name() {
        let directives =
            first_field_directives(r#"{ root { value @output(out_name: "9bad") } }"#);
        assert!(OutputDirective::try_from(&directives[0]).is_err());
    }

    #[test]
    fn directive_group_rejects_duplicate_non_repeatable_directive() {
        let directives = first_field_directives(
            r#"{ root { value @tag(tag_name: "a") @tag(tag_name: "b") } }"#,
        );
        assert!(DirectiveGroup::parse(&directives).is_err());
    }
}
