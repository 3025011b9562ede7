//! The schema model: vertex types (object/interface), union types, custom
//! scalars, and the type-equivalence hints that stand in for the
//! object-to-object inheritance GraphQL itself doesn't support.
#![allow(dead_code)]
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    ops::Add,
    sync::Arc,
};

use async_graphql_parser::{
    parse_schema,
    types::{
        BaseType, DirectiveDefinition, FieldDefinition, ObjectType, ServiceDocument,
        Type as GQLType, TypeDefinition, TypeKind, TypeSystemDefinition, UnionType,
    },
    Positioned,
};
use async_graphql_value::Name;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::ir::ty::{from_type, Type};
use crate::util::BTreeMapTryInsertExt;

pub mod error;

use self::error::InvalidSchemaError;

/// The custom scalars this compiler understands, beyond the GraphQL builtins.
pub(crate) static BUILTIN_SCALARS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| hashset_of(["Int", "Float", "String", "Boolean", "ID"]));

pub(crate) static CUSTOM_SCALARS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| hashset_of(["Date", "DateTime", "Decimal"]));

fn hashset_of<const N: usize>(items: [&'static str; N]) -> HashSet<&'static str> {
    items.into_iter().collect()
}

const RESERVED_PREFIX: &str = "__";
const UNION_HINT_PREFIX: &str = "Union__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    In,
    Out,
}

/// Either a property (scalar) field or a vertex (edge-traversal) field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Property { value_type: Type },
    Vertex { target_type: Arc<str>, direction: Direction, edge_name: Arc<str> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VertexKind {
    Object,
    Interface,
}

#[derive(Debug, Clone)]
pub(crate) struct VertexTypeDescriptor {
    pub(crate) kind: VertexKind,
    pub(crate) implements: BTreeSet<Arc<str>>,
    pub(crate) field_order: Vec<Arc<str>>,
}

#[derive(Debug, Clone)]
pub struct Schema {
    pub(crate) query_type_name: Arc<str>,
    pub(crate) directives: HashMap<Arc<str>, DirectiveDefinition>,
    pub(crate) vertex_types: BTreeMap<Arc<str>, VertexTypeDescriptor>,
    pub(crate) unions: BTreeMap<Arc<str>, BTreeSet<Arc<str>>>,
    /// object/interface type name -> its equivalent union's name.
    pub(crate) equivalent_union_of: BTreeMap<Arc<str>, Arc<str>>,
    /// inverse of `equivalent_union_of`.
    pub(crate) base_of_equivalent_union: BTreeMap<Arc<str>, Arc<str>>,
    pub(crate) fields: BTreeMap<(Arc<str>, Arc<str>), FieldDefinition>,
    pub(crate) field_origins: BTreeMap<(Arc<str>, Arc<str>), FieldOrigin>,
    /// declaration order of vertex types, used as the type-info optimization
    /// pass's tie-break when multiple candidate types have equal cardinality.
    pub(crate) declaration_order: BTreeMap<Arc<str>, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum FieldOrigin {
    SingleAncestor(Arc<str>),
    MultipleAncestors(BTreeSet<Arc<str>>),
}

impl Add for &FieldOrigin {
    type Output = FieldOrigin;

    fn add(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (FieldOrigin::SingleAncestor(l), FieldOrigin::SingleAncestor(r)) => {
                if l == r {
                    self.clone()
                } else {
                    FieldOrigin::MultipleAncestors(BTreeSet::from([l.clone(), r.clone()]))
                }
            }
            (FieldOrigin::SingleAncestor(single), FieldOrigin::MultipleAncestors(multi))
            | (FieldOrigin::MultipleAncestors(multi), FieldOrigin::SingleAncestor(single)) => {
                let mut new_set = multi.clone();
                new_set.insert(single.clone());
                FieldOrigin::MultipleAncestors(new_set)
            }
            (FieldOrigin::MultipleAncestors(l), FieldOrigin::MultipleAncestors(r)) => {
                let mut new_set = l.clone();
                new_set.extend(r.iter().cloned());
                FieldOrigin::MultipleAncestors(new_set)
            }
        }
    }
}

impl Schema {
    pub const ALL_DIRECTIVE_DEFINITIONS: &'static str = "
directive @filter(op_name: String!, value: [String!]) repeatable on FIELD | INLINE_FRAGMENT
directive @tag(tag_name: String!) on FIELD
directive @output(out_name: String!) on FIELD
directive @optional on FIELD
directive @recurse(depth: Int!) on FIELD
directive @fold on FIELD
directive @output_source on FIELD
";

    pub fn parse(input: impl AsRef<str>) -> Result<Self, InvalidSchemaError> {
        let doc = parse_schema(input.as_ref())
            .map_err(|e| InvalidSchemaError::ParseError(e.to_string()))?;
        Self::new(doc)
    }

    pub fn new(doc: ServiceDocument) -> Result<Self, InvalidSchemaError> {
        let mut schema_query_type: Option<Name> = None;
        let mut directives: HashMap<Arc<str>, DirectiveDefinition> = Default::default();
        let mut scalars: HashSet<Arc<str>> = Default::default();
        let mut vertex_type_defs: BTreeMap<Arc<str>, TypeDefinition> = Default::default();
        let mut union_defs: BTreeMap<Arc<str>, UnionType> = Default::default();
        let mut fields: BTreeMap<(Arc<str>, Arc<str>), FieldDefinition> = Default::default();
        let mut declaration_order: BTreeMap<Arc<str>, usize> = Default::default();
        let mut order_counter = 0usize;

        for definition in doc.definitions {
            match definition {
                TypeSystemDefinition::Schema(s) => {
                    schema_query_type = s.node.query.map(|p| p.node);
                }
                TypeSystemDefinition::Directive(d) => {
                    directives.insert(Arc::from(d.node.name.node.to_string()), d.node);
                }
                TypeSystemDefinition::Type(t) => {
                    let node = t.node;
                    let type_name: Arc<str> = Arc::from(node.name.node.to_string());

                    match &node.kind {
                        TypeKind::Scalar => {
                            scalars.insert(type_name.clone());
                            if !CUSTOM_SCALARS.contains(type_name.as_ref()) {
                                return Err(InvalidSchemaError::UnsupportedCustomScalar(
                                    type_name.to_string(),
                                ));
                            }
                        }
                        TypeKind::Union(u) => {
                            union_defs.insert(type_name.clone(), u.clone());
                            declaration_order.insert(type_name.clone(), order_counter);
                            order_counter += 1;
                        }
                        TypeKind::Object(_) | TypeKind::Interface(_) => {
                            declaration_order.insert(type_name.clone(), order_counter);
                            order_counter += 1;
                            if vertex_type_defs.insert_or_error(type_name.clone(), node.clone()).is_err()
                            {
                                return Err(InvalidSchemaError::DuplicateTypeOrInterfaceDefinition(
                                    type_name.to_string(),
                                ));
                            }
                        }
                        TypeKind::Enum(_) => {
                            return Err(InvalidSchemaError::UnsupportedTypeKind(
                                type_name.to_string(),
                                "enum",
                            ))
                        }
                        TypeKind::InputObject(_) => {
                            return Err(InvalidSchemaError::UnsupportedTypeKind(
                                type_name.to_string(),
                                "input object",
                            ))
                        }
                    }

                    if let Some(field_defs) = get_raw_fields(&node) {
                        for field in field_defs {
                            let field_node = field.node;
                            let field_name: Arc<str> = Arc::from(field_node.name.node.to_string());
                            if fields
                                .insert_or_error((type_name.clone(), field_name.clone()), field_node)
                                .is_err()
                            {
                                return Err(InvalidSchemaError::DuplicateFieldDefinition(
                                    type_name.to_string(),
                                    field_name.to_string(),
                                ));
                            }
                        }
                    }
                }
            }
        }

        let query_type_name: Arc<str> = match schema_query_type {
            Some(n) => Arc::from(n.to_string()),
            None => return Err(InvalidSchemaError::MissingSchemaDefinition),
        };
        if !vertex_type_defs.contains_key(query_type_name.as_ref()) {
            return Err(InvalidSchemaError::UndefinedQueryType(query_type_name.to_string()));
        }

        let mut errors = vec![];

        let vertex_types: BTreeMap<Arc<str>, VertexTypeDescriptor> = vertex_type_defs
            .iter()
            .map(|(name, defn)| {
                let kind = match defn.kind {
                    TypeKind::Object(_) => VertexKind::Object,
                    TypeKind::Interface(_) => VertexKind::Interface,
                    _ => unreachable!(),
                };
                let implements = get_vertex_type_implements(defn)
                    .iter()
                    .map(|p| Arc::<str>::from(p.node.to_string()))
                    .collect();
                let field_order = get_raw_fields(defn)
                    .map(|fs| fs.iter().map(|f| Arc::<str>::from(f.node.name.node.to_string())).collect())
                    .unwrap_or_default();
                (name.clone(), VertexTypeDescriptor { kind, implements, field_order })
            })
            .collect();

        if let Err(e) = check_required_transitive_implementations(&vertex_types) {
            errors.extend(e);
        }
        if let Err(e) = check_type_and_field_invariants(&query_type_name, &vertex_types, &fields) {
            errors.extend(e);
        }

        let unions: BTreeMap<Arc<str>, BTreeSet<Arc<str>>> = union_defs
            .iter()
            .map(|(name, u)| {
                (name.clone(), u.members.iter().map(|m| Arc::<str>::from(m.node.to_string())).collect())
            })
            .collect();

        for (union_name, members) in &unions {
            for member in members {
                match vertex_type_defs.get(member.as_ref()) {
                    None => errors.push(InvalidSchemaError::UnionReferencesUndefinedMember(
                        union_name.to_string(),
                        member.to_string(),
                    )),
                    Some(defn) if !matches!(defn.kind, TypeKind::Object(_)) => {
                        errors.push(InvalidSchemaError::UnionReferencesNonObjectMember(
                            union_name.to_string(),
                            member.to_string(),
                        ))
                    }
                    Some(_) => {}
                }
            }
        }

        let (equivalent_union_of, base_of_equivalent_union) =
            match resolve_equivalence_hints(&vertex_types, &unions) {
                Ok(hints) => hints,
                Err(e) => {
                    errors.extend(e);
                    Default::default()
                }
            };

        let field_origins = match get_field_origins(&vertex_types) {
            Ok(origins) => {
                if let Err(e) = check_ambiguous_field_origins(&fields, &origins) {
                    errors.extend(e);
                }
                if let Err(e) = check_field_type_narrowing(&vertex_types, &fields) {
                    errors.extend(e);
                }
                if let Err(e) = check_fields_required_by_interfaces(&vertex_types, &fields) {
                    errors.extend(e);
                }
                origins
            }
            Err(e) => {
                errors.push(e);
                Default::default()
            }
        };

        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(Self {
            query_type_name,
            directives,
            vertex_types,
            unions,
            equivalent_union_of,
            base_of_equivalent_union,
            fields,
            field_origins,
            declaration_order,
        })
    }

    pub fn query_type_name(&self) -> &str {
        self.query_type_name.as_ref()
    }

    pub fn contains_vertex_type(&self, name: &str) -> bool {
        self.vertex_types.contains_key(name)
    }

    pub fn contains_union_type(&self, name: &str) -> bool {
        self.unions.contains_key(name)
    }

    /// The member type names of union type `name`, `None` if `name` isn't a union.
    pub fn union_members(&self, name: &str) -> Option<impl Iterator<Item = &str>> {
        self.unions.get(name).map(|members| members.iter().map(AsRef::as_ref))
    }

    /// The type-equivalence hint: the union that enumerates `object_name`
    /// and all of its (simulated) concrete subclasses, if one was declared.
    pub fn equivalent_union_of(&self, object_name: &str) -> Option<&str> {
        self.equivalent_union_of.get(object_name).map(AsRef::as_ref)
    }

    pub fn base_of_equivalent_union(&self, union_name: &str) -> Option<&str> {
        self.base_of_equivalent_union.get(union_name).map(AsRef::as_ref)
    }

    /// `true` iff `field_name` names a vertex (edge-traversal) field by convention:
    /// it begins with `out_` or `in_`.
    pub fn is_vertex_field(field_name: &str) -> bool {
        field_name.starts_with("out_") || field_name.starts_with("in_")
    }

    /// Resolves a field on `parent_type`, returning its property or vertex descriptor.
    /// Also resolves fields on a union type by delegating to the union's equivalent
    /// base type when one is recorded, or else requiring all members to agree.
    pub fn resolve_field(&self, parent_type: &str, field_name: &str) -> Option<FieldKind> {
        if let Some(base) = self.base_of_equivalent_union(parent_type) {
            return self.resolve_field(base, field_name);
        }

        let raw = self.fields.get(&(Arc::from(parent_type), Arc::from(field_name)))?;
        let field_type = &raw.ty.node;
        let base_named = get_base_named_type(field_type);

        if BUILTIN_SCALARS.contains(base_named) || CUSTOM_SCALARS.contains(base_named) {
            Some(FieldKind::Property { value_type: from_type(field_type) })
        } else if parent_type == self.query_type_name.as_ref() {
            // Root query fields name a vertex type directly (e.g. `Animal: Animal`)
            // and carry no `out_`/`in_` direction prefix.
            Some(FieldKind::Vertex {
                target_type: Arc::from(base_named),
                direction: Direction::Out,
                edge_name: Arc::from(field_name),
            })
        } else {
            let direction = if field_name.starts_with("out_") {
                Direction::Out
            } else if field_name.starts_with("in_") {
                Direction::In
            } else {
                return None;
            };
            Some(FieldKind::Vertex {
                target_type: Arc::from(base_named),
                direction,
                edge_name: Arc::from(field_name),
            })
        }
    }

    /// Iterates the names of `type_name`'s subtypes, including itself. `None`
    /// if `type_name` is not a known vertex type.
    pub fn subtypes<'a>(&'a self, type_name: &'a str) -> Option<impl Iterator<Item = &'a str> + 'a> {
        if !self.vertex_types.contains_key(type_name) {
            return None;
        }
        Some(self.vertex_types.iter().filter_map(move |(name, defn)| {
            if name.as_ref() == type_name || defn.implements.contains(type_name) {
                Some(name.as_ref())
            } else {
                None
            }
        }))
    }

    /// The concrete (object-type) subtypes of `type_name`, excluding interfaces.
    pub fn concrete_subtypes<'a>(&'a self, type_name: &'a str) -> Vec<&'a str> {
        self.subtypes(type_name)
            .into_iter()
            .flatten()
            .filter(|name| {
                matches!(self.vertex_types.get(*name).map(|d| &d.kind), Some(VertexKind::Object))
            })
            .collect()
    }

    pub(crate) fn is_named_subtype(&self, parent_type: &str, maybe_subtype: &str) -> bool {
        if parent_type == maybe_subtype {
            return true;
        }
        if let Some(union_members) = self.unions.get(parent_type) {
            return union_members.contains(maybe_subtype);
        }
        match self.vertex_types.get(maybe_subtype) {
            Some(defn) => defn.implements.contains(parent_type),
            None => false,
        }
    }

    /// `true` iff `a` is a subtype of (or the same type as) `b`, reflexive-transitive
    /// across `implements` and union membership.
    pub fn subtype(&self, a: &str, b: &str) -> bool {
        self.is_named_subtype(b, a)
    }

    /// `true` iff coercing a value statically typed `from` down to `to` is legal:
    /// `to` is a subtype of `from`, or `from` is an interface/union containing `to`.
    pub fn type_coercion_valid(&self, from: &str, to: &str) -> bool {
        self.subtype(to, from)
            || self.unions.get(from).map(|members| members.contains(to)).unwrap_or(false)
    }

    /// The position at which `type_name` was declared in the source schema
    /// document, for tie-breaking heuristics that must be deterministic
    /// (e.g. the MATCH backend's type-information optimization pass).
    /// `usize::MAX` if the type is unknown, so unknown types never win a tie-break.
    pub fn declaration_order(&self, type_name: &str) -> usize {
        self.declaration_order.get(type_name).copied().unwrap_or(usize::MAX)
    }
}

fn get_raw_fields(vertex: &TypeDefinition) -> Option<&[Positioned<FieldDefinition>]> {
    match &vertex.kind {
        TypeKind::Object(o) => Some(&o.fields),
        TypeKind::Interface(i) => Some(&i.fields),
        _ => None,
    }
}

fn get_vertex_type_implements(vertex: &TypeDefinition) -> &[Positioned<Name>] {
    match &vertex.kind {
        TypeKind::Object(o) => &o.implements,
        TypeKind::Interface(i) => &i.implements,
        _ => &[],
    }
}

pub(crate) fn get_base_named_type(ty: &GQLType) -> &str {
    let mut base = &ty.base;
    while let BaseType::List(inner) = base {
        base = &inner.base;
    }
    match base {
        BaseType::Named(n) => n.as_str(),
        BaseType::List(_) => unreachable!(),
    }
}

/// Resolves the naming-convention-based type-equivalence hints:
/// a union named `Union__<Base>` is the equivalent union of vertex type `<Base>`,
/// provided its members are exactly `<Base>`'s transitive concrete subtypes.
fn resolve_equivalence_hints(
    vertex_types: &BTreeMap<Arc<str>, VertexTypeDescriptor>,
    unions: &BTreeMap<Arc<str>, BTreeSet<Arc<str>>>,
) -> Result<(BTreeMap<Arc<str>, Arc<str>>, BTreeMap<Arc<str>, Arc<str>>), Vec<InvalidSchemaError>> {
    let mut equivalent_union_of = BTreeMap::new();
    let mut base_of_equivalent_union = BTreeMap::new();
    let mut errors = vec![];

    for (union_name, members) in unions {
        let Some(base_name) = union_name.strip_prefix(UNION_HINT_PREFIX) else {
            continue;
        };
        let base_name: Arc<str> = Arc::from(base_name);
        if !vertex_types.contains_key(base_name.as_ref()) {
            continue;
        }

        let expected: BTreeSet<Arc<str>> = {
            let mut set: BTreeSet<Arc<str>> = vertex_types
                .iter()
                .filter(|(name, defn)| {
                    (name.as_ref() == base_name.as_ref() || defn.implements.contains(base_name.as_ref()))
                        && matches!(defn.kind, VertexKind::Object)
                })
                .map(|(name, _)| name.clone())
                .collect();
            if matches!(vertex_types[&base_name].kind, VertexKind::Object) {
                set.insert(base_name.clone());
            }
            set
        };

        if *members != expected {
            errors.push(InvalidSchemaError::InconsistentEquivalentUnionHint(
                base_name.to_string(),
                union_name.to_string(),
                members.iter().map(ToString::to_string).collect(),
                expected.iter().map(ToString::to_string).collect(),
            ));
            continue;
        }

        if let Some(existing) = base_of_equivalent_union.insert(union_name.clone(), base_name.clone()) {
            errors.push(InvalidSchemaError::AmbiguousEquivalentUnionHint(
                union_name.to_string(),
                existing.to_string(),
                base_name.to_string(),
            ));
            continue;
        }
        equivalent_union_of.insert(base_name, union_name.clone());
    }

    if errors.is_empty() {
        Ok((equivalent_union_of, base_of_equivalent_union))
    } else {
        Err(errors)
    }
}

fn check_type_and_field_invariants(
    query_type_name: &str,
    vertex_types: &BTreeMap<Arc<str>, VertexTypeDescriptor>,
    fields: &BTreeMap<(Arc<str>, Arc<str>), FieldDefinition>,
) -> Result<(), Vec<InvalidSchemaError>> {
    let mut errors = vec![];

    for (type_name, descriptor) in vertex_types {
        if type_name.starts_with(RESERVED_PREFIX) {
            errors.push(InvalidSchemaError::ReservedTypeName(type_name.to_string()));
        }

        for field_name in &descriptor.field_order {
            if field_name.starts_with(RESERVED_PREFIX) {
                errors.push(InvalidSchemaError::ReservedFieldName(
                    type_name.to_string(),
                    field_name.to_string(),
                ));
            }

            let field_defn = &fields[&(type_name.clone(), field_name.clone())];
            let field_type = &field_defn.ty.node;
            let base_named = get_base_named_type(field_type);
            let is_scalar = BUILTIN_SCALARS.contains(base_named) || CUSTOM_SCALARS.contains(base_named);

            if type_name.as_ref() == query_type_name && is_scalar {
                errors.push(InvalidSchemaError::PropertyFieldOnRootQueryType(
                    type_name.to_string(),
                    field_name.to_string(),
                    field_type.to_string(),
                ));
            }

            if is_scalar {
                if !field_defn.arguments.is_empty() {
                    errors.push(InvalidSchemaError::PropertyFieldWithParameters(
                        type_name.to_string(),
                        field_name.to_string(),
                        field_type.to_string(),
                        field_defn.arguments.iter().map(|a| a.node.name.node.to_string()).collect(),
                    ));
                }
            } else if vertex_types.contains_key(base_named) {
                if base_named == query_type_name {
                    errors.push(InvalidSchemaError::EdgePointsToRootQueryType(
                        type_name.to_string(),
                        field_name.to_string(),
                        field_type.to_string(),
                    ));
                }

                match field_type.base {
                    BaseType::List(ref inner) => {
                        if matches!(inner.base, BaseType::List(_)) {
                            errors.push(InvalidSchemaError::InvalidEdgeType(
                                type_name.to_string(),
                                field_name.to_string(),
                                field_type.to_string(),
                            ));
                        }
                    }
                    BaseType::Named(_) => {}
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_required_transitive_implementations(
    vertex_types: &BTreeMap<Arc<str>, VertexTypeDescriptor>,
) -> Result<(), Vec<InvalidSchemaError>> {
    let mut errors = vec![];

    for (type_name, descriptor) in vertex_types {
        for implements_type in &descriptor.implements {
            match vertex_types.get(implements_type.as_ref()) {
                Some(impl_defn) => {
                    if impl_defn.kind != VertexKind::Interface {
                        errors.push(InvalidSchemaError::ImplementingNonInterface(
                            type_name.to_string(),
                            implements_type.to_string(),
                        ));
                    } else {
                        for expected in &impl_defn.implements {
                            if expected.as_ref() != type_name.as_ref()
                                && !descriptor.implements.contains(expected.as_ref())
                            {
                                errors.push(InvalidSchemaError::MissingTransitiveInterfaceImplementation(
                                    type_name.to_string(),
                                    implements_type.to_string(),
                                    expected.to_string(),
                                ));
                            }
                        }
                    }
                }
                None => {
                    errors.push(InvalidSchemaError::ImplementingNonExistentType(
                        type_name.to_string(),
                        implements_type.to_string(),
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_fields_required_by_interfaces(
    vertex_types: &BTreeMap<Arc<str>, VertexTypeDescriptor>,
    fields: &BTreeMap<(Arc<str>, Arc<str>), FieldDefinition>,
) -> Result<(), Vec<InvalidSchemaError>> {
    let mut errors = vec![];

    for (type_name, descriptor) in vertex_types {
        for implementation in &descriptor.implements {
            let Some(impl_descriptor) = vertex_types.get(implementation.as_ref()) else { continue };
            for field_name in &impl_descriptor.field_order {
                if !fields.contains_key(&(type_name.clone(), field_name.clone())) {
                    let field_type = fields[&(implementation.clone(), field_name.clone())].ty.node.to_string();
                    errors.push(InvalidSchemaError::MissingRequiredField(
                        type_name.to_string(),
                        implementation.to_string(),
                        field_name.to_string(),
                        field_type,
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_field_type_narrowing(
    vertex_types: &BTreeMap<Arc<str>, VertexTypeDescriptor>,
    fields: &BTreeMap<(Arc<str>, Arc<str>), FieldDefinition>,
) -> Result<(), Vec<InvalidSchemaError>> {
    let mut errors = vec![];

    for (type_name, descriptor) in vertex_types {
        for field_name in &descriptor.field_order {
            let field_type = &fields[&(type_name.clone(), field_name.clone())].ty.node;

            for implementation in &descriptor.implements {
                let Some(parent_field) = fields.get(&(implementation.clone(), field_name.clone()))
                else {
                    continue;
                };
                let parent_field_type = &parent_field.ty.node;
                if !is_gql_subtype(vertex_types, parent_field_type, field_type) {
                    errors.push(InvalidSchemaError::InvalidTypeWideningOfInheritedField(
                        field_name.to_string(),
                        type_name.to_string(),
                        implementation.to_string(),
                        field_type.to_string(),
                        parent_field_type.to_string(),
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_gql_subtype(
    vertex_types: &BTreeMap<Arc<str>, VertexTypeDescriptor>,
    parent: &GQLType,
    child: &GQLType,
) -> bool {
    if !parent.nullable && child.nullable {
        return false;
    }
    match (&parent.base, &child.base) {
        (BaseType::Named(p), BaseType::Named(c)) => {
            if p.as_str() == c.as_str() {
                return true;
            }
            match vertex_types.get(c.as_str()) {
                Some(defn) => defn.implements.contains(p.as_str()),
                None => false,
            }
        }
        (BaseType::List(p), BaseType::List(c)) => is_gql_subtype(vertex_types, p, c),
        _ => false,
    }
}

fn check_ambiguous_field_origins(
    fields: &BTreeMap<(Arc<str>, Arc<str>), FieldDefinition>,
    field_origins: &BTreeMap<(Arc<str>, Arc<str>), FieldOrigin>,
) -> Result<(), Vec<InvalidSchemaError>> {
    let mut errors = vec![];
    for (key, origin) in field_origins {
        if let FieldOrigin::MultipleAncestors(ancestors) = origin {
            let field_type = fields[key].ty.node.to_string();
            errors.push(InvalidSchemaError::AmbiguousFieldOrigin(
                key.0.to_string(),
                key.1.to_string(),
                field_type,
                ancestors.iter().map(ToString::to_string).collect(),
            ));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn get_field_origins(
    vertex_types: &BTreeMap<Arc<str>, VertexTypeDescriptor>,
) -> Result<BTreeMap<(Arc<str>, Arc<str>), FieldOrigin>, InvalidSchemaError> {
    let mut field_origins: BTreeMap<(Arc<str>, Arc<str>), FieldOrigin> = Default::default();
    let mut queue = VecDeque::new();

    let mut required_resolutions: BTreeMap<&str, BTreeSet<&str>> = vertex_types
        .iter()
        .map(|(name, defn)| {
            let resolutions: BTreeSet<&str> = defn
                .implements
                .iter()
                .map(AsRef::as_ref)
                .filter(|name| vertex_types.contains_key(*name))
                .collect();
            if resolutions.is_empty() {
                queue.push_back(name);
            }
            (name.as_ref(), resolutions)
        })
        .collect();

    let mut resolvers: BTreeMap<&str, BTreeSet<Arc<str>>> = Default::default();
    for (name, defn) in vertex_types {
        for interface in &defn.implements {
            resolvers.entry(interface.as_ref()).or_default().insert(name.clone());
        }
    }

    while let Some(type_name) = queue.pop_front() {
        let descriptor = &vertex_types[type_name];

        let mut implemented_fields: BTreeMap<&str, FieldOrigin> = Default::default();
        for interface in &descriptor.implements {
            let Some(interface_descriptor) = vertex_types.get(interface.as_ref()) else { continue };
            for field_name in &interface_descriptor.field_order {
                let parent_origin = &field_origins[&(interface.clone(), field_name.clone())];
                implemented_fields
                    .entry(field_name.as_ref())
                    .and_modify(|origin| *origin = (origin as &FieldOrigin) + parent_origin)
                    .or_insert_with(|| parent_origin.clone());
            }
        }

        for field_name in &descriptor.field_order {
            let origin = implemented_fields
                .remove(field_name.as_ref())
                .unwrap_or_else(|| FieldOrigin::SingleAncestor(type_name.clone()));
            field_origins.insert((type_name.clone(), field_name.clone()), origin);
        }

        if let Some(next_types) = resolvers.get(type_name) {
            for next_type in next_types {
                let remaining = required_resolutions.get_mut(next_type.as_ref()).unwrap();
                if remaining.remove(type_name) && remaining.is_empty() {
                    queue.push_back(next_type);
                }
            }
        }
    }

    for (required, remaining) in required_resolutions {
        if !remaining.is_empty() {
            let mut cycle: Vec<String> = remaining.into_iter().map(ToString::to_string).collect();
            cycle.push(required.to_string());
            return Err(InvalidSchemaError::CircularImplementsRelationships(cycle));
        }
    }

    Ok(field_origins)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NUMBERS_SCHEMA: &str = r#"
schema {
  query: RootSchemaQuery
}

directive @filter(op_name: String!, value: [String!]) repeatable on FIELD | INLINE_FRAGMENT
directive @tag(tag_name: String!) on FIELD
directive @output(out_name: String!) on FIELD
directive @optional on FIELD
directive @recurse(depth: Int!) on FIELD
directive @fold on FIELD
directive @output_source on FIELD

type RootSchemaQuery {
  Number: Number
}

interface Number {
  value: Int
  out_Number_Successor: Number
}

type Prime implements Number {
  value: Int
  out_Number_Successor: Number
}

type Composite implements Number {
  value: Int
  out_Number_Successor: Number
}

union Union__Number {
  Prime
  Composite
}
"#;

    #[test]
    fn schema_parses_and_resolves_subtypes() {
        let schema = Schema::parse(NUMBERS_SCHEMA).expect("valid schema");
        let mut subtypes: Vec<&str> = schema.subtypes("Number").unwrap().collect();
        subtypes.sort_unstable();
        assert_eq!(subtypes, vec!["Composite", "Number", "Prime"]);

        assert_eq!(schema.equivalent_union_of("Number"), Some("Union__Number"));
        assert_eq!(schema.base_of_equivalent_union("Union__Number"), Some("Number"));
        assert!(schema.type_coercion_valid("Number", "Prime"));
        assert!(!schema.type_coercion_valid("Prime", "Composite"));
    }

    #[test]
    fn is_vertex_field_uses_direction_prefix() {
        assert!(Schema::is_vertex_field("out_Number_Successor"));
        assert!(Schema::is_vertex_field("in_Number_Successor"));
        assert!(!Schema::is_vertex_field("value"));
    }

    #[test]
    fn rejects_inconsistent_equivalence_hint() {
        let bad = NUMBERS_SCHEMA.replace(
            "union Union__Number {\n  Prime\n  Composite\n}",
            "union Union__Number {\n  Prime\n}",
        );
        let err = Schema::parse(bad).unwrap_err();
        match err {
            InvalidSchemaError::InconsistentEquivalentUnionHint(..) => {}
            InvalidSchemaError::Multiple(errs) => {
                assert!(errs
                    .iter()
                    .any(|e| matches!(e, InvalidSchemaError::InconsistentEquivalentUnionHint(..))));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
