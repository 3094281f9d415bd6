//! Schema definition for qlbind.
//!
//! A [`Schema`] is built once from SDL (or programmatically through
//! [`SchemaBuilder`]) and is immutable afterwards.

use crate::coerce::value_to_json;
use indexmap::IndexMap;
use qlbind_core::DiagnosticBag;
use qlbind_syntax::ast::{self, Definition, OperationType, TypeDefinition};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Names of the scalars every schema provides.
pub const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

/// Error raised while building a schema or binding resolvers to it.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid schema SDL: {}", first_message(.0))]
    Syntax(DiagnosticBag),

    #[error("schema documents cannot contain operations or fragments")]
    ExecutableDefinition,

    #[error("type `{0}` is defined more than once")]
    DuplicateType(String),

    #[error("`{referrer}` references unknown type `{name}`")]
    UnknownType { referrer: String, name: String },

    #[error("`{referrer}` cannot use {kind} type `{name}` here")]
    WrongTypeKind {
        referrer: String,
        kind: &'static str,
        name: String,
    },

    #[error("schema has no query root type")]
    MissingQueryType,

    #[error("root {operation} type `{name}` must be an object type")]
    InvalidRootType { operation: OperationType, name: String },

    #[error("resolver registered for unknown type `{0}`")]
    UnknownResolverType(String),

    #[error("resolver registered for unknown field `{type_name}.{field}`")]
    UnknownResolverField { type_name: String, field: String },
}

fn first_message(bag: &DiagnosticBag) -> &str {
    bag.errors()
        .next()
        .map_or("unknown error", |d| d.display_message())
}

/// A GraphQL schema.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub query_type: Option<String>,
    pub mutation_type: Option<String>,
    pub subscription_type: Option<String>,
    pub types: IndexMap<String, TypeDef>,
    pub directives: IndexMap<String, DirectiveDef>,
}

impl Schema {
    /// Creates a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schema from SDL text.
    ///
    /// Root types come from a `schema { ... }` block when present, otherwise
    /// from the conventional `Query`, `Mutation` and `Subscription` names.
    pub fn from_sdl(sdl: &str) -> Result<Self, SchemaError> {
        SchemaBuilder::new().sdl(sdl)?.build()
    }

    /// Gets a type by name.
    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// Returns all types.
    pub fn types(&self) -> impl Iterator<Item = (&String, &TypeDef)> {
        self.types.iter()
    }

    /// Returns the name of the root type for an operation kind.
    pub fn root_type_name(&self, operation: OperationType) -> Option<&str> {
        match operation {
            OperationType::Query => self.query_type.as_deref(),
            OperationType::Mutation => self.mutation_type.as_deref(),
            OperationType::Subscription => self.subscription_type.as_deref(),
        }
    }

    /// Returns the root object type for an operation kind.
    pub fn root_type(&self, operation: OperationType) -> Option<&ObjectDef> {
        self.root_type_name(operation)
            .and_then(|name| self.object(name))
    }

    /// Gets an object type by name.
    pub fn object(&self, name: &str) -> Option<&ObjectDef> {
        match self.types.get(name) {
            Some(TypeDef::Object(def)) => Some(def),
            _ => None,
        }
    }

    /// Returns the fields of an object or interface type.
    pub fn fields_of(&self, type_name: &str) -> Option<&IndexMap<String, FieldDef>> {
        match self.types.get(type_name)? {
            TypeDef::Object(def) => Some(&def.fields),
            TypeDef::Interface(def) => Some(&def.fields),
            _ => None,
        }
    }

    /// Looks up a field on an object or interface type.
    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDef> {
        self.fields_of(type_name)?.get(field_name)
    }

    /// Gets a directive definition by name.
    pub fn directive(&self, name: &str) -> Option<&DirectiveDef> {
        self.directives.get(name)
    }

    /// Returns true if `object_type` can appear where `type_name` is
    /// expected: the same type, an implemented interface or a union member.
    pub fn is_possible_type(&self, type_name: &str, object_type: &str) -> bool {
        if type_name == object_type {
            return true;
        }
        match self.types.get(type_name) {
            Some(TypeDef::Union(def)) => def.members.iter().any(|m| m == object_type),
            Some(TypeDef::Interface(_)) => self
                .object(object_type)
                .is_some_and(|obj| obj.implements.iter().any(|i| i == type_name)),
            _ => false,
        }
    }

    /// Returns true if two composite types can have objects in common.
    pub fn types_overlap(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        self.types.values().any(|def| {
            matches!(def, TypeDef::Object(obj)
                if self.is_possible_type(a, &obj.name) && self.is_possible_type(b, &obj.name))
        })
    }
}

/// A type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeDef {
    Scalar(ScalarDef),
    Object(ObjectDef),
    Interface(InterfaceDef),
    Union(UnionDef),
    Enum(EnumDef),
    InputObject(InputObjectDef),
}

impl TypeDef {
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(def) => &def.name,
            Self::Object(def) => &def.name,
            Self::Interface(def) => &def.name,
            Self::Union(def) => &def.name,
            Self::Enum(def) => &def.name,
            Self::InputObject(def) => &def.name,
        }
    }

    /// Human-readable kind, used in error messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Object(_) => "object",
            Self::Interface(_) => "interface",
            Self::Union(_) => "union",
            Self::Enum(_) => "enum",
            Self::InputObject(_) => "input object",
        }
    }

    /// Scalars and enums have no subfields.
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Enum(_))
    }

    pub const fn is_composite(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Interface(_) | Self::Union(_))
    }

    pub const fn is_abstract(&self) -> bool {
        matches!(self, Self::Interface(_) | Self::Union(_))
    }

    pub const fn is_input(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Enum(_) | Self::InputObject(_))
    }

    pub const fn is_output(&self) -> bool {
        !matches!(self, Self::InputObject(_))
    }
}

/// Scalar type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarDef {
    pub name: String,
    pub description: Option<String>,
}

/// Object type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
}

/// Interface type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
}

/// Union type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnionDef {
    pub name: String,
    pub description: Option<String>,
    pub members: Vec<String>,
}

/// Enum type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<EnumValueDef>,
}

impl EnumDef {
    pub fn has_value(&self, name: &str) -> bool {
        self.values.iter().any(|v| v.name == name)
    }
}

/// Enum value definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumValueDef {
    pub name: String,
    pub description: Option<String>,
    pub deprecated: bool,
    pub deprecation_reason: Option<String>,
}

/// Input object type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, InputFieldDef>,
}

/// Field definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, InputFieldDef>,
    pub deprecated: bool,
    pub deprecation_reason: Option<String>,
}

/// Input field or argument definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub default_value: Option<serde_json::Value>,
}

impl InputFieldDef {
    /// A non-null input without a default must be supplied.
    pub fn is_required(&self) -> bool {
        self.ty.is_non_null() && self.default_value.is_none()
    }
}

/// Type reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn non_null(inner: TypeRef) -> Self {
        Self::NonNull(Box::new(inner))
    }

    /// Returns the innermost named type.
    pub fn named_type(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NonNull(inner) => inner.named_type(),
        }
    }

    pub const fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }
}

impl From<&ast::Type> for TypeRef {
    fn from(ty: &ast::Type) -> Self {
        match ty {
            ast::Type::Named(name) => Self::Named(name.value.clone()),
            ast::Type::List(inner, _) => Self::list(inner.as_ref().into()),
            ast::Type::NonNull(inner, _) => Self::non_null(inner.as_ref().into()),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// Directive definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectiveDef {
    pub name: String,
    pub description: Option<String>,
    pub arguments: IndexMap<String, InputFieldDef>,
    pub locations: Vec<String>,
    pub repeatable: bool,
}

/// Schema builder.
#[derive(Debug)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// Creates a new schema builder with the built-in scalars and directives.
    pub fn new() -> Self {
        let mut schema = Schema::new();
        for name in BUILTIN_SCALARS {
            schema.types.insert(
                name.to_string(),
                TypeDef::Scalar(ScalarDef {
                    name: name.to_string(),
                    description: Some(format!("Built-in {name} scalar")),
                }),
            );
        }
        for directive in builtin_directives() {
            schema.directives.insert(directive.name.clone(), directive);
        }
        Self { schema }
    }

    /// Sets the query type.
    pub fn query_type(mut self, name: impl Into<String>) -> Self {
        self.schema.query_type = Some(name.into());
        self
    }

    /// Sets the mutation type.
    pub fn mutation_type(mut self, name: impl Into<String>) -> Self {
        self.schema.mutation_type = Some(name.into());
        self
    }

    /// Sets the subscription type.
    pub fn subscription_type(mut self, name: impl Into<String>) -> Self {
        self.schema.subscription_type = Some(name.into());
        self
    }

    /// Adds a type, replacing any type with the same name.
    pub fn add_type(mut self, type_def: TypeDef) -> Self {
        self.schema
            .types
            .insert(type_def.name().to_string(), type_def);
        self
    }

    /// Adds a directive definition.
    pub fn add_directive(mut self, directive: DirectiveDef) -> Self {
        self.schema
            .directives
            .insert(directive.name.clone(), directive);
        self
    }

    /// Adds every definition of an SDL document.
    pub fn sdl(mut self, sdl: &str) -> Result<Self, SchemaError> {
        let document = qlbind_syntax::parse(sdl)
            .into_result()
            .map_err(SchemaError::Syntax)?;

        for definition in &document.definitions {
            match definition {
                Definition::Schema(def) => {
                    for op in &def.operations {
                        let name = Some(op.type_name.value.clone());
                        match op.operation {
                            OperationType::Query => self.schema.query_type = name,
                            OperationType::Mutation => self.schema.mutation_type = name,
                            OperationType::Subscription => self.schema.subscription_type = name,
                        }
                    }
                }
                Definition::Type(def) => {
                    let name = def.name().value.clone();
                    if self.schema.types.contains_key(&name) {
                        return Err(SchemaError::DuplicateType(name));
                    }
                    self.schema.types.insert(name, convert_type(def));
                }
                Definition::Directive(def) => {
                    let directive = DirectiveDef {
                        name: def.name.value.clone(),
                        description: def.description.clone(),
                        arguments: convert_input_values(&def.arguments),
                        locations: def.locations.iter().map(|l| l.as_str().to_string()).collect(),
                        repeatable: def.repeatable,
                    };
                    self.schema
                        .directives
                        .insert(directive.name.clone(), directive);
                }
                Definition::Operation(_) | Definition::Fragment(_) => {
                    return Err(SchemaError::ExecutableDefinition);
                }
            }
        }
        Ok(self)
    }

    /// Builds the schema, resolving root types and checking every type
    /// reference.
    pub fn build(mut self) -> Result<Schema, SchemaError> {
        let conventional = [
            (OperationType::Query, "Query"),
            (OperationType::Mutation, "Mutation"),
            (OperationType::Subscription, "Subscription"),
        ];
        let explicit = self.schema.query_type.is_some()
            || self.schema.mutation_type.is_some()
            || self.schema.subscription_type.is_some();
        if !explicit {
            for (operation, name) in conventional {
                if self.schema.types.contains_key(name) {
                    let slot = match operation {
                        OperationType::Query => &mut self.schema.query_type,
                        OperationType::Mutation => &mut self.schema.mutation_type,
                        OperationType::Subscription => &mut self.schema.subscription_type,
                    };
                    *slot = Some(name.to_string());
                }
            }
        }

        let schema = self.schema;
        if schema.query_type.is_none() {
            return Err(SchemaError::MissingQueryType);
        }
        for (operation, _) in conventional {
            if let Some(name) = schema.root_type_name(operation) {
                if schema.object(name).is_none() {
                    return Err(SchemaError::InvalidRootType {
                        operation,
                        name: name.to_string(),
                    });
                }
            }
        }

        check_references(&schema)?;
        Ok(schema)
    }
}

fn builtin_directives() -> Vec<DirectiveDef> {
    let argument = |name: &str, ty: TypeRef, default_value: Option<serde_json::Value>| {
        (
            name.to_string(),
            InputFieldDef {
                name: name.to_string(),
                description: None,
                ty,
                default_value,
            },
        )
    };
    let if_argument = || {
        IndexMap::from([argument(
            "if",
            TypeRef::non_null(TypeRef::named("Boolean")),
            None,
        )])
    };
    let locations = |names: &[&str]| names.iter().map(|s| (*s).to_string()).collect();

    vec![
        DirectiveDef {
            name: "skip".to_string(),
            description: Some("Skips this field or fragment when `if` is true.".to_string()),
            arguments: if_argument(),
            locations: locations(&["FIELD", "FRAGMENT_SPREAD", "INLINE_FRAGMENT"]),
            repeatable: false,
        },
        DirectiveDef {
            name: "include".to_string(),
            description: Some("Includes this field or fragment only when `if` is true.".to_string()),
            arguments: if_argument(),
            locations: locations(&["FIELD", "FRAGMENT_SPREAD", "INLINE_FRAGMENT"]),
            repeatable: false,
        },
        DirectiveDef {
            name: "deprecated".to_string(),
            description: None,
            arguments: IndexMap::from([argument(
                "reason",
                TypeRef::named("String"),
                Some(serde_json::Value::String(DEFAULT_DEPRECATION_REASON.to_string())),
            )]),
            locations: locations(&[
                "FIELD_DEFINITION",
                "ARGUMENT_DEFINITION",
                "INPUT_FIELD_DEFINITION",
                "ENUM_VALUE",
            ]),
            repeatable: false,
        },
        DirectiveDef {
            name: "specifiedBy".to_string(),
            description: None,
            arguments: IndexMap::from([argument(
                "url",
                TypeRef::non_null(TypeRef::named("String")),
                None,
            )]),
            locations: locations(&["SCALAR"]),
            repeatable: false,
        },
    ]
}

const DEFAULT_DEPRECATION_REASON: &str = "No longer supported";

/// Reads `@deprecated(reason: ...)` off a definition's directives.
fn deprecation(directives: &[ast::Directive]) -> (bool, Option<String>) {
    let Some(directive) = directives.iter().find(|d| d.name.value == "deprecated") else {
        return (false, None);
    };
    let reason = directive
        .arguments
        .iter()
        .find(|arg| arg.name.value == "reason")
        .and_then(|arg| match &arg.value {
            ast::Value::String(s, _) => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_else(|| DEFAULT_DEPRECATION_REASON.to_string());
    (true, Some(reason))
}

fn convert_type(def: &TypeDefinition) -> TypeDef {
    let names = |list: &[ast::Name]| list.iter().map(|n| n.value.clone()).collect();
    match def {
        TypeDefinition::Object(def) => TypeDef::Object(ObjectDef {
            name: def.name.value.clone(),
            description: def.description.clone(),
            fields: convert_fields(&def.fields),
            implements: names(&def.implements),
        }),
        TypeDefinition::Interface(def) => TypeDef::Interface(InterfaceDef {
            name: def.name.value.clone(),
            description: def.description.clone(),
            fields: convert_fields(&def.fields),
            implements: names(&def.implements),
        }),
        TypeDefinition::Union(def) => TypeDef::Union(UnionDef {
            name: def.name.value.clone(),
            description: def.description.clone(),
            members: names(&def.members),
        }),
        TypeDefinition::Enum(def) => TypeDef::Enum(EnumDef {
            name: def.name.value.clone(),
            description: def.description.clone(),
            values: def
                .values
                .iter()
                .map(|value| {
                    let (deprecated, deprecation_reason) = deprecation(&value.directives);
                    EnumValueDef {
                        name: value.name.value.clone(),
                        description: value.description.clone(),
                        deprecated,
                        deprecation_reason,
                    }
                })
                .collect(),
        }),
        TypeDefinition::Input(def) => TypeDef::InputObject(InputObjectDef {
            name: def.name.value.clone(),
            description: def.description.clone(),
            fields: convert_input_values(&def.fields),
        }),
        TypeDefinition::Scalar(def) => TypeDef::Scalar(ScalarDef {
            name: def.name.value.clone(),
            description: def.description.clone(),
        }),
    }
}

fn convert_fields(fields: &[ast::FieldDefinition]) -> IndexMap<String, FieldDef> {
    fields
        .iter()
        .map(|field| {
            let (deprecated, deprecation_reason) = deprecation(&field.directives);
            let def = FieldDef {
                name: field.name.value.clone(),
                description: field.description.clone(),
                ty: (&field.ty).into(),
                arguments: convert_input_values(&field.arguments),
                deprecated,
                deprecation_reason,
            };
            (def.name.clone(), def)
        })
        .collect()
}

fn convert_input_values(values: &[ast::InputValueDefinition]) -> IndexMap<String, InputFieldDef> {
    let no_variables = serde_json::Map::new();
    values
        .iter()
        .map(|value| {
            let def = InputFieldDef {
                name: value.name.value.clone(),
                description: value.description.clone(),
                ty: (&value.ty).into(),
                default_value: value
                    .default_value
                    .as_ref()
                    .map(|v| value_to_json(v, &no_variables)),
            };
            (def.name.clone(), def)
        })
        .collect()
}

/// Checks that every referenced type exists and has a kind valid at its use.
fn check_references(schema: &Schema) -> Result<(), SchemaError> {
    let lookup = |referrer: &str, name: &str| {
        schema
            .get_type(name)
            .ok_or_else(|| SchemaError::UnknownType {
                referrer: referrer.to_string(),
                name: name.to_string(),
            })
    };
    let wrong_kind = |referrer: String, def: &TypeDef| SchemaError::WrongTypeKind {
        referrer,
        kind: def.kind(),
        name: def.name().to_string(),
    };
    let check_inputs = |owner: &str, inputs: &IndexMap<String, InputFieldDef>| {
        for input in inputs.values() {
            let referrer = format!("{owner}.{}", input.name);
            let def = lookup(&referrer, input.ty.named_type())?;
            if !def.is_input() {
                return Err(wrong_kind(referrer, def));
            }
        }
        Ok(())
    };
    let check_fields = |owner: &str, fields: &IndexMap<String, FieldDef>, implements: &[String]| {
        for interface in implements {
            let def = lookup(owner, interface)?;
            if !matches!(def, TypeDef::Interface(_)) {
                return Err(wrong_kind(owner.to_string(), def));
            }
        }
        for field in fields.values() {
            let referrer = format!("{owner}.{}", field.name);
            let def = lookup(&referrer, field.ty.named_type())?;
            if !def.is_output() {
                return Err(wrong_kind(referrer, def));
            }
            check_inputs(&referrer, &field.arguments)?;
        }
        Ok(())
    };

    for def in schema.types.values() {
        match def {
            TypeDef::Object(obj) => check_fields(&obj.name, &obj.fields, &obj.implements)?,
            TypeDef::Interface(iface) => {
                check_fields(&iface.name, &iface.fields, &iface.implements)?;
            }
            TypeDef::Union(union) => {
                for member in &union.members {
                    let member_def = lookup(&union.name, member)?;
                    if !matches!(member_def, TypeDef::Object(_)) {
                        return Err(wrong_kind(union.name.clone(), member_def));
                    }
                }
            }
            TypeDef::InputObject(input) => check_inputs(&input.name, &input.fields)?,
            TypeDef::Scalar(_) | TypeDef::Enum(_) => {}
        }
    }
    for directive in schema.directives.values() {
        check_inputs(&format!("@{}", directive.name), &directive.arguments)?;
    }
    Ok(())
}
