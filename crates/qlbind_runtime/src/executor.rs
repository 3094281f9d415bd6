//! Query execution for qlbind.
//!
//! Executes one already-selected operation of a validated document. Sibling
//! fields of queries and subscriptions resolve concurrently; the root fields
//! of a mutation resolve one after another, in document order.
//!
//! A field that fails produces a located [`FieldError`] and a null. When the
//! field is non-null, the null moves up to the nearest nullable ancestor, and
//! if there is none `data` itself becomes null.

use crate::coerce::{coerce_argument_values, coerce_variable_values, float, value_to_json};
use crate::context::Context;
use crate::resolver::{ResolverArgs, ResolverInfo, ResolverMap};
use crate::schema::{Schema, TypeDef, TypeRef};
use futures_util::future::join_all;
use indexmap::IndexMap;
use qlbind_core::{LineIndex, Location};
use qlbind_syntax::ast::{Directive, Document, Field, OperationDefinition, OperationType, Selection, SelectionSet};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Fields grouped by response key, in selection order.
type FieldGroups<'a> = IndexMap<&'a str, Vec<&'a Field>>;

/// A failed position whose error is already recorded. The caller decides
/// whether it becomes null or fails in turn.
struct FieldFailure;

type Completion = Result<Value, FieldFailure>;

/// Error that prevents execution from starting.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    /// One message per offending variable.
    #[error("{}", .0.join("\n"))]
    InvalidVariables(Vec<String>),

    #[error("Schema is not configured to execute {0} operation.")]
    MissingRootType(OperationType),
}

/// Everything needed to execute one operation.
#[derive(Debug, Clone)]
pub struct ExecutionRequest<'a> {
    /// Document source, used to compute error locations.
    pub source: &'a str,
    pub document: &'a Document,
    pub operation: &'a OperationDefinition,
    /// Raw variable values, coerced before execution.
    pub variables: Map<String, Value>,
    pub root_value: Value,
    pub context: Context,
}

impl<'a> ExecutionRequest<'a> {
    pub fn new(source: &'a str, document: &'a Document, operation: &'a OperationDefinition) -> Self {
        Self {
            source,
            document,
            operation,
            variables: Map::new(),
            root_value: Value::Object(Map::new()),
            context: Context::new(),
        }
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_root_value(mut self, root_value: Value) -> Self {
        self.root_value = root_value;
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }
}

/// The query executor.
#[derive(Debug, Clone)]
pub struct Executor {
    schema: Arc<Schema>,
    resolvers: Arc<ResolverMap>,
}

impl Executor {
    pub fn new(schema: Arc<Schema>, resolvers: Arc<ResolverMap>) -> Self {
        Self { schema, resolvers }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn resolvers(&self) -> &ResolverMap {
        &self.resolvers
    }

    /// Executes an operation.
    ///
    /// Fails only when variables cannot be coerced or the schema lacks a root
    /// type for the operation; field failures are reported in the response.
    ///
    /// The document must have passed [`validate`](crate::validate::validate).
    /// Field collection recurses through fragment spreads and relies on its
    /// depth limit.
    pub async fn execute(&self, request: ExecutionRequest<'_>) -> Result<Response, ExecutionError> {
        let ExecutionRequest {
            source,
            document,
            operation,
            variables,
            root_value,
            mut context,
        } = request;

        let root_type = self
            .schema
            .root_type_name(operation.operation)
            .ok_or(ExecutionError::MissingRootType(operation.operation))?;
        context.variables = coerce_variable_values(&self.schema, operation, &variables)
            .map_err(ExecutionError::InvalidVariables)?;

        trace!(
            operation = operation.name().unwrap_or("<anonymous>"),
            kind = %operation.operation,
            "executing operation"
        );

        let ctx = ExecutionContext {
            schema: &self.schema,
            resolvers: &self.resolvers,
            document,
            context,
            line_index: LineIndex::new(source),
            errors: RwLock::new(Vec::new()),
        };

        let groups = ctx.collect_fields(root_type, &operation.selection_set);
        let result = if operation.operation == OperationType::Mutation {
            ctx.execute_fields_serially(root_type, &root_value, &groups, &[])
                .await
        } else {
            ctx.execute_fields(root_type, &root_value, &groups, &[]).await
        };

        Ok(Response {
            data: Some(result.unwrap_or(Value::Null)),
            errors: ctx.errors.into_inner(),
        })
    }
}

struct ExecutionContext<'a> {
    schema: &'a Schema,
    resolvers: &'a ResolverMap,
    document: &'a Document,
    context: Context,
    line_index: LineIndex,
    errors: RwLock<Vec<FieldError>>,
}

impl<'a> ExecutionContext<'a> {
    fn collect_fields(&self, object_type: &str, selection_set: &'a SelectionSet) -> FieldGroups<'a> {
        let mut groups = IndexMap::new();
        let mut visited = FxHashSet::default();
        self.collect_into(object_type, selection_set, &mut groups, &mut visited);
        groups
    }

    /// Merges the sub-selections of every field in a group.
    fn collect_subfields(&self, object_type: &str, fields: &[&'a Field]) -> FieldGroups<'a> {
        let mut groups = IndexMap::new();
        let mut visited = FxHashSet::default();
        for &field in fields {
            if let Some(selection_set) = &field.selection_set {
                self.collect_into(object_type, selection_set, &mut groups, &mut visited);
            }
        }
        groups
    }

    fn collect_into(
        &self,
        object_type: &str,
        selection_set: &'a SelectionSet,
        groups: &mut FieldGroups<'a>,
        visited: &mut FxHashSet<&'a str>,
    ) {
        let document = self.document;
        for selection in &selection_set.selections {
            if !self.should_include(selection.directives()) {
                continue;
            }
            match selection {
                Selection::Field(field) => {
                    groups.entry(field.response_key()).or_default().push(field);
                }
                Selection::FragmentSpread(spread) => {
                    if !visited.insert(spread.name.as_str()) {
                        continue;
                    }
                    let Some(fragment) = document.fragment(spread.name.as_str()) else {
                        continue;
                    };
                    if self
                        .schema
                        .is_possible_type(fragment.type_condition.as_str(), object_type)
                    {
                        self.collect_into(object_type, &fragment.selection_set, groups, visited);
                    }
                }
                Selection::InlineFragment(inline) => {
                    let applies = inline.type_condition.as_ref().map_or(true, |condition| {
                        self.schema.is_possible_type(condition.as_str(), object_type)
                    });
                    if applies {
                        self.collect_into(object_type, &inline.selection_set, groups, visited);
                    }
                }
            }
        }
    }

    /// Evaluates `@skip(if:)` and `@include(if:)`.
    fn should_include(&self, directives: &[Directive]) -> bool {
        for directive in directives {
            let condition = directive
                .arguments
                .iter()
                .find(|arg| arg.name.as_str() == "if")
                .map(|arg| value_to_json(&arg.value, &self.context.variables));
            match directive.name.as_str() {
                "skip" if condition == Some(Value::Bool(true)) => return false,
                "include" if condition != Some(Value::Bool(true)) => return false,
                _ => {}
            }
        }
        true
    }

    fn execute_fields<'s>(
        &'s self,
        type_name: &'s str,
        parent: &'s Value,
        groups: &'s FieldGroups<'a>,
        path: &'s [PathSegment],
    ) -> BoxFuture<'s, Completion> {
        Box::pin(async move {
            let results = join_all(groups.iter().map(|(key, fields)| {
                self.execute_field(type_name, parent, fields, child_path(path, key))
            }))
            .await;

            let mut object = Map::new();
            for ((key, _), result) in groups.iter().zip(results) {
                object.insert((*key).to_string(), result?);
            }
            Ok(Value::Object(object))
        })
    }

    fn execute_fields_serially<'s>(
        &'s self,
        type_name: &'s str,
        parent: &'s Value,
        groups: &'s FieldGroups<'a>,
        path: &'s [PathSegment],
    ) -> BoxFuture<'s, Completion> {
        Box::pin(async move {
            let mut object = Map::new();
            for (key, fields) in groups {
                let value = self
                    .execute_field(type_name, parent, fields, child_path(path, key))
                    .await?;
                object.insert((*key).to_string(), value);
            }
            Ok(Value::Object(object))
        })
    }

    fn execute_field<'s>(
        &'s self,
        parent_type: &'s str,
        parent: &'s Value,
        fields: &'s [&'a Field],
        path: Vec<PathSegment>,
    ) -> BoxFuture<'s, Completion> {
        Box::pin(async move {
            let Some(&field) = fields.first() else {
                return Ok(Value::Null);
            };
            let name = field.name.as_str();
            if name == "__typename" {
                return Ok(Value::String(parent_type.to_string()));
            }
            let Some(definition) = self.schema.field(parent_type, name) else {
                return Ok(Value::Null);
            };
            let coordinate = format!("{parent_type}.{name}");

            let args = match coerce_argument_values(
                self.schema,
                &definition.arguments,
                &field.arguments,
                &self.context.variables,
            ) {
                Ok(args) => ResolverArgs::from(args),
                Err(message) => {
                    self.record(message, fields, path).await;
                    return failure_for(&definition.ty);
                }
            };

            let info = ResolverInfo::new(name, parent_type)
                .with_response_key(field.response_key())
                .with_return_type(definition.ty.to_string())
                .with_path(path.clone())
                .with_selected_fields(selected_fields(fields));

            let resolved = match self.resolvers.get(parent_type, name) {
                Some(resolver) => resolver.resolve(parent, &args, &self.context, &info).await,
                None => Ok(parent.get(name).cloned().unwrap_or(Value::Null)),
            };

            match resolved {
                Ok(value) => {
                    self.complete_value(&coordinate, &definition.ty, fields, value, path)
                        .await
                }
                Err(error) => {
                    debug!(field = %coordinate, %error, "resolver failed");
                    self.record(error.to_string(), fields, path).await;
                    failure_for(&definition.ty)
                }
            }
        })
    }

    /// Completes a value at a position of type `ty`. Nullable positions turn
    /// failures into null; non-null positions pass them up.
    fn complete_value<'s>(
        &'s self,
        coordinate: &'s str,
        ty: &'s TypeRef,
        fields: &'s [&'a Field],
        value: Value,
        path: Vec<PathSegment>,
    ) -> BoxFuture<'s, Completion> {
        Box::pin(async move {
            match ty {
                TypeRef::NonNull(inner) => {
                    let completed = self
                        .complete_nullable(coordinate, inner, fields, value, path.clone())
                        .await?;
                    if completed.is_null() {
                        self.record(
                            format!("Cannot return null for non-nullable field {coordinate}."),
                            fields,
                            path,
                        )
                        .await;
                        return Err(FieldFailure);
                    }
                    Ok(completed)
                }
                _ => Ok(self
                    .complete_nullable(coordinate, ty, fields, value, path)
                    .await
                    .unwrap_or(Value::Null)),
            }
        })
    }

    fn complete_nullable<'s>(
        &'s self,
        coordinate: &'s str,
        ty: &'s TypeRef,
        fields: &'s [&'a Field],
        value: Value,
        path: Vec<PathSegment>,
    ) -> BoxFuture<'s, Completion> {
        Box::pin(async move {
            if value.is_null() {
                return Ok(Value::Null);
            }
            match ty {
                TypeRef::NonNull(_) => self.complete_value(coordinate, ty, fields, value, path).await,
                TypeRef::List(inner) => {
                    let Value::Array(items) = value else {
                        self.record(
                            format!("Expected Iterable, but did not find one for field \"{coordinate}\"."),
                            fields,
                            path,
                        )
                        .await;
                        return Err(FieldFailure);
                    };
                    let results = join_all(items.into_iter().enumerate().map(|(i, item)| {
                        let mut item_path = path.clone();
                        item_path.push(PathSegment::Index(i));
                        self.complete_value(coordinate, inner, fields, item, item_path)
                    }))
                    .await;
                    results
                        .into_iter()
                        .collect::<Result<Vec<_>, _>>()
                        .map(Value::Array)
                }
                TypeRef::Named(name) => {
                    let object_type = match self.schema.get_type(name) {
                        Some(TypeDef::Scalar(_)) => {
                            return self.leaf(serialize_scalar(name, &value), fields, path).await;
                        }
                        Some(TypeDef::Enum(def)) => {
                            let serialized = match &value {
                                Value::String(s) if def.has_value(s) => Ok(value.clone()),
                                _ => Err(format!("Enum \"{name}\" cannot represent value: {value}")),
                            };
                            return self.leaf(serialized, fields, path).await;
                        }
                        Some(TypeDef::Object(def)) => def.name.as_str(),
                        Some(TypeDef::Interface(_) | TypeDef::Union(_)) => {
                            match self.runtime_type(name, coordinate, &value) {
                                Ok(object_type) => object_type,
                                Err(message) => {
                                    self.record(message, fields, path).await;
                                    return Err(FieldFailure);
                                }
                            }
                        }
                        Some(TypeDef::InputObject(_)) | None => {
                            self.record(format!("Type \"{name}\" cannot be used as an output type."), fields, path)
                                .await;
                            return Err(FieldFailure);
                        }
                    };
                    let groups = self.collect_subfields(object_type, fields);
                    self.execute_fields(object_type, &value, &groups, &path).await
                }
            }
        })
    }

    async fn leaf(
        &self,
        serialized: Result<Value, String>,
        fields: &[&'a Field],
        path: Vec<PathSegment>,
    ) -> Completion {
        match serialized {
            Ok(value) => Ok(value),
            Err(message) => {
                self.record(message, fields, path).await;
                Err(FieldFailure)
            }
        }
    }

    /// Picks the concrete object type of an abstract value from its
    /// `__typename` key.
    fn runtime_type(&self, abstract_type: &str, coordinate: &str, value: &Value) -> Result<&'a str, String> {
        let schema = self.schema;
        let Some(type_name) = value.get("__typename").and_then(Value::as_str) else {
            return Err(format!(
                "Abstract type \"{abstract_type}\" must resolve to an Object type at runtime for field \"{coordinate}\". \
                 Return a \"__typename\" key naming one of its possible types."
            ));
        };
        match schema.object(type_name) {
            Some(object) if schema.is_possible_type(abstract_type, &object.name) => Ok(object.name.as_str()),
            _ => Err(format!(
                "Runtime Object type \"{type_name}\" is not a possible type for \"{abstract_type}\"."
            )),
        }
    }

    async fn record(&self, message: String, fields: &[&'a Field], path: Vec<PathSegment>) {
        let locations = fields
            .iter()
            .map(|field| self.line_index.location(field.span.start))
            .take(1)
            .collect();
        self.errors.write().await.push(FieldError {
            message,
            locations,
            path: Some(path),
            extensions: None,
        });
    }
}

fn child_path(path: &[PathSegment], key: &str) -> Vec<PathSegment> {
    let mut child = path.to_vec();
    child.push(PathSegment::Field(key.to_string()));
    child
}

fn failure_for(ty: &TypeRef) -> Completion {
    if ty.is_non_null() {
        Err(FieldFailure)
    } else {
        Ok(Value::Null)
    }
}

fn selected_fields(fields: &[&Field]) -> Vec<String> {
    fields
        .iter()
        .filter_map(|field| field.selection_set.as_ref())
        .flat_map(|selection_set| &selection_set.selections)
        .filter_map(|selection| match selection {
            Selection::Field(field) => Some(field.name.value.clone()),
            _ => None,
        })
        .collect()
}

/// Serializes a resolved value as a built-in scalar. Custom scalars pass
/// through unchanged.
fn serialize_scalar(name: &str, value: &Value) -> Result<Value, String> {
    match name {
        "Int" => {
            let int = match value {
                Value::Bool(b) => Some(i64::from(*b)),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => value
                    .as_i64()
                    .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            }
            .ok_or_else(|| format!("Int cannot represent non-integer value: {value}"))?;
            i32::try_from(int)
                .map(Value::from)
                .map_err(|_| format!("Int cannot represent non 32-bit signed integer value: {value}"))
        }
        "Float" => match value {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => value.as_f64(),
        }
        .map(float)
        .ok_or_else(|| format!("Float cannot represent non numeric value: {value}")),
        "String" => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(format!("String cannot represent value: {value}")),
        },
        "Boolean" => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
            _ => Err(format!("Boolean cannot represent a non boolean value: {value}")),
        },
        "ID" => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::String(n.to_string())),
            _ => Err(format!("ID cannot represent value: {value}")),
        },
        _ => Ok(value.clone()),
    }
}

/// A GraphQL response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The data. `Some(Value::Null)` serializes as `"data": null`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// The errors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl Response {
    /// Creates a successful response with data.
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Creates a response with a single error and no data.
    pub fn error(error: FieldError) -> Self {
        Self::errors(vec![error])
    }

    /// Creates a response with errors and no data.
    pub fn errors(errors: Vec<FieldError>) -> Self {
        Self { data: None, errors }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

/// A GraphQL error entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }

    pub fn with_locations(mut self, locations: Vec<Location>) -> Self {
        self.locations = locations;
        self
    }

    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    /// Sets `extensions.code`.
    pub fn with_code(self, code: impl Into<String>) -> Self {
        self.with_extension("code", Value::String(code.into()))
    }
}

/// A path segment in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolverError;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    const SDL: &str = r#"
        type Query {
          add(x: Int!, y: Int!): Int
          greeting: String!
          user(id: ID!): User
          users: [User!]
          required: User!
          broken: Int
          count: Int
          nodes: [Node]
          color: Color
          left: Int
          right: Int
        }
        type Mutation { push(value: Int!): [Int!]! }
        interface Node { id: ID! }
        type User implements Node { id: ID! name: String! email: String }
        type Post implements Node { id: ID! title: String }
        enum Color { RED GREEN }
    "#;

    async fn execute_with(
        resolvers: ResolverMap,
        source: &str,
        variables: Value,
        root_value: Value,
    ) -> Result<Response, ExecutionError> {
        let schema = Arc::new(Schema::from_sdl(SDL).unwrap());
        let executor = Executor::new(schema, Arc::new(resolvers));
        let document = qlbind_syntax::parse(source).into_result().unwrap();
        let operation = document.operations().next().unwrap();
        let Value::Object(variables) = variables else {
            panic!("variables must be an object");
        };
        executor
            .execute(
                ExecutionRequest::new(source, &document, operation)
                    .with_variables(variables)
                    .with_root_value(root_value),
            )
            .await
    }

    async fn execute(resolvers: ResolverMap, source: &str) -> Response {
        execute_with(resolvers, source, json!({}), json!({})).await.unwrap()
    }

    fn calculator() -> ResolverMap {
        let mut resolvers = ResolverMap::new();
        resolvers.register_fn("Query", "add", |_, args, _, _| {
            let x: i64 = args.require("x")?;
            let y: i64 = args.require("y")?;
            Ok(json!(x + y))
        });
        resolvers
    }

    #[tokio::test]
    async fn test_simple_query() {
        let response = execute(calculator(), "{ add(x: 2, y: 2) }").await;
        assert_eq!(response.data, Some(json!({"add": 4})));
        assert!(!response.has_errors());
    }

    #[tokio::test]
    async fn test_variables_and_aliases() {
        let response = execute_with(
            calculator(),
            "query Sum($a: Int!, $b: Int! = 10) { first: add(x: $a, y: $b) second: add(x: 1, y: $a) }",
            json!({"a": 5}),
            json!({}),
        )
        .await
        .unwrap();
        assert_eq!(response.data, Some(json!({"first": 15, "second": 6})));
    }

    #[tokio::test]
    async fn test_invalid_variables() {
        let err = execute_with(
            calculator(),
            "query ($a: Int!) { add(x: $a, y: 1) }",
            json!({"a": "five"}),
            json!({}),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Variable \"$a\" got invalid value \"five\"; Int cannot represent non-integer value: \"five\""
        );
    }

    #[tokio::test]
    async fn test_root_value_and_default_resolver() {
        let response = execute_with(
            ResolverMap::new(),
            "{ greeting user(id: 1) { name email } }",
            json!({}),
            json!({"greeting": "hello", "user": {"id": "1", "name": "Ada"}}),
        )
        .await
        .unwrap();
        assert_eq!(
            response.data,
            Some(json!({"greeting": "hello", "user": {"name": "Ada", "email": null}}))
        );
    }

    #[tokio::test]
    async fn test_resolver_error_is_located() {
        let mut resolvers = ResolverMap::new();
        resolvers.register_fn("Query", "broken", |_, _, _, _| Err("boom".into()));
        let response = execute(resolvers, "{\n  count\n  broken\n}").await;

        assert_eq!(response.data, Some(json!({"count": null, "broken": null})));
        assert_eq!(
            serde_json::to_value(&response.errors).unwrap(),
            json!([{"message": "boom", "locations": [{"line": 3, "column": 3}], "path": ["broken"]}])
        );
    }

    #[tokio::test]
    async fn test_non_null_propagates_to_nullable_parent() {
        let mut resolvers = ResolverMap::new();
        resolvers.register_fn("Query", "user", |_, _, _, _| Ok(json!({"id": "1", "name": null})));
        let response = execute(resolvers, "{ user(id: 1) { id name } count }").await;

        assert_eq!(response.data, Some(json!({"user": null, "count": null})));
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].message, "Cannot return null for non-nullable field User.name.");
        assert_eq!(
            response.errors[0].path,
            Some(vec![PathSegment::Field("user".into()), PathSegment::Field("name".into())])
        );
    }

    #[tokio::test]
    async fn test_non_null_root_field_nulls_data() {
        let response = execute(ResolverMap::new(), "{ greeting count }").await;
        assert_eq!(response.data, Some(Value::Null));
        assert_eq!(
            response.errors[0].message,
            "Cannot return null for non-nullable field Query.greeting."
        );
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"data":null,"errors":[{"message":"Cannot return null for non-nullable field Query.greeting.","locations":[{"line":1,"column":3}],"path":["greeting"]}]}"#
        );
    }

    #[tokio::test]
    async fn test_list_item_failure_nulls_list() {
        let mut resolvers = ResolverMap::new();
        resolvers.register_fn("Query", "users", |_, _, _, _| {
            Ok(json!([{"id": "1", "name": "Ada"}, {"id": "2", "name": null}]))
        });
        let response = execute(resolvers, "{ users { name } }").await;

        assert_eq!(response.data, Some(json!({"users": null})));
        assert_eq!(
            response.errors[0].path,
            Some(vec![
                PathSegment::Field("users".into()),
                PathSegment::Index(1),
                PathSegment::Field("name".into()),
            ])
        );
    }

    #[tokio::test]
    async fn test_scalar_serialization() {
        let mut resolvers = ResolverMap::new();
        resolvers.register_fn("Query", "count", |_, _, _, _| Ok(json!("many")));
        resolvers.register_fn("Query", "color", |_, _, _, _| Ok(json!("GREEN")));
        let response = execute(resolvers, "{ count color }").await;

        assert_eq!(response.data, Some(json!({"count": null, "color": "GREEN"})));
        assert_eq!(
            response.errors[0].message,
            "Int cannot represent non-integer value: \"many\""
        );
        assert_eq!(serialize_scalar("Int", &json!(3.0)).unwrap(), json!(3));
        assert_eq!(serialize_scalar("ID", &json!(7)).unwrap(), json!("7"));
        assert_eq!(serialize_scalar("String", &json!(true)).unwrap(), json!("true"));
        assert!(serialize_scalar("Int", &json!(1_u64 << 40)).is_err());
    }

    #[tokio::test]
    async fn test_typename_fragments_and_abstract_types() {
        let mut resolvers = ResolverMap::new();
        resolvers.register_fn("Query", "nodes", |_, _, _, _| {
            Ok(json!([
                {"__typename": "User", "id": "1", "name": "Ada"},
                {"__typename": "Post", "id": "2", "title": "Hello"},
                {"id": "3"}
            ]))
        });
        let response = execute(
            resolvers,
            "{ __typename nodes { __typename id ... on User { name } ...PostFields } }
             fragment PostFields on Post { title }",
        )
        .await;

        assert_eq!(
            response.data,
            Some(json!({
                "__typename": "Query",
                "nodes": [
                    {"__typename": "User", "id": "1", "name": "Ada"},
                    {"__typename": "Post", "id": "2", "title": "Hello"},
                    null
                ]
            }))
        );
        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].message.starts_with("Abstract type \"Node\""));
    }

    #[tokio::test]
    async fn test_skip_and_include() {
        let response = execute_with(
            calculator(),
            "query ($yes: Boolean!) { a: add(x: 1, y: 1) @skip(if: $yes) b: add(x: 2, y: 2) @include(if: $yes) c: add(x: 3, y: 3) @include(if: false) }",
            json!({"yes": true}),
            json!({}),
        )
        .await
        .unwrap();
        assert_eq!(response.data, Some(json!({"b": 4})));
    }

    #[tokio::test]
    async fn test_query_fields_resolve_concurrently() {
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let mut resolvers = ResolverMap::new();
        for field in ["left", "right"] {
            let barrier = Arc::clone(&barrier);
            resolvers.register_async("Query", field, move |_, _, _, _| {
                let barrier = Arc::clone(&barrier);
                async move {
                    barrier.wait().await;
                    Ok::<_, ResolverError>(json!(1))
                }
            });
        }

        let response = tokio::time::timeout(
            Duration::from_secs(5),
            execute(resolvers, "{ left right }"),
        )
        .await
        .expect("sibling fields should not run one at a time");
        assert_eq!(response.data, Some(json!({"left": 1, "right": 1})));
    }

    #[tokio::test]
    async fn test_mutation_fields_run_serially() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut resolvers = ResolverMap::new();
        let writer = Arc::clone(&log);
        resolvers.register_async("Mutation", "push", move |_, args, _, _| {
            let log = Arc::clone(&writer);
            async move {
                let value: i64 = args.require("value")?;
                // Later fields would overtake earlier ones if run concurrently.
                tokio::time::sleep(Duration::from_millis(u64::try_from(30 - value * 10).unwrap_or(0))).await;
                let mut log = log.lock().unwrap();
                log.push(value);
                Ok::<_, ResolverError>(json!(log.clone()))
            }
        });

        let response = execute(
            resolvers,
            "mutation { a: push(value: 1) b: push(value: 2) c: push(value: 3) }",
        )
        .await;
        assert_eq!(
            response.data,
            Some(json!({"a": [1], "b": [1, 2], "c": [1, 2, 3]}))
        );
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_missing_root_type() {
        let err = execute_with(calculator(), "subscription { add(x: 1, y: 1) }", json!({}), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::MissingRootType(OperationType::Subscription)));
    }

    #[test]
    fn test_field_error_serialization() {
        let error = FieldError::new("bad")
            .with_location(Location { line: 1, column: 2 })
            .with_path(vec![PathSegment::Field("a".into()), PathSegment::Index(0)])
            .with_code("BAD_USER_INPUT");
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({
                "message": "bad",
                "locations": [{"line": 1, "column": 2}],
                "path": ["a", 0],
                "extensions": {"code": "BAD_USER_INPUT"}
            })
        );
    }
}
