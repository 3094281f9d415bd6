//! The GraphQL-over-HTTP pipeline.
//!
//! Runs extraction, parsing and validation, operation selection, the method
//! guard and execution, in that order. Each stage runs only if the previous
//! one succeeded.

use crate::error::ProtocolError;
use crate::operation::{guard_method, select_operation};
use crate::request::{extract, OperationRequest, RawRequest};
use crate::response::{format_response, FormattedResponse};
use hyper::{HeaderMap, Method};
use qlbind_core::{DiagnosticBag, LineIndex};
use qlbind_runtime::{
    validate, Context, ExecutionError, ExecutionRequest, Executor, FieldError, Resolver,
    ResolverArgs, ResolverInfo, ResolverMap, ResolverResult, Response, Schema, SchemaError,
};
use qlbind_syntax::ast::Document;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// A schema, its resolvers and the root value, ready to serve requests.
#[derive(Debug)]
pub struct Pipeline {
    executor: Executor,
    root_value: Value,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn schema(&self) -> &Schema {
        self.executor.schema()
    }

    /// Runs a raw HTTP request through every stage and formats the result.
    pub async fn handle(&self, raw: &RawRequest) -> FormattedResponse {
        format_response(self.execute(raw).await)
    }

    /// Runs a raw HTTP request through every stage.
    pub async fn execute(&self, raw: &RawRequest) -> Result<Response, ProtocolError> {
        let request = extract(raw)?;
        self.execute_operation(&raw.method, request, context_from_headers(&raw.headers))
            .await
    }

    /// Runs an already extracted request as if it arrived with `method`.
    pub async fn execute_operation(
        &self,
        method: &Method,
        request: OperationRequest,
        context: Context,
    ) -> Result<Response, ProtocolError> {
        let OperationRequest {
            document_source,
            variables,
            operation_name,
        } = request;

        let document = self.parse(&document_source)?;
        let selected = select_operation(&document, operation_name.as_deref())?;
        guard_method(method, &selected)?;

        debug!(
            operation = selected.name().unwrap_or("<anonymous>"),
            kind = %selected.kind,
            "executing"
        );

        let execution = ExecutionRequest::new(&document_source, &document, selected.definition)
            .with_variables(variables)
            .with_root_value(self.root_value.clone())
            .with_context(context);
        let response = self
            .executor
            .execute(execution)
            .await
            .map_err(|error| match error {
                ExecutionError::InvalidVariables(messages) => ProtocolError::InvalidVariables(messages),
                other @ ExecutionError::MissingRootType(_) => ProtocolError::Internal(other.to_string()),
            })?;

        debug!(errors = response.errors.len(), "execution finished");
        Ok(response)
    }

    /// Parses and validates a document.
    fn parse(&self, source: &str) -> Result<Document, ProtocolError> {
        let index = LineIndex::new(source);
        let document = qlbind_syntax::parse(source)
            .into_result()
            .map_err(|bag| ProtocolError::DocumentSyntax(document_errors(&bag, &index, "Syntax Error: ")))?;

        let diagnostics = validate(self.schema(), &document);
        if diagnostics.has_errors() {
            let errors = document_errors(&diagnostics, &index, "");
            warn!(count = errors.len(), "document failed validation");
            return Err(ProtocolError::DocumentSyntax(errors));
        }
        Ok(document)
    }
}

fn document_errors(bag: &DiagnosticBag, index: &LineIndex, prefix: &str) -> Vec<FieldError> {
    bag.errors()
        .map(|diagnostic| {
            FieldError::new(format!("{prefix}{}", diagnostic.display_message()))
                .with_locations(diagnostic.locations(index))
        })
        .collect()
}

fn context_from_headers(headers: &HeaderMap) -> Context {
    let mut context = Context::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            context.insert_header(name.as_str(), value);
        }
    }
    context
}

/// Builder for [`Pipeline`].
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    sdl: Option<String>,
    schema: Option<Schema>,
    resolvers: ResolverMap,
    root_value: Option<Value>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the schema from SDL.
    pub fn schema_sdl(mut self, sdl: impl Into<String>) -> Self {
        self.sdl = Some(sdl.into());
        self
    }

    /// Sets an already built schema. Takes precedence over SDL.
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Replaces the resolver map.
    pub fn resolvers(mut self, resolvers: ResolverMap) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// Adds a resolver.
    pub fn resolver<R: Resolver + 'static>(
        mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: R,
    ) -> Self {
        self.resolvers.register(type_name, field_name, resolver);
        self
    }

    /// Adds a sync resolver function.
    pub fn resolver_fn<F>(
        mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        f: F,
    ) -> Self
    where
        F: Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> ResolverResult
            + Send
            + Sync
            + 'static,
    {
        self.resolvers.register_fn(type_name, field_name, f);
        self
    }

    /// Adds an async resolver function.
    pub fn resolver_async<F, Fut>(
        mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        f: F,
    ) -> Self
    where
        F: Fn(Value, ResolverArgs, Context, ResolverInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        self.resolvers.register_async(type_name, field_name, f);
        self
    }

    /// Sets the value passed as `parent` to root field resolvers.
    pub fn root_value(mut self, root_value: Value) -> Self {
        self.root_value = Some(root_value);
        self
    }

    /// Builds the pipeline.
    ///
    /// Fails when the schema is missing or invalid, or when a resolver names
    /// a type or field the schema does not declare.
    pub fn build(self) -> Result<Pipeline, SchemaError> {
        let schema = match (self.schema, self.sdl) {
            (Some(schema), _) => schema,
            (None, Some(sdl)) => Schema::from_sdl(&sdl)?,
            (None, None) => return Err(SchemaError::MissingQueryType),
        };
        self.resolvers.check_against(&schema)?;

        debug!(
            types = schema.types().count(),
            resolvers = self.resolvers.len(),
            "pipeline ready"
        );

        Ok(Pipeline {
            executor: Executor::new(Arc::new(schema), Arc::new(self.resolvers)),
            root_value: self
                .root_value
                .unwrap_or_else(|| Value::Object(Map::new())),
        })
    }
}
