//! Routing and GraphQL route registration.

use crate::config::{GraphqlConfig, DEFAULT_MAX_BODY_SIZE};
use crate::error::ProtocolError;
use crate::graphiql::graphiql_html;
use crate::pipeline::Pipeline;
use crate::request::{OperationRequest, RawRequest};
use crate::response::{
    format_response, html_response, json_response, method_not_allowed, not_found, preflight,
    HttpResponse,
};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::{Method, StatusCode};
use indexmap::IndexMap;
use qlbind_runtime::Context;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A route handler.
pub type Handler = Arc<dyn Fn(RawRequest, Reply) -> BoxFuture<HttpResponse> + Send + Sync>;

/// Runs GraphQL operations from application code, outside the GraphQL route.
#[derive(Debug, Clone)]
pub struct QueryRunner {
    pipeline: Arc<Pipeline>,
}

impl QueryRunner {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// Runs a query through the full pipeline as a POST request and returns
    /// the status and JSON body the GraphQL route would have sent.
    pub async fn run_query(
        &self,
        source: &str,
        variables: Option<Map<String, Value>>,
        operation_name: Option<&str>,
    ) -> (StatusCode, Value) {
        let request = OperationRequest {
            document_source: source.to_string(),
            variables: variables.unwrap_or_default(),
            operation_name: operation_name.map(str::to_string),
        };
        let result = self
            .pipeline
            .execute_operation(&Method::POST, request, Context::new())
            .await;
        let formatted = format_response(result);
        (formatted.status, formatted.body)
    }
}

/// Passed to every application handler.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    runner: Option<QueryRunner>,
}

impl Reply {
    /// The query runner, present when GraphiQL is enabled.
    pub fn graphql(&self) -> Option<&QueryRunner> {
        self.runner.as_ref()
    }

    /// A JSON response with the standard headers.
    pub fn json<T: Serialize>(&self, status: StatusCode, data: &T) -> HttpResponse {
        json_response(status, data)
    }
}

/// Maps method and path to handlers. Unknown paths get 404.
pub struct Router {
    routes: IndexMap<String, Vec<(Method, Handler)>>,
    reply: Reply,
    body_limit: usize,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: IndexMap::new(),
            reply: Reply::default(),
            body_limit: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Sets the largest request body read for any route. Larger bodies get
    /// 413 without reaching a handler.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Adds a handler for `method` on `path`, replacing any earlier one.
    pub fn route<F, Fut>(mut self, method: Method, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(RawRequest, Reply) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResponse> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |raw: RawRequest, reply: Reply| -> BoxFuture<HttpResponse> {
            Box::pin(handler(raw, reply))
        });
        let handlers = self.routes.entry(path.into()).or_default();
        handlers.retain(|(existing, _)| *existing != method);
        handlers.push((method, handler));
        self
    }

    /// Registers the GraphQL routes described by `config`.
    ///
    /// With `routes` off nothing is added for `config.path`. With `graphiql`
    /// on, the page is served and every handler's [`Reply`] can run queries.
    /// The router's body limit becomes `config.max_body_size`.
    pub fn graphql(mut self, pipeline: Arc<Pipeline>, config: &GraphqlConfig) -> Self {
        self.body_limit = config.max_body_size;
        if config.routes {
            for method in [Method::GET, Method::POST] {
                let pipeline = Arc::clone(&pipeline);
                self = self.route(method, config.path.clone(), move |raw, _| {
                    let pipeline = Arc::clone(&pipeline);
                    async move { pipeline.handle(&raw).await.into_http() }
                });
            }
            info!(path = %config.path, "GraphQL routes registered");
        }

        if config.graphiql {
            let page = Arc::new(graphiql_html(&config.path));
            self = self.route(Method::GET, config.graphiql_path.clone(), move |_, _| {
                let page = Arc::clone(&page);
                async move { html_response(page.as_str().to_string()) }
            });
            self.reply.runner = Some(QueryRunner::new(pipeline));
            info!(path = %config.graphiql_path, "GraphiQL enabled");
        }
        self
    }

    /// Methods registered for `path`, joined for an `Allow` header.
    fn allowed(handlers: &[(Method, Handler)]) -> String {
        handlers
            .iter()
            .map(|(method, _)| method.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Routes a request whose body is already collected.
    pub async fn dispatch(&self, path: &str, raw: RawRequest) -> HttpResponse {
        let Some(handlers) = self.routes.get(path) else {
            return not_found();
        };
        if let Some((_, handler)) = handlers.iter().find(|(method, _)| *method == raw.method) {
            return handler(raw, self.reply.clone()).await;
        }
        if raw.method == Method::OPTIONS {
            return preflight(&Self::allowed(handlers));
        }
        method_not_allowed(&Self::allowed(handlers))
    }

    /// Collects the body of a hyper request, up to the body limit, and
    /// routes it.
    pub async fn handle<B>(&self, request: hyper::Request<B>) -> HttpResponse
    where
        B: hyper::body::Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = request.into_parts();
        debug!(method = %parts.method, path = parts.uri.path(), "request");

        let body = match Limited::new(body, self.body_limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.is::<LengthLimitError>() => {
                return format_response(Err(ProtocolError::PayloadTooLarge {
                    limit: self.body_limit,
                }))
                .into_http();
            }
            Err(err) => {
                warn!(%err, "failed to read request body");
                return format_response(Err(ProtocolError::MalformedRequest(
                    "Could not read request body.".to_string(),
                )))
                .into_http();
            }
        };
        let raw = RawRequest::from_parts(&parts, body);
        self.dispatch(parts.uri.path(), raw).await
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("paths", &self.routes.keys().collect::<Vec<_>>())
            .field("reply", &self.reply)
            .field("body_limit", &self.body_limit)
            .finish()
    }
}
