//! Route and server configuration.

use serde::{Deserialize, Serialize};

/// Default request body limit: 1 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Controls which GraphQL routes the router registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GraphqlConfig {
    /// Register GET and POST on `path`.
    pub routes: bool,
    /// Serve GraphiQL on `graphiql_path` and expose the query runner to
    /// application handlers.
    pub graphiql: bool,
    pub path: String,
    pub graphiql_path: String,
    /// Largest request body the router will read, in bytes.
    pub max_body_size: usize,
}

impl Default for GraphqlConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphqlConfig {
    pub fn new() -> Self {
        Self {
            routes: true,
            graphiql: false,
            path: "/graphql".to_string(),
            graphiql_path: "/graphiql".to_string(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Enables or disables the GraphQL routes.
    pub fn routes(mut self, routes: bool) -> Self {
        self.routes = routes;
        self
    }

    /// Enables or disables GraphiQL.
    pub fn graphiql(mut self, graphiql: bool) -> Self {
        self.graphiql = graphiql;
        self
    }

    /// Sets the GraphQL endpoint path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the path of the GraphiQL page.
    pub fn graphiql_path(mut self, path: impl Into<String>) -> Self {
        self.graphiql_path = path.into();
        self
    }

    /// Sets the request body limit in bytes.
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on. `0` picks a free port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
        }
    }

    /// Sets the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// The `host:port` pair to bind.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
