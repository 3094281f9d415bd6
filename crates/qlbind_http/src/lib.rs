//! GraphQL over HTTP for qlbind.
//!
//! A request flows through these stages, each only if the previous one
//! succeeded:
//! - `request`: extract query, variables and operation name from GET or POST
//! - `operation`: select the operation and reject mutations over GET
//! - `pipeline`: parse, validate and execute
//! - `response`: map the outcome to a status code and JSON body
//!
//! `router` registers the GraphQL routes (and optionally GraphiQL) next to
//! application routes, and `server` serves a router with hyper.

pub mod config;
pub mod error;
pub mod graphiql;
pub mod operation;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod router;
pub mod server;

pub use config::{GraphqlConfig, ServerConfig, DEFAULT_MAX_BODY_SIZE};
pub use error::{ErrorCode, ProtocolError};
pub use operation::{guard_method, select_operation, OperationKind, SelectedOperation};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use request::{extract, OperationRequest, RawRequest};
pub use response::{format_response, Body, FormattedResponse, HttpResponse};
pub use router::{Handler, QueryRunner, Reply, Router};
pub use server::{bind, serve, serve_with_shutdown, shutdown_signal, ServerError};
