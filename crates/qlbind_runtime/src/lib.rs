//! Runtime for qlbind.
//!
//! This crate provides the GraphQL execution runtime:
//! - `schema`: Schema model built from SDL
//! - `validate`: Document validation against a schema
//! - `coerce`: Variable and argument coercion
//! - `resolver`: Resolver registration
//! - `context`: Per-request resolver context
//! - `executor`: Operation execution

pub mod coerce;
pub mod context;
pub mod executor;
pub mod resolver;
pub mod schema;
pub mod validate;

pub use context::Context;
pub use executor::{ExecutionError, ExecutionRequest, Executor, FieldError, PathSegment, Response};
pub use resolver::{
    AsyncFnResolver, DefaultResolver, FnResolver, Resolver, ResolverArgs, ResolverError,
    ResolverFuture, ResolverInfo, ResolverMap, ResolverResult,
};
pub use schema::{
    DirectiveDef, EnumDef, EnumValueDef, FieldDef, InputFieldDef, InputObjectDef, InterfaceDef, ObjectDef,
    ScalarDef, Schema, SchemaBuilder, SchemaError, TypeDef, TypeRef, UnionDef,
};
pub use validate::validate;
