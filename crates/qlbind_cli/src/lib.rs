//! Command-line interface for qlbind.
//!
//! # Usage
//!
//! ```bash
//! # Serve a schema over HTTP, resolving fields from a JSON root value
//! qlbind serve --schema schema.graphql --root data.json --graphiql
//!
//! # Check SDL and executable documents for errors
//! qlbind check schema.graphql
//! qlbind check --schema schema.graphql queries/*.graphql
//! ```

use clap::{Parser, Subcommand};
use colored::Colorize;
use qlbind_core::{Diagnostic, DiagnosticReport};
use qlbind_http::{serve, GraphqlConfig, Pipeline, Router, ServerConfig};
use qlbind_runtime::{validate, Schema, SchemaError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "qlbind")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve a schema over HTTP
    Serve {
        /// Schema SDL file
        #[arg(short, long)]
        schema: PathBuf,

        /// JSON file used as the root value
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "4000")]
        port: u16,

        /// GraphQL endpoint path
        #[arg(long, default_value = "/graphql")]
        path: String,

        /// Do not register the GraphQL routes
        #[arg(long)]
        no_routes: bool,

        /// Serve GraphiQL
        #[arg(long)]
        graphiql: bool,

        /// GraphiQL page path
        #[arg(long, default_value = "/graphiql")]
        graphiql_path: String,
    },

    /// Check GraphQL files for errors
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Validate executable documents against this schema
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

pub async fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Serve {
            schema,
            root,
            host,
            port,
            path,
            no_routes,
            graphiql,
            graphiql_path,
        } => {
            let graphql = GraphqlConfig::new()
                .routes(!no_routes)
                .graphiql(graphiql)
                .path(path)
                .graphiql_path(graphiql_path);
            let server = ServerConfig::new().host(host).port(port);
            serve_schema(&schema, root.as_deref(), &graphql, &server).await
        }
        Commands::Check { files, schema } => check_files(&files, schema.as_deref(), cli.verbose),
        Commands::Version => {
            println!("qlbind {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    }
}

async fn serve_schema(
    schema_path: &Path,
    root: Option<&Path>,
    graphql: &GraphqlConfig,
    server: &ServerConfig,
) -> Result<i32, Box<dyn std::error::Error>> {
    let sdl = std::fs::read_to_string(schema_path)?;
    let Some(schema) = load_schema(schema_path, &sdl) else {
        return Ok(1);
    };

    let mut builder = Pipeline::builder().schema(schema);
    if let Some(root) = root {
        let root_value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(root)?)?;
        builder = builder.root_value(root_value);
    }
    let pipeline = Arc::new(builder.build()?);

    info!(schema = %schema_path.display(), "schema loaded");
    if graphql.graphiql {
        info!(
            "GraphiQL: http://{}{}",
            server.address(),
            graphql.graphiql_path
        );
    }

    let router = Router::new().graphql(pipeline, graphql);
    serve(router, server).await?;
    Ok(0)
}

/// Builds a schema, printing diagnostics on failure.
fn load_schema(path: &Path, sdl: &str) -> Option<Schema> {
    match Schema::from_sdl(sdl) {
        Ok(schema) => Some(schema),
        Err(SchemaError::Syntax(diagnostics)) => {
            eprintln!("{} {}", "Error".red().bold(), path.display());
            for diagnostic in diagnostics.errors() {
                report(diagnostic, path, sdl);
            }
            None
        }
        Err(err) => {
            eprintln!("{} {}", "Error".red().bold(), path.display());
            eprintln!("  {} {}", "-->".blue(), err);
            None
        }
    }
}

fn report(diagnostic: &Diagnostic, path: &Path, source: &str) {
    let report = miette::Report::new(DiagnosticReport::new(
        diagnostic.clone(),
        path.display().to_string(),
        source,
    ));
    eprintln!("{report:?}");
}

fn check_files(
    files: &[PathBuf],
    schema_path: Option<&Path>,
    verbose: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    let schema = match schema_path {
        Some(path) => match load_schema(path, &std::fs::read_to_string(path)?) {
            Some(schema) => Some(schema),
            None => return Ok(1),
        },
        None => None,
    };

    let mut has_errors = false;
    for file in files {
        if verbose {
            println!("{} {}", "Checking".blue(), file.display());
        }
        let source = std::fs::read_to_string(file)?;
        if check_source(file, &source, schema.as_ref()) {
            has_errors = true;
        } else if verbose {
            println!("{} {}", "OK".green(), file.display());
        }
    }

    if has_errors {
        Ok(1)
    } else {
        println!(
            "{} {} file(s) checked",
            "Success:".green().bold(),
            files.len()
        );
        Ok(0)
    }
}

/// Checks one document, printing diagnostics. Returns true on errors.
///
/// Type-system documents are built into a schema; executable documents are
/// validated when a schema is given.
fn check_source(path: &Path, source: &str, schema: Option<&Schema>) -> bool {
    let document = match qlbind_syntax::parse(source).into_result() {
        Ok(document) => document,
        Err(diagnostics) => {
            eprintln!("{} {}", "Error".red().bold(), path.display());
            for diagnostic in diagnostics.errors() {
                report(diagnostic, path, source);
            }
            return true;
        }
    };

    if document.operations().next().is_none() && document.fragments().next().is_none() {
        return load_schema(path, source).is_none();
    }

    let Some(schema) = schema else {
        return false;
    };
    let diagnostics = validate(schema, &document);
    if diagnostics.has_errors() {
        eprintln!("{} {}", "Error".red().bold(), path.display());
        for diagnostic in diagnostics.errors() {
            report(diagnostic, path, source);
        }
        return true;
    }
    false
}
