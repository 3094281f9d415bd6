//! Protocol errors raised between the HTTP request and the executor.

use hyper::StatusCode;
use qlbind_runtime::FieldError;
use qlbind_syntax::OperationType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable code placed in `extensions.code` of error entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadRequest,
    GraphqlParseFailed,
    OperationResolutionFailure,
    MethodNotAllowed,
    BadUserInput,
    InternalServerError,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::GraphqlParseFailed => "GRAPHQL_PARSE_FAILED",
            Self::OperationResolutionFailure => "OPERATION_RESOLUTION_FAILURE",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::BadUserInput => "BAD_USER_INPUT",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure that stops a request before (or instead of) execution.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// The request could not be read as a GraphQL request.
    #[error("{0}")]
    MalformedRequest(String),

    /// The document failed to parse or validate. Entries carry locations.
    #[error("{}", first_message(.0))]
    DocumentSyntax(Vec<FieldError>),

    #[error("Must provide operation name if query contains multiple operations.")]
    AmbiguousOperation,

    #[error("Unknown operation named \"{0}\".")]
    UnknownOperationName(String),

    #[error("Can only perform a {0} operation from a POST request.")]
    MutationViaUnsafeMethod(OperationType),

    #[error("Request body exceeds the limit of {limit} bytes.")]
    PayloadTooLarge { limit: usize },

    /// Variable values could not be coerced. One message per variable.
    #[error("{}", .0.join("\n"))]
    InvalidVariables(Vec<String>),

    #[error("{0}")]
    Internal(String),
}

fn first_message(errors: &[FieldError]) -> &str {
    errors.first().map_or("Invalid document.", |e| e.message.as_str())
}

impl ProtocolError {
    /// A document error without a source location.
    pub fn document(message: impl Into<String>) -> Self {
        Self::DocumentSyntax(vec![FieldError::new(message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MutationViaUnsafeMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedRequest(_) | Self::PayloadTooLarge { .. } => ErrorCode::BadRequest,
            Self::DocumentSyntax(_) => ErrorCode::GraphqlParseFailed,
            Self::AmbiguousOperation | Self::UnknownOperationName(_) => {
                ErrorCode::OperationResolutionFailure
            }
            Self::MutationViaUnsafeMethod(_) => ErrorCode::MethodNotAllowed,
            Self::InvalidVariables(_) => ErrorCode::BadUserInput,
            Self::Internal(_) => ErrorCode::InternalServerError,
        }
    }

    /// Value of the `Allow` header sent with this error, if any.
    pub fn allow(&self) -> Option<&'static str> {
        match self {
            Self::MutationViaUnsafeMethod(_) => Some("POST"),
            _ => None,
        }
    }

    /// Converts the error into GraphQL error entries tagged with its code.
    pub fn into_errors(self) -> Vec<FieldError> {
        let code = self.code();
        let errors = match self {
            Self::DocumentSyntax(errors) if !errors.is_empty() => errors,
            Self::InvalidVariables(messages) => messages.into_iter().map(FieldError::new).collect(),
            other => vec![FieldError::new(other.to_string())],
        };
        errors
            .into_iter()
            .map(|error| error.with_code(code.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qlbind_core::Location;
    use serde_json::json;

    #[test]
    fn test_status_and_code() {
        let cases = [
            (ProtocolError::MalformedRequest("x".into()), 400, "BAD_REQUEST"),
            (ProtocolError::document("x"), 400, "GRAPHQL_PARSE_FAILED"),
            (ProtocolError::AmbiguousOperation, 400, "OPERATION_RESOLUTION_FAILURE"),
            (ProtocolError::UnknownOperationName("A".into()), 400, "OPERATION_RESOLUTION_FAILURE"),
            (ProtocolError::MutationViaUnsafeMethod(OperationType::Mutation), 405, "METHOD_NOT_ALLOWED"),
            (ProtocolError::PayloadTooLarge { limit: 16 }, 413, "BAD_REQUEST"),
            (ProtocolError::InvalidVariables(vec!["x".into()]), 400, "BAD_USER_INPUT"),
            (ProtocolError::Internal("x".into()), 500, "INTERNAL_SERVER_ERROR"),
        ];
        for (error, status, code) in cases {
            assert_eq!(error.status().as_u16(), status, "{error:?}");
            assert_eq!(error.code().as_str(), code);
        }
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            ProtocolError::MutationViaUnsafeMethod(OperationType::Mutation).to_string(),
            "Can only perform a mutation operation from a POST request."
        );
        assert_eq!(
            ProtocolError::UnknownOperationName("Triple".into()).to_string(),
            "Unknown operation named \"Triple\"."
        );
        assert_eq!(
            ProtocolError::MutationViaUnsafeMethod(OperationType::Mutation).allow(),
            Some("POST")
        );
        assert_eq!(ProtocolError::AmbiguousOperation.allow(), None);
    }

    #[test]
    fn test_into_errors_keeps_locations() {
        let error = ProtocolError::DocumentSyntax(vec![
            FieldError::new("Syntax Error: expected }, found <eof>")
                .with_location(Location { line: 1, column: 18 }),
        ]);
        let errors = error.into_errors();
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            json!([{
                "message": "Syntax Error: expected }, found <eof>",
                "locations": [{"line": 1, "column": 18}],
                "extensions": {"code": "GRAPHQL_PARSE_FAILED"}
            }])
        );
    }

    #[test]
    fn test_invalid_variables_one_entry_each() {
        let errors = ProtocolError::InvalidVariables(vec!["a".into(), "b".into()]).into_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1].message, "b");
    }
}
