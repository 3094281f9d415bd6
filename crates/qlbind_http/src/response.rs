//! Response formatting.
//!
//! Maps an execution outcome or a protocol error onto a status code and a
//! JSON body, and builds the hyper responses the router sends.

use crate::error::ProtocolError;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{
    HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW, CONTENT_TYPE,
};
use hyper::StatusCode;
use qlbind_runtime::Response;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, warn};

/// Response body type used throughout the crate.
pub type Body = Full<Bytes>;

/// An HTTP response as sent by the router.
pub type HttpResponse = hyper::Response<Body>;

const JSON: &str = "application/json";

const INTERNAL_ERROR_BODY: &str =
    r#"{"errors":[{"message":"Internal server error.","extensions":{"code":"INTERNAL_SERVER_ERROR"}}]}"#;

/// A formatted GraphQL result: status, JSON body and an optional `Allow`
/// header value.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedResponse {
    pub status: StatusCode,
    pub body: Value,
    pub allow: Option<&'static str>,
}

impl FormattedResponse {
    pub fn into_http(self) -> HttpResponse {
        let mut response = json_response(self.status, &self.body);
        if let Some(allow) = self.allow {
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static(allow));
        }
        response
    }
}

/// Formats the outcome of a pipeline run.
///
/// Successful execution is always 200, with `errors` present only when a
/// field failed. Protocol errors carry no `data`.
pub fn format_response(result: Result<Response, ProtocolError>) -> FormattedResponse {
    match result {
        Ok(response) => FormattedResponse {
            status: StatusCode::OK,
            body: to_body(&response),
            allow: None,
        },
        Err(err) => {
            let status = err.status();
            if status.is_server_error() {
                error!(%err, "request failed");
            } else {
                warn!(%status, code = %err.code(), %err, "request rejected");
            }
            let allow = err.allow();
            FormattedResponse {
                status,
                body: to_body(&Response::errors(err.into_errors())),
                allow,
            }
        }
    }
}

fn to_body(response: &Response) -> Value {
    serde_json::to_value(response).unwrap_or_else(|err| {
        error!(%err, "failed to serialize response");
        Value::Null
    })
}

/// A JSON response with CORS headers.
pub fn json_response<T: Serialize>(status: StatusCode, data: &T) -> HttpResponse {
    match serde_json::to_vec(data) {
        Ok(body) => raw_response(status, JSON, body),
        Err(err) => {
            error!(%err, "failed to serialize response");
            raw_response(StatusCode::INTERNAL_SERVER_ERROR, JSON, INTERNAL_ERROR_BODY)
        }
    }
}

/// An HTML page.
pub fn html_response(html: String) -> HttpResponse {
    raw_response(StatusCode::OK, "text/html; charset=utf-8", html)
}

/// The body sent for unknown paths.
pub fn not_found() -> HttpResponse {
    json_response(StatusCode::NOT_FOUND, &json!({"error": "Not Found"}))
}

/// A 405 for a known path hit with an unsupported method.
pub fn method_not_allowed(allow: &str) -> HttpResponse {
    let mut response = json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &json!({"errors": [{
            "message": format!("Method not allowed. Use one of: {allow}."),
            "extensions": {"code": "METHOD_NOT_ALLOWED"}
        }]}),
    );
    insert(&mut response, ALLOW, allow);
    response
}

/// The reply to a CORS preflight request.
pub fn preflight(allow: &str) -> HttpResponse {
    let mut response = raw_response(StatusCode::NO_CONTENT, JSON, Bytes::new());
    insert(&mut response, ACCESS_CONTROL_ALLOW_METHODS, &format!("{allow}, OPTIONS"));
    response.headers_mut().insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}

fn raw_response(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = hyper::Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

fn insert(response: &mut HttpResponse, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        response.headers_mut().insert(name, value);
    }
}
