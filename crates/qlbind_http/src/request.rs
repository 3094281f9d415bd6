//! Request extraction.
//!
//! Normalizes a GET query string or a POST body into an [`OperationRequest`].
//! `variables` may arrive as an object, `null`, or a JSON-encoded string; the
//! result always holds an object map.

use crate::error::ProtocolError;
use bytes::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{HeaderMap, Method};
use rustc_hash::FxHashMap;
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::error::Category;
use serde_json::{Map, Value};

/// An HTTP request as seen by the GraphQL layer, with its body collected.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: Method,
    /// Raw query string without the leading `?`.
    pub query_string: Option<String>,
    pub content_type: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawRequest {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            query_string: None,
            content_type: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// A GET request with the given query string.
    pub fn get(query_string: impl Into<String>) -> Self {
        Self::new(Method::GET).with_query_string(query_string)
    }

    /// A POST request with a JSON body.
    pub fn post_json(body: &Value) -> Self {
        Self::new(Method::POST)
            .with_content_type("application/json")
            .with_body(body.to_string())
    }

    /// Builds a request from hyper request parts and a collected body.
    pub fn from_parts(parts: &hyper::http::request::Parts, body: Bytes) -> Self {
        Self {
            method: parts.method.clone(),
            query_string: parts.uri.query().map(str::to_string),
            content_type: parts
                .headers
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            headers: parts.headers.clone(),
            body,
        }
    }

    pub fn with_query_string(mut self, query_string: impl Into<String>) -> Self {
        self.query_string = Some(query_string.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Content type without parameters, lowercased.
    fn media_type(&self) -> Option<String> {
        self.content_type.as_deref().map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }
}

/// The canonical GraphQL request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationRequest {
    pub document_source: String,
    pub variables: Map<String, Value>,
    pub operation_name: Option<String>,
}

impl OperationRequest {
    pub fn new(document_source: impl Into<String>) -> Self {
        Self {
            document_source: document_source.into(),
            ..Self::default()
        }
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

/// Request fields before normalization.
#[derive(Default)]
struct Params {
    query: Option<String>,
    variables: Option<Value>,
    operation_name: Option<String>,
}

/// Extracts the operation request from a raw GET or POST request.
pub fn extract(raw: &RawRequest) -> Result<OperationRequest, ProtocolError> {
    let url_params = query_params(raw.query_string.as_deref().unwrap_or_default());

    let params = if raw.method == Method::GET {
        url_params
    } else if raw.method == Method::POST {
        let body = body_params(raw)?;
        Params {
            query: body.query.or(url_params.query),
            variables: match body.variables {
                None | Some(Value::Null) => url_params.variables,
                present => present,
            },
            operation_name: body.operation_name.or(url_params.operation_name),
        }
    } else {
        return Err(ProtocolError::MalformedRequest(
            "GraphQL only supports GET and POST requests.".to_string(),
        ));
    };

    let document_source = params
        .query
        .ok_or_else(|| ProtocolError::MalformedRequest("Must provide query string.".to_string()))?;

    Ok(OperationRequest {
        document_source,
        variables: normalize_variables(params.variables)?,
        operation_name: params.operation_name.filter(|name| !name.is_empty()),
    })
}

fn query_params(query_string: &str) -> Params {
    let pairs: FxHashMap<String, String> = url::form_urlencoded::parse(query_string.as_bytes())
        .into_owned()
        .collect();
    params_from_pairs(pairs)
}

fn params_from_pairs(mut pairs: FxHashMap<String, String>) -> Params {
    Params {
        query: pairs.remove("query"),
        variables: pairs
            .remove("variables")
            .filter(|v| !v.is_empty())
            .map(Value::String),
        operation_name: pairs.remove("operationName"),
    }
}

fn body_params(raw: &RawRequest) -> Result<Params, ProtocolError> {
    match raw.media_type().as_deref() {
        Some("application/graphql") => {
            let source = std::str::from_utf8(&raw.body).map_err(|_| {
                ProtocolError::MalformedRequest("POST body is not valid UTF-8.".to_string())
            })?;
            Ok(Params {
                query: Some(source.to_string()),
                ..Params::default()
            })
        }
        Some("application/x-www-form-urlencoded") => Ok(params_from_pairs(
            url::form_urlencoded::parse(&raw.body).into_owned().collect(),
        )),
        _ => json_params(&raw.body),
    }
}

/// The JSON POST body.
#[derive(Deserialize)]
struct PostBody {
    query: Option<String>,
    variables: Option<Value>,
    #[serde(rename = "operationName")]
    operation_name: Option<String>,
}

fn json_params(body: &[u8]) -> Result<Params, ProtocolError> {
    let Some(&first) = body.iter().find(|b| !b.is_ascii_whitespace()) else {
        return Ok(Params::default());
    };
    // Structs also deserialize from JSON arrays; only objects are accepted.
    if first != b'{' {
        let message = if serde_json::from_slice::<IgnoredAny>(body).is_ok() {
            "POST body must be a JSON object."
        } else {
            "POST body sent invalid JSON."
        };
        return Err(ProtocolError::MalformedRequest(message.to_string()));
    }

    let post: PostBody = serde_json::from_slice(body).map_err(|err| {
        ProtocolError::MalformedRequest(match err.classify() {
            Category::Data => format!("POST body has invalid fields: {err}"),
            _ => "POST body sent invalid JSON.".to_string(),
        })
    })?;
    Ok(Params {
        query: post.query,
        variables: post.variables,
        operation_name: post.operation_name,
    })
}

/// Turns absent, null, object and JSON-string variables into a map.
fn normalize_variables(variables: Option<Value>) -> Result<Map<String, Value>, ProtocolError> {
    match variables {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(Value::String(encoded)) => decode_variables(&encoded),
        Some(_) => Err(ProtocolError::MalformedRequest(
            "Variables must be an object.".to_string(),
        )),
    }
}

fn decode_variables(encoded: &str) -> Result<Map<String, Value>, ProtocolError> {
    if encoded.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str(encoded) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(_) => Err(ProtocolError::MalformedRequest(
            "Variables must be an object.".to_string(),
        )),
        Err(_) => Err(ProtocolError::MalformedRequest(
            "Variables are invalid JSON.".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(pairs: &[(&str, &str)]) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish()
    }

    fn malformed(raw: &RawRequest) -> String {
        match extract(raw) {
            Err(ProtocolError::MalformedRequest(message)) => message,
            other => panic!("expected malformed request, got {other:?}"),
        }
    }

    #[test]
    fn test_get_query_string() {
        let raw = RawRequest::get(encode(&[
            ("query", "query Add($x: Int) { add(x: $x, y: 2) }"),
            ("variables", r#"{"x": 2}"#),
            ("operationName", "Add"),
        ]));
        let request = extract(&raw).unwrap();
        assert_eq!(request.document_source, "query Add($x: Int) { add(x: $x, y: 2) }");
        assert_eq!(request.variables, json!({"x": 2}).as_object().cloned().unwrap());
        assert_eq!(request.operation_name.as_deref(), Some("Add"));
    }

    #[test]
    fn test_get_empty_params_are_absent() {
        let raw = RawRequest::get("query=%7Badd%7D&variables=&operationName=");
        let request = extract(&raw).unwrap();
        assert_eq!(request.document_source, "{add}");
        assert!(request.variables.is_empty());
        assert_eq!(request.operation_name, None);
    }

    #[test]
    fn test_get_without_query() {
        assert_eq!(malformed(&RawRequest::get("")), "Must provide query string.");
        assert_eq!(malformed(&RawRequest::new(Method::GET)), "Must provide query string.");
    }

    #[test]
    fn test_get_invalid_variables() {
        let raw = RawRequest::get(encode(&[("query", "{a}"), ("variables", "{nope")]));
        assert_eq!(malformed(&raw), "Variables are invalid JSON.");

        let raw = RawRequest::get(encode(&[("query", "{a}"), ("variables", "[1]")]));
        assert_eq!(malformed(&raw), "Variables must be an object.");
    }

    #[test]
    fn test_post_json() {
        let raw = RawRequest::post_json(&json!({
            "query": "{ add(x: 2, y: 2) }",
            "variables": {"x": 1},
            "operationName": null
        }));
        let request = extract(&raw).unwrap();
        assert_eq!(request.document_source, "{ add(x: 2, y: 2) }");
        assert_eq!(request.variables.get("x"), Some(&json!(1)));
        assert_eq!(request.operation_name, None);
    }

    #[test]
    fn test_null_variables_equal_omitted() {
        let with_null = extract(&RawRequest::post_json(&json!({"query": "{a}", "variables": null}))).unwrap();
        let omitted = extract(&RawRequest::post_json(&json!({"query": "{a}"}))).unwrap();
        assert_eq!(with_null, omitted);
        assert!(with_null.variables.is_empty());
    }

    #[test]
    fn test_get_string_and_post_object_variables_agree() {
        let get = extract(&RawRequest::get(encode(&[
            ("query", "{a}"),
            ("variables", r#"{"x": 2, "y": [1, {"z": null}]}"#),
        ])))
        .unwrap();
        let post = extract(&RawRequest::post_json(&json!({
            "query": "{a}",
            "variables": {"x": 2, "y": [1, {"z": null}]}
        })))
        .unwrap();
        assert_eq!(get.variables, post.variables);
    }

    #[test]
    fn test_post_double_encoded_variables() {
        let raw = RawRequest::post_json(&json!({"query": "{a}", "variables": r#"{"x": 2}"#}));
        assert_eq!(extract(&raw).unwrap().variables.get("x"), Some(&json!(2)));
    }

    #[test]
    fn test_post_malformed_bodies() {
        let raw = RawRequest::new(Method::POST)
            .with_content_type("application/json")
            .with_body("{ not json");
        assert_eq!(malformed(&raw), "POST body sent invalid JSON.");

        let raw = RawRequest::post_json(&json!(["query"]));
        assert_eq!(malformed(&raw), "POST body must be a JSON object.");

        let raw = RawRequest::post_json(&json!({"query": "{a}", "variables": 3}));
        assert_eq!(malformed(&raw), "Variables must be an object.");

        let raw = RawRequest::post_json(&json!({"query": 1}));
        assert!(malformed(&raw).starts_with("POST body has invalid fields: invalid type: integer `1`"));

        let raw = RawRequest::post_json(&json!({"query": "{a}", "operationName": ["A"]}));
        assert!(malformed(&raw).starts_with("POST body has invalid fields: invalid type: sequence"));

        let raw = RawRequest::new(Method::POST).with_body("[\"{a}\", null, null]");
        assert_eq!(malformed(&raw), "POST body must be a JSON object.");

        let raw = RawRequest::new(Method::POST).with_body("[1,");
        assert_eq!(malformed(&raw), "POST body sent invalid JSON.");

        let raw = RawRequest::post_json(&json!({"variables": {}}));
        assert_eq!(malformed(&raw), "Must provide query string.");
    }

    #[test]
    fn test_post_application_graphql() {
        let raw = RawRequest::new(Method::POST)
            .with_content_type("application/graphql; charset=utf-8")
            .with_query_string(encode(&[("operationName", "A"), ("variables", r#"{"v":1}"#)]))
            .with_body("query A { a }");
        let request = extract(&raw).unwrap();
        assert_eq!(request.document_source, "query A { a }");
        assert_eq!(request.operation_name.as_deref(), Some("A"));
        assert_eq!(request.variables.get("v"), Some(&json!(1)));
    }

    #[test]
    fn test_post_form_urlencoded() {
        let raw = RawRequest::new(Method::POST)
            .with_content_type("application/x-www-form-urlencoded")
            .with_body(encode(&[("query", "{ a }"), ("variables", r#"{"v":true}"#)]));
        let request = extract(&raw).unwrap();
        assert_eq!(request.document_source, "{ a }");
        assert_eq!(request.variables.get("v"), Some(&json!(true)));
    }

    #[test]
    fn test_post_falls_back_to_query_string() {
        let raw = RawRequest::post_json(&json!({"variables": {"x": 1}}))
            .with_query_string(encode(&[("query", "{ a }")]));
        let request = extract(&raw).unwrap();
        assert_eq!(request.document_source, "{ a }");
        assert_eq!(request.variables.get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_other_methods_rejected() {
        assert_eq!(
            malformed(&RawRequest::new(Method::PUT)),
            "GraphQL only supports GET and POST requests."
        );
    }
}
