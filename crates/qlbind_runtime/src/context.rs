//! Per-request context handed to every resolver.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Request-scoped data shared by all resolvers of one execution.
///
/// Header names are stored lowercased so lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Arbitrary request data.
    pub data: HashMap<String, Value>,

    /// Coerced variable values of the executing operation.
    pub variables: Map<String, Value>,

    headers: HashMap<String, String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value in the context.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Gets a value from the context.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Gets a variable value.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set(key, value);
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Looks up a request header by name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_data() {
        let ctx = Context::new().with_data("user_id", json!(7));
        assert_eq!(ctx.get("user_id"), Some(&json!(7)));
        assert_eq!(ctx.get("missing"), None);
    }

    #[test]
    fn test_headers_case_insensitive() {
        let ctx = Context::new().with_header("Authorization", "Bearer abc");
        assert_eq!(ctx.header("authorization"), Some("Bearer abc"));
        assert_eq!(ctx.header("AUTHORIZATION"), Some("Bearer abc"));
        assert_eq!(ctx.header("x-missing"), None);
    }
}
