//! The GraphiQL page.

use serde_json::Value;

/// Renders a GraphiQL page that sends queries to `endpoint`.
pub fn graphiql_html(endpoint: &str) -> String {
    // A JSON string is a valid JS literal; `<` is escaped so the value cannot
    // close the script element.
    let endpoint_literal = Value::String(endpoint.to_string())
        .to_string()
        .replace('<', "\\u003c");
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8" />
    <title>GraphiQL</title>
    <style>
        body {{ height: 100%; margin: 0; width: 100%; overflow: hidden; }}
        #graphiql {{ height: 100vh; }}
    </style>
    <link rel="stylesheet" href="https://unpkg.com/graphiql@3/graphiql.min.css" />
    <script crossorigin src="https://unpkg.com/react@18/umd/react.production.min.js"></script>
    <script crossorigin src="https://unpkg.com/react-dom@18/umd/react-dom.production.min.js"></script>
    <script crossorigin src="https://unpkg.com/graphiql@3/graphiql.min.js"></script>
</head>
<body>
    <div id="graphiql">Loading...</div>
    <script>
        const fetcher = GraphiQL.createFetcher({{ url: {endpoint_literal} }});
        ReactDOM.createRoot(document.getElementById('graphiql')).render(
            React.createElement(GraphiQL, {{ fetcher }})
        );
    </script>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_at_endpoint() {
        let html = graphiql_html("/api/graphql");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(r#"createFetcher({ url: "/api/graphql" })"#));
    }

    #[test]
    fn test_endpoint_is_escaped() {
        let html = graphiql_html(r#"/x"</script>"#);
        assert!(html.contains(r#"url: "/x\"\u003c/script>""#));
        assert!(!html.contains(r#"/x"</script>"#));
    }
}
