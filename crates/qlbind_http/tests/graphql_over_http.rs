use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{ALLOW, CONTENT_TYPE};
use hyper::{Method, Request, StatusCode};
use qlbind_http::{GraphqlConfig, HttpResponse, Pipeline, Router};
use qlbind_runtime::ResolverError;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

const SDL: &str = r#"
    type Query {
      add(x: Int, y: Int): Int
      getMessage: String
      fail: String
    }

    type Mutation {
      setMessage(message: String): String
    }
"#;

struct App {
    router: Router,
    message: Arc<RwLock<String>>,
    mutations: Arc<AtomicUsize>,
}

fn app(config: GraphqlConfig) -> App {
    let message = Arc::new(RwLock::new(String::from("hello")));
    let mutations = Arc::new(AtomicUsize::new(0));

    let reader = Arc::clone(&message);
    let writer = Arc::clone(&message);
    let counter = Arc::clone(&mutations);
    let pipeline = Pipeline::builder()
        .schema_sdl(SDL)
        .resolver_fn("Query", "add", |_, args, _, _| {
            let x: i64 = args.get_as("x").unwrap_or(0);
            let y: i64 = args.get_as("y").unwrap_or(0);
            Ok(json!(x + y))
        })
        .resolver_fn("Query", "fail", |_, _, _, _| Err("resolver exploded".into()))
        .resolver_async("Query", "getMessage", move |_, _, _, _| {
            let message = Arc::clone(&reader);
            async move { Ok::<_, ResolverError>(json!(*message.read().await)) }
        })
        .resolver_async("Mutation", "setMessage", move |_, args, _, _| {
            let message = Arc::clone(&writer);
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let value: String = args.require("message")?;
                *message.write().await = value.clone();
                Ok::<_, ResolverError>(json!(value))
            }
        })
        .build()
        .unwrap();

    App {
        router: Router::new().graphql(Arc::new(pipeline), &config),
        message,
        mutations,
    }
}

fn get(uri: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn get_query(path: &str, pairs: &[(&str, &str)]) -> Request<Full<Bytes>> {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    get(&format!("{path}?{query}"))
}

fn post(uri: &str, body: &Value) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

async fn send(router: &Router, request: Request<Full<Bytes>>) -> (StatusCode, HttpResponse) {
    let response = router.handle(request).await;
    (response.status(), response)
}

async fn body(response: HttpResponse) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_post_query_returns_data() {
    let app = app(GraphqlConfig::default());
    let (status, response) = send(&app.router, post("/graphql", &json!({"query": "{ add(x: 2, y: 2) }"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(body(response).await, json!({"data": {"add": 4}}));
}

#[tokio::test]
async fn test_get_query_returns_data() {
    let app = app(GraphqlConfig::default());
    let (status, response) = send(&app.router, get_query("/graphql", &[("query", "{add(x:2,y:2)}")])).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body(response).await, json!({"data": {"add": 4}}));
}

#[tokio::test]
async fn test_syntax_error_is_400_without_data() {
    let app = app(GraphqlConfig::default());
    let (status, response) = send(&app.router, post("/graphql", &json!({"query": "{ add(x: 2, y: 2)"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = body(response).await;
    assert!(body.get("data").is_none());
    assert_eq!(
        body["errors"][0],
        json!({
            "message": "Syntax Error: expected }, found <eof>",
            "locations": [{"line": 1, "column": 19}],
            "extensions": {"code": "GRAPHQL_PARSE_FAILED"}
        })
    );
}

#[tokio::test]
async fn test_mutation_over_get_is_405_and_never_runs() {
    let app = app(GraphqlConfig::default());
    let (status, response) = send(
        &app.router,
        get_query("/graphql", &[("query", r#"mutation { setMessage(message: "hi") }"#)]),
    )
    .await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[ALLOW], "POST");
    assert_eq!(
        body(response).await["errors"][0]["message"],
        "Can only perform a mutation operation from a POST request."
    );
    assert_eq!(app.mutations.load(Ordering::SeqCst), 0);
    assert_eq!(*app.message.read().await, "hello");
}

#[tokio::test]
async fn test_mutation_over_post_runs() {
    let app = app(GraphqlConfig::default());
    let (status, response) = send(
        &app.router,
        post("/graphql", &json!({
            "query": "mutation Set($m: String) { setMessage(message: $m) }",
            "variables": {"m": "updated"}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body(response).await, json!({"data": {"setMessage": "updated"}}));

    let (_, response) = send(&app.router, get_query("/graphql", &[("query", "{ getMessage }")])).await;
    assert_eq!(body(response).await, json!({"data": {"getMessage": "updated"}}));
}

#[tokio::test]
async fn test_disabled_routes_are_404() {
    let app = app(GraphqlConfig::new().routes(false));
    for request in [
        get_query("/graphql", &[("query", "{ add(x: 2, y: 2) }")]),
        post("/graphql", &json!({"query": "{ add(x: 2, y: 2) }"})),
    ] {
        let (status, response) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body(response).await, json!({"error": "Not Found"}));
    }
}

#[tokio::test]
async fn test_operation_name_selects_among_many() {
    let app = app(GraphqlConfig::default());
    let document = "query Add($x: Int, $y: Int) { add(x: $x, y: $y) }
                    query Double($x: Int) { add(x: $x, y: $x) }";
    let (status, response) = send(
        &app.router,
        post("/graphql", &json!({
            "query": document,
            "variables": {"x": 2, "y": 1},
            "operationName": "Double"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body(response).await, json!({"data": {"add": 4}}));
}

#[tokio::test]
async fn test_many_operations_without_name_are_ambiguous() {
    let app = app(GraphqlConfig::default());
    let (status, response) = send(
        &app.router,
        post("/graphql", &json!({"query": "query A { getMessage } query B { getMessage }"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body(response).await,
        json!({"errors": [{
            "message": "Must provide operation name if query contains multiple operations.",
            "extensions": {"code": "OPERATION_RESOLUTION_FAILURE"}
        }]})
    );
}

#[tokio::test]
async fn test_unknown_operation_name_is_400() {
    let app = app(GraphqlConfig::default());
    let (status, response) = send(
        &app.router,
        post("/graphql", &json!({"query": "query A { getMessage }", "operationName": "B"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body(response).await["errors"][0]["message"], "Unknown operation named \"B\".");
}

#[tokio::test]
async fn test_null_variables_match_omitted_variables() {
    let app = app(GraphqlConfig::default());
    let query = "query ($x: Int) { add(x: $x, y: 1) }";
    let (_, with_null) = send(&app.router, post("/graphql", &json!({"query": query, "variables": null}))).await;
    let (_, omitted) = send(&app.router, post("/graphql", &json!({"query": query}))).await;

    let with_null = body(with_null).await;
    assert_eq!(with_null, json!({"data": {"add": 1}}));
    assert_eq!(with_null, body(omitted).await);
}

#[tokio::test]
async fn test_get_string_variables_match_post_variables() {
    let app = app(GraphqlConfig::default());
    let query = "query ($x: Int, $y: Int) { add(x: $x, y: $y) }";
    let (_, from_get) = send(
        &app.router,
        get_query("/graphql", &[("query", query), ("variables", r#"{"x": 3, "y": 4}"#)]),
    )
    .await;
    let (_, from_post) = send(
        &app.router,
        post("/graphql", &json!({"query": query, "variables": {"x": 3, "y": 4}})),
    )
    .await;

    let from_get = body(from_get).await;
    assert_eq!(from_get, json!({"data": {"add": 7}}));
    assert_eq!(from_get, body(from_post).await);
}

#[tokio::test]
async fn test_get_without_query_is_400() {
    let app = app(GraphqlConfig::default());
    let (status, response) = send(&app.router, get("/graphql")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body(response).await,
        json!({"errors": [{"message": "Must provide query string.", "extensions": {"code": "BAD_REQUEST"}}]})
    );
}

#[tokio::test]
async fn test_resolver_error_is_200_with_data_and_errors() {
    let app = app(GraphqlConfig::default());
    let (status, response) = send(&app.router, post("/graphql", &json!({"query": "{ add(x: 1, y: 1) fail }"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body(response).await,
        json!({
            "data": {"add": 2, "fail": null},
            "errors": [{
                "message": "resolver exploded",
                "locations": [{"line": 1, "column": 19}],
                "path": ["fail"]
            }]
        })
    );
}

#[tokio::test]
async fn test_unknown_field_is_400() {
    let app = app(GraphqlConfig::default());
    let (status, response) = send(&app.router, post("/graphql", &json!({"query": "{ subtract }"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = body(response).await;
    assert_eq!(body["errors"][0]["message"], "Cannot query field \"subtract\" on type \"Query\".");
    assert_eq!(body["errors"][0]["locations"], json!([{"line": 1, "column": 3}]));
}

#[tokio::test]
async fn test_long_fragment_chain_is_400() {
    let app = app(GraphqlConfig::default());
    let mut query = String::from("{ ...F0 }");
    for i in 0..5_000 {
        query.push_str(&format!(" fragment F{i} on Query {{ ...F{} }}", i + 1));
    }
    query.push_str(" fragment F5000 on Query { add }");

    let (status, response) = send(&app.router, post("/graphql", &json!({"query": query}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = body(response).await;
    assert!(body.get("data").is_none());
    let message = body["errors"][0]["message"].as_str().unwrap();
    assert!(message.starts_with("Operation selections are nested 5002 levels deep"), "{message}");
    assert_eq!(body["errors"][0]["extensions"]["code"], "GRAPHQL_PARSE_FAILED");
}

#[tokio::test]
async fn test_body_over_max_size_is_413() {
    let app = app(GraphqlConfig::new().max_body_size(64));
    let padding = " ".repeat(64);
    let (status, response) = send(
        &app.router,
        post("/graphql", &json!({"query": format!("{{ add(x: 1, y: 1) }}{padding}")})),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        body(response).await,
        json!({"errors": [{
            "message": "Request body exceeds the limit of 64 bytes.",
            "extensions": {"code": "BAD_REQUEST"}
        }]})
    );

    let (status, _) = send(&app.router, post("/graphql", &json!({"query": "{ add(x: 1, y: 1) }"}))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_required_variable_is_400() {
    let app = app(GraphqlConfig::default());
    let (status, response) = send(
        &app.router,
        post("/graphql", &json!({"query": "query ($x: Int!) { add(x: $x, y: 1) }"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body(response).await,
        json!({"errors": [{
            "message": "Variable \"$x\" of required type \"Int!\" was not provided.",
            "extensions": {"code": "BAD_USER_INPUT"}
        }]})
    );
}

#[tokio::test]
async fn test_invalid_json_body_is_400() {
    let app = app(GraphqlConfig::default());
    let request = Request::builder()
        .method(Method::POST)
        .uri("/graphql")
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from_static(b"{ nope")))
        .unwrap();
    let (status, response) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body(response).await["errors"][0]["message"], "POST body sent invalid JSON.");
}

#[tokio::test]
async fn test_put_is_405_with_allow() {
    let app = app(GraphqlConfig::default());
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/graphql")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let (status, response) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[ALLOW], "GET, POST");
}

#[tokio::test]
async fn test_options_is_cors_preflight() {
    let app = app(GraphqlConfig::default());
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/graphql")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let (status, response) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(response.headers()["access-control-allow-methods"], "GET, POST, OPTIONS");
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn test_graphiql_page_only_when_enabled() {
    let disabled = app(GraphqlConfig::default());
    let (status, _) = send(&disabled.router, get("/graphiql")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let enabled = app(GraphqlConfig::new().graphiql(true));
    let (status, response) = send(&enabled.router, get("/graphiql")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(response.headers()[CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
    let html = response.into_body().collect().await.unwrap().to_bytes();
    assert!(std::str::from_utf8(&html).unwrap().contains(r#"url: "/graphql""#));
}

#[tokio::test]
async fn test_custom_path_is_honored() {
    let app = app(GraphqlConfig::new().path("/api"));
    let (status, _) = send(&app.router, post("/graphql", &json!({"query": "{ getMessage }"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, response) = send(&app.router, post("/api", &json!({"query": "{ getMessage }"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body(response).await, json!({"data": {"getMessage": "hello"}}));
}

#[tokio::test]
async fn test_application_handlers_can_run_queries_when_graphiql_is_enabled() {
    for graphiql in [false, true] {
        let app = app(GraphqlConfig::new().graphiql(graphiql));
        let router = app.router.route(Method::GET, "/sum", |_, reply| async move {
            let Some(runner) = reply.graphql() else {
                return reply.json(StatusCode::NOT_IMPLEMENTED, &json!({"error": "no runner"}));
            };
            let variables = json!({"a": 20, "b": 22}).as_object().cloned();
            let (status, body) = runner
                .run_query("query Sum($a: Int, $b: Int) { add(x: $a, y: $b) }", variables, Some("Sum"))
                .await;
            reply.json(status, &body)
        });

        let (status, response) = send(&router, get("/sum")).await;
        if graphiql {
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body(response).await, json!({"data": {"add": 42}}));
        } else {
            assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        }
    }
}

#[tokio::test]
async fn test_run_query_executes_mutations_as_post() {
    let app = app(GraphqlConfig::new().graphiql(true));
    let router = app.router.route(Method::GET, "/reset", |_, reply| async move {
        let Some(runner) = reply.graphql() else {
            return reply.json(StatusCode::NOT_IMPLEMENTED, &json!({}));
        };
        let (status, body) = runner
            .run_query(r#"mutation { setMessage(message: "reset") }"#, None, None)
            .await;
        reply.json(status, &body)
    });

    let (status, response) = send(&router, get("/reset")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body(response).await, json!({"data": {"setMessage": "reset"}}));
    assert_eq!(*app.message.read().await, "reset");
}
