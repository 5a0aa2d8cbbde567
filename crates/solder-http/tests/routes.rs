//! End-to-end tests of route chains: decode, endpoint, encode.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use http::{Request, Response, StatusCode};
use serde::Serialize;
use solder_core::{
    BoxError, Next, ResolveError, endpoint, fallible, middleware, provide, recover,
};
use solder_http::{
    Decode, DeferredWriter, Encoding, PathParams, RawRequest, Router, RouterSettings,
    ServiceTable, with_status,
};
use tower::Service;

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Decode)]
struct Count {
    #[solder("query")]
    n: u32,
}

#[derive(Debug, Clone, Default, Decode)]
struct ShowUser {
    #[solder("path")]
    id: u64,
    #[solder("header,name=x-request-id")]
    request_id: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct NewUser {
    name: String,
}

#[derive(Debug, Clone, Default, Decode)]
struct CreateUser {
    #[solder("model")]
    user: NewUser,
    #[solder(flatten)]
    paging: Paging,
}

#[derive(Debug, Clone, Default, Decode)]
struct Ordered {
    #[solder("path")]
    id: u64,
    #[solder("model")]
    user: NewUser,
}

#[derive(Debug, Clone, Default, Decode)]
struct Paging {
    #[solder("query,name=page")]
    page: Option<u32>,
}

#[derive(Debug, Clone, Default, Decode)]
struct Unannotated {
    #[allow(dead_code)]
    n: u32,
}

#[derive(Debug, Clone, Default, Decode)]
struct BadKind {
    #[solder("cookie,name=session")]
    session: String,
}

#[derive(Debug, Clone, Default, Decode)]
struct PathList {
    #[solder("path")]
    ids: Vec<u32>,
}

#[derive(Debug, Serialize)]
struct User {
    id: u64,
    name: String,
}

fn get(uri: &str) -> Request<Bytes> {
    Request::builder().uri(uri).body(Bytes::new()).unwrap()
}

async fn started(router: &mut Router) -> ServiceTable {
    let mut table = ServiceTable::new();
    router.start(&mut table).await.unwrap();
    table
}

async fn call(table: &ServiceTable, path: &str, request: Request<Bytes>) -> Response<Bytes> {
    let mut service = table.get(path).expect("route is bound");
    service.call(request).await.unwrap()
}

fn body(response: &Response<Bytes>) -> &str {
    std::str::from_utf8(response.body()).unwrap()
}

// ============================================================================
// Decode and encode
// ============================================================================

#[tokio::test]
async fn test_query_round_trip() {
    let mut router = Router::new();
    router
        .route(
            "/count",
            [
                Encoding::json().build::<Count>(),
                endpoint(|count: Count| async move { Ok::<_, BoxError>(count) }),
            ],
        )
        .unwrap();
    let table = started(&mut router).await;

    let response = call(&table, "/count", get("/count?n=135")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    assert_eq!(body(&response), r#"{"n":135}"#);
}

#[tokio::test]
async fn test_json_without_preference() {
    let mut router = Router::new();
    router
        .route(
            "/users/{id}",
            [
                Encoding::json().build::<User>(),
                endpoint(|show: ShowUser| async move {
                    Ok::<_, BoxError>(User {
                        id: show.id,
                        name: show.request_id.unwrap_or_default(),
                    })
                }),
            ],
        )
        .unwrap();
    let table = started(&mut router).await;

    let mut request = Request::builder()
        .uri("/users/7")
        .header("X-Request-Id", "abc")
        .body(Bytes::new())
        .unwrap();
    request
        .extensions_mut()
        .insert(PathParams::from_iter([("id", "7")]));

    let response = call(&table, "/users/{id}", request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(&response), r#"{"id":7,"name":"abc"}"#);
}

#[tokio::test]
async fn test_status_error_is_plain_text() {
    let mut router = Router::new();
    router
        .route(
            "/missing",
            [
                Encoding::json().build::<User>(),
                endpoint(|| async {
                    Err::<User, _>(with_status(StatusCode::NOT_FOUND, "user 7 not found"))
                }),
            ],
        )
        .unwrap();
    let table = started(&mut router).await;

    let response = call(&table, "/missing", get("/missing")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers()[CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    assert_eq!(body(&response), "user 7 not found");
}

#[tokio::test]
async fn test_content_negotiation() {
    let encoding = Encoding::json().encoder("text/csv", |value| {
        Ok(format!("n\n{}", value["n"]).into_bytes())
    });
    let mut router = Router::new();
    router
        .route(
            "/count",
            [
                encoding.build::<Count>(),
                endpoint(|count: Count| async move { Ok::<_, BoxError>(count) }),
            ],
        )
        .unwrap();
    let table = started(&mut router).await;

    let request = Request::builder()
        .uri("/count?n=3")
        .header(ACCEPT, "application/json;q=0.5, text/csv")
        .body(Bytes::new())
        .unwrap();
    let response = call(&table, "/count", request).await;
    assert_eq!(response.headers()[CONTENT_TYPE], "text/csv");
    assert_eq!(body(&response), "n\n3");

    let request = Request::builder()
        .uri("/count?n=3")
        .header(ACCEPT, "image/png")
        .body(Bytes::new())
        .unwrap();
    let response = call(&table, "/count", request).await;
    assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
}

#[tokio::test]
async fn test_decode_failure_skips_endpoint() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let mut router = Router::new();
    router
        .route(
            "/count",
            [
                Encoding::json().build::<Count>(),
                endpoint(move |count: Count| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, BoxError>(count)
                    }
                }),
            ],
        )
        .unwrap();
    let table = started(&mut router).await;

    let response = call(&table, "/count", get("/count?n=many")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body(&response).starts_with("invalid query value `n`"));

    let response = call(&table, "/count", get("/count")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body(&response), "missing query value `n`");

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_model_body_and_flatten() {
    let mut router = Router::new();
    router
        .route(
            "/users",
            [
                Encoding::json().build::<User>(),
                endpoint(|create: Arc<CreateUser>| async move {
                    Ok::<_, BoxError>(User {
                        id: u64::from(create.paging.page.unwrap_or(0)),
                        name: create.user.name.clone(),
                    })
                }),
            ],
        )
        .unwrap();
    let table = started(&mut router).await;

    let request = Request::builder()
        .method("POST")
        .uri("/users?page=2")
        .body(Bytes::from_static(br#"{"name":"ada"}"#))
        .unwrap();
    let response = call(&table, "/users", request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(&response), r#"{"id":2,"name":"ada"}"#);

    let request = Request::builder()
        .method("POST")
        .uri("/users")
        .body(Bytes::from_static(b"{oops"))
        .unwrap();
    let response = call(&table, "/users", request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_body_limit() {
    let mut router = Router::with_settings(RouterSettings {
        max_body_bytes: 8,
        ..RouterSettings::default()
    });
    router
        .route(
            "/users",
            [
                Encoding::json().build::<User>(),
                endpoint(|create: CreateUser| async move {
                    Ok::<_, BoxError>(User {
                        id: 0,
                        name: create.user.name,
                    })
                }),
            ],
        )
        .unwrap();
    let table = started(&mut router).await;

    let request = Request::builder()
        .method("POST")
        .uri("/users")
        .body(Bytes::from_static(br#"{"name":"a long name"}"#))
        .unwrap();
    let response = call(&table, "/users", request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// ============================================================================
// Response terminator
// ============================================================================

#[tokio::test]
async fn test_committed_writer_is_left_alone() {
    let mut router = Router::new();
    router
        .route(
            "/old",
            [
                Encoding::json().build::<User>(),
                endpoint(|writer: DeferredWriter| async move {
                    writer.set_status(StatusCode::FOUND);
                    writer.insert_header(LOCATION, "/new".parse().unwrap());
                    writer.flush();
                    Err::<User, BoxError>("not encoded".into())
                }),
            ],
        )
        .unwrap();
    let table = started(&mut router).await;

    let response = call(&table, "/old", get("/old")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[LOCATION], "/new");
    assert!(response.body().is_empty());
}

#[tokio::test]
async fn test_recovered_panic_is_500() {
    let mut router = Router::new();
    router
        .route(
            "/panic",
            [
                Encoding::json().build::<User>(),
                recover(),
                endpoint(|| async {
                    if true {
                        panic!("boom");
                    }
                    Ok::<User, BoxError>(User {
                        id: 0,
                        name: String::new(),
                    })
                }),
            ],
        )
        .unwrap();
    let table = started(&mut router).await;

    let response = call(&table, "/panic", get("/panic")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body(&response), "handler panicked: boom");
}

#[tokio::test]
async fn test_short_circuit_without_terminator() {
    let mut router = Router::new();
    router
        .route(
            "/guarded",
            [
                fallible(|request: RawRequest| async move {
                    match request.header_values("authorization").first() {
                        Some(_) => Ok(String::from("user")),
                        None => Err(solder_core::TerminalError::new(with_status(
                            StatusCode::UNAUTHORIZED,
                            "missing credentials",
                        ))),
                    }
                }),
                endpoint(|user: String, writer: DeferredWriter| async move {
                    writer.write(user.as_bytes());
                }),
            ],
        )
        .unwrap();
    let table = started(&mut router).await;

    let response = call(&table, "/guarded", get("/guarded")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body(&response), "missing credentials");

    let request = Request::builder()
        .uri("/guarded")
        .header("authorization", "token")
        .body(Bytes::new())
        .unwrap();
    let response = call(&table, "/guarded", request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(&response), "user");
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_static_handlers_run_once_per_route() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();

    #[derive(Clone)]
    struct Greeting(&'static str);

    let mut router = Router::new();
    router
        .route(
            "/hello",
            [
                provide(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Greeting("hello")
                    }
                }),
                middleware(|next: Next<(), ()>, writer: DeferredWriter| async move {
                    writer.write(b"[");
                    let _ = next.call(()).await;
                    writer.write(b"]");
                }),
                endpoint(|greeting: Greeting, writer: DeferredWriter| async move {
                    writer.write(greeting.0.as_bytes());
                }),
            ],
        )
        .unwrap();
    let table = started(&mut router).await;

    for _ in 0..3 {
        let response = call(&table, "/hello", get("/hello")).await;
        assert_eq!(body(&response), "[hello]");
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_static_handlers_run_once_with_body_model() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();

    #[derive(Clone)]
    struct Greeting(&'static str);

    let mut router = Router::new();
    router
        .route(
            "/users",
            [
                provide(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Greeting("hello")
                    }
                })
                .named("greeting"),
                Encoding::json().build::<User>(),
                endpoint(|greeting: Greeting, create: CreateUser| async move {
                    Ok::<_, BoxError>(User {
                        id: 0,
                        name: format!("{} {}", greeting.0, create.user.name),
                    })
                }),
            ],
        )
        .unwrap();
    let table = started(&mut router).await;

    for _ in 0..3 {
        let request = Request::builder()
            .method("POST")
            .uri("/users")
            .body(Bytes::from_static(br#"{"name":"ada"}"#))
            .unwrap();
        let response = call(&table, "/users", request).await;
        assert_eq!(body(&response), r#"{"id":0,"name":"hello ada"}"#);
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_path_error_reported_before_body_error() {
    let mut router = Router::new();
    router
        .route(
            "/users/{id}",
            [
                Encoding::json().build::<User>(),
                endpoint(|ordered: Ordered| async move {
                    Ok::<_, BoxError>(User {
                        id: ordered.id,
                        name: ordered.user.name,
                    })
                }),
            ],
        )
        .unwrap();
    let table = started(&mut router).await;

    let mut request = Request::builder()
        .method("POST")
        .uri("/users/x")
        .body(Bytes::from_static(b"{bad"))
        .unwrap();
    request
        .extensions_mut()
        .insert(PathParams::from_iter([("id", "x")]));
    let response = call(&table, "/users/{id}", request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body(&response).starts_with("invalid path value `id`"));
}

#[test]
fn test_duplicate_path_is_rejected() {
    let mut router = Router::new();
    let handler = || endpoint(|| async {});
    router.route("/a", [handler()]).unwrap();
    match router.route("/a", [handler()]) {
        Err(ResolveError::DuplicateRegistration { path }) => assert_eq!(path, "/a"),
        Err(err) => panic!("unexpected error: {err}"),
        Ok(_) => panic!("duplicate path accepted"),
    }
    assert_eq!(router.paths().collect::<Vec<_>>(), vec!["/a"]);
}

#[tokio::test]
#[should_panic(expected = "started twice")]
async fn test_start_twice_panics() {
    let mut router = Router::new();
    router.route("/a", [endpoint(|| async {})]).unwrap();
    let mut table = ServiceTable::new();
    router.start(&mut table).await.unwrap();
    router.start(&mut table).await.unwrap();
}

#[test]
fn test_unannotated_struct_has_no_producer() {
    let mut router = Router::new();
    let result = router.route("/x", [endpoint(|_: Unannotated| async {})]);
    assert!(matches!(
        result,
        Err(ResolveError::MissingProducer { required, .. }) if required.ends_with("Unannotated")
    ));
}

#[test]
fn test_bad_annotations_fail_registration() {
    let mut router = Router::new();
    assert!(matches!(
        router.route("/kind", [endpoint(|_: BadKind| async {})]),
        Err(ResolveError::UnsupportedTag { field: "session", .. })
    ));
    assert!(matches!(
        router.route("/list", [endpoint(|_: PathList| async {})]),
        Err(ResolveError::UnsupportedFieldType { field: "ids", .. })
    ));
}
