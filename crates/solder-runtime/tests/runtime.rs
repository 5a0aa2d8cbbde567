//! Runtime tests: configuration flowing into routes, startup and shutdown.

use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use solder_core::{BoxError, ResolveError, endpoint};
use solder_http::{Decode, ServiceTable};
use solder_runtime::{RuntimeError, SolderConfig, SolderRuntime};
use tower::Service;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct Note {
    text: String,
}

#[derive(Debug, Clone, Default, Decode)]
struct PostNote {
    #[solder("model")]
    note: Note,
}

#[derive(Debug, Clone, Default, Decode)]
struct Unannotated {
    #[allow(dead_code)]
    text: String,
}

fn config() -> SolderConfig {
    let mut config = SolderConfig::default();
    config.logging.level = solder_runtime::config::LogLevel::Debug;
    config
}

fn post(uri: &str, body: &'static str) -> Request<Bytes> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Bytes::from_static(body.as_bytes()))
        .unwrap()
}

async fn call(table: &ServiceTable, path: &str, request: Request<Bytes>) -> Response<Bytes> {
    let mut service = table.get(path).expect("route is bound");
    service.call(request).await.unwrap()
}

fn note_route(runtime: &mut SolderRuntime) {
    let encoding = runtime.encoding();
    runtime
        .route(
            "/notes",
            [
                encoding.build::<Note>(),
                endpoint(|post: PostNote| async move { Ok::<_, BoxError>(post.note) }),
            ],
        )
        .unwrap();
}

#[tokio::test]
async fn test_routes_use_configured_content_type() {
    let mut config = config();
    config.server.default_content_type = "application/vnd.notes+json".into();
    let mut runtime = SolderRuntime::from_config(&config);
    note_route(&mut runtime);

    let mut table = ServiceTable::new();
    runtime.start(&mut table).await.unwrap();

    let response = call(&table, "/notes", post("/notes", r#"{"text":"hi"}"#)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/vnd.notes+json");
    assert_eq!(response.body().as_ref(), br#"{"text":"hi"}"#);
}

#[tokio::test]
async fn test_routes_use_configured_body_limit() {
    let mut config = config();
    config.server.max_body_bytes = 8;
    let mut runtime = SolderRuntime::from_config(&config);
    note_route(&mut runtime);

    let mut table = ServiceTable::new();
    runtime.start(&mut table).await.unwrap();

    let response = call(&table, "/notes", post("/notes", r#"{"text":"too long"}"#)).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_route_resolution_error() {
    let mut runtime = SolderRuntime::from_config(&config());
    let encoding = runtime.encoding();
    let result = runtime.route(
        "/broken",
        [
            encoding.build::<Note>(),
            endpoint(|_: Unannotated| async move { Ok::<_, BoxError>(Note::default()) }),
        ],
    );

    assert!(matches!(
        result,
        Err(RuntimeError::Resolve(ResolveError::MissingProducer { .. }))
    ));
    assert_eq!(runtime.router().paths().count(), 0);
}

#[tokio::test]
async fn test_shutdown_token_stops_waiting() {
    let runtime = SolderRuntime::from_config(&config());
    let token = runtime.shutdown_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
    });

    tokio::time::timeout(Duration::from_secs(5), runtime.wait_for_shutdown())
        .await
        .expect("shutdown token ends the wait");
}

#[test]
fn test_builder_uses_merged_config() {
    figment::Jail::expect_with(|jail| {
        let mut config = SolderConfig::default();
        config.server.address = "127.0.0.1:9090".into();

        let runtime = SolderRuntime::builder()
            .search_path(jail.directory())
            .without_env()
            .merge(config)
            .build()
            .unwrap();
        assert_eq!(runtime.config().server.address, "127.0.0.1:9090");
        Ok(())
    });
}

#[cfg(feature = "http-server")]
#[tokio::test]
async fn test_serve_stops_on_shutdown() {
    let mut runtime = SolderRuntime::from_config(&config());
    note_route(&mut runtime);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    runtime.serve(listener, async {}).await.unwrap();
    assert_eq!(runtime.router().paths().collect::<Vec<_>>(), ["/notes"]);
}
