mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use common::{settings, FakePreflight, FakeSigner};
use futures_util::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use portal_viewer::config::{DocumentHostMode, Settings};
use portal_viewer::preflight::{HttpPreflight, Preflight};
use portal_viewer::web::{router, state::AppState};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tower::util::ServiceExt;

fn make_state(settings: Settings) -> Arc<AppState> {
    Arc::new(AppState::new(settings, FakeSigner::ok(), FakePreflight::ok()).expect("state"))
}

fn local_upstream_settings() -> Settings {
    let mut settings = settings();
    settings.proxy.allowed_hosts = vec!["127.0.0.1".to_string(), "amazonaws.com".to_string()];
    settings
}

async fn read_body(response: Response) -> (StatusCode, HeaderMap, Vec<u8>) {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    (status, headers, body.to_vec())
}

async fn read_json(response: Response) -> (StatusCode, Value) {
    let (status, _, body) = read_body(response).await;
    let value: Value = serde_json::from_slice(&body).expect("json");
    (status, value)
}

fn proxy_uri(target: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    format!("/proxy?url={}", encoded)
}

async fn spawn_upstream() -> SocketAddr {
    let app = Router::new()
        .route(
            "/denied.pdf",
            get(|| async {
                (
                    StatusCode::FORBIDDEN,
                    [(header::CONTENT_TYPE, "application/xml")],
                    "<Error><Code>AccessDenied</Code></Error>",
                )
            }),
        )
        .route(
            "/lesson.pdf",
            get(|| async {
                Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::from("%PDF-1.4 lesson"))
                    .unwrap()
            }),
        )
        .route(
            "/presigned.pdf",
            get(|headers: HeaderMap| async move {
                let one_byte = headers
                    .get(header::RANGE)
                    .is_some_and(|value| value == "bytes=0-0");
                let status = if one_byte {
                    StatusCode::PARTIAL_CONTENT
                } else {
                    StatusCode::OK
                };
                Response::builder()
                    .status(status)
                    .header(header::CONTENT_TYPE, "application/pdf")
                    .body(Body::from("%PDF-1.4 signed"))
                    .unwrap()
            })
            .head(|| async { StatusCode::FORBIDDEN }),
        )
        .route(
            "/clip.mp4",
            get(|headers: HeaderMap| async move {
                let range = headers
                    .get(header::RANGE)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("none")
                    .to_string();
                Response::builder()
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header(header::CONTENT_TYPE, "video/mp4")
                    .header(header::CONTENT_RANGE, format!("{} /1000", range))
                    .body(Body::from("0123456789"))
                    .unwrap()
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("upstream");
    });
    addr
}

async fn spawn_app(settings: Settings) -> SocketAddr {
    let app = router(make_state(settings));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("app");
    });
    addr
}

#[tokio::test]
async fn health_route_returns_ok() {
    let app = router(make_state(settings()));
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .expect("response");

    let (status, _, body) = read_body(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn unknown_route_returns_coded_404() {
    let app = router(make_state(settings()));
    let response = app
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .expect("response");

    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "VIEW-404");
}

#[tokio::test]
async fn resolve_storage_path() {
    let app = router(make_state(settings()));
    let payload = json!({ "resource": "resources/abc/lesson.pdf" });
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/resolve")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .expect("response");

    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["resource"]["title"], "lesson.pdf");
    assert_eq!(body["resolved"]["host_category"], "object_storage");
    assert_eq!(body["resolved"]["is_proxied"], true);
    assert_eq!(body["preview"], "pdf");
    assert!(body["resolved"]["final_url"]
        .as_str()
        .unwrap()
        .starts_with("http://127.0.0.1:3000/proxy?url="));
}

#[tokio::test]
async fn resolve_document_link_reports_alternate() {
    let app = router(make_state(settings()));
    let payload = json!({
        "resource": { "title": "Slides", "url": "https://docs.google.com/presentation/d/P1/edit" }
    });
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/resolve")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .expect("response");

    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resolved"]["host_category"], "document_host");
    assert_eq!(body["resolved"]["is_proxied"], false);
    assert_eq!(
        body["resolved"]["primary_embed"],
        "https://docs.google.com/presentation/d/P1/embed"
    );
    assert!(body["resolved"]["alternate_embed"].is_string());
    assert_eq!(body["preview"], "iframe");
}

#[tokio::test]
async fn resolve_rejects_resource_without_locator() {
    let app = router(make_state(settings()));
    let payload = json!({ "resource": { "title": "Orphan" } });
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/resolve")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .expect("response");

    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "VIEW-400");
}

#[tokio::test]
async fn embed_fragment_carries_generation_hooks() {
    let app = router(make_state(settings()));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/viewer/embed?url=https%3A%2F%2Fexample.com%2Fa.png&title=Diagram&generation=3&revision=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("response");

    let (status, _, body) = read_body(response).await;
    let html = String::from_utf8(body).expect("utf8");
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("<img"));
    assert!(html.contains("alt=\"Diagram\""));
    assert!(html.contains("viewerSignal('loaded', 3, 2)"));
    assert!(html.contains("viewerSignal('failed', 3, 2)"));
}

#[tokio::test]
async fn embed_rejects_script_urls() {
    let app = router(make_state(settings()));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/viewer/embed?url=javascript%3Aalert(1)")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("response");

    let (status, _, body) = read_body(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body).unwrap().contains("viewer-error"));
}

#[tokio::test]
async fn proxy_requires_target() {
    let app = router(make_state(settings()));
    let response = app
        .oneshot(Request::builder().uri("/proxy").body(Body::empty()).unwrap())
        .await
        .expect("response");

    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VIEW-400");
}

#[tokio::test]
async fn proxy_rejects_hosts_outside_allow_list() {
    let app = router(make_state(settings()));

    for target in [
        "https://example.com/a.pdf",
        "https://drive.google.com/file/d/ID123/view",
        "https://notamazonaws.com/a.pdf",
    ] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(proxy_uri(target))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("response");

        let (status, body) = read_json(response).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{target}");
        assert_eq!(body["code"], "PROXY-403");
    }
}

#[tokio::test]
async fn proxy_forwards_upstream_denial() {
    let upstream = spawn_upstream().await;
    let app = router(make_state(local_upstream_settings()));

    let response = app
        .oneshot(
            Request::builder()
                .uri(proxy_uri(&format!("http://{}/denied.pdf", upstream)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("response");

    let (status, headers, body) = read_body(response).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(headers[header::CONTENT_TYPE], "application/xml");
    assert!(String::from_utf8(body).unwrap().contains("AccessDenied"));
}

#[tokio::test]
async fn proxy_streams_body_and_guesses_missing_content_type() {
    let upstream = spawn_upstream().await;
    let app = router(make_state(local_upstream_settings()));

    let response = app
        .oneshot(
            Request::builder()
                .uri(proxy_uri(&format!("http://{}/lesson.pdf", upstream)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("response");

    let (status, headers, body) = read_body(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(body, b"%PDF-1.4 lesson");
}

#[tokio::test]
async fn proxy_forwards_range_requests() {
    let upstream = spawn_upstream().await;
    let app = router(make_state(local_upstream_settings()));

    let response = app
        .oneshot(
            Request::builder()
                .uri(proxy_uri(&format!("http://{}/clip.mp4", upstream)))
                .header(header::RANGE, "bytes=0-9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("response");

    let (status, headers, _) = read_body(response).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes=0-9 /1000");
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
}

#[tokio::test]
async fn proxy_reports_unreachable_upstream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let app = router(make_state(local_upstream_settings()));

    let response = app
        .oneshot(
            Request::builder()
                .uri(proxy_uri(&format!("http://{}/gone.pdf", addr)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("response");

    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "PROXY-502");
}

async fn next_json<S>(ws: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("ws timeout")
            .expect("ws closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("json");
        }
    }
}

#[tokio::test]
async fn ws_viewer_reaches_ready() {
    let addr = spawn_app(settings()).await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws/viewer", addr))
        .await
        .expect("connect");

    let open = json!({ "type": "open", "resource": "resources/abc/lesson.pdf" });
    ws.send(Message::Text(open.to_string())).await.expect("send");

    let ready = loop {
        let value = next_json(&mut ws).await;
        assert_eq!(value["type"], "session");
        if value["session"]["status"] == "ready" {
            break value;
        }
    };
    assert_eq!(ready["session"]["kind"], "pdf");
    assert_eq!(ready["session"]["title"], "lesson.pdf");
    let generation = ready["session"]["generation"].as_u64().unwrap();
    let revision = ready["session"]["revision"].as_u64().unwrap();

    let loaded = json!({ "type": "loaded", "generation": generation, "revision": revision });
    ws.send(Message::Text(loaded.to_string())).await.expect("send");
    let value = next_json(&mut ws).await;
    assert_eq!(value["session"]["loading"], false);

    ws.send(Message::Text(json!({ "type": "close" }).to_string()))
        .await
        .expect("send");
    let value = next_json(&mut ws).await;
    assert!(value["session"].is_null());
}

#[tokio::test]
async fn ws_link_mode_navigates() {
    let mut settings = settings();
    settings.viewer.document_host_mode = DocumentHostMode::Link;
    let addr = spawn_app(settings).await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws/viewer", addr))
        .await
        .expect("connect");

    let open = json!({
        "type": "open",
        "resource": { "url": "https://drive.google.com/file/d/ID123/view" }
    });
    ws.send(Message::Text(open.to_string())).await.expect("send");

    let navigate = loop {
        let value = next_json(&mut ws).await;
        if value["type"] == "navigate" {
            break value;
        }
        assert_ne!(value["session"]["status"], "ready");
    };
    assert_eq!(navigate["url"], "https://drive.google.com/file/d/ID123/preview");
}

#[tokio::test]
async fn ws_reports_malformed_messages() {
    let addr = spawn_app(settings()).await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws/viewer", addr))
        .await
        .expect("connect");

    ws.send(Message::Text(json!({ "type": "open", "resource": 7 }).to_string()))
        .await
        .expect("send");

    let value = next_json(&mut ws).await;
    assert_eq!(value["type"], "error");
}

#[tokio::test]
async fn ws_disconnect_after_close_leaves_server_usable() {
    let addr = spawn_app(settings()).await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws/viewer", addr))
        .await
        .expect("connect");
    ws.send(Message::Text(json!({ "type": "close" }).to_string()))
        .await
        .expect("send");
    let value = next_json(&mut ws).await;
    assert!(value["session"].is_null());
    ws.close(None).await.expect("close");
    drop(ws);

    let (mut ws, _) = connect_async(format!("ws://{}/ws/viewer", addr))
        .await
        .expect("reconnect");
    let open = json!({ "type": "open", "resource": "resources/abc/lesson.pdf" });
    ws.send(Message::Text(open.to_string())).await.expect("send");
    loop {
        let value = next_json(&mut ws).await;
        if value["session"]["status"] == "ready" {
            break;
        }
    }
}

#[tokio::test]
async fn proxy_refuses_its_own_urls() {
    let app = router(make_state(local_upstream_settings()));
    let response = app
        .oneshot(
            Request::builder()
                .uri(proxy_uri("http://127.0.0.1:3000/proxy?url=https%3A%2F%2Fexample.com"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("response");

    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VIEW-400");
}

#[tokio::test]
async fn proxy_answers_head_with_ranged_get() {
    let upstream = spawn_upstream().await;
    let app = router(make_state(local_upstream_settings()));

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::HEAD)
                .uri(proxy_uri(&format!("http://{}/presigned.pdf", upstream)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("response");

    let (status, headers, body) = read_body(response).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert!(headers.get(header::CONTENT_RANGE).is_none());
    assert!(body.is_empty());
}

#[tokio::test]
async fn preflight_through_proxy_accepts_get_only_objects() {
    let upstream = spawn_upstream().await;
    let app = spawn_app(local_upstream_settings()).await;
    let target = format!("http://{}/presigned.pdf", upstream);
    let proxied = format!("http://{}{}", app, proxy_uri(&target));

    let direct = reqwest::Client::new().head(&target).send().await.expect("head");
    assert_eq!(direct.status(), StatusCode::FORBIDDEN);

    let preflight = HttpPreflight::new(reqwest::Client::new());
    assert_eq!(preflight.check(&proxied).await, Ok(()));

    let fetched = reqwest::Client::new().get(&proxied).send().await.expect("get");
    assert_eq!(fetched.status(), StatusCode::OK);
    assert_eq!(fetched.text().await.expect("text"), "%PDF-1.4 signed");
}
