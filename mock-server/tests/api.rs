use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, Part, Person};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

// --- fixtures ---

#[tokio::test]
async fn person_is_json() {
    let resp = app().oneshot(get("/person")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[http::header::CONTENT_TYPE], "application/json");
    let person: Person = body_json(resp).await;
    assert_eq!(person.id, 1);
    assert_eq!(person.name, "x");
}

#[tokio::test]
async fn person_yaml_is_yaml() {
    let resp = app().oneshot(get("/person.yaml")).await.unwrap();

    assert_eq!(resp.headers()[http::header::CONTENT_TYPE], "application/yaml");
    assert_eq!(body_bytes(resp).await, "id: 2\nname: yaml\n");
}

#[tokio::test]
async fn number_is_plain_text() {
    let resp = app().oneshot(get("/number")).await.unwrap();
    assert_eq!(body_bytes(resp).await, "42");
}

// --- status ---

#[tokio::test]
async fn status_echoes_code_and_body() {
    let resp = app()
        .oneshot(get("/status/404?body=missing"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_bytes(resp).await, "missing");
}

#[tokio::test]
async fn status_without_body_is_empty() {
    let resp = app().oneshot(get("/status/503")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_bytes(resp).await.is_empty());
}

// --- echo ---

#[tokio::test]
async fn echo_returns_body_and_content_type() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/echo")
                .header(http::header::CONTENT_TYPE, "text/plain")
                .body("hi there".to_string())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.headers()[http::header::CONTENT_TYPE], "text/plain");
    assert_eq!(body_bytes(resp).await, "hi there");
}

#[tokio::test]
async fn query_is_returned_raw() {
    let resp = app().oneshot(get("/query?k1=v1&k2=v2")).await.unwrap();
    assert_eq!(body_bytes(resp).await, "k1=v1&k2=v2");
}

#[tokio::test]
async fn header_values_are_joined() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/headers/x-trace")
                .header("x-trace", "1")
                .header("x-trace", "2")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_bytes(resp).await, "1,2");
}

#[tokio::test]
async fn method_reports_extension_verbs() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("UPDATE")
                .uri("/method")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_bytes(resp).await, "UPDATE");
}

// --- upload ---

#[tokio::test]
async fn upload_lists_parts() {
    let body = "--B\r\n\
                Content-Disposition: form-data; name=\"field\"\r\n\r\n\
                value\r\n\
                --B\r\n\
                Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
                Content-Type: application/octet-stream\r\n\r\n\
                content\r\n\
                --B--\r\n";
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header(http::header::CONTENT_TYPE, "multipart/form-data; boundary=B")
                .body(body.to_string())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let parts: Vec<Part> = body_json(resp).await;
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].name, "field");
    assert_eq!(parts[0].content, "value");
    assert_eq!(parts[1].file_name.as_deref(), Some("a.txt"));
    assert_eq!(parts[1].content_type.as_deref(), Some("application/octet-stream"));
    assert_eq!(parts[1].content, "content");
}

#[tokio::test]
async fn upload_rejects_non_multipart() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .body("plain".to_string())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}

// --- slow ---

#[tokio::test]
async fn slow_eventually_answers() {
    let resp = app().oneshot(get("/slow/10")).await.unwrap();
    assert_eq!(body_bytes(resp).await, "done");
}
