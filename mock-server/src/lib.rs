use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, RawQuery},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub name: String,
}

/// One received multipart part, as reported by `/upload`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub content: String,
}

#[derive(Deserialize)]
pub struct StatusParams {
    pub body: Option<String>,
}

pub fn app() -> Router {
    Router::new()
        .route("/person", get(person))
        .route("/person.yaml", get(person_yaml))
        .route("/text", get(text))
        .route("/number", get(number))
        .route("/status/{code}", get(status).post(status))
        .route("/echo", post(echo).put(echo).patch(echo))
        .route("/query", get(query))
        .route("/headers/{name}", get(header_values))
        .route("/method", any(method))
        .route("/upload", post(upload))
        .route("/slow/{ms}", get(slow))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn person() -> Json<Person> {
    Json(Person {
        id: 1,
        name: "x".to_string(),
    })
}

async fn person_yaml() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/yaml")],
        "id: 2\nname: yaml\n",
    )
}

async fn text() -> &'static str {
    "hello world"
}

async fn number() -> &'static str {
    "42"
}

/// Respond with `code` and the `body` query parameter, if any.
async fn status(Path(code): Path<u16>, Query(params): Query<StatusParams>) -> impl IntoResponse {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, params.body.unwrap_or_default())
}

async fn echo(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    ([(header::CONTENT_TYPE, content_type)], body)
}

async fn query(RawQuery(query): RawQuery) -> String {
    query.unwrap_or_default()
}

/// Comma-joined values of the named request header.
async fn header_values(Path(name): Path<String>, headers: HeaderMap) -> String {
    headers
        .get_all(name.as_str())
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join(",")
}

async fn method(method: Method) -> String {
    method.to_string()
}

async fn upload(mut multipart: Multipart) -> Result<Json<Vec<Part>>, StatusCode> {
    let mut parts = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let content = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
        parts.push(Part {
            name,
            file_name,
            content_type,
            content,
        });
    }
    Ok(Json(parts))
}

async fn slow(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "done"
}
