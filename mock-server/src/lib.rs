use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;
use uuid::Uuid;

pub const REQID_HEADER: &str = "x-reqid";
pub const LOG_HEADER: &str = "x-log";

pub type Db = Arc<RwLock<HashMap<String, Value>>>;

/// One part received by `/uploads`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size: usize,
    /// Part content when it is valid UTF-8.
    pub text: Option<String>,
}

/// Summary returned by `/blobs`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobReceipt {
    pub size: usize,
    pub content_type: Option<String>,
}

/// Failure answered as `{"error": "..."}`.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route(
            "/objects/{key}",
            get(get_object)
                .post(create_object)
                .put(replace_object)
                .patch(merge_object)
                .delete(delete_object),
        )
        .route("/forms", post(echo_form).put(echo_form).patch(echo_form))
        .route("/uploads", post(receive_upload).put(receive_upload).patch(receive_upload))
        .route("/blobs", post(receive_blob))
        .route("/status/{code}", get(status))
        .layer(middleware::from_fn(diagnostics))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Echo or assign `X-Reqid` and append `X-Log` lines describing the request.
async fn diagnostics(request: Request, next: Next) -> Response {
    let reqid = request
        .headers()
        .get(REQID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let route = format!("{} {}", request.method(), request.uri().path());

    let mut response = next.run(request).await;
    info!("{} -> {} (reqid {})", route, response.status(), reqid);

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&reqid) {
        headers.insert(REQID_HEADER, value);
    }
    for line in [format!("mock-server: {route}"), format!("user-agent: {user_agent}")] {
        if let Ok(value) = HeaderValue::from_str(&line) {
            headers.append(LOG_HEADER, value);
        }
    }
    response
}

async fn get_object(State(db): State<Db>, Path(key): Path<String>) -> Result<Json<Value>, ApiError> {
    let objects = db.read().await;
    objects
        .get(&key)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("object {key} not found")))
}

async fn create_object(
    State(db): State<Db>,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut objects = db.write().await;
    if objects.contains_key(&key) {
        return Err(ApiError::new(StatusCode::CONFLICT, format!("object {key} exists")));
    }
    objects.insert(key, value.clone());
    Ok((StatusCode::CREATED, Json(value)))
}

async fn replace_object(
    State(db): State<Db>,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> Json<Value> {
    db.write().await.insert(key, value.clone());
    Json(value)
}

/// Top-level keys of the patch overwrite those of the stored object.
async fn merge_object(
    State(db): State<Db>,
    Path(key): Path<String>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let mut objects = db.write().await;
    let stored = objects
        .get_mut(&key)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("object {key} not found")))?;
    match patch {
        Value::Object(fields) if stored.is_object() => {
            if let Some(target) = stored.as_object_mut() {
                target.extend(fields);
            }
        }
        other => *stored = other,
    }
    Ok(Json(stored.clone()))
}

async fn delete_object(State(db): State<Db>, Path(key): Path<String>) -> Result<StatusCode, ApiError> {
    let mut objects = db.write().await;
    objects
        .remove(&key)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("object {key} not found")))
}

async fn echo_form(Form(pairs): Form<Vec<(String, String)>>) -> Json<BTreeMap<String, Vec<String>>> {
    let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in pairs {
        values.entry(key).or_default().push(value);
    }
    Json(values)
}

async fn receive_upload(mut multipart: Multipart) -> Result<Json<Vec<UploadedPart>>, ApiError> {
    let mut parts = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
        parts.push(UploadedPart {
            name,
            file_name,
            content_type,
            size: data.len(),
            text: String::from_utf8(data.to_vec()).ok(),
        });
    }
    Ok(Json(parts))
}

async fn receive_blob(headers: HeaderMap, body: Bytes) -> Json<BlobReceipt> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Json(BlobReceipt {
        size: body.len(),
        content_type,
    })
}

/// Answer with the requested status: `{"code": n}` for 2xx (no body for
/// 204), `{"error": "status n"}` otherwise.
async fn status(Path(code): Path<u16>) -> Response {
    let Ok(status) = StatusCode::from_u16(code) else {
        return ApiError::new(StatusCode::BAD_REQUEST, format!("invalid status {code}")).into_response();
    };
    if status == StatusCode::NO_CONTENT {
        return status.into_response();
    }
    if status.is_success() {
        return (status, Json(json!({ "code": code }))).into_response();
    }
    ApiError::new(status, format!("status {code}")).into_response()
}
