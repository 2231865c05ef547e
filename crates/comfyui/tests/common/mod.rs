//! In-process mock of the ComfyUI HTTP API.
//!
//! Serves `/prompt`, `/history/{id}`, `/view`, `/upload/image`, `/queue`
//! and `/system_stats` from an axum router bound to an ephemeral port, and
//! records what the client sent so tests can assert on it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use miniyou_comfyui::{ComfyUIApi, GenerationMode, Generator, GeneratorConfig, PollConfig};

/// Job id handed out by the mock for every submission.
pub const PROMPT_ID: &str = "job-1";

/// Bytes served by `/view`. Not a real PNG; the client treats it as opaque.
pub const IMAGE_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nmock image payload \x00\x01\x02\xff";

/// What `/history/{id}` reports for the submitted job.
#[derive(Debug, Clone)]
pub enum HistoryBehaviour {
    /// Success with the given image descriptors.
    Success(Vec<Value>),
    /// Success with an empty outputs map.
    SuccessWithoutImages,
    /// `status_str: "error"` with an execution error message.
    Error,
    /// A record with a non-terminal status, forever.
    Processing,
    /// No record at all, forever.
    Queued,
}

pub struct MockComfyUI {
    pub behaviour: HistoryBehaviour,
    /// Status returned by `/prompt`.
    pub submit_status: StatusCode,
    /// Body returned by `/prompt` on success.
    pub submit_body: Value,
    pub system_stats_ok: bool,
    pub submitted: Mutex<Vec<Value>>,
    pub views: Mutex<Vec<HashMap<String, String>>>,
    pub deleted: Mutex<Vec<Value>>,
    pub uploads: Mutex<u32>,
    pub history_calls: Mutex<u32>,
}

impl MockComfyUI {
    pub fn new(behaviour: HistoryBehaviour) -> Self {
        Self {
            behaviour,
            submit_status: StatusCode::OK,
            submit_body: json!({"prompt_id": PROMPT_ID, "number": 0, "node_errors": {}}),
            system_stats_ok: true,
            submitted: Mutex::new(Vec::new()),
            views: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            uploads: Mutex::new(0),
            history_calls: Mutex::new(0),
        }
    }

    /// Success with a single `x.png` output on node 7.
    pub fn success() -> Self {
        Self::new(HistoryBehaviour::Success(vec![
            json!({"filename": "x.png", "subfolder": "", "type": "output"}),
        ]))
    }

    pub fn history_calls(&self) -> u32 {
        *self.history_calls.lock().unwrap()
    }

    pub fn last_submitted(&self) -> Value {
        self.submitted
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no workflow submitted")
    }
}

/// Start the mock server, returning its base URL.
pub async fn spawn(mock: MockComfyUI) -> (String, Arc<MockComfyUI>) {
    let state = Arc::new(mock);
    let app = Router::new()
        .route("/prompt", post(submit_prompt))
        .route("/history/{prompt_id}", get(history))
        .route("/view", get(view))
        .route("/upload/image", post(upload_image))
        .route("/queue", post(queue))
        .route("/system_stats", get(system_stats))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), state)
}

/// A base URL on which nothing is listening.
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Live-mode generator with a fast polling cadence.
pub fn generator(api_url: &str, interval: Duration, timeout: Duration) -> Generator {
    Generator::new(
        ComfyUIApi::new(api_url),
        GeneratorConfig {
            mode: GenerationMode::Live,
            poll: PollConfig { interval, timeout },
            ..Default::default()
        },
    )
}

async fn submit_prompt(
    State(mock): State<Arc<MockComfyUI>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    mock.submitted.lock().unwrap().push(body);
    if mock.submit_status.is_success() {
        (mock.submit_status, Json(mock.submit_body.clone()))
    } else {
        (
            mock.submit_status,
            Json(json!({"error": {"type": "prompt_outputs_failed_validation"}})),
        )
    }
}

async fn history(
    State(mock): State<Arc<MockComfyUI>>,
    Path(prompt_id): Path<String>,
) -> Json<Value> {
    *mock.history_calls.lock().unwrap() += 1;

    let entry = match &mock.behaviour {
        HistoryBehaviour::Success(images) => json!({
            "status": {"status_str": "success", "completed": true, "messages": []},
            "outputs": {"7": {"images": images}},
        }),
        HistoryBehaviour::SuccessWithoutImages => json!({
            "status": {"status_str": "success", "completed": true, "messages": []},
            "outputs": {},
        }),
        HistoryBehaviour::Error => json!({
            "status": {
                "status_str": "error",
                "completed": false,
                "messages": [["execution_error", {"node_id": "5", "exception_message": "out of memory"}]],
            },
            "outputs": {},
        }),
        HistoryBehaviour::Processing => json!({
            "status": {"status_str": "running", "completed": false, "messages": []},
            "outputs": {},
        }),
        HistoryBehaviour::Queued => return Json(json!({})),
    };

    let mut body = serde_json::Map::new();
    body.insert(prompt_id, entry);
    Json(Value::Object(body))
}

async fn view(
    State(mock): State<Arc<MockComfyUI>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    mock.views.lock().unwrap().push(params);
    IMAGE_BYTES.to_vec()
}

async fn upload_image(State(mock): State<Arc<MockComfyUI>>, _body: Bytes) -> Json<Value> {
    *mock.uploads.lock().unwrap() += 1;
    Json(json!({"name": "upload.png", "subfolder": "", "type": "input"}))
}

async fn queue(State(mock): State<Arc<MockComfyUI>>, Json(body): Json<Value>) -> StatusCode {
    mock.deleted.lock().unwrap().push(body);
    StatusCode::OK
}

async fn system_stats(State(mock): State<Arc<MockComfyUI>>) -> impl IntoResponse {
    if mock.system_stats_ok {
        (StatusCode::OK, Json(json!({"system": {"os": "posix"}, "devices": []})))
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})))
    }
}
