//! Shared fixtures for integration tests: image bytes and an in-process
//! stand-in for the captioning backend.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};

/// What the fake backend saw in one caption request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub file_name: Option<String>,
    pub image_len: usize,
    pub prompt: Option<String>,
}

struct Fake {
    status: StatusCode,
    body: Value,
    health: Value,
    received: Arc<Mutex<Vec<Received>>>,
}

pub struct FakeBackend {
    pub url: String,
    pub received: Arc<Mutex<Vec<Received>>>,
}

impl FakeBackend {
    #[allow(dead_code)]
    pub fn requests(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}

async fn caption(State(fake): State<Arc<Fake>>, mut multipart: Multipart) -> (StatusCode, Json<Value>) {
    let mut received = Received {
        file_name: None,
        image_len: 0,
        prompt: None,
    };
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                received.file_name = field.file_name().map(str::to_string);
                received.image_len = field.bytes().await.unwrap().len();
            }
            Some("prompt") => received.prompt = Some(field.text().await.unwrap()),
            _ => {}
        }
    }
    fake.received.lock().unwrap().push(received);
    (fake.status, Json(fake.body.clone()))
}

async fn health(State(fake): State<Arc<Fake>>) -> Json<Value> {
    Json(fake.health.clone())
}

async fn model_info() -> Json<Value> {
    Json(json!({
        "model_name": "Salesforce/blip-image-captioning-base",
        "device": "cuda",
        "model_loaded": true,
        "supported_formats": ["png", "jpg", "jpeg", "gif", "bmp"],
        "max_file_size_mb": 10
    }))
}

/// Starts a backend on an ephemeral port that answers every caption request
/// with `status` and `body`.
pub async fn spawn_backend(status: StatusCode, body: Value) -> FakeBackend {
    spawn_backend_with_health(
        status,
        body,
        json!({
            "status": "healthy",
            "device": "cuda",
            "model_loaded": true,
            "timestamp": 1_760_000_000.5
        }),
    )
    .await
}

/// Like [`spawn_backend`], with a custom `/health` body.
pub async fn spawn_backend_with_health(status: StatusCode, body: Value, health: Value) -> FakeBackend {
    let received = Arc::new(Mutex::new(Vec::new()));
    let fake = Arc::new(Fake {
        status,
        body,
        health,
        received: Arc::clone(&received),
    });
    let router = Router::new()
        .route("/api/caption", post(caption))
        .route("/health", get(self::health))
        .route("/api/models/info", get(model_info))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    FakeBackend {
        url: format!("http://{addr}"),
        received,
    }
}

#[allow(dead_code)]
pub async fn spawn_success(caption: &str, inference_time: f64) -> FakeBackend {
    spawn_backend(
        StatusCode::OK,
        json!({ "success": true, "caption": caption, "inference_time": inference_time }),
    )
    .await
}

/// A URL nothing listens on.
#[allow(dead_code)]
pub const UNREACHABLE: &str = "http://127.0.0.1:1";

#[allow(dead_code)]
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .unwrap();
    bytes
}
