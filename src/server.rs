use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, warn};

use crate::app::App;
use crate::client::{HealthStatus, ModelInfo};
use crate::controller::{Effect, Event, Key, View};
use crate::history::CaptionRecord;
use crate::intake::{CandidateFile, IntakeSource};

/// Request bodies may exceed the 10 MiB image limit so that oversize files
/// reach the validator instead of failing in the extractor.
const BODY_LIMIT: usize = 64 * 1024 * 1024;

const INDEX_HTML: &str = include_str!("../static/index.html");

type ApiError = (StatusCode, String);

/// Something the page must do on the user's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageAction {
    Copy { text: String },
    Share { text: String },
    Confirm { message: String },
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub view: View,
    pub action: Option<PageAction>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    pub key: Key,
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    #[serde(default)]
    pub native: bool,
}

#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub device: String,
    pub health: HealthStatus,
}

pub fn router(app: Arc<App>, static_dir: &Path) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/view", get(view))
        .route("/api/select", post(select))
        .route("/api/paste", post(paste))
        .route("/api/generate", post(generate))
        .route("/api/key", post(key))
        .route("/api/copy", post(copy))
        .route("/api/share", post(share))
        .route("/api/history", get(history))
        .route("/api/history/clear", post(clear_history))
        .route("/api/history/:index/image", get(history_image))
        .route("/api/status", get(status))
        .route("/api/model", get(model))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .with_state(app)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn view(State(app): State<Arc<App>>) -> Json<View> {
    Json(app.view())
}

fn respond(app: &App, effect: Option<Effect>) -> Json<ActionResponse> {
    let action = match effect {
        Some(Effect::CopyToClipboard(text)) => Some(PageAction::Copy { text }),
        Some(Effect::NativeShare(text)) => Some(PageAction::Share { text }),
        Some(Effect::ConfirmClear) => Some(PageAction::Confirm {
            message: "Clear all caption history? This cannot be undone.".to_string(),
        }),
        Some(Effect::Dispatch(_)) | None => None,
    };
    Json(ActionResponse {
        view: app.view(),
        action,
    })
}

fn bad_request(e: impl std::fmt::Display) -> ApiError {
    warn!("bad upload: {}", e);
    (StatusCode::BAD_REQUEST, e.to_string())
}

async fn read_file(field: axum::extract::multipart::Field<'_>) -> Result<CandidateFile, ApiError> {
    let file_name = field.file_name().unwrap_or("pasted-image").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = field.bytes().await.map_err(bad_request)?;
    Ok(CandidateFile::new(file_name, content_type, bytes.to_vec()))
}

/// Multipart fields: `source` (`drag_drop` or `file_picker`) and `file`.
async fn select(
    State(app): State<Arc<App>>,
    mut multipart: Multipart,
) -> Result<Json<ActionResponse>, ApiError> {
    let mut source = IntakeSource::FilePicker;
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("source") => {
                let raw = field.text().await.map_err(bad_request)?;
                source = serde_json::from_value(serde_json::Value::String(raw))
                    .map_err(bad_request)?;
            }
            Some("file") => file = Some(read_file(field).await?),
            _ => {}
        }
    }

    let file = file.ok_or_else(|| bad_request("missing file part"))?;
    let effect = app.submit(Event::FileOffered { source, file }).await;
    Ok(respond(&app, effect))
}

/// Every file part is one clipboard item, in clipboard order.
async fn paste(
    State(app): State<Arc<App>>,
    mut multipart: Multipart,
) -> Result<Json<ActionResponse>, ApiError> {
    let mut items = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        items.push(read_file(field).await?);
    }
    let effect = app.submit(Event::Pasted(items)).await;
    Ok(respond(&app, effect))
}

async fn generate(
    State(app): State<Arc<App>>,
    Json(request): Json<GenerateRequest>,
) -> Json<ActionResponse> {
    let effect = app
        .submit(Event::GenerateClicked {
            prompt: request.prompt,
        })
        .await;
    respond(&app, effect)
}

async fn key(State(app): State<Arc<App>>, Json(request): Json<KeyRequest>) -> Json<ActionResponse> {
    let effect = app
        .submit(Event::KeyPressed {
            key: request.key,
            prompt: request.prompt,
        })
        .await;
    respond(&app, effect)
}

async fn copy(State(app): State<Arc<App>>) -> Json<ActionResponse> {
    let effect = app.submit(Event::CopyRequested).await;
    respond(&app, effect)
}

async fn share(
    State(app): State<Arc<App>>,
    Json(request): Json<ShareRequest>,
) -> Json<ActionResponse> {
    let effect = app
        .submit(Event::ShareRequested {
            native_share: request.native,
        })
        .await;
    respond(&app, effect)
}

async fn clear_history(
    State(app): State<Arc<App>>,
    Json(request): Json<ClearRequest>,
) -> Json<ActionResponse> {
    let effect = app
        .submit(Event::ClearHistoryRequested {
            confirmed: request.confirmed,
        })
        .await;
    respond(&app, effect)
}

async fn history(State(app): State<Arc<App>>) -> Json<Vec<CaptionRecord>> {
    Json(app.history())
}

async fn history_image(State(app): State<Arc<App>>, UrlPath(index): UrlPath<usize>) -> Response {
    match app.history_image(index) {
        Some((content_type, bytes)) => ([(header::CONTENT_TYPE, content_type)], bytes).into_response(),
        None => (StatusCode::NOT_FOUND, "no such history image").into_response(),
    }
}

async fn status(State(app): State<Arc<App>>) -> Json<StatusResponse> {
    let health = app.refresh_status().await;
    Json(StatusResponse {
        device: health.device_label(),
        health,
    })
}

async fn model(State(app): State<Arc<App>>) -> Result<Json<ModelInfo>, ApiError> {
    app.client().model_info().await.map(Json).map_err(|e| {
        error!("model info unavailable: {}", e);
        (StatusCode::BAD_GATEWAY, e.to_string())
    })
}
