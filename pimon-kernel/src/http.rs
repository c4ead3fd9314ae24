/**
 * API REST PIMON - Serveur HTTP du moniteur
 *
 * RÔLE :
 * Expose la télémétrie du Pi, le proxy chat IA, le journal des échanges et
 * la description d'images au dashboard web (fichiers statiques servis ici).
 *
 * FONCTIONNEMENT :
 * - Routes : /health, /api/system, /api/chat, /api/logs, /api/image, /logs
 * - Toute autre requête GET → fichiers statiques (index.html, assets)
 * - Erreurs : corps `{error}` avec un message fixe par type d'échec, le
 *   détail interne ne part que dans les logs
 * - Aucune authentification : service destiné au réseau local
 */

use crate::caption::CaptionRunner;
use crate::chat::{ChatError, ChatProxy};
use crate::models::{CaptionReply, ChatReply, ChatRequest};
use crate::ports::{ChatExchange, SharedLog};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pimon_telemetry::{TelemetryCollector, TelemetrySnapshot};
use std::path::Path;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub telemetry: Arc<TelemetryCollector>,
    pub chat: Arc<ChatProxy>,
    pub logs: SharedLog,
    pub captions: Arc<CaptionRunner>,
}

/// Erreur HTTP : statut + message destiné au client
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
}

impl ApiError {
    fn new(status: StatusCode, message: &'static str) -> Self {
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::MissingMessage => {
                ApiError::new(StatusCode::BAD_REQUEST, "No message provided")
            }
            ChatError::Timeout(_) => {
                ApiError::new(StatusCode::GATEWAY_TIMEOUT, "AI request timed out")
            }
            ChatError::UpstreamUnreachable(_) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to connect to AI")
            }
            ChatError::InvalidUpstreamResponse(_) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Invalid response from AI")
            }
        }
    }
}

pub fn build_router(app_state: AppState, static_dir: &Path) -> Router {
    let upload_limit = app_state.captions.max_upload_bytes();

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/system", get(get_system))
        .route("/api/chat", post(post_chat))
        .route("/api/logs", get(get_logs))
        .route(
            "/api/image",
            post(post_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route_service("/logs", ServeFile::new(static_dir.join("logs.html")))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

// GET /api/system (snapshot télémétrie)
async fn get_system(State(app): State<AppState>) -> Result<Json<TelemetrySnapshot>, ApiError> {
    let telemetry = Arc::clone(&app.telemetry);
    match tokio::spawn(async move { telemetry.snapshot().await }).await {
        Ok(snapshot) => Ok(Json(snapshot)),
        Err(e) => {
            error!("telemetry task failed: {}", e);
            Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to retrieve system info"))
        }
    }
}

// POST /api/chat
async fn post_chat(
    State(app): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    // corps illisible = pas de message
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("rejected chat body: {}", rejection);
            ChatRequest::default()
        }
    };
    Ok(Json(app.chat.chat(request).await?))
}

// GET /api/logs (plus récent en premier)
async fn get_logs(State(app): State<AppState>) -> Result<Json<Vec<ChatExchange>>, ApiError> {
    let logs = Arc::clone(&app.logs);
    match tokio::task::spawn_blocking(move || logs.list_all()).await {
        Ok(Ok(rows)) => Ok(Json(rows)),
        Ok(Err(e)) => {
            error!("failed to retrieve logs: {}", e);
            Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to retrieve logs"))
        }
        Err(e) => {
            error!("log listing task failed: {}", e);
            Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to retrieve logs"))
        }
    }
}

// POST /api/image (multipart, champ `image`)
async fn post_image(
    State(app): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<CaptionReply>, ApiError> {
    let no_image = || ApiError::new(StatusCode::BAD_REQUEST, "No image uploaded.");

    let mut multipart = multipart.map_err(|rejection| {
        warn!("rejected image upload: {}", rejection);
        no_image()
    })?;

    let mut upload = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("malformed multipart body: {}", e);
                return Err(no_image());
            }
        };
        if field.name() != Some("image") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| {
            warn!("failed to read uploaded image: {}", e);
            no_image()
        })?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) = upload
        .filter(|(_, bytes)| !bytes.is_empty())
        .ok_or_else(no_image)?;

    match app.captions.describe(&bytes, file_name.as_deref()).await {
        Ok(description) => Ok(Json(CaptionReply { description })),
        Err(e) => {
            error!("image analysis failed: {}", e);
            Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Image analysis failed."))
        }
    }
}
