use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::{
    gemini::GeminiClient,
    history::HistoryStore,
    models::{FunnelStage, GenerationRequest, HistoryEntry, ImageSource},
    session::{Session, ViewSelection},
};

/// Uploads above this size are rejected with a user-facing message.
pub const MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;

/// One generic user-facing message covers service and contract failures; the
/// detailed diagnostic only goes to the log.
const GENERATION_FAILED_MESSAGE: &str = "Page generation failed. Please try again.";

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    pub history: Arc<HistoryStore>,
    pub gemini: Arc<GeminiClient>,
}

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

    fn session_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "session not found")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub async fn create_session(State(state): State<AppState>) -> Json<Session> {
    let session = Session::new();
    state.sessions.write().insert(session.id, session.clone());
    tracing::info!(session = %session.id, "created session");
    Json(session)
}

pub async fn get_session(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Session>, ApiError> {
    state
        .sessions
        .read()
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(ApiError::session_not_found)
}

pub async fn update_form(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(form): Json<GenerationRequest>,
) -> Result<Json<Session>, ApiError> {
    let mut sessions = state.sessions.write();
    let session = sessions.get_mut(&id).ok_or_else(ApiError::session_not_found)?;
    session.form = form;
    Ok(Json(session.clone()))
}

pub async fn update_view(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(view): Json<ViewSelection>,
) -> Result<Json<Session>, ApiError> {
    let mut sessions = state.sessions.write();
    let session = sessions.get_mut(&id).ok_or_else(ApiError::session_not_found)?;
    session.view = view;
    Ok(Json(session.clone()))
}

/// Accepts raw image bytes and stores them as an inline base64 source,
/// replacing any previous image source.
pub async fn upload_image(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Session>, ApiError> {
    if body.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "The file is too large. Please select an image under 4 MB.",
        ));
    }
    let format = image::guess_format(&body).map_err(|_| {
        ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "The file could not be read as an image. PNG, JPEG and WebP are supported.",
        )
    })?;
    let data = base64::engine::general_purpose::STANDARD.encode(&body);

    let mut sessions = state.sessions.write();
    let session = sessions.get_mut(&id).ok_or_else(ApiError::session_not_found)?;
    session.form.product_image = ImageSource::Inline {
        data,
        mime_type: format.to_mime_type().to_string(),
    };
    tracing::info!(session = %id, bytes = body.len(), "stored inline product image");
    Ok(Json(session.clone()))
}

pub async fn clear_image(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Session>, ApiError> {
    let mut sessions = state.sessions.write();
    let session = sessions.get_mut(&id).ok_or_else(ApiError::session_not_found)?;
    session.form.product_image = ImageSource::None;
    Ok(Json(session.clone()))
}

/// Runs one generation for the session's current form. Validation failures
/// block before any request is built; a second generate while one is in
/// flight is rejected; success appends a history entry and makes it active.
pub async fn generate(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Session>, ApiError> {
    // Validate and enter the loading state in one lock scope, then release
    // the lock for the duration of the external call.
    let request = {
        let mut sessions = state.sessions.write();
        let session = sessions.get_mut(&id).ok_or_else(ApiError::session_not_found)?;
        session
            .form
            .validate()
            .map_err(|e| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
        session
            .begin_generation()
            .map_err(|e| ApiError::new(StatusCode::CONFLICT, e.to_string()))?;
        session.form.clone()
    };

    tracing::info!(session = %id, "generating funnel for product: {}", request.display_name());

    match state.gemini.generate_funnel(&request).await {
        Ok(content) => {
            let entry = HistoryEntry::new(
                request.display_name(),
                content.pages.clone(),
                content.ad_creative.clone(),
            );
            state.history.append(entry.clone());

            let mut sessions = state.sessions.write();
            let session = sessions.get_mut(&id).ok_or_else(ApiError::session_not_found)?;
            session.complete_generation(content, entry.id);
            tracing::info!(session = %id, entry = %entry.id, "funnel generated");
            Ok(Json(session.clone()))
        }
        Err(e) => {
            tracing::error!(session = %id, "funnel generation failed: {e}");
            if let Some(session) = state.sessions.write().get_mut(&id) {
                session.fail_generation(GENERATION_FAILED_MESSAGE.to_string());
            }
            Err(ApiError::new(StatusCode::BAD_GATEWAY, GENERATION_FAILED_MESSAGE))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditPageBody {
    pub html_content: String,
}

/// Edits one stage's HTML in the session only; history changes on explicit
/// save.
pub async fn edit_page(
    Path((id, stage)): Path<(Uuid, FunnelStage)>,
    State(state): State<AppState>,
    Json(body): Json<EditPageBody>,
) -> Result<Json<Session>, ApiError> {
    let mut sessions = state.sessions.write();
    let session = sessions.get_mut(&id).ok_or_else(ApiError::session_not_found)?;
    session
        .edit_page(stage, body.html_content)
        .map_err(|e| ApiError::new(StatusCode::NOT_FOUND, e.to_string()))?;
    Ok(Json(session.clone()))
}

/// Overwrites the active history entry with the session's current content.
pub async fn save_to_history(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let (entry_id, pages, ad_creative, display_name) = {
        let sessions = state.sessions.read();
        let session = sessions.get(&id).ok_or_else(ApiError::session_not_found)?;
        let entry_id = session.active_history_id.ok_or_else(|| {
            ApiError::new(StatusCode::CONFLICT, "no active history entry to save to")
        })?;
        let result = session.result.as_ref().ok_or_else(|| {
            ApiError::new(StatusCode::CONFLICT, "nothing has been generated yet")
        })?;
        (
            entry_id,
            result.pages.clone(),
            result.ad_creative.clone(),
            session.form.display_name(),
        )
    };

    if !state.history.update(entry_id, pages, ad_creative, display_name) {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "history entry not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn load_history_entry(
    Path((id, entry_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
) -> Result<Json<Session>, ApiError> {
    let entry = state
        .history
        .entry(entry_id)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "history entry not found"))?;

    let mut sessions = state.sessions.write();
    let session = sessions.get_mut(&id).ok_or_else(ApiError::session_not_found)?;
    session.load_entry(&entry);
    Ok(Json(session.clone()))
}

pub async fn list_history(State(state): State<AppState>) -> Json<Vec<HistoryEntry>> {
    Json(state.history.list())
}

pub async fn delete_history_entry(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> StatusCode {
    if state.history.remove(id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Serves the stage's current HTML as a browser download, named from the
/// sanitized stage label.
pub async fn download_page(
    Path((id, stage)): Path<(Uuid, FunnelStage)>,
    State(state): State<AppState>,
) -> Response {
    let sessions = state.sessions.read();
    let Some(page) = sessions.get(&id).and_then(|s| s.page(stage)) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(
        axum::http::header::CONTENT_TYPE,
        "text/html; charset=utf-8".parse().unwrap(),
    );
    headers.insert(
        axum::http::header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{}\"", stage.export_file_name())
            .parse()
            .unwrap(),
    );
    (StatusCode::OK, headers, page.html_content.clone()).into_response()
}
