use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::auth::AdminAuth;
use crate::constants::{DEFAULT_ACTIVITY_LIMIT, MAX_ACTIVITY_LIMIT};
use crate::export::spreadsheet::XLSX_CONTENT_TYPE;
use crate::export::{prepare_export, PrepareMode};
use crate::response::{created, ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_exports))
        .route("/prepare", post(prepare))
        .route("/:id", get(get_export))
        .route("/:id/file", get(download_file))
        .route("/:id/upload", post(upload))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrepareResponse {
    export_id: String,
    messages: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    export_id: String,
    file_name: String,
    server: String,
    message: String,
}

/// Manual run: ignores the enable flag, reports every skip as an error.
async fn prepare(
    _admin: AdminAuth,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let _running = state.export_lock().lock().await;
    let settings = state.store().get_export_settings()?;
    let now = chrono::Local::now().naive_local();

    let report = prepare_export(
        state.host_db(),
        state.store(),
        &settings,
        now,
        PrepareMode::Interactive,
    )
    .await?;

    let export_id = report
        .export_id()
        .map(str::to_string)
        .ok_or_else(|| AppError::internal("interactive preparation returned no export"))?;
    Ok(created(PrepareResponse {
        export_id,
        messages: report.messages,
    }))
}

async fn list_exports(
    _admin: AdminAuth,
    Query(q): Query<ListQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let limit = q
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT);
    let exports = state.store().list_exports(limit)?;
    Ok(ok(exports))
}

async fn get_export(
    _admin: AdminAuth,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let export = state
        .store()
        .get_export(&id)?
        .ok_or_else(|| AppError::not_found("Export not found"))?;
    Ok(ok(export))
}

async fn download_file(
    _admin: AdminAuth,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let export = state
        .store()
        .get_export(&id)?
        .ok_or_else(|| AppError::not_found("Export not found"))?;
    let file_url = export
        .xlsx_file
        .ok_or_else(|| AppError::not_found("No XLSX file attached to this export"))?;
    let file = state
        .store()
        .get_file_by_url(&file_url)?
        .ok_or_else(|| AppError::not_found("Attached file not found"))?;
    let content = state
        .store()
        .get_file_content(&file.id)?
        .ok_or_else(|| AppError::not_found("Attached file has no content"))?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file.file_name))
        .map_err(|e| AppError::internal(&e.to_string()))?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(XLSX_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    )
        .into_response())
}

async fn upload(
    _admin: AdminAuth,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let _running = state.export_lock().lock().await;
    let settings = state.store().get_export_settings()?;
    let now = chrono::Local::now().naive_local();

    let report = state
        .uploader()
        .upload_export(state.store(), &settings, &id, now)
        .await?;
    Ok(ok(UploadResponse {
        export_id: report.export_id,
        file_name: report.file_name,
        server: report.server,
        message: report.message,
    }))
}
