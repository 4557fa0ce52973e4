use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::pipeline::{PromptPreview, ReportRequest, trigger_generation};
use crate::session::SessionView;

pub async fn create_session(
    State(state): State<AppState>,
) -> AppResult<(StatusCode, Json<SessionView>)> {
    let view = state.sessions.create().await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SessionView>> {
    Ok(Json(state.sessions.view(id).await?))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.sessions.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_form(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(form): Json<ReportRequest>,
) -> AppResult<Json<SessionView>> {
    let view = state
        .sessions
        .with_session(id, |s| {
            s.update_form(form)?;
            Ok(s.view())
        })
        .await?;
    Ok(Json(view))
}

pub async fn preview_prompt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PromptPreview>> {
    let view = state.sessions.view(id).await?;
    Ok(Json(PromptPreview::new(&view.form)))
}

pub async fn generate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SessionView>> {
    let view = trigger_generation(&state.sessions, &state.llm_client, id).await?;
    Ok(Json(view))
}

pub async fn export_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let artifact = state
        .sessions
        .with_session(id, |s| {
            s.report()
                .map(|r| r.export())
                .ok_or_else(|| AppError::NotFound(format!("Session {id} has no report")))
        })
        .await?;

    let disposition = HeaderValue::from_str(&artifact.content_disposition())
        .map_err(|e| AppError::Internal(format!("invalid content-disposition: {e}")))?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response())
}
