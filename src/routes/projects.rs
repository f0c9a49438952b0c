use axum::{
    extract::{State, Query, Path},
    response::{IntoResponse, Json as AxumJson},
    http::StatusCode,
};
use serde::Deserialize;
use crate::AppState;
use crate::db::{self, models::{Project, ProjectStatus}};

#[derive(Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

/// Project as JSON plus its funding `progress` percentage.
fn with_progress(project: &Project) -> serde_json::Value {
    let mut value = serde_json::to_value(project).unwrap_or_default();
    value["progress"] = serde_json::json!(project.progress_percent());
    value
}

pub async fn list_projects(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let status = match params.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => match raw.parse::<ProjectStatus>() {
            Ok(s) => Some(s),
            Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
        },
        None => None,
    };

    match db::list_projects(&state.db, status).await {
        Ok(projects) => {
            let projects: Vec<_> = projects.iter().map(with_progress).collect();
            AxumJson(serde_json::json!({ "projects": projects })).into_response()
        }
        Err(e) => {
            tracing::error!("DB Query Error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response()
        }
    }
}

pub async fn get_project(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match db::get_project(&state.db, &id).await {
        Ok(Some(project)) => AxumJson(with_progress(&project)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Not found").into_response(),
        Err(e) => {
            tracing::error!("DB Query Error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response()
        }
    }
}
