use axum::{
    extract::{State, Query, Json, Path},
    response::{IntoResponse, Json as AxumJson, Response},
    http::{HeaderValue, StatusCode, header},
};
use serde::Deserialize;
use crate::AppState;
use crate::auth::AdminUser;
use crate::db::{self, models::{DonationStatus, NewProject, ProjectUpdate, Donation}};

#[derive(Deserialize)]
pub struct DonationListParams {
    pub project_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

fn parse_status(raw: Option<&str>) -> Result<Option<DonationStatus>, String> {
    raw.filter(|s| !s.is_empty())
        .map(|s| s.parse::<DonationStatus>())
        .transpose()
}

pub async fn list_donations(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<DonationListParams>,
) -> impl IntoResponse {
    let status = match parse_status(params.status.as_deref()) {
        Ok(s) => s,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };
    match db::list_donations(&state.db, params.project_id.as_deref(), status).await {
        Ok(donations) => AxumJson(serde_json::json!({ "donations": donations })).into_response(),
        Err(e) => {
            tracing::error!("DB Query Error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response()
        }
    }
}

pub async fn update_donation_status(
    Path(id): Path<String>,
    State(state): State<AppState>,
    admin: AdminUser,
    Json(req): Json<StatusRequest>,
) -> impl IntoResponse {
    let status = match req.status.parse::<DonationStatus>() {
        Ok(s) => s,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };
    match db::set_donation_status(&state.db, &id, status).await {
        Ok(Some(donation)) => {
            tracing::info!(donation_id = %id, status = %status, by = %admin.username, "donation status changed");
            AxumJson(donation).into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, "Not found").into_response(),
        Err(e) => {
            tracing::error!("Update donation error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response()
        }
    }
}

fn donations_csv(list: &[Donation]) -> Result<Vec<u8>, csv::Error> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record([
        "id",
        "created_at",
        "name",
        "email",
        "amount",
        "project",
        "status",
        "transfer_confirmation",
        "verified_at",
        "payment_reference",
        "message",
    ])?;
    for d in list {
        let amount = format!("{:.2}", d.amount);
        let created = d.created_at.to_rfc3339();
        let verified = d.verified_at.map(|v| v.to_rfc3339()).unwrap_or_default();
        let project = d
            .project_title
            .as_deref()
            .or(d.project_name.as_deref())
            .unwrap_or_default();
        w.write_record([
            d.id.as_str(),
            created.as_str(),
            d.name.as_str(),
            d.email.as_str(),
            amount.as_str(),
            project,
            d.status.as_str(),
            d.transfer_confirmation.as_str(),
            verified.as_str(),
            d.payment_reference.as_deref().unwrap_or_default(),
            d.message.as_deref().unwrap_or_default(),
        ])?;
    }
    w.into_inner().map_err(|e| e.into_error().into())
}

pub async fn export_donations_csv(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<DonationListParams>,
) -> impl IntoResponse {
    let status = match parse_status(params.status.as_deref()) {
        Ok(s) => s,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };
    let list = match db::list_donations(&state.db, params.project_id.as_deref(), status).await {
        Ok(list) => list,
        Err(e) => {
            tracing::error!("DB Query Error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response();
        }
    };
    match donations_csv(&list) {
        Ok(body) => {
            let mut resp = Response::new(body.into());
            let headers = resp.headers_mut();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8"));
            headers.insert(header::CONTENT_DISPOSITION, HeaderValue::from_static("attachment; filename=donations.csv"));
            resp
        }
        Err(e) => {
            tracing::error!("CSV export failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Export Error").into_response()
        }
    }
}

pub async fn list_messages(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> impl IntoResponse {
    match db::list_contact_messages(&state.db).await {
        Ok(messages) => AxumJson(serde_json::json!({ "messages": messages })).into_response(),
        Err(e) => {
            tracing::error!("DB Query Error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response()
        }
    }
}

pub async fn mark_message_responded(
    Path(id): Path<String>,
    State(state): State<AppState>,
    _admin: AdminUser,
) -> impl IntoResponse {
    match db::mark_responded(&state.db, &id).await {
        Ok(true) => (StatusCode::OK, AxumJson(serde_json::json!({ "status": "updated", "id": id }))).into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, "Not found").into_response(),
        Err(e) => {
            tracing::error!("Mark responded error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response()
        }
    }
}

pub async fn create_project(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<NewProject>,
) -> impl IntoResponse {
    if req.title.trim().is_empty() || !req.target.is_finite() || req.target <= 0.0 {
        return (StatusCode::BAD_REQUEST, "Title and a positive target are required").into_response();
    }
    match db::create_project(&state.db, req).await {
        Ok(project) => (StatusCode::CREATED, AxumJson(project)).into_response(),
        Err(e) => {
            tracing::error!("Create project error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response()
        }
    }
}

pub async fn update_project(
    Path(id): Path<String>,
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<ProjectUpdate>,
) -> impl IntoResponse {
    if matches!(req.target, Some(t) if !t.is_finite() || t <= 0.0) {
        return (StatusCode::BAD_REQUEST, "Target must be positive").into_response();
    }
    match db::update_project(&state.db, &id, req).await {
        Ok(Some(project)) => AxumJson(project).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Not found").into_response(),
        Err(e) => {
            tracing::error!("Update project error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response()
        }
    }
}

pub async fn stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> impl IntoResponse {
    match db::stats(&state.db).await {
        Ok(stats) => AxumJson(stats).into_response(),
        Err(e) => {
            tracing::error!("Stats error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response()
        }
    }
}
