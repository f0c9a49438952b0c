use axum::{
    extract::{rejection::JsonRejection, State, Json},
    response::{IntoResponse, Json as AxumJson},
    http::StatusCode,
};
use serde::Deserialize;
use validator::Validate;
use crate::AppState;
use crate::db::{self, models::NewContactMessage};
use super::{non_empty, rejection_error, validation_error};

#[derive(Deserialize, Validate, Debug, Default)]
#[serde(default)]
pub struct ContactRequest {
    #[validate(length(min = 1, max = 200, message = "Please enter your name."))]
    pub name: String,
    #[validate(email(message = "Please enter a valid email address."))]
    pub email: String,
    #[validate(length(max = 200, message = "Subject is too long."))]
    pub subject: Option<String>,
    #[validate(length(min = 1, max = 5000, message = "Please enter a message."))]
    pub message: String,
}

pub async fn create_contact_message(
    State(state): State<AppState>,
    payload: Result<Json<ContactRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return rejection_error(rejection),
    };
    let req = ContactRequest {
        name: req.name.trim().to_string(),
        email: req.email.trim().to_string(),
        subject: non_empty(req.subject),
        message: req.message.trim().to_string(),
    };
    if let Err(errors) = req.validate() {
        return validation_error(&errors);
    }

    match db::add_contact_message(
        &state.db,
        NewContactMessage {
            name: req.name,
            email: req.email,
            subject: req.subject,
            message: req.message,
        },
    )
    .await
    {
        Ok(msg) => (
            StatusCode::CREATED,
            AxumJson(serde_json::json!({ "status": "created", "id": msg.id })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Contact message insert failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response()
        }
    }
}
