use axum::{
    extract::{rejection::JsonRejection, State, Json},
    response::{IntoResponse, Json as AxumJson},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};
use crate::AppState;
use crate::RaisedUpdate;
use crate::db::{self, models::NewDonation};
use super::{non_empty, rejection_error, validation_error};

/// The form posts the amount as typed text; API clients may send a number.
/// An absent or `null` amount decodes as `Missing` and fails validation.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(untagged)]
pub enum AmountInput {
    Number(f64),
    Text(String),
    #[default]
    Missing,
}

impl AmountInput {
    pub fn value(&self) -> Option<f64> {
        let parsed = match self {
            AmountInput::Number(n) => *n,
            AmountInput::Text(s) => s.trim().parse::<f64>().ok()?,
            AmountInput::Missing => return None,
        };
        (parsed.is_finite() && parsed > 0.0).then_some(parsed)
    }
}

fn validate_amount(amount: &AmountInput) -> Result<(), ValidationError> {
    match amount.value() {
        Some(_) => Ok(()),
        None => Err(ValidationError::new("amount")
            .with_message("Please enter a valid donation amount.".into())),
    }
}

#[derive(Deserialize, Validate, Debug, Default)]
#[serde(default)]
pub struct CreateDonationRequest {
    #[validate(length(min = 2, message = "Name must be at least 2 characters."))]
    pub name: String,
    #[validate(email(message = "Please enter a valid email address."))]
    pub email: String,
    #[validate(custom(function = "validate_amount"))]
    pub amount: AmountInput,
    #[validate(length(max = 2000, message = "Message is too long."))]
    pub message: Option<String>,
    #[serde(alias = "transferConfirmation")]
    #[validate(length(min = 2, message = "Please confirm your transfer."))]
    pub transfer_confirmation: String,
    #[serde(alias = "projectId")]
    pub project_id: Option<String>,
    pub payment_reference: Option<String>,
}

impl CreateDonationRequest {
    fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.email = self.email.trim().to_string();
        self.transfer_confirmation = self.transfer_confirmation.trim().to_string();
        self.message = non_empty(self.message);
        self.project_id = non_empty(self.project_id);
        self.payment_reference = non_empty(self.payment_reference);
        self
    }
}

pub async fn create_donation(
    State(state): State<AppState>,
    payload: Result<Json<CreateDonationRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = match payload {
        Ok(Json(req)) => req.normalized(),
        Err(rejection) => return rejection_error(rejection),
    };
    if let Err(errors) = req.validate() {
        return validation_error(&errors);
    }
    let Some(amount) = req.amount.value() else {
        return (StatusCode::BAD_REQUEST, "Invalid amount").into_response();
    };

    // Resolve the campaign server-side so the stored title cannot be spoofed.
    let project = match &req.project_id {
        Some(project_id) => match db::get_project(&state.db, project_id).await {
            Ok(Some(p)) => Some(p),
            Ok(None) => return (StatusCode::NOT_FOUND, "Project not found").into_response(),
            Err(e) => {
                tracing::error!("Project lookup failed: {}", e);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response();
            }
        },
        None => None,
    };

    let donation = match db::add_donation(
        &state.db,
        NewDonation {
            name: req.name,
            email: req.email,
            amount,
            message: req.message,
            project_id: project.as_ref().map(|p| p.id.clone()),
            project_name: project.as_ref().map(|p| p.title.clone()),
            transfer_confirmation: req.transfer_confirmation,
            payment_reference: req.payment_reference,
        },
    ).await {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("DB Error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response();
        }
    };
    tracing::info!(donation_id = %donation.id, amount, "donation recorded");

    // The pledge is stored; a failed total bump is logged and not reported as failure.
    let mut raised = None;
    if let Some(project) = &project {
        match db::increment_project_raised(&state.db, &project.id, amount).await {
            Ok(Some(total)) => {
                raised = Some(total);
                // No subscribers is not an error.
                let _ = state.raised_tx.send(RaisedUpdate {
                    project_id: project.id.clone(),
                    raised: total,
                });
            }
            Ok(None) => tracing::warn!("Project {} vanished before its total was updated", project.id),
            Err(e) => tracing::warn!("Raised total update failed for {}: {}", project.id, e),
        }
    }

    if state.mailer.enabled() {
        let mailer = state.mailer.clone();
        let email = mailer.donation_email(
            &donation.email,
            &donation.name,
            donation.amount,
            donation.project_name.as_deref(),
        );
        tokio::spawn(async move {
            if let Err(e) = mailer.send(&email).await {
                tracing::warn!("Donation e-mail to {} failed: {}", email.to, e);
            }
        });
    }

    (
        StatusCode::CREATED,
        AxumJson(serde_json::json!({
            "status": "created",
            "id": donation.id,
            "project_id": donation.project_id,
            "raised": raised,
        })),
    )
        .into_response()
}
