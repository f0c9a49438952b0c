use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json as AxumJson, Response},
};
use std::collections::BTreeMap;
use validator::ValidationErrors;

pub mod admin;
pub mod contact;
pub mod content;
pub mod donations;
pub mod events;
pub mod projects;

/// 400 body listing the failed rules per field.
pub fn validation_error(errors: &ValidationErrors) -> Response {
    let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (field, errs) in errors.field_errors() {
        let messages = errs
            .iter()
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string())
            })
            .collect();
        fields.insert(field.to_string(), messages);
    }
    (
        StatusCode::BAD_REQUEST,
        AxumJson(serde_json::json!({ "error": "validation", "fields": fields })),
    )
        .into_response()
}

/// Bodies that never decoded (not JSON, wrong content type, wrong value
/// types) get the same 400 shape as a failed rule.
pub fn rejection_error(rejection: JsonRejection) -> Response {
    tracing::debug!("Rejected request body: {}", rejection.body_text());
    (
        StatusCode::BAD_REQUEST,
        AxumJson(serde_json::json!({
            "error": "validation",
            "fields": { "body": [rejection.body_text()] },
        })),
    )
        .into_response()
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
