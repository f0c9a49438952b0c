use axum::{
    extract::State,
    routing::{get, post, put},
    Router,
    http::{HeaderValue, StatusCode, header, Method, Request},
    response::{Html, IntoResponse},
    body::Body,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod config;
pub mod db;
pub mod notify;
pub mod routes;

use config::Config;
use db::DbPool;
use notify::Mailer;

/// A project's running total after a donation was applied.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RaisedUpdate {
    pub project_id: String,
    pub raised: f64,
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub mailer: Mailer,
    pub raised_tx: broadcast::Sender<RaisedUpdate>,
    pub index_template: Option<Arc<str>>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let (raised_tx, _) = broadcast::channel(64);
        let index_path = std::path::Path::new(&config.static_dir).join("index.html");
        let index_template = match std::fs::read_to_string(&index_path) {
            Ok(html) => Some(Arc::from(html)),
            Err(_) => {
                tracing::warn!("No SPA bundle at {}, serving API only", index_path.display());
                None
            }
        };
        AppState {
            db,
            mailer: Mailer::new(config.mail.clone()),
            config: Arc::new(config),
            raised_tx,
            index_template,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = {
        let origins: Vec<HeaderValue> = state
            .config
            .allowed_origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid ALLOWED_ORIGINS entry: {}", o);
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
            .allow_credentials(true)
    };

    let static_files = ServeDir::new(&state.config.static_dir)
        .fallback(get(spa_fallback).with_state::<()>(state.clone()));

    Router::new()
        .route("/health", get(health_check))
        // Public API
        .route("/api/content", get(routes::content::get_content))
        .route("/api/content/news/{slug}", get(routes::content::get_news_item))
        .route("/api/projects", get(routes::projects::list_projects))
        .route("/api/projects/{id}", get(routes::projects::get_project))
        .route("/api/projects/{id}/events", get(routes::events::project_events))
        .route("/api/donations", post(routes::donations::create_donation))
        .route("/api/contact", post(routes::contact::create_contact_message))
        // Admin API
        .route("/api/me", get(auth::me))
        .route("/api/admin/donations", get(routes::admin::list_donations))
        .route("/api/admin/donations/export", get(routes::admin::export_donations_csv))
        .route("/api/admin/donations/{id}/status", put(routes::admin::update_donation_status))
        .route("/api/admin/messages", get(routes::admin::list_messages))
        .route("/api/admin/messages/{id}/responded", put(routes::admin::mark_message_responded))
        .route("/api/admin/projects", post(routes::admin::create_project))
        .route("/api/admin/projects/{id}", put(routes::admin::update_project))
        .route("/api/admin/stats", get(routes::admin::stats))
        // Auth Routes
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .fallback_service(static_files)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn spa_fallback(State(state): State<AppState>, req: Request<Body>) -> impl IntoResponse {
    let path = req.uri().path();
    if path.starts_with("/api/") {
        return StatusCode::NOT_FOUND.into_response();
    }
    match &state.index_template {
        Some(html) => Html(html.to_string()).into_response(),
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}
