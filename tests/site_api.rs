use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use foundation_site::auth::{create_jwt, AdminProfile};
use foundation_site::config::Config;
use foundation_site::db::{self, models::DonationStatus, DbPool};
use foundation_site::{build_router, AppState, RaisedUpdate};

const DEMO_PROJECT: &str = "clean-water-init-001";

async fn setup_with(config: Config) -> (Router, AppState) {
    let pool = db::init_pool(&config).await.expect("init pool");
    db::ensure_demo_projects(&pool).await.expect("seed");
    let state = AppState::new(pool, config);
    (build_router(state.clone()), state)
}

async fn setup() -> (Router, DbPool, String) {
    let (app, state) = setup_with(Config::for_sqlite(":memory:")).await;
    (app, state.db.clone(), state.config.jwt_secret.clone())
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.expect("response");
    let status = resp.status();
    let bytes = resp.into_body().collect().await.expect("body").to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn admin_get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut req = Request::get(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    req.body(Body::empty()).expect("request")
}

fn admin_send(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => req.body(Body::empty()),
    }
    .expect("request")
}

/// Reads SSE frames until one full event has arrived.
async fn next_event(body: &mut Body) -> String {
    let mut text = String::new();
    while !text.contains("\n\n") {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("event in time")
            .expect("stream open")
            .expect("frame");
        if let Ok(data) = frame.into_data() {
            text.push_str(&String::from_utf8_lossy(&data));
        }
    }
    text
}

fn donation_body(amount: &str) -> Value {
    json!({
        "name": "Ada Obi",
        "email": "ada@example.com",
        "amount": amount,
        "transfer_confirmation": "done",
        "project_id": DEMO_PROJECT,
    })
}

fn admin_token(secret: &str) -> String {
    let user = AdminProfile {
        username: "admin".to_string(),
        role: "admin".to_string(),
    };
    create_jwt(&user, secret).expect("jwt")
}

#[tokio::test]
async fn donation_is_stored_pending_and_bumps_the_total() {
    let (app, pool, _) = setup().await;
    let before = db::get_project(&pool, DEMO_PROJECT).await.expect("get").expect("project");

    let (status, body) = send(
        &app,
        post_json(
            "/api/donations",
            json!({
                "name": "Ada Obi",
                "email": "ada@example.com",
                "amount": "1500",
                "transferConfirmation": "Sent from GTBank",
                "projectId": DEMO_PROJECT,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["raised"], json!(before.raised + 1500.0));

    let donations = db::list_donations(&pool, Some(DEMO_PROJECT), None).await.expect("list");
    assert_eq!(donations.len(), 1);
    let donation = &donations[0];
    assert_eq!(donation.status, DonationStatus::Pending);
    assert_eq!(donation.amount, 1500.0);
    assert_eq!(donation.project_name.as_deref(), Some("Clean Water Initiative"));
    assert_eq!(body["id"], json!(donation.id));

    let after = db::get_project(&pool, DEMO_PROJECT).await.expect("get").expect("project");
    assert_eq!(after.raised, before.raised + 1500.0);
}

#[tokio::test]
async fn general_donation_leaves_projects_untouched() {
    let (app, pool, _) = setup().await;
    let (status, body) = send(
        &app,
        post_json(
            "/api/donations",
            json!({
                "name": "Ada Obi",
                "email": "ada@example.com",
                "amount": 250,
                "transfer_confirmation": "done",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["raised"].is_null());

    let donations = db::list_donations(&pool, None, None).await.expect("list");
    assert_eq!(donations.len(), 1);
    assert!(donations[0].project_id.is_none());
}

#[tokio::test]
async fn invalid_donations_are_rejected_without_writes() {
    let (app, pool, _) = setup().await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/donations",
            json!({
                "name": "Ada",
                "email": "not-an-email",
                "amount": "-5",
                "transfer_confirmation": "done",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    assert!(body["fields"].get("email").is_some());
    assert!(body["fields"].get("amount").is_some());

    let (status, _) = send(
        &app,
        post_json(
            "/api/donations",
            json!({
                "name": "Ada",
                "email": "ada@example.com",
                "amount": "12",
                "transfer_confirmation": "done",
                "project_id": "no-such-project",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(db::list_donations(&pool, None, None).await.expect("list").is_empty());
}

#[tokio::test]
async fn contact_message_starts_unanswered() {
    let (app, pool, _) = setup().await;
    let (status, body) = send(
        &app,
        post_json(
            "/api/contact",
            json!({
                "name": "Bo",
                "email": "bo@example.com",
                "subject": "  ",
                "message": "How can I volunteer?",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let messages = db::list_contact_messages(&pool).await.expect("list");
    assert_eq!(messages.len(), 1);
    assert_eq!(body["id"], json!(messages[0].id));
    assert!(!messages[0].responded);
    assert!(messages[0].subject.is_none());

    let (status, _) = send(
        &app,
        post_json("/api/contact", json!({ "name": "Bo", "email": "bo", "message": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(db::list_contact_messages(&pool).await.expect("list").len(), 1);
}

#[tokio::test]
async fn admin_routes_require_a_token() {
    let (app, _, secret) = setup().await;

    let (status, _) = send(&app, admin_get("/api/admin/stats", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, admin_get("/api/admin/stats", Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = admin_token(&secret);
    let (status, body) = send(&app, admin_get("/api/admin/stats", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_projects"], json!(3));
    assert_eq!(body["total_donations"], json!(0));
}

#[tokio::test]
async fn admin_verifies_a_donation() {
    let (app, pool, secret) = setup().await;
    send(
        &app,
        post_json(
            "/api/donations",
            json!({
                "name": "Ada Obi",
                "email": "ada@example.com",
                "amount": "75",
                "transfer_confirmation": "done",
            }),
        ),
    )
    .await;
    let id = db::list_donations(&pool, None, None).await.expect("list")[0].id.clone();

    let token = admin_token(&secret);
    let req = Request::put(format!("/api/admin/donations/{}/status", id))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "status": "verified" }).to_string()))
        .expect("request");
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "verified");
    assert!(body["verified_at"].is_string());

    let (status, body) = send(&app, admin_get("/api/admin/donations?status=verified", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["donations"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn public_pages_respond() {
    let (app, _, _) = setup().await;

    let resp = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);

    let (status, body) = send(&app, Request::get("/api/projects").body(Body::empty()).expect("request")).await;
    assert_eq!(status, StatusCode::OK);
    let projects = body["projects"].as_array().expect("projects");
    assert_eq!(projects.len(), 3);
    assert!(projects.iter().all(|p| p["progress"].is_number()));

    let (status, _) = send(&app, Request::get("/api/projects?status=bogus").body(Body::empty()).expect("request")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Request::get("/api/projects/missing").body(Body::empty()).expect("request")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, Request::get("/api/content").body(Body::empty()).expect("request")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["news"].as_array().is_some_and(|n| !n.is_empty()));

    let (status, _) = send(&app, Request::get("/api/unknown").body(Body::empty()).expect("request")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn undecodable_bodies_get_the_validation_shape() {
    let (app, pool, _) = setup().await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/donations",
            json!({ "name": "Ada Obi", "amount": "10", "transfer_confirmation": "done" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    assert!(body["fields"].get("email").is_some());

    let (status, body) = send(
        &app,
        post_json(
            "/api/donations",
            json!({
                "name": "Ada Obi",
                "email": "ada@example.com",
                "amount": null,
                "transfer_confirmation": "done",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"].get("amount").is_some());

    let (status, body) = send(
        &app,
        post_json("/api/donations", json!({ "name": 7, "email": "ada@example.com", "amount": "5" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let req = Request::post("/api/contact")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .expect("request");
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, body) = send(&app, post_json("/api/contact", json!({ "name": "Bo", "message": "hi" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"].get("email").is_some());

    assert!(db::list_donations(&pool, None, None).await.expect("list").is_empty());
    assert!(db::list_contact_messages(&pool).await.expect("list").is_empty());
}

#[tokio::test]
async fn project_detail_carries_progress() {
    let (app, _, _) = setup().await;
    let (status, body) = send(
        &app,
        Request::get(format!("/api/projects/{}", DEMO_PROJECT)).body(Body::empty()).expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // 8750 of 25000
    let progress = body["progress"].as_f64().expect("progress");
    assert!((progress - 35.0).abs() < 1e-9);
}

#[tokio::test]
async fn raised_events_stream_current_total_then_changes() {
    let (app, _, _) = setup().await;
    let resp = app
        .clone()
        .oneshot(
            Request::get(format!("/api/projects/{}/events", DEMO_PROJECT))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()[header::CONTENT_TYPE]
        .to_str()
        .expect("content type")
        .starts_with("text/event-stream"));
    let mut body = resp.into_body();

    let first = next_event(&mut body).await;
    assert!(first.contains("event: raised"));
    assert!(first.contains("8750"));

    let (status, _) = send(&app, post_json("/api/donations", donation_body("50"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let second = next_event(&mut body).await;
    assert!(second.contains("8800"));

    let (status, _) = send(
        &app,
        Request::get("/api/projects/missing/events").body(Body::empty()).expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn lagging_event_subscriber_gets_the_stored_total() {
    let (app, state) = setup_with(Config::for_sqlite(":memory:")).await;
    let resp = app
        .oneshot(
            Request::get(format!("/api/projects/{}/events", DEMO_PROJECT))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let mut body = resp.into_body();
    assert!(next_event(&mut body).await.contains("8750"));

    // Overflow the channel so the subscriber misses updates.
    for _ in 0..200 {
        let _ = state.raised_tx.send(RaisedUpdate {
            project_id: DEMO_PROJECT.to_string(),
            raised: 1.0,
        });
    }

    let after_lag = next_event(&mut body).await;
    assert!(after_lag.contains("8750"), "got {after_lag}");
}

#[tokio::test]
async fn admin_login_sets_a_cookie() {
    let (app, _, _) = setup().await;
    let (status, _) = send(
        &app,
        post_json("/auth/login", json!({ "username": "admin", "password": "anything" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut config = Config::for_sqlite(":memory:");
    config.admin_password = Some("s3cret".to_string());
    let (app, _) = setup_with(config).await;

    let (status, _) = send(
        &app,
        post_json("/auth/login", json!({ "username": "admin", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        post_json("/auth/login", json!({ "username": "root", "password": "s3cret" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(post_json("/auth/login", json!({ "username": "admin", "password": "s3cret" })))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp.headers()[header::SET_COOKIE]
        .to_str()
        .expect("cookie")
        .to_string();
    assert!(cookie.starts_with("admin_token="));
    assert!(cookie.contains("HttpOnly"));

    let token_pair = cookie.split(';').next().expect("pair").to_string();
    let req = Request::get("/api/me")
        .header(header::COOKIE, token_pair)
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "admin");
}

#[tokio::test]
async fn admin_exports_donations_as_csv() {
    let (app, _, secret) = setup().await;
    send(&app, post_json("/api/donations", donation_body("1500"))).await;
    let token = admin_token(&secret);

    let resp = app
        .clone()
        .oneshot(admin_get("/api/admin/donations/export", Some(&token)))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/csv; charset=utf-8");
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=donations.csv"
    );
    let bytes = resp.into_body().collect().await.expect("body").to_bytes();
    let text = String::from_utf8(bytes.to_vec()).expect("utf8");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("id,created_at,name,email,amount,project,status"));
    assert!(lines[1].contains("Ada Obi,ada@example.com,1500.00,Clean Water Initiative,pending"));

    let (status, _) = send(&app, admin_get("/api/admin/donations/export", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_marks_messages_responded() {
    let (app, pool, secret) = setup().await;
    send(
        &app,
        post_json("/api/contact", json!({ "name": "Bo", "email": "bo@example.com", "message": "hello" })),
    )
    .await;
    let id = db::list_contact_messages(&pool).await.expect("list")[0].id.clone();
    let token = admin_token(&secret);

    let (status, body) = send(
        &app,
        admin_send("PUT", &format!("/api/admin/messages/{}/responded", id), &token, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], json!(id));
    assert!(db::list_contact_messages(&pool).await.expect("list")[0].responded);

    let (status, _) = send(
        &app,
        admin_send("PUT", "/api/admin/messages/nope/responded", &token, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_creates_and_updates_projects() {
    let (app, pool, secret) = setup().await;
    let token = admin_token(&secret);

    let (status, _) = send(
        &app,
        admin_send(
            "POST",
            "/api/admin/projects",
            &token,
            Some(json!({
                "title": "Broken target",
                "description": "",
                "image_url": "",
                "target": 0,
                "start_date": "2025-01-01T00:00:00Z",
                "status": "upcoming",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, created) = send(
        &app,
        admin_send(
            "POST",
            "/api/admin/projects",
            &token,
            Some(json!({
                "title": "School Library",
                "description": "Books for the village school.",
                "image_url": "https://example.org/library.jpg",
                "target": 5000,
                "start_date": "2025-01-01T00:00:00Z",
                "end_date": "2025-06-01T00:00:00Z",
                "status": "upcoming",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().expect("id").to_string();
    assert_eq!(created["raised"], json!(0.0));
    assert!(created["end_date"].is_string());

    let (status, updated) = send(
        &app,
        admin_send(
            "PUT",
            &format!("/api/admin/projects/{}", id),
            &token,
            Some(json!({ "status": "active", "end_date": null })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "active");
    assert_eq!(updated["title"], "School Library");
    assert!(updated["end_date"].is_null());

    let stored = db::get_project(&pool, &id).await.expect("get").expect("project");
    assert!(stored.end_date.is_none());

    let (status, _) = send(
        &app,
        admin_send("PUT", "/api/admin/projects/missing", &token, Some(json!({ "title": "x" }))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        admin_send("PUT", &format!("/api/admin/projects/{}", id), &token, Some(json!({ "target": -1 }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
