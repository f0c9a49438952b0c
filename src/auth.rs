use std::future::Future;
use axum::{
    extract::{State, Json, FromRequestParts},
    response::IntoResponse,
    http::{StatusCode, request::Parts, HeaderMap, HeaderValue, header},
};
use serde::{Deserialize, Serialize};
use crate::AppState;
use jsonwebtoken::{encode, decode, EncodingKey, DecodingKey, Header, Validation};
use chrono::{Utc, Duration};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const AUTH_COOKIE_NAME: &str = "admin_token";

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    user: AdminProfile,
}

#[derive(Serialize, Clone)]
pub struct AdminProfile {
    pub username: String,
    pub role: String,
}

// Claims for our JWT
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
    role: String,
}

/// Proof that the request carried a valid admin token.
pub struct AdminUser {
    pub username: String,
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = (StatusCode, String);

    fn from_request_parts(parts: &mut Parts, state: &AppState) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let token = extract_token_from_headers(&parts.headers);
        let secret = state.config.jwt_secret.clone();
        async move {
            let token = token
                .ok_or((StatusCode::UNAUTHORIZED, "Missing auth token".to_string()))?;
            let claims = validate_token_str(&token, &secret).map_err(|e| {
                tracing::warn!("Token error: {}", e);
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
            })?;
            if claims.role != "admin" {
                return Err((StatusCode::FORBIDDEN, "Forbidden".to_string()));
            }
            Ok(AdminUser { username: claims.sub })
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    let Some(expected_password) = state.config.admin_password.as_deref() else {
        return (StatusCode::FORBIDDEN, "Admin login disabled").into_response();
    };

    // Evaluate both so a wrong username costs the same as a wrong password.
    let username_ok = constant_time_eq(payload.username.as_bytes(), state.config.admin_username.as_bytes());
    let password_ok = constant_time_eq(payload.password.as_bytes(), expected_password.as_bytes());
    if !(username_ok & password_ok) {
        tracing::warn!("Failed admin login for '{}'", payload.username);
        return (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response();
    }

    let user = AdminProfile {
        username: payload.username,
        role: "admin".to_string(),
    };
    match create_jwt(&user, &state.config.jwt_secret) {
        Ok(token) => {
            let cookie = build_auth_cookie(&token, state.config.production);
            let mut response = Json(AuthResponse { user }).into_response();
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
            response
        }
        Err(e) => {
            tracing::error!("JWT creation failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to create token").into_response()
        }
    }
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookie = clear_auth_cookie(state.config.production);
    let mut response = (StatusCode::OK, "OK").into_response();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

pub async fn me(user: AdminUser) -> impl IntoResponse {
    Json(AdminProfile {
        username: user.username,
        role: "admin".to_string(),
    })
}

/// Compares SHA-256 digests in constant time, so neither content nor length leaks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    Sha256::digest(a).ct_eq(&Sha256::digest(b)).into()
}

pub fn create_jwt(user: &AdminProfile, secret: &str) -> anyhow::Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::days(1))
        .ok_or_else(|| anyhow::anyhow!("token expiry overflow"))?
        .timestamp();

    let claims = Claims {
        sub: user.username.clone(),
        exp: expiration as usize,
        role: user.role.clone(),
    };

    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))?;
    Ok(token)
}

fn validate_token_str(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_ref()), &validation)
        .map(|data| data.claims)
}

pub fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    if let Some(cookie_header) = headers
        .get(header::COOKIE)
        .and_then(|h| h.to_str().ok())
    {
        for cookie in cookie_header.split(';') {
            let cookie = cookie.trim();
            if let Some((k, v)) = cookie.split_once('=') {
                if k == AUTH_COOKIE_NAME {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}

fn build_auth_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age=86400",
        AUTH_COOKIE_NAME,
        token
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn clear_auth_cookie(secure: bool) -> String {
    let mut cookie = format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        AUTH_COOKIE_NAME
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}
