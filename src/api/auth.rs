//! Sign-in, sign-out and token checks for the data endpoints.
//!
//! Tokens are HS256 JWTs carrying the user and an expiry. Clients may
//! present them either as a bearer header or through the session cookie
//! the sign-in endpoint sets.

use std::sync::Arc;

use anyhow::Context;
use axum::Json;
use axum::extract::{Extension, Request};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{AppendHeaders, IntoResponse, Response};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::MonitorState;
use crate::settings::AuthSettings;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthInfo {
    pub user: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub fn verify_credentials(auth: &AuthSettings, user: &str, password: &str) -> bool {
    let digest = hex::encode(Sha256::digest(password.as_bytes()));
    auth.user == user && auth.password_sha256.eq_ignore_ascii_case(&digest)
}

pub fn issue_token(auth: &AuthSettings, user: &str) -> Result<AuthTokens, anyhow::Error> {
    let hours = auth.session_hours.min(24 * 3650) as i64;
    let expires_at = Utc::now() + Duration::hours(hours);
    let claims = Claims {
        sub: user.to_string(),
        exp: expires_at.timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(auth.token_secret.as_bytes()),
    )
    .context("Failed to sign auth token")?;
    Ok(AuthTokens { token, expires_at })
}

pub fn verify_token(auth: &AuthSettings, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(auth.token_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .ok()
}

pub async fn sign_in(
    Extension(state): Extension<Arc<MonitorState>>,
    Json(info): Json<AuthInfo>,
) -> Response {
    let auth = &state.settings.auth;
    if !verify_credentials(auth, &info.user, &info.password) {
        log::warn!("Rejected sign-in for user {:?}", info.user);
        return (StatusCode::UNAUTHORIZED, "Invalid user or password").into_response();
    }

    match issue_token(auth, &info.user) {
        Ok(tokens) => {
            let cookie = session_cookie(auth, &tokens, info.remember);
            log::info!("User {:?} signed in", info.user);
            (AppendHeaders([(header::SET_COOKIE, cookie)]), Json(tokens)).into_response()
        }
        Err(e) => {
            log::error!("{e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to issue token").into_response()
        }
    }
}

pub async fn sign_out(Extension(state): Extension<Arc<MonitorState>>) -> impl IntoResponse {
    let cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0",
        state.settings.auth.cookie_name
    );
    (AppendHeaders([(header::SET_COOKIE, cookie)]), StatusCode::NO_CONTENT)
}

/// Gate for the data routes. Accepts a token from the `Authorization`
/// header or from the session cookie.
pub async fn require_auth(request: Request, next: Next) -> Result<Response, StatusCode> {
    let state = request
        .extensions()
        .get::<Arc<MonitorState>>()
        .cloned()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    let token = bearer_token(&request)
        .or_else(|| cookie_token(&request, &state.settings.auth.cookie_name));
    match token.and_then(|t| verify_token(&state.settings.auth, &t)) {
        Some(_) => Ok(next.run(request).await),
        None => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Session cookie for an issued token. Without "remember" the cookie has
/// no Max-Age and dies with the browser session.
fn session_cookie(auth: &AuthSettings, tokens: &AuthTokens, remember: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict",
        auth.cookie_name, tokens.token
    );
    if remember {
        let max_age = (tokens.expires_at - Utc::now()).num_seconds().max(0);
        cookie.push_str(&format!("; Max-Age={max_age}"));
    }
    cookie
}

fn bearer_token(request: &Request) -> Option<String> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(|t| t.trim().to_string())
}

fn cookie_token(request: &Request, cookie_name: &str) -> Option<String> {
    let cookies = request.headers().get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == cookie_name).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn default_credentials_verify() {
        let auth = AuthSettings::default();
        assert!(verify_credentials(&auth, "admin", "admin"));
        assert!(!verify_credentials(&auth, "admin", "wrong"));
        assert!(!verify_credentials(&auth, "root", "admin"));
    }

    #[test]
    fn stored_digest_matches_a_fresh_computation() {
        let auth = AuthSettings::default();
        let digest = hex::encode(Sha256::digest(b"admin"));
        assert_eq!(auth.password_sha256, digest);
    }

    #[test]
    fn issued_tokens_verify_and_carry_the_user() {
        let auth = AuthSettings::default();
        let tokens = issue_token(&auth, "admin").unwrap();

        let claims = verify_token(&auth, &tokens.token).unwrap();
        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.exp as i64, tokens.expires_at.timestamp());
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let auth = AuthSettings::default();
        let tokens = issue_token(&auth, "admin").unwrap();

        let mut tampered = tokens.token.clone();
        tampered.push('x');
        assert!(verify_token(&auth, &tampered).is_none());
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let auth = AuthSettings::default();
        let other = AuthSettings {
            token_secret: "different-secret".to_string(),
            ..AuthSettings::default()
        };

        let tokens = issue_token(&other, "admin").unwrap();
        assert!(verify_token(&auth, &tokens.token).is_none());
    }

    #[test]
    fn remember_controls_the_cookie_lifetime() {
        let auth = AuthSettings::default();
        let tokens = issue_token(&auth, "admin").unwrap();

        let session = session_cookie(&auth, &tokens, false);
        assert!(session.starts_with("station_auth="));
        assert!(!session.contains("Max-Age"));

        let persistent = session_cookie(&auth, &tokens, true);
        assert!(persistent.contains("Max-Age="));
    }

    fn request_with_header(name: header::HeaderName, value: &str) -> Request {
        let mut request = Request::new(Body::empty());
        request.headers_mut().insert(name, value.parse().unwrap());
        request
    }

    #[test]
    fn cookie_header_parsing_finds_the_session_token() {
        let request = request_with_header(
            header::COOKIE,
            "theme=dark; station_auth=abc.def.ghi; lang=en",
        );

        assert_eq!(
            cookie_token(&request, "station_auth").as_deref(),
            Some("abc.def.ghi")
        );
        assert!(cookie_token(&request, "other").is_none());
    }

    #[test]
    fn bearer_header_parsing_strips_the_scheme() {
        let request = request_with_header(header::AUTHORIZATION, "Bearer abc.def.ghi");
        assert_eq!(bearer_token(&request).as_deref(), Some("abc.def.ghi"));

        let request = request_with_header(header::AUTHORIZATION, "Basic abc");
        assert!(bearer_token(&request).is_none());
    }
}
