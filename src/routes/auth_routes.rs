//! HTTP Routes for Authentication
//!
//! - POST  /authenticate - Verify a username/password form and set the token cookie
//! - PATCH /authenticate - Change a password (own, or any as super-admin)

use bytes::Bytes;
use hyper::header::{HeaderValue, SET_COOKIE};
use hyper::{Request, StatusCode};

use crate::config::AUTH_COOKIE_NAME;
use crate::routes::{
    authenticated_caller, is_json, json_response, ok_json, parse_form_body, parse_json_body,
    HandlerResult,
};
use crate::server::AppState;
use crate::services::{Credentials, ExpiryResponse, PasswordChange};
use crate::types::IamError;

/// `Set-Cookie` value carrying the bearer token
pub fn auth_cookie(token: &str, max_age_seconds: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        AUTH_COOKIE_NAME, token, max_age_seconds
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// POST /authenticate
///
/// Accepts `application/x-www-form-urlencoded` (or JSON) credentials.
/// Responds with `{expiry}` and the token in an HttpOnly cookie.
pub async fn handle_authenticate(state: &AppState, req: &Request<Bytes>) -> HandlerResult {
    let credentials: Credentials = if is_json(req) {
        parse_json_body(req)?
    } else {
        parse_form_body(req)?
    };

    let issued = state.accounts.authenticate(&credentials).await?;

    let cookie = auth_cookie(
        &issued.token,
        state.tokens.expiry_minutes() * 60,
        state.http.cookie_secure,
    );
    let cookie = HeaderValue::from_str(&cookie)
        .map_err(|e| IamError::Internal(format!("Invalid cookie value: {}", e)))?;

    let mut response = json_response(StatusCode::OK, &ExpiryResponse::from(&issued));
    response.headers_mut().insert(SET_COOKIE, cookie);
    Ok(response)
}

/// PATCH /authenticate
pub async fn handle_change_password(state: &AppState, req: &Request<Bytes>) -> HandlerResult {
    let caller = authenticated_caller(state, req).await?;
    let change: PasswordChange = parse_json_body(req)?;
    ok_json(&state.accounts.change_password(&caller, &change).await?)
}
