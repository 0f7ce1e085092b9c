//! HTTP route handlers
//!
//! Handlers take the shared state and a fully-read request and return either
//! a response or an [`IamError`], which [`error_response`] renders as
//! `{error_message, parameters?}`.

pub mod auth_routes;
pub mod health;
pub mod initialize;
pub mod roles;
pub mod users;

use std::collections::HashMap;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE, COOKIE};
use hyper::{Request, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::auth::{extract_token_from_cookie, extract_token_from_header};
use crate::db::schemas::UserSnapshot;
use crate::server::AppState;
use crate::types::{IamError, Result};

pub use auth_routes::{handle_authenticate, handle_change_password};
pub use health::{health_check, public_key, version_info};
pub use initialize::{handle_diagnostics, handle_initialize};
pub use roles::{handle_create_role, handle_get_role};
pub use users::{handle_create_user, handle_get_user, handle_list_users, handle_update_user};

pub type HandlerResult = Result<Response<Full<Bytes>>>;

// =============================================================================
// Response Helpers
// =============================================================================

pub fn body_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    body_response(status, "application/json", json)
}

pub fn ok_json<T: Serialize>(body: &T) -> HandlerResult {
    Ok(json_response(StatusCode::OK, body))
}

/// Render an error. Server errors are logged in full and shown generically.
pub fn error_response(err: IamError) -> Response<Full<Bytes>> {
    if err.is_client_error() {
        debug!("Client error: {}", err);
    } else {
        error!("Request failed: {}", err);
    }
    let (status, body) = err.into_status_code_and_body();
    json_response(status, &body)
}

pub fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error_message": "Not Found",
        "parameters": { "path": path },
    });
    json_response(StatusCode::NOT_FOUND, &body)
}

// =============================================================================
// Request Helpers
// =============================================================================

pub fn parse_json_body<T: DeserializeOwned>(req: &Request<Bytes>) -> Result<T> {
    serde_json::from_slice(req.body())
        .map_err(|e| IamError::BadRequest(format!("Invalid JSON: {}", e)))
}

pub fn parse_form_body<T: DeserializeOwned>(req: &Request<Bytes>) -> Result<T> {
    serde_urlencoded::from_bytes(req.body())
        .map_err(|e| IamError::BadRequest(format!("Invalid form body: {}", e)))
}

pub fn is_json(req: &Request<Bytes>) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false)
}

pub fn query_params(req: &Request<Bytes>) -> Result<HashMap<String, String>> {
    serde_urlencoded::from_str(req.uri().query().unwrap_or(""))
        .map_err(|e| IamError::BadRequest(format!("Invalid query string: {}", e)))
}

/// Resolve the caller from the `authorization_token` cookie, falling back to
/// an `Authorization: Bearer` header.
pub async fn authenticated_caller(state: &AppState, req: &Request<Bytes>) -> Result<UserSnapshot> {
    let headers = req.headers();
    let cookie = headers.get(COOKIE).and_then(|v| v.to_str().ok());
    let bearer = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());

    let token = extract_token_from_cookie(cookie)
        .or_else(|| extract_token_from_header(bearer))
        .ok_or_else(|| IamError::unauthorized("Not authenticated", None))?;

    state.accounts.caller(token).await
}
