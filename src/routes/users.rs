//! HTTP Routes for Users
//!
//! - POST /user     - Update the caller's own record
//! - PUT  /user     - Create or overwrite any user (super-admin)
//! - GET  /user     - Own record, or `?username=` for super-admins
//! - GET  /user/all - Every user (super-admin)

use bytes::Bytes;
use hyper::Request;

use crate::routes::{authenticated_caller, ok_json, parse_json_body, query_params, HandlerResult};
use crate::server::AppState;
use crate::services::UserProfile;

pub async fn handle_update_user(state: &AppState, req: &Request<Bytes>) -> HandlerResult {
    let caller = authenticated_caller(state, req).await?;
    let profile: UserProfile = parse_json_body(req)?;
    ok_json(&state.accounts.update_own_user(&caller, &profile).await?)
}

pub async fn handle_create_user(state: &AppState, req: &Request<Bytes>) -> HandlerResult {
    let caller = authenticated_caller(state, req).await?;
    let profile: UserProfile = parse_json_body(req)?;
    ok_json(&state.accounts.create_user(&caller, &profile).await?)
}

pub async fn handle_get_user(state: &AppState, req: &Request<Bytes>) -> HandlerResult {
    let caller = authenticated_caller(state, req).await?;
    let params = query_params(req)?;
    let username = params.get("username").map(String::as_str);
    ok_json(&state.accounts.get_user(&caller, username).await?)
}

pub async fn handle_list_users(state: &AppState, req: &Request<Bytes>) -> HandlerResult {
    let caller = authenticated_caller(state, req).await?;
    ok_json(&state.accounts.list_users(&caller).await?)
}
