//! HTTP Routes for Roles (super-admin only)
//!
//! - GET /role?role= - Fetch a role by key
//! - PUT /role       - Create or rename a role

use bytes::Bytes;
use hyper::Request;

use crate::routes::{authenticated_caller, ok_json, parse_json_body, query_params, HandlerResult};
use crate::server::AppState;
use crate::services::RoleView;
use crate::types::IamError;

pub async fn handle_get_role(state: &AppState, req: &Request<Bytes>) -> HandlerResult {
    let caller = authenticated_caller(state, req).await?;
    let params = query_params(req)?;
    let role = params
        .get("role")
        .ok_or_else(|| IamError::BadRequest("Missing query parameter 'role'".into()))?;
    ok_json(&state.accounts.get_role(&caller, role).await?)
}

pub async fn handle_create_role(state: &AppState, req: &Request<Bytes>) -> HandlerResult {
    let caller = authenticated_caller(state, req).await?;
    let role: RoleView = parse_json_body(req)?;
    ok_json(&state.accounts.create_role(&caller, &role).await?)
}
