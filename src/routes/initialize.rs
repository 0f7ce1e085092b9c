//! HTTP Routes for Bootstrap
//!
//! - POST /initialize - Run bootstrap; unauthenticated so a fresh deployment
//!   with no accounts can converge
//! - GET  /initialize - Key and account diagnostics (super-admin)

use bytes::Bytes;
use hyper::Request;

use crate::auth::is_super_admin;
use crate::routes::{authenticated_caller, ok_json, HandlerResult};
use crate::server::AppState;
use crate::types::IamError;

pub async fn handle_initialize(state: &AppState) -> HandlerResult {
    ok_json(&state.initializer.initialize().await?)
}

pub async fn handle_diagnostics(state: &AppState, req: &Request<Bytes>) -> HandlerResult {
    let caller = authenticated_caller(state, req).await?;
    if !is_super_admin(&caller) {
        return Err(IamError::unauthorized(
            "Insufficient privileges",
            Some(serde_json::json!({ "username": caller.username })),
        ));
    }
    ok_json(&state.initializer.diagnostics().await?)
}
