//! Health, version and public key endpoints
//!
//! - GET /health, /healthz - Liveness probe
//! - GET /version          - Build stamp for deployment verification
//! - GET /.well-known/public-key - PKCS#1 PEM used to verify issued tokens

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::keys::CacheStatsSnapshot;
use crate::routes::{body_response, json_response, HandlerResult};
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    pub mode: &'static str,
    pub node_id: String,
    pub timestamp: String,
    pub key_cache: KeyCacheStatus,
    pub password_derivations: u64,
}

#[derive(Serialize)]
pub struct KeyCacheStatus {
    pub private_key: CacheStatsSnapshot,
    pub public_key: CacheStatsSnapshot,
}

#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Liveness probe: always 200 while the process is serving
pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let (private_key, public_key) = state.keys.cache_stats();
    let response = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        node_id: state.args.node_id.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        key_cache: KeyCacheStatus {
            private_key,
            public_key,
        },
        password_derivations: state.credentials.derivations(),
    };
    json_response(StatusCode::OK, &response)
}

pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "umbrella-iam",
    };
    json_response(StatusCode::OK, &response)
}

/// Serves the published public key, republishing it first if it drifted.
pub async fn public_key(state: &AppState) -> HandlerResult {
    let pem = state.keys.public_key_pem().await?;
    Ok(body_response(StatusCode::OK, "application/x-pem-file", pem))
}
