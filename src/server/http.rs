//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo. Request bodies are read in full (bounded by
//! `MAX_BODY_BYTES`) before routing, so handlers work on `Request<Bytes>`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN, VARY,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::TokenService;
use crate::config::{Args, HttpConfig, ObjectBackend, SecretBackend, MAX_BODY_BYTES};
use crate::db::schemas::{RoleDoc, UserDoc};
use crate::db::{MemoryRepository, MongoClient, MongoRepository, Repository};
use crate::keys::KeyManager;
use crate::routes::{self, error_response, not_found_response};
use crate::services::{AccountService, CredentialManager, Initializer};
use crate::stores::{
    FsObjectStore, MemoryObjectStore, MemorySecretStore, MongoSecretStore, ObjectStore,
    SecretStore,
};
use crate::types::{IamError, Result};

// =============================================================================
// Application State
// =============================================================================

/// Backing stores the services are built over
#[derive(Clone)]
pub struct Stores {
    pub secrets: Arc<dyn SecretStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub users: Arc<dyn Repository<UserDoc>>,
    pub roles: Arc<dyn Repository<RoleDoc>>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            secrets: Arc::new(MemorySecretStore::new()),
            objects: Arc::new(MemoryObjectStore::new()),
            users: Arc::new(MemoryRepository::<UserDoc>::new()),
            roles: Arc::new(MemoryRepository::<RoleDoc>::new()),
        }
    }
}

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub http: HttpConfig,
    pub keys: Arc<KeyManager>,
    pub tokens: Arc<TokenService>,
    pub credentials: Arc<CredentialManager>,
    pub accounts: AccountService,
    pub initializer: Initializer,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the services over an explicit set of stores
    pub fn with_stores(args: Args, stores: Stores) -> Self {
        let keys = Arc::new(KeyManager::new(
            stores.secrets.clone(),
            stores.objects.clone(),
            args.key_config(),
        ));
        let tokens = Arc::new(TokenService::new(keys.clone(), args.token_config()));
        let credentials = Arc::new(CredentialManager::new(
            stores.secrets.clone(),
            stores.users.clone(),
            args.credential_config(),
        ));
        let accounts = AccountService::new(
            stores.users.clone(),
            stores.roles.clone(),
            credentials.clone(),
            tokens.clone(),
        );
        let initializer = Initializer::new(
            stores.roles,
            stores.users,
            credentials.clone(),
            keys.clone(),
            args.super_admin_list(),
        );

        Self {
            http: args.http_config(),
            args,
            keys,
            tokens,
            credentials,
            accounts,
            initializer,
            started_at: Instant::now(),
        }
    }

    /// Everything in memory; nothing survives the process
    pub fn in_memory(args: Args) -> Self {
        Self::with_stores(args, Stores::in_memory())
    }

    /// Connect the configured backends
    pub async fn from_args(args: Args) -> Result<Self> {
        let mongo = match &args.mongodb_uri {
            Some(uri) => Some(MongoClient::new(uri, &args.mongodb_db).await?),
            None => {
                if !args.dev_mode {
                    return Err(IamError::Config("MONGODB_URI is required".into()));
                }
                warn!("No MONGODB_URI set - users and roles are kept in memory");
                None
            }
        };

        let (users, roles): (Arc<dyn Repository<UserDoc>>, Arc<dyn Repository<RoleDoc>>) =
            match &mongo {
                Some(client) => (
                    Arc::new(MongoRepository::<UserDoc>::new(client).await?),
                    Arc::new(MongoRepository::<RoleDoc>::new(client).await?),
                ),
                None => (
                    Arc::new(MemoryRepository::<UserDoc>::new()),
                    Arc::new(MemoryRepository::<RoleDoc>::new()),
                ),
            };

        let secrets: Arc<dyn SecretStore> = match (args.secret_store, &mongo) {
            (SecretBackend::Mongo, Some(client)) => Arc::new(MongoSecretStore::new(client).await?),
            (SecretBackend::Mongo, None) => {
                return Err(IamError::Config(
                    "The mongo secret store requires MONGODB_URI".into(),
                ))
            }
            (SecretBackend::Memory, _) => {
                warn!("Secrets are kept in memory - keys and pepper are lost on restart");
                Arc::new(MemorySecretStore::new())
            }
        };

        let objects: Arc<dyn ObjectStore> = match args.object_store {
            ObjectBackend::Filesystem => Arc::new(FsObjectStore::new(
                args.object_store_root.clone(),
                args.public_base_url.clone(),
            )),
            ObjectBackend::Memory => Arc::new(MemoryObjectStore::new()),
        };

        Ok(Self::with_stores(
            args,
            Stores {
                secrets,
                objects,
                users,
                roles,
            },
        ))
    }
}

// =============================================================================
// Server Loop
// =============================================================================

pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Umbrella IAM listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - authorization cookie is not marked Secure");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Read the body and hand the request to the router
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    info!("[{}] {} {}", addr, req.method(), req.uri().path());

    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("[{}] Rejected request body: {}", addr, e);
            let err = IamError::BadRequest(format!(
                "Request body unreadable or larger than {} bytes",
                MAX_BODY_BYTES
            ));
            return Ok(error_response(err));
        }
    };

    Ok(route(state, Request::from_parts(parts, body)).await)
}

// =============================================================================
// Routing
// =============================================================================

/// Dispatch a fully-read request. Never fails: errors become JSON bodies.
pub async fn route(state: Arc<AppState>, req: Request<Bytes>) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let origin = req
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let result = match (method.clone(), path.as_str()) {
        (Method::GET, "/health") | (Method::GET, "/healthz") => Ok(routes::health_check(&state)),
        (Method::GET, "/version") => Ok(routes::version_info()),
        (Method::GET, "/.well-known/public-key") => routes::public_key(&state).await,

        (Method::OPTIONS, _) => Ok(preflight_response()),

        (Method::POST, "/authenticate") => routes::handle_authenticate(&state, &req).await,
        (Method::PATCH, "/authenticate") => routes::handle_change_password(&state, &req).await,

        (Method::POST, "/initialize") => routes::handle_initialize(&state).await,
        (Method::GET, "/initialize") => routes::handle_diagnostics(&state, &req).await,

        (Method::GET, "/user") => routes::handle_get_user(&state, &req).await,
        (Method::POST, "/user") => routes::handle_update_user(&state, &req).await,
        (Method::PUT, "/user") => routes::handle_create_user(&state, &req).await,
        (Method::GET, "/user/all") => routes::handle_list_users(&state, &req).await,

        (Method::GET, "/role") => routes::handle_get_role(&state, &req).await,
        (Method::PUT, "/role") => routes::handle_create_role(&state, &req).await,

        _ => Ok(not_found_response(&path)),
    };

    let mut response = result.unwrap_or_else(error_response);
    debug!("{} {} -> {}", method, path, response.status());
    apply_cors(&state.http, origin.as_deref(), &mut response);
    response
}

/// Preflight for credentialed cross-origin requests; origin headers are
/// added by [`apply_cors`] like any other response.
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, PATCH, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}

/// Echo the request origin when it is on the allow-list. Credentials are
/// allowed, so a wildcard origin is never sent.
fn apply_cors(http: &HttpConfig, origin: Option<&str>, response: &mut Response<Full<Bytes>>) {
    let Some(origin) = origin else {
        return;
    };
    if !http.allowed_origins.iter().any(|allowed| allowed == origin) {
        return;
    }
    let Ok(value) = HeaderValue::from_str(origin) else {
        return;
    };

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(VARY, HeaderValue::from_static("Origin"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_config(origins: &[&str]) -> HttpConfig {
        HttpConfig {
            cookie_secure: true,
            allowed_origins: origins.iter().map(|o| o.to_string()).collect(),
        }
    }

    #[test]
    fn test_cors_echoes_allowed_origin() {
        let mut response = preflight_response();
        apply_cors(
            &http_config(&["http://localhost:4200"]),
            Some("http://localhost:4200"),
            &mut response,
        );
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:4200"
        );
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[test]
    fn test_cors_ignores_unknown_origin() {
        let mut response = preflight_response();
        apply_cors(
            &http_config(&["http://localhost:4200"]),
            Some("http://evil.example"),
            &mut response,
        );
        assert!(response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }
}
