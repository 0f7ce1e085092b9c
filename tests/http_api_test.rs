//! End-to-end scenarios over the router with in-memory stores

use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{json, Value};

use umbrella_iam::auth::{encode_claims, Claims};
use umbrella_iam::config::Args;
use umbrella_iam::db::schemas::{RoleDoc, UserDoc, UserSnapshot};
use umbrella_iam::db::{MemoryRepository, Repository};
use umbrella_iam::server::{route, AppState, Stores};
use umbrella_iam::stores::{MemoryObjectStore, MemorySecretStore};

const ADMIN: &str = "admin";

struct Harness {
    state: Arc<AppState>,
    roles: Arc<MemoryRepository<RoleDoc>>,
}

fn test_args() -> Args {
    Args::parse_from([
        "umbrella-iam",
        "--dev-mode",
        "--secret-store",
        "memory",
        "--object-store",
        "memory",
        "--rsa-key-bits",
        "2048",
        "--pbkdf2-iterations",
        "1000",
        "--super-admin-usernames",
        ADMIN,
    ])
}

fn harness() -> Harness {
    let roles = Arc::new(MemoryRepository::new());
    let stores = Stores {
        secrets: Arc::new(MemorySecretStore::new()),
        objects: Arc::new(MemoryObjectStore::new()),
        users: Arc::new(MemoryRepository::<UserDoc>::new()),
        roles: roles.clone(),
    };
    Harness {
        state: Arc::new(AppState::with_stores(test_args(), stores)),
        roles,
    }
}

fn request(method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Bytes> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Bytes::from(value.to_string())
        }
        None => Bytes::new(),
    };
    builder.body(body).unwrap()
}

fn login_request(username: &str, password: &str) -> Request<Bytes> {
    let form = serde_urlencoded::to_string(&[("username", username), ("password", password)]).unwrap();
    Request::builder()
        .method(Method::POST)
        .uri("/authenticate")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Bytes::from(form))
        .unwrap()
}

async fn body_json(response: Response<Full<Bytes>>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// `name=value` pair from the `Set-Cookie` header
fn session_cookie(response: &Response<Full<Bytes>>) -> String {
    let header = response.headers()[SET_COOKIE].to_str().unwrap();
    header.split(';').next().unwrap().to_string()
}

impl Harness {
    async fn send(&self, req: Request<Bytes>) -> Response<Full<Bytes>> {
        route(self.state.clone(), req).await
    }

    /// Bootstrap and return a session cookie for the generated super-admin
    async fn admin_session(&self) -> String {
        let report = body_json(self.send(request(Method::POST, "/initialize", None, None)).await).await;
        let password = report["generated_credentials"][0]["password"]
            .as_str()
            .unwrap()
            .to_string();

        let response = self.send(login_request(ADMIN, &password)).await;
        assert_eq!(response.status(), StatusCode::OK);
        session_cookie(&response)
    }

    async fn create_user(&self, admin: &str, username: &str, password: &str) {
        let body = json!({
            "username": username,
            "email": "john@example.com",
            "password": password,
        });
        let response = self
            .send(request(Method::PUT, "/user", Some(admin), Some(body)))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let response = self.send(login_request(username, password)).await;
        assert_eq!(response.status(), StatusCode::OK);
        session_cookie(&response)
    }
}

#[tokio::test]
async fn test_login_and_fetch_own_record() {
    let h = harness();
    let admin = h.admin_session().await;
    h.create_user(&admin, "john_doe", "SomeRandomPassword").await;

    let response = h.send(login_request("john_doe", "SomeRandomPassword")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
    assert!(set_cookie.starts_with("authorization_token="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Strict"));
    assert!(set_cookie.contains("Max-Age=1800"));
    let cookie = session_cookie(&response);
    assert!(body_json(response).await["expiry"].is_string());

    let response = h.send(request(Method::GET, "/user", Some(&cookie), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let user = body_json(response).await;
    assert_eq!(user["username"], "john_doe");
    assert_eq!(user["email"], "john@example.com");
    assert!(user.get("password_hash").is_none());
    assert!(user.get("password").is_none());
}

#[tokio::test]
async fn test_wrong_password_and_unknown_user_fail_alike() {
    let h = harness();
    let admin = h.admin_session().await;
    h.create_user(&admin, "john_doe", "SomeRandomPassword").await;

    let wrong = h.send(login_request("john_doe", "SomeRandomPassworda")).await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert!(wrong.headers().get(SET_COOKIE).is_none());
    let wrong = body_json(wrong).await;
    assert_eq!(wrong["error_message"], "Invalid credentials");
    assert_eq!(wrong["parameters"]["username"], "john_doe");

    let unknown = body_json(h.send(login_request("nobody", "SomeRandomPassword")).await).await;
    assert_eq!(unknown["error_message"], wrong["error_message"]);
}

#[tokio::test]
async fn test_bearer_header_is_accepted() {
    let h = harness();
    let admin = h.admin_session().await;
    let token = admin.trim_start_matches("authorization_token=");

    let req = Request::builder()
        .method(Method::GET)
        .uri("/user")
        .header(AUTHORIZATION, format!("Bearer {}", token))
        .body(Bytes::new())
        .unwrap();
    let response = h.send(req).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["role"], "SUPER_ADMIN");
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let h = harness();

    let first = body_json(h.send(request(Method::POST, "/initialize", None, None)).await).await;
    assert_eq!(
        first["initialized_tasks"],
        json!(["Role", "Pepper", "Super Admin: admin", "Private Key", "Public Key"])
    );

    let second = body_json(h.send(request(Method::POST, "/initialize", None, None)).await).await;
    assert_eq!(second["initialized_tasks"], json!([]));
    assert!(second.get("generated_credentials").is_none());

    h.roles.drop_all().await.unwrap();
    let third = body_json(h.send(request(Method::POST, "/initialize", None, None)).await).await;
    assert_eq!(third["initialized_tasks"], json!(["Role"]));
}

#[tokio::test]
async fn test_non_admin_cannot_create_users() {
    let h = harness();
    let admin = h.admin_session().await;
    h.create_user(&admin, "john_doe", "SomeRandomPassword").await;
    let john = h.login("john_doe", "SomeRandomPassword").await;

    let body = json!({ "username": "mallory", "password": "x" });
    let response = h.send(request(Method::PUT, "/user", Some(&john), Some(body))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = h.send(request(Method::GET, "/user/all", Some(&john), None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = h
        .send(request(Method::GET, "/user?username=admin", Some(&john), None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_cannot_promote_self() {
    let h = harness();
    let admin = h.admin_session().await;
    h.create_user(&admin, "john_doe", "SomeRandomPassword").await;
    let john = h.login("john_doe", "SomeRandomPassword").await;

    let body = json!({ "username": "john_doe", "role": "SUPER_ADMIN" });
    let response = h.send(request(Method::POST, "/user", Some(&john), Some(body))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = json!({ "username": "john_doe", "first_name": "John" });
    let response = h.send(request(Method::POST, "/user", Some(&john), Some(body))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let user = body_json(response).await;
    assert_eq!(user["first_name"], "John");
    assert_eq!(user["email"], "john@example.com");
}

#[tokio::test]
async fn test_password_reuse_rejected() {
    let h = harness();
    let admin = h.admin_session().await;
    h.create_user(&admin, "john_doe", "SomeRandomPassword").await;
    let john = h.login("john_doe", "SomeRandomPassword").await;

    let body = json!({ "username": "john_doe", "password": "SomeRandomPassword" });
    let response = h
        .send(request(Method::PATCH, "/authenticate", Some(&john), Some(body)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_message"], "Same password is reused");

    let body = json!({ "username": "john_doe", "password": "AnotherPassword" });
    let response = h
        .send(request(Method::PATCH, "/authenticate", Some(&john), Some(body)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    h.login("john_doe", "AnotherPassword").await;
    let response = h.send(login_request("john_doe", "SomeRandomPassword")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let h = harness();
    h.admin_session().await;

    let key = h.state.keys.private_key().await.unwrap();
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        exp: now - 60,
        iat: now - 3600,
        user: UserSnapshot {
            username: ADMIN.to_string(),
            role: Some("SUPER_ADMIN".to_string()),
            ..Default::default()
        },
    };
    let token = encode_claims(&claims, &key).unwrap();
    let cookie = format!("authorization_token={}", token);

    let response = h.send(request(Method::GET, "/user", Some(&cookie), None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error_message"], "Token expired");
    assert_eq!(body["parameters"]["authorization_token"], token);
}

#[tokio::test]
async fn test_unauthenticated_requests_rejected() {
    let h = harness();
    let response = h.send(request(Method::GET, "/user", None, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = h
        .send(request(Method::GET, "/user", Some("authorization_token=garbage"), None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_roles_round_trip_and_unknown_role_rejected() {
    let h = harness();
    let admin = h.admin_session().await;

    let body = json!({ "role": "AUDITOR", "name": "Auditor" });
    let response = h.send(request(Method::PUT, "/role", Some(&admin), Some(body))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = h
        .send(request(Method::GET, "/role?role=AUDITOR", Some(&admin), None))
        .await;
    assert_eq!(body_json(response).await, json!({ "role": "AUDITOR", "name": "Auditor" }));

    let response = h
        .send(request(Method::GET, "/role?role=GHOST", Some(&admin), None))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_message"], "Role not found");

    let body = json!({ "username": "jane", "password": "pw", "role": "GHOST" });
    let response = h.send(request(Method::PUT, "/user", Some(&admin), Some(body))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_public_key_served_as_pem() {
    let h = harness();
    let response = h.send(request(Method::GET, "/.well-known/public-key", None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/x-pem-file");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let pem = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(pem.starts_with("-----BEGIN RSA PUBLIC KEY-----"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let h = harness();
    let response = h.send(request(Method::GET, "/nope", None, None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = h.send(request(Method::GET, "/health", None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["healthy"], true);
    assert!(health["key_cache"]["private_key"]["hits"].is_u64());
    assert!(health["password_derivations"].is_u64());
}
