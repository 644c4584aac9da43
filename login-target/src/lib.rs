use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct UserStore {
    users: Arc<HashMap<String, String>>,
}

impl Default for UserStore {
    fn default() -> Self {
        Self::new([("user1", "password1"), ("user2", "password2"), ("user3", "password3")])
    }
}

impl UserStore {
    pub fn new<'a>(users: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            users: Arc::new(
                users
                    .into_iter()
                    .map(|(u, p)| (u.to_owned(), p.to_owned()))
                    .collect(),
            ),
        }
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.users.get(username).is_some_and(|p| p == password)
    }
}

// Missing fields read as empty strings and fail verification.
#[derive(Default, Deserialize)]
#[serde(default)]
struct LoginRequest {
    username: String,
    password: String,
}

pub fn build_app(store: UserStore) -> Router {
    Router::new()
        .route("/", get(homepage))
        .route("/health", get(health_check))
        .route("/login", post(login))
        .with_state(store)
}

async fn homepage() -> &'static str {
    "Hello World! (from login-target).\n"
}

async fn health_check() -> &'static str {
    "OK"
}

// The body is decoded regardless of Content-Type; only malformed JSON is a 400.
async fn login(State(store): State<UserStore>, body: Bytes) -> impl IntoResponse {
    let Ok(req) = serde_json::from_slice::<LoginRequest>(&body) else {
        debug!("rejecting undecodable login body");
        return (StatusCode::BAD_REQUEST, "Invalid request payload.\n");
    };

    if store.verify(&req.username, &req.password) {
        (StatusCode::OK, "Login successful.\n")
    } else {
        debug!(username = %req.username, "invalid credentials");
        (StatusCode::UNAUTHORIZED, "Invalid username or password.\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, header};
    use tower::ServiceExt;

    async fn post_login(body: &str) -> StatusCode {
        let app = build_app(UserStore::default());
        let req = Request::post("/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    async fn post_login_untyped(body: &str) -> StatusCode {
        let app = build_app(UserStore::default());
        let req = Request::post("/login")
            .body(Body::from(body.to_owned()))
            .unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn correct_password_is_accepted() {
        let status = post_login(r#"{"username":"user1","password":"password1"}"#).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let status = post_login(r#"{"username":"user1","password":"password2"}"#).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let status = post_login(r#"{"username":"nobody","password":"password1"}"#).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        assert_eq!(post_login("not json").await, StatusCode::BAD_REQUEST);
        assert_eq!(post_login("").await, StatusCode::BAD_REQUEST);
        assert_eq!(post_login(r#"{"username":1}"#).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_field_is_unauthorized() {
        assert_eq!(post_login(r#"{"username":"user1"}"#).await, StatusCode::UNAUTHORIZED);
        assert_eq!(post_login("{}").await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn body_is_decoded_without_content_type() {
        let ok = post_login_untyped(r#"{"username":"user1","password":"password1"}"#).await;
        assert_eq!(ok, StatusCode::OK);
        let denied = post_login_untyped(r#"{"username":"user1","password":"password2"}"#).await;
        assert_eq!(denied, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = build_app(UserStore::default());
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn custom_store_verifies() {
        let store = UserStore::new([("a", "b")]);
        assert!(store.verify("a", "b"));
        assert!(!store.verify("a", "c"));
        assert!(!store.verify("user1", "password1"));
    }
}
