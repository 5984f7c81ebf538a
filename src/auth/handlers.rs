use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthUserRequest, AuthUserResponse, CreateUserRequest, CreateUserResponse,
            ErrorResponse, MessageResponse,
        },
        extractors::SessionToken,
        services::AccountError,
    },
    state::AppState,
};

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn reject(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            success: false,
            message: message.to_string(),
            error: None,
        }),
    )
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    warn!(error = %rejection, "invalid request body");
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            success: false,
            message: "Invalid request body".into(),
            error: Some(rejection.body_text()),
        }),
    )
}

fn account_error(err: AccountError) -> ApiError {
    match err {
        AccountError::Conflict => reject(StatusCode::CONFLICT, "User already exists"),
        AccountError::Unauthorized => reject(StatusCode::UNAUTHORIZED, "Invalid credentials"),
        AccountError::Failed(msg) => reject(StatusCode::INTERNAL_SERVER_ERROR, &sentence_case(msg)),
    }
}

fn sentence_case(msg: &str) -> String {
    let mut chars = msg.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/createuser", post(create_user))
        .route("/authuser", post(auth_user))
        .route("/logout", post(logout))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateUserResponse>), ApiError> {
    let Json(payload) = payload.map_err(bad_body)?;
    // Stored exactly as sent; blank checks only look past surrounding whitespace.
    let username = payload.username.as_str();
    let email = payload.email.as_str();

    if username.trim().is_empty() || payload.password.trim().is_empty() || email.trim().is_empty() {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "Username, password, and email are required",
        ));
    }

    if !(3..=50).contains(&username.chars().count()) {
        warn!("username length out of range");
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "Username must be between 3 and 50 characters",
        ));
    }

    if payload.password.chars().count() < 6 {
        warn!("password too short");
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "Password must be at least 6 characters",
        ));
    }

    if !is_valid_email(email) {
        warn!(email = %email, "invalid email");
        return Err(reject(StatusCode::BAD_REQUEST, "Invalid email"));
    }

    let user_id = state
        .accounts
        .create_user(username, &payload.password, email)
        .await
        .map_err(account_error)?;

    info!(user_id = %user_id, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            success: true,
            message: "User created successfully".into(),
            user_id: Some(user_id),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn auth_user(
    State(state): State<AppState>,
    payload: Result<Json<AuthUserRequest>, JsonRejection>,
) -> Result<Json<AuthUserResponse>, ApiError> {
    let Json(payload) = payload.map_err(bad_body)?;
    let username = payload.username.as_str();

    if username.trim().is_empty() || payload.password.trim().is_empty() {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "Username and password are required",
        ));
    }

    let auth = state
        .accounts
        .authenticate(username, &payload.password)
        .await
        .map_err(account_error)?;

    Ok(Json(AuthUserResponse {
        success: true,
        message: "Authentication successful".into(),
        token: auth.token,
        user: auth.user,
    }))
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> Result<Json<MessageResponse>, ApiError> {
    state.accounts.logout(&token).await.map_err(account_error)?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Logged out".into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{app::build_app, storage::MemoryStore};
    use axum::{
        body::Body,
        http::{header, Method, Request},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn app() -> Router {
        build_app(AppState::fake())
    }

    #[tokio::test]
    async fn createuser_returns_201_with_user_id() {
        let (status, body) = send(
            app(),
            post_json(
                "/login/createuser",
                json!({"username": "alice", "password": "secret1", "email": "a@x.com"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "User created successfully");
        assert_eq!(body["user_id"].as_str().unwrap().len(), 32);
    }

    #[tokio::test]
    async fn duplicate_createuser_is_409() {
        let app = app();
        let req = json!({"username": "alice", "password": "secret1", "email": "a@x.com"});
        let (first, _) = send(app.clone(), post_json("/login/createuser", req.clone())).await;
        assert_eq!(first, StatusCode::CREATED);

        let (status, body) = send(app, post_json("/login/createuser", req)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, json!({"success": false, "message": "User already exists"}));
    }

    #[tokio::test]
    async fn missing_or_invalid_fields_are_400() {
        let cases = [
            json!({"username": "alice", "password": "secret1"}),
            json!({"username": "   ", "password": "secret1", "email": "a@x.com"}),
            json!({"username": "al", "password": "secret1", "email": "a@x.com"}),
            json!({"username": "alice", "password": "123", "email": "a@x.com"}),
            json!({"username": "alice", "password": "secret1", "email": "not-an-email"}),
        ];
        for case in cases {
            let (status, body) = send(app(), post_json("/login/createuser", case.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "case {case}");
            assert_eq!(body["success"], false);
        }
    }

    #[tokio::test]
    async fn malformed_json_is_400_with_detail() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/login/authuser")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid request body");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn authuser_issues_token_and_public_user() {
        let app = app();
        send(
            app.clone(),
            post_json(
                "/login/createuser",
                json!({"username": "alice", "password": "secret1", "email": "A@X.com"}),
            ),
        )
        .await;

        let (status, body) = send(
            app,
            post_json("/login/authuser", json!({"username": "alice", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["token"].as_str().unwrap().len(), 64);

        let user = body["user"].as_object().unwrap();
        assert_eq!(user["username"], "alice");
        assert_eq!(user["email"], "A@X.com");
        for field in ["id", "created_at", "updated_at"] {
            assert!(user.contains_key(field), "missing {field}");
        }
        assert!(!user.contains_key("password"));
        assert!(!user.contains_key("password_hash"));
    }

    #[tokio::test]
    async fn username_and_email_are_stored_as_sent() {
        let app = app();
        let (status, _) = send(
            app.clone(),
            post_json(
                "/login/createuser",
                json!({"username": " Bob ", "password": "secret1", "email": "Bob@X.com"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = send(
            app.clone(),
            post_json("/login/authuser", json!({"username": "bob", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(
            app,
            post_json("/login/authuser", json!({"username": " Bob ", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["username"], " Bob ");
        assert_eq!(body["user"]["email"], "Bob@X.com");
    }

    #[tokio::test]
    async fn bad_credentials_are_401_with_one_message() {
        let app = app();
        send(
            app.clone(),
            post_json(
                "/login/createuser",
                json!({"username": "realuser", "password": "secret1", "email": "r@x.com"}),
            ),
        )
        .await;

        let (s1, b1) = send(
            app.clone(),
            post_json("/login/authuser", json!({"username": "nouser", "password": "x"})),
        )
        .await;
        let (s2, b2) = send(
            app,
            post_json("/login/authuser", json!({"username": "realuser", "password": "wrongpass"})),
        )
        .await;
        assert_eq!(s1, StatusCode::UNAUTHORIZED);
        assert_eq!(s2, StatusCode::UNAUTHORIZED);
        assert_eq!(b1, b2);
        assert_eq!(b1["message"], "Invalid credentials");
    }

    #[tokio::test]
    async fn store_outage_is_500_without_internal_detail() {
        let store = Arc::new(MemoryStore::new());
        store.set_unreachable(true);
        let app = build_app(AppState::fake_with_store(store));

        let (status, body) = send(
            app,
            post_json(
                "/login/createuser",
                json!({"username": "alice", "password": "secret1", "email": "a@x.com"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"success": false, "message": "Failed to create user"}));
    }

    #[tokio::test]
    async fn logout_requires_bearer_and_is_idempotent() {
        let app = app();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/login/logout")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app.clone(), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        for _ in 0..2 {
            let req = Request::builder()
                .method(Method::POST)
                .uri("/login/logout")
                .header(header::AUTHORIZATION, "Bearer deadbeef")
                .body(Body::empty())
                .unwrap();
            let (status, body) = send(app.clone(), req).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["success"], true);
        }
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("a x@y.com"));
    }

    #[test]
    fn failure_messages_are_sentence_cased() {
        assert_eq!(sentence_case("authentication failed"), "Authentication failed");
        assert_eq!(sentence_case(""), "");
    }
}
