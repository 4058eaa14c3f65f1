use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use axum::{
    Router,
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::{
    AuthState, CurrentUser, SESSION_COOKIE, decode_jwt, encode_jwt, removal_cookie, session_cookie,
};
use crate::user::UserService;
use crate::validation::ValidationErrors;
use crate::web::api::{ApiError, DetailResponse};

/// JSON request payload for API login.
#[derive(Debug, Deserialize, ToSchema)]
pub struct JsonLoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// JSON response for a successful API login.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub message: String,
    #[serde(rename = "Username")]
    pub username: String,
}

/// JSON response for logout.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// API authentication middleware.
///
/// The strategy is chosen once per request from a single header-presence
/// check: a request carrying an Authorization header is authenticated by its
/// Basic credentials against the store; any other request falls back to the
/// session cookie. Sets the CurrentUser extension on success and never
/// rejects by itself.
pub async fn api_auth_middleware(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(auth_header) = request.headers().get(header::AUTHORIZATION) {
        if let Some((username, password)) = basic_credentials(auth_header) {
            let service = UserService::new(&state.db);
            if let Ok(Some(user)) = service.verify_credentials(&username, &password).await {
                let current_user = CurrentUser::new(user.id(), user.username().to_string());
                request.extensions_mut().insert(current_user);
            }
        }
    } else if let Some(token_cookie) = jar.get(SESSION_COOKIE) {
        if let Ok(claims) = decode_jwt(token_cookie.value(), &state.jwt_secret) {
            let current_user = CurrentUser::new(claims.sub, claims.username);
            request.extensions_mut().insert(current_user);
        }
    }

    next.run(request).await
}

/// Middleware that ensures the current user is authenticated.
/// Returns UNAUTHORIZED if the CurrentUser extension is not found.
/// This middleware should be applied after api_auth_middleware.
pub async fn require_auth_middleware(request: Request, next: Next) -> Response {
    let is_authenticated = request.extensions().get::<CurrentUser>().is_some();

    if !is_authenticated {
        return (
            StatusCode::UNAUTHORIZED,
            Json(DetailResponse::new(
                "Authentication credentials were not provided.",
            )),
        )
            .into_response();
    }

    next.run(request).await
}

/// Extracts the username/password pair from a Basic Authorization header.
fn basic_credentials(header: &HeaderValue) -> Option<(String, String)> {
    let value = header.to_str().ok()?;
    let encoded = value
        .strip_prefix("Basic ")
        .or_else(|| value.strip_prefix("basic "))?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Handler for POST /api/login/ - establishes a session.
///
/// Any existing session is discarded before the credentials are checked. The
/// failure response does not distinguish an unknown username from a wrong
/// password.
#[tracing::instrument(skip(state, jar, payload))]
#[utoipa::path(
    post,
    path = "/api/login/",
    request_body = JsonLoginRequest,
    responses(
        (status = 200, description = "Session established", body = LoginResponse),
        (status = 400, description = "Invalid credentials or missing fields")
    ),
    tag = "Auth"
)]
pub async fn json_login_handler(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    Json(payload): Json<JsonLoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), (CookieJar, ApiError)> {
    // Log out any existing session before attempting a new login. A failed
    // attempt still ends the old session.
    let jar = jar.remove(removal_cookie());

    let mut errors = ValidationErrors::new();
    if payload.username.as_deref().unwrap_or("").is_empty() {
        errors.add("username", "This field is required.");
    }
    if payload.password.as_deref().unwrap_or("").is_empty() {
        errors.add("password", "This field is required.");
    }
    if !errors.is_empty() {
        return Err((jar, ApiError::Validation(errors)));
    }

    let username = payload.username.unwrap_or_default();
    let password = payload.password.unwrap_or_default();

    let service = UserService::new(&state.db);
    let user = match service.verify_credentials(&username, &password).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!(username = %username, "API login rejected");
            return Err((jar, ApiError::InvalidCredentials));
        }
        Err(err) => return Err((jar, ApiError::from(err))),
    };

    let jwt_token = match encode_jwt(user.id(), user.username(), &state.jwt_secret) {
        Ok(token) => token,
        Err(err) => return Err((jar, ApiError::Internal(err.to_string()))),
    };

    tracing::info!(username = %user.username(), "API login succeeded");
    Ok((
        jar.add(session_cookie(jwt_token)),
        Json(LoginResponse {
            message: "Login successful".to_string(),
            username: user.username().to_string(),
        }),
    ))
}

/// Handler for GET/POST /api/logout/ - ends the session.
#[tracing::instrument(skip(jar))]
#[utoipa::path(
    post,
    path = "/api/logout/",
    responses(
        (status = 200, description = "Session ended", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = DetailResponse)
    ),
    tag = "Auth"
)]
pub async fn json_logout_handler(jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    (
        jar.remove(removal_cookie()),
        Json(MessageResponse {
            message: "Logout successful".to_string(),
        }),
    )
}

/// Creates the login API router (no authentication required).
pub fn create_login_router(state: Arc<AuthState>) -> Router<()> {
    Router::new()
        .route("/api/login/", post(json_login_handler))
        .with_state(state)
}

/// Creates the logout API router. Both verbs end the session.
pub fn create_logout_router() -> Router<()> {
    Router::new().route(
        "/api/logout/",
        get(json_logout_handler).post(json_logout_handler),
    )
}
