use askama::Template;
use axum::Router;
use axum::extract::{Extension, Form, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::{decode, encode};
use std::sync::Arc;

use crate::user::{UserService, UserServiceError};

pub mod api;

/// Name of the session cookie carrying the signed token.
pub const SESSION_COOKIE: &str = "auth_token";

/// Represents the currently authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i32,
    pub username: String,
}

impl CurrentUser {
    /// Creates a new CurrentUser instance.
    pub fn new(id: i32, username: String) -> Self {
        Self { id, username }
    }
}

/// Authentication state: the credential store handle and the JWT secret.
#[derive(Clone)]
pub struct AuthState {
    pub db: Arc<sea_orm::DatabaseConnection>,
    pub jwt_secret: String,
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct Claims {
    pub sub: i32,         // ID of the authenticated user
    pub username: String, // Username of the authenticated user
    pub exp: usize,       // Expiry time of the token
    pub iat: usize,       // Issued at time of the token
}

/// Custom error type for authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Represents an error during template rendering.
    /// The specific `askama::Error` is captured as the source of this error.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents an error during JWT operations.
    #[error("JWT operation failed")]
    JwtError,
    /// Represents a user service error.
    #[error("User service error")]
    Service(#[from] UserServiceError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "authentication operation failed");
        let user_facing_error_message =
            "An unexpected error occurred while processing your request. Please try again later.";
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!(
                "<h1>Internal Server Error</h1><p>{}</p>",
                user_facing_error_message
            )),
        )
            .into_response()
    }
}

pub fn encode_jwt(user_id: i32, username: &str, jwt_secret: &str) -> anyhow::Result<String> {
    let now = chrono::Utc::now();
    let expire = chrono::Duration::hours(24);
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (now + expire).timestamp() as usize,
        iat: now.timestamp() as usize,
    };
    let jwt = encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(jwt_secret.as_bytes()),
    )?;
    Ok(jwt)
}

pub fn decode_jwt(token: &str, jwt_secret: &str) -> anyhow::Result<Claims> {
    let token_data = decode(
        token,
        &jsonwebtoken::DecodingKey::from_secret(jwt_secret.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Builds the session cookie holding a freshly signed token.
pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(false) // Set to true in production with HTTPS
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(24))
        .path("/")
        .build()
}

/// Builds the cookie that removes the session.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

/// Authentication middleware that checks for a valid session token and sets
/// the CurrentUser extension. This middleware only populates the extension
/// and does not perform redirects.
pub async fn auth_user_middleware(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token_cookie) = jar.get(SESSION_COOKIE) {
        if let Ok(claims) = decode_jwt(token_cookie.value(), &state.jwt_secret) {
            let current_user = CurrentUser::new(claims.sub, claims.username);
            request.extensions_mut().insert(current_user);
        }
    }

    next.run(request).await
}

/// Login redirect middleware that redirects unauthenticated users to the
/// login page. This middleware should be applied after auth_user_middleware
/// to check for the CurrentUser extension.
pub async fn login_redirect_middleware(request: Request, next: Next) -> Response {
    let is_authenticated = request.extensions().get::<CurrentUser>().is_some();

    if !is_authenticated {
        return Redirect::to("/login").into_response();
    }

    next.run(request).await
}

/// Represents the login request payload.
#[derive(serde::Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub username: Option<String>,
    pub error: Option<String>,
}

/// Handles GET requests to display the login page.
#[tracing::instrument]
pub async fn login_page_handler(
    current_user: Option<Extension<CurrentUser>>,
) -> Result<Html<String>, AuthError> {
    let username = current_user.map(|Extension(user)| user.username);

    let template = LoginTemplate {
        username,
        error: None,
    };
    template.render().map(Html).map_err(AuthError::from)
}

/// Handles the login form submission.
///
/// Valid credentials establish a session and redirect to the task list. The
/// failure message never reveals whether the username exists.
#[tracing::instrument(skip(state, jar, payload))]
pub async fn login_handler(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    Form(payload): Form<LoginRequest>,
) -> Result<Response, AuthError> {
    let service = UserService::new(&state.db);

    match service
        .verify_credentials(&payload.username, &payload.password)
        .await?
    {
        Some(user) => {
            let jwt_token = encode_jwt(user.id(), user.username(), &state.jwt_secret)
                .map_err(|_| AuthError::JwtError)?;
            let updated_jar = jar.add(session_cookie(jwt_token));

            tracing::info!(username = %user.username(), "user logged in");
            Ok((updated_jar, Redirect::to("/tasks")).into_response())
        }
        None => {
            tracing::warn!(username = %payload.username, "login rejected");
            let template = LoginTemplate {
                username: None,
                error: Some(
                    "Please enter a correct username and password. Note that both fields \
                     may be case-sensitive."
                        .to_string(),
                ),
            };
            let html = template.render().map_err(AuthError::from)?;
            Ok(Html(html).into_response())
        }
    }
}

/// Handles logout: removes the session cookie and returns to the login page.
#[tracing::instrument(skip(jar))]
pub async fn logout_handler(jar: CookieJar) -> (CookieJar, Redirect) {
    (jar.remove(removal_cookie()), Redirect::to("/login"))
}

/// Creates a login router with authentication routes.
pub fn create_login_router(state: Arc<AuthState>) -> Router<()> {
    Router::new()
        .route("/login", axum::routing::post(login_handler))
        .route("/login", axum::routing::get(login_page_handler))
        .with_state(state)
}
