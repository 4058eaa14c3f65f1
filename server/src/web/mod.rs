use askama::Template;
use axum::Router;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::Html;
use migration::MigratorTrait;
use sea_orm::Database;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{
    AuthState, CurrentUser, auth_user_middleware, create_login_router, login_redirect_middleware,
    logout_handler,
};
use crate::config::Config;
use crate::task::web::{TaskState, create_task_router};
use crate::user::web::{UserState, create_register_router};

pub mod api;

/// Custom error type for web handler operations.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// Represents an error during template rendering.
    /// The specific `askama::Error` is captured as the source of this error.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
}

impl axum::response::IntoResponse for WebError {
    fn into_response(self) -> axum::response::Response {
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

/// Assembles the full application router from its page and API parts.
pub fn create_app(db: Arc<sea_orm::DatabaseConnection>, jwt_secret: String) -> Router {
    let auth_state = Arc::new(AuthState {
        db: db.clone(),
        jwt_secret,
    });
    let user_state = Arc::new(UserState { db: db.clone() });
    let task_state = Arc::new(TaskState { db });

    let protected_routes = Router::new()
        .merge(create_task_router(task_state.clone()))
        .route("/logout", axum::routing::post(logout_handler))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(auth_state.clone(), auth_user_middleware))
                .layer(from_fn(login_redirect_middleware)),
        );

    let public_routes = Router::new()
        .route("/health", axum::routing::get(health_check_handler))
        .route("/", axum::routing::get(welcome_handler))
        .merge(create_login_router(auth_state.clone()))
        .merge(create_register_router(user_state.clone()))
        .layer(ServiceBuilder::new().layer(from_fn_with_state(
            auth_state.clone(),
            auth_user_middleware,
        )));

    let api_routes = api::create_api_router(auth_state, user_state, task_state);

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .merge(api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetSensitiveRequestHeadersLayer::new([AUTHORIZATION, COOKIE]))
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: Config) -> anyhow::Result<()> {
    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let db = Database::connect(&config.db_url).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    let app = create_app(Arc::new(db), config.jwt_secret);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}

/// Handles GET / with a welcome page pointing at the main flows.
#[tracing::instrument]
pub async fn welcome_handler(
    current_user: Option<Extension<CurrentUser>>,
) -> Result<Html<String>, WebError> {
    let username = current_user.map(|Extension(user)| user.username);
    let template = IndexTemplate { username };
    template.render().map(Html).map_err(WebError::from)
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    username: Option<String>,
}
