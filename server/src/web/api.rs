use axum::Router;
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::AuthState;
use crate::auth::api::v1::{api_auth_middleware, require_auth_middleware};
use crate::task::web::TaskState;
use crate::task::{TaskServiceError, api as task_api};
use crate::user::web::UserState;
use crate::user::{UserServiceError, api as user_api};
use crate::validation::ValidationErrors;
use crate::{auth, user};

/// JSON error body with a single human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct DetailResponse {
    pub detail: String,
}

impl DetailResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Error type shared by the JSON API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// One or more fields failed validation; serialized as a field ->
    /// messages map.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    /// Login rejected. Deliberately does not say why.
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// The resource does not exist for this requester. Identical for a
    /// missing row and one owned by somebody else.
    #[error("Not found")]
    NotFound,
    /// An unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TaskServiceError> for ApiError {
    fn from(err: TaskServiceError) -> Self {
        match err {
            TaskServiceError::Validation(errors) => ApiError::Validation(errors),
            TaskServiceError::NotFound(_) => ApiError::NotFound,
            TaskServiceError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::Validation(errors) => ApiError::Validation(errors),
            UserServiceError::Database(e) => ApiError::Internal(e.to_string()),
            UserServiceError::PasswordHash(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(errors)).into_response()
            }
            ApiError::InvalidCredentials => (
                StatusCode::BAD_REQUEST,
                Json(DetailResponse::new("Invalid credentials")),
            )
                .into_response(),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(DetailResponse::new("Not found.")),
            )
                .into_response(),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "API request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(DetailResponse::new("Internal server error.")),
                )
                    .into_response()
            }
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        user_api::v1::register_handler,
        auth::api::v1::json_login_handler,
        auth::api::v1::json_logout_handler,
        task_api::v1::list_tasks_handler,
        task_api::v1::create_task_handler,
        task_api::v1::retrieve_task_handler,
        task_api::v1::put_task_handler,
        task_api::v1::patch_task_handler,
        task_api::v1::delete_task_handler,
    ),
    components(schemas(
        user_api::v1::RegisterRequest,
        user_api::v1::RegisterResponse,
        auth::api::v1::JsonLoginRequest,
        auth::api::v1::LoginResponse,
        auth::api::v1::MessageResponse,
        task_api::v1::TaskJson,
        task_api::v1::TaskWriteRequest,
        DetailResponse,
    )),
    tags(
        (name = "Auth", description = "Registration, login and logout"),
        (name = "Tasks", description = "Owner-scoped task management")
    )
)]
struct ApiDoc;

/// Creates the JSON API router.
///
/// Registration and login are public; everything else runs behind the
/// per-request authentication middleware pair. Interactive documentation is
/// served under /api/docs.
pub fn create_api_router(
    auth_state: Arc<AuthState>,
    user_state: Arc<UserState>,
    task_state: Arc<TaskState>,
) -> Router {
    let public_routes = Router::new()
        .merge(user::api::v1::create_register_router(user_state))
        .merge(auth::api::v1::create_login_router(auth_state.clone()));

    let protected_routes = Router::new()
        .merge(task_api::v1::create_task_router(task_state))
        .merge(auth::api::v1::create_logout_router())
        .layer(ServiceBuilder::new().layer(from_fn(require_auth_middleware)));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(ServiceBuilder::new().layer(from_fn_with_state(auth_state, api_auth_middleware)))
        .merge(SwaggerUi::new("/api/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
