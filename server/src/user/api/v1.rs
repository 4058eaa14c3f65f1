use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::{Router, routing::post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::user::web::UserState;
use crate::user::{RegisterDraft, UserService};
use crate::web::api::ApiError;

/// JSON request payload for account registration.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub password2: Option<String>,
}

/// Public view of a registered account.
#[derive(Debug, Serialize, ToSchema)]
pub struct RegisteredUser {
    pub username: String,
}

/// JSON response for a successful registration.
#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub user: RegisteredUser,
}

/// Handler for POST /api/register/ - creates a new account.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/api/register/",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = RegisterResponse),
        (status = 400, description = "Validation errors, as a field to messages map")
    ),
    tag = "Auth"
)]
pub async fn register_handler(
    State(state): State<Arc<UserState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let service = UserService::new(&state.db);
    let draft = RegisterDraft {
        username: payload.username,
        password: payload.password,
        password2: payload.password2,
    };

    let user = service.register(draft).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: RegisteredUser {
                username: user.username().to_string(),
            },
        }),
    ))
}

/// Creates the registration API router.
pub fn create_register_router(state: Arc<UserState>) -> Router {
    Router::new()
        .route("/api/register/", post(register_handler))
        .with_state(state)
}
