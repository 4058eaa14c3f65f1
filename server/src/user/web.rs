use askama::Template;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Router, routing::get};
use serde::Deserialize;
use std::sync::Arc;

use crate::user::{RegisterDraft, UserService, UserServiceError};

#[derive(Clone, Debug)]
pub struct UserState {
    pub db: Arc<sea_orm::DatabaseConnection>,
}

/// Registration form fields as submitted by the browser.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password1: Option<String>,
    #[serde(default)]
    password2: Option<String>,
}

/// Custom error type for registration page operations.
#[derive(Debug, thiserror::Error)]
enum RegisterError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents a user service error.
    #[error("User service error")]
    Service(#[from] UserServiceError),
}

impl IntoResponse for RegisterError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "registration page failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(
                "<h1>Internal Server Error</h1><p>An unexpected error occurred while \
                 processing your request. Please try again later.</p>"
                    .to_string(),
            ),
        )
            .into_response()
    }
}

#[derive(Template)]
#[template(path = "register.html")]
struct RegisterTemplate {
    username: String,
    errors: Vec<String>,
}

/// Handles GET requests to display the registration form.
#[tracing::instrument]
async fn register_page_handler() -> Result<Html<String>, RegisterError> {
    let template = RegisterTemplate {
        username: String::new(),
        errors: Vec::new(),
    };
    template.render().map(Html).map_err(RegisterError::from)
}

/// Handles the registration form submission.
///
/// Redirects to the login page on success; re-renders the form with field
/// errors when validation fails.
#[tracing::instrument(skip(state, form))]
async fn register_handler(
    State(state): State<Arc<UserState>>,
    Form(form): Form<RegisterForm>,
) -> Result<Response, RegisterError> {
    let service = UserService::new(&state.db);
    let draft = RegisterDraft {
        username: form.username.clone(),
        password: form.password1,
        password2: form.password2,
    };

    match service.register(draft).await {
        Ok(_) => Ok(Redirect::to("/login").into_response()),
        Err(UserServiceError::Validation(errors)) => {
            let template = RegisterTemplate {
                username: form.username.unwrap_or_default(),
                errors: errors.messages(),
            };
            let html = template.render().map_err(RegisterError::from)?;
            Ok(Html(html).into_response())
        }
        Err(err) => Err(RegisterError::Service(err)),
    }
}

/// Creates the registration router.
pub fn create_register_router(state: Arc<UserState>) -> Router {
    Router::new()
        .route("/register", get(register_page_handler).post(register_handler))
        .with_state(state)
}
