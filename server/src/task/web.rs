use askama::Template;
use axum::extract::{Extension, Form, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Router, routing::get};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::CurrentUser;
use crate::task::{Task, TaskFilter, TaskInput, TaskService, TaskServiceError};

#[derive(Clone, Debug)]
pub struct TaskState {
    pub db: Arc<sea_orm::DatabaseConnection>,
}

/// Search form fields on the task list page.
#[derive(Debug, Default, Deserialize)]
pub struct SearchForm {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    date_from: Option<String>,
    #[serde(default)]
    date_to: Option<String>,
}

/// Create/edit form fields as submitted by the browser.
#[derive(Debug, Deserialize)]
pub struct TaskForm {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl From<TaskForm> for TaskInput {
    fn from(form: TaskForm) -> Self {
        TaskInput {
            name: form.name,
            description: form.description,
            status: form.status,
        }
    }
}

/// Custom error type for task page operations.
#[derive(Debug, thiserror::Error)]
enum TaskWebError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents a task service error.
    #[error("Task service error")]
    Service(#[from] TaskServiceError),
}

impl IntoResponse for TaskWebError {
    fn into_response(self) -> Response {
        match self {
            TaskWebError::Service(TaskServiceError::NotFound(_)) => (
                StatusCode::NOT_FOUND,
                Html("<h1>Not Found</h1><p>No task matches the given query.</p>".to_string()),
            )
                .into_response(),
            err => {
                tracing::error!(error = %err, "task page failed");
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
    }
}

#[derive(Template)]
#[template(path = "tasks/task_list.html")]
struct TaskListTemplate {
    username: String,
    tasks: Vec<Task>,
    q: String,
    date_from: String,
    date_to: String,
}

#[derive(Template)]
#[template(path = "tasks/create_task.html")]
struct CreateTaskTemplate {
    name: String,
    description: String,
    status: String,
    errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "tasks/update_task.html")]
struct UpdateTaskTemplate {
    id: i32,
    name: String,
    description: String,
    status: String,
    errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "tasks/delete_task.html")]
struct DeleteTaskTemplate {
    id: i32,
    name: String,
}

/// Handler for GET /tasks that lists the authenticated user's tasks.
#[tracing::instrument(skip(state))]
async fn list_tasks_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Html<String>, TaskWebError> {
    render_task_list(&state, &user, SearchForm::default()).await
}

/// Handler for the search form submission on the task list page.
#[tracing::instrument(skip(state, form))]
async fn search_tasks_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Form(form): Form<SearchForm>,
) -> Result<Html<String>, TaskWebError> {
    render_task_list(&state, &user, form).await
}

async fn render_task_list(
    state: &TaskState,
    user: &CurrentUser,
    form: SearchForm,
) -> Result<Html<String>, TaskWebError> {
    let service = TaskService::new(&state.db);
    let filter = TaskFilter {
        q: form.q.clone(),
        date_from: form.date_from.clone(),
        date_to: form.date_to.clone(),
    };
    let tasks = service.list_tasks(user.id, &filter).await?;

    let template = TaskListTemplate {
        username: user.username.clone(),
        tasks,
        q: form.q.unwrap_or_default(),
        date_from: form.date_from.unwrap_or_default(),
        date_to: form.date_to.unwrap_or_default(),
    };
    template.render().map(Html).map_err(TaskWebError::from)
}

/// Handler for serving the create task form.
#[tracing::instrument]
async fn add_task_form_handler() -> Result<Html<String>, TaskWebError> {
    let template = CreateTaskTemplate {
        name: String::new(),
        description: String::new(),
        status: "not_started".to_string(),
        errors: Vec::new(),
    };
    template.render().map(Html).map_err(TaskWebError::from)
}

/// Handler for creating a task via POST request.
///
/// Redirects to the task list on success; re-renders the form with field
/// errors when validation fails.
#[tracing::instrument(skip(state, form))]
async fn create_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Form(form): Form<TaskForm>,
) -> Result<Response, TaskWebError> {
    let service = TaskService::new(&state.db);
    let template = CreateTaskTemplate {
        name: form.name.clone().unwrap_or_default(),
        description: form.description.clone().unwrap_or_default(),
        status: form.status.clone().unwrap_or_else(|| "not_started".to_string()),
        errors: Vec::new(),
    };

    match service.create_task(user.id, TaskInput::from(form)).await {
        Ok(_) => Ok(Redirect::to("/tasks").into_response()),
        Err(TaskServiceError::Validation(errors)) => {
            let template = CreateTaskTemplate {
                errors: errors.messages(),
                ..template
            };
            let html = template.render().map_err(TaskWebError::from)?;
            Ok(Html(html).into_response())
        }
        Err(err) => Err(TaskWebError::Service(err)),
    }
}

/// Handler for serving the edit form. The lookup is owner-scoped: someone
/// else's task renders the same 404 as a nonexistent one.
#[tracing::instrument(skip(state))]
async fn edit_task_form_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Html<String>, TaskWebError> {
    let service = TaskService::new(&state.db);
    let task = service.get_task(user.id, id).await?;

    let template = UpdateTaskTemplate {
        id: task.id(),
        name: task.name().to_string(),
        description: task.description().to_string(),
        status: task.status().as_str().to_string(),
        errors: Vec::new(),
    };
    template.render().map(Html).map_err(TaskWebError::from)
}

/// Handler for updating a task via POST request.
#[tracing::instrument(skip(state, form))]
async fn update_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Form(form): Form<TaskForm>,
) -> Result<Response, TaskWebError> {
    let service = TaskService::new(&state.db);
    let template = UpdateTaskTemplate {
        id,
        name: form.name.clone().unwrap_or_default(),
        description: form.description.clone().unwrap_or_default(),
        status: form.status.clone().unwrap_or_else(|| "not_started".to_string()),
        errors: Vec::new(),
    };

    match service.update_task(user.id, id, TaskInput::from(form)).await {
        Ok(_) => Ok(Redirect::to("/tasks").into_response()),
        Err(TaskServiceError::Validation(errors)) => {
            let template = UpdateTaskTemplate {
                errors: errors.messages(),
                ..template
            };
            let html = template.render().map_err(TaskWebError::from)?;
            Ok(Html(html).into_response())
        }
        Err(err) => Err(TaskWebError::Service(err)),
    }
}

/// Handler for serving the delete confirmation page, owner-scoped.
#[tracing::instrument(skip(state))]
async fn delete_task_form_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Html<String>, TaskWebError> {
    let service = TaskService::new(&state.db);
    let task = service.get_task(user.id, id).await?;

    let template = DeleteTaskTemplate {
        id: task.id(),
        name: task.name().to_string(),
    };
    template.render().map(Html).map_err(TaskWebError::from)
}

/// Handler for deleting a task via POST request.
#[tracing::instrument(skip(state))]
async fn delete_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Redirect, TaskWebError> {
    let service = TaskService::new(&state.db);
    service.delete_task(user.id, id).await?;
    Ok(Redirect::to("/tasks"))
}

/// Creates and returns the task router with all task page routes.
pub fn create_task_router(state: Arc<TaskState>) -> Router {
    Router::new()
        .route("/tasks", get(list_tasks_handler).post(search_tasks_handler))
        .route(
            "/tasks/add",
            get(add_task_form_handler).post(create_task_handler),
        )
        .route(
            "/tasks/{id}/edit",
            get(edit_task_form_handler).post(update_task_handler),
        )
        .route(
            "/tasks/{id}/delete",
            get(delete_task_form_handler).post(delete_task_handler),
        )
        .with_state(state)
}
