use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::{Router, routing::get};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::auth::CurrentUser;
use crate::task::web::TaskState;
use crate::task::{Task, TaskFilter, TaskInput, TaskService};
use crate::validation::ValidationErrors;
use crate::web::api::ApiError;

/// JSON representation of a Task for API responses.
///
/// `id`, `user` and the timestamps are server-assigned; write requests never
/// carry them.
#[derive(Debug, Serialize, ToSchema)]
pub struct TaskJson {
    /// Unique identifier for the task
    id: i32,
    /// ID of the owning user
    user: i32,
    /// Short name of the task
    name: String,
    /// Longer free-form description
    description: String,
    /// One of "not_started", "in_progress", "completed"
    status: String,
    /// Creation instant, RFC 3339
    created_at: DateTime<Utc>,
    /// Last modification instant, RFC 3339
    updated_at: DateTime<Utc>,
}

impl From<Task> for TaskJson {
    fn from(task: Task) -> Self {
        Self {
            id: task.id(),
            user: task.user_id(),
            name: task.name().to_string(),
            description: task.description().to_string(),
            status: task.status().as_str().to_string(),
            created_at: task.created_at(),
            updated_at: task.updated_at(),
        }
    }
}

/// Writable task fields for create and update requests. Unknown fields,
/// including any client-supplied owner, are ignored.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskWriteRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

impl From<TaskWriteRequest> for TaskInput {
    fn from(body: TaskWriteRequest) -> Self {
        TaskInput {
            name: body.name,
            description: body.description,
            status: body.status,
        }
    }
}

/// Query parameters for filtering the task list.
#[derive(Debug, Deserialize, IntoParams)]
pub struct TaskListQuery {
    /// Case-insensitive substring matched against name and description
    #[serde(default)]
    q: Option<String>,
    /// Keep tasks created on or after this date (YYYY-MM-DD)
    #[serde(default)]
    date_from: Option<String>,
    /// Keep tasks created on or before this date (YYYY-MM-DD)
    #[serde(default)]
    date_to: Option<String>,
}

impl From<TaskListQuery> for TaskFilter {
    fn from(query: TaskListQuery) -> Self {
        TaskFilter {
            q: query.q,
            date_from: query.date_from,
            date_to: query.date_to,
        }
    }
}

/// Handler for GET /api/tasks/ - lists the authenticated user's tasks.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/tasks/",
    params(TaskListQuery),
    responses(
        (status = 200, description = "Tasks visible to the requester", body = [TaskJson]),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Tasks"
)]
pub async fn list_tasks_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<TaskJson>>, ApiError> {
    let service = TaskService::new(&state.db);
    let tasks = service.list_tasks(user.id, &TaskFilter::from(query)).await?;
    Ok(Json(tasks.into_iter().map(TaskJson::from).collect()))
}

/// Handler for POST /api/tasks/ - creates a task owned by the requester.
#[tracing::instrument(skip(state, body))]
#[utoipa::path(
    post,
    path = "/api/tasks/",
    request_body = TaskWriteRequest,
    responses(
        (status = 201, description = "Task created", body = TaskJson),
        (status = 400, description = "Validation errors, as a field to messages map"),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Tasks"
)]
pub async fn create_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<TaskWriteRequest>,
) -> Result<(StatusCode, Json<TaskJson>), ApiError> {
    let service = TaskService::new(&state.db);
    let task = service.create_task(user.id, TaskInput::from(body)).await?;
    Ok((StatusCode::CREATED, Json(TaskJson::from(task))))
}

/// Handler for GET /api/tasks/{id}/ - retrieves one owned task.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/tasks/{id}/",
    params(("id" = i32, Path, description = "Task ID")),
    responses(
        (status = 200, description = "The task", body = TaskJson),
        (status = 404, description = "No owned task with this ID")
    ),
    tag = "Tasks"
)]
pub async fn retrieve_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<TaskJson>, ApiError> {
    let service = TaskService::new(&state.db);
    let task = service.get_task(user.id, id).await?;
    Ok(Json(TaskJson::from(task)))
}

/// Handler for PUT /api/tasks/{id}/ - full update; `name` is required.
#[tracing::instrument(skip(state, body))]
#[utoipa::path(
    put,
    path = "/api/tasks/{id}/",
    params(("id" = i32, Path, description = "Task ID")),
    request_body = TaskWriteRequest,
    responses(
        (status = 200, description = "Updated task", body = TaskJson),
        (status = 400, description = "Validation errors"),
        (status = 404, description = "No owned task with this ID")
    ),
    tag = "Tasks"
)]
pub async fn put_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(body): Json<TaskWriteRequest>,
) -> Result<Json<TaskJson>, ApiError> {
    if body.name.is_none() {
        let mut errors = ValidationErrors::new();
        errors.add("name", "This field is required.");
        return Err(ApiError::Validation(errors));
    }
    update_task(&state, &user, id, body).await
}

/// Handler for PATCH /api/tasks/{id}/ - partial update.
#[tracing::instrument(skip(state, body))]
#[utoipa::path(
    patch,
    path = "/api/tasks/{id}/",
    params(("id" = i32, Path, description = "Task ID")),
    request_body = TaskWriteRequest,
    responses(
        (status = 200, description = "Updated task", body = TaskJson),
        (status = 400, description = "Validation errors"),
        (status = 404, description = "No owned task with this ID")
    ),
    tag = "Tasks"
)]
pub async fn patch_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(body): Json<TaskWriteRequest>,
) -> Result<Json<TaskJson>, ApiError> {
    update_task(&state, &user, id, body).await
}

async fn update_task(
    state: &TaskState,
    user: &CurrentUser,
    id: i32,
    body: TaskWriteRequest,
) -> Result<Json<TaskJson>, ApiError> {
    let service = TaskService::new(&state.db);
    let task = service
        .update_task(user.id, id, TaskInput::from(body))
        .await?;
    Ok(Json(TaskJson::from(task)))
}

/// Handler for DELETE /api/tasks/{id}/ - removes one owned task.
///
/// A repeat delete of the same id is a 404, not a silent success.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/api/tasks/{id}/",
    params(("id" = i32, Path, description = "Task ID")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 404, description = "No owned task with this ID")
    ),
    tag = "Tasks"
)]
pub async fn delete_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let service = TaskService::new(&state.db);
    service.delete_task(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Creates the tasks API router.
pub fn create_task_router(state: Arc<TaskState>) -> Router {
    Router::new()
        .route(
            "/api/tasks/",
            get(list_tasks_handler).post(create_task_handler),
        )
        .route(
            "/api/tasks/{id}/",
            get(retrieve_task_handler)
                .put(put_task_handler)
                .patch(patch_task_handler)
                .delete(delete_task_handler),
        )
        .with_state(state)
}
