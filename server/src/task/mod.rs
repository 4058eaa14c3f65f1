use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder,
};

use crate::entities::task;
use crate::validation::ValidationErrors;

pub use crate::entities::task::TaskStatus;

pub mod api;
pub mod web;

const MAX_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 300;

/// A single to-do item belonging to exactly one user.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Task {
    id: i32,
    name: String,
    description: String,
    status: TaskStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    user_id: i32,
}

impl Task {
    /// Returns the ID of the task.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the task description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the task status.
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns when the task was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the task was last modified.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the ID of the owning user.
    pub fn user_id(&self) -> i32 {
        self.user_id
    }
}

impl From<task::Model> for Task {
    fn from(model: task::Model) -> Self {
        Task {
            id: model.id,
            name: model.name,
            description: model.description,
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
            user_id: model.user_id,
        }
    }
}

/// Optional list filters, exactly as submitted. Parsing is lenient: a date
/// that does not parse leaves its filter unapplied rather than failing the
/// request.
#[derive(Debug, Default, Clone)]
pub struct TaskFilter {
    pub q: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl TaskFilter {
    fn date_from_bound(&self) -> Option<NaiveDate> {
        parse_lenient_date(self.date_from.as_deref())
    }

    fn date_to_bound(&self) -> Option<NaiveDate> {
        parse_lenient_date(self.date_to.as_deref())
    }
}

/// Submitted task fields. `None` means the field was absent; on update an
/// absent field is left untouched.
#[derive(Debug, Default, Clone)]
pub struct TaskInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

/// Error type for TaskService operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskServiceError {
    /// One or more submitted fields failed validation.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    /// Represents a task not found error. Covers both a nonexistent id and
    /// an id owned by another user; callers cannot tell the two apart.
    #[error("Task with ID {0} not found")]
    NotFound(i32),
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct TaskService<'a> {
    db: &'a DatabaseConnection,
}

impl TaskService<'_> {
    pub fn new(db: &DatabaseConnection) -> TaskService {
        TaskService { db }
    }

    /// Returns the tasks visible to `owner_id`, newest ids last.
    ///
    /// The ownership predicate is unconditional; the optional filters AND
    /// onto it and can only narrow the result. `q` matches case-insensitive
    /// substrings of the name or description; the date bounds compare
    /// against the calendar date (UTC) of `created_at` and are inclusive.
    #[tracing::instrument(skip(self))]
    pub async fn list_tasks(
        &self,
        owner_id: i32,
        filter: &TaskFilter,
    ) -> Result<Vec<Task>, TaskServiceError> {
        let mut query = task::Entity::find().filter(task::Column::UserId.eq(owner_id));

        if let Some(q) = filter.q.as_deref().filter(|q| !q.is_empty()) {
            let pattern = format!("%{}%", escape_like(q));
            query = query.filter(
                Condition::any()
                    .add(Expr::col(task::Column::Name).ilike(pattern.clone()))
                    .add(Expr::col(task::Column::Description).ilike(pattern)),
            );
        }

        if let Some(from) = filter.date_from_bound() {
            query = query.filter(task::Column::CreatedAt.gte(day_start(from)));
        }

        if let Some(to) = filter.date_to_bound() {
            if let Some(next_day) = to.succ_opt() {
                query = query.filter(task::Column::CreatedAt.lt(day_start(next_day)));
            }
        }

        let models = query
            .order_by_asc(task::Column::Id)
            .all(self.db)
            .await?;
        Ok(models.into_iter().map(Task::from).collect())
    }

    /// Retrieves a single task owned by `owner_id`.
    #[tracing::instrument(skip(self))]
    pub async fn get_task(&self, owner_id: i32, task_id: i32) -> Result<Task, TaskServiceError> {
        let model = self.find_owned(owner_id, task_id).await?;
        Ok(Task::from(model))
    }

    /// Creates a task owned by `owner_id`.
    ///
    /// The owner is always the authenticated identity passed in here; there
    /// is no way for request data to choose a different one. Both timestamps
    /// are stamped with the same instant.
    #[tracing::instrument(skip(self, input))]
    pub async fn create_task(
        &self,
        owner_id: i32,
        input: TaskInput,
    ) -> Result<Task, TaskServiceError> {
        let mut errors = ValidationErrors::new();

        let name = match input.name.as_deref() {
            None => {
                errors.add("name", "This field is required.");
                None
            }
            Some(name) => validate_name(name, &mut errors),
        };
        let description = match input.description.as_deref() {
            None => Some(String::new()),
            Some(description) => validate_description(description, &mut errors),
        };
        let status = match input.status.as_deref() {
            None => Some(TaskStatus::default()),
            Some(status) => validate_status(status, &mut errors),
        };

        let (Some(name), Some(description), Some(status)) = (name, description, status) else {
            tracing::warn!(owner_id, "task creation failed validation");
            return Err(TaskServiceError::Validation(errors));
        };

        let now = Utc::now();
        let active_model = task::ActiveModel {
            name: ActiveValue::Set(name),
            description: ActiveValue::Set(description),
            status: ActiveValue::Set(status),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            user_id: ActiveValue::Set(owner_id),
            ..Default::default()
        };
        let created = active_model.insert(self.db).await?;
        tracing::info!(owner_id, task_id = created.id, "task created");
        Ok(Task::from(created))
    }

    /// Updates a task owned by `owner_id`, applying only the submitted
    /// fields.
    ///
    /// A task owned by someone else behaves exactly like a missing one.
    /// `created_at` and the owner are never touched; `updated_at` is stamped
    /// on success.
    #[tracing::instrument(skip(self, input))]
    pub async fn update_task(
        &self,
        owner_id: i32,
        task_id: i32,
        input: TaskInput,
    ) -> Result<Task, TaskServiceError> {
        let model = self.find_owned(owner_id, task_id).await?;

        let mut errors = ValidationErrors::new();
        let name = input
            .name
            .as_deref()
            .map(|name| validate_name(name, &mut errors));
        let description = input
            .description
            .as_deref()
            .map(|description| validate_description(description, &mut errors));
        let status = input
            .status
            .as_deref()
            .map(|status| validate_status(status, &mut errors));

        if !errors.is_empty() {
            tracing::warn!(owner_id, task_id, "task update failed validation");
            return Err(TaskServiceError::Validation(errors));
        }

        let mut active_model: task::ActiveModel = model.into();
        if let Some(Some(name)) = name {
            active_model.name = ActiveValue::Set(name);
        }
        if let Some(Some(description)) = description {
            active_model.description = ActiveValue::Set(description);
        }
        if let Some(Some(status)) = status {
            active_model.status = ActiveValue::Set(status);
        }
        active_model.updated_at = ActiveValue::Set(Utc::now());

        let updated = active_model.update(self.db).await?;
        tracing::info!(owner_id, task_id, "task updated");
        Ok(Task::from(updated))
    }

    /// Deletes a task owned by `owner_id`.
    ///
    /// Deletion reports failure when the task is absent: deleting the same
    /// id twice fails with `NotFound` on the second call.
    #[tracing::instrument(skip(self))]
    pub async fn delete_task(&self, owner_id: i32, task_id: i32) -> Result<(), TaskServiceError> {
        let model = self.find_owned(owner_id, task_id).await?;
        task::Entity::delete_by_id(model.id).exec(self.db).await?;
        tracing::info!(owner_id, task_id, "task deleted");
        Ok(())
    }

    /// Looks a task up by id, additionally filtered by ownership. A miss on
    /// either predicate is indistinguishable from the row not existing.
    async fn find_owned(
        &self,
        owner_id: i32,
        task_id: i32,
    ) -> Result<task::Model, TaskServiceError> {
        task::Entity::find_by_id(task_id)
            .filter(task::Column::UserId.eq(owner_id))
            .one(self.db)
            .await?
            .ok_or(TaskServiceError::NotFound(task_id))
    }
}

fn validate_name(name: &str, errors: &mut ValidationErrors) -> Option<String> {
    if name.is_empty() {
        errors.add("name", "This field may not be blank.");
        return None;
    }
    if name.chars().count() > MAX_NAME_LEN {
        errors.add(
            "name",
            format!(
                "Ensure this field has no more than {} characters.",
                MAX_NAME_LEN
            ),
        );
        return None;
    }
    Some(name.to_string())
}

fn validate_description(description: &str, errors: &mut ValidationErrors) -> Option<String> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        errors.add(
            "description",
            format!(
                "Ensure this field has no more than {} characters.",
                MAX_DESCRIPTION_LEN
            ),
        );
        return None;
    }
    Some(description.to_string())
}

fn validate_status(status: &str, errors: &mut ValidationErrors) -> Option<TaskStatus> {
    match TaskStatus::parse(status) {
        Some(status) => Some(status),
        None => {
            errors.add("status", format!("\"{}\" is not a valid choice.", status));
            None
        }
    }
}

fn parse_lenient_date(value: Option<&str>) -> Option<NaiveDate> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Midnight UTC at the start of the given calendar date.
fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Escapes LIKE wildcards so the needle matches literally.
fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
