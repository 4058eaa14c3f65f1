#![allow(dead_code)]

use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use testcontainers_modules::testcontainers::runners::AsyncRunner;
use testcontainers_modules::{postgres, testcontainers};

use tasklist_server::task::{Task, TaskInput, TaskService};
use tasklist_server::user::{RegisterDraft, User, UserService};

/// Secret used to sign session tokens in tests.
pub const TEST_JWT_SECRET: &str = "test_secret";

pub async fn setup_container() -> anyhow::Result<testcontainers::ContainerAsync<postgres::Postgres>>
{
    let container = postgres::Postgres::default().start().await?;
    Ok(container)
}

pub async fn setup_db(
    container: &testcontainers::ContainerAsync<postgres::Postgres>,
) -> anyhow::Result<DatabaseConnection> {
    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let db_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);
    let db = Database::connect(&db_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// Registers an account through the real service with a matching password
/// confirmation.
pub async fn register_user(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> anyhow::Result<User> {
    let service = UserService::new(db);
    let user = service
        .register(RegisterDraft {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            password2: Some(password.to_string()),
        })
        .await?;
    Ok(user)
}

/// Creates a task owned by `owner_id` through the real service.
pub async fn create_task(
    db: &DatabaseConnection,
    owner_id: i32,
    name: &str,
    description: &str,
) -> anyhow::Result<Task> {
    let service = TaskService::new(db);
    let task = service
        .create_task(
            owner_id,
            TaskInput {
                name: Some(name.to_string()),
                description: Some(description.to_string()),
                status: None,
            },
        )
        .await?;
    Ok(task)
}
