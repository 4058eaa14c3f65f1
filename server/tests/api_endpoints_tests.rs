use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};
use serde_json::{Value, json};
use std::sync::Arc;
use testcontainers_modules::{postgres, testcontainers};
use tower::ServiceExt;

use tasklist_server::entities::user;
use tasklist_server::web::create_app;

mod common;

pub struct TestContext {
    #[allow(dead_code)] // container is kept to ensure it's not dropped
    pub container: testcontainers::ContainerAsync<postgres::Postgres>,
    pub db: DatabaseConnection,
    pub app: Router,
}

async fn setup() -> anyhow::Result<TestContext> {
    let container = common::setup_container().await?;
    let db = common::setup_db(&container).await?;
    let app = create_app(Arc::new(db.clone()), common::TEST_JWT_SECRET.to_string());
    Ok(TestContext { db, container, app })
}

fn basic_auth(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", username, password))
    )
}

fn json_request(method: &str, uri: &str, auth: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn bare_request(method: &str, uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn register_creates_a_user() {
    let state = setup().await.expect("Failed to setup test context");

    let response = state
        .app
        .oneshot(json_request(
            "POST",
            "/api/register/",
            None,
            &json!({
                "username": "newuser",
                "password": "StrongPass!1",
                "password2": "StrongPass!1",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["user"]["username"], "newuser");
    assert_eq!(user::Entity::find().count(&state.db).await.unwrap(), 1);
}

#[tokio::test]
async fn register_with_mismatched_passwords_is_400() {
    let state = setup().await.expect("Failed to setup test context");

    let response = state
        .app
        .oneshot(json_request(
            "POST",
            "/api/register/",
            None,
            &json!({
                "username": "newuser",
                "password": "password123!",
                "password2": "password456!",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["password"].is_array());
    assert_eq!(user::Entity::find().count(&state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn login_returns_message_and_username() {
    let state = setup().await.expect("Failed to setup test context");
    common::register_user(&state.db, "testuser", "password123!")
        .await
        .unwrap();

    let response = state
        .app
        .oneshot(json_request(
            "POST",
            "/api/login/",
            None,
            &json!({"username": "testuser", "password": "password123!"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie should be set")
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.contains("auth_token="));

    let body = json_body(response).await;
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["Username"], "testuser");
}

#[tokio::test]
async fn login_failure_is_400_with_a_generic_detail() {
    let state = setup().await.expect("Failed to setup test context");
    common::register_user(&state.db, "testuser", "password123!")
        .await
        .unwrap();

    // Wrong password and unknown username produce identical bodies.
    for payload in [
        json!({"username": "testuser", "password": "wrongpassword"}),
        json!({"username": "ghost", "password": "password123!"}),
    ] {
        let response = state
            .app
            .clone()
            .oneshot(json_request("POST", "/api/login/", None, &payload))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body, json!({"detail": "Invalid credentials"}));
    }
}

#[tokio::test]
async fn login_requires_both_fields() {
    let state = setup().await.expect("Failed to setup test context");

    let response = state
        .app
        .oneshot(json_request(
            "POST",
            "/api/login/",
            None,
            &json!({"username": "testuser"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["password"][0], "This field is required.");
}

#[tokio::test]
async fn tasks_require_authentication() {
    let state = setup().await.expect("Failed to setup test context");

    let response = state
        .app
        .oneshot(bare_request("GET", "/api/tasks/", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(
        body,
        json!({"detail": "Authentication credentials were not provided."})
    );
}

#[tokio::test]
async fn basic_auth_crud_roundtrip() {
    let state = setup().await.expect("Failed to setup test context");
    let user = common::register_user(&state.db, "testuser", "password123!")
        .await
        .unwrap();
    let auth = basic_auth("testuser", "password123!");

    // Create
    let response = state
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/tasks/",
            Some(&auth),
            &json!({
                "name": "New Task",
                "description": "New Task Description",
                "status": "in_progress",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    assert_eq!(created["name"], "New Task");
    assert_eq!(created["status"], "in_progress");
    assert_eq!(created["user"], user.id());
    assert_eq!(created["created_at"], created["updated_at"]);
    let task_id = created["id"].as_i64().unwrap();

    // List
    let response = state
        .app
        .clone()
        .oneshot(bare_request("GET", "/api/tasks/", Some(&auth)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = json_body(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // Retrieve
    let response = state
        .app
        .clone()
        .oneshot(bare_request(
            "GET",
            &format!("/api/tasks/{}/", task_id),
            Some(&auth),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Patch
    let response = state
        .app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/api/tasks/{}/", task_id),
            Some(&auth),
            &json!({"status": "completed"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let patched = json_body(response).await;
    assert_eq!(patched["status"], "completed");
    assert_eq!(patched["name"], "New Task");

    // Delete, twice: the second call reports the absence.
    let response = state
        .app
        .clone()
        .oneshot(bare_request(
            "DELETE",
            &format!("/api/tasks/{}/", task_id),
            Some(&auth),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = state
        .app
        .oneshot(bare_request(
            "DELETE",
            &format!("/api/tasks/{}/", task_id),
            Some(&auth),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body, json!({"detail": "Not found."}));
}

#[tokio::test]
async fn create_ignores_a_client_supplied_owner() {
    let state = setup().await.expect("Failed to setup test context");
    let alice = common::register_user(&state.db, "alice", "password123!")
        .await
        .unwrap();
    let bob = common::register_user(&state.db, "bob", "password123!")
        .await
        .unwrap();

    let response = state
        .app
        .oneshot(json_request(
            "POST",
            "/api/tasks/",
            Some(&basic_auth("alice", "password123!")),
            &json!({
                "name": "Spoofed",
                "user": bob.id(),
                "id": 9999,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["user"], alice.id());
    assert_ne!(body["id"], 9999);
}

#[tokio::test]
async fn create_validation_errors_are_a_field_map() {
    let state = setup().await.expect("Failed to setup test context");
    common::register_user(&state.db, "testuser", "password123!")
        .await
        .unwrap();

    let response = state
        .app
        .oneshot(json_request(
            "POST",
            "/api/tasks/",
            Some(&basic_auth("testuser", "password123!")),
            &json!({"description": "no name", "status": "bogus"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["name"][0], "This field is required.");
    assert_eq!(body["status"][0], "\"bogus\" is not a valid choice.");
}

#[tokio::test]
async fn session_cookie_works_for_the_api() {
    let state = setup().await.expect("Failed to setup test context");
    common::register_user(&state.db, "testuser", "password123!")
        .await
        .unwrap();

    let response = state
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/login/",
            None,
            &json!({"username": "testuser", "password": "password123!"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let cookie = set_cookie.split(';').next().unwrap().to_string();

    let response = state
        .app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/tasks/")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn cross_owner_access_is_an_indistinguishable_404() {
    let state = setup().await.expect("Failed to setup test context");
    common::register_user(&state.db, "alice", "password123!")
        .await
        .unwrap();
    let bob = common::register_user(&state.db, "bob", "password123!")
        .await
        .unwrap();
    let bobs_task = common::create_task(&state.db, bob.id(), "Bob's task", "")
        .await
        .unwrap();

    let alice_auth = basic_auth("alice", "password123!");

    let missing_id = bobs_task.id() + 1000;
    for id in [bobs_task.id(), missing_id] {
        let response = state
            .app
            .clone()
            .oneshot(json_request(
                "PATCH",
                &format!("/api/tasks/{}/", id),
                Some(&alice_auth),
                &json!({"name": "Hijacked"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body, json!({"detail": "Not found."}));
    }
}

#[tokio::test]
async fn put_requires_name_but_patch_does_not() {
    let state = setup().await.expect("Failed to setup test context");
    let user = common::register_user(&state.db, "testuser", "password123!")
        .await
        .unwrap();
    let task = common::create_task(&state.db, user.id(), "Task 1", "d")
        .await
        .unwrap();
    let auth = basic_auth("testuser", "password123!");

    let response = state
        .app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tasks/{}/", task.id()),
            Some(&auth),
            &json!({"description": "only this"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["name"][0], "This field is required.");

    let response = state
        .app
        .oneshot(json_request(
            "PATCH",
            &format!("/api/tasks/{}/", task.id()),
            Some(&auth),
            &json!({"description": "only this"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["description"], "only this");
    assert_eq!(body["name"], "Task 1");
}

#[tokio::test]
async fn list_filters_apply_and_malformed_dates_are_ignored() {
    let state = setup().await.expect("Failed to setup test context");
    let user = common::register_user(&state.db, "testuser", "password123!")
        .await
        .unwrap();
    common::create_task(&state.db, user.id(), "Write report", "numbers")
        .await
        .unwrap();
    common::create_task(&state.db, user.id(), "Water plants", "balcony")
        .await
        .unwrap();
    let auth = basic_auth("testuser", "password123!");

    let response = state
        .app
        .clone()
        .oneshot(bare_request("GET", "/api/tasks/?q=report", Some(&auth)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let tasks = body.as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["name"], "Write report");

    // A date that does not parse leaves the filter unapplied.
    let response = state
        .app
        .oneshot(bare_request(
            "GET",
            "/api/tasks/?date_from=never&date_to=2999-99-99",
            Some(&auth),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn logout_works_with_both_verbs() {
    let state = setup().await.expect("Failed to setup test context");
    common::register_user(&state.db, "testuser", "password123!")
        .await
        .unwrap();
    let auth = basic_auth("testuser", "password123!");

    for method in ["POST", "GET"] {
        let response = state
            .app
            .clone()
            .oneshot(bare_request(method, "/api/logout/", Some(&auth)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Logout successful");
    }
}

#[tokio::test]
async fn logout_requires_authentication() {
    let state = setup().await.expect("Failed to setup test context");

    let response = state
        .app
        .oneshot(bare_request("POST", "/api/logout/", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_basic_credentials_are_unauthenticated() {
    let state = setup().await.expect("Failed to setup test context");
    common::register_user(&state.db, "testuser", "password123!")
        .await
        .unwrap();

    let response = state
        .app
        .oneshot(bare_request(
            "GET",
            "/api/tasks/",
            Some(&basic_auth("testuser", "wrongpassword")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
