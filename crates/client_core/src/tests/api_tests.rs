use super::*;
use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use shared::{
    domain::{TaskId, Theme, UserId},
    protocol::{RegisterRequest, Task, UpdateUserSettingsFields},
};
use tokio::{net::TcpListener, sync::Mutex};

use crate::{
    form::{FieldValue, FileBlob},
    router::Screen,
    session::AuthStore,
    transport::BackendClient,
    AppContext, ClientOptions,
};

const PASSWORD: &str = "correct horse";
const NEW_PASSWORD: &str = "battery staple";

#[derive(Clone, Default)]
struct Backend {
    has_settings: bool,
    corrupt_task: bool,
    requests: Arc<Mutex<Vec<String>>>,
    user_patches: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    settings_patches: Arc<Mutex<Vec<Value>>>,
}

impl Backend {
    async fn record(&self, line: impl Into<String>) {
        self.requests.lock().await.push(line.into());
    }
}

fn jwt() -> String {
    #[derive(serde::Serialize)]
    struct Claims {
        id: &'static str,
        exp: i64,
    }
    encode(
        &Header::default(),
        &Claims {
            id: "user1",
            exp: Utc::now().timestamp() + 3600,
        },
        &EncodingKey::from_secret(b"backend-secret"),
    )
    .expect("encode token")
}

fn user_json() -> Value {
    json!({
        "id": "user1",
        "email": "user1@example.com",
        "username": "user1",
        "name": "User One",
        "avatar": "portrait.webp",
        "verified": true
    })
}

fn task_json(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "user": "user1",
        "created": "2024-01-01 10:00:00.000Z",
        "updated": "2024-01-01 10:00:00.000Z",
        "title": title,
        "description": "",
        "history": ["2024-01-01"]
    })
}

fn page(items: Vec<Value>) -> Value {
    json!({
        "page": 1,
        "perPage": 500,
        "totalItems": items.len(),
        "totalPages": 1,
        "items": items
    })
}

fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "code": 404,
            "message": "The requested resource wasn't found.",
            "data": {}
        })),
    )
}

async fn auth_with_password(State(backend): State<Backend>, Json(body): Json<Value>) -> impl IntoResponse {
    backend.record("POST auth-with-password").await;
    if body["password"] != PASSWORD && body["password"] != NEW_PASSWORD {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"code": 400, "message": "Failed to authenticate.", "data": {}})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({ "token": jwt(), "record": user_json() })),
    )
}

async fn get_user(State(backend): State<Backend>, Path(id): Path<String>) -> impl IntoResponse {
    backend.record(format!("GET users/{id}")).await;
    Json(user_json())
}

async fn patch_user(
    State(backend): State<Backend>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    backend.record(format!("PATCH users/{id}")).await;
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    backend
        .user_patches
        .lock()
        .await
        .push((content_type, body.to_vec()));
    Json(user_json())
}

async fn list_settings(State(backend): State<Backend>) -> impl IntoResponse {
    backend.record("GET settings").await;
    let items = if backend.has_settings {
        vec![json!({
            "id": "set1",
            "user": "user1",
            "remindEmail": "user1@example.com",
            "remindByEmailEnabled": true,
            "theme": "dark"
        })]
    } else {
        Vec::new()
    };
    Json(page(items))
}

async fn patch_settings(
    State(backend): State<Backend>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    backend.record(format!("PATCH settings/{id}")).await;
    backend.settings_patches.lock().await.push(body);
    Json(json!({
        "id": id,
        "user": "user1",
        "remindEmail": "",
        "remindByEmailEnabled": false,
        "theme": "light"
    }))
}

async fn list_tasks(State(backend): State<Backend>) -> impl IntoResponse {
    backend.record("GET tasks").await;
    let mut items = vec![task_json("abc123", "Water the plants")];
    if backend.corrupt_task {
        items.push(task_json("def456", "   "));
    }
    Json(page(items))
}

async fn get_task(State(backend): State<Backend>, Path(id): Path<String>) -> impl IntoResponse {
    backend.record(format!("GET tasks/{id}")).await;
    if id == "abc123" {
        (StatusCode::OK, Json(task_json("abc123", "Water the plants")))
    } else {
        not_found()
    }
}

async fn create_task(State(backend): State<Backend>, Json(body): Json<Value>) -> impl IntoResponse {
    backend.record("POST tasks").await;
    Json(task_json("new001", body["title"].as_str().unwrap_or_default()))
}

async fn patch_task(
    State(backend): State<Backend>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    backend.record(format!("PATCH tasks/{id}")).await;
    Json(task_json(
        &id,
        body["title"].as_str().unwrap_or("Water the plants"),
    ))
}

async fn delete_task(State(backend): State<Backend>, Path(id): Path<String>) -> impl IntoResponse {
    backend.record(format!("DELETE tasks/{id}")).await;
    StatusCode::NO_CONTENT
}

async fn spawn_backend(backend: Backend) -> Result<String> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new()
        .route(
            "/api/collections/users/auth-with-password",
            post(auth_with_password),
        )
        .route(
            "/api/collections/users/records/:id",
            get(get_user).patch(patch_user),
        )
        .route("/api/collections/settings/records", get(list_settings))
        .route(
            "/api/collections/settings/records/:id",
            axum::routing::patch(patch_settings),
        )
        .route(
            "/api/collections/tasks/records",
            get(list_tasks).post(create_task),
        )
        .route(
            "/api/collections/tasks/records/:id",
            get(get_task).patch(patch_task).delete(delete_task),
        )
        .with_state(backend);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

async fn signed_in_client(backend: Backend) -> Arc<BackendClient> {
    let server_url = spawn_backend(backend).await.expect("spawn backend");
    let client = Arc::new(BackendClient::new(&server_url, Arc::new(AuthStore::new())).expect("client"));
    AuthApi::new(client.clone())
        .login_with_password("user1@example.com", PASSWORD)
        .await
        .expect("login");
    client
}

#[tokio::test]
async fn login_persists_token_and_model() {
    let server_url = spawn_backend(Backend::default()).await.expect("spawn backend");
    let client = Arc::new(BackendClient::new(&server_url, Arc::new(AuthStore::new())).expect("client"));
    let auth = AuthApi::new(client.clone());

    let user = auth
        .login_with_password("user1@example.com", PASSWORD)
        .await
        .expect("login");

    assert_eq!(user.id, UserId("user1".to_string()));
    assert!(client.auth().is_valid());
    assert_eq!(client.auth().model(), Some(user));

    auth.logout();
    assert!(client.auth().token().is_none());
}

#[tokio::test]
async fn rejected_login_surfaces_backend_message() {
    let server_url = spawn_backend(Backend::default()).await.expect("spawn backend");
    let client = Arc::new(BackendClient::new(&server_url, Arc::new(AuthStore::new())).expect("client"));

    let err = AuthApi::new(client.clone())
        .login_with_password("user1@example.com", "wrong")
        .await
        .expect_err("bad password");

    assert_eq!(err.code(), Some(shared::error::ErrorCode::Validation));
    assert!(err.to_string().contains("Failed to authenticate."));
    assert!(!client.auth().is_valid());
}

#[tokio::test]
async fn register_checks_password_confirmation_before_sending() {
    let client = Arc::new(
        BackendClient::new("http://127.0.0.1:9", Arc::new(AuthStore::new())).expect("client"),
    );
    let err = AuthApi::new(client)
        .register(&RegisterRequest {
            email: "new@example.com".to_string(),
            password: "password-one".to_string(),
            password_confirm: "password-two".to_string(),
            username: None,
            name: None,
        })
        .await
        .expect_err("mismatch");
    assert!(matches!(err, ClientError::Validation(_)));
}

#[tokio::test]
async fn current_user_carries_settings_when_present() {
    let client = signed_in_client(Backend {
        has_settings: true,
        ..Backend::default()
    })
    .await;

    let current = AuthApi::new(client).current_user().await.expect("current user");
    assert_eq!(current.theme(), Some(Theme::Dark));
}

#[tokio::test]
async fn current_user_without_settings_record() {
    let client = signed_in_client(Backend::default()).await;
    let current = AuthApi::new(client).current_user().await.expect("current user");
    assert_eq!(current.settings, None);
    assert_eq!(current.theme(), None);
}

#[tokio::test]
async fn task_reads_are_validated() {
    let client = signed_in_client(Backend::default()).await;
    let tasks = TasksApi::new(client);
    let list = tasks.list().await.expect("list");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].task.title, "Water the plants");

    let corrupt = signed_in_client(Backend {
        corrupt_task: true,
        ..Backend::default()
    })
    .await;
    let err = TasksApi::new(corrupt).list().await.expect_err("blank title");
    assert!(matches!(err, ClientError::Validation(_)));
}

#[tokio::test]
async fn missing_task_maps_to_not_found() {
    let client = signed_in_client(Backend::default()).await;
    let err = TasksApi::new(client)
        .get_by_id(&TaskId("zzz999".to_string()))
        .await
        .expect_err("missing");
    assert!(err.is_not_found());
    assert!(err.to_string().contains("wasn't found"));
}

#[tokio::test]
async fn settings_update_without_settings_record_only_patches_user() {
    let backend = Backend::default();
    let client = signed_in_client(backend.clone()).await;

    let fields = UpdateUserSettingsFields {
        name: Some("Renamed".to_string()),
        theme: Theme::Dark,
        ..UpdateUserSettingsFields::default()
    };
    SettingsApi::new(client)
        .update_user_settings(&UserId("user1".to_string()), &fields, &FieldValue::Absent)
        .await
        .expect("update");

    let patches = backend.user_patches.lock().await;
    assert_eq!(patches.len(), 1);
    assert!(patches[0].0.starts_with("application/json"));
    assert!(backend.settings_patches.lock().await.is_empty());
    assert!(!backend
        .requests
        .lock()
        .await
        .iter()
        .any(|line| line.starts_with("PATCH settings")));
}

#[tokio::test]
async fn settings_update_sends_avatar_as_multipart() {
    let backend = Backend {
        has_settings: true,
        ..Backend::default()
    };
    let client = signed_in_client(backend.clone()).await;

    let fields = UpdateUserSettingsFields {
        remind_email: "me@example.com".to_string(),
        remind_by_email_enabled: true,
        theme: Theme::Dark,
        ..UpdateUserSettingsFields::default()
    };
    let avatar = FieldValue::File(FileBlob::new(
        "C:\\fakepath\\me.png",
        Some("image/png".to_string()),
        vec![1u8, 2, 3],
    ));
    SettingsApi::new(client)
        .update_user_settings(&UserId("user1".to_string()), &fields, &avatar)
        .await
        .expect("update");

    let patches = backend.user_patches.lock().await;
    let (content_type, body) = &patches[0];
    assert!(content_type.starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(body);
    assert!(body.contains("name=\"avatar\"; filename=\"me.png\""), "{body}");

    let settings = backend.settings_patches.lock().await;
    assert_eq!(
        settings.as_slice(),
        &[json!({
            "remindEmail": "me@example.com",
            "remindByEmailEnabled": true,
            "theme": "dark"
        })]
    );
}

#[tokio::test]
async fn client_resources_load_every_key() {
    let client = signed_in_client(Backend::default()).await;
    let loader = ClientResources::new(
        AuthApi::new(client.clone()),
        Arc::new(TasksApi::new(client)),
    );

    assert!(matches!(
        loader.load(&ResourceKey::CurrentUser).await.expect("user"),
        Resource::CurrentUser(_)
    ));
    assert!(matches!(
        loader.load(&ResourceKey::Tasks).await.expect("tasks"),
        Resource::Tasks(tasks) if tasks.len() == 1
    ));
    let task = loader
        .load(&ResourceKey::Task(TaskId("abc123".to_string())))
        .await
        .expect("task");
    assert!(matches!(task, Resource::Task(record) if record.id.as_str() == "abc123"));
}

#[tokio::test]
async fn password_change_signs_in_again_with_new_password() {
    let backend = Backend::default();
    let client = signed_in_client(backend.clone()).await;

    let fields = UpdateUserSettingsFields {
        old_password: Some(PASSWORD.to_string()),
        password: Some(NEW_PASSWORD.to_string()),
        password_confirm: Some(NEW_PASSWORD.to_string()),
        ..UpdateUserSettingsFields::default()
    };
    SettingsApi::new(client.clone())
        .update_user_settings(&UserId("user1".to_string()), &fields, &FieldValue::Absent)
        .await
        .expect("update");

    let requests = backend.requests.lock().await.clone();
    let logins: Vec<usize> = requests
        .iter()
        .enumerate()
        .filter(|(_, line)| line.as_str() == "POST auth-with-password")
        .map(|(index, _)| index)
        .collect();
    let patch = requests
        .iter()
        .position(|line| line == "PATCH users/user1")
        .expect("user patched");
    assert_eq!(logins.len(), 2, "{requests:?}");
    assert!(logins[1] > patch);

    let patches = backend.user_patches.lock().await;
    let body: Value = serde_json::from_slice(&patches[0].1).expect("json body");
    assert_eq!(body["oldPassword"], PASSWORD);
    assert_eq!(body["passwordConfirm"], NEW_PASSWORD);
    assert!(client.auth().is_valid());
}

#[tokio::test]
async fn removing_avatar_sends_empty_multipart_field() {
    let backend = Backend::default();
    let client = signed_in_client(backend.clone()).await;

    SettingsApi::new(client)
        .update_user_settings(
            &UserId("user1".to_string()),
            &UpdateUserSettingsFields::default(),
            &FieldValue::Null,
        )
        .await
        .expect("update");

    let patches = backend.user_patches.lock().await;
    let (content_type, body) = &patches[0];
    assert!(content_type.starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(body);
    assert!(body.contains("name=\"avatar\"\r\n\r\n\r\n"), "{body}");
    assert!(!body.contains("filename="));
}

async fn signed_in_app(backend: Backend) -> AppContext {
    let server_url = spawn_backend(backend).await.expect("spawn backend");
    let app = AppContext::new(&ClientOptions::new(server_url), Arc::new(AuthStore::new()))
        .expect("app context");
    app.login("user1@example.com", PASSWORD).await.expect("login");
    app
}

#[tokio::test]
async fn task_mutations_invalidate_cached_queries() {
    let backend = Backend::default();
    let app = signed_in_app(backend.clone()).await;
    let task_id = TaskId("abc123".to_string());
    let task_key = ResourceKey::Task(task_id.clone());

    let navigation = app.navigate("/tasks/abc123").await;
    assert_eq!(navigation.screen(), Some(Screen::EditTask));
    assert!(app.cache().get(&ResourceKey::Tasks).is_some());
    assert!(app.cache().get(&task_key).is_some());

    let created = app
        .create_task(&Task::new("Feed the cat"))
        .await
        .expect("create");
    assert_eq!(created.id.as_str(), "new001");
    assert!(app.cache().get(&ResourceKey::Tasks).is_none());
    assert!(app.cache().get(&task_key).is_some());
    assert!(app.cache().get(&ResourceKey::CurrentUser).is_some());

    app.navigate("/tasks/abc123").await;
    let updated = app
        .update_task(&task_id, &Task::new("Water the ferns"))
        .await
        .expect("update");
    assert!(app.cache().get(&ResourceKey::Tasks).is_none());
    assert_eq!(app.cache().get(&task_key), Some(Resource::Task(updated)));

    app.navigate("/tasks/abc123").await;
    app.delete_task(&task_id).await.expect("delete");
    assert!(app.cache().get(&ResourceKey::Tasks).is_none());
    assert!(app.cache().get(&task_key).is_none());
    assert!(app.cache().get(&ResourceKey::CurrentUser).is_some());
    assert!(backend
        .requests
        .lock()
        .await
        .contains(&"DELETE tasks/abc123".to_string()));
}

#[tokio::test]
async fn navigation_applies_theme_from_prefetched_settings() {
    let app = signed_in_app(Backend {
        has_settings: true,
        ..Backend::default()
    })
    .await;
    assert_eq!(app.theme(), None);

    let navigation = app.navigate("/tasks").await;

    assert_eq!(navigation.screen(), Some(Screen::TaskList));
    assert_eq!(app.theme(), Some(Theme::Dark));
}
