use std::{sync::Arc, time::Duration};

use shared::{
    domain::{TaskHistoryDate, TaskId, UserId},
    protocol::{Task, TaskRecord, UpdateUserSettingsFields, UserRecord},
};
use tracing::info;

pub mod api;
pub mod cache;
pub mod error;
pub mod form;
pub mod prefetch;
pub mod preview;
pub mod router;
pub mod session;
pub mod transport;
pub mod upload;

pub use api::{AuthApi, ClientResources, SettingsApi, TaskRepository, TasksApi};
pub use cache::{QueryCache, Resource, ResourceKey};
pub use error::ClientError;
pub use form::{FieldValue, FileBlob, FormState, FormStateStore};
pub use prefetch::{CachedPrefetcher, DataPrefetcher, PrefetchError, ResourceLoader};
pub use preview::{ObjectUrlRegistry, PreviewRef, PreviewRegistry};
pub use router::{
    routes::app_routes, Navigation, NavigationPhase, NavigationStatus, Navigator,
    RenderedScreen, Screen, ThemeState,
};
pub use session::{AuthSnapshot, AuthStore, BackendSession, SessionOracle, SessionState};
pub use transport::BackendClient;
pub use upload::{PreviewToken, RemoteAsset, UploadError, UploadFieldController};

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub server_url: String,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
}

impl ClientOptions {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            request_timeout: transport::DEFAULT_REQUEST_TIMEOUT,
            redirect_limit: router::DEFAULT_REDIRECT_LIMIT,
        }
    }
}

/// Everything a session of the task client shares: backend transport, auth
/// state, query cache, preview registry and the navigator wired to them.
pub struct AppContext {
    client: Arc<BackendClient>,
    cache: QueryCache,
    theme: Arc<ThemeState>,
    previews: Arc<ObjectUrlRegistry>,
    tasks: Arc<dyn TaskRepository>,
    navigator: Navigator,
}

impl AppContext {
    pub fn new(options: &ClientOptions, auth: Arc<AuthStore>) -> Result<Self, ClientError> {
        let client = Arc::new(BackendClient::with_timeout(
            &options.server_url,
            auth.clone(),
            options.request_timeout,
        )?);
        let cache = QueryCache::new();
        let theme = Arc::new(ThemeState::default());
        let tasks: Arc<dyn TaskRepository> = Arc::new(TasksApi::new(client.clone()));
        let loader = Arc::new(ClientResources::new(
            AuthApi::new(client.clone()),
            tasks.clone(),
        ));
        let navigator = Navigator::new(
            Arc::new(app_routes()),
            Arc::new(BackendSession::new(auth, cache.clone())),
            Arc::new(CachedPrefetcher::new(cache.clone(), loader)),
            theme.clone(),
        )
        .with_redirect_limit(options.redirect_limit);

        Ok(Self {
            client,
            cache,
            theme,
            previews: Arc::new(ObjectUrlRegistry::default()),
            tasks,
            navigator,
        })
    }

    pub fn client(&self) -> &Arc<BackendClient> {
        &self.client
    }

    pub fn auth(&self) -> &Arc<AuthStore> {
        self.client.auth()
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn theme(&self) -> Option<shared::domain::Theme> {
        self.theme.current()
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn auth_api(&self) -> AuthApi {
        AuthApi::new(self.client.clone())
    }

    pub fn settings_api(&self) -> SettingsApi {
        SettingsApi::new(self.client.clone())
    }

    pub fn tasks(&self) -> &Arc<dyn TaskRepository> {
        &self.tasks
    }

    pub async fn navigate(&self, href: &str) -> Navigation {
        self.navigator.navigate(href).await
    }

    pub async fn login(&self, identity: &str, password: &str) -> Result<UserRecord, ClientError> {
        self.cache.clear();
        self.auth_api().login_with_password(identity, password).await
    }

    pub fn logout(&self) {
        self.auth_api().logout();
        self.cache.clear();
    }

    fn current_user_id(&self) -> Result<UserId, ClientError> {
        self.auth()
            .model()
            .map(|model| model.id)
            .ok_or(ClientError::NotAuthenticated)
    }

    pub async fn create_task(&self, task: &Task) -> Result<TaskRecord, ClientError> {
        let user_id = self.current_user_id()?;
        let record = self.tasks.create(&user_id, task).await?;
        self.cache.invalidate(&ResourceKey::Tasks);
        info!(task_id = %record.id, "task created");
        Ok(record)
    }

    pub async fn update_task(
        &self,
        task_id: &TaskId,
        task: &Task,
    ) -> Result<TaskRecord, ClientError> {
        let record = self.tasks.update(task_id, task).await?;
        self.cache.invalidate(&ResourceKey::Tasks);
        self.cache
            .insert(ResourceKey::Task(task_id.clone()), Resource::Task(record.clone()));
        Ok(record)
    }

    pub async fn update_task_history(
        &self,
        task_id: &TaskId,
        history: &[TaskHistoryDate],
    ) -> Result<TaskRecord, ClientError> {
        let record = self.tasks.update_history(task_id, history).await?;
        self.cache.invalidate(&ResourceKey::Tasks);
        self.cache
            .insert(ResourceKey::Task(task_id.clone()), Resource::Task(record.clone()));
        Ok(record)
    }

    pub async fn delete_task(&self, task_id: &TaskId) -> Result<(), ClientError> {
        self.tasks.delete(task_id).await?;
        self.cache.invalidate_tasks();
        info!(task_id = %task_id, "task deleted");
        Ok(())
    }

    pub async fn update_user_settings(
        &self,
        fields: &UpdateUserSettingsFields,
        avatar: &FieldValue,
    ) -> Result<UserRecord, ClientError> {
        let user_id = self.current_user_id()?;
        let user = self
            .settings_api()
            .update_user_settings(&user_id, fields, avatar)
            .await?;
        self.cache.invalidate(&ResourceKey::CurrentUser);
        Ok(user)
    }

    /// A controller for the signed-in user's avatar field in `form`.
    pub fn avatar_field(&self, form: Arc<dyn FormStateStore>) -> UploadFieldController {
        let remote_asset = self.auth().model().and_then(|user| {
            user.avatar().map(|name| RemoteAsset {
                user_id: user.id.clone(),
                name: name.to_string(),
            })
        });
        UploadFieldController::new(
            api::settings::AVATAR_FIELD,
            form,
            self.previews.clone(),
            self.client.origin(),
        )
        .with_remote_asset(remote_asset)
    }

    pub fn live_previews(&self) -> usize {
        self.previews.live_count()
    }
}
