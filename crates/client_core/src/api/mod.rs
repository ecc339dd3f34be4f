//! Remote collaborators: auth, tasks and settings records on the backend.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    cache::{Resource, ResourceKey},
    error::ClientError,
    prefetch::ResourceLoader,
};

pub mod auth;
pub mod settings;
pub mod tasks;

pub use auth::AuthApi;
pub use settings::SettingsApi;
pub use tasks::{TaskRepository, TasksApi};

/// Loads route resources straight from the backend.
pub struct ClientResources {
    auth: AuthApi,
    tasks: Arc<dyn TaskRepository>,
}

impl ClientResources {
    pub fn new(auth: AuthApi, tasks: Arc<dyn TaskRepository>) -> Self {
        Self { auth, tasks }
    }
}

#[async_trait]
impl ResourceLoader for ClientResources {
    async fn load(&self, key: &ResourceKey) -> Result<Resource, ClientError> {
        match key {
            ResourceKey::CurrentUser => self.auth.current_user().await.map(Resource::CurrentUser),
            ResourceKey::Tasks => self.tasks.list().await.map(Resource::Tasks),
            ResourceKey::Task(task_id) => self.tasks.get_by_id(task_id).await.map(Resource::Task),
        }
    }
}

#[cfg(test)]
#[path = "../tests/api_tests.rs"]
mod tests;
