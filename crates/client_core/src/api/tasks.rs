use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use shared::{
    domain::{TaskHistoryDate, TaskId, UserId},
    protocol::{CreateTaskRequest, Task, TaskRecord, UpdateTaskHistoryRequest},
};

use crate::{error::ClientError, transport::BackendClient};

pub const TASKS_COLLECTION: &str = "tasks";

/// Persistence of task records. Every record returned has been validated.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<TaskRecord>, ClientError>;
    async fn get_by_id(&self, task_id: &TaskId) -> Result<TaskRecord, ClientError>;
    async fn create(&self, user_id: &UserId, task: &Task) -> Result<TaskRecord, ClientError>;
    async fn update(&self, task_id: &TaskId, task: &Task) -> Result<TaskRecord, ClientError>;
    async fn update_history(
        &self,
        task_id: &TaskId,
        history: &[TaskHistoryDate],
    ) -> Result<TaskRecord, ClientError>;
    async fn delete(&self, task_id: &TaskId) -> Result<(), ClientError>;
}

#[derive(Clone)]
pub struct TasksApi {
    client: Arc<BackendClient>,
}

impl TasksApi {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }

    fn record_url(&self, task_id: &TaskId) -> Result<url::Url, ClientError> {
        self.client
            .collection_url(TASKS_COLLECTION, &format!("records/{task_id}"))
    }
}

fn validated(record: TaskRecord) -> Result<TaskRecord, ClientError> {
    record.validate()?;
    Ok(record)
}

#[async_trait]
impl TaskRepository for TasksApi {
    async fn list(&self) -> Result<Vec<TaskRecord>, ClientError> {
        let records: Vec<TaskRecord> = self.client.full_list(TASKS_COLLECTION, None).await?;
        records.into_iter().map(validated).collect()
    }

    async fn get_by_id(&self, task_id: &TaskId) -> Result<TaskRecord, ClientError> {
        let url = self.record_url(task_id)?;
        let record = self
            .client
            .send_json(self.client.request(Method::GET, url))
            .await?;
        validated(record)
    }

    async fn create(&self, user_id: &UserId, task: &Task) -> Result<TaskRecord, ClientError> {
        task.validate()?;
        let url = self.client.collection_url(TASKS_COLLECTION, "records")?;
        let record = self
            .client
            .send_json(
                self.client
                    .request(Method::POST, url)
                    .json(&CreateTaskRequest { task, user: user_id }),
            )
            .await?;
        validated(record)
    }

    async fn update(&self, task_id: &TaskId, task: &Task) -> Result<TaskRecord, ClientError> {
        task.validate()?;
        let url = self.record_url(task_id)?;
        let record = self
            .client
            .send_json(self.client.request(Method::PATCH, url).json(task))
            .await?;
        validated(record)
    }

    async fn update_history(
        &self,
        task_id: &TaskId,
        history: &[TaskHistoryDate],
    ) -> Result<TaskRecord, ClientError> {
        let url = self.record_url(task_id)?;
        let record = self
            .client
            .send_json(
                self.client
                    .request(Method::PATCH, url)
                    .json(&UpdateTaskHistoryRequest { history }),
            )
            .await?;
        validated(record)
    }

    async fn delete(&self, task_id: &TaskId) -> Result<(), ClientError> {
        let url = self.record_url(task_id)?;
        self.client
            .send_empty(self.client.request(Method::DELETE, url))
            .await
    }
}
