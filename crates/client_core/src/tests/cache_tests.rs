use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use shared::protocol::{Task, TaskRecord, UserRecord};

use super::*;
use crate::error::ClientError;

struct CountingLoader {
    calls: AtomicUsize,
    fail: bool,
    delay: Duration,
}

impl CountingLoader {
    fn new(fail: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail,
            delay: Duration::from_millis(20),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn task_record(id: &str) -> TaskRecord {
    TaskRecord {
        id: TaskId(id.to_string()),
        user: shared::domain::UserId("user1".to_string()),
        created: String::new(),
        updated: String::new(),
        task: Task::new(format!("task {id}")),
    }
}

#[async_trait]
impl ResourceLoader for CountingLoader {
    async fn load(&self, key: &ResourceKey) -> Result<Resource, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(ClientError::Decode("boom".to_string()));
        }
        match key {
            ResourceKey::Task(id) => Ok(Resource::Task(task_record(id.as_str()))),
            _ => Ok(Resource::Tasks(vec![task_record("a1")])),
        }
    }
}

#[tokio::test]
async fn concurrent_callers_share_one_load() {
    let cache = QueryCache::new();
    let loader = Arc::new(CountingLoader::new(false));

    let (first, second) = tokio::join!(
        cache.ensure_cached(&ResourceKey::Tasks, loader.clone()),
        cache.ensure_cached(&ResourceKey::Tasks, loader.clone()),
    );

    assert_eq!(first.expect("first"), second.expect("second"));
    assert_eq!(loader.calls(), 1);
    assert!(cache.get(&ResourceKey::Tasks).is_some());
}

#[tokio::test]
async fn cached_value_is_reused() {
    let cache = QueryCache::new();
    let loader = Arc::new(CountingLoader::new(false));
    let key = ResourceKey::Task(TaskId("abc123".to_string()));

    cache.ensure_cached(&key, loader.clone()).await.expect("load");
    cache.ensure_cached(&key, loader.clone()).await.expect("hit");
    assert_eq!(loader.calls(), 1);
}

#[tokio::test]
async fn failures_are_not_cached() {
    let cache = QueryCache::new();
    let loader = Arc::new(CountingLoader::new(true));

    let err = cache
        .ensure_cached(&ResourceKey::Tasks, loader.clone())
        .await
        .expect_err("must fail");
    assert_eq!(err.key, ResourceKey::Tasks);
    assert!(err.message.contains("boom"));
    assert!(cache.get(&ResourceKey::Tasks).is_none());

    cache
        .ensure_cached(&ResourceKey::Tasks, loader.clone())
        .await
        .expect_err("still failing");
    assert_eq!(loader.calls(), 2);
}

#[tokio::test]
async fn abandoned_load_is_dropped_and_restarted() {
    let cache = QueryCache::new();
    let loader = Arc::new(CountingLoader::new(false).with_delay(Duration::from_millis(200)));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        cache.ensure_cached(&ResourceKey::Tasks, loader.clone()),
    )
    .await;
    assert!(abandoned.is_err());
    assert!(cache.get(&ResourceKey::Tasks).is_none());

    cache
        .ensure_cached(&ResourceKey::Tasks, loader.clone())
        .await
        .expect("fresh load");
    assert_eq!(loader.calls(), 2);
    assert!(cache.get(&ResourceKey::Tasks).is_some());
}

#[tokio::test]
async fn load_survives_while_another_caller_waits() {
    let cache = QueryCache::new();
    let loader = Arc::new(CountingLoader::new(false).with_delay(Duration::from_millis(50)));

    let (dropped, kept) = tokio::join!(
        tokio::time::timeout(
            Duration::from_millis(5),
            cache.ensure_cached(&ResourceKey::Tasks, loader.clone()),
        ),
        cache.ensure_cached(&ResourceKey::Tasks, loader.clone()),
    );

    assert!(dropped.is_err());
    kept.expect("remaining caller gets the result");
    assert_eq!(loader.calls(), 1);
    assert!(cache.get(&ResourceKey::Tasks).is_some());
}

#[tokio::test]
async fn invalidating_tasks_keeps_current_user() {
    let cache = QueryCache::new();
    cache.insert(ResourceKey::Tasks, Resource::Tasks(Vec::new()));
    cache.insert(
        ResourceKey::Task(TaskId("a1".to_string())),
        Resource::Task(task_record("a1")),
    );
    cache.insert(
        ResourceKey::CurrentUser,
        Resource::CurrentUser(CurrentUser {
            user: UserRecord {
                id: shared::domain::UserId("user1".to_string()),
                email: "user1@example.com".to_string(),
                username: "user1".to_string(),
                name: String::new(),
                avatar: String::new(),
                verified: true,
            },
            settings: None,
        }),
    );

    cache.invalidate_tasks();

    assert!(cache.get(&ResourceKey::Tasks).is_none());
    assert!(cache.get(&ResourceKey::Task(TaskId("a1".to_string()))).is_none());
    assert!(cache.get(&ResourceKey::CurrentUser).is_some());
}

#[test]
fn keys_render_as_query_paths() {
    assert_eq!(ResourceKey::CurrentUser.to_string(), "user");
    assert_eq!(ResourceKey::Tasks.to_string(), "tasks");
    assert_eq!(
        ResourceKey::Task(TaskId("abc123".to_string())).to_string(),
        "tasks/abc123"
    );
}
