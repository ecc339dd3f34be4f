//! Query cache shared by route prefetches and screens.
//!
//! The cache is an explicit context object: the application creates one at
//! startup and hands clones of it to every collaborator that needs it.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use shared::{
    domain::TaskId,
    protocol::{CurrentUser, TaskRecord},
};
use tracing::debug;

use crate::prefetch::{PrefetchError, ResourceLoader};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    CurrentUser,
    Tasks,
    Task(TaskId),
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::CurrentUser => f.write_str("user"),
            ResourceKey::Tasks => f.write_str("tasks"),
            ResourceKey::Task(task_id) => write!(f, "tasks/{task_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    CurrentUser(CurrentUser),
    Tasks(Vec<TaskRecord>),
    Task(TaskRecord),
}

type SharedLoad = Shared<BoxFuture<'static, Result<Resource, PrefetchError>>>;

struct InFlight {
    load: SharedLoad,
    waiters: usize,
}

enum Slot {
    Ready(Resource),
    Loading(InFlight),
}

/// One caller awaiting an in-flight load. Dropping it before the load
/// finishes gives up that caller's interest; the last one out removes the
/// slot, which drops the load future and the request behind it.
struct Waiter<'a> {
    cache: &'a QueryCache,
    key: &'a ResourceKey,
    load: SharedLoad,
    finished: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut slots = self.cache.lock();
        let Some(Slot::Loading(in_flight)) = slots.get_mut(self.key) else {
            return;
        };
        if !in_flight.load.ptr_eq(&self.load) {
            return;
        }
        in_flight.waiters = in_flight.waiters.saturating_sub(1);
        if in_flight.waiters == 0 {
            slots.remove(self.key);
            debug!(key = %self.key, "abandoned load dropped");
        }
    }
}

#[derive(Clone, Default)]
pub struct QueryCache {
    slots: Arc<Mutex<HashMap<ResourceKey, Slot>>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ResourceKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &ResourceKey) -> Option<Resource> {
        match self.lock().get(key) {
            Some(Slot::Ready(resource)) => Some(resource.clone()),
            _ => None,
        }
    }

    pub fn insert(&self, key: ResourceKey, resource: Resource) {
        self.lock().insert(key, Slot::Ready(resource));
    }

    pub fn invalidate(&self, key: &ResourceKey) {
        if self.lock().remove(key).is_some() {
            debug!(%key, "cache entry invalidated");
        }
    }

    /// Drops the task list and every single-task entry.
    pub fn invalidate_tasks(&self) {
        self.lock()
            .retain(|key, _| !matches!(key, ResourceKey::Tasks | ResourceKey::Task(_)));
        debug!("task cache entries invalidated");
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Returns the cached resource, loading it when absent.
    ///
    /// Concurrent callers for the same key share one load. Failed loads are
    /// not cached, so the next call retries. When every caller of a load is
    /// dropped before it completes, the load is cancelled and forgotten.
    pub async fn ensure_cached(
        &self,
        key: &ResourceKey,
        loader: Arc<dyn ResourceLoader>,
    ) -> Result<Resource, PrefetchError> {
        let mut waiter = {
            let mut slots = self.lock();
            let load = match slots.get_mut(key) {
                Some(Slot::Ready(resource)) => {
                    debug!(%key, "cache hit");
                    return Ok(resource.clone());
                }
                Some(Slot::Loading(in_flight)) => {
                    debug!(%key, "joining in-flight load");
                    in_flight.waiters += 1;
                    in_flight.load.clone()
                }
                None => {
                    debug!(%key, "cache miss");
                    let owned_key = key.clone();
                    let load = async move {
                        loader
                            .load(&owned_key)
                            .await
                            .map_err(|error| PrefetchError::new(owned_key.clone(), &error))
                    }
                    .boxed()
                    .shared();
                    slots.insert(
                        key.clone(),
                        Slot::Loading(InFlight {
                            load: load.clone(),
                            waiters: 1,
                        }),
                    );
                    load
                }
            };
            Waiter {
                cache: self,
                key,
                load,
                finished: false,
            }
        };

        let result = waiter.load.clone().await;
        waiter.finished = true;

        let mut slots = self.lock();
        let still_current = matches!(
            slots.get(key),
            Some(Slot::Loading(current)) if current.load.ptr_eq(&waiter.load)
        );
        if still_current {
            match &result {
                Ok(resource) => {
                    slots.insert(key.clone(), Slot::Ready(resource.clone()));
                }
                Err(_) => {
                    slots.remove(key);
                }
            }
        }
        result
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
