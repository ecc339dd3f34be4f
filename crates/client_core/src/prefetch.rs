use std::sync::Arc;

use async_trait::async_trait;
use shared::error::ErrorCode;
use thiserror::Error;

use crate::{
    cache::{QueryCache, Resource, ResourceKey},
    error::ClientError,
};

#[derive(Debug, Clone, Error)]
#[error("failed to load {key}: {message}")]
pub struct PrefetchError {
    pub key: ResourceKey,
    pub code: Option<ErrorCode>,
    pub message: String,
}

impl PrefetchError {
    pub fn new(key: ResourceKey, error: &ClientError) -> Self {
        Self {
            key,
            code: error.code(),
            message: error.to_string(),
        }
    }
}

/// Fetches a resource from its remote source, bypassing any cache.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load(&self, key: &ResourceKey) -> Result<Resource, ClientError>;
}

/// Ensures a resource is cached before the screen that needs it renders.
#[async_trait]
pub trait DataPrefetcher: Send + Sync {
    async fn ensure_cached(&self, key: &ResourceKey) -> Result<Resource, PrefetchError>;
}

pub struct CachedPrefetcher {
    cache: QueryCache,
    loader: Arc<dyn ResourceLoader>,
}

impl CachedPrefetcher {
    pub fn new(cache: QueryCache, loader: Arc<dyn ResourceLoader>) -> Self {
        Self { cache, loader }
    }
}

#[async_trait]
impl DataPrefetcher for CachedPrefetcher {
    async fn ensure_cached(&self, key: &ResourceKey) -> Result<Resource, PrefetchError> {
        self.cache.ensure_cached(key, self.loader.clone()).await
    }
}
