//! HTTP transport for the hosted record backend.

use std::{sync::Arc, time::Duration};

use reqwest::{header::AUTHORIZATION, Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use shared::{error::ApiError, protocol::ListResult};
use tracing::warn;
use url::Url;

use crate::{error::ClientError, session::AuthStore};

const FULL_LIST_BATCH: u32 = 500;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct BackendClient {
    http: Client,
    base_url: Url,
    auth: Arc<AuthStore>,
}

impl BackendClient {
    pub fn new(server_url: &str, auth: Arc<AuthStore>) -> Result<Self, ClientError> {
        Self::with_timeout(server_url, auth, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        server_url: &str,
        auth: Arc<AuthStore>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: normalize_base_url(server_url)?,
            auth,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base used to build file links, without the trailing slash.
    pub fn origin(&self) -> String {
        self.base_url.as_str().trim_end_matches('/').to_string()
    }

    pub fn auth(&self) -> &Arc<AuthStore> {
        &self.auth
    }

    pub fn collection_url(&self, collection: &str, suffix: &str) -> Result<Url, ClientError> {
        let path = if suffix.is_empty() {
            format!("api/collections/{collection}")
        } else {
            format!("api/collections/{collection}/{}", suffix.trim_start_matches('/'))
        };
        Ok(self.base_url.join(&path)?)
    }

    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match self.auth.token() {
            Some(token) => builder.header(AUTHORIZATION, token),
            None => builder,
        }
    }

    pub async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let error = ApiError::from_response(status.as_u16(), &body);
            warn!(status = status.as_u16(), message = %error.message, "backend request failed");
            return Err(error.into());
        }
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub async fn send_empty(&self, builder: RequestBuilder) -> Result<(), ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = ApiError::from_response(status.as_u16(), &body);
            warn!(status = status.as_u16(), message = %error.message, "backend request failed");
            return Err(error.into());
        }
        Ok(())
    }

    /// Fetches every record of a collection, page by page.
    pub async fn full_list<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Option<&str>,
    ) -> Result<Vec<T>, ClientError> {
        let url = self.collection_url(collection, "records")?;
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let mut query = vec![
                ("page", page.to_string()),
                ("perPage", FULL_LIST_BATCH.to_string()),
                ("sort", "created".to_string()),
            ];
            if let Some(filter) = filter {
                query.push(("filter", filter.to_string()));
            }
            let batch: ListResult<T> = self
                .send_json(self.request(Method::GET, url.clone()).query(&query))
                .await?;
            let received = batch.items.len();
            items.extend(batch.items);
            if received < FULL_LIST_BATCH as usize || page >= batch.total_pages {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    /// Returns the first record matching `filter`, or a not-found error.
    pub async fn first_list_item<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: &str,
    ) -> Result<T, ClientError> {
        let url = self.collection_url(collection, "records")?;
        let query = [
            ("page", "1"),
            ("perPage", "1"),
            ("skipTotal", "1"),
            ("filter", filter),
        ];
        let batch: ListResult<T> = self
            .send_json(self.request(Method::GET, url).query(&query))
            .await?;
        batch
            .items
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::not_found(format!("no {collection} record matches {filter}")))
    }

    pub fn file_url(&self, collection: &str, record_id: &str, filename: &str) -> String {
        format!("{}/api/files/{collection}/{record_id}/{filename}", self.origin())
    }
}

/// Accepts `host:port`, `http(s)://host[:port][/prefix]`; always ends with `/`.
pub fn normalize_base_url(raw: &str) -> Result<Url, ClientError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    Ok(Url::parse(&format!("{with_scheme}/"))?)
}

/// Quotes a value for use inside a backend filter expression.
pub fn filter_literal(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
