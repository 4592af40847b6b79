//! Async HTTP fetcher wrapping reqwest.
//!
//! Loads GeoJSON and registry documents, posts SPARQL queries, and keeps an
//! in-memory cache for documents requested with [`Fetcher::get_json_cached`].
//! Failed requests are not retried.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::ACCEPT;
use serde_json::Value;
use tokio::sync::RwLock;

use signpost::{DatasetRegistry, SparqlResults};

use crate::types::{ServerError, ServerResult};

/// Media type of SPARQL JSON results.
pub const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

const USER_AGENT: &str = concat!("signpost-server/", env!("CARGO_PKG_VERSION"));

/// HTTP client for map data.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    cache: Arc<RwLock<HashMap<String, Value>>>,
}

impl Fetcher {
    /// Create a fetcher whose requests time out after `timeout_ms`.
    pub fn new(timeout_ms: u64) -> ServerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ServerError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// GET a JSON document. An empty body or a JSON `null` is an
    /// [`ServerError::EmptyResponse`].
    pub async fn get_json(&self, url: &str) -> ServerResult<Value> {
        tracing::debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ServerError::fetch(url, e))?;

        let body = read_body(url, response).await?;
        if body.trim().is_empty() {
            return Err(ServerError::EmptyResponse(url.to_string()));
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|e| ServerError::fetch(url, format!("invalid JSON: {e}")))?;
        if value.is_null() {
            return Err(ServerError::EmptyResponse(url.to_string()));
        }
        Ok(value)
    }

    /// Like [`Fetcher::get_json`], served from the cache after the first
    /// successful load.
    pub async fn get_json_cached(&self, url: &str) -> ServerResult<Value> {
        if let Some(hit) = self.cache.read().await.get(url) {
            tracing::debug!("Cache hit for {url}");
            return Ok(hit.clone());
        }

        let value = self.get_json(url).await?;
        self.cache.write().await.insert(url.to_string(), value.clone());
        Ok(value)
    }

    /// Number of cached documents.
    pub async fn cached(&self) -> usize {
        self.cache.read().await.len()
    }

    /// POST a SPARQL query as `query=` form data and parse the JSON results.
    pub async fn post_sparql(&self, endpoint: &str, query: &str) -> ServerResult<SparqlResults> {
        tracing::debug!("POST SPARQL query to {endpoint}");
        let response = self
            .client
            .post(endpoint)
            .header(ACCEPT, SPARQL_RESULTS_JSON)
            .form(&[("query", query)])
            .send()
            .await
            .map_err(|e| ServerError::fetch(endpoint, e))?;

        let body = read_body(endpoint, response).await?;
        if body.trim().is_empty() {
            return Err(ServerError::EmptyResponse(endpoint.to_string()));
        }

        let results = SparqlResults::from_json(&body)?;
        tracing::debug!("SPARQL endpoint returned {} rows", results.len());
        Ok(results)
    }

    /// Load the dataset registry from an http(s) URL or a local file.
    pub async fn load_registry(&self, source: &str) -> ServerResult<DatasetRegistry> {
        let registry = if is_remote(source) {
            DatasetRegistry::from_value(self.get_json(source).await?)?
        } else {
            let text = tokio::fs::read_to_string(source).await.map_err(|e| {
                ServerError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to read dataset registry {source}: {e}"),
                ))
            })?;
            DatasetRegistry::from_json(&text)?
        };

        tracing::info!("Loaded {} datasets from {source}", registry.len());
        Ok(registry)
    }
}

async fn read_body(url: &str, response: reqwest::Response) -> ServerResult<String> {
    let response = response
        .error_for_status()
        .map_err(|e| ServerError::fetch(url, e))?;
    response.text().await.map_err(|e| ServerError::fetch(url, e))
}

/// True when `source` is an http(s) URL rather than a file path.
pub fn is_remote(source: &str) -> bool {
    url::Url::parse(source).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}
