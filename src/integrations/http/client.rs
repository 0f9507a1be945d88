// src/integrations/http/client.rs
//
// HTTP fetcher for the asset cache.
//
// ARCHITECTURE:
// - `AssetFetcher` is the seam the cache manager talks to
// - `HttpFetcher` is the reqwest-backed implementation
// - Maps transport responses into `AssetResponse` (NO cache decisions here)
//
// RULES:
// - A non-2xx status is a response, not an error; callers decide
// - Transport failures map to `AppError::Network`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method};

use crate::domain::{AssetRequest, AssetResponse, ResponseSource};
use crate::error::{AppError, AppResult};

const USER_AGENT: &str = concat!("almacen-offline/", env!("CARGO_PKG_VERSION"));

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Perform the request against the network.
    async fn fetch(&self, request: &AssetRequest) -> AppResult<AssetResponse>;
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    http_client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with a request timeout (`None` waits indefinitely).
    pub fn new(timeout: Option<Duration>) -> AppResult<Self> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| AppError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, request: &AssetRequest) -> AppResult<AssetResponse> {
        let mut builder = self
            .http_client
            .request(request.method.clone(), request.url.clone());

        if let Some(accept) = &request.accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        if request.bypass_cache {
            builder = builder
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::PRAGMA, "no-cache");
        }

        let response = builder.send().await.map_err(|e| {
            AppError::Network(format!("Request to {} failed: {}", request.url, e))
        })?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = if request.method == Method::HEAD {
            Vec::new()
        } else {
            response
                .bytes()
                .await
                .map_err(|e| {
                    AppError::Network(format!("Reading body of {} failed: {}", request.url, e))
                })?
                .to_vec()
        };

        log::debug!("Fetched {} -> {} ({} bytes)", request.url, status, body.len());

        Ok(AssetResponse {
            url: request.request_key(),
            status,
            headers,
            body,
            source: ResponseSource::Network,
        })
    }
}
