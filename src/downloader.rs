// src/downloader.rs

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::ports::{FetchError, FileFetcher};
use crate::remap::{decode_path, encode_path};

const PREALLOC_LIMIT: u64 = 64 * 1024 * 1024;

/// Options for the HTTP fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherOptions {
    /// Catalog API root, e.g. `https://maps.example.com/api`.
    pub api_base: String,
    /// Bearer token for authenticated bundles.
    pub token: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            token: None,
            timeout: Duration::from_secs(60),
            user_agent: concat!("bundle-dl/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Fetches bundle files from the catalog API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    options: FetcherOptions,
}

impl HttpFetcher {
    pub fn new(options: FetcherOptions) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(options.user_agent.clone())
            .timeout(options.timeout)
            .build()?;
        Ok(Self { client, options })
    }

    /// URL of `path` within `bundle_id`. Each segment is escaped on its own,
    /// after decoding, so already-escaped manifest paths are not escaped twice.
    pub fn file_url(&self, bundle_id: &str, path: &str) -> Result<String, FetchError> {
        let decoded = decode_path(path);
        if decoded.is_empty() || decoded.split('/').any(|s| s.is_empty() || s == "..") {
            return Err(FetchError::InvalidPath(path.to_string()));
        }
        Ok(format!(
            "{}/bundles/{}/files/{}",
            self.options.api_base.trim_end_matches('/'),
            urlencoding::encode(bundle_id),
            encode_path(&decoded),
        ))
    }
}

#[async_trait]
impl FileFetcher for HttpFetcher {
    async fn fetch_file(&self, bundle_id: &str, path: &str) -> Result<Bytes, FetchError> {
        let url = self.file_url(bundle_id, path)?;
        let mut request = self.client.get(&url);
        if let Some(token) = &self.options.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?.error_for_status()?;
        // Content-Length is only a hint; never preallocate more than the cap.
        let hint = resp.content_length().unwrap_or(0).min(PREALLOC_LIMIT);
        let mut body = BytesMut::with_capacity(hint as usize);

        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }
        tracing::debug!(bundle = bundle_id, path, bytes = body.len(), "fetched file");
        Ok(body.freeze())
    }
}
