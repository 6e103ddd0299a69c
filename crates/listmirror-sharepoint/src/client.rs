//! SharePoint REST client with bearer injection, retry and rate-limit
//! handling.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use listmirror_core::cancel::CancelFlag;
use listmirror_core::config::SharePointSettings;
use listmirror_core::error::{SyncError, SyncResult};

use crate::auth::TokenCache;

/// One page of list items plus the cursor to the next page, if any.
#[derive(Debug)]
pub struct ListPage {
    /// Raw item objects from the page.
    pub items: Vec<Value>,
    /// Absolute URL of the next page, when the server reports one.
    pub next: Option<String>,
}

/// HTTP client for the SharePoint site REST API.
///
/// Transient failures (429, 502, 503, 504 and transport errors) are
/// retried in place with exponential backoff; 429 responses honor the
/// `Retry-After` header when present.
#[derive(Debug)]
pub struct SharePointClient {
    settings: SharePointSettings,
    http_client: reqwest::Client,
    token_cache: Arc<TokenCache>,
}

impl SharePointClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(settings: SharePointSettings, token_cache: Arc<TokenCache>) -> SyncResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.connection_timeout_secs))
            .build()
            .map_err(|e| SyncError::config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            settings,
            http_client,
            token_cache,
        })
    }

    /// Site base URL without a trailing slash.
    pub fn site_url(&self) -> &str {
        self.settings.site_url.trim_end_matches('/')
    }

    /// Performs a GET request with token injection and retry handling,
    /// returning the parsed JSON body.
    #[instrument(skip(self))]
    pub async fn get_json(&self, url: &str) -> SyncResult<Value> {
        let max_retries = self.settings.max_retries;
        let mut retries = 0u32;
        let mut rate_limit_attempts = 0u32;
        let mut delay = Duration::from_secs(1);

        loop {
            let token = self.token_cache.get_token().await?;

            let response = self
                .http_client
                .get(url)
                .bearer_auth(&token)
                .header("Accept", "application/json;odata=verbose")
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    if retries < max_retries {
                        retries += 1;
                        warn!(
                            "transport error, retry {}/{} after {:?}: {e}",
                            retries, max_retries, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay = (delay * 2).min(Duration::from_secs(30));
                        continue;
                    }
                    return Err(SyncError::transport_with_source("request failed", e));
                }
            };

            let status = response.status();

            // Rate limiting: honor Retry-After when present, otherwise
            // back off exponentially.
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if rate_limit_attempts >= max_retries {
                    return Err(SyncError::HttpStatus {
                        status: status.as_u16(),
                        body: "rate limit retries exhausted".to_string(),
                    });
                }
                let wait = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(delay);

                rate_limit_attempts += 1;
                warn!(
                    "rate limited, attempt {}/{}, backing off {:?}",
                    rate_limit_attempts, max_retries, wait
                );
                tokio::time::sleep(wait).await;
                delay = (delay * 2).min(Duration::from_secs(30));
                continue;
            }

            // Transient server errors.
            if matches!(
                status,
                reqwest::StatusCode::BAD_GATEWAY
                    | reqwest::StatusCode::SERVICE_UNAVAILABLE
                    | reqwest::StatusCode::GATEWAY_TIMEOUT
                    | reqwest::StatusCode::INTERNAL_SERVER_ERROR
            ) && retries < max_retries
            {
                retries += 1;
                warn!(
                    "transient error {}, retry {}/{} after {:?}",
                    status, retries, max_retries, delay
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(30));
                continue;
            }

            if status.is_success() {
                return response
                    .json::<Value>()
                    .await
                    .map_err(|e| SyncError::malformed(format!("response body: {e}")));
            }

            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
    }

    /// Tests the connection by requesting the site's web properties.
    #[instrument(skip(self))]
    pub async fn test_connection(&self) -> SyncResult<()> {
        let url = format!("{}/_api/web", self.site_url());
        self.get_json(&url).await?;
        debug!("connection test succeeded");
        Ok(())
    }

    /// Fetches one page of list items, extracting the verbose-OData
    /// envelope (`d.results` array and `d.__next` cursor).
    pub async fn get_page(&self, url: &str) -> SyncResult<ListPage> {
        let body = self.get_json(url).await?;

        let envelope = body
            .get("d")
            .ok_or_else(|| SyncError::malformed("missing 'd' envelope in list response"))?;

        let items = envelope
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| SyncError::malformed("missing 'd.results' array in list response"))?;

        let next = envelope
            .get("__next")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(ListPage { items, next })
    }

    /// Walks every page starting from `initial_url`, passing each page's
    /// items to `callback`.
    ///
    /// Cancellation is checked between pages; a configured courtesy delay
    /// is inserted before each follow-up page request.
    #[instrument(skip(self, cancel, callback))]
    pub async fn get_paginated<F>(
        &self,
        initial_url: &str,
        cancel: &CancelFlag,
        mut callback: F,
    ) -> SyncResult<()>
    where
        F: FnMut(Vec<Value>) -> SyncResult<()>,
    {
        let mut url = initial_url.to_string();
        let page_delay = Duration::from_millis(self.settings.page_delay_ms);
        let mut first = true;

        loop {
            cancel.check()?;

            if !first && !page_delay.is_zero() {
                tokio::time::sleep(page_delay).await;
            }
            first = false;

            debug!(%url, "fetching page");
            let page = self.get_page(&url).await?;
            callback(page.items)?;

            match page.next {
                Some(next) => url = next,
                None => return Ok(()),
            }
        }
    }
}
