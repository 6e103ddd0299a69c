//! App-only OAuth2 authentication for the SharePoint REST API.
//!
//! Exchanges tenant/client credentials for a bearer token at the
//! access-control service and caches it until shortly before expiry.

use chrono::{DateTime, Duration, Utc};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use listmirror_core::config::SharePointSettings;
use listmirror_core::error::{SyncError, SyncResult};
use listmirror_core::retry::{RetryConfig, RetryExecutor};

/// SharePoint principal id used in the ACS resource identifier.
const SHAREPOINT_PRINCIPAL: &str = "00000003-0000-0ff1-ce00-000000000000";

/// Tokens are treated as expired this many seconds before their stated
/// expiry, to tolerate clock skew and in-flight requests.
const EXPIRY_GRACE_SECS: i64 = 300;

/// Fallback token lifetime when the endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Token response from the access-control service.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Cached access token.
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Returns true if the token is expired or will expire within the
    /// grace period.
    fn is_expired(&self, grace: Duration) -> bool {
        Utc::now() + grace >= self.expires_at
    }
}

/// Token cache for app-only SharePoint authentication.
///
/// Owns the single cached token; the token is never persisted and is
/// replaced wholesale on refresh.
#[derive(Debug)]
pub struct TokenCache {
    settings: SharePointSettings,
    site_domain: String,
    http_client: reqwest::Client,
    retry: RetryExecutor,
    cached_token: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    /// Creates a new token cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the site URL is invalid or the HTTP client
    /// cannot be created.
    pub fn new(settings: SharePointSettings) -> SyncResult<Self> {
        let site_domain = settings.site_domain()?;
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(
                settings.connection_timeout_secs,
            ))
            .build()
            .map_err(|e| SyncError::config(format!("failed to create HTTP client: {e}")))?;

        let retry = RetryExecutor::new(RetryConfig {
            max_retries: settings.max_retries,
            ..RetryConfig::default()
        });

        Ok(Self {
            settings,
            site_domain,
            http_client,
            retry,
            cached_token: RwLock::new(None),
        })
    }

    /// Gets a valid access token, refreshing if necessary.
    ///
    /// Within the validity window the cached value is returned without a
    /// network call; after expiry exactly one refresh is performed.
    #[instrument(skip(self), fields(tenant_id = %self.settings.tenant_id))]
    pub async fn get_token(&self) -> SyncResult<String> {
        {
            let cache = self.cached_token.read().await;
            if let Some(ref token) = *cache {
                if !token.is_expired(Duration::seconds(EXPIRY_GRACE_SECS)) {
                    debug!("using cached token");
                    return Ok(token.access_token.clone());
                }
            }
        }

        debug!("refreshing access token");
        let new_token = self.acquire_token().await?;

        {
            let mut cache = self.cached_token.write().await;
            *cache = Some(new_token.clone());
        }

        Ok(new_token.access_token)
    }

    /// Acquires a new access token using the client-credentials flow,
    /// retrying transient failures with exponential backoff.
    #[instrument(skip(self))]
    async fn acquire_token(&self) -> SyncResult<CachedToken> {
        let token_url = format!(
            "{}/{}/tokens/OAuth/2",
            self.settings.authority.trim_end_matches('/'),
            self.settings.tenant_id
        );

        let client_id = format!("{}@{}", self.settings.client_id, self.settings.tenant_id);
        let resource = format!(
            "{}/{}@{}",
            SHAREPOINT_PRINCIPAL, self.site_domain, self.settings.tenant_id
        );

        let result = self
            .retry
            .execute(|| {
                let params = [
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    (
                        "client_secret",
                        self.settings.client_secret.expose_secret(),
                    ),
                    ("resource", resource.as_str()),
                ];
                let request = self.http_client.post(&token_url).form(&params);
                async move {
                    let response = request
                        .send()
                        .await
                        .map_err(|e| SyncError::transport_with_source("token request failed", e))?;

                    let status = response.status();
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(SyncError::HttpStatus {
                            status: status.as_u16(),
                            body,
                        });
                    }

                    response
                        .json::<TokenResponse>()
                        .await
                        .map_err(|e| SyncError::malformed(format!("token response: {e}")))
                }
            })
            .await;

        let token_response = result
            .map_err(|e| SyncError::authentication(format!("token request failed: {e}")))?;

        if token_response.access_token.is_empty() {
            return Err(SyncError::authentication("empty access token in response"));
        }

        let expires_in = token_response
            .expires_in
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let expires_at = Utc::now() + Duration::seconds(expires_in);

        debug!(%expires_at, "acquired new token");

        Ok(CachedToken {
            access_token: token_response.access_token,
            expires_at,
        })
    }

    /// Invalidates the cached token, forcing a refresh on next use.
    pub async fn invalidate(&self) {
        let mut cache = self.cached_token.write().await;
        *cache = None;
    }
}
