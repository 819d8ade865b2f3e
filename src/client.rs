//! Google Ads REST client with bounded concurrency
//!
//! Every call is a GAQL query posted to `customers/{id}/googleAds:search`.
//! Pages are followed until the API stops returning a `nextPageToken`.

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request};
use hyper_util::client::legacy::connect::{Connect, HttpConnector};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::auth::TokenProvider;
use crate::config::Config;
use crate::error::{AdsError, Result};
use crate::models::{deserializers::deserialize_int64, AccountId};

/// Connector used against the real API
pub type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;

/// Trait defining Google Ads operations for easier testing
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdsClient: Send + Sync {
    /// Run a GAQL query against one customer and return every result row
    async fn search(&self, customer_id: AccountId, query: &str) -> Result<Vec<SearchRow>>;
}

/// One row of a `googleAds:search` response
///
/// Only the resources the pipeline selects are modelled; the API omits
/// resources that were not selected, so every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRow {
    pub customer_client: Option<CustomerClient>,
    pub click_view: Option<ClickView>,
    pub campaign: Option<ResourceRef>,
    pub ad_group: Option<ResourceRef>,
    pub segments: Option<Segments>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerClient {
    #[serde(default, deserialize_with = "deserialize_int64")]
    pub id: Option<u64>,
    pub manager: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_int64")]
    pub level: Option<u64>,
    pub descriptive_name: Option<String>,
    pub status: Option<String>,
    pub client_customer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickView {
    pub gclid: Option<String>,
    /// Resource name `customers/{c}/adGroupAds/{ad_group_id}~{ad_id}`
    pub ad_group_ad: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRef {
    #[serde(default, deserialize_with = "deserialize_int64")]
    pub id: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segments {
    pub date: Option<String>,
    pub ad_network_type: Option<String>,
    pub device: Option<String>,
    pub click_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchRow>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    errors: Vec<AdsFailure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdsFailure {
    error_code: Option<serde_json::Value>,
    message: Option<String>,
}

/// Pull the most useful text out of a Google error body
///
/// Prefers the first `GoogleAdsFailure` entry (it names the exact error
/// code, e.g. `USER_PERMISSION_DENIED`), then the top-level message, then
/// the raw body.
fn extract_error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let failure = envelope
                .error
                .details
                .iter()
                .flat_map(|d| d.errors.iter())
                .next();

            if let Some(failure) = failure {
                let code = failure
                    .error_code
                    .as_ref()
                    .and_then(|c| c.as_object())
                    .and_then(|o| o.values().next())
                    .and_then(|v| v.as_str())
                    .unwrap_or("UNKNOWN");
                return format!("{}: {}", code, failure.message.as_deref().unwrap_or(""));
            }

            match (envelope.error.status, envelope.error.message) {
                (Some(status), Some(message)) => format!("{}: {}", status, message),
                (None, Some(message)) => message,
                (Some(status), None) => status,
                (None, None) => String::from_utf8_lossy(body).into_owned(),
            }
        }
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    }
}

/// Production Google Ads client
///
/// Requests carry the bearer token, the developer token and the
/// `login-customer-id` header naming the manager we act through. A
/// semaphore caps the number of requests in flight.
pub struct RestAdsClient<C = HttpsConnector> {
    http: Client<C, Full<Bytes>>,
    tokens: Arc<TokenProvider>,
    base_url: String,
    developer_token: String,
    login_customer_id: AccountId,
    rate_limiter: Arc<Semaphore>,
    request_timeout: Duration,
}

impl RestAdsClient<HttpsConnector> {
    /// Create a client for the real API using TLS with native roots
    pub fn new(config: &Config, tokens: Arc<TokenProvider>) -> Result<Self> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| AdsError::ConfigError(format!("Failed to load TLS roots: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();

        Self::with_connector(config, tokens, connector)
    }
}

impl<C> RestAdsClient<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    /// Create a client over any hyper connector
    pub fn with_connector(config: &Config, tokens: Arc<TokenProvider>, connector: C) -> Result<Self> {
        let login_customer_id = config.credentials.login_customer()?;

        Ok(Self {
            http: Client::builder(TokioExecutor::new()).build(connector),
            tokens,
            base_url: format!(
                "{}/{}",
                config.api.endpoint.trim_end_matches('/'),
                config.api.version
            ),
            developer_token: config.credentials.developer_token.clone(),
            login_customer_id,
            rate_limiter: Arc::new(Semaphore::new(config.api.max_concurrent_requests)),
            request_timeout: Duration::from_secs(config.api.request_timeout_secs),
        })
    }

    fn search_url(&self, customer_id: AccountId) -> String {
        format!("{}/{}/googleAds:search", self.base_url, customer_id.resource_name())
    }

    /// Fetch a single result page
    async fn search_page(
        &self,
        customer_id: AccountId,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<SearchResponse> {
        let _permit = self.rate_limiter.acquire().await.map_err(|e| {
            AdsError::NetworkError(format!("Failed to acquire rate limit permit: {}", e))
        })?;

        let token = self.tokens.access_token().await?;
        let body = serde_json::to_vec(&SearchRequest { query, page_token })?;

        let request = Request::builder()
            .method(Method::POST)
            .uri(self.search_url(customer_id))
            .header(AUTHORIZATION, format!("Bearer {}", token.secret()))
            .header("developer-token", &self.developer_token)
            .header("login-customer-id", self.login_customer_id.to_string())
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| AdsError::ApiError(format!("Failed to build request: {}", e)))?;

        let response = tokio::time::timeout(self.request_timeout, self.http.request(request))
            .await
            .map_err(|_| {
                AdsError::NetworkError(format!(
                    "Request timed out after {:?}",
                    self.request_timeout
                ))
            })?
            .map_err(|e| AdsError::NetworkError(format!("Connection error: {}", e)))?;

        let (parts, body) = response.into_parts();
        let bytes = body
            .collect()
            .await
            .map_err(|e| AdsError::NetworkError(format!("Failed to read response body: {}", e)))?
            .to_bytes();

        if !parts.status.is_success() {
            let message = extract_error_message(&bytes);
            if parts.status == hyper::StatusCode::UNAUTHORIZED {
                warn!("Access token rejected, dropping cached token");
                self.tokens.invalidate().await;
            }
            return Err(AdsError::from_status(
                &hyper::Response::from_parts(parts, ()),
                message,
            ));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| AdsError::InvalidResponse(format!("Unexpected search response: {}", e)))
    }
}

#[async_trait]
impl<C> AdsClient for RestAdsClient<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    async fn search(&self, customer_id: AccountId, query: &str) -> Result<Vec<SearchRow>> {
        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .search_page(customer_id, query, page_token.as_deref())
                .await?;
            pages += 1;
            rows.extend(page.results);

            page_token = page.next_page_token.filter(|t| !t.is_empty());
            if page_token.is_none() {
                break;
            }
        }

        debug!(
            "Search on customer {} returned {} rows over {} page(s)",
            customer_id,
            rows.len(),
            pages
        );
        Ok(rows)
    }
}

// Shared ownership, so walker and executor can hold the same client
#[async_trait]
impl<T: AdsClient + ?Sized> AdsClient for Arc<T> {
    async fn search(&self, customer_id: AccountId, query: &str) -> Result<Vec<SearchRow>> {
        self.as_ref().search(customer_id, query).await
    }
}
