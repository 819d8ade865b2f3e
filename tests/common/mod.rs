//! Common test utilities and fixtures

#![allow(dead_code)]

use ads_click_export::auth::{AccessToken, TokenExchanger, TokenProvider};
use ads_click_export::client::{AdsClient, ClickView, CustomerClient, SearchRow, Segments};
use ads_click_export::config::{AdsCredentials, Config};
use ads_click_export::error::{AdsError, Result};
use ads_click_export::hierarchy::CHILD_ACCOUNTS_QUERY;
use ads_click_export::models::{AccountId, ClickRecord};
use ads_click_export::output::OutputSink;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn report_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
}

pub fn test_credentials() -> AdsCredentials {
    AdsCredentials {
        developer_token: "dev-token".to_string(),
        login_customer_id: Some(AccountId::new(111)),
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        refresh_token: "refresh-token".to_string(),
        access_token: None,
        use_proto_plus: true,
    }
}

pub fn test_config(endpoint: &str) -> Config {
    let mut config = Config::default().with_credentials(test_credentials());
    config.api.endpoint = endpoint.to_string();
    config
}

/// Exchanger that counts calls and can be told to fail
#[derive(Default)]
pub struct CountingExchanger {
    pub calls: AtomicUsize,
    pub fail: bool,
    pub delay_ms: u64,
    /// Calls that succeed before the refresh token is revoked
    pub revoked_after: Option<usize>,
    /// Lifetime of issued tokens; one hour when unset
    pub ttl_secs: Option<i64>,
}

impl CountingExchanger {
    pub fn slow(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Short-lived tokens (always due for refresh), revoked after `successes` exchanges
    pub fn revoked_after(successes: usize) -> Self {
        Self {
            revoked_after: Some(successes),
            ttl_secs: Some(30),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenExchanger for CountingExchanger {
    async fn exchange(&self) -> Result<AccessToken> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail || self.revoked_after.is_some_and(|limit| n >= limit) {
            return Err(AdsError::AuthError("invalid_grant".to_string()));
        }
        let ttl = Duration::seconds(self.ttl_secs.unwrap_or(3600));
        Ok(AccessToken::new(format!("token-{}", n), Utc::now() + ttl))
    }
}

pub fn token_provider(exchanger: std::sync::Arc<CountingExchanger>) -> TokenProvider {
    TokenProvider::new(exchanger)
}

/// In-memory account tree answering both the hierarchy and the click query
#[derive(Default)]
pub struct FakeHierarchy {
    children: HashMap<u64, Vec<(u64, bool)>>,
    clicks: HashMap<u64, Vec<String>>,
    failing: HashSet<u64>,
    calls: Mutex<Vec<u64>>,
}

impl FakeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manager(mut self, id: u64, children: &[(u64, bool)]) -> Self {
        self.children.insert(id, children.to_vec());
        self
    }

    pub fn clicks(mut self, id: u64, count: usize) -> Self {
        self.clicks
            .insert(id, (0..count).map(|n| format!("gclid-{}-{}", id, n)).collect());
        self
    }

    pub fn failing(mut self, id: u64) -> Self {
        self.failing.insert(id);
        self
    }

    pub fn calls(&self) -> Vec<u64> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AdsClient for FakeHierarchy {
    async fn search(&self, customer_id: AccountId, query: &str) -> Result<Vec<SearchRow>> {
        let id = customer_id.get();
        self.calls.lock().unwrap().push(id);

        if self.failing.contains(&id) {
            return Err(AdsError::Forbidden("USER_PERMISSION_DENIED".to_string()));
        }

        if query == CHILD_ACCOUNTS_QUERY {
            let rows = self
                .children
                .get(&id)
                .into_iter()
                .flatten()
                .map(|&(child, manager)| customer_client_row(child, manager))
                .collect();
            return Ok(rows);
        }

        let rows = self
            .clicks
            .get(&id)
            .into_iter()
            .flatten()
            .map(|gclid| click_row(gclid))
            .collect();
        Ok(rows)
    }
}

pub fn customer_client_row(id: u64, manager: bool) -> SearchRow {
    SearchRow {
        customer_client: Some(CustomerClient {
            id: Some(id),
            manager: Some(manager),
            level: Some(1),
            descriptive_name: Some(format!("Account {}", id)),
            status: Some("ENABLED".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn click_row(gclid: &str) -> SearchRow {
    SearchRow {
        click_view: Some(ClickView {
            gclid: Some(gclid.to_string()),
            ad_group_ad: None,
        }),
        segments: Some(Segments {
            date: Some("2026-10-17".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Sink that keeps every write in memory
#[derive(Default)]
pub struct MemorySink {
    pub writes: Mutex<Vec<Vec<ClickRecord>>>,
}

impl MemorySink {
    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn write(&self, records: &[ClickRecord]) -> Result<PathBuf> {
        self.writes.lock().unwrap().push(records.to_vec());
        Ok(PathBuf::from("memory://clicks.json"))
    }
}

/// `googleAds:search` response body for child account listings
pub fn mock_customer_client_response(children: &[(u64, bool)]) -> serde_json::Value {
    let results: Vec<_> = children
        .iter()
        .map(|(id, manager)| {
            json!({
                "customerClient": {
                    "resourceName": format!("customers/111/customerClients/{}", id),
                    "id": id.to_string(),
                    "manager": manager,
                    "level": "1",
                    "status": "ENABLED"
                }
            })
        })
        .collect();
    json!({ "results": results })
}

/// `googleAds:search` response body for click_view rows
pub fn mock_click_response(account: u64, gclids: &[&str]) -> serde_json::Value {
    let results: Vec<_> = gclids
        .iter()
        .map(|gclid| {
            json!({
                "clickView": {
                    "gclid": gclid,
                    "adGroupAd": format!("customers/{}/adGroupAds/23~4567", account)
                },
                "campaign": {"id": "17"},
                "adGroup": {"id": "23"},
                "segments": {
                    "date": "2026-10-17",
                    "adNetworkType": "SEARCH",
                    "device": "MOBILE",
                    "clickType": "URL_CLICKS"
                }
            })
        })
        .collect();
    json!({ "results": results })
}

/// Google Ads error envelope
pub fn mock_error_response(code: u16, status: &str, error_code: &str) -> serde_json::Value {
    json!({
        "error": {
            "code": code,
            "message": "The caller does not have permission",
            "status": status,
            "details": [{
                "@type": "type.googleapis.com/google.ads.googleads.v20.errors.GoogleAdsFailure",
                "errors": [{
                    "errorCode": {"authorizationError": error_code},
                    "message": "User doesn't have permission to access customer."
                }]
            }]
        }
    })
}
