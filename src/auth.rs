//! OAuth2 access token management for the Google Ads API
//!
//! The refresh token from the environment is exchanged for short-lived
//! access tokens. [`TokenProvider`] caches the current token and serializes
//! refreshes so that concurrent queries never trigger duplicate exchanges.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use hyper_util::client::legacy::connect::Connect;
use hyper_util::client::legacy::Client;
use yup_oauth2::authenticator::Authenticator;
use yup_oauth2::authorized_user::AuthorizedUserSecret;
use yup_oauth2::{AuthorizedUserAuthenticator, CustomHyperClientBuilder};

use crate::client::HttpsConnector;
use crate::config::AdsCredentials;
use crate::error::{AdsError, Result};

/// Scope required by every Google Ads API call
pub const ADWORDS_SCOPE: &str = "https://www.googleapis.com/auth/adwords";

/// Tokens this close to expiry are refreshed before use
const REFRESH_MARGIN_SECS: i64 = 60;

/// Lifetime assumed for a pre-supplied token whose expiry is unknown
const PRESUPPLIED_TOKEN_TTL_SECS: i64 = 300;

/// Lifetime assumed when the token endpoint does not report one
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// A bearer token and the moment it stops being accepted
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Usable at `now` with the refresh margin still ahead of it
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Exchanges the long-lived refresh token for a new access token
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self) -> Result<AccessToken>;
}

/// Production exchanger backed by yup-oauth2's authorized-user flow
///
/// Every [`exchange`](TokenExchanger::exchange) goes to the token endpoint.
/// Caching is [`TokenProvider`]'s job, so yup-oauth2's own cache is bypassed;
/// otherwise a token the API just rejected would be handed back again.
pub struct OAuthTokenExchanger<C = HttpsConnector>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    authenticator: Authenticator<C>,
}

fn authorized_user_secret(credentials: &AdsCredentials) -> AuthorizedUserSecret {
    AuthorizedUserSecret {
        client_id: credentials.client_id.clone(),
        client_secret: credentials.client_secret.clone(),
        refresh_token: credentials.refresh_token.clone(),
        key_type: "authorized_user".to_string(),
    }
}

impl OAuthTokenExchanger<HttpsConnector> {
    /// Build the authenticator from configured client id/secret and refresh token
    pub async fn new(credentials: &AdsCredentials) -> Result<Self> {
        credentials.validate()?;

        let authenticator = AuthorizedUserAuthenticator::builder(authorized_user_secret(credentials))
            .build()
            .await
            .map_err(|e| AdsError::AuthError(format!("Failed to build authenticator: {}", e)))?;

        Ok(Self { authenticator })
    }
}

impl<C> OAuthTokenExchanger<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    /// Build the authenticator over a caller-supplied HTTP client
    pub async fn with_client(credentials: &AdsCredentials, client: Client<C, String>) -> Result<Self> {
        credentials.validate()?;

        let authenticator = AuthorizedUserAuthenticator::with_client(
            authorized_user_secret(credentials),
            CustomHyperClientBuilder::from(client),
        )
        .build()
        .await
        .map_err(|e| AdsError::AuthError(format!("Failed to build authenticator: {}", e)))?;

        Ok(Self { authenticator })
    }
}

#[async_trait]
impl<C> TokenExchanger for OAuthTokenExchanger<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    async fn exchange(&self) -> Result<AccessToken> {
        let token = self
            .authenticator
            .force_refreshed_token(&[ADWORDS_SCOPE])
            .await?;

        let secret = token
            .token()
            .ok_or_else(|| AdsError::AuthError("Token response carried no access token".to_string()))?
            .to_string();

        let expires_at = token
            .expiration_time()
            .and_then(|t| DateTime::<Utc>::from_timestamp(t.unix_timestamp(), 0))
            .unwrap_or_else(|| Utc::now() + Duration::seconds(DEFAULT_TOKEN_TTL_SECS));

        Ok(AccessToken::new(secret, expires_at))
    }
}

/// Hands out valid access tokens, refreshing at most one at a time
pub struct TokenProvider {
    exchanger: Arc<dyn TokenExchanger>,
    cached: Mutex<Option<AccessToken>>,
    exchanges: AtomicUsize,
    // Set once the token endpoint refuses the refresh token
    rejection: OnceLock<String>,
}

impl TokenProvider {
    pub fn new(exchanger: Arc<dyn TokenExchanger>) -> Self {
        Self {
            exchanger,
            cached: Mutex::new(None),
            exchanges: AtomicUsize::new(0),
            rejection: OnceLock::new(),
        }
    }

    /// Provider for configured credentials, seeded with a pre-supplied token if any
    ///
    /// Fails with `AuthError` before any exchange when a required credential
    /// is missing.
    pub fn from_credentials(
        credentials: &AdsCredentials,
        exchanger: Arc<dyn TokenExchanger>,
    ) -> Result<Self> {
        credentials.validate()?;

        let provider = Self::new(exchanger);
        match credentials.access_token.as_deref() {
            Some(token) => Ok(provider.with_initial_token(AccessToken::new(
                token,
                Utc::now() + Duration::seconds(PRESUPPLIED_TOKEN_TTL_SECS),
            ))),
            None => Ok(provider),
        }
    }

    pub fn with_initial_token(self, token: AccessToken) -> Self {
        Self {
            cached: Mutex::new(Some(token)),
            ..self
        }
    }

    /// Return a token that is valid for at least the refresh margin
    ///
    /// The cache lock is held across the exchange, so callers arriving while
    /// a refresh is in flight wait for it and reuse its result. Once the
    /// refresh token has been rejected, later calls fail without another
    /// exchange.
    pub async fn access_token(&self) -> Result<AccessToken> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh_at(Utc::now()) {
                return Ok(token.clone());
            }
            debug!("Cached access token expires at {}, refreshing", token.expires_at());
        }

        if let Some(reason) = self.rejection.get() {
            return Err(AdsError::AuthError(format!(
                "Refresh token was already rejected: {}",
                reason
            )));
        }

        info!("Refreshing access token...");
        let token = self.exchange_once_more_on_transient().await?;
        debug!("Access token valid until {}", token.expires_at());

        *cached = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token so the next call exchanges again
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    /// Number of exchanges performed so far (including failed attempts)
    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    async fn exchange_once_more_on_transient(&self) -> Result<AccessToken> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        let first = self.exchanger.exchange().await;

        let result = match first {
            Err(e) if e.is_transient() => {
                warn!("Token exchange failed ({}), retrying once", e);
                self.exchanges.fetch_add(1, Ordering::SeqCst);
                self.exchanger.exchange().await
            }
            other => other,
        };

        result.map_err(|e| match e {
            AdsError::AuthError(reason) => {
                let _ = self.rejection.set(reason.clone());
                AdsError::AuthError(reason)
            }
            other => AdsError::AuthError(format!("Token refresh failed: {}", other)),
        })
    }
}
