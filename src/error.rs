use thiserror::Error;

use crate::models::AccountId;

/// Type alias for Result with AdsError
pub type Result<T> = std::result::Result<T, AdsError>;

/// Error types for the click export pipeline
#[derive(Error, Debug)]
pub enum AdsError {
    /// Credentials are missing or the token exchange failed. Fatal to a run.
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Listing the children of a manager account failed
    #[error("Hierarchy branch under {manager_id} skipped: {message}")]
    HierarchyBranch {
        manager_id: AccountId,
        message: String,
    },

    /// Click query for a single account failed
    #[error("Query for account {account_id} failed: {message}")]
    QueryError {
        account_id: AccountId,
        message: String,
    },

    /// Writing the output file failed
    #[error("Output error: {0}")]
    OutputError(String),

    /// Google Ads API returned an error we do not classify further
    #[error("Google Ads API error: {0}")]
    ApiError(String),

    /// Rate limit exceeded - server asked us to wait
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Bad request (400), usually a malformed query
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unauthenticated (401)
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Forbidden (403), e.g. the login customer does not manage the account
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AdsError {
    /// Check if the error is transient and a repeat of the request could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AdsError::RateLimitExceeded { .. }
                | AdsError::ServerError { .. }
                | AdsError::NetworkError(_)
        )
    }

    /// Only authentication, output and configuration failures abort a run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AdsError::AuthError(_) | AdsError::OutputError(_) | AdsError::ConfigError(_)
        )
    }

    /// Map a non-success HTTP status and its body to an error
    ///
    /// `message` should already carry the most useful text from the
    /// response (Google's `error.message` when present).
    pub fn from_status<B>(response: &hyper::Response<B>, message: String) -> Self {
        let status = response.status().as_u16();
        match status {
            429 => AdsError::RateLimitExceeded {
                retry_after: parse_retry_after_header(response),
            },
            400 => AdsError::BadRequest(message),
            401 => AdsError::Unauthenticated(message),
            403 => AdsError::Forbidden(message),
            404 => AdsError::NotFound(message),
            500..=599 => AdsError::ServerError { status, message },
            _ => AdsError::ApiError(format!("HTTP {}: {}", status, message)),
        }
    }

    /// Attach the account a query was issued for
    pub fn for_account(self, account_id: AccountId) -> Self {
        match self {
            AdsError::QueryError { .. } | AdsError::AuthError(_) => self,
            other => AdsError::QueryError {
                account_id,
                message: other.to_string(),
            },
        }
    }

    /// Attach the manager whose children could not be listed
    pub fn for_branch(self, manager_id: AccountId) -> Self {
        match self {
            AdsError::HierarchyBranch { .. } | AdsError::AuthError(_) => self,
            other => AdsError::HierarchyBranch {
                manager_id,
                message: other.to_string(),
            },
        }
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// The Retry-After header can be specified in two formats:
/// 1. Delay-seconds: An integer indicating seconds to wait (e.g., "120")
/// 2. HTTP-date: An HTTP date format (e.g., "Wed, 21 Oct 2015 07:28:00 GMT")
///
/// Returns the number of seconds to wait. If the header is missing or invalid,
/// returns a default of 5 seconds.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    if let Some(retry_after_value) = response.headers().get(hyper::header::RETRY_AFTER) {
        if let Ok(retry_after_str) = retry_after_value.to_str() {
            if let Ok(seconds) = retry_after_str.parse::<u64>() {
                return seconds;
            }

            if let Ok(http_date) = httpdate::parse_http_date(retry_after_str) {
                if let Ok(duration) = http_date.duration_since(std::time::SystemTime::now()) {
                    return duration.as_secs();
                }
            }
        }
    }

    DEFAULT_RETRY_AFTER
}

impl From<yup_oauth2::Error> for AdsError {
    fn from(error: yup_oauth2::Error) -> Self {
        match error {
            // The token endpoint answered but refused the grant
            yup_oauth2::Error::AuthError(ref err) => {
                AdsError::AuthError(format!("Token exchange rejected: {}", err))
            }
            yup_oauth2::Error::MissingAccessToken => {
                AdsError::AuthError("Token response carried no access token".to_string())
            }
            yup_oauth2::Error::UserError(ref msg) => AdsError::AuthError(msg.clone()),
            yup_oauth2::Error::JSONError(ref err) => {
                AdsError::AuthError(format!("Malformed token response: {}", err))
            }
            // Everything else is the transport failing underneath us
            other => AdsError::NetworkError(format!("Token exchange failed: {}", other)),
        }
    }
}
