//! Authentication module
//!
//! Verifies AWS Signature Version 4 signed requests against stored credentials.
//!
//! Every rejection carries a precise [`AuthError`] for server-side logs. Before
//! anything reaches the caller it is collapsed through [`AuthError::client_error`],
//! so an unknown key, a locked account and a bad signature all look the same.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

pub mod canonical;
pub mod sigv4;

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Unsupported authorization scheme")]
    UnsupportedAuthScheme,

    #[error("Malformed authorization header: {0}")]
    MalformedAuthHeader(String),

    #[error("Missing date header")]
    MissingDateHeader,

    #[error("Invalid request timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Credential not found")]
    CredentialNotFound,

    #[error("Credential is inactive")]
    CredentialInactive,

    #[error("Account is locked")]
    AccountLocked,

    #[error("Secret decryption failed")]
    SecretDecryptionFailed,

    #[error("Signature mismatch")]
    SignatureMismatch,

    #[error("Request time is {skew_secs}s away from server time")]
    ClockSkewExceeded { skew_secs: i64 },

    #[error("Credential store unavailable: {0}")]
    StoreUnavailable(String),
}

impl AuthError {
    /// Short stable name for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingAuth => "missing_auth",
            AuthError::UnsupportedAuthScheme => "unsupported_scheme",
            AuthError::MalformedAuthHeader(_) => "malformed_header",
            AuthError::MissingDateHeader => "missing_date",
            AuthError::InvalidTimestamp(_) => "invalid_timestamp",
            AuthError::CredentialNotFound => "credential_not_found",
            AuthError::CredentialInactive => "credential_inactive",
            AuthError::AccountLocked => "account_locked",
            AuthError::SecretDecryptionFailed => "secret_decryption_failed",
            AuthError::SignatureMismatch => "signature_mismatch",
            AuthError::ClockSkewExceeded { .. } => "clock_skew_exceeded",
            AuthError::StoreUnavailable(_) => "store_unavailable",
        }
    }

    /// The response the caller is allowed to see.
    ///
    /// Only syntax problems with the caller's own header are distinguishable.
    /// Everything that depends on stored credentials, secrets or time maps to
    /// one identical access-denied response.
    pub fn client_error(&self) -> ClientError {
        match self {
            AuthError::MissingAuth => ClientError {
                code: S3ErrorCode::AccessDenied,
                status: 401,
                message: "Missing authorization header",
            },
            AuthError::UnsupportedAuthScheme => ClientError {
                code: S3ErrorCode::InvalidArgument,
                status: 401,
                message: "Unsupported authorization method",
            },
            AuthError::MalformedAuthHeader(_) => ClientError {
                code: S3ErrorCode::InvalidArgument,
                status: 401,
                message: "Invalid authorization header format",
            },
            AuthError::StoreUnavailable(_) => ClientError {
                code: S3ErrorCode::InternalError,
                status: 500,
                message: "We encountered an internal error. Please try again.",
            },
            AuthError::MissingDateHeader
            | AuthError::InvalidTimestamp(_)
            | AuthError::CredentialNotFound
            | AuthError::CredentialInactive
            | AuthError::AccountLocked
            | AuthError::SecretDecryptionFailed
            | AuthError::SignatureMismatch
            | AuthError::ClockSkewExceeded { .. } => ClientError::access_denied(),
        }
    }
}

/// S3 error codes surfaced to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3ErrorCode {
    AccessDenied,
    InvalidArgument,
    InternalError,
}

impl S3ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            S3ErrorCode::AccessDenied => "AccessDenied",
            S3ErrorCode::InvalidArgument => "InvalidArgument",
            S3ErrorCode::InternalError => "InternalError",
        }
    }
}

/// Client-facing rejection: error code, HTTP status and a fixed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientError {
    pub code: S3ErrorCode,
    pub status: u16,
    pub message: &'static str,
}

impl ClientError {
    /// The generic rejection shared by every credential and signature failure.
    pub fn access_denied() -> Self {
        Self {
            code: S3ErrorCode::AccessDenied,
            status: 403,
            message: "Access Denied",
        }
    }
}

/// Authenticated identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    /// Owning principal of the access key
    pub principal: String,
    pub is_admin: bool,
    pub access_key_id: String,
    /// Region from the credential scope
    pub region: String,
    /// Service from the credential scope
    pub service: String,
}

/// Authenticator trait
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate a request
    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthResult, AuthError>;
}

/// Authentication request context
///
/// Header names are matched case-insensitively. `path` and `query` are the raw
/// request target as received.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
    pub query: Option<String>,
    pub method: String,
    pub path: String,
    /// Host taken from the connection, used when no `host` header was sent
    pub host: Option<String>,
}

impl AuthRequest {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// Look up a header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.headers.get(name) {
            return Some(value.as_str());
        }
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
