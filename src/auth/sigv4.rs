//! AWS SigV4 Authentication
//!
//! Validates AWS Signature Version 4 signed requests:
//!
//! 1. Parse the `Authorization` header into credential scope, signed headers
//!    and signature.
//! 2. Check the request timestamp against server time.
//! 3. Resolve the access key, reject inactive keys and locked accounts.
//! 4. Rebuild the canonical request and string to sign.
//! 5. Derive the signing key from the decrypted secret and compare signatures
//!    in constant time.

use super::canonical::{build_canonical_request, UNSIGNED_PAYLOAD};
use super::{AuthError, AuthRequest, AuthResult, Authenticator};
use crate::credentials::{CredentialStore, SecretCipher, SecretKey};
use crate::metrics::Recorder;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// The only supported signing algorithm
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Default tolerance between request time and server time (15 minutes)
pub const DEFAULT_MAX_CLOCK_SKEW_SECS: i64 = 15 * 60;

const SCOPE_TERMINATOR: &str = "aws4_request";
const COMPACT_TIMESTAMP: &str = "%Y%m%dT%H%M%SZ";

type HmacSha256 = Hmac<Sha256>;

/// `date/region/service/aws4_request`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialScope {
    pub date: String,
    pub region: String,
    pub service: String,
}

impl CredentialScope {
    pub fn new(date: &str, region: &str, service: &str) -> Self {
        Self {
            date: date.to_string(),
            region: region.to_string(),
            service: service.to_string(),
        }
    }
}

impl fmt::Display for CredentialScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.date, self.region, self.service, SCOPE_TERMINATOR
        )
    }
}

/// Components of a SigV4 `Authorization` header
///
/// ```text
/// AWS4-HMAC-SHA256 Credential=AKID/20150830/us-east-1/s3/aws4_request,
///   SignedHeaders=host;x-amz-date, Signature=<hex>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAuthorization {
    pub access_key_id: String,
    pub scope: CredentialScope,
    /// Lowercase names in declared order
    pub signed_headers: Vec<String>,
    pub signature: String,
}

/// Parse an `Authorization` header value
pub fn parse_authorization_header(header: &str) -> Result<ParsedAuthorization, AuthError> {
    let header = header.trim();
    let (scheme, rest) = header.split_once(' ').unwrap_or((header, ""));
    if scheme != ALGORITHM {
        return Err(AuthError::UnsupportedAuthScheme);
    }

    let mut credential = None;
    let mut signed_headers = None;
    let mut signature = None;

    for part in rest.split(',') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("Credential=") {
            credential = Some(value);
        } else if let Some(value) = part.strip_prefix("SignedHeaders=") {
            signed_headers = Some(value);
        } else if let Some(value) = part.strip_prefix("Signature=") {
            signature = Some(value);
        }
    }

    let credential = credential.ok_or_else(|| malformed("missing Credential"))?;
    let signed_headers = signed_headers.ok_or_else(|| malformed("missing SignedHeaders"))?;
    let signature = signature
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed("missing Signature"))?;

    let parts: Vec<&str> = credential.split('/').collect();
    if parts.len() != 5 || parts[4] != SCOPE_TERMINATOR || parts[..4].iter().any(|p| p.is_empty())
    {
        return Err(malformed("invalid Credential format"));
    }

    let signed_headers: Vec<String> = signed_headers
        .split(';')
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();
    if signed_headers.iter().any(String::is_empty) {
        return Err(malformed("invalid SignedHeaders"));
    }

    Ok(ParsedAuthorization {
        access_key_id: parts[0].to_string(),
        scope: CredentialScope::new(parts[1], parts[2], parts[3]),
        signed_headers,
        signature: signature.to_string(),
    })
}

fn malformed(reason: &str) -> AuthError {
    AuthError::MalformedAuthHeader(reason.to_string())
}

/// Parse a request timestamp.
///
/// Accepts the compact `YYYYMMDDThhmmssZ` form as well as RFC 1123 dates with
/// either a zone name (`GMT`) or a numeric offset (`+0000`).
pub fn parse_request_timestamp(value: &str) -> Result<DateTime<Utc>, AuthError> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, COMPACT_TIMESTAMP) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc2822(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AuthError::InvalidTimestamp(value.to_string()))
}

/// Reject requests more than `max_skew` away from `now`, in either direction.
pub fn check_clock_skew(
    timestamp: DateTime<Utc>,
    now: DateTime<Utc>,
    max_skew: Duration,
) -> Result<(), AuthError> {
    let skew = (now - timestamp).num_seconds().abs();
    if skew > max_skew.num_seconds() {
        return Err(AuthError::ClockSkewExceeded { skew_secs: skew });
    }
    Ok(())
}

/// `AWS4-HMAC-SHA256\n<timestamp>\n<scope>\n<hex(sha256(canonical_request))>`
pub fn build_string_to_sign(
    timestamp: &str,
    scope: &CredentialScope,
    canonical_request: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        timestamp,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    )
}

/// Derive the scoped signing key.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, date)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
pub fn derive_signing_key(
    secret: &SecretKey,
    scope: &CredentialScope,
) -> Zeroizing<[u8; 32]> {
    let seed = Zeroizing::new(format!("AWS4{}", secret.expose_secret()));
    let k_date = Zeroizing::new(hmac_sha256(seed.as_bytes(), scope.date.as_bytes()));
    let k_region = Zeroizing::new(hmac_sha256(k_date.as_ref(), scope.region.as_bytes()));
    let k_service = Zeroizing::new(hmac_sha256(k_region.as_ref(), scope.service.as_bytes()));
    Zeroizing::new(hmac_sha256(
        k_service.as_ref(),
        SCOPE_TERMINATOR.as_bytes(),
    ))
}

/// Hex signature of `string_to_sign` under the key derived for `scope`
pub fn calculate_signature(
    secret: &SecretKey,
    scope: &CredentialScope,
    string_to_sign: &str,
) -> String {
    let signing_key = derive_signing_key(secret, scope);
    hex::encode(hmac_sha256(signing_key.as_ref(), string_to_sign.as_bytes()))
}

/// Constant-time signature comparison
pub fn signatures_match(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Produce the `Authorization` header value for `request`.
///
/// Uses the request's `x-amz-date` (or `date`) and `x-amz-content-sha256`
/// headers exactly as the verifier will read them.
pub fn sign_request(
    request: &AuthRequest,
    access_key_id: &str,
    secret: &SecretKey,
    scope: &CredentialScope,
    signed_headers: &[String],
) -> Result<String, AuthError> {
    let timestamp = request_timestamp_header(request)?;
    let payload_hash = request
        .header("x-amz-content-sha256")
        .unwrap_or(UNSIGNED_PAYLOAD);
    let canonical_request = build_canonical_request(request, signed_headers, payload_hash);
    let string_to_sign = build_string_to_sign(timestamp, scope, &canonical_request);
    let signature = calculate_signature(secret, scope, &string_to_sign);

    Ok(format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM,
        access_key_id,
        scope,
        signed_headers.join(";"),
        signature
    ))
}

fn request_timestamp_header(request: &AuthRequest) -> Result<&str, AuthError> {
    request
        .header("x-amz-date")
        .or_else(|| request.header("date"))
        .ok_or(AuthError::MissingDateHeader)
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// SigV4 Authenticator
///
/// Resolves access keys through a [`CredentialStore`] and decrypts their
/// secrets with the server [`SecretCipher`] only for the duration of one
/// verification.
pub struct SigV4Authenticator {
    store: Arc<dyn CredentialStore>,
    cipher: Arc<SecretCipher>,
    max_clock_skew: Duration,
    metrics: Recorder,
}

impl SigV4Authenticator {
    /// Create a new SigV4 authenticator
    pub fn new(store: Arc<dyn CredentialStore>, cipher: Arc<SecretCipher>) -> Self {
        Self {
            store,
            cipher,
            max_clock_skew: Duration::seconds(DEFAULT_MAX_CLOCK_SKEW_SECS),
            metrics: Recorder::default(),
        }
    }

    #[must_use]
    pub fn with_max_clock_skew(mut self, max_clock_skew: Duration) -> Self {
        self.max_clock_skew = max_clock_skew;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Recorder) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Recorder {
        self.metrics
    }

    /// Authenticate against an explicit server time
    pub async fn authenticate_at(
        &self,
        request: &AuthRequest,
        now: DateTime<Utc>,
    ) -> Result<AuthResult, AuthError> {
        let result = self.verify(request, now).await;
        match &result {
            Ok(identity) => {
                self.metrics.auth_attempt("sigv4", true);
                debug!(
                    principal = %identity.principal,
                    access_key_id = %identity.access_key_id,
                    "SigV4 authentication successful"
                );
            }
            Err(e) => {
                self.metrics.auth_attempt("sigv4", false);
                warn!(
                    auth.failure = e.kind(),
                    method = %request.method,
                    "SigV4 authentication failed"
                );
            }
        }
        result
    }

    async fn verify(
        &self,
        request: &AuthRequest,
        now: DateTime<Utc>,
    ) -> Result<AuthResult, AuthError> {
        let header = request
            .header("authorization")
            .ok_or(AuthError::MissingAuth)?;
        let parsed = parse_authorization_header(header)?;

        let timestamp_raw = request_timestamp_header(request)?;
        let timestamp = parse_request_timestamp(timestamp_raw)?;
        check_clock_skew(timestamp, now, self.max_clock_skew)?;

        let resolved = self
            .store
            .resolve_by_access_key(&parsed.access_key_id)
            .await
            .map_err(|e| AuthError::StoreUnavailable(e.to_string()))?
            .ok_or(AuthError::CredentialNotFound)?;
        if !resolved.is_active {
            return Err(AuthError::CredentialInactive);
        }
        if resolved.principal.is_locked {
            return Err(AuthError::AccountLocked);
        }

        let payload_hash = request
            .header("x-amz-content-sha256")
            .unwrap_or(UNSIGNED_PAYLOAD);
        let canonical_request =
            build_canonical_request(request, &parsed.signed_headers, payload_hash);
        let string_to_sign = build_string_to_sign(timestamp_raw, &parsed.scope, &canonical_request);

        let expected = {
            let secret = self
                .cipher
                .decrypt(&resolved.encrypted_secret)
                .map_err(|_| AuthError::SecretDecryptionFailed)?;
            calculate_signature(&secret, &parsed.scope, &string_to_sign)
        };

        if !signatures_match(&expected, &parsed.signature) {
            return Err(AuthError::SignatureMismatch);
        }

        self.touch_last_used(&parsed.access_key_id, now);

        Ok(AuthResult {
            principal: resolved.principal.id,
            is_admin: resolved.principal.is_admin,
            access_key_id: parsed.access_key_id,
            region: parsed.scope.region,
            service: parsed.scope.service,
        })
    }

    // Fire-and-forget: never delays or fails the decision.
    fn touch_last_used(&self, access_key_id: &str, at: DateTime<Utc>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let access_key_id = access_key_id.to_string();
        handle.spawn(async move {
            if let Err(e) = store.touch_last_used(&access_key_id, at).await {
                debug!(error = %e, "Failed to update access key last-used time");
            }
        });
    }
}

#[async_trait]
impl Authenticator for SigV4Authenticator {
    #[tracing::instrument(
        name = "auth.sigv4",
        skip(self, request),
        fields(auth.method = "sigv4", http.method = %request.method)
    )]
    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthResult, AuthError> {
        self.authenticate_at(request, Utc::now()).await
    }
}
