//! Request guard
//!
//! Wires the authenticator, the policy authorizer and the administrative
//! services together from [`Config`]. One call to [`Guard::check`] runs the
//! whole pipeline for a request: signature verification, then authorization.

use crate::auth::sigv4::SigV4Authenticator;
use crate::auth::{AuthError, AuthRequest, AuthResult, ClientError};
use crate::authz::{AccessRequest, Authorizer, PolicyAdmin, PolicyAuthorizer, PolicyStore};
use crate::config::{Config, ConfigError};
use crate::credentials::{CredentialIssuer, CredentialRepository, CredentialStore, SecretCipher};
use crate::metrics::Recorder;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Pipeline errors
#[derive(Error, Debug)]
pub enum GuardError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Access denied by policy")]
    Forbidden,
}

impl GuardError {
    /// What the caller gets to see
    pub fn client_error(&self) -> ClientError {
        match self {
            GuardError::Auth(e) => e.client_error(),
            GuardError::Forbidden => ClientError::access_denied(),
        }
    }
}

pub struct Guard {
    authenticator: SigV4Authenticator,
    authorizer: PolicyAuthorizer,
    issuer: CredentialIssuer,
    policy_admin: PolicyAdmin,
}

impl Guard {
    /// Build the pipeline over the given stores
    pub fn from_config<S>(
        config: &Config,
        credentials: Arc<S>,
        policies: Arc<dyn PolicyStore>,
    ) -> Result<Self, ConfigError>
    where
        S: CredentialRepository + 'static,
    {
        let cipher = Arc::new(
            SecretCipher::from_passphrase(&config.auth.encryption_key)
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?,
        );
        let max_skew = i64::try_from(config.auth.max_clock_skew_secs)
            .map_err(|_| ConfigError::ValidationError("max_clock_skew_secs out of range".into()))?;

        let metrics = Recorder::new(config.metrics.enabled);
        let store: Arc<dyn CredentialStore> = credentials.clone();
        let repository: Arc<dyn CredentialRepository> = credentials;

        let authenticator = SigV4Authenticator::new(store, Arc::clone(&cipher))
            .with_max_clock_skew(Duration::seconds(max_skew))
            .with_metrics(metrics);
        let authorizer = PolicyAuthorizer::new(Arc::clone(&policies))
            .with_rule(config.authorization.combination_rule)
            .with_metrics(metrics);
        let issuer = CredentialIssuer::new(repository, cipher)
            .with_max_active_keys(config.credentials.max_active_keys_per_principal);
        let policy_admin = PolicyAdmin::new(policies).with_metrics(metrics);

        info!(
            region = %config.auth.region,
            service = %config.auth.service,
            max_clock_skew_secs = max_skew,
            combination_rule = ?config.authorization.combination_rule,
            metrics_enabled = metrics.is_enabled(),
            "Request guard initialized"
        );

        Ok(Self {
            authenticator,
            authorizer,
            issuer,
            policy_admin,
        })
    }

    /// Authenticate `request`, then authorize `action` on the bucket or object
    pub async fn check(
        &self,
        request: &AuthRequest,
        bucket: &str,
        object_key: Option<&str>,
        action: &str,
    ) -> Result<AuthResult, GuardError> {
        self.check_at(request, bucket, object_key, action, Utc::now())
            .await
    }

    /// [`Guard::check`] against an explicit server time
    pub async fn check_at(
        &self,
        request: &AuthRequest,
        bucket: &str,
        object_key: Option<&str>,
        action: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthResult, GuardError> {
        let identity = self.authenticator.authenticate_at(request, now).await?;

        let access = match object_key {
            Some(key) => AccessRequest::object(&identity.principal, bucket, key, action),
            None => AccessRequest::bucket(&identity.principal, bucket, action),
        }
        .with_admin(identity.is_admin);

        let authorization = self.authorizer.authorize(&access).await;
        if !authorization.allowed {
            warn!(
                principal = %identity.principal,
                bucket = %bucket,
                action = %action,
                faults = authorization.faults.len(),
                "Request denied by policy"
            );
            return Err(GuardError::Forbidden);
        }

        Ok(identity)
    }

    pub fn issuer(&self) -> &CredentialIssuer {
        &self.issuer
    }

    pub fn policy_admin(&self) -> &PolicyAdmin {
        &self.policy_admin
    }
}
