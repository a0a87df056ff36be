//! Access credentials
//!
//! The credential store itself is external (a relational database in
//! production). This module defines the narrow interfaces the authenticator
//! consumes, an in-memory implementation, and the issuance/revocation flow
//! for access keys.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub mod cipher;
pub mod keygen;

pub use cipher::{SecretCipher, SecretKey};

/// Default cap on active access keys per principal
pub const DEFAULT_MAX_ACTIVE_KEYS: usize = 5;

/// Credential errors
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Credential not found")]
    NotFound,

    #[error("Maximum of {limit} active access keys reached")]
    LimitReached { limit: usize },

    #[error("Not permitted to manage this credential")]
    Forbidden,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Identity that owns access keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_locked: bool,
}

impl Principal {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            is_admin: false,
            is_locked: false,
        }
    }

    #[must_use]
    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    #[must_use]
    pub fn locked(mut self) -> Self {
        self.is_locked = true;
        self
    }
}

/// Stored access credential
///
/// `secret_encrypted` is skipped on serialization so listings never carry it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessCredential {
    pub id: Uuid,
    pub access_key_id: String,
    pub principal: String,
    pub is_active: bool,
    #[serde(skip_serializing, default)]
    pub secret_encrypted: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Result of resolving an access key id
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub principal: Principal,
    pub is_active: bool,
    pub encrypted_secret: String,
}

/// Read interface consumed on the authentication path
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Resolve an access key id. `Ok(None)` when unknown.
    async fn resolve_by_access_key(
        &self,
        access_key_id: &str,
    ) -> Result<Option<ResolvedCredential>, CredentialError>;

    /// Advisory last-used update; callers ignore failures.
    async fn touch_last_used(
        &self,
        access_key_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CredentialError>;
}

/// Write interface used by key issuance
#[async_trait]
pub trait CredentialRepository: CredentialStore {
    async fn insert(&self, credential: AccessCredential) -> Result<(), CredentialError>;

    async fn list_for_principal(
        &self,
        principal: &str,
    ) -> Result<Vec<AccessCredential>, CredentialError>;

    async fn get(&self, id: Uuid) -> Result<Option<AccessCredential>, CredentialError>;

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), CredentialError>;
}

/// In-memory credential store for tests and local development
#[derive(Default)]
pub struct InMemoryCredentialStore {
    principals: RwLock<HashMap<String, Principal>>,
    credentials: RwLock<HashMap<String, AccessCredential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a principal
    pub fn upsert_principal(&self, principal: Principal) {
        self.principals
            .write()
            .insert(principal.id.clone(), principal);
    }

    pub fn set_locked(&self, principal: &str, locked: bool) {
        if let Some(p) = self.principals.write().get_mut(principal) {
            p.is_locked = locked;
        }
    }

    /// Store a credential whose secret is already encrypted
    pub fn add_credential(
        &self,
        access_key_id: &str,
        principal: &str,
        secret_encrypted: String,
    ) -> AccessCredential {
        let credential = AccessCredential {
            id: Uuid::new_v4(),
            access_key_id: access_key_id.to_string(),
            principal: principal.to_string(),
            is_active: true,
            secret_encrypted,
            created_at: Utc::now(),
            last_used_at: None,
        };
        self.credentials
            .write()
            .insert(access_key_id.to_string(), credential.clone());
        credential
    }

    pub fn last_used(&self, access_key_id: &str) -> Option<DateTime<Utc>> {
        self.credentials
            .read()
            .get(access_key_id)
            .and_then(|c| c.last_used_at)
    }
}

impl fmt::Debug for InMemoryCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCredentialStore")
            .field("principals", &self.principals.read().len())
            .field("credentials", &self.credentials.read().len())
            .finish()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn resolve_by_access_key(
        &self,
        access_key_id: &str,
    ) -> Result<Option<ResolvedCredential>, CredentialError> {
        let credentials = self.credentials.read();
        let Some(credential) = credentials.get(access_key_id) else {
            return Ok(None);
        };
        let principals = self.principals.read();
        // orphaned keys resolve like unknown keys
        let Some(principal) = principals.get(&credential.principal) else {
            return Ok(None);
        };

        Ok(Some(ResolvedCredential {
            principal: principal.clone(),
            is_active: credential.is_active,
            encrypted_secret: credential.secret_encrypted.clone(),
        }))
    }

    async fn touch_last_used(
        &self,
        access_key_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CredentialError> {
        match self.credentials.write().get_mut(access_key_id) {
            Some(credential) => {
                credential.last_used_at = Some(at);
                Ok(())
            }
            None => Err(CredentialError::NotFound),
        }
    }
}

#[async_trait]
impl CredentialRepository for InMemoryCredentialStore {
    async fn insert(&self, credential: AccessCredential) -> Result<(), CredentialError> {
        let mut credentials = self.credentials.write();
        if credentials.contains_key(&credential.access_key_id) {
            return Err(CredentialError::Backend("duplicate access key id".into()));
        }
        credentials.insert(credential.access_key_id.clone(), credential);
        Ok(())
    }

    async fn list_for_principal(
        &self,
        principal: &str,
    ) -> Result<Vec<AccessCredential>, CredentialError> {
        let mut list: Vec<AccessCredential> = self
            .credentials
            .read()
            .values()
            .filter(|c| c.principal == principal)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn get(&self, id: Uuid) -> Result<Option<AccessCredential>, CredentialError> {
        Ok(self
            .credentials
            .read()
            .values()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), CredentialError> {
        let mut credentials = self.credentials.write();
        let credential = credentials
            .values_mut()
            .find(|c| c.id == id)
            .ok_or(CredentialError::NotFound)?;
        credential.is_active = active;
        Ok(())
    }
}

/// A freshly issued key pair. The only place the plaintext secret ever appears.
pub struct IssuedCredential {
    pub id: Uuid,
    pub access_key_id: String,
    pub secret_key: SecretKey,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("id", &self.id)
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &self.secret_key)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Issues, lists and revokes access keys
pub struct CredentialIssuer {
    repository: Arc<dyn CredentialRepository>,
    cipher: Arc<SecretCipher>,
    max_active_keys: usize,
}

impl CredentialIssuer {
    pub fn new(repository: Arc<dyn CredentialRepository>, cipher: Arc<SecretCipher>) -> Self {
        Self {
            repository,
            cipher,
            max_active_keys: DEFAULT_MAX_ACTIVE_KEYS,
        }
    }

    #[must_use]
    pub fn with_max_active_keys(mut self, max: usize) -> Self {
        self.max_active_keys = max;
        self
    }

    /// Create a key pair for `principal`.
    pub async fn issue(&self, principal: &str) -> Result<IssuedCredential, CredentialError> {
        let active = self
            .repository
            .list_for_principal(principal)
            .await?
            .iter()
            .filter(|c| c.is_active)
            .count();
        if active >= self.max_active_keys {
            return Err(CredentialError::LimitReached {
                limit: self.max_active_keys,
            });
        }

        let access_key_id = keygen::generate_access_key();
        let secret_key = keygen::generate_secret_key();
        let secret_encrypted = self.cipher.encrypt(secret_key.expose_secret())?;

        let credential = AccessCredential {
            id: Uuid::new_v4(),
            access_key_id: access_key_id.clone(),
            principal: principal.to_string(),
            is_active: true,
            secret_encrypted,
            created_at: Utc::now(),
            last_used_at: None,
        };
        let (id, created_at) = (credential.id, credential.created_at);
        self.repository.insert(credential).await?;

        info!(principal = %principal, credential_id = %id, "Issued access key");

        Ok(IssuedCredential {
            id,
            access_key_id,
            secret_key,
            created_at,
        })
    }

    /// Credential metadata for `principal`, newest first
    pub async fn list(&self, principal: &str) -> Result<Vec<AccessCredential>, CredentialError> {
        self.repository.list_for_principal(principal).await
    }

    /// Deactivate a key. Owners may revoke their own keys, admins any key.
    pub async fn revoke(
        &self,
        caller: &str,
        caller_is_admin: bool,
        id: Uuid,
    ) -> Result<(), CredentialError> {
        let credential = self
            .repository
            .get(id)
            .await?
            .ok_or(CredentialError::NotFound)?;

        if !caller_is_admin && credential.principal != caller {
            return Err(CredentialError::Forbidden);
        }

        self.repository.set_active(id, false).await?;
        info!(caller = %caller, credential_id = %id, "Revoked access key");
        Ok(())
    }
}
