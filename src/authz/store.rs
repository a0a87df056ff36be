//! Policy storage interface

use super::policy::StoredPolicy;
use super::AuthzError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Persistence for user policies, buckets and bucket policies.
///
/// Documents are stored and returned as raw text. Validation happens above
/// this layer on write and again on every read.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// All policies attached to `principal`, in attachment order
    async fn policies_for_principal(&self, principal: &str)
        -> Result<Vec<StoredPolicy>, AuthzError>;

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, AuthzError>;

    /// The bucket's policy text, if one is set
    async fn bucket_policy(&self, bucket: &str) -> Result<Option<String>, AuthzError>;

    /// Create or replace a named policy
    async fn save_policy(&self, name: &str, document: String) -> Result<(), AuthzError>;

    /// Create or replace a bucket's policy
    async fn save_bucket_policy(&self, bucket: &str, document: String) -> Result<(), AuthzError>;

    /// Returns whether a policy was removed
    async fn delete_bucket_policy(&self, bucket: &str) -> Result<bool, AuthzError>;
}

/// In-memory policy store for tests and local development
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    buckets: RwLock<HashSet<String>>,
    policies: RwLock<HashMap<String, String>>,
    attachments: RwLock<HashMap<String, Vec<String>>>,
    bucket_policies: RwLock<HashMap<String, String>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.buckets.write().insert(bucket.to_string());
    }

    /// Attach a named policy to a principal. Attaching twice is a no-op.
    pub fn attach_policy(&self, principal: &str, policy_name: &str) {
        let mut attachments = self.attachments.write();
        let names = attachments.entry(principal.to_string()).or_default();
        if !names.iter().any(|n| n == policy_name) {
            names.push(policy_name.to_string());
        }
    }

    pub fn detach_policy(&self, principal: &str, policy_name: &str) {
        if let Some(names) = self.attachments.write().get_mut(principal) {
            names.retain(|n| n != policy_name);
        }
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn policies_for_principal(
        &self,
        principal: &str,
    ) -> Result<Vec<StoredPolicy>, AuthzError> {
        let attachments = self.attachments.read();
        let policies = self.policies.read();
        Ok(attachments
            .get(principal)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| policies.get(name).map(|doc| StoredPolicy::new(name, doc)))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, AuthzError> {
        Ok(self.buckets.read().contains(bucket))
    }

    async fn bucket_policy(&self, bucket: &str) -> Result<Option<String>, AuthzError> {
        Ok(self.bucket_policies.read().get(bucket).cloned())
    }

    async fn save_policy(&self, name: &str, document: String) -> Result<(), AuthzError> {
        self.policies.write().insert(name.to_string(), document);
        Ok(())
    }

    async fn save_bucket_policy(&self, bucket: &str, document: String) -> Result<(), AuthzError> {
        if !self.buckets.read().contains(bucket) {
            return Err(AuthzError::BucketNotFound(bucket.to_string()));
        }
        self.bucket_policies
            .write()
            .insert(bucket.to_string(), document);
        Ok(())
    }

    async fn delete_bucket_policy(&self, bucket: &str) -> Result<bool, AuthzError> {
        Ok(self.bucket_policies.write().remove(bucket).is_some())
    }
}
