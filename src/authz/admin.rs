//! Policy administration
//!
//! The write path for policies. Every document is validated before it is
//! persisted and the validation error goes back to the caller unchanged.

use super::policy::PolicyDocument;
use super::store::PolicyStore;
use super::validator::validate_policy_document;
use super::AuthzError;
use crate::metrics::Recorder;
use std::sync::Arc;
use tracing::{info, warn};

pub struct PolicyAdmin {
    store: Arc<dyn PolicyStore>,
    metrics: Recorder,
}

impl PolicyAdmin {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self {
            store,
            metrics: Recorder::default(),
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Recorder) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Recorder {
        self.metrics
    }

    /// Create or replace a named user policy
    pub async fn put_policy(&self, name: &str, raw: &str) -> Result<PolicyDocument, AuthzError> {
        let document = self.validate(raw)?;
        self.store.save_policy(name, raw.to_string()).await?;
        info!(policy = %name, statements = document.statements.len(), "Saved policy");
        Ok(document)
    }

    /// Create or replace the policy of an existing bucket
    pub async fn put_bucket_policy(
        &self,
        bucket: &str,
        raw: &str,
    ) -> Result<PolicyDocument, AuthzError> {
        let document = self.validate(raw)?;
        self.require_bucket(bucket).await?;
        self.store.save_bucket_policy(bucket, raw.to_string()).await?;
        info!(bucket = %bucket, statements = document.statements.len(), "Saved bucket policy");
        Ok(document)
    }

    /// The stored policy text of an existing bucket
    pub async fn get_bucket_policy(&self, bucket: &str) -> Result<Option<String>, AuthzError> {
        self.require_bucket(bucket).await?;
        self.store.bucket_policy(bucket).await
    }

    pub async fn delete_bucket_policy(&self, bucket: &str) -> Result<(), AuthzError> {
        self.require_bucket(bucket).await?;
        if self.store.delete_bucket_policy(bucket).await? {
            info!(bucket = %bucket, "Deleted bucket policy");
        }
        Ok(())
    }

    fn validate(&self, raw: &str) -> Result<PolicyDocument, AuthzError> {
        validate_policy_document(raw).map_err(|e| {
            warn!(reason = e.reason(), error = %e, "Rejected policy document");
            self.metrics.policy_validation_failure(e.reason());
            AuthzError::InvalidPolicy(e)
        })
    }

    async fn require_bucket(&self, bucket: &str) -> Result<(), AuthzError> {
        if self.store.bucket_exists(bucket).await? {
            Ok(())
        } else {
            Err(AuthzError::BucketNotFound(bucket.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::store::InMemoryPolicyStore;
    use crate::authz::validator::PolicyValidationError;

    const READ_PHOTOS: &str = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Action":["s3:GetObject"],"Resource":["arn:aws:s3:::photos/*"]}]}"#;

    #[tokio::test]
    async fn test_put_policy_validates_before_persisting() {
        let store = Arc::new(InMemoryPolicyStore::new());
        let admin = PolicyAdmin::new(store.clone());

        let err = admin
            .put_policy("broken", r#"{"Statement":[{"Effect":"Maybe","Action":"*","Resource":"*"}]}"#)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthzError::InvalidPolicy(PolicyValidationError::InvalidEffect { index: 0, .. })
        ));

        store.attach_policy("alice", "broken");
        assert!(store.policies_for_principal("alice").await.unwrap().is_empty());

        let doc = admin.put_policy("read-photos", READ_PHOTOS).await.unwrap();
        assert_eq!(doc.statements.len(), 1);
    }

    #[tokio::test]
    async fn test_bucket_policy_lifecycle() {
        let store = Arc::new(InMemoryPolicyStore::new());
        store.create_bucket("photos");
        let admin = PolicyAdmin::new(store);

        assert_eq!(admin.get_bucket_policy("photos").await.unwrap(), None);

        admin.put_bucket_policy("photos", READ_PHOTOS).await.unwrap();
        assert_eq!(
            admin.get_bucket_policy("photos").await.unwrap().as_deref(),
            Some(READ_PHOTOS)
        );

        admin.delete_bucket_policy("photos").await.unwrap();
        assert_eq!(admin.get_bucket_policy("photos").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_bucket() {
        let admin = PolicyAdmin::new(Arc::new(InMemoryPolicyStore::new()));
        assert!(matches!(
            admin.put_bucket_policy("ghost", READ_PHOTOS).await,
            Err(AuthzError::BucketNotFound(_))
        ));
        assert!(matches!(
            admin.delete_bucket_policy("ghost").await,
            Err(AuthzError::BucketNotFound(_))
        ));
    }
}
