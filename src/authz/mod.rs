//! Authorization module
//!
//! IAM-style policy documents attached to principals and buckets, evaluated
//! deny-by-default.

use async_trait::async_trait;
use thiserror::Error;

pub mod admin;
pub mod combiner;
pub mod evaluator;
pub mod policy;
pub mod store;
pub mod validator;

pub use admin::PolicyAdmin;
pub use combiner::{CombinationRule, PolicyAuthorizer};
pub use evaluator::{evaluate, evaluate_guarded, Decision, Evaluation, EvaluationContext};
pub use policy::{Effect, PolicyDocument, Statement, StoredPolicy};
pub use store::{InMemoryPolicyStore, PolicyStore};
pub use validator::{validate_policy_document, PolicyValidationError};

/// S3 action names
pub mod actions {
    pub const LIST_ALL_MY_BUCKETS: &str = "s3:ListAllMyBuckets";
    pub const GET_BUCKET_LOCATION: &str = "s3:GetBucketLocation";
    pub const CREATE_BUCKET: &str = "s3:CreateBucket";
    pub const DELETE_BUCKET: &str = "s3:DeleteBucket";
    pub const LIST_BUCKET: &str = "s3:ListBucket";
    pub const GET_OBJECT: &str = "s3:GetObject";
    pub const PUT_OBJECT: &str = "s3:PutObject";
    pub const DELETE_OBJECT: &str = "s3:DeleteObject";
    pub const HEAD_OBJECT: &str = "s3:HeadObject";
    pub const GET_BUCKET_POLICY: &str = "s3:GetBucketPolicy";
    pub const PUT_BUCKET_POLICY: &str = "s3:PutBucketPolicy";
}

/// Authorization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("Invalid policy document: {0}")]
    InvalidPolicy(#[from] PolicyValidationError),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Policy evaluation fault: {0}")]
    EvaluationFault(String),

    #[error("Backend error: {0}")]
    BackendError(String),
}

/// Authorization request for one bucket or object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub principal: String,
    pub is_admin: bool,
    pub bucket: String,
    /// Present for object-level actions
    pub object_key: Option<String>,
    pub action: String,
}

impl AccessRequest {
    /// Bucket-level request, e.g. `s3:ListBucket`
    pub fn bucket(principal: &str, bucket: &str, action: &str) -> Self {
        Self {
            principal: principal.to_string(),
            is_admin: false,
            bucket: bucket.to_string(),
            object_key: None,
            action: action.to_string(),
        }
    }

    /// Object-level request, e.g. `s3:GetObject`
    pub fn object(principal: &str, bucket: &str, key: &str, action: &str) -> Self {
        Self {
            object_key: Some(key.to_string()),
            ..Self::bucket(principal, bucket, action)
        }
    }

    #[must_use]
    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    /// `arn:aws:s3:::{bucket}` or `arn:aws:s3:::{bucket}/{key}`
    pub fn resource_arn(&self) -> String {
        match &self.object_key {
            Some(key) => format!("arn:aws:s3:::{}/{}", self.bucket, key),
            None => format!("arn:aws:s3:::{}", self.bucket),
        }
    }
}

/// Final decision plus any faults met while reaching it.
///
/// Faults never flip a decision to allow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub allowed: bool,
    pub faults: Vec<AuthzError>,
}

impl Authorization {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            faults: Vec::new(),
        }
    }

    pub fn deny() -> Self {
        Self {
            allowed: false,
            faults: Vec::new(),
        }
    }
}

/// Authorizer trait
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Decide whether the request is allowed. Never fails open.
    async fn authorize(&self, request: &AccessRequest) -> Authorization;
}
