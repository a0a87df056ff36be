//! Authorization combiner
//!
//! Produces the final decision for one request from every policy that applies
//! to it: the principal's attached policies and the target bucket's policy.
//! Store failures deny. Unreadable user policies are skipped. An unreadable
//! bucket policy falls back to the user decision and raises an alert.

use super::evaluator::{evaluate_guarded, Decision, EvaluationContext};
use super::policy::PolicyDocument;
use super::store::PolicyStore;
use super::validator::validate_policy_document;
use super::{AccessRequest, Authorization, Authorizer, AuthzError};
use crate::metrics::Recorder;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// How the user decision and the bucket decision are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationRule {
    /// An explicit deny from either source denies. Otherwise an allow from
    /// either source allows.
    #[default]
    StrictDeny,
    /// Allow when either source allows. A deny in one source can be
    /// overridden by an allow in the other.
    UnionOfAllows,
}

impl CombinationRule {
    pub fn combine(self, user: Decision, bucket: Decision) -> bool {
        match self {
            CombinationRule::StrictDeny => {
                if user == Decision::ExplicitDeny || bucket == Decision::ExplicitDeny {
                    return false;
                }
                user.is_allowed() || bucket.is_allowed()
            }
            CombinationRule::UnionOfAllows => user.is_allowed() || bucket.is_allowed(),
        }
    }
}

/// Policy-based authorizer backed by a [`PolicyStore`]
pub struct PolicyAuthorizer {
    store: Arc<dyn PolicyStore>,
    rule: CombinationRule,
    metrics: Recorder,
}

impl PolicyAuthorizer {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self {
            store,
            rule: CombinationRule::default(),
            metrics: Recorder::default(),
        }
    }

    #[must_use]
    pub fn with_rule(mut self, rule: CombinationRule) -> Self {
        self.rule = rule;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Recorder) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn rule(&self) -> CombinationRule {
        self.rule
    }

    pub fn metrics(&self) -> Recorder {
        self.metrics
    }

    async fn decide(&self, request: &AccessRequest) -> Authorization {
        if request.is_admin {
            return Authorization::allow();
        }

        match self.store.bucket_exists(&request.bucket).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(bucket = %request.bucket, "Bucket does not exist");
                return Authorization::deny();
            }
            Err(e) => return self.store_failure(e),
        }

        let ctx = EvaluationContext::new(
            &request.principal,
            &request.action,
            &request.resource_arn(),
        );
        let mut faults = Vec::new();

        let user = match self.user_decision(&ctx, &mut faults).await {
            Ok(decision) => decision,
            Err(e) => return self.store_failure(e),
        };

        let bucket_policy = match self.store.bucket_policy(&request.bucket).await {
            Ok(policy) => policy,
            Err(e) => return self.store_failure(e),
        };

        let allowed = match bucket_policy {
            None => user.is_allowed(),
            Some(raw) => match validate_policy_document(&raw) {
                Ok(document) => {
                    let decision = self.evaluate(&document, &ctx, &mut faults);
                    self.rule.combine(user, decision)
                }
                Err(e) => {
                    error!(
                        alert = true,
                        bucket = %request.bucket,
                        error = %e,
                        "Stored bucket policy is malformed, falling back to user policies"
                    );
                    self.metrics.policy_fault("bucket");
                    faults.push(AuthzError::EvaluationFault(format!(
                        "bucket policy for '{}': {}",
                        request.bucket, e
                    )));
                    user.is_allowed()
                }
            },
        };

        Authorization { allowed, faults }
    }

    /// Deny if any attached policy explicitly denies, allow if any allows.
    ///
    /// A policy with no matching statement is neutral: it neither grants nor
    /// blocks what another attached policy grants.
    async fn user_decision(
        &self,
        ctx: &EvaluationContext,
        faults: &mut Vec<AuthzError>,
    ) -> Result<Decision, AuthzError> {
        let policies = self.store.policies_for_principal(&ctx.principal).await?;

        let mut has_allow = false;
        for policy in &policies {
            let document = match validate_policy_document(&policy.document) {
                Ok(document) => document,
                Err(e) => {
                    error!(
                        principal = %ctx.principal,
                        policy = %policy.name,
                        error = %e,
                        "Skipping malformed stored policy"
                    );
                    self.metrics.policy_fault("user");
                    faults.push(AuthzError::EvaluationFault(format!(
                        "policy '{}': {}",
                        policy.name, e
                    )));
                    continue;
                }
            };

            match self.evaluate(&document, ctx, faults) {
                Decision::ExplicitDeny => return Ok(Decision::ExplicitDeny),
                Decision::Allow => has_allow = true,
                Decision::NoMatch => {}
            }
        }

        Ok(if has_allow {
            Decision::Allow
        } else {
            Decision::NoMatch
        })
    }

    fn evaluate(
        &self,
        document: &PolicyDocument,
        ctx: &EvaluationContext,
        faults: &mut Vec<AuthzError>,
    ) -> Decision {
        let evaluation = evaluate_guarded(document, ctx);
        if let Some(fault) = evaluation.fault {
            self.metrics.policy_fault("evaluation");
            faults.push(fault);
        }
        evaluation.decision
    }

    fn store_failure(&self, e: AuthzError) -> Authorization {
        error!(error = %e, "Policy store unavailable, denying");
        self.metrics.policy_fault("store");
        Authorization {
            allowed: false,
            faults: vec![e],
        }
    }
}

#[async_trait]
impl Authorizer for PolicyAuthorizer {
    #[tracing::instrument(
        name = "authz.policy",
        skip(self, request),
        fields(
            principal = %request.principal,
            bucket = %request.bucket,
            action = %request.action
        )
    )]
    async fn authorize(&self, request: &AccessRequest) -> Authorization {
        let start = Instant::now();
        let authorization = self.decide(request).await;
        self.metrics
            .authz_decision(authorization.allowed, start.elapsed().as_secs_f64());

        debug!(
            allowed = authorization.allowed,
            faults = authorization.faults.len(),
            "Authorization decision"
        );
        authorization
    }
}
