//! Policy evaluation
//!
//! Deny-by-default: a request is allowed only when some statement explicitly
//! allows it and no statement explicitly denies it.

use super::policy::{Effect, PolicyDocument};
use super::AuthzError;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::error;

/// Per-request evaluation input. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationContext {
    pub principal: String,
    pub is_admin: bool,
    /// e.g. `s3:GetObject`
    pub action: String,
    /// e.g. `arn:aws:s3:::bucket/key`
    pub resource: String,
}

impl EvaluationContext {
    pub fn new(principal: &str, action: &str, resource: &str) -> Self {
        Self {
            principal: principal.to_string(),
            is_admin: false,
            action: action.to_string(),
            resource: resource.to_string(),
        }
    }

    #[must_use]
    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }
}

/// Outcome of evaluating one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// A matching Allow and no matching Deny
    Allow,
    /// A matching Deny statement
    ExplicitDeny,
    /// Nothing matched
    NoMatch,
}

impl Decision {
    /// Only an explicit allow grants access
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Decision plus the fault that forced it, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    pub fault: Option<AuthzError>,
}

/// Evaluate one validated document.
pub fn evaluate(document: &PolicyDocument, ctx: &EvaluationContext) -> Decision {
    if ctx.is_admin {
        return Decision::Allow;
    }

    let mut has_allow = false;
    for statement in &document.statements {
        if !matches_action(&statement.actions, &ctx.action)
            || !matches_resource(&statement.resources, &ctx.resource)
        {
            continue;
        }
        match statement.effect {
            // nothing can reverse a deny
            Effect::Deny => return Decision::ExplicitDeny,
            Effect::Allow => has_allow = true,
        }
    }

    if has_allow {
        Decision::Allow
    } else {
        Decision::NoMatch
    }
}

/// Evaluate behind a fault boundary.
///
/// A panic inside evaluation becomes [`Decision::ExplicitDeny`] with an
/// [`AuthzError::EvaluationFault`] instead of unwinding into the caller.
pub fn evaluate_guarded(document: &PolicyDocument, ctx: &EvaluationContext) -> Evaluation {
    guard(ctx, || evaluate(document, ctx))
}

pub(crate) fn guard<F>(ctx: &EvaluationContext, f: F) -> Evaluation
where
    F: FnOnce() -> Decision,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(decision) => Evaluation {
            decision,
            fault: None,
        },
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(
                principal = %ctx.principal,
                action = %ctx.action,
                resource = %ctx.resource,
                error = %message,
                "Policy evaluation fault, denying"
            );
            Evaluation {
                decision: Decision::ExplicitDeny,
                fault: Some(AuthzError::EvaluationFault(message)),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// `*`, exact match, or `service:*` matching any action of that service
pub(crate) fn matches_action(patterns: &[String], action: &str) -> bool {
    patterns.iter().any(|pattern| {
        if pattern == "*" || pattern == action {
            return true;
        }
        match pattern.strip_suffix(":*") {
            Some(service) => action
                .strip_prefix(service)
                .is_some_and(|rest| rest.starts_with(':')),
            None => false,
        }
    })
}

/// `*`, exact match, or `prefix/*` matching anything under `prefix/`
pub(crate) fn matches_resource(patterns: &[String], resource: &str) -> bool {
    patterns.iter().any(|pattern| {
        if pattern == "*" || pattern == resource {
            return true;
        }
        match pattern.strip_suffix("/*") {
            Some(prefix) => resource
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/')),
            None => false,
        }
    })
}
