//! Policy document validation
//!
//! The single gate for untrusted policy text. Checks run in a fixed order and
//! stop at the first failure:
//!
//! 1. size (10 KiB)
//! 2. JSON shape
//! 3. version
//! 4. statement count (1..=20)
//! 5. per statement: effect, actions, resources, Sid
//!
//! Pure: no I/O, no logging.

use super::policy::{Effect, PolicyDocument, Statement, POLICY_VERSION};
use lazy_static::lazy_static;
use regex_lite::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Maximum serialized size of a policy document, in bytes
pub const MAX_POLICY_BYTES: usize = 10 * 1024;

/// Maximum statements per document
pub const MAX_STATEMENTS: usize = 20;

pub const MAX_SID_LEN: usize = 100;

lazy_static! {
    static ref SERVICE_RE: Regex = Regex::new(r"^[A-Za-z0-9]+$").unwrap();
    static ref ACTION_NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9*]+$").unwrap();
    static ref SID_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

/// Policy validation errors
///
/// Returned verbatim to the administrator who submitted the document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyValidationError {
    #[error("policy document too large: {size} bytes (max {max})")]
    PolicyTooLarge { size: usize, max: usize },

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("unsupported policy version: {0}")]
    UnsupportedVersion(String),

    #[error("policy must contain at least one statement")]
    NoStatements,

    #[error("policy cannot contain more than {max} statements (got {count})")]
    TooManyStatements { count: usize, max: usize },

    #[error("statement {index}: effect must be 'Allow' or 'Deny', got: {effect}")]
    InvalidEffect { index: usize, effect: String },

    #[error("statement {index}: statement must have at least one action")]
    MissingAction { index: usize },

    #[error("statement {index}: invalid action '{action}': {reason}")]
    InvalidActionSyntax {
        index: usize,
        action: String,
        reason: &'static str,
    },

    #[error("statement {index}: statement must have at least one resource")]
    MissingResource { index: usize },

    #[error("statement {index}: invalid resource '{resource}': {reason}")]
    InvalidResourceSyntax {
        index: usize,
        resource: String,
        reason: &'static str,
    },

    #[error("statement {index}: invalid Sid: {reason}")]
    InvalidSid { index: usize, reason: &'static str },
}

impl PolicyValidationError {
    /// Stable label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            PolicyValidationError::PolicyTooLarge { .. } => "policy_too_large",
            PolicyValidationError::InvalidJson(_) => "invalid_json",
            PolicyValidationError::UnsupportedVersion(_) => "unsupported_version",
            PolicyValidationError::NoStatements => "no_statements",
            PolicyValidationError::TooManyStatements { .. } => "too_many_statements",
            PolicyValidationError::InvalidEffect { .. } => "invalid_effect",
            PolicyValidationError::MissingAction { .. } => "missing_action",
            PolicyValidationError::InvalidActionSyntax { .. } => "invalid_action",
            PolicyValidationError::MissingResource { .. } => "missing_resource",
            PolicyValidationError::InvalidResourceSyntax { .. } => "invalid_resource",
            PolicyValidationError::InvalidSid { .. } => "invalid_sid",
        }
    }
}

// Lenient wire shape. Strictness lives in the checks below so every problem
// maps to a specific error instead of a generic parse failure.
#[derive(Deserialize)]
struct RawPolicy {
    #[serde(rename = "Version", default)]
    version: Option<String>,
    #[serde(rename = "Statement", default)]
    statement: Vec<RawStatement>,
}

#[derive(Deserialize)]
struct RawStatement {
    #[serde(rename = "Sid", default)]
    sid: Option<String>,
    #[serde(rename = "Effect", default)]
    effect: String,
    #[serde(rename = "Action", default)]
    action: Option<OneOrMany>,
    #[serde(rename = "Resource", default)]
    resource: Option<OneOrMany>,
    #[serde(rename = "Condition", default)]
    condition: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Validate raw policy text into a [`PolicyDocument`].
pub fn validate_policy_document(raw: &str) -> Result<PolicyDocument, PolicyValidationError> {
    if raw.len() > MAX_POLICY_BYTES {
        return Err(PolicyValidationError::PolicyTooLarge {
            size: raw.len(),
            max: MAX_POLICY_BYTES,
        });
    }

    let policy: RawPolicy = serde_json::from_str(raw)
        .map_err(|e| PolicyValidationError::InvalidJson(e.to_string()))?;

    let version = match policy.version {
        None => POLICY_VERSION.to_string(),
        Some(v) if v.is_empty() => POLICY_VERSION.to_string(),
        Some(v) if v == POLICY_VERSION => v,
        Some(v) => return Err(PolicyValidationError::UnsupportedVersion(v)),
    };

    if policy.statement.is_empty() {
        return Err(PolicyValidationError::NoStatements);
    }
    if policy.statement.len() > MAX_STATEMENTS {
        return Err(PolicyValidationError::TooManyStatements {
            count: policy.statement.len(),
            max: MAX_STATEMENTS,
        });
    }

    let statements = policy
        .statement
        .into_iter()
        .enumerate()
        .map(|(index, stmt)| validate_statement(index, stmt))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PolicyDocument {
        version,
        statements,
    })
}

fn validate_statement(
    index: usize,
    raw: RawStatement,
) -> Result<Statement, PolicyValidationError> {
    let effect = match raw.effect.as_str() {
        "Allow" => Effect::Allow,
        "Deny" => Effect::Deny,
        other => {
            return Err(PolicyValidationError::InvalidEffect {
                index,
                effect: other.to_string(),
            })
        }
    };

    let actions = raw.action.map(OneOrMany::into_vec).unwrap_or_default();
    if actions.is_empty() {
        return Err(PolicyValidationError::MissingAction { index });
    }
    for action in &actions {
        check_action(action).map_err(|reason| PolicyValidationError::InvalidActionSyntax {
            index,
            action: action.clone(),
            reason,
        })?;
    }

    let resources = raw.resource.map(OneOrMany::into_vec).unwrap_or_default();
    if resources.is_empty() {
        return Err(PolicyValidationError::MissingResource { index });
    }
    for resource in &resources {
        check_resource(resource).map_err(|reason| {
            PolicyValidationError::InvalidResourceSyntax {
                index,
                resource: resource.clone(),
                reason,
            }
        })?;
    }

    // An empty Sid is the same as none
    let sid = raw.sid.filter(|s| !s.is_empty());
    if let Some(sid) = &sid {
        check_sid(sid).map_err(|reason| PolicyValidationError::InvalidSid { index, reason })?;
    }

    Ok(Statement {
        sid,
        effect,
        actions,
        resources,
        condition: raw.condition,
    })
}

fn check_action(action: &str) -> Result<(), &'static str> {
    if action.is_empty() {
        return Err("action cannot be empty");
    }
    if action == "*" {
        return Ok(());
    }

    let Some((service, name)) = action.split_once(':') else {
        return Err("action must be in format 'service:action'");
    };
    if name.contains(':') {
        return Err("action must be in format 'service:action'");
    }
    if service != "*" && !SERVICE_RE.is_match(service) {
        return Err("invalid service name");
    }
    if !ACTION_NAME_RE.is_match(name) {
        return Err("invalid action name");
    }
    Ok(())
}

fn check_resource(resource: &str) -> Result<(), &'static str> {
    if resource.is_empty() {
        return Err("resource cannot be empty");
    }
    if resource == "*" {
        return Ok(());
    }
    if resource.contains("..") {
        return Err("resource cannot contain '..'");
    }
    // arn:partition:service:region:account:resource
    if resource.starts_with("arn:") && resource.split(':').count() < 6 {
        return Err("invalid ARN format");
    }
    Ok(())
}

fn check_sid(sid: &str) -> Result<(), &'static str> {
    if !SID_RE.is_match(sid) {
        return Err("Sid must contain only alphanumeric characters, hyphens, and underscores");
    }
    if sid.len() > MAX_SID_LEN {
        return Err("Sid too long (max 100 characters)");
    }
    Ok(())
}
