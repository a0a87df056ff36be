//! IAM-style policy documents

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The only policy language version accepted
pub const POLICY_VERSION: &str = "2012-10-17";

/// Statement effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// One Effect + Action + Resource rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "Sid", default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    #[serde(rename = "Effect")]
    pub effect: Effect,

    #[serde(rename = "Action")]
    pub actions: Vec<String>,

    #[serde(rename = "Resource")]
    pub resources: Vec<String>,

    /// Carried through storage untouched. Conditions are not evaluated.
    #[serde(rename = "Condition", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Map<String, Value>>,
}

impl Statement {
    pub fn new(effect: Effect, actions: &[&str], resources: &[&str]) -> Self {
        Self {
            sid: None,
            effect,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources: resources.iter().map(|r| r.to_string()).collect(),
            condition: None,
        }
    }

    pub fn allow(actions: &[&str], resources: &[&str]) -> Self {
        Self::new(Effect::Allow, actions, resources)
    }

    pub fn deny(actions: &[&str], resources: &[&str]) -> Self {
        Self::new(Effect::Deny, actions, resources)
    }

    #[must_use]
    pub fn with_sid(mut self, sid: &str) -> Self {
        self.sid = Some(sid.to_string());
        self
    }
}

/// A validated policy document
///
/// Only [`crate::authz::validator::validate_policy_document`] produces these
/// from untrusted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version")]
    pub version: String,

    #[serde(rename = "Statement")]
    pub statements: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statements,
        }
    }

    /// Denies every action on every resource
    pub fn deny_all() -> Self {
        Self::new(vec![Statement::deny(&["*"], &["*"]).with_sid("DenyAll")])
    }

    /// Read access to every bucket and object
    pub fn read_only() -> Self {
        Self::new(vec![Statement::allow(
            &[
                "s3:GetObject",
                "s3:ListBucket",
                "objectstore:GetObject",
                "objectstore:ListBucket",
            ],
            &["*"],
        )
        .with_sid("ReadOnlyAccess")])
    }

    /// Serialize to the JSON wire form
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A named policy as persisted, in raw JSON form.
///
/// Stored text is re-parsed on every read since storage may have been
/// corrupted after the write-time validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPolicy {
    pub name: String,
    pub document: String,
}

impl StoredPolicy {
    pub fn new(name: &str, document: &str) -> Self {
        Self {
            name: name.to_string(),
            document: document.to_string(),
        }
    }
}
