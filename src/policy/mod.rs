//! IAM policy documents for the bootstrap trust chain
//!
//! Two document shapes are needed: the permission policy attached to the
//! temporary role, and the trust policy stating who may assume that role.
//! Both share one [`PolicyDocument`] type; a statement targets either a
//! resource or a principal.

use serde::{Deserialize, Serialize};

/// Fixed IAM policy language version
pub const POLICY_VERSION: &str = "2012-10-17";

/// Action granted by the trust statement
pub const ASSUME_ROLE_ACTION: &str = "sts:AssumeRole";

/// Actions the bootstrap role may perform
pub const BOOTSTRAP_ACTIONS: [&str; 5] = [
    "s3:CreateBucket",
    "s3:GetObject",
    "s3:GetObjectAcl",
    "s3:ListBucket",
    "ecr:*",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Who a trust statement applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(rename = "AWS")]
    pub aws: String,
}

/// What a statement applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementTarget {
    Resource(String),
    Principal(Principal),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub effect: Effect,
    pub action: Vec<String>,
    #[serde(flatten)]
    pub target: StatementTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    fn single(statement: Statement) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement: vec![statement],
        }
    }

    /// Permission policy granting [`BOOTSTRAP_ACTIONS`] over `resource`
    pub fn permission(resource: &str) -> Self {
        Self::single(Statement {
            effect: Effect::Allow,
            action: BOOTSTRAP_ACTIONS.iter().map(|a| a.to_string()).collect(),
            target: StatementTarget::Resource(resource.to_string()),
        })
    }

    /// Trust policy allowing `principal_arn` to assume the role
    pub fn trust(principal_arn: &str) -> Self {
        Self::single(Statement {
            effect: Effect::Allow,
            action: vec![ASSUME_ROLE_ACTION.to_string()],
            target: StatementTarget::Principal(Principal {
                aws: principal_arn.to_string(),
            }),
        })
    }

    /// Principal ARNs named by the document's trust statements
    pub fn principals(&self) -> impl Iterator<Item = &str> {
        self.statement.iter().filter_map(|s| match &s.target {
            StatementTarget::Principal(p) => Some(p.aws.as_str()),
            StatementTarget::Resource(_) => None,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Rendered documents for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustDocuments {
    pub permission: String,
    pub trust: String,
}

impl TrustDocuments {
    pub fn build(resource: &str, principal_arn: &str) -> serde_json::Result<Self> {
        Ok(Self {
            permission: PolicyDocument::permission(resource).to_json()?,
            trust: PolicyDocument::trust(principal_arn).to_json()?,
        })
    }
}
