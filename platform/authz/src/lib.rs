//! Authorization primitives for project-scoped resources.
//!
//! A request names a principal, a project, a dotted permission key such as
//! `project.member.id` and the HTTP verb being attempted. Project admins are
//! always allowed; everyone else is checked against the permission document
//! stored on their membership. Every failure, including lookup errors,
//! resolves to [`AuthorizationDecision::Deny`].

mod document;
mod error;
pub mod memory;
mod resolver;
mod verb;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use document::{PermissionDocument, PermissionNode};
pub use error::{DenyReason, DocumentError, LookupError};
pub use resolver::{AuthorizationResolver, MembershipLookup};
pub use verb::{UnknownVerb, Verb};

pub type PrincipalId = Uuid;
pub type ProjectId = Uuid;

/// A single authorization question, built per incoming operation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuthorizationRequest {
    pub principal: Option<PrincipalId>,
    pub project: Option<ProjectId>,
    pub key: String,
    pub verb: Verb,
}

impl AuthorizationRequest {
    pub fn new(
        principal: Option<PrincipalId>,
        project: Option<ProjectId>,
        key: impl Into<String>,
        verb: Verb,
    ) -> Self {
        Self {
            principal,
            project,
            key: key.into(),
            verb,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationDecision {
    Allow,
    Deny,
}

impl AuthorizationDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, AuthorizationDecision::Allow)
    }
}
