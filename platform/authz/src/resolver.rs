use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::{
    AuthorizationDecision, AuthorizationRequest, DenyReason, LookupError, PermissionDocument,
    PrincipalId, ProjectId,
};

/// Read-only view of project memberships.
#[async_trait]
pub trait MembershipLookup: Send + Sync {
    async fn is_admin(&self, project: ProjectId, principal: PrincipalId)
    -> Result<bool, LookupError>;

    /// `Ok(None)` when the principal has no membership in the project.
    async fn permission_document(
        &self,
        project: ProjectId,
        principal: PrincipalId,
    ) -> Result<Option<PermissionDocument>, LookupError>;
}

/// Decides ALLOW or DENY for project-scoped requests.
///
/// Holds no state besides the lookup handle, so one instance can serve any
/// number of concurrent requests.
#[derive(Clone)]
pub struct AuthorizationResolver {
    lookup: Arc<dyn MembershipLookup>,
}

impl AuthorizationResolver {
    pub fn new(lookup: Arc<dyn MembershipLookup>) -> Self {
        Self { lookup }
    }

    #[instrument(
        name = "authz.resolve",
        skip_all,
        fields(key = %request.key, verb = %request.verb)
    )]
    pub async fn resolve(&self, request: &AuthorizationRequest) -> AuthorizationDecision {
        match self.evaluate(request).await {
            Ok(()) => {
                debug!(project = ?request.project, principal = ?request.principal, "allow");
                AuthorizationDecision::Allow
            }
            Err(DenyReason::CollaboratorFailure(err)) => {
                warn!(
                    project = ?request.project,
                    principal = ?request.principal,
                    error = %err,
                    "deny: membership lookup failed"
                );
                AuthorizationDecision::Deny
            }
            Err(reason) => {
                debug!(
                    project = ?request.project,
                    principal = ?request.principal,
                    %reason,
                    "deny"
                );
                AuthorizationDecision::Deny
            }
        }
    }

    async fn evaluate(&self, request: &AuthorizationRequest) -> Result<(), DenyReason> {
        let (Some(project), Some(principal)) = (request.project, request.principal) else {
            return Err(DenyReason::MissingContext);
        };

        // Admins skip the document entirely, whatever the key looks like.
        if self.lookup.is_admin(project, principal).await? {
            return Ok(());
        }

        let document = self
            .lookup
            .permission_document(project, principal)
            .await?
            .ok_or(DenyReason::NoMembership)?;
        document.check(&request.key, request.verb)
    }
}
