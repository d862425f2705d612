//! In-memory [`MembershipLookup`] for local development and tests.
//!
//! Memberships live in a `HashMap` behind a `tokio::sync::RwLock`; nothing is
//! persisted.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{LookupError, MembershipLookup, PermissionDocument, PrincipalId, ProjectId};

#[derive(Clone, Debug)]
pub struct Membership {
    pub is_admin: bool,
    pub permissions: PermissionDocument,
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryMembership {
    members: Arc<RwLock<HashMap<(ProjectId, PrincipalId), Membership>>>,
}

impl InMemoryMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant(
        &self,
        project: ProjectId,
        principal: PrincipalId,
        permissions: PermissionDocument,
    ) {
        self.members.write().await.insert(
            (project, principal),
            Membership {
                is_admin: false,
                permissions,
            },
        );
    }

    pub async fn grant_admin(&self, project: ProjectId, principal: PrincipalId) {
        self.members.write().await.insert(
            (project, principal),
            Membership {
                is_admin: true,
                permissions: PermissionDocument::default(),
            },
        );
    }

    pub async fn revoke(&self, project: ProjectId, principal: PrincipalId) -> bool {
        self.members
            .write()
            .await
            .remove(&(project, principal))
            .is_some()
    }
}

#[async_trait]
impl MembershipLookup for InMemoryMembership {
    async fn is_admin(
        &self,
        project: ProjectId,
        principal: PrincipalId,
    ) -> Result<bool, LookupError> {
        Ok(self
            .members
            .read()
            .await
            .get(&(project, principal))
            .is_some_and(|member| member.is_admin))
    }

    async fn permission_document(
        &self,
        project: ProjectId,
        principal: PrincipalId,
    ) -> Result<Option<PermissionDocument>, LookupError> {
        Ok(self
            .members
            .read()
            .await
            .get(&(project, principal))
            .map(|member| member.permissions.clone()))
    }
}
