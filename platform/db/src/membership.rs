use async_trait::async_trait;
use chrono::Utc;
use entity::project_members;
use platform_authz::{
    DocumentError, LookupError, MembershipLookup, PermissionDocument, PrincipalId, ProjectId,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::{DbError, DbPool, DbResult};

/// Parse the stored document of a membership row.
pub fn member_permissions(
    member: &project_members::Model,
) -> Result<PermissionDocument, DocumentError> {
    PermissionDocument::try_from(member.permissions.clone())
}

pub async fn find_member<C: ConnectionTrait>(
    db: &C,
    project: Uuid,
    user: Uuid,
) -> DbResult<Option<project_members::Model>> {
    Ok(project_members::Entity::find_by_id((project, user))
        .one(db)
        .await?)
}

pub async fn list_members<C: ConnectionTrait>(
    db: &C,
    project: Uuid,
) -> DbResult<Vec<project_members::Model>> {
    Ok(project_members::Entity::find()
        .filter(project_members::Column::ProjectId.eq(project))
        .order_by_asc(project_members::Column::CreatedAt)
        .order_by_asc(project_members::Column::UserId)
        .all(db)
        .await?)
}

pub async fn add_member<C: ConnectionTrait>(
    db: &C,
    project: Uuid,
    user: Uuid,
    is_admin: bool,
    permissions: PermissionDocument,
) -> DbResult<project_members::Model> {
    if find_member(db, project, user).await?.is_some() {
        return Err(DbError::AlreadyMember);
    }
    let model = project_members::ActiveModel {
        project_id: Set(project),
        user_id: Set(user),
        is_admin: Set(is_admin),
        permissions: Set(Value::from(permissions)),
        created_at: Set(Utc::now().into()),
    };
    Ok(model.insert(db).await?)
}

#[derive(Clone, Debug, Default)]
pub struct MemberChanges {
    pub is_admin: Option<bool>,
    pub permissions: Option<PermissionDocument>,
}

pub async fn update_member<C: ConnectionTrait>(
    db: &C,
    project: Uuid,
    user: Uuid,
    changes: MemberChanges,
) -> DbResult<Option<project_members::Model>> {
    let Some(member) = find_member(db, project, user).await? else {
        return Ok(None);
    };
    if changes.is_admin.is_none() && changes.permissions.is_none() {
        return Ok(Some(member));
    }
    let mut active: project_members::ActiveModel = member.into();
    if let Some(is_admin) = changes.is_admin {
        active.is_admin = Set(is_admin);
    }
    if let Some(permissions) = changes.permissions {
        active.permissions = Set(Value::from(permissions));
    }
    Ok(Some(active.update(db).await?))
}

pub async fn remove_member<C: ConnectionTrait>(
    db: &C,
    project: Uuid,
    user: Uuid,
) -> DbResult<bool> {
    let result = project_members::Entity::delete_by_id((project, user))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// [`MembershipLookup`] backed by the `project_members` table.
#[derive(Clone, Debug)]
pub struct SeaOrmMembershipLookup {
    pool: DbPool,
}

impl SeaOrmMembershipLookup {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipLookup for SeaOrmMembershipLookup {
    #[instrument(name = "db.membership.is_admin", skip(self))]
    async fn is_admin(
        &self,
        project: ProjectId,
        principal: PrincipalId,
    ) -> Result<bool, LookupError> {
        let member = find_member(&self.pool, project, principal)
            .await
            .map_err(LookupError::backend)?;
        Ok(member.is_some_and(|m| m.is_admin))
    }

    #[instrument(name = "db.membership.permissions", skip(self))]
    async fn permission_document(
        &self,
        project: ProjectId,
        principal: PrincipalId,
    ) -> Result<Option<PermissionDocument>, LookupError> {
        let member = find_member(&self.pool, project, principal)
            .await
            .map_err(LookupError::backend)?;
        match member {
            Some(member) => Ok(Some(member_permissions(&member)?)),
            None => Ok(None),
        }
    }
}
