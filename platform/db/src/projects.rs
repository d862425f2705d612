use chrono::Utc;
use entity::{project_members, projects, tasks};
use platform_authz::PermissionDocument;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use tracing::info;
use uuid::Uuid;

use crate::{DbPool, DbResult, membership::add_member};

#[derive(Clone, Debug)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ProjectChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Create a project and make its creator an admin member.
pub async fn create_project(
    pool: &DbPool,
    creator: Uuid,
    input: NewProject,
) -> DbResult<projects::Model> {
    let now = Utc::now();
    let txn = pool.begin().await?;
    let project = projects::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(input.name),
        description: Set(input.description),
        created_by: Set(creator),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;
    add_member(
        &txn,
        project.id,
        creator,
        true,
        PermissionDocument::member_template(),
    )
    .await?;
    txn.commit().await?;
    info!(project_id = %project.id, %creator, "project created");
    Ok(project)
}

pub async fn find_project<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> DbResult<Option<projects::Model>> {
    Ok(projects::Entity::find_by_id(id).one(db).await?)
}

/// Projects the user belongs to, newest first.
pub async fn projects_for_user<C: ConnectionTrait>(
    db: &C,
    user: Uuid,
) -> DbResult<Vec<projects::Model>> {
    Ok(projects::Entity::find()
        .inner_join(project_members::Entity)
        .filter(project_members::Column::UserId.eq(user))
        .order_by_desc(projects::Column::CreatedAt)
        .all(db)
        .await?)
}

pub async fn update_project<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    changes: ProjectChanges,
) -> DbResult<Option<projects::Model>> {
    let Some(project) = find_project(db, id).await? else {
        return Ok(None);
    };
    if changes.name.is_none() && changes.description.is_none() {
        return Ok(Some(project));
    }
    let mut active: projects::ActiveModel = project.into();
    if let Some(name) = changes.name {
        active.name = Set(name);
    }
    if let Some(description) = changes.description {
        active.description = Set(Some(description));
    }
    active.updated_at = Set(Utc::now().into());
    Ok(Some(active.update(db).await?))
}

/// Delete a project with its tasks and memberships.
pub async fn delete_project(pool: &DbPool, id: Uuid) -> DbResult<bool> {
    let txn = pool.begin().await?;
    tasks::Entity::delete_many()
        .filter(tasks::Column::ProjectId.eq(id))
        .exec(&txn)
        .await?;
    project_members::Entity::delete_many()
        .filter(project_members::Column::ProjectId.eq(id))
        .exec(&txn)
        .await?;
    let deleted = projects::Entity::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;
    if deleted.rows_affected > 0 {
        info!(project_id = %id, "project deleted");
    }
    Ok(deleted.rows_affected > 0)
}
