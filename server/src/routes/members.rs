use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use entity::project_members;
use platform_api::{ApiError, ApiResult};
use platform_authz::PermissionDocument;
use platform_db::MemberChanges;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use super::db_error;
use crate::{auth::Principal, http::AppState};

#[derive(Debug, Serialize)]
pub struct MemberView {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub is_admin: bool,
    pub permissions: Value,
    pub created_at: DateTimeWithTimeZone,
}

impl From<project_members::Model> for MemberView {
    fn from(model: project_members::Model) -> Self {
        Self {
            project_id: model.project_id,
            user_id: model.user_id,
            is_admin: model.is_admin,
            permissions: model.permissions,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddMember {
    pub user_id: Uuid,
    #[serde(default)]
    pub is_admin: bool,
    pub permissions: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMember {
    pub is_admin: Option<bool>,
    pub permissions: Option<Value>,
}

/// Documents coming from clients are validated before they are stored.
fn parse_document(value: Value) -> ApiResult<PermissionDocument> {
    PermissionDocument::try_from(value).map_err(|err| ApiError::invalid(err.to_string()))
}

/// Admin status bypasses every document, so only admins may hand it out or
/// take it away.
async fn ensure_admin(
    state: &AppState,
    project_id: Uuid,
    principal: Principal,
) -> ApiResult<()> {
    let caller = platform_db::find_member(&state.db, project_id, principal.id)
        .await
        .map_err(db_error)?;
    if caller.is_some_and(|member| member.is_admin) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

#[instrument(name = "http.members.index", skip_all, fields(%project_id))]
pub async fn index(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<MemberView>>> {
    let rows = platform_db::list_members(&state.db, project_id)
        .await
        .map_err(db_error)?;
    Ok(Json(rows.into_iter().map(MemberView::from).collect()))
}

#[instrument(name = "http.members.create", skip_all, fields(%project_id, user = %principal.id))]
pub async fn create(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    principal: Principal,
    Json(body): Json<AddMember>,
) -> ApiResult<(StatusCode, Json<MemberView>)> {
    if body.is_admin {
        ensure_admin(&state, project_id, principal).await?;
    }
    let permissions = match body.permissions {
        Some(value) => parse_document(value)?,
        None => PermissionDocument::member_template(),
    };
    platform_db::find_user(&state.db, body.user_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::invalid("unknown user"))?;
    let member = platform_db::add_member(
        &state.db,
        project_id,
        body.user_id,
        body.is_admin,
        permissions,
    )
    .await
    .map_err(db_error)?;
    info!(%project_id, user_id = %body.user_id, admin = body.is_admin, "member added");
    Ok((StatusCode::CREATED, Json(member.into())))
}

#[instrument(name = "http.members.show", skip_all, fields(%project_id, %user_id))]
pub async fn show(
    State(state): State<AppState>,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<MemberView>> {
    let member = platform_db::find_member(&state.db, project_id, user_id)
        .await
        .map_err(db_error)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(member.into()))
}

#[instrument(
    name = "http.members.update",
    skip_all,
    fields(%project_id, %user_id, caller = %principal.id)
)]
pub async fn update(
    State(state): State<AppState>,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
    principal: Principal,
    Json(body): Json<UpdateMember>,
) -> ApiResult<Json<MemberView>> {
    if body.is_admin.is_some() {
        ensure_admin(&state, project_id, principal).await?;
    }
    let changes = MemberChanges {
        is_admin: body.is_admin,
        permissions: body.permissions.map(parse_document).transpose()?,
    };
    let member = platform_db::update_member(&state.db, project_id, user_id, changes)
        .await
        .map_err(db_error)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(member.into()))
}

#[instrument(name = "http.members.destroy", skip_all, fields(%project_id, %user_id))]
pub async fn destroy(
    State(state): State<AppState>,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    if platform_db::remove_member(&state.db, project_id, user_id)
        .await
        .map_err(db_error)?
    {
        info!(%project_id, %user_id, "member removed");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}
