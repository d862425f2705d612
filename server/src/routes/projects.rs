use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use entity::projects;
use platform_api::{ApiError, ApiResult};
use platform_db::{NewProject, ProjectChanges};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use super::{db_error, required_text};
use crate::{auth::Principal, http::AppState};

#[derive(Debug, Serialize)]
pub struct ProjectView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl From<projects::Model> for ProjectView {
    fn from(model: projects::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            created_by: model.created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[instrument(name = "http.projects.index", skip_all, fields(user = %principal.id))]
pub async fn index(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Json<Vec<ProjectView>>> {
    let rows = platform_db::projects_for_user(&state.db, principal.id)
        .await
        .map_err(db_error)?;
    Ok(Json(rows.into_iter().map(ProjectView::from).collect()))
}

#[instrument(name = "http.projects.create", skip_all, fields(user = %principal.id))]
pub async fn create(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<CreateProject>,
) -> ApiResult<(StatusCode, Json<ProjectView>)> {
    let name = required_text("name", body.name)?;
    // The token may outlive its user.
    platform_db::find_user(&state.db, principal.id)
        .await
        .map_err(db_error)?
        .ok_or(ApiError::Unauthorized)?;
    let project = platform_db::create_project(
        &state.db,
        principal.id,
        NewProject {
            name,
            description: body.description,
        },
    )
    .await
    .map_err(db_error)?;
    Ok((StatusCode::CREATED, Json(project.into())))
}

#[instrument(name = "http.projects.show", skip_all, fields(%project_id))]
pub async fn show(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<ProjectView>> {
    let project = platform_db::find_project(&state.db, project_id)
        .await
        .map_err(db_error)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(project.into()))
}

#[instrument(name = "http.projects.update", skip_all, fields(%project_id))]
pub async fn update(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(body): Json<UpdateProject>,
) -> ApiResult<Json<ProjectView>> {
    let changes = ProjectChanges {
        name: body.name.map(|name| required_text("name", name)).transpose()?,
        description: body.description,
    };
    let project = platform_db::update_project(&state.db, project_id, changes)
        .await
        .map_err(db_error)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(project.into()))
}

#[instrument(name = "http.projects.destroy", skip_all, fields(%project_id))]
pub async fn destroy(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if platform_db::delete_project(&state.db, project_id)
        .await
        .map_err(db_error)?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}
