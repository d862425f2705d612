use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use entity::tasks::{self, Status};
use platform_api::{ApiError, ApiResult};
use platform_db::{NewTask, Page, PageRequest, TaskChanges};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use super::{db_error, nullable, required_text};
use crate::{auth::Principal, http::AppState};

#[derive(Debug, Serialize)]
pub struct TaskView {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: Status,
    pub assignee_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl From<tasks::Model> for TaskView {
    fn from(model: tasks::Model) -> Self {
        Self {
            id: model.id,
            project_id: model.project_id,
            title: model.title,
            description: model.description,
            status: model.status,
            assignee_id: model.assignee_id,
            created_by: model.created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTask {
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub status: Option<Status>,
    #[serde(default, deserialize_with = "nullable")]
    pub assignee_id: Option<Option<Uuid>>,
}

/// Tasks can only be assigned to members of their project.
async fn ensure_assignee(
    state: &AppState,
    project_id: Uuid,
    assignee: Option<Uuid>,
) -> ApiResult<()> {
    let Some(assignee) = assignee else {
        return Ok(());
    };
    platform_db::find_member(&state.db, project_id, assignee)
        .await
        .map_err(db_error)?
        .map(|_| ())
        .ok_or_else(|| ApiError::invalid("assignee is not a project member"))
}

#[instrument(name = "http.tasks.index", skip_all, fields(%project_id))]
pub async fn index(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<TaskView>>> {
    let window = PageRequest::new(query.page, query.per_page);
    let page = platform_db::list_tasks(&state.db, project_id, window)
        .await
        .map_err(db_error)?;
    Ok(Json(page.map(TaskView::from)))
}

#[instrument(name = "http.tasks.create", skip_all, fields(%project_id, user = %principal.id))]
pub async fn create(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    principal: Principal,
    Json(body): Json<CreateTask>,
) -> ApiResult<(StatusCode, Json<TaskView>)> {
    let title = required_text("title", body.title)?;
    ensure_assignee(&state, project_id, body.assignee_id).await?;
    let task = platform_db::create_task(
        &state.db,
        project_id,
        principal.id,
        NewTask {
            title,
            description: body.description,
            assignee_id: body.assignee_id,
        },
    )
    .await
    .map_err(db_error)?;
    Ok((StatusCode::CREATED, Json(task.into())))
}

#[instrument(name = "http.tasks.show", skip_all, fields(%project_id, %task_id))]
pub async fn show(
    State(state): State<AppState>,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<TaskView>> {
    let task = platform_db::find_task(&state.db, project_id, task_id)
        .await
        .map_err(db_error)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(task.into()))
}

#[instrument(name = "http.tasks.update", skip_all, fields(%project_id, %task_id))]
pub async fn update(
    State(state): State<AppState>,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateTask>,
) -> ApiResult<Json<TaskView>> {
    ensure_assignee(&state, project_id, body.assignee_id.flatten()).await?;
    let changes = TaskChanges {
        title: body
            .title
            .map(|title| required_text("title", title))
            .transpose()?,
        description: body.description,
        status: body.status,
        assignee_id: body.assignee_id,
    };
    let task = platform_db::update_task(&state.db, project_id, task_id, changes)
        .await
        .map_err(db_error)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(task.into()))
}

#[instrument(name = "http.tasks.destroy", skip_all, fields(%project_id, %task_id))]
pub async fn destroy(
    State(state): State<AppState>,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    if platform_db::delete_task(&state.db, project_id, task_id)
        .await
        .map_err(db_error)?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}
