use chrono::Utc;
use entity::tasks;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use uuid::Uuid;

use crate::DbResult;

const DEFAULT_PER_PAGE: u64 = 25;
const MAX_PER_PAGE: u64 = 100;
/// Keeps `page * per_page` within a signed 64-bit SQL offset.
const MAX_PAGE: u64 = i64::MAX as u64 / MAX_PER_PAGE;

/// 1-based page window, clamped to sane bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub per_page: u64,
}

impl PageRequest {
    pub fn new(page: Option<u64>, per_page: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).clamp(1, MAX_PAGE),
            per_page: per_page
                .unwrap_or(DEFAULT_PER_PAGE)
                .clamp(1, MAX_PER_PAGE),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<Uuid>,
}

#[derive(Clone, Debug, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub status: Option<tasks::Status>,
    /// `Some(None)` unassigns the task.
    pub assignee_id: Option<Option<Uuid>>,
}

impl TaskChanges {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.assignee_id.is_none()
    }
}

pub async fn list_tasks<C: ConnectionTrait>(
    db: &C,
    project: Uuid,
    window: PageRequest,
) -> DbResult<Page<tasks::Model>> {
    let paginator = tasks::Entity::find()
        .filter(tasks::Column::ProjectId.eq(project))
        .order_by_asc(tasks::Column::CreatedAt)
        .order_by_asc(tasks::Column::Id)
        .paginate(db, window.per_page);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(window.page - 1).await?;
    Ok(Page {
        items,
        page: window.page,
        per_page: window.per_page,
        total,
    })
}

pub async fn create_task<C: ConnectionTrait>(
    db: &C,
    project: Uuid,
    creator: Uuid,
    input: NewTask,
) -> DbResult<tasks::Model> {
    let now = Utc::now();
    let model = tasks::ActiveModel {
        id: Set(Uuid::new_v4()),
        project_id: Set(project),
        title: Set(input.title),
        description: Set(input.description),
        status: Set(tasks::Status::Open),
        assignee_id: Set(input.assignee_id),
        created_by: Set(creator),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    Ok(model.insert(db).await?)
}

/// Look a task up within its project; tasks of other projects are not found.
pub async fn find_task<C: ConnectionTrait>(
    db: &C,
    project: Uuid,
    id: Uuid,
) -> DbResult<Option<tasks::Model>> {
    Ok(tasks::Entity::find_by_id(id)
        .filter(tasks::Column::ProjectId.eq(project))
        .one(db)
        .await?)
}

pub async fn update_task<C: ConnectionTrait>(
    db: &C,
    project: Uuid,
    id: Uuid,
    changes: TaskChanges,
) -> DbResult<Option<tasks::Model>> {
    let Some(task) = find_task(db, project, id).await? else {
        return Ok(None);
    };
    if changes.is_empty() {
        return Ok(Some(task));
    }
    let mut active: tasks::ActiveModel = task.into();
    if let Some(title) = changes.title {
        active.title = Set(title);
    }
    if let Some(description) = changes.description {
        active.description = Set(description);
    }
    if let Some(status) = changes.status {
        active.status = Set(status);
    }
    if let Some(assignee) = changes.assignee_id {
        active.assignee_id = Set(assignee);
    }
    active.updated_at = Set(Utc::now().into());
    Ok(Some(active.update(db).await?))
}

pub async fn delete_task<C: ConnectionTrait>(db: &C, project: Uuid, id: Uuid) -> DbResult<bool> {
    let result = tasks::Entity::delete_many()
        .filter(tasks::Column::Id.eq(id))
        .filter(tasks::Column::ProjectId.eq(project))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_pool;
    use crate::{NewProject, create_project, upsert_user};

    #[test]
    fn page_request_is_clamped() {
        assert_eq!(
            PageRequest::new(None, None),
            PageRequest {
                page: 1,
                per_page: 25
            }
        );
        assert_eq!(
            PageRequest::new(Some(0), Some(1_000)),
            PageRequest {
                page: 1,
                per_page: 100
            }
        );
        assert_eq!(PageRequest::new(Some(3), Some(0)).per_page, 1);
        assert_eq!(PageRequest::new(Some(u64::MAX), None).page, MAX_PAGE);
    }

    #[tokio::test]
    async fn tasks_are_paginated_and_project_scoped() {
        let pool = memory_pool().await;
        let owner = upsert_user(&pool, "owner@example.com", None).await.unwrap();
        let project = create_project(
            &pool,
            owner.id,
            NewProject {
                name: "Tracker".into(),
                description: None,
            },
        )
        .await
        .unwrap();
        let other = create_project(
            &pool,
            owner.id,
            NewProject {
                name: "Other".into(),
                description: None,
            },
        )
        .await
        .unwrap();

        for n in 0..5 {
            create_task(
                &pool,
                project.id,
                owner.id,
                NewTask {
                    title: format!("task {n}"),
                    description: None,
                    assignee_id: None,
                },
            )
            .await
            .unwrap();
        }

        let page = list_tasks(&pool, project.id, PageRequest::new(Some(2), Some(2)))
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        let last = list_tasks(&pool, project.id, PageRequest::new(Some(3), Some(2)))
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);
        let beyond = list_tasks(
            &pool,
            project.id,
            PageRequest::new(Some(u64::MAX), Some(MAX_PER_PAGE)),
        )
        .await
        .unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total, 5);

        let task = &page.items[0];
        assert!(find_task(&pool, other.id, task.id).await.unwrap().is_none());
        assert!(!delete_task(&pool, other.id, task.id).await.unwrap());

        let done = update_task(
            &pool,
            project.id,
            task.id,
            TaskChanges {
                status: Some(tasks::Status::Done),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(done.status, tasks::Status::Done);
        assert_eq!(done.title, task.title);

        let assigned = update_task(
            &pool,
            project.id,
            task.id,
            TaskChanges {
                description: Some(Some("details".into())),
                assignee_id: Some(Some(owner.id)),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(assigned.assignee_id, Some(owner.id));
        let cleared = update_task(
            &pool,
            project.id,
            task.id,
            TaskChanges {
                description: Some(None),
                assignee_id: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(cleared.assignee_id, None);
        assert_eq!(cleared.description, None);
        assert_eq!(cleared.status, tasks::Status::Done);
        assert!(delete_task(&pool, project.id, task.id).await.unwrap());
    }
}
