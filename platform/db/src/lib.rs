//! Database primitives: connection settings plus the repository functions the
//! HTTP layer calls into.

mod membership;
mod projects;
mod tasks;
mod users;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub use membership::{
    MemberChanges, SeaOrmMembershipLookup, add_member, find_member, list_members,
    member_permissions, remove_member, update_member,
};
pub use projects::{
    NewProject, ProjectChanges, create_project, delete_project, find_project, projects_for_user,
    update_project,
};
pub use tasks::{
    NewTask, Page, PageRequest, TaskChanges, create_task, delete_task, find_task, list_tasks,
    update_task,
};
pub use users::{find_user, upsert_user};

/// Shared connection handle (sea-orm keeps the pool inside).
pub type DbPool = DatabaseConnection;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database url missing")]
    MissingUrl,
    #[error("user is already a member of the project")]
    AlreadyMember,
    #[error(transparent)]
    Database(#[from] DbErr),
}

pub type DbResult<T> = Result<T, DbError>;

/// Environment-driven connection settings.
#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_url_key")]
    env_key: String,
    #[serde(default)]
    url: Option<String>,
}

fn default_url_key() -> String {
    "DATABASE_URL".to_string()
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DatabaseSettings {
    pub fn from_env() -> Self {
        Self {
            env_key: default_url_key(),
            url: None,
        }
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            env_key: default_url_key(),
            url: Some(url.into()),
        }
    }

    pub fn database_url(&self) -> DbResult<String> {
        match &self.url {
            Some(url) => Ok(url.clone()),
            None => std::env::var(&self.env_key).map_err(|_| DbError::MissingUrl),
        }
    }
}

pub async fn connect(settings: &DatabaseSettings) -> DbResult<DbPool> {
    let url = settings.database_url()?;
    let mut options = ConnectOptions::new(url.clone());
    options.sqlx_logging(false);
    // An in-memory SQLite database lives only as long as its one connection.
    if url.starts_with("sqlite::memory:") {
        options.max_connections(1).min_connections(1);
    }
    let pool = Database::connect(options).await?;
    debug!(backend = ?pool.get_database_backend(), "database connected");
    Ok(pool)
}
