use chrono::Utc;
use entity::users;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::DbResult;

/// Find a user by email or create it. A provided name replaces the stored one.
pub async fn upsert_user<C: ConnectionTrait>(
    db: &C,
    email: &str,
    name: Option<String>,
) -> DbResult<users::Model> {
    let email = email.trim().to_lowercase();
    let existing = users::Entity::find()
        .filter(users::Column::Email.eq(email.as_str()))
        .one(db)
        .await?;

    match existing {
        Some(user) if name.is_none() || user.name == name => Ok(user),
        Some(user) => {
            let mut active: users::ActiveModel = user.into();
            active.name = Set(name);
            Ok(active.update(db).await?)
        }
        None => {
            let model = users::ActiveModel {
                id: Set(Uuid::new_v4()),
                email: Set(email),
                name: Set(name),
                created_at: Set(Utc::now().into()),
            };
            Ok(model.insert(db).await?)
        }
    }
}

pub async fn find_user<C: ConnectionTrait>(db: &C, id: Uuid) -> DbResult<Option<users::Model>> {
    Ok(users::Entity::find_by_id(id).one(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_pool;

    #[tokio::test]
    async fn upsert_is_keyed_by_normalised_email() {
        let pool = memory_pool().await;
        let first = upsert_user(&pool, "Ada@Example.com", None).await.unwrap();
        let again = upsert_user(&pool, "ada@example.com ", Some("Ada".into()))
            .await
            .unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(again.name.as_deref(), Some("Ada"));

        let found = find_user(&pool, first.id).await.unwrap().unwrap();
        assert_eq!(found.email, "ada@example.com");
    }
}
