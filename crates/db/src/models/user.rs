use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use crate::entities::{task, task_assignment, user};

#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("User not found")]
    NotFound,
    #[error("Username is already taken")]
    UsernameTaken,
    #[error("Email is already in use")]
    EmailTaken,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub name: Option<String>,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
}

/// The public slice of a user embedded in tasks, teams and memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct TaskCounts {
    pub assigned_tasks: u64,
    pub created_tasks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct UserWithCounts {
    #[serde(flatten)]
    #[ts(flatten)]
    pub user: User,
    #[serde(rename = "_count")]
    pub task_counts: TaskCounts,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    pub name: Option<String>,
}

impl From<&user::Model> for UserSummary {
    fn from(model: &user::Model) -> Self {
        Self {
            id: model.uuid,
            username: model.username.clone(),
            name: model.name.clone(),
        }
    }
}

impl User {
    fn from_model(model: user::Model) -> Self {
        Self {
            id: model.uuid,
            username: model.username,
            email: model.email,
            name: model.name,
            created_at: model.created_at.into(),
        }
    }

    pub async fn find_all_with_counts<C: ConnectionTrait>(
        db: &C,
    ) -> Result<Vec<UserWithCounts>, DbErr> {
        let models = user::Entity::find()
            .order_by_asc(user::Column::Name)
            .order_by_asc(user::Column::Username)
            .all(db)
            .await?;

        let mut users = Vec::with_capacity(models.len());
        for model in models {
            let assigned_tasks = task_assignment::Entity::find()
                .filter(task_assignment::Column::UserId.eq(model.id))
                .count(db)
                .await?;
            let created_tasks = task::Entity::find()
                .filter(task::Column::CreatorId.eq(model.id))
                .count(db)
                .await?;
            users.push(UserWithCounts {
                user: Self::from_model(model),
                task_counts: TaskCounts {
                    assigned_tasks,
                    created_tasks,
                },
            });
        }
        Ok(users)
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = user::Entity::find()
            .filter(user::Column::Uuid.eq(id))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_by_username<C: ConnectionTrait>(
        db: &C,
        username: &str,
    ) -> Result<Option<Self>, DbErr> {
        let record = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    /// Reports which unique field an existing user already holds, username first.
    pub async fn find_conflict<C: ConnectionTrait>(
        db: &C,
        username: &str,
        email: &str,
    ) -> Result<Option<UserError>, DbErr> {
        let existing = user::Entity::find()
            .filter(
                Condition::any()
                    .add(user::Column::Username.eq(username))
                    .add(user::Column::Email.eq(email)),
            )
            .all(db)
            .await?;

        if existing.iter().any(|model| model.username == username) {
            return Ok(Some(UserError::UsernameTaken));
        }
        if existing.iter().any(|model| model.email == email) {
            return Ok(Some(UserError::EmailTaken));
        }
        Ok(None)
    }

    pub async fn create<C: ConnectionTrait>(db: &C, data: &CreateUser) -> Result<Self, UserError> {
        if let Some(conflict) = Self::find_conflict(db, &data.username, &data.email).await? {
            return Err(conflict);
        }

        let now = Utc::now();
        let active = user::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            username: Set(data.username.clone()),
            email: Set(data.email.clone()),
            name: Set(data.name.clone()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };

        // A concurrent registration can still win the race past `find_conflict`.
        let model = active.insert(db).await.map_err(|err| match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(msg)) if msg.contains("email") => {
                UserError::EmailTaken
            }
            Some(SqlErr::UniqueConstraintViolation(_)) => UserError::UsernameTaken,
            _ => UserError::Database(err),
        })?;
        tracing::debug!(user_id = %model.uuid, username = %model.username, "Created user");
        Ok(Self::from_model(model))
    }

    /// Loads summaries for the given row ids, keyed by row id.
    pub async fn summaries_for<C: ConnectionTrait>(
        db: &C,
        row_ids: &[i64],
    ) -> Result<HashMap<i64, UserSummary>, DbErr> {
        if row_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let models = user::Entity::find()
            .filter(user::Column::Id.is_in(row_ids.to_vec()))
            .all(db)
            .await?;
        Ok(models
            .iter()
            .map(|model| (model.id, UserSummary::from(model)))
            .collect())
    }
}
