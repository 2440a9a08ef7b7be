use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use super::user::UserSummary;
use crate::entities::task_assignment;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct TaskAssignment {
    pub user_id: Uuid,
    #[ts(type = "Date")]
    pub assigned_at: DateTime<Utc>,
    pub user: UserSummary,
}

impl TaskAssignment {
    /// Assignment rows for the given tasks, grouped by task row id.
    pub(crate) async fn models_by_task<C: ConnectionTrait>(
        db: &C,
        task_row_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<task_assignment::Model>>, DbErr> {
        if task_row_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let models = task_assignment::Entity::find()
            .filter(task_assignment::Column::TaskId.is_in(task_row_ids.to_vec()))
            .order_by_asc(task_assignment::Column::Id)
            .all(db)
            .await?;

        let mut grouped: HashMap<i64, Vec<task_assignment::Model>> = HashMap::new();
        for model in models {
            grouped.entry(model.task_id).or_default().push(model);
        }
        Ok(grouped)
    }

    /// Row ids of the tasks assigned to one user.
    pub(crate) async fn task_row_ids_for_user<C: ConnectionTrait>(
        db: &C,
        user_row_id: i64,
    ) -> Result<Vec<i64>, DbErr> {
        let models = task_assignment::Entity::find()
            .filter(task_assignment::Column::UserId.eq(user_row_id))
            .all(db)
            .await?;
        Ok(models.into_iter().map(|model| model.task_id).collect())
    }

    /// Drops every assignment of the task and writes `user_row_ids` in their place.
    pub(crate) async fn replace<C: ConnectionTrait>(
        db: &C,
        task_row_id: i64,
        user_row_ids: &[i64],
    ) -> Result<(), DbErr> {
        task_assignment::Entity::delete_many()
            .filter(task_assignment::Column::TaskId.eq(task_row_id))
            .exec(db)
            .await?;
        Self::insert_many(db, task_row_id, user_row_ids).await
    }

    pub(crate) async fn insert_many<C: ConnectionTrait>(
        db: &C,
        task_row_id: i64,
        user_row_ids: &[i64],
    ) -> Result<(), DbErr> {
        let mut seen = HashSet::new();
        let now = Utc::now();
        let rows: Vec<task_assignment::ActiveModel> = user_row_ids
            .iter()
            .filter(|id| seen.insert(**id))
            .map(|user_row_id| task_assignment::ActiveModel {
                task_id: Set(task_row_id),
                user_id: Set(*user_row_id),
                created_at: Set(now.into()),
                ..Default::default()
            })
            .collect();
        if rows.is_empty() {
            return Ok(());
        }
        task_assignment::Entity::insert_many(rows).exec(db).await?;
        Ok(())
    }

    pub(crate) fn from_model(model: &task_assignment::Model, user: UserSummary) -> Self {
        Self {
            user_id: user.id,
            assigned_at: model.created_at.into(),
            user,
        }
    }
}
