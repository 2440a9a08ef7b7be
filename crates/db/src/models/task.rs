use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    TransactionSession,
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::{Expr, ExprTrait},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use super::{
    ids,
    task_assignment::TaskAssignment,
    team::Team,
    user::{User, UserSummary},
};
use crate::{
    entities::{task, team},
    types::TaskStatus,
};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Task not found")]
    NotFound,
    #[error("Team not found")]
    TeamNotFound,
    #[error("Creator not found")]
    CreatorNotFound,
    #[error("Assignee {0} not found")]
    AssigneeNotFound(Uuid),
    #[error("Priority must be a positive integer, got {0}")]
    InvalidPriority(i32),
    #[error("No priority left after the team's lowest-ranked task; pass one explicitly")]
    PriorityExhausted,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: i32,
    pub status: TaskStatus,
    #[ts(type = "Date")]
    pub deadline: DateTime<Utc>,
    #[ts(type = "Date | null")]
    pub start_date: Option<DateTime<Utc>>,
    pub creator_id: Uuid,
    pub team_id: Uuid,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct TaskWithDetails {
    #[serde(flatten)]
    #[ts(flatten)]
    pub task: Task,
    pub creator: UserSummary,
    pub team: Team,
    pub assignments: Vec<TaskAssignment>,
}

impl std::ops::Deref for TaskWithDetails {
    type Target = Task;
    fn deref(&self) -> &Self::Target {
        &self.task
    }
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateTask {
    pub team_id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Appended after the team's open tasks when absent.
    pub priority: Option<i32>,
    pub status: Option<TaskStatus>,
    pub deadline: DateTime<Utc>,
    pub start_date: Option<DateTime<Utc>>,
    pub assignee_ids: Vec<Uuid>,
}

impl CreateTask {
    pub fn new(team_id: Uuid, creator_id: Uuid, title: String, deadline: DateTime<Utc>) -> Self {
        Self {
            team_id,
            creator_id,
            title,
            description: None,
            priority: None,
            status: None,
            deadline,
            start_date: None,
            assignee_ids: Vec::new(),
        }
    }
}

/// Partial update. `None` leaves a field untouched; the nested options clear
/// the nullable columns.
#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<i32>,
    pub status: Option<TaskStatus>,
    pub deadline: Option<DateTime<Utc>>,
    pub start_date: Option<Option<DateTime<Utc>>>,
    pub team_id: Option<Uuid>,
    /// Replaces the assignment list wholesale.
    pub assignee_ids: Option<Vec<Uuid>>,
    pub shift_priorities: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub team_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub search: Option<String>,
    pub assignee_id: Option<Uuid>,
}

/// Tasks due within this many days are due soon.
pub const DUE_SOON_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub enum DeadlineState {
    Overdue,
    DueSoon,
    OnTrack,
}

impl DeadlineState {
    /// Whole days until the deadline, rounded up.
    pub fn days_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        const DAY_MS: i64 = 24 * 60 * 60 * 1000;
        let ms = (deadline - now).num_milliseconds();
        ms.div_euclid(DAY_MS) + i64::from(ms.rem_euclid(DAY_MS) != 0)
    }

    pub fn classify(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        match Self::days_until(deadline, now) {
            days if days < 0 => Self::Overdue,
            days if days <= DUE_SOON_DAYS => Self::DueSoon,
            _ => Self::OnTrack,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct DeadlineSummary {
    pub overdue: Vec<TaskWithDetails>,
    pub due_soon: Vec<TaskWithDetails>,
}

fn validate_priority(priority: i32) -> Result<(), TaskError> {
    if priority < 1 {
        return Err(TaskError::InvalidPriority(priority));
    }
    Ok(())
}

impl Task {
    fn from_parts(model: task::Model, creator_id: Uuid, team_id: Uuid) -> Self {
        Self {
            id: model.uuid,
            title: model.title,
            description: model.description,
            priority: model.priority,
            status: model.status,
            deadline: model.deadline,
            start_date: model.start_date,
            creator_id,
            team_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }

    async fn from_model<C: ConnectionTrait>(db: &C, model: task::Model) -> Result<Self, DbErr> {
        let creator_id = ids::user_uuid_by_id(db, model.creator_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;
        let team_id = ids::team_uuid_by_id(db, model.team_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Team not found".to_string()))?;
        Ok(Self::from_parts(model, creator_id, team_id))
    }

    /// Attaches creator, team and assignments, loading each relation in one batch.
    async fn with_details<C: ConnectionTrait>(
        db: &C,
        models: Vec<task::Model>,
    ) -> Result<Vec<TaskWithDetails>, DbErr> {
        if models.is_empty() {
            return Ok(Vec::new());
        }

        let mut team_row_ids: Vec<i64> = models.iter().map(|m| m.team_id).collect();
        team_row_ids.sort_unstable();
        team_row_ids.dedup();
        let teams: HashMap<i64, team::Model> = team::Entity::find()
            .filter(team::Column::Id.is_in(team_row_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|model| (model.id, model))
            .collect();

        let task_row_ids: Vec<i64> = models.iter().map(|m| m.id).collect();
        let mut assignments = TaskAssignment::models_by_task(db, &task_row_ids).await?;

        let mut user_row_ids: Vec<i64> = models.iter().map(|m| m.creator_id).collect();
        user_row_ids.extend(teams.values().map(|t| t.creator_id));
        user_row_ids.extend(assignments.values().flatten().map(|a| a.user_id));
        user_row_ids.sort_unstable();
        user_row_ids.dedup();
        let users = User::summaries_for(db, &user_row_ids).await?;
        let user = |row_id: i64| {
            users
                .get(&row_id)
                .cloned()
                .ok_or(DbErr::RecordNotFound("User not found".to_string()))
        };

        let mut tasks = Vec::with_capacity(models.len());
        for model in models {
            let team_model = teams
                .get(&model.team_id)
                .cloned()
                .ok_or(DbErr::RecordNotFound("Team not found".to_string()))?;
            let team_creator = user(team_model.creator_id)?;
            let team = Team::from_parts(team_model, team_creator.id);
            let creator = user(model.creator_id)?;
            let task_assignments = assignments
                .remove(&model.id)
                .unwrap_or_default()
                .iter()
                .map(|a| Ok(TaskAssignment::from_model(a, user(a.user_id)?)))
                .collect::<Result<Vec<_>, DbErr>>()?;

            tasks.push(TaskWithDetails {
                task: Self::from_parts(model, creator.id, team.id),
                creator,
                team,
                assignments: task_assignments,
            });
        }
        Ok(tasks)
    }

    /// Tasks matching the filter, most urgent first and newest first within a priority.
    pub async fn find_all<C: ConnectionTrait>(
        db: &C,
        filter: &TaskFilter,
    ) -> Result<Vec<TaskWithDetails>, DbErr> {
        let mut query = task::Entity::find();

        if let Some(team_id) = filter.team_id {
            let Some(team_row_id) = ids::team_id_by_uuid(db, team_id).await? else {
                return Ok(Vec::new());
            };
            query = query.filter(task::Column::TeamId.eq(team_row_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(task::Column::Status.eq(status));
        }
        if let Some(assignee_id) = filter.assignee_id {
            let Some(user_row_id) = ids::user_id_by_uuid(db, assignee_id).await? else {
                return Ok(Vec::new());
            };
            let task_row_ids = TaskAssignment::task_row_ids_for_user(db, user_row_id).await?;
            query = query.filter(task::Column::Id.is_in(task_row_ids));
        }

        let mut models = query
            .order_by_asc(task::Column::Priority)
            .order_by_desc(task::Column::CreatedAt)
            .order_by_desc(task::Column::Id)
            .all(db)
            .await?;

        // Filtered here rather than with LIKE so non-ASCII text folds case too.
        if let Some(needle) = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let needle = needle.to_lowercase();
            models.retain(|model| {
                model.title.to_lowercase().contains(&needle)
                    || model
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            });
        }

        Self::with_details(db, models).await
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = task::Entity::find()
            .filter(task::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_with_details<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
    ) -> Result<Option<TaskWithDetails>, DbErr> {
        let record = task::Entity::find()
            .filter(task::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Self::with_details(db, vec![model]).await?.pop()),
            None => Ok(None),
        }
    }

    /// One past the highest priority among the team's open tasks.
    pub async fn next_priority<C: ConnectionTrait>(
        db: &C,
        team_row_id: i64,
    ) -> Result<i32, TaskError> {
        let max: Option<Option<i32>> = task::Entity::find()
            .select_only()
            .column_as(task::Column::Priority.max(), "max_priority")
            .filter(task::Column::TeamId.eq(team_row_id))
            .filter(task::Column::Status.ne(TaskStatus::Completed))
            .into_tuple()
            .one(db)
            .await?;
        max.flatten()
            .unwrap_or(0)
            .checked_add(1)
            .ok_or(TaskError::PriorityExhausted)
    }

    /// Moves every open task of the team ranked below `priority` up by one, in a
    /// single statement. Returns the number of tasks moved.
    pub async fn shift_priorities_after<C: ConnectionTrait>(
        db: &C,
        team_row_id: i64,
        priority: i32,
        exclude_row_id: i64,
    ) -> Result<u64, DbErr> {
        let result = task::Entity::update_many()
            .col_expr(
                task::Column::Priority,
                Expr::col(task::Column::Priority).sub(1),
            )
            .col_expr(task::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(task::Column::TeamId.eq(team_row_id))
            .filter(task::Column::Status.ne(TaskStatus::Completed))
            .filter(task::Column::Priority.gt(priority))
            .filter(task::Column::Id.ne(exclude_row_id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn create<C>(db: &C, data: &CreateTask) -> Result<TaskWithDetails, TaskError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        if let Some(priority) = data.priority {
            validate_priority(priority)?;
        }

        let tx = db.begin().await?;

        let team_row_id = ids::team_id_by_uuid(&tx, data.team_id)
            .await?
            .ok_or(TaskError::TeamNotFound)?;
        let creator_row_id = ids::user_id_by_uuid(&tx, data.creator_id)
            .await?
            .ok_or(TaskError::CreatorNotFound)?;
        let assignee_row_ids = ids::user_ids_by_uuids(&tx, &data.assignee_ids)
            .await?
            .map_err(TaskError::AssigneeNotFound)?;

        let priority = match data.priority {
            Some(priority) => priority,
            None => Self::next_priority(&tx, team_row_id).await?,
        };

        let now = Utc::now();
        let active = task::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            title: Set(data.title.clone()),
            description: Set(data.description.clone()),
            priority: Set(priority),
            status: Set(data.status.unwrap_or_default()),
            deadline: Set(data.deadline),
            start_date: Set(data.start_date),
            creator_id: Set(creator_row_id),
            team_id: Set(team_row_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let model = active.insert(&tx).await?;
        TaskAssignment::insert_many(&tx, model.id, &assignee_row_ids).await?;

        let task = Self::with_details(&tx, vec![model])
            .await?
            .pop()
            .ok_or(TaskError::NotFound)?;
        tx.commit().await?;

        tracing::info!(
            task_id = %task.id,
            team_id = %data.team_id,
            priority,
            "Created task"
        );
        Ok(task)
    }

    /// Applies a partial update. When the task moves into `COMPLETED` and
    /// `shift_priorities` is set, the team's queue is compacted in the same
    /// transaction.
    pub async fn update<C>(db: &C, id: Uuid, data: &UpdateTask) -> Result<TaskWithDetails, TaskError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        if let Some(priority) = data.priority {
            validate_priority(priority)?;
        }

        let tx = db.begin().await?;

        let current = task::Entity::find()
            .filter(task::Column::Uuid.eq(id))
            .one(&tx)
            .await?
            .ok_or(TaskError::NotFound)?;

        let team_row_id = match data.team_id {
            Some(team_id) => Some(
                ids::team_id_by_uuid(&tx, team_id)
                    .await?
                    .ok_or(TaskError::TeamNotFound)?,
            ),
            None => None,
        };
        let assignee_row_ids = match &data.assignee_ids {
            Some(assignee_ids) => Some(
                ids::user_ids_by_uuids(&tx, assignee_ids)
                    .await?
                    .map_err(TaskError::AssigneeNotFound)?,
            ),
            None => None,
        };

        let completing = data.status == Some(TaskStatus::Completed)
            && current.status != TaskStatus::Completed;
        if completing && data.shift_priorities {
            let shifted =
                Self::shift_priorities_after(&tx, current.team_id, current.priority, current.id)
                    .await?;
            tracing::debug!(task_id = %id, shifted, "Shifted team priorities");
        }

        let mut active: task::ActiveModel = current.into();
        if let Some(title) = &data.title {
            active.title = Set(title.clone());
        }
        if let Some(description) = &data.description {
            active.description = Set(description.clone());
        }
        if let Some(priority) = data.priority {
            active.priority = Set(priority);
        }
        if let Some(status) = data.status {
            active.status = Set(status);
        }
        if let Some(deadline) = data.deadline {
            active.deadline = Set(deadline);
        }
        if let Some(start_date) = data.start_date {
            active.start_date = Set(start_date);
        }
        if let Some(team_row_id) = team_row_id {
            active.team_id = Set(team_row_id);
        }
        active.updated_at = Set(Utc::now());
        let model = active.update(&tx).await?;

        if let Some(assignee_row_ids) = assignee_row_ids {
            TaskAssignment::replace(&tx, model.id, &assignee_row_ids).await?;
        }

        let task = Self::with_details(&tx, vec![model])
            .await?
            .pop()
            .ok_or(TaskError::NotFound)?;
        tx.commit().await?;

        tracing::debug!(task_id = %id, status = %task.status, "Updated task");
        Ok(task)
    }

    /// Deletes the task and its assignments. Returns the number of tasks removed.
    pub async fn delete<C>(db: &C, id: Uuid) -> Result<u64, DbErr>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let tx = db.begin().await?;
        let Some(row_id) = ids::task_id_by_uuid(&tx, id).await? else {
            return Ok(0);
        };
        TaskAssignment::replace(&tx, row_id, &[]).await?;
        let result = task::Entity::delete_many()
            .filter(task::Column::Id.eq(row_id))
            .exec(&tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected)
    }

    /// Open tasks that are past or close to their deadline.
    pub async fn deadline_summary<C: ConnectionTrait>(
        db: &C,
        filter: &TaskFilter,
        now: DateTime<Utc>,
    ) -> Result<DeadlineSummary, DbErr> {
        let tasks = Self::find_all(db, filter).await?;
        let mut summary = DeadlineSummary::default();
        for task in tasks.into_iter().filter(|t| t.status.is_open()) {
            match DeadlineState::classify(task.deadline, now) {
                DeadlineState::Overdue => summary.overdue.push(task),
                DeadlineState::DueSoon => summary.due_soon.push(task),
                DeadlineState::OnTrack => {}
            }
        }
        summary.overdue.sort_by_key(|t| t.deadline);
        summary.due_soon.sort_by_key(|t| t.deadline);
        Ok(summary)
    }
}
